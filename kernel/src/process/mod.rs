//! Process control blocks and file descriptors.
//!
//! A PCB lives at the top of its process's 8 KiB kernel stack region;
//! the base address is a pure function of the pid, and the pid of the
//! running process is recovered by aligning the kernel stack pointer
//! (see [`crate::mm::layout`]). Each PCB carries an 8-entry descriptor
//! table whose entries hold an operations vector, an inode, a byte
//! position, and an in-use flag; descriptors 0 and 1 are the terminal
//! and cannot be closed.

pub mod lifecycle;
pub mod signal;

use spin::Mutex;

use crate::mm::layout::{self, MAX_PROCESSES, TERMINAL_COUNT};
use signal::SigAction;

pub type Pid = usize;

/// Open files per process.
pub const MAX_OPEN_FILES: usize = 8;

/// Saved argument string capacity.
pub const ARG_LEN: usize = 128;

pub type OpenFn = fn(name: &[u8]) -> i32;
pub type CloseFn = fn(fd: &mut FileDescriptor) -> i32;
pub type ReadFn = fn(fd: &mut FileDescriptor, buf: &mut [u8]) -> isize;
pub type WriteFn = fn(fd: &mut FileDescriptor, buf: &[u8]) -> isize;

/// Operations vector installed at open time; the variant chosen
/// depends on the file type behind the name.
pub struct FileOps {
    pub open: OpenFn,
    pub close: CloseFn,
    pub read: ReadFn,
    pub write: WriteFn,
}

pub fn invalid_open(_name: &[u8]) -> i32 {
    -1
}

pub fn invalid_close(_fd: &mut FileDescriptor) -> i32 {
    -1
}

pub fn invalid_read(_fd: &mut FileDescriptor, _buf: &mut [u8]) -> isize {
    -1
}

pub fn invalid_write(_fd: &mut FileDescriptor, _buf: &[u8]) -> isize {
    -1
}

/// Every operation fails; the vector of a closed descriptor.
pub static INVALID_OPS: FileOps = FileOps {
    open: invalid_open,
    close: invalid_close,
    read: invalid_read,
    write: invalid_write,
};

/// Descriptor 0: terminal input only.
pub static STDIN_OPS: FileOps = FileOps {
    open: invalid_open,
    close: invalid_close,
    read: crate::tty::terminal_read,
    write: invalid_write,
};

/// Descriptor 1: terminal output only.
pub static STDOUT_OPS: FileOps = FileOps {
    open: invalid_open,
    close: invalid_close,
    read: invalid_read,
    write: crate::tty::terminal_write,
};

/// Regular files.
pub static FILE_OPS: FileOps = FileOps {
    open: crate::fs::file_open,
    close: crate::fs::file_close,
    read: crate::fs::file_read,
    write: crate::fs::file_write,
};

/// The directory.
pub static DIR_OPS: FileOps = FileOps {
    open: crate::fs::dir_open,
    close: crate::fs::dir_close,
    read: crate::fs::dir_read,
    write: crate::fs::dir_write,
};

/// The RTC device file.
pub static RTC_OPS: FileOps = FileOps {
    open: crate::rtc::rtc_open,
    close: crate::rtc::rtc_close,
    read: crate::rtc::rtc_read,
    write: crate::rtc::rtc_write,
};

/// One entry of the per-process descriptor table.
#[derive(Clone, Copy)]
pub struct FileDescriptor {
    pub ops: &'static FileOps,
    pub inode: u32,
    /// Byte offset advanced by `read`.
    pub pos: u32,
    pub in_use: bool,
}

impl FileDescriptor {
    pub fn closed() -> Self {
        Self {
            ops: &INVALID_OPS,
            inode: 0,
            pos: 0,
            in_use: false,
        }
    }
}

/// Process control block.
pub struct Pcb {
    pub pid: Pid,
    /// `None` for the three base shells.
    pub parent: Option<Pid>,
    pub fds: [FileDescriptor; MAX_OPEN_FILES],
    pub args: [u8; ARG_LEN],
    pub arg_len: usize,
    /// Kernel stack/frame pointers at the `execute` call site, restored
    /// by `halt`.
    pub saved_esp: u32,
    pub saved_ebp: u32,
    /// Kernel stack pointer saved by the scheduler's context switch.
    pub sched_esp: u32,
    pub signals: [SigAction; signal::SIG_COUNT],
}

// The PCB shares an 8 KiB region with its kernel stack; keep it well
// clear of the stack's working space.
const _: () = assert!(core::mem::size_of::<Pcb>() <= 1024);

impl Pcb {
    /// A freshly-created process: terminal stdin/stdout open, default
    /// signal actions, nothing else.
    pub fn fresh(pid: Pid, parent: Option<Pid>) -> Self {
        let mut fds = [FileDescriptor::closed(); MAX_OPEN_FILES];
        fds[0] = FileDescriptor {
            ops: &STDIN_OPS,
            inode: 0,
            pos: 0,
            in_use: true,
        };
        fds[1] = FileDescriptor {
            ops: &STDOUT_OPS,
            inode: 0,
            pos: 0,
            in_use: true,
        };
        Self {
            pid,
            parent,
            fds,
            args: [0; ARG_LEN],
            arg_len: 0,
            saved_esp: 0,
            saved_ebp: 0,
            sched_esp: 0,
            signals: signal::default_table(),
        }
    }

    pub fn set_args(&mut self, args: &[u8]) {
        let len = args.len().min(ARG_LEN - 1);
        self.args[..len].copy_from_slice(&args[..len]);
        self.args[len..].fill(0);
        self.arg_len = len;
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.arg_len]
    }

    /// Lowest free descriptor at or above 2.
    pub fn alloc_fd(&mut self) -> Option<usize> {
        (2..MAX_OPEN_FILES).find(|&fd| !self.fds[fd].in_use)
    }
}

/// Fixed-size pid allocator yielding stable, lowest-first indices.
pub struct PidAllocator {
    used: [bool; MAX_PROCESSES],
}

impl PidAllocator {
    pub const fn new() -> Self {
        Self {
            used: [false; MAX_PROCESSES],
        }
    }

    pub fn alloc(&mut self) -> Option<Pid> {
        let pid = self.used.iter().position(|&used| !used)?;
        self.used[pid] = true;
        Some(pid)
    }

    pub fn free(&mut self, pid: Pid) {
        if pid < MAX_PROCESSES {
            self.used[pid] = false;
        }
    }

    pub fn in_use(&self, pid: Pid) -> bool {
        pid < MAX_PROCESSES && self.used[pid]
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

static PIDS: Mutex<PidAllocator> = Mutex::new(PidAllocator::new());

pub fn alloc_pid() -> Option<Pid> {
    PIDS.lock().alloc()
}

pub fn free_pid(pid: Pid) {
    PIDS.lock().free(pid);
}

/// True for the pids reserved for the per-terminal base shells.
pub fn is_base_shell(pid: Pid) -> bool {
    pid < TERMINAL_COUNT
}

/// The PCB of `pid`, at the top of its kernel stack region.
///
/// # Safety
///
/// `pid` must be a live process whose PCB has been initialized, and the
/// caller must not let the returned reference outlive the process or
/// alias another live reference to the same PCB.
pub unsafe fn pcb_mut(pid: Pid) -> &'static mut Pcb {
    debug_assert!(pid < MAX_PROCESSES);
    // SAFETY: The PCB region is a fixed kernel allocation; validity and
    // aliasing are the caller's contract.
    unsafe { &mut *(layout::pcb_base(pid) as usize as *mut Pcb) }
}

/// Pid of the process whose kernel stack we are running on.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn current_pid() -> Pid {
    let esp = crate::arch::x86::usermode::stack_pointer();
    // Kernel entries from user mode always land on a process stack;
    // the boot stack only runs before the first process exists.
    layout::pid_from_stack(esp).unwrap_or(0)
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn current_pid() -> Pid {
    0
}

/// The running process's PCB.
///
/// # Safety
///
/// Same aliasing contract as [`pcb_mut`].
pub unsafe fn current_pcb() -> &'static mut Pcb {
    // SAFETY: Forwarded contract.
    unsafe { pcb_mut(current_pid()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_allocation_is_lowest_first_and_stable() {
        let mut pids = PidAllocator::new();
        assert_eq!(pids.alloc(), Some(0));
        assert_eq!(pids.alloc(), Some(1));
        assert_eq!(pids.alloc(), Some(2));
        pids.free(1);
        assert_eq!(pids.alloc(), Some(1));
        assert_eq!(pids.alloc(), Some(3));
        assert_eq!(pids.alloc(), Some(4));
        assert_eq!(pids.alloc(), Some(5));
        assert_eq!(pids.alloc(), None);
        pids.free(5);
        assert!(!pids.in_use(5));
        assert_eq!(pids.alloc(), Some(5));
    }

    #[test]
    fn fresh_pcb_has_terminal_descriptors_open() {
        let pcb = Pcb::fresh(3, Some(0));
        assert!(pcb.fds[0].in_use);
        assert!(pcb.fds[1].in_use);
        assert!(core::ptr::eq(pcb.fds[0].ops, &STDIN_OPS));
        assert!(core::ptr::eq(pcb.fds[1].ops, &STDOUT_OPS));
        for fd in 2..MAX_OPEN_FILES {
            assert!(!pcb.fds[fd].in_use);
        }
        assert_eq!(pcb.parent, Some(0));
        assert_eq!(pcb.arg_len, 0);
    }

    #[test]
    fn stdin_ops_match_the_contract() {
        // {terminal_read, invalid_*} and {invalid_*, terminal_write}.
        let mut fd = FileDescriptor::closed();
        assert_eq!((STDIN_OPS.write)(&mut fd, b"x"), -1);
        assert_eq!((STDOUT_OPS.read)(&mut fd, &mut [0u8; 4]), -1);
        assert_eq!((STDIN_OPS.open)(b"x"), -1);
        assert_eq!((STDOUT_OPS.close)(&mut fd), -1);
    }

    #[test]
    fn fd_allocation_starts_at_two() {
        let mut pcb = Pcb::fresh(3, Some(0));
        assert_eq!(pcb.alloc_fd(), Some(2));
        pcb.fds[2].in_use = true;
        pcb.fds[3].in_use = true;
        assert_eq!(pcb.alloc_fd(), Some(4));
        for fd in 2..MAX_OPEN_FILES {
            pcb.fds[fd].in_use = true;
        }
        assert_eq!(pcb.alloc_fd(), None);
    }

    #[test]
    fn args_are_clamped_and_terminated() {
        let mut pcb = Pcb::fresh(4, Some(0));
        pcb.set_args(b"frame0.txt");
        assert_eq!(pcb.args(), b"frame0.txt");
        assert_eq!(pcb.args[10], 0);

        let long = [b'a'; 200];
        pcb.set_args(&long);
        assert_eq!(pcb.arg_len, ARG_LEN - 1);
        assert_eq!(pcb.args[ARG_LEN - 1], 0);
    }
}
