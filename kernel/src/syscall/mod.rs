//! The system-call surface.
//!
//! The 0x80 trap gate lands here with the call number in EAX and up to
//! three arguments in EBX/ECX/EDX. Every handler validates user
//! pointers against the `[USER_BASE, USER_STACK_TOP]` window before
//! touching them; every failure collapses to -1 at the boundary, with
//! the typed reason kept internal.

use crate::arch::TrapFrame;
use crate::mm::layout::{user_range_ok, MAX_PROCESSES, USER_VIDEO};
use crate::process::signal;
use crate::process::{self, FileDescriptor, FileOps, MAX_OPEN_FILES};

/// System call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Syscall {
    Halt = 1,
    Execute = 2,
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,
    GetArgs = 7,
    VidMap = 8,
    SetHandler = 9,
    SigReturn = 10,
}

impl TryFrom<u32> for Syscall {
    type Error = ();

    fn try_from(number: u32) -> Result<Self, ()> {
        match number {
            1 => Ok(Syscall::Halt),
            2 => Ok(Syscall::Execute),
            3 => Ok(Syscall::Read),
            4 => Ok(Syscall::Write),
            5 => Ok(Syscall::Open),
            6 => Ok(Syscall::Close),
            7 => Ok(Syscall::GetArgs),
            8 => Ok(Syscall::VidMap),
            9 => Ok(Syscall::SetHandler),
            10 => Ok(Syscall::SigReturn),
            _ => Err(()),
        }
    }
}

/// Why a call failed. Flattened to -1 on the user-visible side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyscallError {
    UnknownNumber,
    BadArgument,
    BadDescriptor,
    NotFound,
    Exhausted,
}

type SyscallResult = Result<i32, SyscallError>;

/// Route one trap to its handler and flatten the result.
pub fn dispatch(frame: &mut TrapFrame) -> i32 {
    let number = frame.eax;
    let (arg1, arg2, arg3) = (frame.ebx, frame.ecx, frame.edx);

    let result = match Syscall::try_from(number) {
        Err(()) => Err(SyscallError::UnknownNumber),
        Ok(Syscall::Halt) => sys_halt(arg1),
        Ok(Syscall::Execute) => sys_execute(arg1),
        Ok(Syscall::Read) => sys_read(arg1, arg2, arg3),
        Ok(Syscall::Write) => sys_write(arg1, arg2, arg3),
        Ok(Syscall::Open) => sys_open(arg1),
        Ok(Syscall::Close) => sys_close(arg1),
        Ok(Syscall::GetArgs) => sys_getargs(arg1, arg2),
        Ok(Syscall::VidMap) => sys_vidmap(arg1),
        Ok(Syscall::SetHandler) => sys_set_handler(arg1, arg2),
        Ok(Syscall::SigReturn) => Ok(signal::sigreturn(frame)),
    };

    match result {
        Ok(value) => value,
        Err(err) => {
            log::debug!("syscall {} failed: {:?}", number, err);
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// User-memory access
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn user_bytes(addr: u32, len: u32) -> Option<&'static [u8]> {
    if addr == 0 || len == 0 || !user_range_ok(addr, len) {
        return None;
    }
    // SAFETY: The range lies inside the running process's 4 MiB page,
    // which is mapped for the duration of the call.
    Some(unsafe { core::slice::from_raw_parts(addr as usize as *const u8, len as usize) })
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn user_bytes_mut(addr: u32, len: u32) -> Option<&'static mut [u8]> {
    if addr == 0 || len == 0 || !user_range_ok(addr, len) {
        return None;
    }
    // SAFETY: As user_bytes; writes stay inside the user window.
    Some(unsafe { core::slice::from_raw_parts_mut(addr as usize as *mut u8, len as usize) })
}

/// Copy a NUL-terminated user string of at most `N - 1` bytes.
#[cfg(all(target_arch = "x86", target_os = "none"))]
fn copy_user_cstr<const N: usize>(addr: u32) -> Option<([u8; N], usize)> {
    let mut out = [0u8; N];
    for (i, slot) in out.iter_mut().enumerate() {
        let at = addr.checked_add(i as u32)?;
        if !user_range_ok(at, 1) {
            return None;
        }
        // SAFETY: Single mapped user byte, just range-checked.
        let byte = unsafe { core::ptr::read(at as usize as *const u8) };
        if byte == 0 {
            return Some((out, i));
        }
        *slot = byte;
    }
    // No terminator within the cap.
    None
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn user_bytes(_addr: u32, _len: u32) -> Option<&'static [u8]> {
    None
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn user_bytes_mut(_addr: u32, _len: u32) -> Option<&'static mut [u8]> {
    None
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn copy_user_cstr<const N: usize>(_addr: u32) -> Option<([u8; N], usize)> {
    None
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn sys_halt(status: u32) -> SyscallResult {
    process::lifecycle::halt_process(status as u8)
}

fn sys_execute(command: u32) -> SyscallResult {
    let (buf, len) = copy_user_cstr::<192>(command).ok_or(SyscallError::BadArgument)?;
    Ok(process::lifecycle::execute(&buf[..len]))
}

fn sys_read(fd: u32, buf: u32, nbytes: u32) -> SyscallResult {
    if (nbytes as i32) <= 0 {
        return Err(SyscallError::BadArgument);
    }
    let fd = fd as usize;
    if fd >= MAX_OPEN_FILES {
        return Err(SyscallError::BadDescriptor);
    }
    let buf = user_bytes_mut(buf, nbytes).ok_or(SyscallError::BadArgument)?;

    // SAFETY: Sole PCB reference for the duration of this call.
    let pcb = unsafe { process::current_pcb() };
    let desc = &mut pcb.fds[fd];
    if !desc.in_use {
        return Err(SyscallError::BadDescriptor);
    }
    let read = desc.ops.read;
    let count = read(desc, buf);
    if count > 0 {
        desc.pos = desc.pos.wrapping_add(count as u32);
    }
    Ok(count as i32)
}

fn sys_write(fd: u32, buf: u32, nbytes: u32) -> SyscallResult {
    if (nbytes as i32) <= 0 {
        return Err(SyscallError::BadArgument);
    }
    let fd = fd as usize;
    if fd >= MAX_OPEN_FILES {
        return Err(SyscallError::BadDescriptor);
    }
    let buf = user_bytes(buf, nbytes).ok_or(SyscallError::BadArgument)?;

    // SAFETY: Sole PCB reference for the duration of this call.
    let pcb = unsafe { process::current_pcb() };
    let desc = &mut pcb.fds[fd];
    if !desc.in_use {
        return Err(SyscallError::BadDescriptor);
    }
    let write = desc.ops.write;
    Ok(write(desc, buf) as i32)
}

fn sys_open(name: u32) -> SyscallResult {
    let (buf, len) = copy_user_cstr::<33>(name).ok_or(SyscallError::BadArgument)?;
    let name = &buf[..len];

    let fs = crate::fs::image().ok_or(SyscallError::NotFound)?;
    let entry = fs.dentry_by_name(name).ok_or(SyscallError::NotFound)?;

    // SAFETY: Sole PCB reference for the duration of this call.
    let pcb = unsafe { process::current_pcb() };
    let fd = pcb.alloc_fd().ok_or(SyscallError::Exhausted)?;

    let ops: &'static FileOps = match entry.file_type {
        crate::fs::FileType::Rtc => &process::RTC_OPS,
        crate::fs::FileType::Directory => &process::DIR_OPS,
        crate::fs::FileType::Regular => &process::FILE_OPS,
    };
    pcb.fds[fd] = FileDescriptor {
        ops,
        inode: entry.inode,
        pos: 0,
        in_use: true,
    };
    if (ops.open)(name) < 0 {
        pcb.fds[fd] = FileDescriptor::closed();
        return Err(SyscallError::NotFound);
    }
    Ok(fd as i32)
}

fn sys_close(fd: u32) -> SyscallResult {
    let fd = fd as usize;
    // Descriptors 0 and 1 belong to the terminal and stay open.
    if !(2..MAX_OPEN_FILES).contains(&fd) {
        return Err(SyscallError::BadDescriptor);
    }
    // SAFETY: Sole PCB reference for the duration of this call.
    let pcb = unsafe { process::current_pcb() };
    let desc = &mut pcb.fds[fd];
    if !desc.in_use {
        return Err(SyscallError::BadDescriptor);
    }
    let close = desc.ops.close;
    let _ = close(desc);
    *desc = FileDescriptor::closed();
    Ok(0)
}

fn sys_getargs(buf: u32, nbytes: u32) -> SyscallResult {
    if (nbytes as i32) <= 0 {
        return Err(SyscallError::BadArgument);
    }
    let dst = user_bytes_mut(buf, nbytes).ok_or(SyscallError::BadArgument)?;

    // SAFETY: Sole PCB reference for the duration of this call.
    let pcb = unsafe { process::current_pcb() };
    if pcb.arg_len == 0 || pcb.arg_len > dst.len() {
        return Err(SyscallError::BadArgument);
    }
    dst[..pcb.arg_len].copy_from_slice(pcb.args());
    if pcb.arg_len < dst.len() {
        dst[pcb.arg_len] = 0;
    }
    Ok(0)
}

fn sys_vidmap(screen_start: u32) -> SyscallResult {
    if screen_start == 0 || !user_range_ok(screen_start, 4) {
        return Err(SyscallError::BadArgument);
    }
    crate::arch::without_interrupts(|| {
        // SAFETY: Interrupts disabled for the directory rewrite.
        unsafe { crate::mm::paging::map_user_video_dir() };
    });
    let dst = user_bytes_mut(screen_start, 4).ok_or(SyscallError::BadArgument)?;
    dst.copy_from_slice(&USER_VIDEO.to_le_bytes());
    Ok(0)
}

fn sys_set_handler(signum: u32, handler: u32) -> SyscallResult {
    if process::current_pid() >= MAX_PROCESSES {
        return Err(SyscallError::BadArgument);
    }
    // SAFETY: Sole PCB reference for the duration of this call.
    let pcb = unsafe { process::current_pcb() };
    signal::set_handler(pcb, signum as i32, handler)
        .map(|()| 0)
        .map_err(|()| SyscallError::BadArgument)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_numbers_match_the_abi() {
        assert_eq!(Syscall::try_from(1), Ok(Syscall::Halt));
        assert_eq!(Syscall::try_from(2), Ok(Syscall::Execute));
        assert_eq!(Syscall::try_from(3), Ok(Syscall::Read));
        assert_eq!(Syscall::try_from(4), Ok(Syscall::Write));
        assert_eq!(Syscall::try_from(5), Ok(Syscall::Open));
        assert_eq!(Syscall::try_from(6), Ok(Syscall::Close));
        assert_eq!(Syscall::try_from(7), Ok(Syscall::GetArgs));
        assert_eq!(Syscall::try_from(8), Ok(Syscall::VidMap));
        assert_eq!(Syscall::try_from(9), Ok(Syscall::SetHandler));
        assert_eq!(Syscall::try_from(10), Ok(Syscall::SigReturn));
        assert_eq!(Syscall::try_from(0), Err(()));
        assert_eq!(Syscall::try_from(11), Err(()));
    }
}
