//! Process creation and termination.
//!
//! `execute` parses a command line, loads the named executable into a
//! freshly-mapped 4 MiB user page, and drops to ring 3 at its entry
//! point; it returns (to its caller, on this kernel stack) only when
//! the child calls `halt`, which unwinds the child's kernel frames back
//! to the captured `execute` call site. The three base shells cannot
//! die: halting one immediately re-executes `shell` in its slot.

#[cfg(all(target_arch = "x86", target_os = "none"))]
use crate::fs;
#[cfg(all(target_arch = "x86", target_os = "none"))]
use crate::process::{self, Pid};

/// Maximum filename bytes in a command.
pub const NAME_MAX: usize = 32;

/// Maximum argument-string bytes (excluding the terminator).
pub const ARGS_MAX: usize = crate::process::ARG_LEN - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    EmptyCommand,
    NameTooLong,
    ArgsTooLong,
    NotFound,
    NotExecutable,
    OutOfPids,
    NoFilesystem,
}

/// A parsed command line: the program name and the argument remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    name: [u8; NAME_MAX],
    name_len: usize,
    args: [u8; ARGS_MAX],
    args_len: usize,
}

impl Command {
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }
}

/// Split a command into its first token (the program name, at most 32
/// bytes) and the remainder after the separating spaces (the argument
/// string, at most 127 bytes).
pub fn parse_command(command: &[u8]) -> Result<Command, ExecError> {
    // The command is conventionally NUL-terminated; stop there.
    let command = match command.iter().position(|&b| b == 0) {
        Some(end) => &command[..end],
        None => command,
    };

    let mut at = 0;
    while at < command.len() && command[at] == b' ' {
        at += 1;
    }
    if at == command.len() {
        return Err(ExecError::EmptyCommand);
    }

    let mut name = [0u8; NAME_MAX];
    let mut name_len = 0;
    while at < command.len() && command[at] != b' ' {
        if name_len >= NAME_MAX {
            return Err(ExecError::NameTooLong);
        }
        name[name_len] = command[at];
        name_len += 1;
        at += 1;
    }

    while at < command.len() && command[at] == b' ' {
        at += 1;
    }
    let rest = &command[at..];
    if rest.len() > ARGS_MAX {
        return Err(ExecError::ArgsTooLong);
    }
    let mut args = [0u8; ARGS_MAX];
    args[..rest.len()].copy_from_slice(rest);

    Ok(Command {
        name,
        name_len,
        args,
        args_len: rest.len(),
    })
}

/// Validate a command, allocate a process for it, and initialize its
/// PCB and schedule slot. Returns `(pid, inode, entry point)`. Runs
/// with interrupts disabled.
#[cfg(all(target_arch = "x86", target_os = "none"))]
fn prepare(command: &[u8]) -> Result<(Pid, u32, u32), ExecError> {
    let parsed = parse_command(command)?;
    let fs = fs::image().ok_or(ExecError::NoFilesystem)?;
    let entry = fs
        .dentry_by_name(parsed.name())
        .ok_or(ExecError::NotFound)?;

    let mut header = [0u8; crate::elf::HEADER_LEN];
    match fs.read_data(entry.inode, 0, &mut header) {
        Ok(n) if n == header.len() => {}
        _ => return Err(ExecError::NotExecutable),
    }
    let entry_point = crate::elf::entry_point(&header).ok_or(ExecError::NotExecutable)?;

    let Some(pid) = process::alloc_pid() else {
        crate::println!("maximum process count reached");
        return Err(ExecError::OutOfPids);
    };
    let parent = if process::is_base_shell(pid) {
        None
    } else {
        Some(process::current_pid())
    };
    crate::sched::assign_slot(pid, parent);

    // SAFETY: The pid was just allocated; no other reference to this
    // PCB exists yet.
    let pcb = unsafe { process::pcb_mut(pid) };
    *pcb = process::Pcb::fresh(pid, parent);
    pcb.set_args(parsed.args());

    log::debug!(
        "execute pid {} image {:?}",
        pid,
        core::str::from_utf8(parsed.name()).ok()
    );
    Ok((pid, entry.inode, entry_point))
}

/// The `execute` system call (also used by the kernel to start the
/// base shells). Returns the child's exit status once the child halts,
/// or -1 on a malformed command, a missing or non-executable file, or
/// pid exhaustion.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn execute(command: &[u8]) -> i32 {
    // SAFETY: Pointer and length come from a live slice.
    unsafe { execute_raw(command.as_ptr(), command.len()) }
}

/// Callee-saved-preserving entry to `execute_inner`.
///
/// The child's `halt` unwinds straight out of `execute_inner`, skipping
/// its epilogue, so EBX/ESI/EDI are saved here, outside the abandoned
/// frames, and restored after the unwind returns through the `call`
/// below. EBP is restored by the unwind itself.
///
/// # Safety
///
/// `ptr`/`len` must describe a readable command string.
#[cfg(all(target_arch = "x86", target_os = "none"))]
#[unsafe(naked)]
unsafe extern "C" fn execute_raw(ptr: *const u8, len: usize) -> i32 {
    core::arch::naked_asm!(
        "push ebx",
        "push esi",
        "push edi",
        "push dword ptr [esp + 20]", // len
        "push dword ptr [esp + 20]", // ptr (esp moved by the push above)
        "call {inner}",
        "add esp, 8",
        "pop edi",
        "pop esi",
        "pop ebx",
        "ret",
        inner = sym execute_inner,
    );
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[inline(never)]
extern "C" fn execute_inner(ptr: *const u8, len: usize) -> i32 {
    use crate::arch::x86::{gdt, usermode};
    use crate::mm::layout::{kernel_stack_top, USER_IMAGE, USER_STACK_TOP};
    use crate::mm::paging;

    // SAFETY: execute() passes a live slice through execute_raw.
    let command = unsafe { core::slice::from_raw_parts(ptr, len) };

    // Everything from pid allocation to the iret must not interleave
    // with a scheduler tick: the schedule slot points at the child
    // before its kernel context exists. The iret frame re-enables
    // interrupts for user mode.
    let were_enabled = crate::arch::interrupts_enabled();
    crate::arch::disable_interrupts();

    let (pid, inode, entry_point) = match prepare(command) {
        Ok(prepared) => prepared,
        Err(err) => {
            log::warn!("execute failed: {:?}", err);
            if were_enabled {
                crate::arch::enable_interrupts();
            }
            return -1;
        }
    };

    // SAFETY: Interrupts are disabled for the directory rewrite.
    unsafe { paging::map_user_slot(pid) };

    // SAFETY: The user page for `pid` was just mapped; the image window
    // lies entirely inside it.
    let image = unsafe {
        core::slice::from_raw_parts_mut(
            USER_IMAGE as usize as *mut u8,
            (USER_STACK_TOP - USER_IMAGE) as usize,
        )
    };
    if let Some(fs) = fs::image() {
        let _ = fs.read_data(inode, 0, image);
    }

    gdt::set_kernel_stack(kernel_stack_top(pid));

    // Capture the unwind target for halt: this frame, at this point.
    // SAFETY: The pid's PCB was initialized in prepare; this is the
    // only live reference.
    let pcb = unsafe { process::pcb_mut(pid) };
    pcb.saved_ebp = usermode::frame_pointer();
    pcb.saved_esp = usermode::stack_pointer();

    // SAFETY: Image loaded at USER_IMAGE inside the mapped user page;
    // the initial user stack pointer is the canonical top-of-stack.
    unsafe { usermode::enter_user(entry_point, USER_STACK_TOP - 4) }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn execute(_command: &[u8]) -> i32 {
    -1
}

/// The `halt` system call and the exception/KILL path.
///
/// Status 1 is the distinguished exception status and surfaces as 256
/// at the parent's `execute`; everything else passes through.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn halt_process(status: u8) -> ! {
    use crate::arch::x86::{gdt, usermode};
    use crate::mm::layout::kernel_stack_top;
    use crate::mm::paging;

    crate::println!();

    let ret: i32 = if status == 1 { 256 } else { status as i32 };

    // The schedule slot flips to the parent before the parent's kernel
    // context is restored; keep the tick out until the unwind lands.
    // The interrupt flag comes back with the parent's iret frame.
    crate::arch::disable_interrupts();

    // SAFETY: Teardown path; the only PCB reference in use.
    let pcb = unsafe { process::current_pcb() };
    process::free_pid(pcb.pid);

    if process::is_base_shell(pcb.pid) {
        crate::println!("cannot exit the base shell; restarting it");
        execute(b"shell");
        panic!("unable to respawn the base shell");
    }

    for fd in pcb.fds.iter_mut() {
        if fd.in_use {
            fd.in_use = false;
            let close = fd.ops.close;
            let _ = close(fd);
        }
    }

    crate::sched::replace_slots(pcb.pid, pcb.parent);

    let parent = pcb.parent.unwrap_or(0);
    // SAFETY: Interrupts are disabled for the directory rewrite.
    unsafe { paging::map_user_slot(parent) };
    gdt::set_kernel_stack(kernel_stack_top(parent));

    // SAFETY: The saved pair was captured by execute_inner on the
    // parent's kernel stack with frame pointers forced.
    unsafe { usermode::unwind_to(pcb.saved_esp, pcb.saved_ebp, ret) }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn halt_process(_status: u8) -> ! {
    panic!("halt_process on a hosted target");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_split_into_name_and_args() {
        let cmd = parse_command(b"cat frame0.txt").expect("parses");
        assert_eq!(cmd.name(), b"cat");
        assert_eq!(cmd.args(), b"frame0.txt");

        let cmd = parse_command(b"  shell  ").expect("parses");
        assert_eq!(cmd.name(), b"shell");
        assert_eq!(cmd.args(), b"");

        let cmd = parse_command(b"grep   a b c\0trailing").expect("parses");
        assert_eq!(cmd.name(), b"grep");
        assert_eq!(cmd.args(), b"a b c");
    }

    #[test]
    fn empty_and_oversized_commands_fail() {
        assert_eq!(parse_command(b""), Err(ExecError::EmptyCommand));
        assert_eq!(parse_command(b"    "), Err(ExecError::EmptyCommand));
        assert_eq!(parse_command(b"\0ls"), Err(ExecError::EmptyCommand));

        let long_name = [b'x'; 33];
        assert_eq!(parse_command(&long_name), Err(ExecError::NameTooLong));

        let mut long_args = std::vec![b'a'; 140];
        long_args[0] = b'p';
        long_args[1] = b' ';
        assert_eq!(parse_command(&long_args), Err(ExecError::ArgsTooLong));
    }

    #[test]
    fn name_at_the_cap_is_accepted() {
        let mut cmd = std::vec![b'n'; 32];
        cmd.push(b' ');
        cmd.push(b'z');
        let parsed = parse_command(&cmd).expect("parses");
        assert_eq!(parsed.name().len(), 32);
        assert_eq!(parsed.args(), b"z");
    }
}
