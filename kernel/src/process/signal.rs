//! Signals.
//!
//! Five signal numbers with per-process actions. Delivery happens on
//! every return to user mode: the lowest-numbered pending, unmasked
//! signal either takes its default action (KILL terminates the process
//! with the exception status, IGNORE just clears the flag) or diverts
//! the user thread into its handler by rewriting the saved user stack:
//! the hardware context is copied out, a tiny `sigreturn` trampoline is
//! pushed, and the saved instruction pointer is pointed at the handler.
//! `sigreturn` copies the context back and unmasks everything.

use crate::arch::{TrapFrame, TRAP_FRAME_SIZE};
use crate::mm::layout::user_range_ok;
use crate::process::{Pcb, Pid};

pub const SIG_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Signal {
    /// Divide error in user mode.
    DivZero = 0,
    /// Any other user-mode exception.
    Segfault = 1,
    /// Ctrl+C on the owning terminal.
    Interrupt = 2,
    /// Periodic wall-clock alarm.
    Alarm = 3,
    /// User-defined.
    User1 = 4,
}

/// What happens when a signal is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Terminate the process; the parent's `execute` sees 256.
    Kill,
    /// Clear the flag and move on.
    Ignore,
    /// Jump to a user handler at this address.
    Handler(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigAction {
    pub disposition: Disposition,
    pub pending: bool,
    pub masked: bool,
}

/// KILL for signals 0..=2, IGNORE for 3..=4.
pub fn default_disposition(signum: usize) -> Disposition {
    if signum < 3 {
        Disposition::Kill
    } else {
        Disposition::Ignore
    }
}

pub fn default_table() -> [SigAction; SIG_COUNT] {
    let mut table = [SigAction {
        disposition: Disposition::Ignore,
        pending: false,
        masked: false,
    }; SIG_COUNT];
    for (signum, action) in table.iter_mut().enumerate() {
        action.disposition = default_disposition(signum);
    }
    table
}

/// Install a user handler, or restore the default when `handler` is
/// null. Fails for signal numbers outside 0..=4.
pub fn set_handler(pcb: &mut Pcb, signum: i32, handler: u32) -> Result<(), ()> {
    if !(0..SIG_COUNT as i32).contains(&signum) {
        return Err(());
    }
    let signum = signum as usize;
    pcb.signals[signum].disposition = if handler == 0 {
        default_disposition(signum)
    } else {
        Disposition::Handler(handler)
    };
    Ok(())
}

/// Mark a signal pending on a process.
pub fn raise(pid: Pid, signal: Signal) {
    if pid >= crate::mm::layout::MAX_PROCESSES {
        return;
    }
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    // SAFETY: Raising only touches the pending flag; callers run either
    // in interrupt context or with interrupts disabled, so the write
    // cannot race delivery on this single-CPU kernel.
    unsafe {
        crate::process::pcb_mut(pid).signals[signal as usize].pending = true;
    }
    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    let _ = signal;
}

/// Mark a signal pending on the running process.
pub fn raise_current(signal: Signal) {
    raise(crate::process::current_pid(), signal);
}

/// The lowest-numbered pending, unmasked signal.
fn lowest_deliverable(signals: &[SigAction; SIG_COUNT]) -> Option<usize> {
    signals
        .iter()
        .position(|action| action.pending && !action.masked)
}

/// `sigreturn` trampoline pushed onto the user stack:
/// `mov eax, 10; int 0x80` (padded to 8 bytes).
const TRAMPOLINE: [u8; 8] = [0xB8, 0x0A, 0x00, 0x00, 0x00, 0xCD, 0x80, 0x90];

/// Deliver the next pending signal, if any, on the way back to user
/// mode. Called from the trap dispatcher when the interrupted context
/// was ring 3.
pub fn deliver_pending(frame: &mut TrapFrame) {
    // SAFETY: Single reference; delivery runs at the end of trap
    // handling with no other PCB borrow alive.
    let pcb = unsafe { crate::process::current_pcb() };
    let Some(signum) = lowest_deliverable(&pcb.signals) else {
        return;
    };
    pcb.signals[signum].pending = false;

    match pcb.signals[signum].disposition {
        Disposition::Ignore => {}
        Disposition::Kill => {
            crate::process::lifecycle::halt_process(1);
        }
        Disposition::Handler(handler) => {
            if !push_handler_frame(frame, signum as u32, handler) {
                // An unwritable user stack cannot take a handler;
                // fall back to killing the process.
                crate::process::lifecycle::halt_process(1);
            }
            // Block further delivery until sigreturn.
            for action in pcb.signals.iter_mut() {
                action.masked = true;
            }
        }
    }
}

/// Rewrite the saved user stack for handler entry:
///
/// ```text
/// higher | trampoline code (8 bytes)
///        | saved hardware context (the whole TrapFrame)
///        | signal number
/// lower  | return address -> trampoline     <- new user ESP
/// ```
///
/// The saved EIP becomes the handler; the handler's `ret` lands in the
/// trampoline, which issues `sigreturn`.
fn push_handler_frame(frame: &mut TrapFrame, signum: u32, handler: u32) -> bool {
    let total = (TRAMPOLINE.len() + TRAP_FRAME_SIZE + 8) as u32;
    let mut sp = frame.user_esp;

    sp = sp.wrapping_sub(TRAMPOLINE.len() as u32);
    let trampoline_addr = sp;
    sp = sp.wrapping_sub(TRAP_FRAME_SIZE as u32);
    let context_addr = sp;
    sp = sp.wrapping_sub(4);
    let signum_addr = sp;
    sp = sp.wrapping_sub(4);
    let ret_addr_slot = sp;

    if ret_addr_slot >= frame.user_esp || !user_range_ok(ret_addr_slot, total) {
        return false;
    }

    #[cfg(all(target_arch = "x86", target_os = "none"))]
    // SAFETY: The range was validated against the user window and the
    // user page of the running process is mapped while its trap is
    // handled.
    unsafe {
        core::ptr::copy_nonoverlapping(
            TRAMPOLINE.as_ptr(),
            trampoline_addr as usize as *mut u8,
            TRAMPOLINE.len(),
        );
        core::ptr::write(context_addr as usize as *mut TrapFrame, *frame);
        core::ptr::write(signum_addr as usize as *mut u32, signum);
        core::ptr::write(ret_addr_slot as usize as *mut u32, trampoline_addr);
    }
    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    let _ = (trampoline_addr, context_addr, signum_addr, signum);

    frame.user_esp = ret_addr_slot;
    frame.eip = handler;
    true
}

/// The `sigreturn` system call: copy the hardware context the kernel
/// pushed onto the user stack back into the kernel trap frame and
/// unmask every signal. Returns the restored EAX so the dispatcher's
/// return-value write is a no-op.
pub fn sigreturn(frame: &mut TrapFrame) -> i32 {
    // The trampoline executes with the user stack pointing at the
    // signal number; the saved context sits just above it.
    let context_addr = frame.user_esp + 4;
    if !user_range_ok(context_addr, TRAP_FRAME_SIZE as u32) {
        return -1;
    }

    #[cfg(all(target_arch = "x86", target_os = "none"))]
    // SAFETY: Range-checked read of the context this kernel previously
    // wrote to the user stack.
    unsafe {
        *frame = core::ptr::read(context_addr as usize as *const TrapFrame);
    }

    // SAFETY: Single live PCB reference at this point.
    let pcb = unsafe { crate::process::current_pcb() };
    for action in pcb.signals.iter_mut() {
        action.masked = false;
    }
    frame.eax as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_kill_low_and_ignore_high() {
        let table = default_table();
        for signum in 0..3 {
            assert_eq!(table[signum].disposition, Disposition::Kill);
        }
        for signum in 3..SIG_COUNT {
            assert_eq!(table[signum].disposition, Disposition::Ignore);
        }
        assert!(table.iter().all(|a| !a.pending && !a.masked));
    }

    #[test]
    fn set_handler_roundtrip_restores_the_default() {
        let mut pcb = Pcb::fresh(3, Some(0));
        assert!(set_handler(&mut pcb, 2, 0x0804_9000).is_ok());
        assert_eq!(
            pcb.signals[2].disposition,
            Disposition::Handler(0x0804_9000)
        );
        assert!(set_handler(&mut pcb, 2, 0).is_ok());
        assert_eq!(pcb.signals[2].disposition, Disposition::Kill);

        assert!(set_handler(&mut pcb, 4, 0).is_ok());
        assert_eq!(pcb.signals[4].disposition, Disposition::Ignore);

        assert!(set_handler(&mut pcb, 5, 0).is_err());
        assert!(set_handler(&mut pcb, -1, 0).is_err());
    }

    #[test]
    fn delivery_order_is_lowest_pending_unmasked() {
        let mut signals = default_table();
        assert_eq!(lowest_deliverable(&signals), None);

        signals[3].pending = true;
        signals[1].pending = true;
        assert_eq!(lowest_deliverable(&signals), Some(1));

        signals[1].masked = true;
        assert_eq!(lowest_deliverable(&signals), Some(3));

        signals[3].masked = true;
        assert_eq!(lowest_deliverable(&signals), None);
    }

    #[test]
    fn trampoline_is_sigreturn_int80() {
        // mov eax, imm32 with the sigreturn number, then int 0x80.
        assert_eq!(TRAMPOLINE[0], 0xB8);
        assert_eq!(
            u32::from_le_bytes([TRAMPOLINE[1], TRAMPOLINE[2], TRAMPOLINE[3], TRAMPOLINE[4]]),
            10
        );
        assert_eq!(&TRAMPOLINE[5..7], &[0xCD, 0x80]);
    }
}
