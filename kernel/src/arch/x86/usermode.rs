//! Privilege transitions.
//!
//! `enter_user` performs the downward iret into a fresh user context;
//! `unwind_to` is the matching upward teleport used by `halt`, landing
//! back at the `execute` call site whose frame was captured when the
//! process was created.

use super::gdt::{USER_CS, USER_DS};

/// Current stack pointer.
#[inline(always)]
pub fn stack_pointer() -> u32 {
    let esp: u32;
    // SAFETY: Reading ESP has no side effects.
    unsafe {
        core::arch::asm!("mov {}, esp", out(reg) esp, options(nomem, nostack, preserves_flags));
    }
    esp
}

/// Current frame pointer. Meaningful because the build target forces
/// frame pointers.
#[inline(always)]
pub fn frame_pointer() -> u32 {
    let ebp: u32;
    // SAFETY: Reading EBP has no side effects.
    unsafe {
        core::arch::asm!("mov {}, ebp", out(reg) ebp, options(nomem, nostack, preserves_flags));
    }
    ebp
}

/// Drop to ring 3 at `entry` with the user stack at `user_esp`.
///
/// Builds the five-element iret frame (user SS, ESP, EFLAGS with IF
/// set, user CS, EIP), loads the user data selectors, and irets.
///
/// # Safety
///
/// The user page for the running process must be mapped and `entry`
/// must point at its loaded image.
pub unsafe fn enter_user(entry: u32, user_esp: u32) -> ! {
    // SAFETY: The caller guarantees a valid user mapping; the segment
    // selectors are the ring-3 descriptors installed by gdt::init. IF
    // is set in the pushed EFLAGS so the tick keeps running in user
    // mode.
    unsafe {
        core::arch::asm!(
            "push {uds}",
            "push {usp}",
            "pushfd",
            "or dword ptr [esp], 0x200",
            "push {ucs}",
            "push {eip}",
            "mov ax, {uds}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "iretd",
            uds = const USER_DS as u32,
            ucs = const USER_CS as u32,
            usp = in(reg) user_esp,
            eip = in(reg) entry,
            options(noreturn),
        );
    }
}

/// Unwind the kernel stack to the `execute` frame captured in the PCB,
/// making that `execute` return `status`.
///
/// # Safety
///
/// `esp`/`ebp` must be the pair captured by `execute` on this
/// process's parent chain; the frames between are abandoned.
pub unsafe fn unwind_to(esp: u32, ebp: u32, status: i32) -> ! {
    // SAFETY: The caller passes a frame captured with frame pointers
    // forced, so `leave; ret` returns out of the captured function with
    // EAX as its return value.
    unsafe {
        core::arch::asm!(
            "mov esp, {esp}",
            "mov ebp, {ebp}",
            "leave",
            "ret",
            esp = in(reg) esp,
            ebp = in(reg) ebp,
            in("eax") status,
            options(noreturn),
        );
    }
}
