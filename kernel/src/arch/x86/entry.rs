//! Trap trampolines.
//!
//! Every IDT vector lands on a naked stub that normalizes the stack
//! into a [`TrapFrame`](crate::arch::TrapFrame): a dummy error code
//! where the CPU did not push one, the vector number, the segment
//! registers, and the general registers. A single dispatcher routes
//! exceptions, hardware interrupts, and the system-call gate, and
//! pending signals are delivered on the way back to user mode.

use crate::arch::x86::pic;
use crate::arch::TrapFrame;

use super::gdt::KERNEL_DS;

/// Common save/dispatch/restore path. Jumped to by every stub after it
/// has pushed `error_code` and `vector`.
#[unsafe(naked)]
extern "C" fn trap_common() {
    core::arch::naked_asm!(
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "pushad",
        "mov ax, {kds}",
        "mov ds, ax",
        "mov es, ax",
        "mov eax, esp",
        "push eax",
        "call {dispatch}",
        "add esp, 4",
        "popad",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "add esp, 8",
        "iretd",
        kds = const KERNEL_DS as u32,
        dispatch = sym trap_dispatch,
    );
}

macro_rules! stub {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            core::arch::naked_asm!(
                "push 0",
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym trap_common,
            );
        }
    };
}

macro_rules! stub_with_error_code {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            core::arch::naked_asm!(
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym trap_common,
            );
        }
    };
}

stub!(exc_divide_error, 0x00);
stub!(exc_debug, 0x01);
stub!(exc_nmi, 0x02);
stub!(exc_breakpoint, 0x03);
stub!(exc_overflow, 0x04);
stub!(exc_bound_range, 0x05);
stub!(exc_invalid_opcode, 0x06);
stub!(exc_device_not_available, 0x07);
stub_with_error_code!(exc_double_fault, 0x08);
stub!(exc_coprocessor_overrun, 0x09);
stub_with_error_code!(exc_invalid_tss, 0x0A);
stub_with_error_code!(exc_segment_not_present, 0x0B);
stub_with_error_code!(exc_stack_fault, 0x0C);
stub_with_error_code!(exc_general_protection, 0x0D);
stub_with_error_code!(exc_page_fault, 0x0E);
stub!(exc_reserved, 0x0F);
stub!(exc_fpu_error, 0x10);
stub_with_error_code!(exc_alignment_check, 0x11);
stub!(exc_machine_check, 0x12);
stub!(exc_simd_error, 0x13);

stub!(irq_0, 0x20);
stub!(irq_1, 0x21);
stub!(irq_2, 0x22);
stub!(irq_3, 0x23);
stub!(irq_4, 0x24);
stub!(irq_5, 0x25);
stub!(irq_6, 0x26);
stub!(irq_7, 0x27);
stub!(irq_8, 0x28);
stub!(irq_9, 0x29);
stub!(irq_10, 0x2A);
stub!(irq_11, 0x2B);
stub!(irq_12, 0x2C);
stub!(irq_13, 0x2D);
stub!(irq_14, 0x2E);
stub!(irq_15, 0x2F);

stub!(syscall_gate, 0x80);

/// Exception stubs for vectors 0x00..=0x13, in vector order.
pub static EXCEPTION_STUBS: [extern "C" fn(); 20] = [
    exc_divide_error,
    exc_debug,
    exc_nmi,
    exc_breakpoint,
    exc_overflow,
    exc_bound_range,
    exc_invalid_opcode,
    exc_device_not_available,
    exc_double_fault,
    exc_coprocessor_overrun,
    exc_invalid_tss,
    exc_segment_not_present,
    exc_stack_fault,
    exc_general_protection,
    exc_page_fault,
    exc_reserved,
    exc_fpu_error,
    exc_alignment_check,
    exc_machine_check,
    exc_simd_error,
];

/// IRQ stubs for vectors 0x20..=0x2F, in line order.
pub static IRQ_STUBS: [extern "C" fn(); 16] = [
    irq_0, irq_1, irq_2, irq_3, irq_4, irq_5, irq_6, irq_7, irq_8, irq_9, irq_10, irq_11,
    irq_12, irq_13, irq_14, irq_15,
];

/// The `int 0x80` system-call stub.
pub static SYSCALL_STUB: extern "C" fn() = syscall_gate;

/// High-level trap routing. Called from `trap_common` with a pointer to
/// the frame it built on the current kernel stack.
extern "C" fn trap_dispatch(frame: *mut TrapFrame) {
    // SAFETY: trap_common passes the address of the register save area
    // it just pushed on this stack; it stays alive until the trampoline
    // pops it after this function returns.
    let frame = unsafe { &mut *frame };

    match frame.vector {
        0x00..=0x13 => super::idt::handle_exception(frame),
        0x20 => {
            pic::end_of_interrupt(0);
            super::pit::handle_tick();
        }
        0x21 => {
            pic::end_of_interrupt(1);
            crate::drivers::keyboard::handle_interrupt();
        }
        0x28 => {
            pic::end_of_interrupt(8);
            super::rtc::handle_interrupt();
        }
        // Unexpected lines: acknowledge and drop.
        0x22..=0x2F => pic::end_of_interrupt((frame.vector - 0x20) as u8),
        0x80 => {
            let ret = crate::syscall::dispatch(frame);
            frame.eax = ret as u32;
        }
        _ => {}
    }

    if frame.from_user() {
        crate::process::signal::deliver_pending(frame);
    }
}
