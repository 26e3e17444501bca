//! Interrupt Descriptor Table.
//!
//! 256 gates: the CPU exceptions at 0x00..=0x13, the sixteen hardware
//! lines behind the remapped PIC at 0x20..=0x2F, and the system-call
//! trap gate at 0x80. Everything runs through interrupt gates with
//! DPL 0 except the system-call gate, which is a trap gate reachable
//! from ring 3.

use lazy_static::lazy_static;
use x86::dtables::{lidt, DescriptorTablePointer};

use super::entry::{EXCEPTION_STUBS, IRQ_STUBS, SYSCALL_STUB};
use super::gdt::KERNEL_CS;
use crate::arch::TrapFrame;
use crate::process::signal::{self, Signal};

/// Vector of the system-call trap gate.
pub const SYSCALL_VECTOR: usize = 0x80;

/// Base vector of the remapped primary PIC.
pub const IRQ_BASE: usize = 0x20;

#[derive(Debug, Clone, Copy)]
#[repr(C)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn gate(handler: extern "C" fn(), type_attr: u8) -> Self {
        let offset = handler as usize as u32;
        Self {
            offset_low: offset as u16,
            selector: KERNEL_CS,
            zero: 0,
            type_attr,
            offset_high: (offset >> 16) as u16,
        }
    }

    /// Present 32-bit interrupt gate, DPL 0.
    fn interrupt_gate(handler: extern "C" fn()) -> Self {
        Self::gate(handler, 0x8E)
    }

    /// Present 32-bit trap gate, DPL 3 (reachable via `int` from user
    /// mode; does not clear IF on entry).
    fn user_trap_gate(handler: extern "C" fn()) -> Self {
        Self::gate(handler, 0xEF)
    }
}

lazy_static! {
    static ref IDT: [IdtEntry; 256] = {
        let mut idt = [IdtEntry::missing(); 256];
        for (vector, &stub) in EXCEPTION_STUBS.iter().enumerate() {
            idt[vector] = IdtEntry::interrupt_gate(stub);
        }
        for (line, &stub) in IRQ_STUBS.iter().enumerate() {
            idt[IRQ_BASE + line] = IdtEntry::interrupt_gate(stub);
        }
        idt[SYSCALL_VECTOR] = IdtEntry::user_trap_gate(SYSCALL_STUB);
        idt
    };
}

/// Load the IDT.
pub fn init() {
    // SAFETY: The table is a static with a stable address and every
    // present gate points at a trampoline defined in this crate.
    unsafe {
        let ptr = DescriptorTablePointer::new(&*IDT);
        lidt(&ptr);
    }
}

static EXCEPTION_NAMES: [&str; 20] = [
    "divide error",
    "debug",
    "non-maskable interrupt",
    "breakpoint",
    "overflow",
    "bound range exceeded",
    "invalid opcode",
    "device not available",
    "double fault",
    "coprocessor segment overrun",
    "invalid TSS",
    "segment not present",
    "stack-segment fault",
    "general protection fault",
    "page fault",
    "reserved",
    "x87 floating-point error",
    "alignment check",
    "machine check",
    "SIMD floating-point error",
];

/// Print a diagnostic for a CPU exception and dispose of the faulting
/// context: a user-mode fault raises the matching signal (killing the
/// process by default), a kernel-mode fault halts the current process
/// outright.
pub fn handle_exception(frame: &mut TrapFrame) {
    let name = EXCEPTION_NAMES
        .get(frame.vector as usize)
        .copied()
        .unwrap_or("unknown");
    crate::println!("exception {}: {} (eip={:#x})", frame.vector, name, frame.eip);

    if frame.vector == 0x0E {
        let cr2: u32;
        // SAFETY: Reading CR2 is side-effect free and valid in ring 0.
        unsafe {
            core::arch::asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack));
        }
        crate::println!("  faulting address: {:#x}", cr2);
    }
    log::error!(
        "exception {} ({}) at {:#x}, error code {:#x}",
        frame.vector,
        name,
        frame.eip,
        frame.error_code
    );

    if frame.from_user() {
        let signal = if frame.vector == 0 {
            Signal::DivZero
        } else {
            Signal::Segfault
        };
        signal::raise_current(signal);
    } else {
        // A fault inside the kernel cannot be delivered as a signal;
        // kill the process it happened on behalf of.
        crate::process::lifecycle::halt_process(1);
    }
}
