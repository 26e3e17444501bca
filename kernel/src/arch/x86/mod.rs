//! 32-bit x86 support: boot handoff, descriptor tables, interrupt
//! plumbing, the legacy device set, and the privilege-transition
//! primitives.

pub mod boot;
pub mod context;
pub mod entry;
pub mod gdt;
pub mod idt;
pub mod pic;
pub mod pit;
pub mod rtc;
pub mod usermode;

/// Bring up the CPU-side tables and the interrupt controller, leaving
/// every IRQ line masked.
pub fn init() {
    // SAFETY: Interrupts must stay off until the IDT and PIC are
    // programmed; nothing has enabled them yet at this point.
    unsafe { ::x86::irq::disable() };

    gdt::init();
    log::info!("GDT and TSS loaded");

    idt::init();
    log::info!("IDT loaded");

    pic::init();
    log::info!("PIC remapped, all lines masked");
}
