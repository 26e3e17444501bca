//! Kernel bring-up.
//!
//! Runs on the boot stack with interrupts off: install the descriptor
//! tables and the interrupt controller, turn paging on, adopt the
//! filesystem image from the bootloader, ready the terminals and the
//! legacy devices, and finally start terminal 0's shell. The scheduler
//! launches the other two shells on its first rotations. Control never
//! returns here.

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn kernel_main(info: *const crate::arch::x86::boot::MultibootInfo) -> ! {
    use crate::arch::x86::boot;

    crate::serial::init();
    crate::klog::init();
    log::info!("triplex kernel {} booting", env!("CARGO_PKG_VERSION"));

    crate::arch::x86::init();

    crate::mm::paging::init();
    log::info!("paging enabled (4 MiB kernel page, low video table)");

    // SAFETY: The multiboot info pointer comes straight from the
    // bootloader handoff.
    // The image must sit between the kernel image and the process
    // stack region at the top of the kernel page.
    let stacks_bottom =
        crate::mm::layout::pcb_base(crate::mm::layout::MAX_PROCESSES - 1);
    match unsafe { boot::first_module(info) } {
        Some((start, end)) if end > start && end <= stacks_bottom => {
            // SAFETY: The bootloader placed the module at [start, end);
            // the kernel owns it from here on and never writes it.
            let image = unsafe {
                core::slice::from_raw_parts(start as usize as *const u8, (end - start) as usize)
            };
            if crate::fs::init(image).is_err() {
                log::error!("boot module is not a valid filesystem image");
            }
        }
        _ => log::error!("bootloader supplied no filesystem module"),
    }

    crate::tty::init();
    crate::tty::realias_for_running();

    crate::drivers::keyboard::init();
    crate::arch::x86::rtc::init();
    crate::arch::x86::pit::init();

    crate::println!("triplex: three terminals ready (alt+F1..F3)");

    // Interrupts stay off until the first iret: the shell's user-mode
    // EFLAGS carries IF, and the scheduler then finds a real process
    // stack under every tick.
    crate::process::lifecycle::execute(b"shell");
    panic!("unable to start the base shell");
}
