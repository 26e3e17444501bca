//! Bare-metal kernel binary.
//!
//! The multiboot entry point and everything after it live in the
//! library; this binary contributes the panic handler and pulls the
//! kernel in for linking.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
use triplex_kernel as _;

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    triplex_kernel::println!("kernel panic: {}", info);
    log::error!("kernel panic: {}", info);
    triplex_kernel::arch::halt_loop();
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("triplex-kernel only runs on the bare-metal i686 target");
}
