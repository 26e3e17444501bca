//! Programmable interval timer.
//!
//! Channel 0 is programmed as a rate generator at 100 Hz; every tick
//! drives the scheduler and the coarse wall-clock counters.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::outb;

const COMMAND_PORT: u16 = 0x43;
const CHANNEL0_PORT: u16 = 0x40;

/// Channel 0, lobyte/hibyte access, mode 3 (square wave).
const MODE: u8 = 0x36;

/// 1.193182 MHz / 11932 = 100.0 Hz.
const DIVISOR: u16 = 0x2E9C;

/// Scheduler quantum frequency.
pub const TICK_HZ: u32 = 100;

static TICKS: AtomicU32 = AtomicU32::new(0);

/// Ticks since boot.
pub fn ticks() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

/// Program the periodic tick and unmask IRQ 0.
pub fn init() {
    // SAFETY: The mode byte and low/high divisor writes are the defined
    // programming sequence for PIT channel 0.
    unsafe {
        outb(COMMAND_PORT, MODE);
        outb(CHANNEL0_PORT, (DIVISOR & 0xFF) as u8);
        outb(CHANNEL0_PORT, (DIVISOR >> 8) as u8);
    }
    super::pic::enable_line(0);
    log::info!("PIT programmed for {} Hz", TICK_HZ);
}

/// IRQ 0 body: count the tick and hand the CPU to the scheduler.
/// The EOI has already been sent by the dispatcher.
pub fn handle_tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    crate::sched::timer_tick();
}
