//! Cascaded 8259 interrupt controllers.
//!
//! The primary controller sits at ports 0x20/0x21, the secondary at
//! 0xA0/0xA1, cascaded through line 2. Initialization masks every
//! line, then runs the ICW1..ICW4 sequence remapping the vectors to
//! 0x20/0x28 in 8086 mode. End-of-interrupt uses the specific-EOI form
//! (0x60 | line), with the extra cascade EOI on the primary when the
//! secondary was the source.

use spin::Mutex;

use crate::arch::{inb, outb};

const PRIMARY_COMMAND: u16 = 0x20;
const PRIMARY_DATA: u16 = 0x21;
const SECONDARY_COMMAND: u16 = 0xA0;
const SECONDARY_DATA: u16 = 0xA1;

/// ICW1: edge-triggered, cascade, expect ICW4.
const ICW1: u8 = 0x11;
/// ICW2: vector offsets.
const ICW2_PRIMARY: u8 = 0x20;
const ICW2_SECONDARY: u8 = 0x28;
/// ICW3: the secondary hangs off line 2.
const ICW3_PRIMARY: u8 = 0x04;
const ICW3_SECONDARY: u8 = 0x02;
/// ICW4: 8086 mode.
const ICW4: u8 = 0x01;

/// Specific end-of-interrupt command base.
const EOI: u8 = 0x60;

/// Cascade line on the primary controller.
const CASCADE_LINE: u8 = 2;

struct MaskState {
    primary: u8,
    secondary: u8,
}

static MASKS: Mutex<MaskState> = Mutex::new(MaskState {
    primary: 0xFF,
    secondary: 0xFF,
});

/// Remap and mask both controllers, then open the cascade line.
pub fn init() {
    // SAFETY: The ICW sequence below is the architectural init protocol
    // for the 8259 pair; interrupts are disabled during early boot so
    // no line fires while the controllers are half-programmed.
    unsafe {
        outb(PRIMARY_DATA, 0xFF);
        outb(SECONDARY_DATA, 0xFF);

        outb(PRIMARY_COMMAND, ICW1);
        outb(SECONDARY_COMMAND, ICW1);
        outb(PRIMARY_DATA, ICW2_PRIMARY);
        outb(SECONDARY_DATA, ICW2_SECONDARY);
        outb(PRIMARY_DATA, ICW3_PRIMARY);
        outb(SECONDARY_DATA, ICW3_SECONDARY);
        outb(PRIMARY_DATA, ICW4);
        outb(SECONDARY_DATA, ICW4);
    }
    enable_line(CASCADE_LINE);
}

/// Unmask an IRQ line (0..=15).
pub fn enable_line(line: u8) {
    if line > 15 {
        return;
    }
    let mut masks = MASKS.lock();
    // SAFETY: Writing the in-memory mask back to the owning
    // controller's data port is the defined mask protocol.
    unsafe {
        if line < 8 {
            masks.primary &= !(1 << line);
            outb(PRIMARY_DATA, masks.primary);
        } else {
            masks.secondary &= !(1 << (line - 8));
            outb(SECONDARY_DATA, masks.secondary);
        }
    }
}

/// Mask an IRQ line (0..=15).
pub fn disable_line(line: u8) {
    if line > 15 {
        return;
    }
    let mut masks = MASKS.lock();
    // SAFETY: Same mask protocol as enable_line.
    unsafe {
        if line < 8 {
            masks.primary |= 1 << line;
            outb(PRIMARY_DATA, masks.primary);
        } else {
            masks.secondary |= 1 << (line - 8);
            outb(SECONDARY_DATA, masks.secondary);
        }
    }
}

/// Acknowledge an interrupt on `line`. Must be issued exactly once per
/// hardware interrupt.
pub fn end_of_interrupt(line: u8) {
    if line > 15 {
        return;
    }
    // SAFETY: Specific EOI writes to the command ports; issuing it for
    // the line currently in service is the defined completion protocol.
    unsafe {
        if line < 8 {
            outb(PRIMARY_COMMAND, EOI | line);
        } else {
            outb(SECONDARY_COMMAND, EOI | (line - 8));
            outb(PRIMARY_COMMAND, EOI | CASCADE_LINE);
        }
    }
}

/// Read back the current mask pair (primary, secondary). Diagnostic
/// use only.
pub fn read_masks() -> (u8, u8) {
    // SAFETY: Reading the data ports returns the mask registers.
    unsafe { (inb(PRIMARY_DATA), inb(SECONDARY_DATA)) }
}
