//! Text video output.
//!
//! Four 4 KiB frames exist: the on-screen VGA frame and one backing
//! frame per terminal. The kernel always draws the *running* terminal
//! through the virtual video page, which the scheduler aliases either
//! to the VGA frame (running terminal is foreground) or to the
//! terminal's backing frame; the foreground swap rewrites the alias
//! and copies frames wholesale.

pub mod console;
pub mod cursor;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod frames {
    use super::console::TextFrame;
    use crate::mm::layout::{terminal_backing_frame, VIDEO_PHYS};

    /// The running terminal's draw target: the virtual video page,
    /// whose alias the scheduler maintains.
    ///
    /// # Safety
    ///
    /// Callers must serialize access (the terminal lock does).
    pub unsafe fn draw_frame() -> &'static mut TextFrame {
        // SAFETY: The virtual video page is always mapped to a valid
        // 4 KiB frame; exclusive access is the caller's contract.
        unsafe { &mut *(VIDEO_PHYS as usize as *mut TextFrame) }
    }

    /// A terminal's off-screen backing frame, identity-mapped.
    ///
    /// # Safety
    ///
    /// Callers must serialize access (the terminal lock does).
    pub unsafe fn backing_frame(term: usize) -> &'static mut TextFrame {
        // SAFETY: The three backing frames are identity-mapped
        // supervisor pages; exclusive access is the caller's contract.
        unsafe { &mut *(terminal_backing_frame(term) as usize as *mut TextFrame) }
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
mod frames {
    use core::cell::UnsafeCell;

    use super::console::{ScreenChar, TextFrame, HEIGHT, TEXT_ATTR, WIDTH};

    const BLANK: ScreenChar = ScreenChar {
        character: b' ',
        color: TEXT_ATTR,
    };

    struct FrameCell(UnsafeCell<TextFrame>);

    // SAFETY: Host-only stand-ins exercised by single-threaded tests
    // through the same locking discipline as the real frames.
    unsafe impl Sync for FrameCell {}

    const fn empty() -> FrameCell {
        FrameCell(UnsafeCell::new(TextFrame {
            cells: [[BLANK; WIDTH]; HEIGHT],
        }))
    }

    static DRAW: FrameCell = empty();
    static BACKING: [FrameCell; 3] = [empty(), empty(), empty()];

    /// # Safety
    ///
    /// Host stand-in; callers must serialize access.
    pub unsafe fn draw_frame() -> &'static mut TextFrame {
        // SAFETY: Caller contract as on target.
        unsafe { &mut *DRAW.0.get() }
    }

    /// # Safety
    ///
    /// Host stand-in; callers must serialize access.
    pub unsafe fn backing_frame(term: usize) -> &'static mut TextFrame {
        // SAFETY: Caller contract as on target.
        unsafe { &mut *BACKING[term].0.get() }
    }
}

pub use frames::{backing_frame, draw_frame};
