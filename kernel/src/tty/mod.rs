//! The three text terminals.
//!
//! Each terminal owns a 128-byte line buffer, a newline-delivered
//! flag, and a cursor. The keyboard interrupt is the sole producer
//! into the *foreground* terminal's buffer; `read` on descriptor 0 is
//! the sole consumer, draining the *running* terminal's buffer once a
//! newline arrives. Foreground and running terminal are independent:
//! the user sees one, the scheduler executes another.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::arch::without_interrupts;
use crate::mm::layout::{terminal_backing_frame, TERMINAL_COUNT, VIDEO_PHYS};
use crate::process::FileDescriptor;
use crate::video::console::{Cursor, TextFrame};
use crate::video::{backing_frame, cursor, draw_frame};

/// Line buffer size: 127 characters plus the newline.
pub const LINE_LEN: usize = 128;

pub struct Terminal {
    pub line: [u8; LINE_LEN],
    pub len: usize,
    /// Set by the keyboard when a full line is available.
    pub newline: bool,
    pub cursor: Cursor,
}

impl Terminal {
    const fn new() -> Self {
        Self {
            line: [0; LINE_LEN],
            len: 0,
            newline: false,
            cursor: Cursor::origin(),
        }
    }
}

const FRESH: Terminal = Terminal::new();

static TERMINALS: Mutex<[Terminal; TERMINAL_COUNT]> = Mutex::new([FRESH; TERMINAL_COUNT]);

/// The terminal currently on the physical display.
static FOREGROUND: AtomicUsize = AtomicUsize::new(0);

pub fn foreground() -> usize {
    FOREGROUND.load(Ordering::Acquire)
}

/// Shape the hardware cursor and park it at the origin.
pub fn init() {
    cursor::enable(0, 14);
    cursor::update(0, 0);
}

/// Re-point the virtual video page for the running terminal: the VGA
/// frame when it is foreground, its backing frame otherwise.
pub fn realias_for_running() {
    let run = crate::sched::running_terminal();
    let target = if run == foreground() {
        VIDEO_PHYS
    } else {
        terminal_backing_frame(run)
    };
    without_interrupts(|| {
        // SAFETY: Interrupts are disabled for the alias rewrite.
        unsafe { crate::mm::paging::alias_video(target) };
    });
}

/// Run `f` against the frame the *foreground* terminal displays on.
///
/// When the running terminal is foreground that is simply the draw
/// page; otherwise the virtual video page is temporarily re-aliased to
/// the physical screen and restored afterwards. Callers hold the
/// terminal lock and run with interrupts disabled.
fn with_foreground_frame<R>(f: impl FnOnce(&mut TextFrame) -> R) -> R {
    let run = crate::sched::running_terminal();
    if run == foreground() {
        // SAFETY: Terminal lock held by the caller serializes frame use.
        f(unsafe { draw_frame() })
    } else {
        // SAFETY: Caller runs with interrupts disabled; the alias is
        // restored before anyone else can draw.
        unsafe { crate::mm::paging::alias_video(VIDEO_PHYS) };
        // SAFETY: As above.
        let ret = f(unsafe { draw_frame() });
        // SAFETY: As above.
        unsafe { crate::mm::paging::alias_video(terminal_backing_frame(run)) };
        ret
    }
}

/// Append one decoded key to the foreground terminal, echoing it.
///
/// Called from the keyboard interrupt. Printables are dropped once the
/// buffer holds 127 bytes; newline always fits and wakes any pending
/// `read`; backspace erases.
pub fn feed_char(byte: u8) {
    let fg = foreground();
    let mut terminals = TERMINALS.lock();
    let terminal = &mut terminals[fg];
    match byte {
        b'\n' => {
            if terminal.len < LINE_LEN {
                terminal.line[terminal.len] = b'\n';
                terminal.len += 1;
            }
            echo(terminal, b'\n');
            terminal.newline = true;
        }
        0x08 => {
            if terminal.len > 0 {
                terminal.len -= 1;
                echo(terminal, 0x08);
            }
        }
        byte => {
            if terminal.len < LINE_LEN - 1 {
                terminal.line[terminal.len] = byte;
                terminal.len += 1;
                echo(terminal, byte);
            }
        }
    }
}

fn echo(terminal: &mut Terminal, byte: u8) {
    with_foreground_frame(|frame| frame.put_byte(&mut terminal.cursor, byte));
    cursor::update(terminal.cursor.x, terminal.cursor.y);
}

/// Clear the foreground display without touching the line buffer
/// (Ctrl+L).
pub fn clear_foreground() {
    let fg = foreground();
    let mut terminals = TERMINALS.lock();
    let terminal = &mut terminals[fg];
    with_foreground_frame(|frame| frame.clear());
    terminal.cursor = Cursor::origin();
    cursor::update(0, 0);
}

/// Bring `target` to the foreground (Alt+F1..F3): save the screen into
/// the old foreground's backing frame, copy the new one in, move the
/// hardware cursor, and restore the running terminal's alias.
pub fn switch_to(target: usize) {
    if target >= TERMINAL_COUNT {
        return;
    }
    let terminals = TERMINALS.lock();
    let old = foreground();
    if target == old {
        return;
    }

    // SAFETY: Called from the keyboard interrupt with interrupts
    // disabled; the alias is re-established below.
    unsafe { crate::mm::paging::alias_video(VIDEO_PHYS) };
    // SAFETY: Frame pointers are distinct pages; the terminal lock
    // serializes all drawing.
    let screen = unsafe { draw_frame() };
    // SAFETY: As above.
    unsafe { backing_frame(old) }.copy_from(screen);
    // SAFETY: As above.
    screen.copy_from(unsafe { backing_frame(target) });

    FOREGROUND.store(target, Ordering::Release);
    cursor::update(terminals[target].cursor.x, terminals[target].cursor.y);
    drop(terminals);

    realias_for_running();
}

fn copy_line(line: &[u8; LINE_LEN], buf: &mut [u8]) -> usize {
    let mut copied = 0;
    while copied < buf.len() && copied < LINE_LEN {
        let byte = line[copied];
        buf[copied] = byte;
        copied += 1;
        if byte == b'\n' {
            break;
        }
    }
    copied
}

/// Line-discipline `read` on descriptor 0.
///
/// Discards anything typed before the call, then busy-polls (with
/// interrupts enabled between probes) until the keyboard delivers a
/// newline to the running terminal, and copies the line up to and
/// including the newline.
pub fn terminal_read(_fd: &mut FileDescriptor, buf: &mut [u8]) -> isize {
    let term = crate::sched::running_terminal();

    without_interrupts(|| {
        let terminal = &mut TERMINALS.lock()[term];
        terminal.line = [0; LINE_LEN];
        terminal.len = 0;
        terminal.newline = false;
    });

    loop {
        let ready = without_interrupts(|| TERMINALS.lock()[term].newline);
        if ready {
            break;
        }
        core::hint::spin_loop();
    }

    without_interrupts(|| {
        let terminal = &mut TERMINALS.lock()[term];
        let copied = copy_line(&terminal.line, buf);
        terminal.newline = false;
        copied as isize
    })
}

/// `write` on descriptor 1: draw every byte on the running terminal.
pub fn terminal_write(_fd: &mut FileDescriptor, buf: &[u8]) -> isize {
    let run = crate::sched::running_terminal();
    without_interrupts(|| {
        let terminal = &mut TERMINALS.lock()[run];
        // SAFETY: Terminal lock held; the draw page is always mapped.
        let frame = unsafe { draw_frame() };
        for &byte in buf {
            frame.put_byte(&mut terminal.cursor, byte);
        }
        if run == foreground() {
            cursor::update(terminal.cursor.x, terminal.cursor.y);
        }
    });
    buf.len() as isize
}

struct KernelWriter<'a> {
    terminal: &'a mut Terminal,
    run: usize,
}

impl fmt::Write for KernelWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // SAFETY: Constructed under the terminal lock in _print.
        let frame = unsafe { draw_frame() };
        for byte in s.bytes() {
            frame.put_byte(&mut self.terminal.cursor, byte);
        }
        if self.run == foreground() {
            cursor::update(self.terminal.cursor.x, self.terminal.cursor.y);
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    without_interrupts(|| {
        let run = crate::sched::running_terminal();
        let mut terminals = TERMINALS.lock();
        let mut writer = KernelWriter {
            terminal: &mut terminals[run],
            run,
        };
        let _ = writer.write_fmt(args);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test function: the terminal table is global state shared by
    // every path in this module.
    #[test]
    fn line_discipline_end_to_end() {
        {
            let mut terminals = TERMINALS.lock();
            terminals[0] = Terminal::new();
        }
        FOREGROUND.store(0, Ordering::Release);

        for &byte in b"ls -l" {
            feed_char(byte);
        }
        // Backspace erases the trailing byte.
        feed_char(0x08);
        {
            let terminals = TERMINALS.lock();
            assert_eq!(&terminals[0].line[..terminals[0].len], b"ls -");
            assert!(!terminals[0].newline);
        }

        feed_char(b'\n');
        {
            let terminals = TERMINALS.lock();
            assert!(terminals[0].newline);
            assert_eq!(&terminals[0].line[..terminals[0].len], b"ls -\n");
        }

        // The copy stops at (and includes) the newline.
        let mut buf = [0u8; 32];
        let line = TERMINALS.lock()[0].line;
        assert_eq!(copy_line(&line, &mut buf), 5);
        assert_eq!(&buf[..5], b"ls -\n");

        // A short destination truncates without the newline.
        let mut short = [0u8; 3];
        assert_eq!(copy_line(&line, &mut short), 3);
        assert_eq!(&short, b"ls ");

        // 127 printables fill the buffer; the 128th is dropped but a
        // newline still fits.
        {
            let mut terminals = TERMINALS.lock();
            terminals[0] = Terminal::new();
        }
        for _ in 0..200 {
            feed_char(b'x');
        }
        assert_eq!(TERMINALS.lock()[0].len, LINE_LEN - 1);
        feed_char(b'\n');
        {
            let terminals = TERMINALS.lock();
            assert_eq!(terminals[0].len, LINE_LEN);
            assert_eq!(terminals[0].line[LINE_LEN - 1], b'\n');
            assert!(terminals[0].newline);
        }
    }
}
