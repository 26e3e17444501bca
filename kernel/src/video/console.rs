//! Text-mode framebuffer cells.
//!
//! An 80×25 grid of character/attribute pairs. The same frame type
//! covers the memory-mapped VGA frame and the three off-screen backing
//! pages, so terminal switches are plain frame copies.

use core::ptr::{read_volatile, write_volatile};

pub const WIDTH: usize = 80;
pub const HEIGHT: usize = 25;

/// VGA text-mode color palette.
#[allow(dead_code)] // Full palette per the VGA specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    pub const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode(((background as u8) << 4) | (foreground as u8))
    }
}

/// Attribute used for everything the kernel draws.
pub const TEXT_ATTR: ColorCode = ColorCode::new(Color::LightGray, Color::Black);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenChar {
    pub character: u8,
    pub color: ColorCode,
}

const BLANK: ScreenChar = ScreenChar {
    character: b' ',
    color: TEXT_ATTR,
};

/// Cursor coordinates inside a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,
}

impl Cursor {
    pub const fn origin() -> Self {
        Self { x: 0, y: 0 }
    }
}

/// One 4 KiB text frame.
#[repr(transparent)]
pub struct TextFrame {
    pub cells: [[ScreenChar; WIDTH]; HEIGHT],
}

impl TextFrame {
    fn set(&mut self, x: usize, y: usize, cell: ScreenChar) {
        // SAFETY: x/y are kept in range by every caller in this impl;
        // the volatile write keeps stores to the memory-mapped frame
        // from being elided.
        unsafe {
            write_volatile(&mut self.cells[y][x], cell);
        }
    }

    fn get(&self, x: usize, y: usize) -> ScreenChar {
        // SAFETY: In-range indices; volatile for the mapped frame.
        unsafe { read_volatile(&self.cells[y][x]) }
    }

    /// Blank the frame.
    pub fn clear(&mut self) {
        for y in 0..HEIGHT {
            self.clear_row(y);
        }
    }

    fn clear_row(&mut self, y: usize) {
        for x in 0..WIDTH {
            self.set(x, y, BLANK);
        }
    }

    /// Shift every row up by one and blank the bottom row.
    pub fn scroll_up(&mut self) {
        for y in 1..HEIGHT {
            for x in 0..WIDTH {
                let cell = self.get(x, y);
                self.set(x, y - 1, cell);
            }
        }
        self.clear_row(HEIGHT - 1);
    }

    /// Draw one byte at the cursor and advance it, handling newline,
    /// backspace erase, line wrap, and scrolling.
    pub fn put_byte(&mut self, cursor: &mut Cursor, byte: u8) {
        match byte {
            b'\n' => {
                cursor.x = 0;
                cursor.y += 1;
            }
            0x08 => {
                if cursor.x > 0 {
                    cursor.x -= 1;
                } else if cursor.y > 0 {
                    cursor.y -= 1;
                    cursor.x = WIDTH - 1;
                }
                self.set(cursor.x, cursor.y, BLANK);
            }
            byte => {
                let shown = match byte {
                    0x20..=0x7E => byte,
                    _ => 0xFE,
                };
                self.set(
                    cursor.x,
                    cursor.y,
                    ScreenChar {
                        character: shown,
                        color: TEXT_ATTR,
                    },
                );
                cursor.x += 1;
                if cursor.x >= WIDTH {
                    cursor.x = 0;
                    cursor.y += 1;
                }
            }
        }
        if cursor.y >= HEIGHT {
            self.scroll_up();
            cursor.y = HEIGHT - 1;
        }
    }

    /// Copy another frame's contents into this one.
    pub fn copy_from(&mut self, other: &TextFrame) {
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                let cell = other.get(x, y);
                self.set(x, y, cell);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> std::boxed::Box<TextFrame> {
        std::boxed::Box::new(TextFrame {
            cells: [[BLANK; WIDTH]; HEIGHT],
        })
    }

    fn row_text(frame: &TextFrame, y: usize) -> std::string::String {
        frame.cells[y]
            .iter()
            .map(|cell| cell.character as char)
            .collect()
    }

    #[test]
    fn bytes_advance_the_cursor_and_wrap() {
        let mut f = frame();
        let mut cursor = Cursor::origin();
        for _ in 0..81 {
            f.put_byte(&mut cursor, b'a');
        }
        assert_eq!(cursor, Cursor { x: 1, y: 1 });
        assert_eq!(f.cells[0][79].character, b'a');
        assert_eq!(f.cells[1][0].character, b'a');
    }

    #[test]
    fn newline_resets_the_column() {
        let mut f = frame();
        let mut cursor = Cursor::origin();
        for &b in b"hi\nthere" {
            f.put_byte(&mut cursor, b);
        }
        assert!(row_text(&f, 0).starts_with("hi "));
        assert!(row_text(&f, 1).starts_with("there"));
        assert_eq!(cursor, Cursor { x: 5, y: 1 });
    }

    #[test]
    fn backspace_erases_the_previous_cell() {
        let mut f = frame();
        let mut cursor = Cursor::origin();
        for &b in b"ab" {
            f.put_byte(&mut cursor, b);
        }
        f.put_byte(&mut cursor, 0x08);
        assert_eq!(cursor, Cursor { x: 1, y: 0 });
        assert_eq!(f.cells[0][1].character, b' ');
        assert_eq!(f.cells[0][0].character, b'a');
    }

    #[test]
    fn writing_past_the_bottom_scrolls() {
        let mut f = frame();
        let mut cursor = Cursor::origin();
        for line in 0..26 {
            let byte = b'a' + (line % 26) as u8;
            f.put_byte(&mut cursor, byte);
            f.put_byte(&mut cursor, b'\n');
        }
        // 26 lines plus the final newline: the first two scrolled off.
        assert_eq!(cursor.y, HEIGHT - 1);
        assert_eq!(f.cells[0][0].character, b'c');
        assert_eq!(f.cells[HEIGHT - 2][0].character, b'z');
    }

    #[test]
    fn frame_copies_are_byte_exact() {
        let mut a = frame();
        let mut b = frame();
        let mut cursor = Cursor::origin();
        for &byte in b"snapshot" {
            a.put_byte(&mut cursor, byte);
        }
        b.copy_from(&a);
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                assert_eq!(a.cells[y][x], b.cells[y][x]);
            }
        }
    }
}
