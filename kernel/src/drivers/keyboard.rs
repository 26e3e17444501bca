//! PS/2 keyboard driver.
//!
//! Scancodes (set 1, US 104-key layout) are decoded with the
//! `pc_keyboard` crate. Modifier and Alt-state are tracked from the
//! raw key events before decoding consumes them, exactly for the
//! hot-keys the terminals need: Alt+F1..F3 switch the foreground
//! terminal, Ctrl+L clears the screen without touching the line
//! buffer, Ctrl+C raises the interrupt signal on the foreground
//! terminal's process. Everything printable feeds the foreground
//! terminal's line buffer.

use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, KeyState, Keyboard, ScancodeSet1};
use spin::Mutex;

use crate::process::signal::{self, Signal};

/// Bitmask: Shift is held.
pub const MOD_SHIFT: u8 = 0x01;
/// Bitmask: Ctrl is held.
pub const MOD_CTRL: u8 = 0x02;
/// Bitmask: Alt is held.
pub const MOD_ALT: u8 = 0x04;

type Decoder = Keyboard<layouts::Us104Key, ScancodeSet1>;

struct KeyboardState {
    decoder: Decoder,
    modifiers: u8,
}

static KEYBOARD: Mutex<Option<KeyboardState>> = Mutex::new(None);

/// What a scancode asks the kernel to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// A byte for the foreground terminal's line buffer.
    Input(u8),
    /// Alt+F1..F3.
    SwitchTerminal(usize),
    /// Ctrl+L.
    ClearScreen,
    /// Ctrl+C.
    Interrupt,
}

/// Initialize the decoder and unmask IRQ 1.
pub fn init() {
    let decoder = Keyboard::new(
        ScancodeSet1::new(),
        layouts::Us104Key,
        HandleControl::MapLettersToUnicode,
    );
    *KEYBOARD.lock() = Some(KeyboardState {
        decoder,
        modifiers: 0,
    });

    #[cfg(all(target_arch = "x86", target_os = "none"))]
    crate::arch::x86::pic::enable_line(1);

    log::info!("PS/2 keyboard ready (scancode set 1)");
}

fn update_modifier(modifiers: &mut u8, bit: u8, down: bool) {
    if down {
        *modifiers |= bit;
    } else {
        *modifiers &= !bit;
    }
}

/// Turn one scancode byte into an action, updating decoder and
/// modifier state.
fn decode_with(state: &mut KeyboardState, scancode: u8) -> Option<KeyAction> {
    let event = state.decoder.add_byte(scancode).ok().flatten()?;

    // Track modifier state from the raw event before process_keyevent
    // consumes it.
    let down = event.state == KeyState::Down;
    match event.code {
        KeyCode::LShift | KeyCode::RShift => update_modifier(&mut state.modifiers, MOD_SHIFT, down),
        KeyCode::LControl | KeyCode::RControl => {
            update_modifier(&mut state.modifiers, MOD_CTRL, down)
        }
        KeyCode::LAlt | KeyCode::RAltGr => update_modifier(&mut state.modifiers, MOD_ALT, down),
        _ => {}
    }

    let key = state.decoder.process_keyevent(event)?;
    match key {
        DecodedKey::Unicode(ch) => match ch {
            // Ctrl+C (ETX with MapLettersToUnicode).
            '\u{0003}' => Some(KeyAction::Interrupt),
            // Ctrl+L (FF).
            '\u{000C}' => Some(KeyAction::ClearScreen),
            '\n' | '\r' => Some(KeyAction::Input(b'\n')),
            '\u{0008}' => Some(KeyAction::Input(0x08)),
            // Tab and escape are swallowed.
            '\t' | '\u{001B}' => None,
            ch if ch.is_ascii_graphic() || ch == ' ' => Some(KeyAction::Input(ch as u8)),
            _ => None,
        },
        DecodedKey::RawKey(code) => {
            if state.modifiers & MOD_ALT != 0 {
                match code {
                    KeyCode::F1 => Some(KeyAction::SwitchTerminal(0)),
                    KeyCode::F2 => Some(KeyAction::SwitchTerminal(1)),
                    KeyCode::F3 => Some(KeyAction::SwitchTerminal(2)),
                    _ => None,
                }
            } else {
                None
            }
        }
    }
}

/// Decode one scancode through the global decoder.
pub fn decode(scancode: u8) -> Option<KeyAction> {
    let mut guard = KEYBOARD.lock();
    let state = guard.as_mut()?;
    decode_with(state, scancode)
}

/// Carry out a decoded action.
pub fn apply(action: KeyAction) {
    match action {
        KeyAction::Input(byte) => crate::tty::feed_char(byte),
        KeyAction::SwitchTerminal(term) => crate::tty::switch_to(term),
        KeyAction::ClearScreen => crate::tty::clear_foreground(),
        KeyAction::Interrupt => {
            if let Some(pid) = crate::sched::scheduled_pid(crate::tty::foreground()) {
                signal::raise(pid, Signal::Interrupt);
            }
        }
    }
}

/// IRQ 1 body: pull the scancode and act on it. The EOI has already
/// been sent by the dispatcher.
pub fn handle_interrupt() {
    // SAFETY: Reading the PS/2 data port consumes the pending scancode;
    // this runs in the keyboard interrupt, the sole reader.
    let scancode = unsafe { crate::arch::inb(0x60) };
    if let Some(action) = decode(scancode) {
        apply(action);
    }
}
