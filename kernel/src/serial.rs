//! COM1 serial output.
//!
//! A 16550-compatible UART at 0x3F8 programmed through port I/O,
//! carrying the kernel log. User-visible output never goes here; it
//! belongs to the VGA console.

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod imp {
    use core::fmt;

    use spin::Mutex;

    use crate::arch::{inb, outb};

    pub struct SerialPort {
        base: u16,
    }

    impl SerialPort {
        pub const fn new(base: u16) -> Self {
            Self { base }
        }

        /// 38400 baud, 8N1, FIFOs on.
        pub fn init(&mut self) {
            // SAFETY: Standard 16550 programming sequence on the
            // caller-owned port block.
            unsafe {
                outb(self.base + 1, 0x00); // no interrupts
                outb(self.base + 3, 0x80); // DLAB on
                outb(self.base, 0x03); // divisor = 3
                outb(self.base + 1, 0x00);
                outb(self.base + 3, 0x03); // 8 data bits, no parity
                outb(self.base + 2, 0xC7); // FIFO on, 14-byte trigger
                outb(self.base + 4, 0x0B); // DTR | RTS | OUT2
            }
        }

        fn send(&mut self, byte: u8) {
            // SAFETY: Poll the line-status register until the holding
            // register is empty, then write the data register.
            unsafe {
                while inb(self.base + 5) & 0x20 == 0 {
                    core::hint::spin_loop();
                }
                outb(self.base, byte);
            }
        }
    }

    impl fmt::Write for SerialPort {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for byte in s.bytes() {
                self.send(byte);
            }
            Ok(())
        }
    }

    static COM1: Mutex<SerialPort> = Mutex::new(SerialPort::new(0x3F8));

    pub fn init() {
        COM1.lock().init();
    }

    #[doc(hidden)]
    pub fn _print(args: fmt::Arguments) {
        use core::fmt::Write;

        crate::arch::without_interrupts(|| {
            let _ = COM1.lock().write_fmt(args);
        });
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
mod imp {
    pub fn init() {}

    #[doc(hidden)]
    pub fn _print(_args: core::fmt::Arguments) {}
}

pub use imp::{_print, init};
