//! Executable header checks.
//!
//! Programs in the filesystem image are flat-loaded ELF objects: the
//! loader only validates the four magic bytes and pulls the entry
//! virtual address out of bytes 24..27 of the header; the whole file is
//! copied contiguously to the user image address.

/// The executable magic.
pub const MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Offset of the little-endian entry address in the header.
const ENTRY_OFFSET: usize = 24;

/// Header bytes the loader inspects.
pub const HEADER_LEN: usize = 40;

/// Validate the magic and return the entry virtual address.
pub fn entry_point(header: &[u8]) -> Option<u32> {
    if header.len() < ENTRY_OFFSET + 4 || header[..4] != MAGIC {
        return None;
    }
    Some(u32::from_le_bytes([
        header[ENTRY_OFFSET],
        header[ENTRY_OFFSET + 1],
        header[ENTRY_OFFSET + 2],
        header[ENTRY_OFFSET + 3],
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_magic_and_reads_the_entry() {
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&MAGIC);
        header[24..28].copy_from_slice(&0x0804_8094u32.to_le_bytes());
        assert_eq!(entry_point(&header), Some(0x0804_8094));
    }

    #[test]
    fn rejects_non_executables() {
        assert_eq!(entry_point(b"#!/bin/sh\n"), None);
        assert_eq!(entry_point(&[]), None);

        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(b"\x7FELG");
        assert_eq!(entry_point(&header), None);

        // Too short to hold an entry address.
        assert_eq!(entry_point(&MAGIC), None);
    }
}
