//! Read-only filesystem.
//!
//! The bootloader hands over one contiguous image: a 4 KiB boot block
//! (three counters plus up to 63 directory entries of 64 bytes), then
//! `inode_count` 4 KiB inode blocks (a byte length followed by up to
//! 1023 data-block indices), then the 4 KiB data blocks. All integers
//! are little-endian; names are up to 32 bytes and not necessarily
//! NUL-terminated.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Once;

use crate::process::FileDescriptor;

pub const BLOCK_SIZE: usize = 4096;
pub const NAME_LEN: usize = 32;
pub const MAX_DENTRIES: usize = 63;
const DENTRY_SIZE: usize = 64;
/// Data-block indices that fit one inode block after the length word.
const INODE_INDEX_COUNT: usize = BLOCK_SIZE / 4 - 1;

/// Directory-entry type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileType {
    /// The RTC device file.
    Rtc = 0,
    Directory = 1,
    Regular = 2,
}

impl TryFrom<u32> for FileType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(FileType::Rtc),
            1 => Ok(FileType::Directory),
            2 => Ok(FileType::Regular),
            _ => Err(()),
        }
    }
}

/// One 64-byte directory entry, decoded.
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    pub name: [u8; NAME_LEN],
    pub file_type: FileType,
    pub inode: u32,
}

/// Length-bounded name comparison: `query` matches a stored 32-byte
/// name when the bytes agree and the stored name ends (or hits the
/// 32-byte cap) where the query does.
pub fn name_matches(stored: &[u8; NAME_LEN], query: &[u8]) -> bool {
    if query.len() > NAME_LEN {
        return false;
    }
    if &stored[..query.len()] != query {
        return false;
    }
    query.len() == NAME_LEN || stored[query.len()] == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// The image is too small for the layout its counters describe.
    Truncated,
    BadInode,
    BadBlock,
}

/// A parsed view over the filesystem image.
#[derive(Debug, Clone, Copy)]
pub struct FsImage<'a> {
    data: &'a [u8],
}

impl<'a> FsImage<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, FsError> {
        if data.len() < BLOCK_SIZE {
            return Err(FsError::Truncated);
        }
        let image = Self { data };
        let blocks = 1usize
            .checked_add(image.inode_count() as usize)
            .and_then(|count| count.checked_add(image.data_block_count() as usize))
            .ok_or(FsError::Truncated)?;
        let needed = blocks.checked_mul(BLOCK_SIZE).ok_or(FsError::Truncated)?;
        if data.len() < needed {
            return Err(FsError::Truncated);
        }
        Ok(image)
    }

    fn u32_at(&self, offset: usize) -> u32 {
        let bytes = &self.data[offset..offset + 4];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn dir_entry_count(&self) -> u32 {
        self.u32_at(0)
    }

    pub fn inode_count(&self) -> u32 {
        self.u32_at(4)
    }

    pub fn data_block_count(&self) -> u32 {
        self.u32_at(8)
    }

    /// Bounds-checked copy of the i-th directory entry.
    pub fn dentry_by_index(&self, index: usize) -> Option<DirEntry> {
        if index >= self.dir_entry_count() as usize || index >= MAX_DENTRIES {
            return None;
        }
        let base = DENTRY_SIZE + index * DENTRY_SIZE;
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&self.data[base..base + NAME_LEN]);
        let file_type = FileType::try_from(self.u32_at(base + NAME_LEN)).ok()?;
        let inode = self.u32_at(base + NAME_LEN + 4);
        Some(DirEntry {
            name,
            file_type,
            inode,
        })
    }

    /// Linear scan of the directory for a name.
    pub fn dentry_by_name(&self, query: &[u8]) -> Option<DirEntry> {
        if query.is_empty() || query.len() > NAME_LEN {
            return None;
        }
        (0..self.dir_entry_count() as usize)
            .filter_map(|i| self.dentry_by_index(i))
            .find(|entry| name_matches(&entry.name, query))
    }

    /// Byte length of the file behind an inode.
    pub fn file_length(&self, inode: u32) -> Option<u32> {
        if inode >= self.inode_count() {
            return None;
        }
        Some(self.u32_at(BLOCK_SIZE * (1 + inode as usize)))
    }

    /// Read up to `buf.len()` bytes of file `inode` starting at byte
    /// `offset`. Returns the number of bytes copied; 0 at end of file.
    pub fn read_data(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let length = self.file_length(inode).ok_or(FsError::BadInode)?;
        if offset >= length {
            return Ok(0);
        }
        let count = buf.len().min((length - offset) as usize);
        let inode_base = BLOCK_SIZE * (1 + inode as usize);
        let data_base = BLOCK_SIZE * (1 + self.inode_count() as usize);

        let mut copied = 0;
        while copied < count {
            let position = offset as usize + copied;
            let block = position / BLOCK_SIZE;
            let block_offset = position % BLOCK_SIZE;
            if block >= INODE_INDEX_COUNT {
                return Err(FsError::BadBlock);
            }
            let data_index = self.u32_at(inode_base + 4 + 4 * block);
            if data_index >= self.data_block_count() {
                return Err(FsError::BadBlock);
            }
            let chunk = (BLOCK_SIZE - block_offset).min(count - copied);
            let src = data_base + data_index as usize * BLOCK_SIZE + block_offset;
            buf[copied..copied + chunk].copy_from_slice(&self.data[src..src + chunk]);
            copied += chunk;
        }
        Ok(count)
    }
}

static IMAGE: Once<FsImage<'static>> = Once::new();

/// Adopt the filesystem image supplied by the bootloader.
pub fn init(data: &'static [u8]) -> Result<(), FsError> {
    let image = FsImage::new(data)?;
    log::info!(
        "filesystem: {} directory entries, {} inodes, {} data blocks",
        image.dir_entry_count(),
        image.inode_count(),
        image.data_block_count()
    );
    IMAGE.call_once(|| image);
    Ok(())
}

/// The mounted image, if `init` has run.
pub fn image() -> Option<&'static FsImage<'static>> {
    IMAGE.get()
}

// ---------------------------------------------------------------------------
// Descriptor operations
// ---------------------------------------------------------------------------

/// Cursor of the directory-listing stream. Module-global: successive
/// `read`s on any directory descriptor walk the single directory once,
/// then reset.
static DIR_CURSOR: AtomicUsize = AtomicUsize::new(0);

pub fn file_open(name: &[u8]) -> i32 {
    match image().and_then(|fs| fs.dentry_by_name(name)) {
        Some(entry) if entry.file_type == FileType::Regular => 0,
        _ => -1,
    }
}

pub fn file_close(_fd: &mut FileDescriptor) -> i32 {
    0
}

pub fn file_read(fd: &mut FileDescriptor, buf: &mut [u8]) -> isize {
    let Some(fs) = image() else {
        return -1;
    };
    match fs.read_data(fd.inode, fd.pos, buf) {
        Ok(count) => count as isize,
        Err(_) => -1,
    }
}

/// The filesystem is read-only.
pub fn file_write(_fd: &mut FileDescriptor, _buf: &[u8]) -> isize {
    -1
}

pub fn dir_open(name: &[u8]) -> i32 {
    match image().and_then(|fs| fs.dentry_by_name(name)) {
        Some(entry) if entry.file_type == FileType::Directory => 0,
        _ => -1,
    }
}

pub fn dir_close(_fd: &mut FileDescriptor) -> i32 {
    0
}

/// One 32-byte filename per call; 0 once the listing is exhausted,
/// which also rewinds the cursor.
pub fn dir_read(_fd: &mut FileDescriptor, buf: &mut [u8]) -> isize {
    let Some(fs) = image() else {
        return -1;
    };
    let index = DIR_CURSOR.load(Ordering::Relaxed);
    match fs.dentry_by_index(index) {
        Some(entry) => {
            DIR_CURSOR.store(index + 1, Ordering::Relaxed);
            let count = buf.len().min(NAME_LEN);
            buf[..count].copy_from_slice(&entry.name[..count]);
            count as isize
        }
        None => {
            DIR_CURSOR.store(0, Ordering::Relaxed);
            0
        }
    }
}

pub fn dir_write(_fd: &mut FileDescriptor, _buf: &[u8]) -> isize {
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal image: `files` are (name, type, contents).
    fn build_image(files: &[(&[u8], u32, &[u8])]) -> std::vec::Vec<u8> {
        use std::vec::Vec;

        let inode_count = files.len();
        let mut blocks_per_file = Vec::new();
        let mut data_block_count = 0usize;
        for (_, _, contents) in files {
            let blocks = contents.len().div_ceil(BLOCK_SIZE);
            blocks_per_file.push(blocks);
            data_block_count += blocks;
        }

        let total = BLOCK_SIZE * (1 + inode_count + data_block_count);
        let mut image = std::vec![0u8; total];

        image[0..4].copy_from_slice(&(files.len() as u32).to_le_bytes());
        image[4..8].copy_from_slice(&(inode_count as u32).to_le_bytes());
        image[8..12].copy_from_slice(&(data_block_count as u32).to_le_bytes());

        let mut next_block = 0u32;
        for (i, (name, file_type, contents)) in files.iter().enumerate() {
            let dentry = DENTRY_SIZE + i * DENTRY_SIZE;
            image[dentry..dentry + name.len()].copy_from_slice(name);
            image[dentry + 32..dentry + 36].copy_from_slice(&file_type.to_le_bytes());
            image[dentry + 36..dentry + 40].copy_from_slice(&(i as u32).to_le_bytes());

            let inode = BLOCK_SIZE * (1 + i);
            image[inode..inode + 4].copy_from_slice(&(contents.len() as u32).to_le_bytes());
            for b in 0..blocks_per_file[i] {
                let slot = inode + 4 + 4 * b;
                image[slot..slot + 4].copy_from_slice(&next_block.to_le_bytes());
                let data = BLOCK_SIZE * (1 + inode_count) + next_block as usize * BLOCK_SIZE;
                let chunk = &contents[b * BLOCK_SIZE..contents.len().min((b + 1) * BLOCK_SIZE)];
                image[data..data + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
        }
        image
    }

    #[test]
    fn lookup_by_name_is_length_bounded() {
        let image = build_image(&[
            (b".", 1, b""),
            (b"frame0.txt", 2, b"hello"),
            (b"frame0.txt.extra", 2, b"other"),
        ]);
        let fs = FsImage::new(&image).expect("valid image");

        let entry = fs.dentry_by_name(b"frame0.txt").expect("found");
        assert_eq!(entry.file_type, FileType::Regular);
        assert_eq!(entry.inode, 1);

        // A prefix of a stored name is not a match.
        assert!(fs.dentry_by_name(b"frame0").is_none());
        assert!(fs.dentry_by_name(b"missing").is_none());
        assert!(fs.dentry_by_name(b"").is_none());

        // 33 bytes can never match.
        assert!(fs.dentry_by_name(&[b'a'; 33]).is_none());
    }

    #[test]
    fn full_length_names_match_without_terminator() {
        let name = [b'x'; NAME_LEN];
        let image = build_image(&[(&name, 2, b"body")]);
        let fs = FsImage::new(&image).expect("valid image");
        assert!(fs.dentry_by_name(&name).is_some());
    }

    #[test]
    fn read_data_honors_the_clamp_law() {
        let mut contents = std::vec::Vec::new();
        for i in 0..10_000u32 {
            contents.push((i % 251) as u8);
        }
        let image = build_image(&[(b"big", 2, &contents)]);
        let fs = FsImage::new(&image).expect("valid image");

        // r = min(L, length - offset), bytes match the store.
        let mut buf = [0u8; 300];
        let r = fs.read_data(0, 4000, &mut buf).expect("read");
        assert_eq!(r, 300);
        assert_eq!(&buf[..], &contents[4000..4300]);

        // Clamped at end of file.
        let r = fs.read_data(0, 9_900, &mut buf).expect("read");
        assert_eq!(r, 100);
        assert_eq!(&buf[..100], &contents[9_900..]);

        // Offset at or past the end reads nothing.
        assert_eq!(fs.read_data(0, 10_000, &mut buf).expect("read"), 0);
        assert_eq!(fs.read_data(0, 20_000, &mut buf).expect("read"), 0);

        // Reads crossing a block boundary stay byte-exact.
        let mut big = std::vec![0u8; 8192];
        let r = fs.read_data(0, 100, &mut big).expect("read");
        assert_eq!(r, 8192);
        assert_eq!(&big[..], &contents[100..8292]);
    }

    #[test]
    fn read_data_rejects_bad_inodes() {
        let image = build_image(&[(b"a", 2, b"abc")]);
        let fs = FsImage::new(&image).expect("valid image");
        let mut buf = [0u8; 4];
        assert_eq!(fs.read_data(7, 0, &mut buf), Err(FsError::BadInode));
    }

    #[test]
    fn dentry_by_index_is_bounds_checked() {
        let image = build_image(&[(b"only", 2, b"1")]);
        let fs = FsImage::new(&image).expect("valid image");
        assert!(fs.dentry_by_index(0).is_some());
        assert!(fs.dentry_by_index(1).is_none());
        assert!(fs.dentry_by_index(MAX_DENTRIES).is_none());
    }

    #[test]
    fn truncated_images_are_rejected() {
        assert_eq!(FsImage::new(&[0u8; 64]).err(), Some(FsError::Truncated));

        // Counters promising more blocks than the buffer holds.
        let mut image = std::vec![0u8; BLOCK_SIZE];
        image[4..8].copy_from_slice(&10u32.to_le_bytes());
        assert_eq!(FsImage::new(&image).err(), Some(FsError::Truncated));
    }
}
