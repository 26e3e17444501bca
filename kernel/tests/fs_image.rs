//! Filesystem reader behavior against a synthetic boot image.

use triplex_kernel::fs::{FileType, FsImage, BLOCK_SIZE};

const DENTRY_SIZE: usize = 64;

struct ImageBuilder {
    files: Vec<(Vec<u8>, u32, Vec<u8>)>,
}

impl ImageBuilder {
    fn new() -> Self {
        Self { files: Vec::new() }
    }

    fn file(mut self, name: &[u8], file_type: u32, contents: &[u8]) -> Self {
        self.files.push((name.to_vec(), file_type, contents.to_vec()));
        self
    }

    fn build(self) -> Vec<u8> {
        let inode_count = self.files.len();
        let data_blocks: usize = self
            .files
            .iter()
            .map(|(_, _, c)| c.len().div_ceil(BLOCK_SIZE))
            .sum();

        let mut image = vec![0u8; BLOCK_SIZE * (1 + inode_count + data_blocks)];
        image[0..4].copy_from_slice(&(self.files.len() as u32).to_le_bytes());
        image[4..8].copy_from_slice(&(inode_count as u32).to_le_bytes());
        image[8..12].copy_from_slice(&(data_blocks as u32).to_le_bytes());

        let mut next_block = 0u32;
        for (i, (name, file_type, contents)) in self.files.iter().enumerate() {
            let dentry = DENTRY_SIZE * (1 + i);
            image[dentry..dentry + name.len()].copy_from_slice(name);
            image[dentry + 32..dentry + 36].copy_from_slice(&file_type.to_le_bytes());
            image[dentry + 36..dentry + 40].copy_from_slice(&(i as u32).to_le_bytes());

            let inode = BLOCK_SIZE * (1 + i);
            image[inode..inode + 4].copy_from_slice(&(contents.len() as u32).to_le_bytes());
            for (b, chunk) in contents.chunks(BLOCK_SIZE).enumerate() {
                let slot = inode + 4 + 4 * b;
                image[slot..slot + 4].copy_from_slice(&next_block.to_le_bytes());
                let data = BLOCK_SIZE * (1 + inode_count) + next_block as usize * BLOCK_SIZE;
                image[data..data + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
        }
        image
    }
}

fn boot_image() -> Vec<u8> {
    let mut frame0 = Vec::new();
    for line in 0..200u32 {
        frame0.extend_from_slice(format!("fish frame line {line}\n").as_bytes());
    }
    ImageBuilder::new()
        .file(b".", 1, b"")
        .file(b"rtc", 0, b"")
        .file(b"shell", 2, b"\x7FELF....")
        .file(b"frame0.txt", 2, &frame0)
        .build()
}

#[test]
fn directory_holds_every_boot_file() {
    let bytes = boot_image();
    let fs = FsImage::new(&bytes).expect("valid image");

    assert_eq!(fs.dir_entry_count(), 4);
    let dot = fs.dentry_by_name(b".").expect("directory entry");
    assert_eq!(dot.file_type, FileType::Directory);
    let rtc = fs.dentry_by_name(b"rtc").expect("device entry");
    assert_eq!(rtc.file_type, FileType::Rtc);
    let shell = fs.dentry_by_name(b"shell").expect("program entry");
    assert_eq!(shell.file_type, FileType::Regular);

    // The first directory entry's name is what a directory read
    // returns first.
    let first = fs.dentry_by_index(0).expect("first entry");
    assert_eq!(&first.name[..1], b".");
    assert_eq!(first.name[1], 0);

    assert!(fs.dentry_by_name(b"does_not_exist").is_none());
}

#[test]
fn whole_file_reads_match_the_store() {
    let bytes = boot_image();
    let fs = FsImage::new(&bytes).expect("valid image");
    let entry = fs.dentry_by_name(b"frame0.txt").expect("present");
    let length = fs.file_length(entry.inode).expect("length") as usize;

    // Drain the file the way `cat` does: fixed-size reads until 0.
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = fs
            .read_data(entry.inode, out.len() as u32, &mut buf)
            .expect("read");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out.len(), length);
    assert!(out.starts_with(b"fish frame line 0\n"));
    assert!(out.ends_with(b"fish frame line 199\n"));
}

#[test]
fn read_return_value_satisfies_the_clamp_invariant() {
    let bytes = boot_image();
    let fs = FsImage::new(&bytes).expect("valid image");
    let entry = fs.dentry_by_name(b"frame0.txt").expect("present");
    let length = fs.file_length(entry.inode).expect("length");

    for (offset, want) in [
        (0u32, 64usize),
        (length - 10, 10),
        (length, 0),
        (length + 5, 0),
    ] {
        let mut buf = [0u8; 64];
        let got = fs.read_data(entry.inode, offset, &mut buf).expect("read");
        let clamp = (length.saturating_sub(offset) as usize).min(buf.len());
        assert_eq!(got, clamp, "offset {offset}");
        assert_eq!(got, want.min(64));
    }
}

#[test]
fn executable_headers_come_out_of_the_image() {
    let bytes = boot_image();
    let fs = FsImage::new(&bytes).expect("valid image");
    let shell = fs.dentry_by_name(b"shell").expect("present");

    let mut header = [0u8; 9];
    let n = fs.read_data(shell.inode, 0, &mut header).expect("read");
    assert_eq!(n, 9);
    assert_eq!(&header[..4], &[0x7F, b'E', b'L', b'F']);
}
