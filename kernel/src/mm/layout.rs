//! The fixed memory map.
//!
//! Everything the kernel places in memory lives at a compile-time
//! address: the kernel image occupies the single 4 MiB page at
//! 0x400000, the six 8 KiB kernel stacks sit at the top of that page
//! (PCB at the top of each stack region), and each process image is a
//! 4 MiB physical frame starting at 0x800000. User-visible addresses
//! (image base, stack top, video window) are part of the syscall ABI.

/// Base of the 4 MiB kernel page.
pub const KERNEL_BASE: u32 = 0x40_0000;

/// First byte past the kernel page; the per-process kernel stacks grow
/// down from here.
pub const KERNEL_TOP: u32 = 0x80_0000;

/// Size of one per-process kernel stack region (PCB at the top).
pub const KSTACK_SIZE: u32 = 0x2000;

/// Maximum number of live processes.
pub const MAX_PROCESSES: usize = 6;

/// Number of text terminals multiplexed on the display.
pub const TERMINAL_COUNT: usize = 3;

/// Physical address of the VGA text framebuffer.
pub const VIDEO_PHYS: u32 = 0xB8000;

/// 4 KiB page size.
pub const PAGE_SIZE: u32 = 0x1000;

/// 4 MiB large-page size.
pub const LARGE_PAGE_SIZE: u32 = 0x40_0000;

/// Base virtual address of user space (directory entry 32).
pub const USER_BASE: u32 = 0x800_0000;

/// Virtual address a program image is loaded at.
pub const USER_IMAGE: u32 = 0x804_8000;

/// Top of the user stack; the initial user ESP is this minus 4.
pub const USER_STACK_TOP: u32 = 0x840_0000;

/// Fixed virtual address of the user video window installed by `vidmap`.
pub const USER_VIDEO: u32 = 0x880_0000;

/// Off-screen backing frame for terminal `term`, at +1..+3 pages from
/// the video base.
pub fn terminal_backing_frame(term: usize) -> u32 {
    debug_assert!(term < TERMINAL_COUNT);
    VIDEO_PHYS + PAGE_SIZE * (term as u32 + 1)
}

/// Physical 4 MiB frame holding the image of process `pid`.
pub fn user_frame(pid: usize) -> u32 {
    KERNEL_TOP + pid as u32 * LARGE_PAGE_SIZE
}

/// Base address of the PCB of process `pid` (top of its stack region).
pub fn pcb_base(pid: usize) -> u32 {
    KERNEL_TOP - (pid as u32 + 1) * KSTACK_SIZE
}

/// Initial kernel stack pointer for process `pid`, also the TSS `esp0`
/// loaded on every switch to it.
pub fn kernel_stack_top(pid: usize) -> u32 {
    KERNEL_TOP - pid as u32 * KSTACK_SIZE - 4
}

/// Recover the process id owning a kernel stack pointer.
///
/// Each stack is an 8 KiB-aligned region directly below `KERNEL_TOP`,
/// so the owning pid is a pure function of the pointer.
pub fn pid_from_stack(esp: u32) -> Option<usize> {
    if esp >= KERNEL_TOP || esp <= pcb_base(MAX_PROCESSES - 1) {
        return None;
    }
    let pid = ((KERNEL_TOP - esp) / KSTACK_SIZE) as usize;
    (pid < MAX_PROCESSES).then_some(pid)
}

/// True if `[addr, addr + len)` lies inside the user window a process
/// may hand to the kernel.
pub fn user_range_ok(addr: u32, len: u32) -> bool {
    if addr < USER_BASE {
        return false;
    }
    match addr.checked_add(len) {
        Some(end) => end <= USER_STACK_TOP,
        None => false,
    }
}
