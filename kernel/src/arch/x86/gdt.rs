//! Global Descriptor Table and TSS.
//!
//! The bootloader hands off with a flat GDT of its own; the kernel
//! replaces it so the selectors baked into the trap gates and the
//! user-mode transition exist at the conventional slots:
//!
//! - 0x00: null
//! - 0x08: reserved (null)
//! - 0x10: kernel code (ring 0)
//! - 0x18: kernel data (ring 0)
//! - 0x20: user code (selector 0x23 with RPL 3)
//! - 0x28: user data (selector 0x2B with RPL 3)
//! - 0x30: TSS
//!
//! The TSS exists only for `ss0`/`esp0`: the stack the CPU switches to
//! on a ring-3 trap. `esp0` is rewritten on every process switch.

use core::cell::UnsafeCell;

use lazy_static::lazy_static;
use x86::dtables::{lgdt, DescriptorTablePointer};
use x86::segmentation::SegmentSelector;
use x86::Ring;

pub const KERNEL_CS: u16 = 0x10;
pub const KERNEL_DS: u16 = 0x18;
pub const USER_CS: u16 = 0x23;
pub const USER_DS: u16 = 0x2B;
const TSS_INDEX: u16 = 6;

/// 32-bit task-state segment. Only `ss0`/`esp0` are ever read by the
/// CPU in this kernel; the rest exists to give the descriptor its
/// architectural 104-byte shape.
#[derive(Debug)]
#[repr(C)]
pub struct TaskStateSegment {
    link: u16,
    _pad0: u16,
    pub esp0: u32,
    pub ss0: u16,
    _pad1: u16,
    esp1: u32,
    ss1: u16,
    _pad2: u16,
    esp2: u32,
    ss2: u16,
    _pad3: u16,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u16,
    _pad4: u16,
    cs: u16,
    _pad5: u16,
    ss: u16,
    _pad6: u16,
    ds: u16,
    _pad7: u16,
    fs: u16,
    _pad8: u16,
    gs: u16,
    _pad9: u16,
    ldtr: u16,
    _pad10: u16,
    _pad11: u16,
    iomap_base: u16,
}

impl TaskStateSegment {
    const fn new() -> Self {
        // SAFETY-free zero state; ss0 is filled in by init().
        Self {
            link: 0,
            _pad0: 0,
            esp0: 0,
            ss0: 0,
            _pad1: 0,
            esp1: 0,
            ss1: 0,
            _pad2: 0,
            esp2: 0,
            ss2: 0,
            _pad3: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            _pad4: 0,
            cs: 0,
            _pad5: 0,
            ss: 0,
            _pad6: 0,
            ds: 0,
            _pad7: 0,
            fs: 0,
            _pad8: 0,
            gs: 0,
            _pad9: 0,
            ldtr: 0,
            _pad10: 0,
            _pad11: 0,
            iomap_base: core::mem::size_of::<TaskStateSegment>() as u16,
        }
    }
}

struct TssCell(UnsafeCell<TaskStateSegment>);

// SAFETY: The TSS is written only during init and from the scheduler
// with interrupts disabled; the CPU reads it only on ring transitions.
// Single-CPU kernel, so there is no concurrent access.
unsafe impl Sync for TssCell {}

static TSS: TssCell = TssCell(UnsafeCell::new(TaskStateSegment::new()));

/// Encode a code/data segment descriptor.
const fn segment(base: u32, limit: u32, access: u8, flags: u8) -> u64 {
    (limit as u64 & 0xFFFF)
        | ((base as u64 & 0xFF_FFFF) << 16)
        | ((access as u64) << 40)
        | (((limit as u64 >> 16) & 0xF) << 48)
        | ((flags as u64 & 0xF) << 52)
        | (((base as u64 >> 24) & 0xFF) << 56)
}

lazy_static! {
    static ref GDT: [u64; 7] = {
        let tss_base = TSS.0.get() as u32;
        let tss_limit = core::mem::size_of::<TaskStateSegment>() as u32 - 1;
        [
            0,
            0,
            segment(0, 0xF_FFFF, 0x9A, 0xC), // kernel code, 4 GiB flat
            segment(0, 0xF_FFFF, 0x92, 0xC), // kernel data
            segment(0, 0xF_FFFF, 0xFA, 0xC), // user code
            segment(0, 0xF_FFFF, 0xF2, 0xC), // user data
            segment(tss_base, tss_limit, 0x89, 0x0), // available 32-bit TSS
        ]
    };
}

/// Load the GDT, reload the segment registers, and load the task
/// register.
pub fn init() {
    // SAFETY: The descriptor table is a static with a stable address.
    // CS must be reloaded with a far return; the data selectors and TR
    // reference descriptors that the table just defined. Interrupts are
    // off during early init, so no trap can observe a half-loaded
    // state.
    unsafe {
        let ptr = DescriptorTablePointer::new(&*GDT);
        lgdt(&ptr);

        core::arch::asm!(
            "push {cs}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "mov ds, {ds:x}",
            "mov es, {ds:x}",
            "mov fs, {ds:x}",
            "mov gs, {ds:x}",
            "mov ss, {ds:x}",
            cs = const KERNEL_CS as u32,
            ds = in(reg) KERNEL_DS as u32,
            tmp = out(reg) _,
        );

        (*TSS.0.get()).ss0 = KERNEL_DS;
        x86::task::load_tr(SegmentSelector::new(TSS_INDEX, Ring::Ring0));
    }
}

/// Point `esp0` at `stack_top`: the kernel stack the CPU switches to on
/// the next trap from ring 3.
///
/// Called from `execute`, `halt`, and the scheduler, always with
/// interrupts disabled.
pub fn set_kernel_stack(stack_top: u32) {
    // SAFETY: Interrupts are disabled at every call site and the kernel
    // is single-CPU, so the write cannot race a ring transition that
    // consumes esp0.
    unsafe {
        (*TSS.0.get()).esp0 = stack_top;
    }
}
