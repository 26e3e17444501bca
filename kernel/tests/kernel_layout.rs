//! Properties of the fixed memory map.

use triplex_kernel::mm::layout::{
    kernel_stack_top, pcb_base, pid_from_stack, user_frame, KERNEL_TOP, KSTACK_SIZE,
    LARGE_PAGE_SIZE, MAX_PROCESSES, USER_BASE, USER_IMAGE, USER_STACK_TOP, USER_VIDEO,
};

#[test]
fn every_pcb_is_aligned_and_disjoint() {
    for pid in 0..MAX_PROCESSES {
        let base = pcb_base(pid);
        assert_eq!(base % KSTACK_SIZE, 0, "pid {pid}");
        assert!(base < KERNEL_TOP);
        for other in pid + 1..MAX_PROCESSES {
            assert!(pcb_base(other).abs_diff(base) >= KSTACK_SIZE);
        }
    }
}

#[test]
fn the_stack_pointer_identifies_the_process() {
    for pid in 0..MAX_PROCESSES {
        // pid == (stack region top - esp) / 8 KiB everywhere inside
        // the region.
        for probe in [4u32, 0x100, KSTACK_SIZE - 4] {
            let esp = KERNEL_TOP - pid as u32 * KSTACK_SIZE - probe;
            assert_eq!(pid_from_stack(esp), Some(pid), "pid {pid} probe {probe}");
        }
        assert_eq!(kernel_stack_top(pid) % 4, 0);
    }
}

#[test]
fn user_addresses_sit_in_the_fourth_gigabyte_window() {
    assert_eq!(USER_BASE, 0x0800_0000);
    assert_eq!(USER_IMAGE, 0x0804_8000);
    assert_eq!(USER_STACK_TOP, 0x0840_0000);
    assert_eq!(USER_VIDEO, 0x0880_0000);
    assert!(USER_IMAGE > USER_BASE && USER_IMAGE < USER_STACK_TOP);
}

#[test]
fn process_frames_tile_physical_memory_above_the_kernel() {
    for pid in 0..MAX_PROCESSES {
        assert_eq!(user_frame(pid), KERNEL_TOP + pid as u32 * LARGE_PAGE_SIZE);
        assert_eq!(user_frame(pid) % LARGE_PAGE_SIZE, 0);
    }
}
