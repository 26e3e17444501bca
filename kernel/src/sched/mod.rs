//! Round-robin scheduler over the three terminals.
//!
//! Each terminal owns one schedule slot holding the pid most recently
//! executed on it (or nothing, before its base shell exists). Every
//! timer tick advances the running terminal modulo 3 and switches to
//! that slot's process: rewrite the user directory entry, re-alias the
//! video page, point the TSS at the incoming kernel stack, and swap
//! kernel stacks. An empty slot gets a fresh `shell` launched into it.
//! There are no priorities and no preemption beyond the tick.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::mm::layout::TERMINAL_COUNT;
use crate::process::Pid;

static RUN_TERMINAL: AtomicUsize = AtomicUsize::new(0);

static SCHEDULE: Mutex<[Option<Pid>; TERMINAL_COUNT]> = Mutex::new([None; TERMINAL_COUNT]);

/// The terminal whose process currently executes.
pub fn running_terminal() -> usize {
    RUN_TERMINAL.load(Ordering::Acquire)
}

/// The pid scheduled on a terminal.
pub fn scheduled_pid(term: usize) -> Option<Pid> {
    if term >= TERMINAL_COUNT {
        return None;
    }
    SCHEDULE.lock()[term]
}

/// Slot a fresh process lands in: the first empty slot, or the slot
/// its parent occupies (the child replaces the parent on that
/// terminal). `None` when the process keeps whatever slot already
/// names it (a base shell re-executing itself).
fn pick_slot(slots: &[Option<Pid>; TERMINAL_COUNT], parent: Option<Pid>) -> Option<usize> {
    slots
        .iter()
        .position(|&slot| slot.is_none() || (parent.is_some() && slot == parent))
}

/// Install a freshly-created process in its schedule slot.
pub fn assign_slot(pid: Pid, parent: Option<Pid>) {
    let mut slots = SCHEDULE.lock();
    if let Some(slot) = pick_slot(&slots, parent) {
        slots[slot] = Some(pid);
    }
}

/// Replace every slot naming `old` (its terminal) with its parent.
/// Used by `halt`.
pub fn replace_slots(old: Pid, parent: Option<Pid>) {
    let mut slots = SCHEDULE.lock();
    for slot in slots.iter_mut() {
        if *slot == Some(old) {
            *slot = parent;
        }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod tick {
    use super::*;
    use crate::arch::x86::context::{context_switch, save_and_call};
    use crate::arch::x86::gdt;
    use crate::mm::layout::kernel_stack_top;
    use crate::mm::paging;
    use crate::process::signal::{self, Signal};

    /// Ticks between wall-clock alarm signals (10 s at 100 Hz).
    const ALARM_INTERVAL_TICKS: usize = 1000;

    static ALARM_COUNTDOWN: AtomicUsize = AtomicUsize::new(ALARM_INTERVAL_TICKS);

    /// Timer-tick entry, called from the IRQ 0 handler with interrupts
    /// disabled and the EOI already issued.
    pub fn timer_tick() {
        let previous = running_terminal();

        // Wall-clock alarm for the process whose quantum just ended.
        if ALARM_COUNTDOWN.fetch_sub(1, Ordering::Relaxed) == 1 {
            ALARM_COUNTDOWN.store(ALARM_INTERVAL_TICKS, Ordering::Relaxed);
            if let Some(pid) = scheduled_pid(previous) {
                signal::raise(pid, Signal::Alarm);
            }
        }

        let next_term = (previous + 1) % TERMINAL_COUNT;
        RUN_TERMINAL.store(next_term, Ordering::Release);

        let current = crate::process::current_pid();
        match scheduled_pid(next_term) {
            None => {
                crate::tty::realias_for_running();
                // Save a resumable context for the interrupted process,
                // then launch the slot's base shell on this stack. The
                // saved context resumes here on a later rotation and
                // falls back out through the trap trampoline.
                // SAFETY: IRQ context, interrupts disabled; the save
                // slot lives in the current process's PCB.
                unsafe {
                    save_and_call(
                        // SAFETY: sole live reference to this PCB field.
                        &mut crate::process::pcb_mut(current).sched_esp,
                        spawn_base_shell,
                    );
                }
            }
            Some(next) if next == current => {
                crate::tty::realias_for_running();
            }
            Some(next) => {
                // SAFETY: Interrupts disabled for the directory rewrite.
                unsafe { paging::map_user_slot(next) };
                crate::tty::realias_for_running();
                gdt::set_kernel_stack(kernel_stack_top(next));
                // SAFETY: Both stack contexts were produced by the
                // matching save in an earlier tick (or save_and_call);
                // interrupts are disabled across the switch.
                unsafe {
                    context_switch(
                        &mut crate::process::pcb_mut(current).sched_esp,
                        crate::process::pcb_mut(next).sched_esp,
                    );
                }
            }
        }
    }

    /// Launched by `save_and_call` when a rotation lands on an empty
    /// slot: start that terminal's base shell. `execute` never returns
    /// here; the shell lives until the machine does.
    extern "C" fn spawn_base_shell() -> ! {
        crate::process::lifecycle::execute(b"shell");
        panic!("base shell did not start");
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use tick::timer_tick;

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn timer_tick() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_processes_fill_empty_slots_in_order() {
        let mut slots: [Option<Pid>; TERMINAL_COUNT] = [None; TERMINAL_COUNT];
        // Base shells launch with no parent, one per rotation.
        for pid in 0..TERMINAL_COUNT {
            let slot = pick_slot(&slots, None).expect("empty slot available");
            assert_eq!(slot, pid);
            slots[slot] = Some(pid);
        }
        assert_eq!(slots, [Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn children_replace_their_parent_slot() {
        let slots = [Some(0), Some(1), Some(2)];
        assert_eq!(pick_slot(&slots, Some(1)), Some(1));
        // A re-executing base shell (no parent) matches nothing; its
        // slot already names the reused pid.
        assert_eq!(pick_slot(&slots, None), None);
    }

    #[test]
    fn rotation_is_strictly_modulo_three() {
        let mut term = 0usize;
        let visits: std::vec::Vec<usize> = (0..7)
            .map(|_| {
                term = (term + 1) % TERMINAL_COUNT;
                term
            })
            .collect();
        assert_eq!(visits, std::vec![1, 2, 0, 1, 2, 0, 1]);
    }
}
