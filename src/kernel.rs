//! # Kernel
//!
//! Top-level kernel initialization and public API. The kernel owns the
//! single global [`Scheduler`] instance, exposes task lifecycle and
//! synchronization entry points, and drives system startup. Every
//! public function that touches shared state does so inside a
//! [`sync::critical_section`].
//!
//! ## Startup sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Configure idle task
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Configure SysTick
//!               ├─► Set interrupt priorities
//!               └─► Start first task via arch::start_first_task()
//! ```

#[cfg(not(test))]
use crate::arch::cortex_m4;
use crate::config::PRIORITY_MAX;
use crate::error::OsError;
use crate::scheduler::Scheduler;
use crate::sync;
use crate::task::{TaskEntry, TaskId};

/// Request a reschedule from the arch layer. On host test builds there
/// is no PendSV to pend — the scheduler-state mutation that precedes
/// this call is already visible to a test calling `Scheduler` methods
/// directly, so pending the real interrupt has nothing left to do.
#[cfg(not(test))]
#[inline]
fn pend_reschedule() {
    cortex_m4::trigger_pendsv();
}

#[cfg(test)]
#[inline]
fn pend_reschedule() {}

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler instance.
///
/// # Safety
/// Accessed only via `SCHEDULER_PTR`, set during `init()`. All access
/// is through critical sections or from ISR context, where interrupts
/// are already serialized by priority.
static mut SCHEDULER: Scheduler = Scheduler::new();

/// Raw pointer to the global scheduler. Used by the arch layer
/// (PendSV, SysTick handlers), which runs outside any Rust reference's
/// lifetime and cannot easily use one.
///
/// # Safety
/// Set once during `init()`, read from ISR context afterward.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel. Must be called before any other kernel
/// function, from the main thread, exactly once.
pub fn init() {
    unsafe {
        SCHEDULER = Scheduler::new();
        SCHEDULER_PTR = &mut SCHEDULER as *mut Scheduler;
        (*SCHEDULER_PTR).init_idle();
    }
}

/// Create a new task at the given priority and register it with the
/// scheduler. `arg` is delivered to `entry` in the first argument
/// register on first dispatch.
///
/// Priority `0` is reserved for the idle task; requesting it for a
/// user task is rejected rather than silently scheduling a task the
/// ring loop will never run.
pub fn create_task(entry: TaskEntry, arg: usize, priority: u8) -> Result<TaskId, OsError> {
    if priority > PRIORITY_MAX {
        debug_assert!(false, "priority out of range");
        return Err(OsError::InvalidPriority);
    }
    if priority == 0 {
        debug_assert!(false, "priority 0 is reserved for the idle task");
        return Err(OsError::ReservedPriority);
    }

    sync::critical_section(|| unsafe {
        let scheduler = &mut *SCHEDULER_PTR;
        let id = scheduler.create_task(priority).ok_or(OsError::OutOfTasks);
        #[cfg(not(test))]
        if let Ok(id) = id {
            cortex_m4::init_task_stack(&mut scheduler.tasks[id], entry, arg);
        }
        #[cfg(test)]
        let _ = (entry, arg);
        debug_assert!(id.is_ok(), "task array is full");
        id
    })
}

/// Start the kernel. **Does not return.**
///
/// Configures the SysTick timer, sets interrupt priorities, and
/// launches the first scheduled task.
///
/// # Safety
/// `init()` must have been called and at least one task created.
#[cfg(not(test))]
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    cortex_m4::tick_enable(&mut core_peripherals.SYST, crate::config::TICK_HZ);
    cortex_m4::set_interrupt_priorities();

    let first_sp = sync::critical_section(|| unsafe {
        let scheduler = &mut *SCHEDULER_PTR;
        let first = scheduler.schedule();
        scheduler.tasks[first].sp as *const u32
    });

    unsafe {
        cortex_m4::start_first_task(first_sp);
    }
}

/// Voluntarily give up the remainder of the current time slice.
pub fn yield_task() {
    sync::critical_section(|| unsafe {
        (*SCHEDULER_PTR).yield_current();
    });
    pend_reschedule();
}

/// Sleep the calling task for at least `ms` milliseconds (rounded up
/// to the nearest tick). Removes the caller from its ring and parks it
/// in the sleep heap.
pub fn sleep(ms: u32) {
    let ticks = ms_to_ticks(ms);
    sync::critical_section(|| unsafe {
        let scheduler = &mut *SCHEDULER_PTR;
        let now = scheduler.elapsed_ticks();
        scheduler.sleep(now, ticks);
    });
    pend_reschedule();
}

#[inline]
fn ms_to_ticks(ms: u32) -> u32 {
    let ticks = (ms as u64 * crate::config::TICK_HZ as u64) / 1000;
    (ticks.max(1) as u32).min(crate::config::MAX_SLEEP_TICKS)
}

/// Suspend the caller onto `wait_head` unless a concurrent notify
/// already invalidated `fail_fast_seen`. Returns `true` if the caller
/// actually blocked; the caller must re-attempt its atomic operation
/// either way once this returns.
pub fn wait(wait_head: &mut Option<TaskId>, fail_fast_seen: u32) -> bool {
    let suspended = sync::critical_section(|| unsafe {
        (*SCHEDULER_PTR).wait(wait_head, fail_fast_seen)
    });
    if suspended {
        pend_reschedule();
    }
    suspended
}

/// Wake the highest-priority waiter on `wait_head`, if any. Bumps the
/// global fast-fail counter before touching the wait queue, so any
/// concurrent waiter that already snapshotted the counter and is about
/// to enqueue itself instead aborts and retries its atomic attempt —
/// closing the lost-wakeup window.
pub fn notify(wait_head: &mut Option<TaskId>) {
    crate::fastfail::bump();
    sync::critical_section(|| unsafe {
        (*SCHEDULER_PTR).notify(wait_head);
    });
}

/// The currently running task's id.
pub fn current_task_id() -> TaskId {
    sync::critical_section(|| unsafe { (*SCHEDULER_PTR).current_task_id() })
}

/// Monotonic tick count since `start()`, wrapping at `u32::MAX`.
pub fn elapsed_ticks() -> u32 {
    sync::critical_section(|| unsafe { (*SCHEDULER_PTR).elapsed_ticks() })
}

/// Called from the arch layer's task-exit trampoline when a task
/// function returns instead of looping forever.
pub fn exit_current_task() {
    sync::critical_section(|| unsafe {
        let scheduler = &mut *SCHEDULER_PTR;
        let current = scheduler.current_task_id();
        scheduler.exit_task(current);
    });
    pend_reschedule();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset() {
        init();
    }

    #[test]
    fn create_task_rejects_priority_zero() {
        reset();
        extern "C" fn entry(_: usize) -> ! {
            loop {}
        }
        assert_eq!(create_task(entry, 0, 0), Err(OsError::ReservedPriority));
    }

    #[test]
    fn create_task_rejects_out_of_range_priority() {
        reset();
        extern "C" fn entry(_: usize) -> ! {
            loop {}
        }
        assert_eq!(
            create_task(entry, 0, PRIORITY_MAX + 1),
            Err(OsError::InvalidPriority)
        );
    }

    #[test]
    fn create_task_then_current_task_id_tracks_scheduler() {
        reset();
        extern "C" fn entry(_: usize) -> ! {
            loop {}
        }
        let id = create_task(entry, 0, 2).unwrap();
        sync::critical_section(|| unsafe {
            (*SCHEDULER_PTR).current = id;
        });
        assert_eq!(current_task_id(), id);
    }

    #[test]
    fn wait_then_notify_round_trip_via_kernel_api() {
        reset();
        extern "C" fn entry(_: usize) -> ! {
            loop {}
        }
        let id = create_task(entry, 0, 2).unwrap();
        sync::critical_section(|| unsafe {
            (*SCHEDULER_PTR).current = id;
        });

        let mut wait_head: Option<TaskId> = None;
        let seen = crate::fastfail::bump();
        assert!(wait(&mut wait_head, seen));
        assert_eq!(wait_head, Some(id));

        notify(&mut wait_head);
        assert_eq!(wait_head, None);
    }
}
