//! # Recursive mutex
//!
//! Mutual exclusion built directly on the LL/SC primitives: the owner
//! word is the only piece of state contended on (recursion counter and
//! wait queue are touched only by the current owner or inside a
//! critical section), so acquisition never needs to disable
//! interrupts for longer than a single exclusive store.

use core::cell::UnsafeCell;
use core::sync::atomic::{fence, Ordering};

use crate::sync::{ll_load, sc_store};
use crate::task::TaskId;

/// Sentinel owner value meaning "unowned". `TaskId` values never reach
/// this high (`MAX_TASKS` is far below `u32::MAX`).
const FREE: u32 = u32::MAX;

/// A recursive mutex: the owning task may acquire it again without
/// blocking, and must release it exactly as many times as it acquired
/// it before another task can take ownership.
pub struct Mutex {
    owner: UnsafeCell<u32>,
    counter: UnsafeCell<u32>,
    wait_head: UnsafeCell<Option<TaskId>>,
}

// Safety: `owner` is only ever written via a successful `sc_store`
// (effectively a single-word CAS) or by the current owner while it
// holds the mutex; `counter` is mutated only by whichever task
// currently owns it; `wait_head` is mutated only from inside
// `crate::kernel::wait`/`notify`'s critical sections.
unsafe impl Sync for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            owner: UnsafeCell::new(FREE),
            counter: UnsafeCell::new(0),
            wait_head: UnsafeCell::new(None),
        }
    }

    /// Acquire the mutex, blocking if another task holds it. Reentrant:
    /// the current owner may call this again without deadlocking.
    pub fn acquire(&self) {
        let current = crate::kernel::current_task_id() as u32;

        loop {
            let seen = crate::fastfail::current();
            let owner_ptr = self.owner.get();

            let owner = unsafe { ll_load(owner_ptr) };

            if owner == FREE {
                if unsafe { sc_store(current, owner_ptr) } {
                    fence(Ordering::SeqCst);
                    break;
                }
                continue;
            }

            if owner == current {
                break;
            }

            let wait_head = unsafe { &mut *self.wait_head.get() };
            crate::kernel::wait(wait_head, seen);
        }

        unsafe {
            *self.counter.get() += 1;
        }
    }

    /// Release one level of ownership. Only has an effect if the
    /// caller is the current owner; a non-owner release is a no-op in
    /// release builds and asserts in development.
    pub fn release(&self) {
        let current = crate::kernel::current_task_id() as u32;
        let owner = unsafe { *self.owner.get() };

        debug_assert!(owner == current, "release called by non-owner");
        if owner != current {
            return;
        }

        fence(Ordering::SeqCst);
        let counter = unsafe {
            let c = self.counter.get();
            *c -= 1;
            *c
        };

        if counter == 0 {
            unsafe {
                *self.owner.get() = FREE;
            }
            // Benign race: a non-waiting task may acquire between the
            // clear above and the notify below. The notified waiter
            // simply finds the mutex taken again and waits once more.
            let wait_head = unsafe { &mut *self.wait_head.get() };
            crate::kernel::notify(wait_head);
        }
    }
}
