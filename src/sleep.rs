//! # Sleep heap
//!
//! Array-backed binary min-heap of sleeping tasks, keyed on each task's
//! absolute wake-tick (`Tcb::data`), ordered correctly across tick
//! counter overflow via a wraparound-safe comparison.
//!
//! `insert` runs in task context (from `OS_sleep`) and `extract_min`
//! runs from the scheduler, which cannot block. The two can race: a
//! SysTick/PendSV pair can fire between two steps of an in-progress
//! `insert`'s sift-up and run `extract_min` to completion, reshaping the
//! heap out from under it. Each sift-up step therefore re-checks a local
//! fail-fast counter immediately before committing its swap, and retries
//! the step (re-reading the — possibly now different — heap shape)
//! rather than acting on stale indices. Unlike a plain fail-fast retry,
//! the swap itself additionally runs inside a short critical section, so
//! the race this protects against can only happen *between* sift-up
//! steps, never *during* one.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::MAX_TASKS;
use crate::sync::critical_section;
use crate::task::{TaskId, Tcb};

/// Wraparound-safe "is `a` chronologically after `b`" comparison, using
/// `reference` as the zero point for the unsigned-difference trick.
/// Correct as long as both `a` and `b` are within `2^31` ticks of
/// `reference`.
#[inline]
pub const fn is_after(a: u32, b: u32, reference: u32) -> bool {
    let da = a.wrapping_sub(reference);
    let db = b.wrapping_sub(reference);
    da > db
}

pub struct SleepHeap {
    heap: [Option<TaskId>; MAX_TASKS],
    len: usize,
    /// Local fail-fast counter, distinct from the wait/notify fabric's
    /// global one (`fastfail`). Bumped only by `extract_min`.
    fail_fast: AtomicU32,
}

impl SleepHeap {
    pub const fn new() -> Self {
        Self {
            heap: [None; MAX_TASKS],
            len: 0,
            fail_fast: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `id` (already carrying its wake-tick in `tasks[id].data`)
    /// into the heap.
    pub fn insert(&mut self, tasks: &[Tcb], now: u32, id: TaskId) {
        let mut idx = self.len;
        self.heap[idx] = Some(id);
        self.len += 1;

        while idx > 0 {
            let parent_idx = (idx - 1) / 2;

            let seen = self.fail_fast.load(Ordering::Acquire);
            let child_id = self.heap[idx].expect("sift-up slot must be occupied");
            let parent_id = self.heap[parent_idx].expect("parent slot must be occupied");
            let should_swap = is_after(tasks[parent_id].data, tasks[child_id].data, now);

            if !should_swap {
                break;
            }

            let committed = critical_section(|| {
                if self.fail_fast.load(Ordering::Acquire) != seen {
                    // extract_min ran underneath us; re-read this
                    // iteration's shape before acting on it.
                    false
                } else {
                    self.heap.swap(idx, parent_idx);
                    true
                }
            });

            if committed {
                idx = parent_idx;
            }
            // else: retry this same idx with the fresh heap shape.
        }
    }

    /// Remove and return the task with the earliest wake-tick. Runs
    /// lock-free — callable from the scheduler, which must not block.
    pub fn extract_min(&mut self, tasks: &[Tcb]) -> Option<TaskId> {
        if self.len == 0 {
            return None;
        }

        let root = self.heap[0];
        self.len -= 1;
        self.heap[0] = self.heap[self.len];
        self.heap[self.len] = None;

        if self.len > 0 {
            self.sift_down(tasks, 0);
        }

        self.fail_fast.fetch_add(1, Ordering::AcqRel);
        root
    }

    fn sift_down(&mut self, tasks: &[Tcb], mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;
            let now = tasks[self.heap[idx].unwrap()].data;

            if left < self.len
                && is_after(
                    tasks[self.heap[smallest].unwrap()].data,
                    tasks[self.heap[left].unwrap()].data,
                    now,
                )
            {
                smallest = left;
            }
            if right < self.len
                && is_after(
                    tasks[self.heap[smallest].unwrap()].data,
                    tasks[self.heap[right].unwrap()].data,
                    now,
                )
            {
                smallest = right;
            }

            if smallest == idx {
                break;
            }
            self.heap.swap(idx, smallest);
            idx = smallest;
        }
    }

    /// True iff the heap is non-empty and its earliest wake-tick is at
    /// or before `now`. Inclusive of `now == data`: a `d`-tick sleep
    /// must become runnable at tick `d`, not `d + 1`.
    pub fn needs_wakeup(&self, tasks: &[Tcb], now: u32) -> bool {
        match self.heap[0] {
            None => false,
            Some(root) => !is_after(tasks[root].data, now, now.wrapping_add(1u32 << 31)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Tcb;

    fn make_tasks() -> [Tcb; MAX_TASKS] {
        core::array::from_fn(|i| {
            let mut t = Tcb::empty();
            t.init(i, 1);
            t
        })
    }

    #[test]
    fn is_after_basic() {
        assert!(is_after(10, 5, 0));
        assert!(!is_after(5, 10, 0));
        assert!(!is_after(5, 5, 0));
    }

    #[test]
    fn is_after_handles_wraparound() {
        // current tick just wrapped past u32::MAX back to a small value.
        let a = 5u32; // "after" wrap
        let b = u32::MAX - 10; // "before" wrap, chronologically earlier
        let reference = b; // zero point near b
        assert!(is_after(a, b, reference));
    }

    #[test]
    fn extract_min_returns_earliest_wake_tick() {
        let tasks = make_tasks();
        let mut heap = SleepHeap::new();
        let mut tasks = tasks;
        tasks[1].data = 300;
        tasks[2].data = 100;
        tasks[3].data = 200;

        heap.insert(&tasks, 0, 1);
        heap.insert(&tasks, 0, 2);
        heap.insert(&tasks, 0, 3);

        assert_eq!(heap.extract_min(&tasks), Some(2));
        assert_eq!(heap.extract_min(&tasks), Some(3));
        assert_eq!(heap.extract_min(&tasks), Some(1));
        assert_eq!(heap.extract_min(&tasks), None);
    }

    #[test]
    fn needs_wakeup_reflects_due_sleepers() {
        let mut tasks = make_tasks();
        tasks[1].data = 100;
        let mut heap = SleepHeap::new();
        heap.insert(&tasks, 0, 1);

        assert!(!heap.needs_wakeup(&tasks, 50));
        assert!(heap.needs_wakeup(&tasks, 100));
        assert!(heap.needs_wakeup(&tasks, 150));
        let _ = &mut tasks;
    }

    #[test]
    fn wraparound_sleep_orders_correctly() {
        // Tick counter near the top of its range; sleeper wakes after wrap.
        let mut tasks = make_tasks();
        let now: u32 = u32::MAX - 20;
        tasks[1].data = now.wrapping_add(100); // wakes at tick 79 post-wrap
        let mut heap = SleepHeap::new();
        heap.insert(&tasks, now, 1);

        assert!(!heap.needs_wakeup(&tasks, now.wrapping_add(50)));
        assert!(heap.needs_wakeup(&tasks, now.wrapping_add(100)));
    }
}
