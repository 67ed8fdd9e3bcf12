//! # Scheduler
//!
//! Owns the static task array and the fixed-priority round-robin
//! scheduling decision. Per-priority runnable tasks are modeled as an
//! arena of [`Tcb`] slots linked by index (`ring_prev`/`ring_next`)
//! rather than raw pointers, each ring tracked by a `head[p]` slot
//! index into that same array.
//!
//! All mutation happens from kernel-mode call sites (syscall handlers,
//! the PendSV/SysTick path) inside a [`crate::sync::critical_section`];
//! nothing here locks on its own.

use crate::config::{MAX_TASKS, PRIORITY_LEVELS};
use crate::sleep::SleepHeap;
use crate::task::{TaskFlags, TaskId, Tcb};
use crate::wait_queue;

/// Owns every task slot and the scheduling state derived from them.
pub struct Scheduler {
    pub tasks: [Tcb; MAX_TASKS],
    /// `ring_heads[p]` is the most recently scheduled task in priority
    /// ring `p`, or `None` if that ring is empty. Index `0` (idle
    /// priority) is never populated; the idle task is tracked
    /// separately via `idle`.
    ring_heads: [Option<TaskId>; PRIORITY_LEVELS],
    pub current: TaskId,
    idle: TaskId,
    pub tick_count: u32,
    pub needs_reschedule: bool,
    sleep: SleepHeap,
}

impl Scheduler {
    /// Construct a scheduler with only the idle task (slot 0)
    /// populated. `idle_entry`/`idle_arg` are wired up by the caller
    /// via [`Scheduler::init_idle`] once stacks can be initialized.
    pub const fn new() -> Self {
        Self {
            tasks: [const { Tcb::empty() }; MAX_TASKS],
            ring_heads: [None; PRIORITY_LEVELS],
            current: 0,
            idle: 0,
            tick_count: 0,
            needs_reschedule: false,
            sleep: SleepHeap::new(),
        }
    }

    /// Initialize the idle task's bookkeeping (slot 0, priority 0).
    /// Stack frame setup is the caller's (`kernel::init`) job via
    /// `arch::init_task_stack`.
    pub fn init_idle(&mut self) {
        self.tasks[0].init(0, 0);
        self.idle = 0;
        self.current = 0;
    }

    /// Allocate the next free slot and insert it into its priority
    /// ring. Returns `None` if every slot past idle is already active.
    pub fn create_task(&mut self, priority: u8) -> Option<TaskId> {
        let slot = (1..MAX_TASKS).find(|&i| !self.tasks[i].active)?;
        self.tasks[slot].init(slot, priority);
        self.add_task(slot);
        Some(slot)
    }

    /// Insert an already-initialized task into its priority ring. Used
    /// both by `create_task` and to reinsert a task whose sleep/wait
    /// has ended.
    pub fn add_task(&mut self, id: TaskId) {
        let priority = self.tasks[id].priority as usize;
        self.ring_insert(priority, id);
    }

    /// Remove a task from its ring permanently (task function
    /// returned). The slot is left `inactive` and is never reused —
    /// exited TCBs are not returned to a free pool.
    pub fn exit_task(&mut self, id: TaskId) {
        let priority = self.tasks[id].priority as usize;
        self.ring_remove(priority, id);
        self.tasks[id].active = false;
        self.needs_reschedule = true;
    }

    /// Remove a task from its ring (used when the task is about to
    /// sleep or wait, not exit). Requests an immediate reschedule.
    pub fn remove_task(&mut self, id: TaskId) {
        let priority = self.tasks[id].priority as usize;
        self.ring_remove(priority, id);
        self.needs_reschedule = true;
    }

    /// Suspend the caller onto a resource's wait queue, unless a
    /// concurrent notify already bumped the fast-fail counter past
    /// `fail_fast_seen` — in which case this is a no-op and the caller
    /// must retry its atomic attempt instead of blocking.
    ///
    /// Returns `true` if the caller was actually suspended.
    pub fn wait(&mut self, wait_head: &mut Option<TaskId>, fail_fast_seen: u32) -> bool {
        if fail_fast_seen != crate::fastfail::current() {
            return false;
        }
        let id = self.current;
        self.remove_task(id);
        self.tasks[id].flags.insert(TaskFlags::WAIT);
        wait_queue::insert(&mut self.tasks, wait_head, id);
        true
    }

    /// Wake the highest-priority waiter on a resource's wait queue, if
    /// any, reinserting it into its priority ring. Does not itself
    /// request a context switch — callers bump the fast-fail counter
    /// before reaching here (at syscall entry) so the wakeup can never
    /// be lost.
    pub fn notify(&mut self, wait_head: &mut Option<TaskId>) {
        if let Some(id) = wait_queue::extract(&mut self.tasks, wait_head) {
            self.tasks[id].flags.remove(TaskFlags::WAIT);
            self.add_task(id);
        }
    }

    /// Put the caller to sleep until `now + ticks`. Removes it from
    /// its ring and inserts it into the sleep heap.
    pub fn sleep(&mut self, now: u32, ticks: u32) {
        let id = self.current;
        self.remove_task(id);
        self.tasks[id].flags.insert(TaskFlags::SLEEP);
        self.tasks[id].data = now.wrapping_add(ticks);
        self.sleep.insert(&self.tasks, now, id);
    }

    /// Voluntarily give up the remainder of the current time slice at
    /// the same priority.
    pub fn yield_current(&mut self) {
        self.tasks[self.current].flags.insert(TaskFlags::YIELD);
        self.needs_reschedule = true;
    }

    /// Called once per tick from the SysTick handler: advances the
    /// tick count and wakes any sleepers whose time has come.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
        let now = self.tick_count;

        while self.sleep.needs_wakeup(&self.tasks, now) {
            let Some(id) = self.sleep.extract_min(&self.tasks) else {
                break;
            };
            self.tasks[id].flags.remove(TaskFlags::SLEEP);
            self.add_task(id);
        }

        self.needs_reschedule = true;
    }

    /// Pick the next task to run. First drains any due sleepers, then
    /// scans priority levels from highest to lowest for the first
    /// non-empty ring, advancing its head. Falls back to idle.
    ///
    /// Called from the PendSV path; updates `self.current` and
    /// returns the new current task's id.
    pub fn schedule(&mut self) -> TaskId {
        let now = self.tick_count;
        while self.sleep.needs_wakeup(&self.tasks, now) {
            let Some(id) = self.sleep.extract_min(&self.tasks) else {
                break;
            };
            self.tasks[id].flags.remove(TaskFlags::SLEEP);
            self.add_task(id);
        }

        self.tasks[self.current].flags.remove(TaskFlags::YIELD);

        for priority in (1..PRIORITY_LEVELS).rev() {
            if let Some(head_id) = self.ring_heads[priority] {
                let next_id = self.tasks[head_id].ring_next.unwrap_or(head_id);
                self.ring_heads[priority] = Some(next_id);
                self.current = next_id;
                self.needs_reschedule = false;
                return next_id;
            }
        }

        self.current = self.idle;
        self.needs_reschedule = false;
        self.idle
    }

    #[inline]
    pub fn elapsed_ticks(&self) -> u32 {
        self.tick_count
    }

    #[inline]
    pub fn current_task_id(&self) -> TaskId {
        self.current
    }

    // -- ring primitives ----------------------------------------------

    fn ring_insert(&mut self, priority: usize, id: TaskId) {
        match self.ring_heads[priority] {
            None => {
                self.tasks[id].ring_prev = Some(id);
                self.tasks[id].ring_next = Some(id);
                self.ring_heads[priority] = Some(id);
            }
            Some(head_id) => {
                let head_next = self.tasks[head_id].ring_next.unwrap_or(head_id);
                self.tasks[id].ring_prev = Some(head_id);
                self.tasks[id].ring_next = Some(head_next);
                self.tasks[head_next].ring_prev = Some(id);
                self.tasks[head_id].ring_next = Some(id);
            }
        }
    }

    fn ring_remove(&mut self, priority: usize, id: TaskId) {
        let next = self.tasks[id].ring_next;
        let prev = self.tasks[id].ring_prev;

        if next == Some(id) {
            // Singleton ring.
            self.ring_heads[priority] = None;
        } else {
            if let Some(next_id) = next {
                self.tasks[next_id].ring_prev = prev;
            }
            if let Some(prev_id) = prev {
                self.tasks[prev_id].ring_next = next;
            }
            if self.ring_heads[priority] == Some(id) {
                // Next schedule() call should advance to `next`, so
                // park the head one step behind it.
                self.ring_heads[priority] = prev;
            }
        }

        self.tasks[id].ring_prev = None;
        self.tasks[id].ring_next = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_scheduler() -> Scheduler {
        let mut s = Scheduler::new();
        s.init_idle();
        s
    }

    #[test]
    fn idle_runs_with_no_other_tasks() {
        let mut s = new_scheduler();
        assert_eq!(s.schedule(), 0);
        assert_eq!(s.schedule(), 0);
    }

    #[test]
    fn single_task_runs_every_time() {
        let mut s = new_scheduler();
        let t = s.create_task(2).unwrap();
        assert_eq!(s.schedule(), t);
        assert_eq!(s.schedule(), t);
    }

    #[test]
    fn higher_priority_always_wins() {
        let mut s = new_scheduler();
        let low = s.create_task(1).unwrap();
        let high = s.create_task(3).unwrap();
        assert_eq!(s.schedule(), high);
        assert_eq!(s.schedule(), high);
        let _ = low;
    }

    #[test]
    fn round_robin_within_same_priority() {
        let mut s = new_scheduler();
        let a = s.create_task(2).unwrap();
        let b = s.create_task(2).unwrap();
        let c = s.create_task(2).unwrap();

        let first = s.schedule();
        let second = s.schedule();
        let third = s.schedule();
        let fourth = s.schedule();

        let seen = [first, second, third];
        assert!(seen.contains(&a));
        assert!(seen.contains(&b));
        assert!(seen.contains(&c));
        assert_eq!(fourth, first);
    }

    #[test]
    fn exit_task_falls_back_to_idle() {
        let mut s = new_scheduler();
        let t = s.create_task(2).unwrap();
        assert_eq!(s.schedule(), t);
        s.exit_task(t);
        assert_eq!(s.schedule(), 0);
    }

    #[test]
    fn remove_task_for_sleep_then_wake_reinserts() {
        let mut s = new_scheduler();
        let t = s.create_task(2).unwrap();
        assert_eq!(s.schedule(), t);
        s.remove_task(t);
        assert_eq!(s.schedule(), 0);
        s.add_task(t);
        assert_eq!(s.schedule(), t);
    }

    #[test]
    fn sleep_wakes_after_requested_ticks() {
        let mut s = new_scheduler();
        let t = s.create_task(2).unwrap();
        s.current = t;
        s.sleep(0, 5);
        assert_eq!(s.schedule(), 0); // only idle runnable while asleep

        for _ in 0..4 {
            s.tick();
        }
        assert_eq!(s.schedule(), 0); // not due yet

        s.tick();
        assert_eq!(s.schedule(), t); // due now
    }

    #[test]
    fn wait_then_notify_round_trips() {
        let mut s = new_scheduler();
        let t = s.create_task(2).unwrap();
        s.current = t;
        let mut wait_head = None;
        let seen = crate::fastfail::current();
        assert!(s.wait(&mut wait_head, seen));
        assert_eq!(s.schedule(), 0);

        s.notify(&mut wait_head);
        assert_eq!(s.schedule(), t);
    }

    #[test]
    fn wait_aborts_on_stale_fail_fast_snapshot() {
        let mut s = new_scheduler();
        let t = s.create_task(2).unwrap();
        s.current = t;
        let mut wait_head = None;
        let stale = crate::fastfail::current();
        crate::fastfail::bump();
        assert!(!s.wait(&mut wait_head, stale));
        // Task was never removed from its ring.
        assert_eq!(s.schedule(), t);
    }
}
