//! # Task Control Block
//!
//! Defines the per-task bookkeeping the scheduler, wait fabric and sleep
//! heap all operate on. A [`Tcb`] is never shared between two of the
//! scheduler's structures at once: it lives in exactly one of {running,
//! some priority ring, some wait queue, the sleep heap, exited}.

use crate::config::STACK_SIZE;
use bitflags::bitflags;

/// Index of a task's slot in the scheduler's static task array.
///
/// Slot `0` is always the idle task.
pub type TaskId = usize;

bitflags! {
    /// Run-state bitfield carried on every TCB.
    ///
    /// Only `YIELD`, `SLEEP` and `WAIT` are read by the core today;
    /// `PRIORITY_INHERITED` is reserved for the priority-inheritance
    /// work called out as future work — no code sets it yet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u8 {
        /// Task is runnable purely because it voluntarily yielded
        /// (as opposed to being preempted by the tick).
        const YIELD = 0b0001;
        /// Task is parked in the sleep heap.
        const SLEEP = 0b0010;
        /// Task is parked on a resource's wait queue.
        const WAIT = 0b0100;
        /// Reserved: priority inheritance is not implemented.
        const PRIORITY_INHERITED = 0b1000;
    }
}

/// Per-task stack storage, aligned to 8 bytes as AAPCS requires for the
/// initial exception frame.
#[repr(align(8))]
pub struct TaskStack(pub [u8; STACK_SIZE]);

impl TaskStack {
    pub const fn new() -> Self {
        Self([0u8; STACK_SIZE])
    }
}

/// Task entry point. Receives the scratch argument passed to
/// `Scheduler::create_task` in the first argument register and must
/// never return; returning falls through to the kernel's exit
/// trampoline.
pub type TaskEntry = extern "C" fn(usize) -> !;

/// Task Control Block — the central data structure for each task.
///
/// # Field order
/// `sp` MUST remain the first field: the context-switch assembly takes
/// a `*mut Tcb`, reinterprets it as `*mut *mut u32`, and dereferences it
/// directly to read/write the saved stack pointer without going through
/// the rest of the struct's layout.
#[repr(C)]
pub struct Tcb {
    /// Saved process stack pointer. Updated on every context switch.
    /// Points into `stack`.
    pub sp: *mut u32,

    /// Unique task identifier — this TCB's own slot index.
    pub id: TaskId,

    /// Run-state bitfield (see [`TaskFlags`]).
    pub flags: TaskFlags,

    /// Static priority in `[0, PRIORITY_MAX]`. `0` is reserved for idle.
    pub priority: u8,

    /// Scratch data. Holds the absolute wake-tick while the task is
    /// parked in the sleep heap; unused otherwise.
    pub data: u32,

    /// Previous neighbor in the scheduler's per-priority ring.
    /// Valid only while the task is runnable (in a ring).
    pub ring_prev: Option<TaskId>,
    /// Next neighbor in the scheduler's per-priority ring, or the
    /// singly-linked successor in a resource's wait queue. A task is
    /// never in both structures at once, so one field covers both
    /// roles without a tagged union.
    pub ring_next: Option<TaskId>,

    /// Per-task stack memory.
    pub stack: TaskStack,

    /// Whether this slot holds a live task (`true`) or is free/exited.
    pub active: bool,
}

// Safety: Tcb carries a raw pointer (`sp`) but it always points into
// this task's own `stack` array, and all mutation happens from kernel
// code inside a critical section or from the one task that currently
// owns the slot. Mirrors the teacher crate's TCB Send/Sync rationale.
unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}

impl Tcb {
    /// An empty (unallocated) TCB, used to populate the static array.
    pub const fn empty() -> Self {
        Self {
            sp: core::ptr::null_mut(),
            id: 0,
            flags: TaskFlags::empty(),
            priority: 0,
            data: 0,
            ring_prev: None,
            ring_next: None,
            stack: TaskStack::new(),
            active: false,
        }
    }

    /// Initialize this slot for a new task. Does not touch the stack
    /// frame — that is `arch::init_task_stack`'s job.
    pub fn init(&mut self, id: TaskId, priority: u8) {
        self.id = id;
        self.flags = TaskFlags::empty();
        self.priority = priority;
        self.data = 0;
        self.ring_prev = None;
        self.ring_next = None;
        self.active = true;
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.priority == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tcb_is_inactive() {
        let tcb = Tcb::empty();
        assert!(!tcb.active);
        assert_eq!(tcb.priority, 0);
        assert!(tcb.flags.is_empty());
    }

    #[test]
    fn init_activates_and_clears_links() {
        let mut tcb = Tcb::empty();
        tcb.ring_prev = Some(3);
        tcb.ring_next = Some(4);
        tcb.init(2, 3);
        assert!(tcb.active);
        assert_eq!(tcb.id, 2);
        assert_eq!(tcb.priority, 3);
        assert_eq!(tcb.ring_prev, None);
        assert_eq!(tcb.ring_next, None);
    }

    #[test]
    fn flags_roundtrip() {
        let mut flags = TaskFlags::empty();
        flags.insert(TaskFlags::SLEEP);
        assert!(flags.contains(TaskFlags::SLEEP));
        assert!(!flags.contains(TaskFlags::WAIT));
        flags.remove(TaskFlags::SLEEP);
        flags.insert(TaskFlags::WAIT);
        assert_eq!(flags, TaskFlags::WAIT);
    }

    #[test]
    fn idle_detection() {
        let mut tcb = Tcb::empty();
        tcb.init(0, 0);
        assert!(tcb.is_idle());
        tcb.init(1, 1);
        assert!(!tcb.is_idle());
    }
}
