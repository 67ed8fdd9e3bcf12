//! # Fast-fail counter
//!
//! One process-wide monotonic counter that separates notify epochs from
//! wait decisions, closing the classic lost-wakeup window between "I
//! observed the resource unavailable" and "I enqueued myself on its wait
//! list" without disabling interrupts for the whole attempt.
//!
//! A would-be waiter snapshots [`current`] before its atomic attempt and
//! passes the snapshot into `Scheduler::wait`. If a concurrent `notify`
//! bumped the counter in between, the wait is aborted (not suspended)
//! and the caller retries its atomic acquire instead of blocking on a
//! wakeup that already happened.

use core::sync::atomic::{AtomicU32, Ordering};

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Snapshot the counter before an atomic attempt.
#[inline]
pub fn current() -> u32 {
    COUNTER.load(Ordering::Acquire)
}

/// Bump the counter. Called at the top of every notify, before the
/// resource's wait-queue head is read.
#[inline]
pub fn bump() -> u32 {
    COUNTER.fetch_add(1, Ordering::AcqRel) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_is_monotonic_and_visible() {
        let before = current();
        let after = bump();
        assert_eq!(after, before + 1);
        assert_eq!(current(), after);
    }
}
