//! # Semaphore
//!
//! Counting semaphore built on the same LL/SC-plus-wait-queue shape as
//! [`crate::mutex::Mutex`]. `max_tokens == 0` means unbounded: `give`
//! never blocks and overflow is the caller's concern. Binary
//! semaphores are simply a counting semaphore capped at one token.

use core::cell::UnsafeCell;
use core::sync::atomic::{fence, Ordering};

use crate::error::OsError;
use crate::sync::{ll_load, sc_store};
use crate::task::TaskId;

pub struct Semaphore {
    tokens: UnsafeCell<u32>,
    max_tokens: u32,
    wait_head: UnsafeCell<Option<TaskId>>,
}

// Safety: `tokens` is contended only through LL/SC; `wait_head` is
// mutated only inside `crate::kernel::wait`/`notify`'s critical
// sections.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// General counting semaphore. `max_tokens == 0` means unbounded.
    pub const fn new(init_tokens: u32, max_tokens: u32) -> Self {
        Self {
            tokens: UnsafeCell::new(init_tokens),
            max_tokens,
            wait_head: UnsafeCell::new(None),
        }
    }

    /// Binary semaphore (`max_tokens = 1`). Rejects more than one
    /// initial token outright — unlike the debug-assert-only clamp the
    /// invariant would otherwise allow to slip through in release
    /// builds.
    pub fn init_binary(init_tokens: u32) -> Result<Self, OsError> {
        if init_tokens > 1 {
            debug_assert!(false, "binary semaphore cannot start with more than one token");
            return Err(OsError::InvalidBinarySemaphoreTokens);
        }
        Ok(Self::new(init_tokens, 1))
    }

    /// Counting semaphore with an explicit ceiling.
    pub fn init_counting(init_tokens: u32, max_tokens: u32) -> Result<Self, OsError> {
        if max_tokens > 0 && init_tokens > max_tokens {
            debug_assert!(false, "initial tokens exceed the semaphore's ceiling");
            return Err(OsError::InvalidCapacity);
        }
        Ok(Self::new(init_tokens, max_tokens))
    }

    /// Unbounded semaphore: `give` never blocks.
    pub const fn init_unbounded(init_tokens: u32) -> Self {
        Self::new(init_tokens, 0)
    }

    /// Take one token, blocking while none are available.
    pub fn take(&self) {
        loop {
            let seen = crate::fastfail::current();
            let tokens_ptr = self.tokens.get();
            let tokens = unsafe { ll_load(tokens_ptr) };

            if tokens > 0 {
                if unsafe { sc_store(tokens - 1, tokens_ptr) } {
                    fence(Ordering::SeqCst);
                    // A giver blocked on "full" may now be able to proceed.
                    let wait_head = unsafe { &mut *self.wait_head.get() };
                    crate::kernel::notify(wait_head);
                    return;
                }
                continue;
            }

            let wait_head = unsafe { &mut *self.wait_head.get() };
            crate::kernel::wait(wait_head, seen);
        }
    }

    /// Give back one token, blocking while the semaphore is at its
    /// ceiling (never, for an unbounded semaphore).
    pub fn give(&self) {
        loop {
            let seen = crate::fastfail::current();
            let tokens_ptr = self.tokens.get();
            let tokens = unsafe { ll_load(tokens_ptr) };

            let has_room = self.max_tokens == 0 || tokens < self.max_tokens;
            if has_room {
                if unsafe { sc_store(tokens + 1, tokens_ptr) } {
                    fence(Ordering::SeqCst);
                    let wait_head = unsafe { &mut *self.wait_head.get() };
                    crate::kernel::notify(wait_head);
                    return;
                }
                continue;
            }

            let wait_head = unsafe { &mut *self.wait_head.get() };
            crate::kernel::wait(wait_head, seen);
        }
    }

    #[inline]
    pub fn tokens(&self) -> u32 {
        unsafe { *self.tokens.get() }
    }

    /// Raw access to the wait queue head, for tests that need to
    /// observe parked waiters directly rather than spinning a real
    /// blocking call on a host thread.
    #[cfg(test)]
    pub(crate) fn wait_head_for_test(&self) -> *mut Option<TaskId> {
        self.wait_head.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_kernel() {
        crate::kernel::init();
    }

    fn spawn(priority: u8) -> TaskId {
        extern "C" fn entry(_: usize) -> ! {
            loop {}
        }
        crate::kernel::create_task(entry, 0, priority).unwrap()
    }

    fn set_current(id: TaskId) {
        crate::sync::critical_section(|| unsafe {
            (*crate::kernel::SCHEDULER_PTR).current = id;
        });
    }

    #[test]
    fn binary_semaphore_rejects_multiple_initial_tokens() {
        assert_eq!(
            Semaphore::init_binary(2).err(),
            Some(OsError::InvalidBinarySemaphoreTokens)
        );
        assert!(Semaphore::init_binary(1).is_ok());
    }

    #[test]
    fn counting_semaphore_rejects_overfull_init() {
        assert_eq!(
            Semaphore::init_counting(5, 4).err(),
            Some(OsError::InvalidCapacity)
        );
    }

    #[test]
    fn take_and_give_conserve_tokens() {
        reset_kernel();
        let t = spawn(2);
        set_current(t);

        let s = Semaphore::init_counting(2, 4).unwrap();
        s.take();
        assert_eq!(s.tokens(), 1);
        s.take();
        assert_eq!(s.tokens(), 0);
        s.give();
        assert_eq!(s.tokens(), 1);
        s.give();
        s.give();
        assert_eq!(s.tokens(), 3);
    }

    #[test]
    fn unbounded_give_never_blocks_at_ceiling() {
        reset_kernel();
        let t = spawn(2);
        set_current(t);

        let s = Semaphore::init_unbounded(0);
        for _ in 0..1000 {
            s.give();
        }
        assert_eq!(s.tokens(), 1000);
    }

    #[test]
    fn exhausted_semaphore_parks_waiter() {
        reset_kernel();
        let taker = spawn(2);

        let s = Semaphore::init_counting(0, 4).unwrap();
        set_current(taker);

        let seen = crate::fastfail::current();
        let wait_head = unsafe { &mut *s.wait_head.get() };
        assert!(crate::kernel::wait(wait_head, seen));
        assert_eq!(*wait_head, Some(taker));
    }
}
