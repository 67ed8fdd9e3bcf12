//! # Bounded queue
//!
//! Fixed-capacity byte-copy ring buffer gated by two semaphores (free
//! slots, readable items) plus a mutex around the copy itself. Slots
//! are modeled as `[u8; ITEM_SIZE]` rather than a single flat buffer
//! sliced by a runtime stride, which keeps the backing storage a plain
//! stable-Rust array type instead of requiring a `CAPACITY * ITEM_SIZE`
//! const expression.
//!
//! Giving the readable-item token before releasing the mutex (see
//! [`Queue::enqueue`]) is deliberate: it prioritizes a mutex-waiter's
//! wakeup over a reader that hasn't blocked yet.

use core::cell::UnsafeCell;

use crate::mutex::Mutex;
use crate::semaphore::Semaphore;

pub struct Queue<const CAPACITY: usize, const ITEM_SIZE: usize> {
    buffer: UnsafeCell<[[u8; ITEM_SIZE]; CAPACITY]>,
    head: UnsafeCell<usize>,
    tail: UnsafeCell<usize>,
    mutex: Mutex,
    /// Tokens = number of readable items.
    sem_r: Semaphore,
    /// Tokens = number of free slots.
    sem_w: Semaphore,
}

// Safety: `buffer`/`head`/`tail` are only ever touched while `mutex`
// is held.
unsafe impl<const CAPACITY: usize, const ITEM_SIZE: usize> Sync for Queue<CAPACITY, ITEM_SIZE> {}

impl<const CAPACITY: usize, const ITEM_SIZE: usize> Queue<CAPACITY, ITEM_SIZE> {
    pub const fn new() -> Self {
        const { assert!(CAPACITY > 0, "queue capacity must be nonzero") };
        Self {
            buffer: UnsafeCell::new([[0u8; ITEM_SIZE]; CAPACITY]),
            head: UnsafeCell::new(0),
            tail: UnsafeCell::new(0),
            mutex: Mutex::new(),
            sem_r: Semaphore::new(0, CAPACITY as u32),
            sem_w: Semaphore::new(CAPACITY as u32, CAPACITY as u32),
        }
    }

    /// Copy `item` into the queue, blocking while full.
    pub fn enqueue(&self, item: &[u8; ITEM_SIZE]) {
        self.sem_w.take();
        self.mutex.acquire();
        unsafe {
            let head = *self.head.get();
            (*self.buffer.get())[head] = *item;
            *self.head.get() = (head + 1) % CAPACITY;
        }
        self.sem_r.give();
        self.mutex.release();
    }

    /// Copy the oldest item out of the queue into `out`, blocking
    /// while empty.
    pub fn dequeue(&self, out: &mut [u8; ITEM_SIZE]) {
        self.sem_r.take();
        self.mutex.acquire();
        unsafe {
            let tail = *self.tail.get();
            *out = (*self.buffer.get())[tail];
            *self.tail.get() = (tail + 1) % CAPACITY;
        }
        self.sem_w.give();
        self.mutex.release();
    }

    /// Number of items currently readable without blocking.
    pub fn len(&self) -> u32 {
        self.sem_r.tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_kernel() {
        crate::kernel::init();
    }

    fn spawn(priority: u8) -> crate::task::TaskId {
        extern "C" fn entry(_: usize) -> ! {
            loop {}
        }
        crate::kernel::create_task(entry, 0, priority).unwrap()
    }

    fn set_current(id: crate::task::TaskId) {
        crate::sync::critical_section(|| unsafe {
            (*crate::kernel::SCHEDULER_PTR).current = id;
        });
    }

    #[test]
    fn fifo_order_is_preserved() {
        reset_kernel();
        let t = spawn(2);
        set_current(t);

        let q: Queue<4, 4> = Queue::new();
        for seq in 0u32..4 {
            q.enqueue(&seq.to_le_bytes());
        }
        assert_eq!(q.len(), 4);

        for expected in 0u32..4 {
            let mut buf = [0u8; 4];
            q.dequeue(&mut buf);
            assert_eq!(u32::from_le_bytes(buf), expected);
        }
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn wraps_around_the_backing_buffer() {
        reset_kernel();
        let t = spawn(2);
        set_current(t);

        let q: Queue<3, 1> = Queue::new();
        for seq in 0u8..3 {
            q.enqueue(&[seq]);
        }
        let mut buf = [0u8; 1];
        q.dequeue(&mut buf);
        assert_eq!(buf, [0]);
        q.enqueue(&[3]);

        let mut out = [[0u8; 1]; 3];
        for slot in out.iter_mut() {
            q.dequeue(slot);
        }
        assert_eq!(out, [[1], [2], [3]]);
    }

    #[test]
    fn full_queue_parks_producer() {
        reset_kernel();
        let producer = spawn(2);
        set_current(producer);

        let q: Queue<1, 1> = Queue::new();
        q.enqueue(&[1]);
        assert_eq!(q.sem_w.tokens(), 0);

        let seen = crate::fastfail::current();
        let wait_head = unsafe { &mut *q.sem_w.wait_head_for_test() };
        assert!(crate::kernel::wait(wait_head, seen));
        assert_eq!(*wait_head, Some(producer));
    }
}
