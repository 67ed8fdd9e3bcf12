//! # Memory pool
//!
//! Fixed-block free-list allocator. The free-list link is stored
//! intrusively in each free block's own first four bytes (as the
//! source material does), rather than in a side table — a freed block
//! costs no extra bookkeeping memory beyond the block itself.
//!
//! Gated by one mutex (protecting the free-list head and the link
//! traversal) plus a counting semaphore whose token count always
//! equals the number of free blocks, so contention and starvation
//! follow exactly the semaphore's own conservation property.

use core::cell::UnsafeCell;

use crate::mutex::Mutex;
use crate::semaphore::Semaphore;

/// Sentinel "no next block" link value.
const NONE_LINK: u32 = u32::MAX;

pub struct MemPool<const BLOCK_SIZE: usize, const BLOCK_COUNT: usize> {
    blocks: UnsafeCell<[[u8; BLOCK_SIZE]; BLOCK_COUNT]>,
    /// Index of the most recently freed block (LIFO), or `None`.
    head: UnsafeCell<Option<usize>>,
    mutex: Mutex,
    /// Tokens = number of free blocks.
    sem: Semaphore,
}

// Safety: `blocks` and `head` are only touched while `mutex` is held.
unsafe impl<const BLOCK_SIZE: usize, const BLOCK_COUNT: usize> Sync
    for MemPool<BLOCK_SIZE, BLOCK_COUNT>
{
}

impl<const BLOCK_SIZE: usize, const BLOCK_COUNT: usize> MemPool<BLOCK_SIZE, BLOCK_COUNT> {
    const _BLOCK_SIZE_HOLDS_A_LINK: () =
        assert!(BLOCK_SIZE >= 4, "block must be large enough to hold an intrusive free-list link");

    /// Initialize with every block already free, chained in index
    /// order. Mirrors the `mem` non-null branch of the source's
    /// `init`: since construction runs single-threaded, blocks are
    /// chained directly rather than through repeated `deallocate`
    /// calls.
    pub const fn new() -> Self {
        let () = Self::_BLOCK_SIZE_HOLDS_A_LINK;
        let mut blocks = [[0u8; BLOCK_SIZE]; BLOCK_COUNT];
        let mut i = 0;
        while i < BLOCK_COUNT {
            let next = if i + 1 < BLOCK_COUNT { i as u32 + 1 } else { NONE_LINK };
            let bytes = next.to_le_bytes();
            blocks[i][0] = bytes[0];
            blocks[i][1] = bytes[1];
            blocks[i][2] = bytes[2];
            blocks[i][3] = bytes[3];
            i += 1;
        }
        Self {
            blocks: UnsafeCell::new(blocks),
            head: UnsafeCell::new(if BLOCK_COUNT > 0 { Some(0) } else { None }),
            mutex: Mutex::new(),
            sem: Semaphore::new(BLOCK_COUNT as u32, BLOCK_COUNT as u32),
        }
    }

    /// Initialize empty: the backing storage exists but every block
    /// starts allocated. Mirrors the `mem == null` branch of the
    /// source's `init` — semaphore ceiling is `BLOCK_COUNT`, tokens
    /// start at zero, and callers must `deallocate` blocks in before
    /// anything can be allocated.
    pub const fn new_empty() -> Self {
        let () = Self::_BLOCK_SIZE_HOLDS_A_LINK;
        Self {
            blocks: UnsafeCell::new([[0u8; BLOCK_SIZE]; BLOCK_COUNT]),
            head: UnsafeCell::new(None),
            mutex: Mutex::new(),
            sem: Semaphore::new(0, BLOCK_COUNT as u32),
        }
    }

    /// Allocate a block, blocking while the pool is exhausted.
    /// Contents are uninitialized (whatever the block's previous
    /// occupant, or zero for a freshly initialized full pool, left
    /// behind).
    pub fn allocate(&self) -> *mut u8 {
        self.sem.take();
        self.mutex.acquire();
        let idx = unsafe {
            let head = (*self.head.get()).expect("semaphore token without a free block");
            let next = read_link(self.block_ptr(head));
            *self.head.get() = next;
            head
        };
        self.mutex.release();
        self.block_ptr(idx)
    }

    /// Return a block to the pool. `block` must be a pointer
    /// previously returned by `allocate` on this pool and not already
    /// freed — double-free is not detected, matching the source.
    pub fn deallocate(&self, block: *mut u8) {
        let idx = self.index_of(block);
        self.mutex.acquire();
        unsafe {
            write_link(block, *self.head.get());
            *self.head.get() = Some(idx);
        }
        // Same ordering as the queue: hand out the capacity token
        // before releasing the mutex, prioritizing mutex-waiters.
        self.sem.give();
        self.mutex.release();
    }

    /// Free blocks currently available without blocking.
    pub fn available(&self) -> u32 {
        self.sem.tokens()
    }

    fn block_ptr(&self, idx: usize) -> *mut u8 {
        unsafe { (*self.blocks.get())[idx].as_mut_ptr() }
    }

    fn index_of(&self, block: *mut u8) -> usize {
        let base = self.blocks.get() as *mut u8;
        let offset = block as usize - base as usize;
        offset / BLOCK_SIZE
    }
}

fn read_link(block: *mut u8) -> Option<usize> {
    let bytes = unsafe { core::slice::from_raw_parts(block, 4) };
    let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if value == NONE_LINK {
        None
    } else {
        Some(value as usize)
    }
}

fn write_link(block: *mut u8, next: Option<usize>) {
    let value = next.map(|n| n as u32).unwrap_or(NONE_LINK);
    let bytes = value.to_le_bytes();
    unsafe {
        core::ptr::copy_nonoverlapping(bytes.as_ptr(), block, 4);
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
    fn alloc_and_free_conserve_total_blocks() {
        reset_kernel();
        let t = spawn(2);
        set_current(t);

        let pool: MemPool<8, 4> = MemPool::new();
        assert_eq!(pool.available(), 4);

        let a = pool.allocate();
        let b = pool.allocate();
        assert_eq!(pool.available(), 2);

        pool.deallocate(a);
        assert_eq!(pool.available(), 3);
        pool.deallocate(b);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn allocated_blocks_are_distinct() {
        reset_kernel();
        let t = spawn(2);
        set_current(t);

        let pool: MemPool<8, 4> = MemPool::new();
        let a = pool.allocate();
        let b = pool.allocate();
        let c = pool.allocate();
        let d = pool.allocate();
        let ptrs = [a, b, c, d];
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_ne!(ptrs[i], ptrs[j]);
            }
        }
    }

    #[test]
    fn empty_pool_starts_with_no_free_blocks() {
        reset_kernel();
        let t = spawn(2);
        set_current(t);

        let pool: MemPool<8, 4> = MemPool::new_empty();
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn exhausted_pool_parks_allocator() {
        reset_kernel();
        let allocator = spawn(2);
        set_current(allocator);

        let pool: MemPool<8, 1> = MemPool::new();
        let _only_block = pool.allocate();
        assert_eq!(pool.available(), 0);

        let seen = crate::fastfail::current();
        let wait_head = unsafe { &mut *pool.sem.wait_head_for_test() };
        assert!(crate::kernel::wait(wait_head, seen));
        assert_eq!(*wait_head, Some(allocator));
    }
}
