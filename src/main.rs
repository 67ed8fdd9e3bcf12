//! # EqOS demo firmware
//!
//! Exercises every core subsystem with the concrete scenarios the
//! kernel's testable properties are built around: staggered sleepers,
//! mutex-protected mutual exclusion, a bounded producer/consumer
//! queue, and a starved memory pool.
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `sleeper_100`/`_200`/`_300` | 2 | Sleep for 100/200/300 ms in a loop |
//! | `counter_worker` ×5 | 3 | Acquire mutex, bump/unbump a shared counter |
//! | `queue_producer` | 2 | Enqueue an incrementing sequence number |
//! | `queue_consumer` | 2 | Dequeue and verify the sequence |
//! | `pool_worker` ×4 | 1 | Allocate, hold briefly, free, against 4 blocks |
//!
//! 14 user tasks total, one under `MAX_TASKS - 1` (idle occupies slot 0).

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use eqos_core::kernel;
use eqos_core::mempool::MemPool;
use eqos_core::mutex::Mutex;
use eqos_core::queue::Queue;

// ---------------------------------------------------------------------------
// Shared resources
// ---------------------------------------------------------------------------

static COUNTER_MUTEX: Mutex = Mutex::new();
static mut SHARED_COUNTER: u32 = 0;

static SEQ_QUEUE: Queue<4, 4> = Queue::new();

static POOL: MemPool<8, 4> = MemPool::new();

// ---------------------------------------------------------------------------
// Sleep stagger
// ---------------------------------------------------------------------------

extern "C" fn sleeper_100(_: usize) -> ! {
    loop {
        kernel::sleep(100);
    }
}

extern "C" fn sleeper_200(_: usize) -> ! {
    loop {
        kernel::sleep(200);
    }
}

extern "C" fn sleeper_300(_: usize) -> ! {
    loop {
        kernel::sleep(300);
    }
}

// ---------------------------------------------------------------------------
// Mutex mutual exclusion
// ---------------------------------------------------------------------------

extern "C" fn counter_worker(_: usize) -> ! {
    loop {
        COUNTER_MUTEX.acquire();
        unsafe {
            SHARED_COUNTER += 1;
            // Simulated critical-section work; invariant holds
            // throughout: counter == 0 outside the section, or some
            // task holds the mutex.
            SHARED_COUNTER -= 1;
        }
        COUNTER_MUTEX.release();
        kernel::yield_task();
    }
}

// ---------------------------------------------------------------------------
// Bounded queue producer/consumer
// ---------------------------------------------------------------------------

extern "C" fn queue_producer(_: usize) -> ! {
    let mut seq: u32 = 0;
    loop {
        SEQ_QUEUE.enqueue(&seq.to_le_bytes());
        seq = seq.wrapping_add(1);
    }
}

extern "C" fn queue_consumer(_: usize) -> ! {
    loop {
        let mut buf = [0u8; 4];
        SEQ_QUEUE.dequeue(&mut buf);
        let _seq = u32::from_le_bytes(buf);
        // A real consumer would act on `_seq`; the demo only drains.
    }
}

// ---------------------------------------------------------------------------
// Memory pool starvation
// ---------------------------------------------------------------------------

extern "C" fn pool_worker(_: usize) -> ! {
    loop {
        let block = POOL.allocate();
        unsafe {
            core::ptr::write_bytes(block, 0xAA, 8);
        }
        kernel::yield_task();
        POOL.deallocate(block);
        kernel::yield_task();
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::init();

    kernel::create_task(sleeper_100, 0, 2).expect("failed to create sleeper_100");
    kernel::create_task(sleeper_200, 0, 2).expect("failed to create sleeper_200");
    kernel::create_task(sleeper_300, 0, 2).expect("failed to create sleeper_300");

    for _ in 0..5 {
        kernel::create_task(counter_worker, 0, 3).expect("failed to create counter_worker");
    }

    kernel::create_task(queue_producer, 0, 2).expect("failed to create queue_producer");
    kernel::create_task(queue_consumer, 0, 2).expect("failed to create queue_consumer");

    for _ in 0..4 {
        kernel::create_task(pool_worker, 0, 1).expect("failed to create pool_worker");
    }

    kernel::start(cp)
}
