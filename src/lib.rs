//! # EqOS core — a small preemptive RTOS kernel
//!
//! Fixed-priority round-robin scheduling, wraparound-safe sleep, and
//! LL/SC-based synchronization primitives for a single ARM Cortex-M4
//! core.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │     init() · create_task() · start() · yield_task()    │
//! │              sleep() · wait() / notify()                │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │  Sleep Heap        │  Sync Primitives  │
//! │  scheduler.rs│  sleep.rs          │  mutex.rs         │
//! │  ─ tick()    │  ─ insert()        │  semaphore.rs     │
//! │  ─ schedule()│  ─ extract_min()   │  queue.rs         │
//! │  ─ wait()    │                    │  mempool.rs       │
//! │  ─ notify()  │                    │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │    Wait Queue (wait_queue.rs) · Fast-Fail (fastfail.rs) │
//! ├────────────────────────────────────────────────────────┤
//! │              Task Model (task.rs) — TCB, TaskFlags      │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    PendSV · SysTick · Context Switch · LL/SC · Stack    │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory model
//!
//! - **No heap, no `alloc`**: every subsystem is statically sized via
//!   [`config`].
//! - **Fixed-size TCB array**: `[Tcb; MAX_TASKS]`, owned by the one
//!   global [`scheduler::Scheduler`].
//! - **Per-task stack**: inline `[u8; STACK_SIZE]` inside each TCB.
//! - **Critical sections**: [`sync::critical_section`], backed by
//!   `cortex_m::interrupt::free` on target.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod fastfail;
pub mod kernel;
pub mod mempool;
pub mod mutex;
pub mod queue;
pub mod scheduler;
pub mod semaphore;
pub mod sleep;
pub mod sync;
pub mod task;
pub mod wait_queue;

#[cfg(not(test))]
pub mod arch;
