//! # Kernel configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time — no dynamic allocation.

/// Maximum number of tasks the system can manage simultaneously,
/// including the idle task at slot 0. Increase with care — each task
/// consumes `STACK_SIZE` bytes of RAM.
pub const MAX_TASKS: usize = 15;

/// Number of priority levels. Priority `0` is reserved for the idle
/// task; user tasks use `1..=PRIORITY_MAX`.
pub const PRIORITY_LEVELS: usize = 5;

/// Highest user-assignable priority.
pub const PRIORITY_MAX: u8 = (PRIORITY_LEVELS - 1) as u8;

/// SysTick frequency in Hz. Determines scheduler tick granularity and
/// the unit of `OS_elapsed_ticks`.
pub const TICK_HZ: u32 = 1000;

/// Per-task stack size in bytes. Must be large enough for the deepest
/// call chain plus the hardware exception frame (32 bytes) and the
/// software-saved context (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 1024;

/// Maximum sleep duration in ticks (`2^31 - 1`, ~24.85 days at 1 ms
/// ticks). Sleeping longer yields undefined wake ordering against the
/// wraparound-safe comparison.
pub const MAX_SLEEP_TICKS: u32 = (1u32 << 31) - 1;

/// System clock frequency in Hz, used to derive the SysTick reload
/// value (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

const _: () = assert!(PRIORITY_LEVELS >= 2, "need at least the idle level plus one user level");
const _: () = assert!(MAX_TASKS >= 1, "need room for at least the idle task");
const _: () = assert!(MAX_TASKS <= 255, "task ids are carried in a u8 slot index in places");
const _: () = assert!(TICK_HZ > 0, "tick rate must be nonzero");
const _: () = assert!(SYSTEM_CLOCK_HZ >= TICK_HZ, "system clock must be able to divide down to the tick rate");
