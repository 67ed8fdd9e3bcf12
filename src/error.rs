//! # Error types
//!
//! The core's public fallible entry points return `Result<T, OsError>`
//! instead of silently clamping, pairing each rejection with a
//! `debug_assert!` at the call site so development builds still halt
//! immediately while release builds degrade the way §7 describes.
//!
//! Blocking calls (`acquire`, `take`, `enqueue`, `alloc`) never return a
//! `Result` — indefinite blocking is a documented design property, not
//! a failure mode.

/// Reasons a kernel entry point can reject a request outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OsError {
    /// `create_task` called with no free slot left in the task array.
    OutOfTasks,
    /// A non-idle task was requested at priority `0`, which the
    /// scheduler's ring loop (`1..PRIORITY_MAX`) would never run.
    ReservedPriority,
    /// A priority value fell outside `[0, PRIORITY_MAX]`.
    InvalidPriority,
    /// `sem::init_binary` called with more than one initial token.
    InvalidBinarySemaphoreTokens,
    /// A queue or pool was initialized with a zero-sized or zero-count
    /// backing buffer.
    InvalidCapacity,
}
