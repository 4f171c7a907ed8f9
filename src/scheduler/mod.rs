//! Cooperative task scheduling subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline task
//!     → scheduler.rs (spawn onto fixed worker run-loops, track in-flight)
//!     → task.rs (deadline checked on every poll, cooperative cancellation)
//!     → suspension points (pool acquire, downstream I/O) return Pending
//!       with a registered Waker; the run-loop resumes on wake
//! ```
//!
//! # Design Decisions
//! - Fixed worker count (≈ CPU cores); no stage ever blocks a worker on I/O
//! - Deadline expiry and cancel() both surface as DeadlineExceeded at the
//!   task's next poll; the task future is then dropped, running every
//!   RAII cleanup (connection leases included)
//! - Tasks resume in wake order; no ordering across independent requests
//! - In-flight count backs graceful drain at shutdown

#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod task;

pub use scheduler::Scheduler;
pub use task::{CancelToken, TaskHandle};
