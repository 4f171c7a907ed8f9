//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Construct components → Accept work
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop intake → Drain in-flight tasks → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then intake
//! - Shutdown drains with a timeout: forced exit after the deadline
//! - Long-running tasks subscribe to a broadcast shutdown signal

pub mod shutdown;

pub use shutdown::{shutdown_signal, Shutdown};
