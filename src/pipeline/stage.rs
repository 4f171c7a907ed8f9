//! Pipeline stage state machine.
//!
//! # States
//! - Decoding: parse and validate the inbound request
//! - AwaitingConnection: suspended on the pool under backpressure
//! - Executing: data-access operation running on the leased connection
//! - Encoding: serialize result or error (always succeeds)
//! - Done / Failed: terminal; final observability events emitted
//!
//! # State Transitions
//! ```text
//! Decoding → AwaitingConnection → Executing → Encoding → Done
//!     any non-terminal state → Failed
//! ```
//!
//! # Design Decisions
//! - Within one request, stages run strictly in pipeline order
//! - The deadline is checked at every transition
//! - Terminal states emit exactly one response

use std::fmt;

/// Stage of one in-flight pipeline task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decoding,
    AwaitingConnection,
    Executing,
    Encoding,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decoding => "decoding",
            Stage::AwaitingConnection => "awaiting_connection",
            Stage::Executing => "executing",
            Stage::Encoding => "encoding",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}
