//! jsrunner Protocol
//!
//! Defines the data exchanged between the execution core and whatever
//! presents its output. This crate is the source of truth for sessions,
//! outcomes and output lines.

mod events;
mod types;

pub use events::*;
pub use types::*;

/// Default wall-clock budget for one evaluation
pub const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 5_000;

/// Default cap on script source length, in characters
pub const DEFAULT_MAX_SCRIPT_LENGTH: usize = 10_000;
