//! jsrunner Engine
//!
//! This crate provides:
//! - Execution configuration
//! - Script wrapping and escaping
//! - Session state and the watchdog timer
//! - The append-only output log
//! - The execution coordinator that arbitrates a single outcome per run

mod bridge;
mod coordinator;
mod error;
mod lock;
mod output;
pub mod session;
pub mod settings;
mod watchdog;
pub mod wrap;

pub use coordinator::*;
pub use error::*;
pub use output::*;
pub use session::*;
pub use settings::*;
pub use watchdog::*;
