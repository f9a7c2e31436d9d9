//! Engine error types

use jsrunner_protocol::Rejection;
use jsrunner_script_host::HostError;
use thiserror::Error;

/// Errors surfaced by the engine API
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Submission rejected: {0}")]
    Rejected(Rejection),

    #[error("Coordinator has shut down")]
    ShutDown,

    #[error("Script host error: {0}")]
    Host(#[from] HostError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
