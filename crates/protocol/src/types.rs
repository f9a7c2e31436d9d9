//! Common types shared by the policy, host and engine crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one execution session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A script accepted for execution.
///
/// Built by the submission policy once the source has passed the empty and
/// size checks, so holders can rely on both invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSubmission {
    source: String,
    length: usize,
    submitted_at: DateTime<Utc>,
}

impl ScriptSubmission {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let length = source.chars().count();
        Self {
            source,
            length,
            submitted_at: Utc::now(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Length in characters
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// Lifecycle of the coordinator's session slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Settled,
}

impl SessionStatus {
    /// Whether a new submission would be accepted
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Why a submission was turned away before any session started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    Empty,
    TooLarge,
    Busy,
}

impl RejectCode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooLarge => "too_large",
            Self::Busy => "busy",
        }
    }
}

impl std::fmt::Display for RejectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection with a message suitable for the output log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: RejectCode,
    pub message: String,
}

impl Rejection {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            code: RejectCode::Empty,
            message: "Please enter a script.".into(),
        }
    }

    #[must_use]
    pub fn too_large(max_length: usize) -> Self {
        Self {
            code: RejectCode::TooLarge,
            message: format!("Script too large (max {max_length} characters)."),
        }
    }

    #[must_use]
    pub fn busy() -> Self {
        Self {
            code: RejectCode::Busy,
            message: "Execution in progress. Please wait.".into(),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Rejection {}

/// The Script Host's return channel, decoded once at the coordinator boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HostReturn {
    /// The host produced no value at all
    None,
    /// `null` / `undefined`
    Sentinel,
    /// Already-serialized payload, kept verbatim
    Value(String),
}

impl HostReturn {
    #[must_use]
    pub fn decode(raw: Option<String>) -> Self {
        match raw {
            None => Self::None,
            Some(text) if text == "null" || text == "undefined" => Self::Sentinel,
            Some(text) => Self::Value(text),
        }
    }
}
