//! Session events (Engine → presentation layer)

use serde::{Deserialize, Serialize};

use crate::{Rejection, RunId};

/// The single terminal result of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Serialized success value, verbatim from the host
    Result { value: String },
    /// Error raised by the script itself
    ScriptError { message: String },
    /// The Script Host failed to load or evaluate
    HostError { description: String },
    /// Wall-clock budget exhausted
    Timeout { elapsed_ms: u64 },
    /// Turned away before a session started
    InfoRejected { reason: Rejection },
}

impl ExecutionOutcome {
    /// Whether this outcome represents a failure of some kind
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Result { .. })
    }

    #[must_use]
    pub fn to_line(&self) -> OutputLine {
        match self {
            Self::Result { value } => OutputLine::new(OutputTag::Result, value.clone()),
            Self::ScriptError { message } => OutputLine::new(OutputTag::Error, message.clone()),
            Self::HostError { description } => {
                OutputLine::new(OutputTag::HostError, description.clone())
            }
            Self::Timeout { elapsed_ms } => OutputLine::new(
                OutputTag::Error,
                format!("Execution timed out after {elapsed_ms}ms"),
            ),
            Self::InfoRejected { reason } => {
                OutputLine::new(OutputTag::Info, reason.message.clone())
            }
        }
    }
}

/// Severity of a console line reported by the script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Log,
    Warn,
    Error,
}

/// A console line that does not settle the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub run_id: RunId,
    pub level: LogLevel,
    pub text: String,
}

impl LogEvent {
    #[must_use]
    pub fn to_line(&self) -> OutputLine {
        let tag = match self.level {
            LogLevel::Log | LogLevel::Warn => OutputTag::Log,
            LogLevel::Error => OutputTag::Error,
        };
        OutputLine::new(tag, self.text.clone())
    }
}

/// Tag of an output log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTag {
    Info,
    Error,
    Result,
    Log,
    HostError,
}

impl OutputTag {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Info => "[Info]",
            Self::Error => "[Error]",
            Self::Result => "[Result]",
            Self::Log => "[Log]",
            Self::HostError => "[Host Error]",
        }
    }
}

/// One rendered line of the append-only output log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub tag: OutputTag,
    pub text: String,
}

impl OutputLine {
    #[must_use]
    pub fn new(tag: OutputTag, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }
}

impl std::fmt::Display for OutputLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.tag.label(), self.text)
    }
}

/// Notifications for observers of the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session was created and dispatched to the host
    Started { run_id: RunId },
    /// Console output for a running session
    Log { event: LogEvent },
    /// The session reached its single outcome
    Settled {
        run_id: RunId,
        outcome: ExecutionOutcome,
    },
    /// A submission was rejected without starting a session
    Rejected { reason: Rejection },
}
