//! jsrunner Policy
//!
//! Decides whether a submitted script may start a session. Rejections are
//! local and synchronous: nothing reaches the Script Host unless the policy
//! allows it.

use jsrunner_protocol::{Rejection, ScriptSubmission, DEFAULT_MAX_SCRIPT_LENGTH};

/// Policy decision result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(Rejection),
}

/// Admission rules for script source
#[derive(Debug, Clone)]
pub struct SubmissionPolicy {
    /// Maximum source length in characters, after trimming
    max_script_length: usize,
}

impl SubmissionPolicy {
    pub fn new(max_script_length: usize) -> Self {
        Self { max_script_length }
    }

    /// Check if running a script is allowed
    pub fn check_script(&self, source: &str) -> PolicyDecision {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return PolicyDecision::Deny(Rejection::empty());
        }

        let length = trimmed.chars().count();
        if length > self.max_script_length {
            tracing::debug!(
                length,
                max = self.max_script_length,
                "Script exceeds size cap"
            );
            return PolicyDecision::Deny(Rejection::too_large(self.max_script_length));
        }

        PolicyDecision::Allow
    }

    /// Check the source and, if allowed, build the trimmed submission
    pub fn admit(&self, source: &str) -> Result<ScriptSubmission, Rejection> {
        match self.check_script(source) {
            PolicyDecision::Allow => Ok(ScriptSubmission::new(source.trim())),
            PolicyDecision::Deny(reason) => Err(reason),
        }
    }
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCRIPT_LENGTH)
    }
}
