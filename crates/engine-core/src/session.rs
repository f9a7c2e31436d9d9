//! Session state management

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use jsrunner_protocol::{ExecutionOutcome, RunId, ScriptSubmission, SessionStatus};

use crate::Watchdog;

/// State of one run, owned by the coordinator task.
///
/// `settle` is a single-assignment cell: the first outcome wins and every
/// later attempt returns `false` without touching anything.
#[derive(Debug)]
pub struct ExecutionSession {
    run_id: RunId,
    script: ScriptSubmission,
    status: SessionStatus,
    started_at: Option<Instant>,
    watchdog: Option<Watchdog>,
    outcome: Option<ExecutionOutcome>,
}

impl ExecutionSession {
    pub fn new(run_id: RunId, script: ScriptSubmission) -> Self {
        Self {
            run_id,
            script,
            status: SessionStatus::Idle,
            started_at: None,
            watchdog: None,
            outcome: None,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn script(&self) -> &ScriptSubmission {
        &self.script
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        self.outcome.as_ref()
    }

    /// Time since `start`, zero if never started
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Move to `Running`, taking ownership of the armed watchdog
    pub fn start(&mut self, watchdog: Watchdog) {
        if self.status != SessionStatus::Idle {
            return;
        }
        self.status = SessionStatus::Running;
        self.started_at = Some(Instant::now());
        self.watchdog = Some(watchdog);
    }

    /// Record the outcome if none has been recorded yet.
    ///
    /// Cancels the watchdog. Returns `false` if the session was already
    /// settled.
    pub fn settle(&mut self, outcome: ExecutionOutcome) -> bool {
        if self.status == SessionStatus::Settled {
            return false;
        }
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.cancel();
        }
        self.outcome = Some(outcome);
        self.status = SessionStatus::Settled;
        true
    }
}

/// Reservation gate enforcing one running session at a time.
///
/// `submit` takes the gate; only the coordinator task gives it back, after
/// the session has settled.
#[derive(Debug, Default)]
pub struct SessionGate {
    busy: AtomicBool,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the slot. Returns `false` if a session is already in flight.
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ExecutionSession {
        ExecutionSession::new(RunId::new(), ScriptSubmission::new("1+1"))
    }

    #[tokio::test]
    async fn lifecycle() {
        let mut session = session();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.elapsed(), Duration::ZERO);

        let run_id = session.run_id();
        session.start(Watchdog::arm(run_id, Duration::from_secs(60), |_| {}));
        assert!(session.is_running());

        assert!(session.settle(ExecutionOutcome::Result { value: "2".into() }));
        assert_eq!(session.status(), SessionStatus::Settled);
        assert_eq!(
            session.outcome(),
            Some(&ExecutionOutcome::Result { value: "2".into() })
        );
    }

    #[tokio::test]
    async fn settle_is_first_writer_wins() {
        let mut session = session();
        let run_id = session.run_id();
        session.start(Watchdog::arm(run_id, Duration::from_secs(60), |_| {}));

        assert!(session.settle(ExecutionOutcome::Timeout { elapsed_ms: 10 }));
        assert!(!session.settle(ExecutionOutcome::Result { value: "late".into() }));
        assert!(!session.settle(ExecutionOutcome::ScriptError {
            message: "late".into()
        }));
        assert_eq!(
            session.outcome(),
            Some(&ExecutionOutcome::Timeout { elapsed_ms: 10 })
        );
    }

    #[tokio::test]
    async fn settled_session_cannot_restart() {
        let mut session = session();
        let run_id = session.run_id();
        session.settle(ExecutionOutcome::HostError {
            description: "gone".into(),
        });
        session.start(Watchdog::arm(run_id, Duration::from_secs(60), |_| {}));
        assert_eq!(session.status(), SessionStatus::Settled);
    }

    #[test]
    fn gate_admits_one_holder() {
        let gate = SessionGate::new();
        assert!(gate.try_acquire());
        assert!(gate.is_busy());
        assert!(!gate.try_acquire());
        gate.release();
        assert!(!gate.is_busy());
        assert!(gate.try_acquire());
    }
}
