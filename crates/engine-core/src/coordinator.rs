//! Execution coordinator
//!
//! Owns the active [`ExecutionSession`] on a single tokio task. Host
//! completions, bridge reports and watchdog expiry all arrive as
//! [`Signal`]s on one channel, so session state has exactly one writer and
//! the first settling signal wins.

use std::sync::{Arc, Mutex};

use jsrunner_policy::SubmissionPolicy;
use jsrunner_protocol::{
    ExecutionOutcome, HostReturn, LogEvent, LogLevel, Rejection, RunId, ScriptSubmission,
    SessionEvent, SessionStatus,
};
use jsrunner_script_host::ScriptHost;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::bridge::{SessionBridge, Signal};
use crate::lock::MutexExt;
use crate::wrap::wrap_script;
use crate::{EngineError, ExecutionConfig, ExecutionSession, OutputLog, SessionGate, Watchdog};

const EVENT_CAPACITY: usize = 4096;

/// Handle to a running coordinator
pub struct Coordinator {
    config: ExecutionConfig,
    policy: SubmissionPolicy,
    gate: Arc<SessionGate>,
    signals: mpsc::UnboundedSender<Signal>,
    events: broadcast::Sender<SessionEvent>,
    status: Arc<watch::Sender<SessionStatus>>,
    log: OutputLog,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Install the bridge on `host` and start the coordinator task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        host: Arc<dyn ScriptHost>,
        config: ExecutionConfig,
        log: OutputLog,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let bridge = SessionBridge::new(signals_tx.clone(), config.split_console_errors);
        host.install_bridge(Arc::new(bridge))?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(SessionStatus::Idle);
        let status = Arc::new(status);
        let gate = Arc::new(SessionGate::new());

        let task = CoordinatorTask {
            host,
            config: config.clone(),
            gate: gate.clone(),
            signals: signals_tx.clone(),
            events: events.clone(),
            status: status.clone(),
            log: log.clone(),
            session: None,
        };
        let handle = tokio::spawn(task.run(signals_rx));

        tracing::debug!(
            timeout_ms = config.execution_timeout_ms,
            max_length = config.max_script_length,
            "Coordinator started"
        );

        Ok(Self {
            policy: SubmissionPolicy::new(config.max_script_length),
            config,
            gate,
            signals: signals_tx,
            events,
            status,
            log,
            task: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn log(&self) -> &OutputLog {
        &self.log
    }

    /// Observe session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Observe the session status. `Running` is published by `submit`
    /// itself, so a busy rejection is never observed alongside a ready status.
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Submit a script. Returns as soon as the run is dispatched; its outcome
    /// arrives later through the log and [`SessionEvent::Settled`].
    ///
    /// Empty, oversized and busy submissions are rejected here without
    /// starting a session; the rejection is also appended to the log.
    pub fn submit(&self, script: &str) -> Result<RunId, EngineError> {
        let submission = match self.policy.admit(script) {
            Ok(submission) => submission,
            Err(reason) => return Err(self.reject(reason)),
        };

        if !self.gate.try_acquire() {
            return Err(self.reject(Rejection::busy()));
        }

        let previous = self.status.send_replace(SessionStatus::Running);

        let run_id = RunId::new();
        if self
            .signals
            .send(Signal::Start { run_id, submission })
            .is_err()
        {
            self.status.send_replace(previous);
            self.gate.release();
            return Err(EngineError::ShutDown);
        }
        Ok(run_id)
    }

    /// Submit and wait for the run's single outcome
    pub async fn run(&self, script: &str) -> ExecutionOutcome {
        let mut events = self.subscribe();
        let run_id = match self.submit(script) {
            Ok(run_id) => run_id,
            Err(EngineError::Rejected(reason)) => return ExecutionOutcome::InfoRejected { reason },
            Err(e) => {
                return ExecutionOutcome::HostError {
                    description: e.to_string(),
                }
            }
        };

        loop {
            match events.recv().await {
                Ok(SessionEvent::Settled { run_id: id, outcome }) if id == run_id => return outcome,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Session event receiver lagged");
                }
                Err(RecvError::Closed) => {
                    return ExecutionOutcome::HostError {
                        description: EngineError::ShutDown.to_string(),
                    }
                }
            }
        }
    }

    /// Settle any running session, stop the Script Host and wait for the
    /// coordinator task to finish.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .signals
            .send(Signal::Shutdown {
                done: Some(done_tx),
            })
            .is_ok()
        {
            let _ = done_rx.await;
        }

        let handle = self.task.lock_or_recover().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Coordinator task ended abnormally");
            }
        }
    }

    fn reject(&self, reason: Rejection) -> EngineError {
        tracing::debug!(code = %reason.code, "Submission rejected");
        let outcome = ExecutionOutcome::InfoRejected {
            reason: reason.clone(),
        };
        self.log.append(outcome.to_line());
        let _ = self.events.send(SessionEvent::Rejected {
            reason: reason.clone(),
        });
        EngineError::Rejected(reason)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        // Best effort when `shutdown` was never awaited
        let _ = self.signals.send(Signal::Shutdown { done: None });
    }
}

/// State owned by the coordinator task
struct CoordinatorTask {
    host: Arc<dyn ScriptHost>,
    config: ExecutionConfig,
    gate: Arc<SessionGate>,
    signals: mpsc::UnboundedSender<Signal>,
    events: broadcast::Sender<SessionEvent>,
    status: Arc<watch::Sender<SessionStatus>>,
    log: OutputLog,
    session: Option<ExecutionSession>,
}

impl CoordinatorTask {
    async fn run(mut self, mut signals: mpsc::UnboundedReceiver<Signal>) {
        while let Some(signal) = signals.recv().await {
            match signal {
                Signal::Shutdown { done } => {
                    self.teardown().await;
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    return;
                }
                other => self.handle(other),
            }
        }
        self.teardown().await;
    }

    fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::Start { run_id, submission } => self.start(run_id, submission),
            Signal::HostCompleted { run_id, raw } => {
                let outcome = match HostReturn::decode(raw) {
                    HostReturn::Sentinel => ExecutionOutcome::Result {
                        value: "undefined".into(),
                    },
                    HostReturn::Value(value) => ExecutionOutcome::Result { value },
                    HostReturn::None => ExecutionOutcome::HostError {
                        description: "Script host returned no result".into(),
                    },
                };
                self.settle(run_id, outcome, "host");
            }
            Signal::BridgeResult { run_id, text } => {
                let value = text.unwrap_or_else(|| "undefined".into());
                self.settle(run_id, ExecutionOutcome::Result { value }, "bridge result");
            }
            Signal::BridgeError { run_id, text } => {
                let message = text.unwrap_or_else(|| "Unknown error".into());
                self.settle(run_id, ExecutionOutcome::ScriptError { message }, "bridge error");
            }
            Signal::HostFailure {
                run_id,
                description,
            } => {
                self.settle(run_id, ExecutionOutcome::HostError { description }, "host failure");
            }
            Signal::WatchdogExpired { run_id } => {
                let outcome = ExecutionOutcome::Timeout {
                    elapsed_ms: self.config.execution_timeout_ms,
                };
                if self.settle(run_id, outcome, "watchdog") {
                    self.host.abort();
                }
            }
            Signal::ConsoleLog {
                run_id,
                level,
                text,
            } => self.console(run_id, level, text),
            Signal::Shutdown { .. } => {}
        }
    }

    fn start(&mut self, run_id: RunId, submission: ScriptSubmission) {
        let wrapped = wrap_script(submission.source(), &self.config);
        let mut session = ExecutionSession::new(run_id, submission);

        let signals = self.signals.clone();
        let watchdog = Watchdog::arm(run_id, self.config.execution_timeout(), move |run_id| {
            let _ = signals.send(Signal::WatchdogExpired { run_id });
        });
        session.start(watchdog);

        tracing::info!(
            %run_id,
            length = session.script().length(),
            submitted_at = %session.script().submitted_at(),
            "Session started"
        );
        self.session = Some(session);
        self.status.send_replace(SessionStatus::Running);
        let _ = self.events.send(SessionEvent::Started { run_id });

        let signals = self.signals.clone();
        let dispatched = self.host.evaluate(
            run_id,
            wrapped,
            Box::new(move |raw| {
                let _ = signals.send(Signal::HostCompleted { run_id, raw });
            }),
        );
        if let Err(e) = dispatched {
            tracing::warn!(%run_id, error = %e, "Script host refused evaluation");
            self.settle(
                run_id,
                ExecutionOutcome::HostError {
                    description: e.to_string(),
                },
                "dispatch",
            );
        }
    }

    /// The running session for `run_id`, if there is one
    fn active(&mut self, run_id: RunId) -> Option<&mut ExecutionSession> {
        self.session
            .as_mut()
            .filter(|s| s.run_id() == run_id && s.is_running())
    }

    /// Record `outcome` for `run_id` unless the session already settled.
    /// Returns whether this call settled it.
    fn settle(&mut self, run_id: RunId, outcome: ExecutionOutcome, source: &str) -> bool {
        let Some(session) = self.active(run_id) else {
            tracing::debug!(%run_id, source, "Dropping signal for settled or unknown run");
            return false;
        };
        if !session.settle(outcome.clone()) {
            return false;
        }
        let elapsed_ms = session.elapsed().as_millis() as u64;

        tracing::info!(%run_id, source, elapsed_ms, failed = outcome.is_failure(), "Session settled");
        self.log.append(outcome.to_line());
        // Publish before opening the gate so a following submit's `Running`
        // is never overwritten
        self.status.send_replace(SessionStatus::Settled);
        self.gate.release();
        let _ = self.events.send(SessionEvent::Settled { run_id, outcome });
        true
    }

    fn console(&mut self, run_id: RunId, level: LogLevel, text: String) {
        if self.active(run_id).is_none() {
            tracing::debug!(%run_id, "Dropping console line for settled or unknown run");
            return;
        }
        let event = LogEvent {
            run_id,
            level,
            text,
        };
        self.log.append(event.to_line());
        let _ = self.events.send(SessionEvent::Log { event });
    }

    async fn teardown(&mut self) {
        if let Some(run_id) = self.session.as_ref().filter(|s| s.is_running()).map(|s| s.run_id()) {
            self.settle(
                run_id,
                ExecutionOutcome::HostError {
                    description: "Execution cancelled: script host shut down".into(),
                },
                "shutdown",
            );
        }
        self.session = None;

        let host = self.host.clone();
        host.abort();
        if let Err(e) = tokio::task::spawn_blocking(move || host.dispose()).await {
            tracing::warn!(error = %e, "Script host dispose failed");
        }
        tracing::debug!("Coordinator stopped");
    }
}
