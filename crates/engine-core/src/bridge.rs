//! Signals posted onto the coordinator task, and the bridge that produces
//! them from Script Host callbacks.

use jsrunner_protocol::{LogLevel, RunId, ScriptSubmission};
use jsrunner_script_host::Bridge;
use tokio::sync::{mpsc, oneshot};

/// Prefix the console interceptor puts on `console.warn` lines
const WARN_PREFIX: &str = "[Warn]: ";

/// Everything that can touch session state, in arrival order
#[derive(Debug)]
pub(crate) enum Signal {
    Start {
        run_id: RunId,
        submission: ScriptSubmission,
    },
    HostCompleted {
        run_id: RunId,
        raw: Option<String>,
    },
    BridgeResult {
        run_id: RunId,
        text: Option<String>,
    },
    BridgeError {
        run_id: RunId,
        text: Option<String>,
    },
    ConsoleLog {
        run_id: RunId,
        level: LogLevel,
        text: String,
    },
    HostFailure {
        run_id: RunId,
        description: String,
    },
    WatchdogExpired {
        run_id: RunId,
    },
    Shutdown {
        done: Option<oneshot::Sender<()>>,
    },
}

/// Bridge handed to the Script Host. It never reads session state; it only
/// forwards onto the coordinator channel.
pub(crate) struct SessionBridge {
    signals: mpsc::UnboundedSender<Signal>,
    split_console_errors: bool,
}

impl SessionBridge {
    pub(crate) fn new(signals: mpsc::UnboundedSender<Signal>, split_console_errors: bool) -> Self {
        Self {
            signals,
            split_console_errors,
        }
    }

    fn post(&self, signal: Signal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!("Bridge signal after coordinator stopped");
        }
    }
}

impl Bridge for SessionBridge {
    fn on_result(&self, run_id: RunId, text: Option<String>) {
        self.post(Signal::BridgeResult { run_id, text });
    }

    fn on_error(&self, run_id: RunId, text: Option<String>) {
        self.post(Signal::BridgeError { run_id, text });
    }

    fn on_console_log(&self, run_id: RunId, text: Option<String>) {
        let text = text.unwrap_or_else(|| "undefined".into());
        let level = if text.starts_with(WARN_PREFIX) {
            LogLevel::Warn
        } else {
            LogLevel::Log
        };
        self.post(Signal::ConsoleLog {
            run_id,
            level,
            text,
        });
    }

    fn on_console_error(&self, run_id: RunId, text: Option<String>) {
        if self.split_console_errors {
            self.post(Signal::ConsoleLog {
                run_id,
                level: LogLevel::Error,
                text: text.unwrap_or_else(|| "undefined".into()),
            });
        } else {
            self.on_error(run_id, text);
        }
    }

    fn on_host_error(&self, run_id: RunId, description: String) {
        self.post(Signal::HostFailure {
            run_id,
            description,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_lines_carry_level() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = SessionBridge::new(tx, true);
        let run_id = RunId::new();

        bridge.on_console_log(run_id, Some("[Warn]: careful".into()));
        bridge.on_console_log(run_id, None);
        bridge.on_console_error(run_id, Some("bad".into()));

        assert!(matches!(
            rx.try_recv().unwrap(),
            Signal::ConsoleLog { level: LogLevel::Warn, .. }
        ));
        match rx.try_recv().unwrap() {
            Signal::ConsoleLog { level, text, .. } => {
                assert_eq!(level, LogLevel::Log);
                assert_eq!(text, "undefined");
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            Signal::ConsoleLog { level: LogLevel::Error, .. }
        ));
    }

    #[test]
    fn conflated_console_errors_use_error_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = SessionBridge::new(tx, false);

        bridge.on_console_error(RunId::new(), Some("bad".into()));
        match rx.try_recv().unwrap() {
            Signal::BridgeError { text, .. } => assert_eq!(text.as_deref(), Some("bad")),
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[test]
    fn posting_after_shutdown_is_harmless() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let bridge = SessionBridge::new(tx, true);
        bridge.on_error(RunId::new(), Some("late".into()));
    }
}
