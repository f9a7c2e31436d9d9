//! Append-only output log

use std::sync::{Arc, Mutex};

use jsrunner_protocol::OutputLine;
use tokio::sync::broadcast;

use crate::lock::MutexExt;

const SUBSCRIBER_CAPACITY: usize = 1024;

/// Output log shared between the core and the presentation layer.
///
/// The core only appends. Lines are never rewritten or removed; clearing
/// the view is a presentation concern and starts a fresh log.
#[derive(Debug, Clone)]
pub struct OutputLog {
    lines: Arc<Mutex<Vec<OutputLine>>>,
    tx: broadcast::Sender<OutputLine>,
}

impl OutputLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            tx,
        }
    }

    pub fn append(&self, line: OutputLine) {
        tracing::trace!(line = %line, "Output");
        self.lines.lock_or_recover().push(line.clone());
        // No subscribers is fine
        let _ = self.tx.send(line);
    }

    /// Snapshot of every line so far
    pub fn lines(&self) -> Vec<OutputLine> {
        self.lines.lock_or_recover().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock_or_recover().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive lines appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<OutputLine> {
        self.tx.subscribe()
    }

    /// Render as newline-separated `"<tag>: <text>"` lines
    pub fn render(&self) -> String {
        self.lines
            .lock_or_recover()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsrunner_protocol::OutputTag;

    #[test]
    fn appends_in_order() {
        let log = OutputLog::new();
        assert!(log.is_empty());

        log.append(OutputLine::new(OutputTag::Log, "hi"));
        log.append(OutputLine::new(OutputTag::Result, "undefined"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.render(), "[Log]: hi\n[Result]: undefined");
    }

    #[test]
    fn clones_share_lines() {
        let log = OutputLog::new();
        let view = log.clone();
        log.append(OutputLine::new(OutputTag::Info, "x"));
        assert_eq!(view.lines(), vec![OutputLine::new(OutputTag::Info, "x")]);
    }

    #[tokio::test]
    async fn subscribers_see_new_lines() {
        let log = OutputLog::new();
        log.append(OutputLine::new(OutputTag::Info, "before"));

        let mut rx = log.subscribe();
        log.append(OutputLine::new(OutputTag::Error, "after"));

        let line = rx.recv().await.unwrap();
        assert_eq!(line.to_string(), "[Error]: after");
    }
}
