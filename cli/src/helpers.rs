//! Output rendering and REPL input buffering

use jsrunner_engine::OutputLog;
use jsrunner_protocol::{ExecutionOutcome, OutputLine};

/// Render one output line, either as `"<tag>: <text>"` or as JSON
pub fn render_line(line: &OutputLine, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string(line)?)
    } else {
        Ok(line.to_string())
    }
}

/// Print every line appended since `from`. Returns the new cursor.
pub fn print_since(log: &OutputLog, from: usize, json: bool) -> anyhow::Result<usize> {
    let lines = log.lines();
    for line in lines.iter().skip(from) {
        println!("{}", render_line(line, json)?);
    }
    Ok(lines.len())
}

/// Process exit code for a one-shot run
pub fn exit_code(outcome: &ExecutionOutcome) -> u8 {
    u8::from(outcome.is_failure())
}

/// What the REPL should do after a line of input
#[derive(Debug, PartialEq, Eq)]
pub enum ReplAction {
    /// Keep reading
    Continue,
    /// Submit the buffered script
    Submit(String),
    Clear,
    Quit,
}

/// Multi-line script buffer. A blank line submits what has been typed.
#[derive(Debug, Default)]
pub struct ReplBuffer {
    lines: Vec<String>,
}

impl ReplBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn push(&mut self, input: &str) -> ReplAction {
        match input.trim() {
            ":quit" | ":q" => ReplAction::Quit,
            ":clear" => {
                self.lines.clear();
                ReplAction::Clear
            }
            "" if self.lines.is_empty() => ReplAction::Continue,
            "" => ReplAction::Submit(std::mem::take(&mut self.lines).join("\n")),
            _ => {
                self.lines.push(input.to_string());
                ReplAction::Continue
            }
        }
    }

    /// Whatever is left when input ends
    pub fn finish(&mut self) -> Option<String> {
        if self.lines.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.lines).join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsrunner_protocol::{OutputTag, Rejection};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn renders_plain_and_json() {
        let line = OutputLine::new(OutputTag::HostError, "gone");
        assert_eq!(render_line(&line, false).unwrap(), "[Host Error]: gone");
        assert_eq!(
            render_line(&line, true).unwrap(),
            r#"{"tag":"host_error","text":"gone"}"#
        );
    }

    #[rstest]
    #[case(ExecutionOutcome::Result { value: "2".into() }, 0)]
    #[case(ExecutionOutcome::ScriptError { message: "boom".into() }, 1)]
    #[case(ExecutionOutcome::Timeout { elapsed_ms: 5 }, 1)]
    #[case(ExecutionOutcome::HostError { description: "x".into() }, 1)]
    #[case(ExecutionOutcome::InfoRejected { reason: Rejection::empty() }, 1)]
    fn exit_codes(#[case] outcome: ExecutionOutcome, #[case] expected: u8) {
        assert_eq!(exit_code(&outcome), expected);
    }

    #[test]
    fn blank_line_submits_buffer() {
        let mut buffer = ReplBuffer::new();
        assert_eq!(buffer.push(""), ReplAction::Continue);
        assert_eq!(buffer.push("var a = 1;"), ReplAction::Continue);
        assert_eq!(buffer.push("a + 1"), ReplAction::Continue);
        assert_eq!(
            buffer.push("   "),
            ReplAction::Submit("var a = 1;\na + 1".into())
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn commands() {
        let mut buffer = ReplBuffer::new();
        buffer.push("1 +");
        assert_eq!(buffer.push(":clear"), ReplAction::Clear);
        assert!(buffer.is_empty());
        assert_eq!(buffer.push(":quit"), ReplAction::Quit);
    }

    #[test]
    fn finish_returns_leftover() {
        let mut buffer = ReplBuffer::new();
        assert_eq!(buffer.finish(), None);
        buffer.push("1");
        assert_eq!(buffer.finish(), Some("1".into()));
    }
}
