//! Script wrapping
//!
//! The raw script is embedded as a string literal inside an evaluation
//! template. [`escape_script`] is the only thing standing between the user's
//! text and the template's control flow, so it runs on every submission.

use crate::{ExecutionConfig, ResultChannel};

/// Escape `source` for embedding inside a double- or single-quoted literal
pub fn escape_script(source: &str) -> String {
    let mut escaped = String::with_capacity(source.len() + source.len() / 8);
    for ch in source.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Build the evaluation template for `source`.
///
/// The template times itself from entry, evaluates the script as an
/// expression through an indirect `eval` (global scope, so the template's
/// own locals are out of reach), raises `Execution timeout` if the measured time exceeds the
/// budget, serializes the value and reports any raised condition through
/// `JsBridge.onError` while returning `undefined`.
pub fn wrap_script(source: &str, config: &ExecutionConfig) -> String {
    let report = match config.result_channel {
        ResultChannel::Return => "return __jsrunner.serialize(__jsrunnerResult);",
        ResultChannel::Bridge => {
            "JsBridge.onResult(__jsrunner.serialize(__jsrunnerResult));\n        return undefined;"
        }
    };

    format!(
        r#"(function () {{
    var __jsrunnerStart = Date.now();
    try {{
        var __jsrunnerResult = (0, eval)("{script}");
        if (Date.now() - __jsrunnerStart > {timeout}) {{
            throw new Error("Execution timeout");
        }}
        {report}
    }} catch (e) {{
        JsBridge.onError((e && e.message) || String(e));
        return undefined;
    }}
}})()"#,
        script = escape_script(source),
        timeout = config.execution_timeout_ms,
        report = report,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escapes_literal_terminators() {
        assert_eq!(escape_script(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_script("a'b"), r"a\'b");
        assert_eq!(escape_script(r"a\b"), r"a\\b");
        assert_eq!(escape_script("a\nb\rc\td"), r"a\nb\rc\td");
        assert_eq!(escape_script("a\u{2028}b"), r"a\u2028b");
    }

    #[test]
    fn escaped_backslash_quote_cannot_close_literal() {
        // `\"` must become `\\\"`, not `\\"` which would end the string
        assert_eq!(escape_script(r#"\""#), r#"\\\""#);
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(escape_script("1 + 1"), "1 + 1");
        assert_eq!(escape_script("héllo ✓"), "héllo ✓");
    }

    #[test]
    fn template_embeds_escaped_script_and_timeout() {
        let config = ExecutionConfig {
            execution_timeout_ms: 1234,
            ..Default::default()
        };
        let wrapped = wrap_script("say(\"hi\")\n", &config);
        assert!(wrapped.contains(r#"(0, eval)("say(\"hi\")\n")"#));
        assert!(wrapped.contains("> 1234"));
        assert!(wrapped.contains("return __jsrunner.serialize(__jsrunnerResult);"));
        assert!(!wrapped.contains("JsBridge.onResult"));
    }

    #[test]
    fn bridge_result_channel_reports_through_on_result() {
        let config = ExecutionConfig {
            result_channel: ResultChannel::Bridge,
            ..Default::default()
        };
        let wrapped = wrap_script("1", &config);
        assert!(wrapped.contains("JsBridge.onResult(__jsrunner.serialize(__jsrunnerResult));"));
    }
}
