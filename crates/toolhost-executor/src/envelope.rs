//! The child reply envelope (§4.4.4) and the eval transport's tolerant
//! textual decoding.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ExecutorError;

/// `{ok, result?, error?, done, chunk?}` as returned by every child,
/// regardless of transport.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<EnvelopeError>,
    /// Reserved; always `true` today. Implementations must tolerate
    /// `false` carrying `chunk` without acting on it.
    #[serde(default)]
    pub done: Option<bool>,
    #[serde(default)]
    pub chunk: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct EnvelopeError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub traceback: Option<String>,
}

/// Turn a decoded envelope into a call result, translating `ok: false`
/// into a `ToolError`.
pub fn envelope_to_result(tool: &str, envelope: Envelope) -> Result<Value, ExecutorError> {
    if envelope.ok {
        Ok(envelope.result.unwrap_or(Value::Null))
    } else {
        let error = envelope.error.unwrap_or(EnvelopeError {
            kind: "unknown".to_string(),
            message: "child returned ok: false without an error".to_string(),
            traceback: None,
        });
        Err(ExecutorError::ToolError { tool: tool.to_string(), kind: error.kind, message: error.message })
    }
}

/// Strip a single layer of surrounding quotes and unescape the common
/// escape pairs an evaluator's printed repr introduces (§4.4.4, §9).
fn unquote_and_unescape(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = match trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) if !inner.is_empty() || trimmed.len() == 2 => inner,
        _ => trimmed,
    };
    inner.replace("\\\"", "\"").replace("\\n", "\n").replace("\\t", "\t")
}

fn decode_envelope(raw: &str) -> Option<Envelope> {
    if let Ok(envelope) = serde_json::from_str::<Envelope>(raw) {
        return Some(envelope);
    }
    serde_json::from_str::<Envelope>(&unquote_and_unescape(raw)).ok()
}

/// Parse one line of eval-transport reply text into a call result. A
/// decode failure is surfaced as a raw string result rather than an
/// error, so a permissive child cannot turn an odd reply into a fatal
/// call failure (§4.4.4).
pub fn parse_eval_reply(tool: &str, raw: &str) -> Result<Value, ExecutorError> {
    match decode_envelope(raw.trim()) {
        Some(envelope) => envelope_to_result(tool, envelope),
        None => Ok(Value::String(raw.trim().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_envelope() {
        let result = parse_eval_reply("calc", r#"{"ok":true,"result":5,"done":true}"#).unwrap();
        assert_eq!(result, Value::from(5));
    }

    #[test]
    fn strips_outer_quotes_and_unescapes_before_decoding() {
        let raw = r#""{\"ok\":true,\"result\":{\"sum\":5},\"done\":true}""#;
        let result = parse_eval_reply("calc", raw).unwrap();
        assert_eq!(result, serde_json::json!({"sum": 5}));
    }

    #[test]
    fn translates_tool_error_envelope() {
        let raw = r#"{"ok":false,"error":{"type":"ValueError","message":"bad input"},"done":true}"#;
        let err = parse_eval_reply("calc", raw).unwrap_err();
        match err {
            ExecutorError::ToolError { tool, kind, message } => {
                assert_eq!(tool, "calc");
                assert_eq!(kind, "ValueError");
                assert_eq!(message, "bad input");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn undecodable_reply_falls_back_to_raw_string() {
        let result = parse_eval_reply("calc", "not json at all").unwrap();
        assert_eq!(result, Value::String("not json at all".to_string()));
    }
}
