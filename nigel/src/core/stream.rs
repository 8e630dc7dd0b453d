//! Decoder for the assistant's line-delimited JSON event stream.
//!
//! Each stdout line is decoded on its own. Text deltas are forwarded as they
//! arrive; a `message_stop` closes the message with a single newline, but only
//! when the message produced text, so empty messages never add blank lines.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamLine {
    /// `--include-partial-messages` wraps raw API events.
    StreamEvent {
        event: ApiEvent,
    },
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop,
    Result {
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiEvent {
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Stateful decoder for one assistant invocation.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    message_has_content: bool,
    result_error: Option<String>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one stdout line and return the text to emit, if any.
    ///
    /// Lines that are not JSON at all are passed through verbatim so plain
    /// tools can stand in for the assistant.
    pub fn feed(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<StreamLine>(trimmed) {
            Ok(StreamLine::StreamEvent { event }) => match event {
                ApiEvent::ContentBlockDelta { delta } => self.on_delta(delta),
                ApiEvent::MessageStop => self.on_message_stop(),
                ApiEvent::Other => None,
            },
            Ok(StreamLine::ContentBlockDelta { delta }) => self.on_delta(delta),
            Ok(StreamLine::MessageStop) => self.on_message_stop(),
            Ok(StreamLine::Result { is_error, result }) => {
                if is_error {
                    self.result_error = Some(result.unwrap_or_default());
                }
                None
            }
            Ok(StreamLine::Other) => None,
            Err(_) if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() => None,
            Err(_) => Some(format!("{trimmed}\n")),
        }
    }

    /// Text of a final `result` event flagged `is_error`.
    pub fn into_result_error(self) -> Option<String> {
        self.result_error
    }

    fn on_delta(&mut self, delta: Delta) -> Option<String> {
        match delta {
            Delta::TextDelta { text } if !text.is_empty() => {
                self.message_has_content = true;
                Some(text)
            }
            Delta::TextDelta { .. } | Delta::Other => None,
        }
    }

    fn on_message_stop(&mut self) -> Option<String> {
        let had_content = std::mem::replace(&mut self.message_has_content, false);
        had_content.then(|| "\n".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELTA_HELLO: &str = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello "}}}"#;
    const DELTA_WORLD: &str = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"World"}}}"#;
    const DELTA_BANG: &str = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"!"}}}"#;
    const STOP: &str = r#"{"type":"stream_event","event":{"type":"message_stop"}}"#;

    fn decode(lines: &[&str]) -> String {
        let mut decoder = StreamDecoder::new();
        lines.iter().filter_map(|l| decoder.feed(l)).collect()
    }

    #[test]
    fn empty_message_adds_no_blank_line() {
        let out = decode(&[DELTA_HELLO, DELTA_WORLD, STOP, STOP, DELTA_BANG, STOP]);
        assert_eq!(out, "Hello World\n!\n");
        assert!(!out.contains("\n\n"));
    }

    #[test]
    fn ignores_non_text_events() {
        let out = decode(&[
            r#"{"type":"system","subtype":"init"}"#,
            r#"{"type":"stream_event","event":{"type":"message_start","message":{}}}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{}"}}}"#,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":""}}}"#,
            STOP,
        ]);
        assert_eq!(out, "");
    }

    #[test]
    fn accepts_unwrapped_api_events() {
        let out = decode(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"ok"}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert_eq!(out, "ok\n");
    }

    #[test]
    fn passes_plain_text_through() {
        assert_eq!(decode(&["not json at all\n"]), "not json at all\n");
    }

    #[test]
    fn records_error_result() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(
            decoder.feed(r#"{"type":"result","subtype":"success","is_error":false,"result":"done"}"#),
            None
        );
        decoder.feed(r#"{"type":"result","is_error":true,"result":"usage limit reached"}"#);
        assert_eq!(
            decoder.into_result_error().as_deref(),
            Some("usage limit reached")
        );
    }

    #[test]
    fn handles_large_lines() {
        let big = "x".repeat(100 * 1024);
        let line = format!(
            r#"{{"type":"stream_event","event":{{"type":"content_block_delta","index":0,"delta":{{"type":"text_delta","text":"{big}"}}}}}}"#
        );
        assert_eq!(decode(&[&line]).len(), big.len());
    }
}
