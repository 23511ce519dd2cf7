//! Wire decoding for streamed search payloads.
//!
//! Payloads are JSON objects carrying a `type` discriminator:
//!
//! ```text
//! {"type":"mode","name":"exact"}
//! {"type":"status","source":"siteA","code":200}
//! {"type":"result","success":true,"data":[{"number":"ABC-123"}],"has_more":false}
//! {"type":"error","message":"upstream rejected query"}
//! ```
//!
//! They arrive either as SSE `data:` frames (the SSE event name may stand in
//! for a missing `type`) or as newline-delimited JSON.

use metascout_model::{StreamEvent, StreamResult};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ScoutError};

const KEEPALIVE: &str = "keepalive";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePayload {
    Mode {
        #[serde(alias = "mode")]
        name: String,
    },
    Status {
        source: String,
        code: Value,
    },
    Result(StreamResult),
    Error {
        #[serde(alias = "msg", alias = "error")]
        message: String,
    },
}

impl From<WirePayload> for StreamEvent {
    fn from(payload: WirePayload) -> Self {
        match payload {
            WirePayload::Mode { name } => StreamEvent::Mode(name),
            WirePayload::Status { source, code } => StreamEvent::Status {
                source,
                code: match code {
                    Value::String(code) => code,
                    other => other.to_string(),
                },
            },
            WirePayload::Result(result) => StreamEvent::Result(result),
            WirePayload::Error { message } => StreamEvent::Error(message),
        }
    }
}

/// Decode one SSE message.
///
/// Returns `Ok(None)` for keepalives and payload types this client does not
/// understand.
pub fn decode_event(event_name: &str, data: &str) -> Result<Option<StreamEvent>> {
    let data = data.trim();
    if data.is_empty() || data == KEEPALIVE {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_str(data)
        .map_err(|err| ScoutError::Codec(format!("{err}: {data}")))?;
    let Some(object) = value.as_object_mut() else {
        return Err(ScoutError::Codec(format!("expected a JSON object: {data}")));
    };

    if !object.contains_key("type") {
        if event_name.is_empty() || event_name == "message" {
            return Err(ScoutError::Codec(format!(
                "payload has no type discriminator: {data}"
            )));
        }
        object.insert("type".to_string(), Value::String(event_name.to_string()));
    }

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    if !matches!(kind.as_str(), "mode" | "status" | "result" | "error") {
        debug!(kind = %kind, "skipping unknown stream payload");
        return Ok(None);
    }

    let payload: WirePayload = serde_json::from_value(value)
        .map_err(|err| ScoutError::Codec(format!("{kind} payload: {err}")))?;
    Ok(Some(payload.into()))
}

/// Decode a message delivered by an SSE event source.
pub fn decode_message(
    message: &eventsource_stream::Event,
) -> Result<Option<StreamEvent>> {
    decode_event(&message.event, &message.data)
}

/// Decode one line of a newline-delimited stream. A leading `data:` prefix
/// is tolerated so raw SSE bodies can be read line by line too.
pub fn decode_line(line: &str) -> Result<Option<StreamEvent>> {
    let line = line.trim();
    if line.starts_with(':') || line.starts_with("event:") || line.starts_with("id:") {
        return Ok(None);
    }
    let payload = line.strip_prefix("data:").unwrap_or(line);
    decode_event("", payload)
}

/// Reassembles newline-delimited frames from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metascout_model::MetadataRecord;

    #[test]
    fn decodes_each_payload_type() {
        assert_eq!(
            decode_event("", r#"{"type":"mode","name":"exact"}"#).unwrap(),
            Some(StreamEvent::Mode("exact".into()))
        );
        assert_eq!(
            decode_event("", r#"{"type":"status","source":"siteA","code":200}"#)
                .unwrap(),
            Some(StreamEvent::Status {
                source: "siteA".into(),
                code: "200".into()
            })
        );
        assert_eq!(
            decode_event("", r#"{"type":"error","message":"nope"}"#).unwrap(),
            Some(StreamEvent::Error("nope".into()))
        );

        let event = decode_event(
            "",
            r#"{"type":"result","success":true,"data":[{"number":"ABC-123"}],"has_more":true}"#,
        )
        .unwrap();
        let Some(StreamEvent::Result(result)) = event else {
            panic!("expected a result event, got {event:?}");
        };
        assert!(result.success);
        assert!(result.has_more);
        assert_eq!(result.records, vec![MetadataRecord::new("ABC-123")]);
    }

    #[test]
    fn sse_event_name_stands_in_for_missing_type() {
        assert_eq!(
            decode_event("mode", r#"{"name":"fuzzy"}"#).unwrap(),
            Some(StreamEvent::Mode("fuzzy".into()))
        );
    }

    #[test]
    fn event_source_messages_use_their_event_name() {
        let message = eventsource_stream::Event {
            event: "error".into(),
            data: r#"{"message":"quota exceeded"}"#.into(),
            id: String::new(),
            retry: None,
        };
        assert_eq!(
            decode_message(&message).unwrap(),
            Some(StreamEvent::Error("quota exceeded".into()))
        );
    }

    #[test]
    fn keepalives_and_unknown_types_are_skipped() {
        assert_eq!(decode_event("", "keepalive").unwrap(), None);
        assert_eq!(decode_event("", "   ").unwrap(), None);
        assert_eq!(
            decode_event("", r#"{"type":"heartbeat","at":1}"#).unwrap(),
            None
        );
    }

    #[test]
    fn malformed_payloads_are_codec_errors() {
        assert!(matches!(
            decode_event("", "{not json"),
            Err(ScoutError::Codec(_))
        ));
        assert!(matches!(
            decode_event("message", r#"{"name":"exact"}"#),
            Err(ScoutError::Codec(_))
        ));
        assert!(matches!(
            decode_event("", r#"{"type":"mode"}"#),
            Err(ScoutError::Codec(_))
        ));
    }

    #[test]
    fn payload_errors_name_the_payload_type() {
        let Err(ScoutError::Codec(message)) =
            decode_event("status", r#"{"source":42}"#)
        else {
            panic!("expected a codec error");
        };
        assert!(message.starts_with("status payload:"), "{message}");
    }

    #[test]
    fn line_decoder_reassembles_split_frames() {
        let mut lines = LineDecoder::new();
        assert!(lines.push(br#"{"type":"mode","#).is_empty());
        let done = lines.push(b"\"name\":\"exact\"}\r\n{\"type\":\"error\",");
        assert_eq!(done, vec![r#"{"type":"mode","name":"exact"}"#.to_string()]);
        assert!(lines.push(br#""message":"x"}"#).is_empty());
        assert_eq!(
            lines.finish().as_deref(),
            Some(r#"{"type":"error","message":"x"}"#)
        );
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn decode_line_accepts_sse_data_prefix() {
        assert_eq!(
            decode_line(r#"data: {"type":"mode","name":"exact"}"#).unwrap(),
            Some(StreamEvent::Mode("exact".into()))
        );
        assert_eq!(decode_line(": comment").unwrap(), None);
        assert_eq!(decode_line("event: mode").unwrap(), None);
    }
}
