//! SSE decoder that converts a model byte stream into protocol events.
//!
//! The wire speaks Anthropic-style SSE (`message_start`, block start/delta/
//! stop, `message_delta`, `message_stop`, `error`). Tool results and debug
//! messages are host-side concerns and never appear on this wire.
//!
//! The decoder is stateful: tool ids are learned from block-start events so
//! that input deltas (which carry only the numeric index on the wire) can
//! be stamped with the authoritative id, and the final `stop_reason`
//! decides whether the stream ends in completion or a user stop.

use std::collections::HashMap;
use std::pin::Pin;

use eventsource_stream::{EventStream, Eventsource};
use futures_util::Stream;
use serde::Deserialize;
use serde_json::Value;

use crate::core::events::StreamEvent;
use crate::wire::{WireError, WireResult};

/// Stop reason the upstream uses when a turn was cut off by the user.
const STOP_REASON_INTERRUPTED: &str = "interrupted";

/// Stateful field-level parser, shared by the async decoder and the
/// synchronous transcript replay path.
#[derive(Debug, Default)]
pub struct EventParser {
    tool_ids: HashMap<usize, String>,
    stop_reason: Option<String>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one SSE event into a protocol event. Returns `Ok(None)` for
    /// events with no protocol-level effect (pings, usage bookkeeping,
    /// empty text block starts).
    ///
    /// # Errors
    /// Returns a parse error for malformed payloads or unknown event types.
    pub fn parse_fields(
        &mut self,
        event_type: &str,
        data: &str,
    ) -> WireResult<Option<StreamEvent>> {
        let data = {
            let trimmed = data.trim();
            if trimmed.is_empty() { None } else { Some(trimmed) }
        };

        match event_type {
            "ping" | "message_start" => Ok(None),
            "content_block_start" => {
                let parsed: SseContentBlockStart = parse_data(event_type, data)?;
                self.block_start(parsed)
            }
            "content_block_delta" => {
                let parsed: SseContentBlockDelta = parse_data(event_type, data)?;
                self.block_delta(parsed)
            }
            "content_block_stop" => {
                let parsed: SseContentBlockStop = parse_data(event_type, data)?;
                Ok(Some(StreamEvent::ContentBlockStop {
                    index: parsed.index,
                    tool_id: self.tool_ids.get(&parsed.index).cloned(),
                }))
            }
            "message_delta" => {
                let parsed: SseMessageDelta = parse_data(event_type, data)?;
                if let Some(reason) = parsed.delta.stop_reason {
                    self.stop_reason = Some(reason);
                }
                Ok(None)
            }
            "message_stop" => {
                if self.stop_reason.as_deref() == Some(STOP_REASON_INTERRUPTED) {
                    Ok(Some(StreamEvent::MessageStopped))
                } else {
                    Ok(Some(StreamEvent::MessageComplete))
                }
            }
            "error" => {
                let parsed: SseError = parse_data(event_type, data)?;
                Ok(Some(StreamEvent::MessageError {
                    error: format!("{}: {}", parsed.error.error_type, parsed.error.message),
                }))
            }
            other => Err(WireError::parse(format!("Unknown SSE event type: {other}"))),
        }
    }

    fn block_start(&mut self, parsed: SseContentBlockStart) -> WireResult<Option<StreamEvent>> {
        match parsed.content_block.block_type.as_str() {
            // Text blocks are created lazily by the first delta.
            "text" => Ok(None),
            "thinking" => Ok(Some(StreamEvent::ThinkingStart {
                index: parsed.index,
            })),
            "tool_use" => {
                let id = parsed
                    .content_block
                    .id
                    .ok_or_else(|| WireError::parse("tool_use block start without id"))?;
                let name = parsed
                    .content_block
                    .name
                    .ok_or_else(|| WireError::parse("tool_use block start without name"))?;
                self.tool_ids.insert(parsed.index, id.clone());
                Ok(Some(StreamEvent::ToolUseStart {
                    id,
                    name,
                    stream_index: parsed.index,
                    input: parsed.content_block.input.unwrap_or(Value::Null),
                }))
            }
            other => Err(WireError::parse(format!(
                "Unknown content block type: {other}"
            ))),
        }
    }

    fn block_delta(&mut self, parsed: SseContentBlockDelta) -> WireResult<Option<StreamEvent>> {
        match parsed.delta.delta_type.as_str() {
            "text_delta" => Ok(Some(StreamEvent::MessageChunk {
                text: parsed.delta.text.unwrap_or_default(),
            })),
            "thinking_delta" => Ok(Some(StreamEvent::ThinkingChunk {
                index: parsed.index,
                delta: parsed.delta.thinking.unwrap_or_default(),
            })),
            "input_json_delta" => {
                let tool_id = self.tool_ids.get(&parsed.index).cloned().ok_or_else(|| {
                    WireError::parse(format!(
                        "input_json_delta for unknown block index {}",
                        parsed.index
                    ))
                })?;
                Ok(Some(StreamEvent::ToolInputDelta {
                    index: parsed.index,
                    tool_id,
                    delta: parsed.delta.partial_json.unwrap_or_default(),
                }))
            }
            // Signature deltas are replay material, not display content.
            "signature_delta" => Ok(None),
            other => Err(WireError::parse(format!("Unknown delta type: {other}"))),
        }
    }
}

fn parse_data<'a, T: Deserialize<'a>>(event_type: &str, data: Option<&'a str>) -> WireResult<T> {
    let data =
        data.ok_or_else(|| WireError::parse(format!("Missing data for {event_type}")))?;
    serde_json::from_str(data)
        .map_err(|err| WireError::parse(format!("Failed to parse {event_type}: {err}")))
}

/// SSE decoder that converts a byte stream into protocol events.
pub struct SseDecoder<S> {
    inner: EventStream<S>,
    parser: EventParser,
}

impl<S> SseDecoder<S> {
    pub fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
            parser: EventParser::new(),
        }
    }
}

impl<S, E> Stream for SseDecoder<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = WireResult<StreamEvent>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    match self.parser.parse_fields(&event.event, &event.data) {
                        Ok(Some(mapped)) => return Poll::Ready(Some(Ok(mapped))),
                        // No protocol-level effect; keep polling.
                        Ok(None) => {}
                        Err(err) => return Poll::Ready(Some(Err(err))),
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(WireError::transport(format!(
                        "SSE stream error: {e}"
                    )))));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Decodes a complete recorded SSE transcript (blank-line separated event
/// blocks) into protocol events. Used for replay; tolerates CRLF endings.
///
/// # Errors
/// Returns the first decode error encountered.
pub fn decode_transcript(text: &str) -> WireResult<Vec<StreamEvent>> {
    let mut parser = EventParser::new();
    let mut events = Vec::new();

    for block in text.replace("\r\n", "\n").split("\n\n") {
        let mut event_type = None;
        let mut data = None;
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event: ") {
                event_type = Some(value.trim());
            } else if let Some(value) = line.strip_prefix("data: ") {
                data = Some(value);
            }
        }
        let Some(event_type) = event_type else {
            continue;
        };
        if let Some(mapped) = parser.parse_fields(event_type, data.unwrap_or(""))? {
            events.push(mapped);
        }
    }

    Ok(events)
}

// === SSE payload structures ===

#[derive(Debug, Deserialize)]
struct SseContentBlockStart {
    index: usize,
    content_block: SseContentBlock,
}

#[derive(Debug, Deserialize)]
struct SseContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SseContentBlockDelta {
    index: usize,
    delta: SseDelta,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    #[serde(rename = "type")]
    delta_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseContentBlockStop {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct SseMessageDelta {
    delta: SseMessageDeltaInner,
}

#[derive(Debug, Deserialize)]
struct SseMessageDeltaInner {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseError {
    error: SseErrorInfo,
}

#[derive(Debug, Deserialize)]
struct SseErrorInfo {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    /// SSE fixture: thinking, then a tool call, then response text.
    const SSE_FULL_TURN: &str = r#"event: message_start
data: {"type":"message_start","message":{"id":"msg_1","role":"assistant"}}

event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}

event: ping
data: {"type":"ping"}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"Let me think"}}

event: content_block_stop
data: {"type":"content_block_stop","index":0}

event: content_block_start
data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"read","input":{}}}

event: content_block_delta
data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"file_path\":\"/a.txt\"}"}}

event: content_block_stop
data: {"type":"content_block_stop","index":1}

event: content_block_start
data: {"type":"content_block_start","index":2,"content_block":{"type":"text","text":""}}

event: content_block_delta
data: {"type":"content_block_delta","index":2,"delta":{"type":"text_delta","text":"Done."}}

event: content_block_stop
data: {"type":"content_block_stop","index":2}

event: message_delta
data: {"type":"message_delta","delta":{"stop_reason":"end_turn"}}

event: message_stop
data: {"type":"message_stop"}

"#;

    fn mock_byte_stream(
        data: &str,
    ) -> impl Stream<Item = std::result::Result<bytes::Bytes, std::io::Error>> {
        let chunks: Vec<_> = data
            .as_bytes()
            .chunks(50) // Simulate chunked delivery
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();
        futures_util::stream::iter(chunks)
    }

    #[tokio::test]
    async fn decodes_a_full_turn() {
        let mut decoder = SseDecoder::new(mock_byte_stream(SSE_FULL_TURN));

        let mut events = Vec::new();
        while let Some(result) = decoder.next().await {
            events.push(result.expect("expected valid event"));
        }

        assert_eq!(
            events,
            vec![
                StreamEvent::ThinkingStart { index: 0 },
                StreamEvent::ThinkingChunk {
                    index: 0,
                    delta: "Let me think".to_string()
                },
                StreamEvent::ContentBlockStop {
                    index: 0,
                    tool_id: None
                },
                StreamEvent::ToolUseStart {
                    id: "toolu_1".to_string(),
                    name: "read".to_string(),
                    stream_index: 1,
                    input: serde_json::json!({})
                },
                StreamEvent::ToolInputDelta {
                    index: 1,
                    tool_id: "toolu_1".to_string(),
                    delta: r#"{"file_path":"/a.txt"}"#.to_string()
                },
                StreamEvent::ContentBlockStop {
                    index: 1,
                    tool_id: Some("toolu_1".to_string())
                },
                StreamEvent::MessageChunk {
                    text: "Done.".to_string()
                },
                StreamEvent::ContentBlockStop {
                    index: 2,
                    tool_id: None
                },
                StreamEvent::MessageComplete,
            ]
        );
    }

    #[tokio::test]
    async fn interrupted_stop_reason_ends_in_message_stopped() {
        let data = r#"event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"partial"}}

event: message_delta
data: {"type":"message_delta","delta":{"stop_reason":"interrupted"}}

event: message_stop
data: {"type":"message_stop"}

"#;
        let mut decoder = SseDecoder::new(mock_byte_stream(data));

        let mut events = Vec::new();
        while let Some(result) = decoder.next().await {
            events.push(result.expect("expected valid event"));
        }

        assert_eq!(events.last(), Some(&StreamEvent::MessageStopped));
    }

    #[tokio::test]
    async fn mid_stream_error_maps_to_message_error() {
        let data = r#"event: error
data: {"type":"error","error":{"type":"overloaded_error","message":"API is temporarily overloaded"}}

"#;
        let mut decoder = SseDecoder::new(mock_byte_stream(data));

        let event = decoder.next().await.unwrap().unwrap();
        assert_eq!(
            event,
            StreamEvent::MessageError {
                error: "overloaded_error: API is temporarily overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn input_delta_for_unknown_index_is_a_decode_error() {
        let data = r#"event: content_block_delta
data: {"type":"content_block_delta","index":7,"delta":{"type":"input_json_delta","partial_json":"{"}}

"#;
        let mut decoder = SseDecoder::new(mock_byte_stream(data));

        let result = decoder.next().await.unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn transcript_replay_matches_streaming_decode() {
        let events = decode_transcript(SSE_FULL_TURN).unwrap();
        assert_eq!(events.len(), 9);
        assert_eq!(events.last(), Some(&StreamEvent::MessageComplete));
    }

    #[test]
    fn transcript_replay_tolerates_crlf() {
        let data = "event: content_block_start\r\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\"}}\r\n\r\nevent: message_stop\r\ndata: {\"type\":\"message_stop\"}\r\n\r\n";
        let events = decode_transcript(data).unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::ThinkingStart { index: 0 },
                StreamEvent::MessageComplete
            ]
        );
    }
}
