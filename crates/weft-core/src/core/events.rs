//! Protocol event types consumed by the reducer.
//!
//! This module defines the contract between the event source and the
//! assembly engine. Events are serializable for transcript capture and
//! replay. Arrival-order guarantees are per block identity only; see the
//! reducer for how out-of-order events degrade.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by the event source during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental response text from the assistant.
    MessageChunk { text: String },

    /// A thinking block opened at the given stream index.
    ThinkingStart { index: usize },

    /// Incremental thinking text for the block at `index`.
    ThinkingChunk { index: usize, delta: String },

    /// Model has decided to call a tool. `input` may carry an initial
    /// (often empty) object; the full input streams via `ToolInputDelta`.
    ToolUseStart {
        id: String,
        name: String,
        stream_index: usize,
        #[serde(default)]
        input: Value,
    },

    /// Raw JSON fragment appended to a tool's input.
    ToolInputDelta {
        index: usize,
        tool_id: String,
        delta: String,
    },

    /// A content block finished streaming. Thinking blocks are matched by
    /// `index`; tool blocks by `tool_id` when present, else via the
    /// stream-index registry.
    ContentBlockStop {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_id: Option<String>,
    },

    /// Tool result begins; replaces any prior result content.
    ToolResultStart {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },

    /// Tool result grows.
    ToolResultDelta { tool_use_id: String, delta: String },

    /// Tool result finalized; full replace. Tolerated without a prior
    /// start or delta.
    ToolResultComplete {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// Turn completed normally.
    MessageComplete,

    /// Turn interrupted by the user.
    MessageStopped,

    /// Turn failed; the message is surfaced as an inline error block.
    MessageError { error: String },

    /// Diagnostic side-channel text; buffered only while a turn streams.
    DebugMessage { message: String },
}
