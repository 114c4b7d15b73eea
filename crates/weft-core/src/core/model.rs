//! Document model for assembled assistant responses.
//!
//! The model is mutated in place by the reducer during a turn and read as a
//! snapshot by the projector. Blocks are appended in arrival order of their
//! first event and never reordered or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered sequence of messages; append-only during a turn.
pub type Conversation = Vec<Message>;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Message content - either simple text or structured blocks.
///
/// Once promoted from `Text` to `Blocks` a message never reverts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: MessageContent::Text(content.into()),
            timestamp: Utc::now(),
            attachments: Vec::new(),
        }
    }

    /// Creates an empty assistant message ready to receive streamed blocks.
    pub fn assistant() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: MessageContent::Blocks(Vec::new()),
            timestamp: Utc::now(),
            attachments: Vec::new(),
        }
    }

    /// Returns the content as blocks, promoting legacy string content first.
    ///
    /// Promotion wraps the string in a single text block; it is one-way.
    pub fn blocks_mut(&mut self) -> &mut Vec<ContentBlock> {
        if let MessageContent::Text(text) = &self.content {
            let existing = text.clone();
            let mut blocks = Vec::new();
            if !existing.is_empty() {
                blocks.push(ContentBlock::Text { text: existing });
            }
            self.content = MessageContent::Blocks(blocks);
        }
        match &mut self.content {
            MessageContent::Blocks(blocks) => blocks,
            MessageContent::Text(_) => unreachable!("content promoted above"),
        }
    }

    /// Read-only view of the block sequence (empty for string content).
    pub fn blocks(&self) -> &[ContentBlock] {
        match &self.content {
            MessageContent::Blocks(blocks) => blocks,
            MessageContent::Text(_) => &[],
        }
    }
}

/// One semantic unit of assistant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain response text; append-only.
    Text { text: String },
    /// Extended thinking. Identity is `stream_index`, not array position:
    /// deltas must match among *incomplete* blocks only, so a reused index
    /// never lands on an already-finished block.
    Thinking {
        stream_index: usize,
        thinking: String,
        is_complete: bool,
        started_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<i64>,
    },
    /// Tool invocation with streaming input and (eventually) a result.
    ToolUse { tool: ToolUse },
    /// Terminal error surfaced inline; never mutated further.
    Error { error: String },
}

impl ContentBlock {
    pub fn thinking(stream_index: usize) -> Self {
        ContentBlock::Thinking {
            stream_index,
            thinking: String::new(),
            is_complete: false,
            started_at: Utc::now(),
            duration_ms: None,
        }
    }

    /// Returns true for thinking blocks still streaming and tool blocks
    /// with no result yet.
    pub fn is_incomplete(&self) -> bool {
        match self {
            ContentBlock::Thinking { is_complete, .. } => !is_complete,
            ContentBlock::ToolUse { tool } => tool.result.is_none(),
            ContentBlock::Text { .. } | ContentBlock::Error { .. } => false,
        }
    }
}

/// Accumulated state of one tool invocation.
///
/// `id` is the authoritative identity once known; `stream_index` is a
/// secondary key used only for stop events that carry no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub stream_index: usize,
    /// Raw accumulated input JSON, possibly still truncated mid-stream.
    pub input_json: String,
    /// Best-effort parse of `input_json`; monotonically improved, never
    /// regressed to `None` by a transient parse failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolUse {
    pub fn started(id: impl Into<String>, name: impl Into<String>, stream_index: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stream_index,
            input_json: String::new(),
            parsed_input: None,
            result: None,
            is_error: None,
        }
    }
}
