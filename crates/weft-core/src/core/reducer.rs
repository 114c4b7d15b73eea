//! Stream event reducer: folds protocol events into the document model.
//!
//! One `Reducer` owns the conversation for the duration of a turn. Each
//! inbound event is applied synchronously; the reducer performs no IO and
//! never blocks. Malformed or out-of-order events degrade to no-ops rather
//! than corrupting the document: every lookup miss leaves the previous
//! state unchanged and is logged at debug level.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, trace};

use crate::core::events::StreamEvent;
use crate::core::model::{ContentBlock, Conversation, Message, ToolUse};
use crate::partial_json;

/// Turn lifecycle. A turn enters `Streaming` on the first event that
/// targets a new assistant message and ends in one of the terminal phases;
/// the next turn's first event re-enters `Streaming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Streaming,
    Completed,
    Stopped,
    Errored,
}

impl TurnPhase {
    /// True once a terminal signal has been folded for the current turn.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TurnPhase::Completed | TurnPhase::Stopped | TurnPhase::Errored
        )
    }
}

/// Ephemeral per-turn mapping from stream index to tool id.
///
/// Some stop events carry only the numeric index; this registry makes the
/// late-bound resolution an explicit lookup instead of an assumption baked
/// into array positions. Created empty at turn start, discarded at turn end.
#[derive(Debug, Default)]
pub struct StreamIndexRegistry {
    by_index: HashMap<usize, String>,
}

impl StreamIndexRegistry {
    pub fn register(&mut self, index: usize, tool_id: impl Into<String>) {
        self.by_index.insert(index, tool_id.into());
    }

    pub fn resolve(&self, index: usize) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.by_index.clear();
    }
}

/// Explicit context for the in-flight turn.
///
/// Holds the index of the in-flight assistant message rather than relying
/// on conversation-tail lookups, so concurrent display of earlier messages
/// cannot be confused with the streaming target.
#[derive(Debug, Default)]
struct TurnContext {
    current: Option<usize>,
    registry: StreamIndexRegistry,
    debug_buffer: String,
}

/// Stateful fold from protocol events to the document model.
pub struct Reducer {
    conversation: Conversation,
    phase: TurnPhase,
    turn: TurnContext,
}

impl Default for Reducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer {
    pub fn new() -> Self {
        Self::with_conversation(Conversation::new())
    }

    pub fn with_conversation(conversation: Conversation) -> Self {
        Self {
            conversation,
            phase: TurnPhase::Idle,
            turn: TurnContext::default(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// The in-flight assistant message, if a turn is streaming.
    pub fn current_message(&self) -> Option<&Message> {
        self.turn.current.and_then(|idx| self.conversation.get(idx))
    }

    /// Turn-level streaming flag for the projector: the turn is live and
    /// at least one block is still incomplete.
    pub fn is_streaming(&self) -> bool {
        self.phase == TurnPhase::Streaming
            && self
                .current_message()
                .is_some_and(|msg| msg.blocks().iter().any(ContentBlock::is_incomplete))
    }

    /// Appends a user message. Purely additive; the next turn starts on
    /// the first assistant-targeted event.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.conversation.push(Message::user(text));
    }

    /// Folds one protocol event into the document. Infallible by design:
    /// anomalies are absorbed as no-ops.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::MessageChunk { text } => self.apply_text_delta(text),
            StreamEvent::ThinkingStart { index } => {
                let idx = self.ensure_assistant();
                self.blocks_mut(idx).push(ContentBlock::thinking(*index));
            }
            StreamEvent::ThinkingChunk { index, delta } => self.apply_thinking_delta(*index, delta),
            StreamEvent::ToolUseStart {
                id,
                name,
                stream_index,
                input,
            } => self.apply_tool_use_start(id, name, *stream_index, input),
            StreamEvent::ToolInputDelta { tool_id, delta, .. } => {
                self.apply_tool_input_delta(tool_id, delta);
            }
            StreamEvent::ContentBlockStop { index, tool_id } => {
                self.apply_content_block_stop(*index, tool_id.as_deref());
            }
            StreamEvent::ToolResultStart {
                tool_use_id,
                content,
                is_error,
            } => self.with_tool(tool_use_id, |tool| {
                tool.result = Some(content.clone());
                tool.is_error = Some(*is_error);
            }),
            StreamEvent::ToolResultDelta { tool_use_id, delta } => {
                self.with_tool(tool_use_id, |tool| {
                    tool.result.get_or_insert_with(String::new).push_str(delta);
                });
            }
            StreamEvent::ToolResultComplete {
                tool_use_id,
                content,
                is_error,
            } => self.with_tool(tool_use_id, |tool| {
                tool.result = Some(content.clone());
                if let Some(is_error) = is_error {
                    tool.is_error = Some(*is_error);
                }
            }),
            StreamEvent::MessageComplete => self.finalize(TurnPhase::Completed),
            StreamEvent::MessageStopped => self.finalize(TurnPhase::Stopped),
            StreamEvent::MessageError { error } => self.apply_error(error),
            StreamEvent::DebugMessage { message } => self.apply_debug(message),
        }
    }

    /// Idempotent cancellation: finalizes immediately as a user stop.
    /// Safe to call in any phase; a second call is a no-op.
    pub fn interrupt(&mut self) {
        if self.phase == TurnPhase::Streaming {
            self.finalize(TurnPhase::Stopped);
        }
    }

    // === turn lifecycle ===

    /// Returns the in-flight assistant message index, starting a new turn
    /// if none is live. Turn start clears the per-turn registry and the
    /// diagnostic accumulator.
    fn ensure_assistant(&mut self) -> usize {
        if self.phase == TurnPhase::Streaming
            && let Some(idx) = self.turn.current
        {
            return idx;
        }
        self.conversation.push(Message::assistant());
        let idx = self.conversation.len() - 1;
        self.turn.current = Some(idx);
        self.turn.registry.clear();
        self.turn.debug_buffer.clear();
        self.phase = TurnPhase::Streaming;
        idx
    }

    fn blocks_mut(&mut self, idx: usize) -> &mut Vec<ContentBlock> {
        self.conversation[idx].blocks_mut()
    }

    /// Completion, stop, and interrupt share one finalization path:
    /// force-complete anything still streaming, flush buffered diagnostics
    /// as a trailing text block, and discard the per-turn state.
    fn finalize(&mut self, outcome: TurnPhase) {
        if let Some(idx) = self.turn.current {
            force_complete_thinking(self.blocks_mut(idx));
            let diagnostics = std::mem::take(&mut self.turn.debug_buffer);
            if !diagnostics.is_empty() {
                self.blocks_mut(idx).push(ContentBlock::Text { text: diagnostics });
            }
        }
        self.end_turn(outcome);
    }

    fn end_turn(&mut self, outcome: TurnPhase) {
        self.turn.current = None;
        self.turn.registry.clear();
        self.turn.debug_buffer.clear();
        self.phase = outcome;
    }

    // === per-event folds ===

    fn apply_text_delta(&mut self, text: &str) {
        let idx = self.ensure_assistant();
        let blocks = self.blocks_mut(idx);
        if let Some(ContentBlock::Text { text: existing }) = blocks.last_mut() {
            existing.push_str(text);
        } else {
            blocks.push(ContentBlock::Text {
                text: text.to_string(),
            });
        }
    }

    fn apply_thinking_delta(&mut self, index: usize, delta: &str) {
        let Some(idx) = self.turn.current else {
            debug!(index, "thinking delta with no turn in flight; dropped");
            return;
        };
        // Match among incomplete blocks only: an index reused after
        // completion must not land on the finished block.
        let found = self.blocks_mut(idx).iter_mut().find_map(|block| match block {
            ContentBlock::Thinking {
                stream_index,
                thinking,
                is_complete: false,
                ..
            } if *stream_index == index => Some(thinking),
            _ => None,
        });
        match found {
            Some(thinking) => thinking.push_str(delta),
            None => debug!(index, "thinking delta for unknown block; dropped"),
        }
    }

    fn apply_tool_use_start(&mut self, id: &str, name: &str, stream_index: usize, input: &Value) {
        let idx = self.ensure_assistant();
        self.turn.registry.register(stream_index, id);
        let mut tool = ToolUse::started(id, name, stream_index);
        if !input.is_null() {
            tool.parsed_input = Some(input.clone());
        }
        self.blocks_mut(idx).push(ContentBlock::ToolUse { tool });
    }

    fn apply_tool_input_delta(&mut self, tool_id: &str, delta: &str) {
        self.with_tool(tool_id, |tool| {
            tool.input_json.push_str(delta);
            // Monotone best-effort: a transient parse failure must not
            // erase the previous parsed input.
            if let Some(parsed) = partial_json::parse_partial(&tool.input_json) {
                tool.parsed_input = Some(parsed);
            }
        });
    }

    fn apply_content_block_stop(&mut self, index: usize, tool_id: Option<&str>) {
        let Some(idx) = self.turn.current else {
            debug!(index, "content_block_stop with no turn in flight; dropped");
            return;
        };

        // Thinking blocks take priority: stop carries only the index.
        let now = Utc::now();
        for block in self.blocks_mut(idx) {
            if let ContentBlock::Thinking {
                stream_index,
                is_complete: is_complete @ false,
                started_at,
                duration_ms,
                ..
            } = block
                && *stream_index == index
            {
                *is_complete = true;
                *duration_ms = Some((now - *started_at).num_milliseconds().max(0));
                return;
            }
        }

        // Otherwise resolve the tool: explicit id wins, else the registry.
        let resolved = tool_id
            .map(str::to_string)
            .or_else(|| self.turn.registry.resolve(index).map(str::to_string));
        let Some(resolved) = resolved else {
            debug!(index, "content_block_stop matched no thinking block or tool; dropped");
            return;
        };

        self.with_tool(&resolved, |tool| {
            // Exact parse first; fall back to best-effort; leave the prior
            // parse untouched if both fail.
            match serde_json::from_str::<Value>(&tool.input_json) {
                Ok(parsed) => tool.parsed_input = Some(parsed),
                Err(_) => {
                    if let Some(parsed) = partial_json::parse_partial(&tool.input_json) {
                        tool.parsed_input = Some(parsed);
                    }
                }
            }
        });
    }

    fn apply_error(&mut self, error: &str) {
        // An error may open a turn of its own (e.g. failure before any
        // delta arrived). Prior partial output is preserved.
        let idx = self.ensure_assistant();
        force_complete_thinking(self.blocks_mut(idx));
        let diagnostics = std::mem::take(&mut self.turn.debug_buffer);
        if !diagnostics.is_empty() {
            self.blocks_mut(idx).push(ContentBlock::Text { text: diagnostics });
        }
        self.blocks_mut(idx).push(ContentBlock::Error {
            error: error.to_string(),
        });
        self.end_turn(TurnPhase::Errored);
    }

    fn apply_debug(&mut self, message: &str) {
        if self.phase == TurnPhase::Streaming {
            if !self.turn.debug_buffer.is_empty() {
                self.turn.debug_buffer.push('\n');
            }
            self.turn.debug_buffer.push_str(message);
        } else {
            // Stray diagnostics between turns must not leak into the next
            // turn's buffer.
            trace!(message, "debug message with no active turn; dropped");
        }
    }

    /// Runs `f` on the tool with the given id in the in-flight message.
    /// Ids are authoritative; a miss is a logged no-op.
    fn with_tool(&mut self, tool_id: &str, f: impl FnOnce(&mut ToolUse)) {
        let Some(idx) = self.turn.current else {
            debug!(tool_id, "tool event with no turn in flight; dropped");
            return;
        };
        let found = self.blocks_mut(idx).iter_mut().find_map(|block| match block {
            ContentBlock::ToolUse { tool } if tool.id == tool_id => Some(tool),
            _ => None,
        });
        match found {
            Some(tool) => f(tool),
            None => debug!(tool_id, "tool event for unknown tool id; dropped"),
        }
    }
}

/// Marks every incomplete thinking block complete with a best-effort
/// duration. Runs at turn end: completion normally implies prior stop
/// events, but the fold must not assume it.
fn force_complete_thinking(blocks: &mut [ContentBlock]) {
    let now = Utc::now();
    for block in blocks {
        if let ContentBlock::Thinking {
            is_complete: is_complete @ false,
            started_at,
            duration_ms,
            ..
        } = block
        {
            *is_complete = true;
            *duration_ms = Some((now - *started_at).num_milliseconds().max(0));
        }
    }
}
