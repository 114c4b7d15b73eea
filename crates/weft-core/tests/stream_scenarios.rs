//! End-to-end scenarios: wire decode, event fold, and projection together.

use serde_json::json;
use weft_core::core::events::StreamEvent;
use weft_core::core::model::{ContentBlock, MessageContent, Role};
use weft_core::core::reducer::{Reducer, TurnPhase};
use weft_core::view::{self, DisplayUnit};
use weft_core::wire::sse::decode_transcript;

const FULL_TURN_TRANSCRIPT: &str = r#"event: message_start
data: {"type":"message_start","message":{"id":"msg_1","role":"assistant"}}

event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"I should read the file first."}}

event: content_block_stop
data: {"type":"content_block_stop","index":0}

event: content_block_start
data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"read_file","input":{}}}

event: content_block_delta
data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"path\":\"/etc/ho"}}

event: content_block_delta
data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"sts\"}"}}

event: content_block_stop
data: {"type":"content_block_stop","index":1}

event: content_block_start
data: {"type":"content_block_start","index":2,"content_block":{"type":"text","text":""}}

event: content_block_delta
data: {"type":"content_block_delta","index":2,"delta":{"type":"text_delta","text":"The file lists "}}

event: content_block_delta
data: {"type":"content_block_delta","index":2,"delta":{"type":"text_delta","text":"two hosts."}}

event: content_block_stop
data: {"type":"content_block_stop","index":2}

event: message_delta
data: {"type":"message_delta","delta":{"stop_reason":"end_turn"}}

event: message_stop
data: {"type":"message_stop"}

"#;

fn fold(events: &[StreamEvent]) -> Reducer {
    let mut reducer = Reducer::new();
    reducer.push_user("please check /etc/hosts");
    for event in events {
        reducer.apply(event);
    }
    reducer
}

#[test]
fn full_turn_assembles_thinking_tool_and_text() {
    let events = decode_transcript(FULL_TURN_TRANSCRIPT).unwrap();
    let reducer = fold(&events);

    assert_eq!(reducer.phase(), TurnPhase::Completed);
    let conversation = reducer.conversation();
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation[1].role, Role::Assistant);

    let blocks = conversation[1].blocks();
    assert_eq!(blocks.len(), 3);

    match &blocks[0] {
        ContentBlock::Thinking {
            thinking,
            is_complete,
            duration_ms,
            ..
        } => {
            assert_eq!(thinking, "I should read the file first.");
            assert!(is_complete);
            assert!(duration_ms.is_some());
        }
        other => panic!("expected thinking block, got {other:?}"),
    }

    match &blocks[1] {
        ContentBlock::ToolUse { tool } => {
            assert_eq!(tool.id, "toolu_1");
            assert_eq!(tool.name, "read_file");
            assert_eq!(tool.input_json, r#"{"path":"/etc/hosts"}"#);
            assert_eq!(tool.parsed_input, Some(json!({"path": "/etc/hosts"})));
        }
        other => panic!("expected tool block, got {other:?}"),
    }

    match &blocks[2] {
        ContentBlock::Text { text } => assert_eq!(text, "The file lists two hosts."),
        other => panic!("expected text block, got {other:?}"),
    }
}

#[test]
fn partial_tool_input_is_readable_mid_stream() {
    let events = vec![
        StreamEvent::ToolUseStart {
            id: "toolu_1".to_string(),
            name: "search".to_string(),
            stream_index: 0,
            input: serde_json::Value::Null,
        },
        StreamEvent::ToolInputDelta {
            index: 0,
            tool_id: "toolu_1".to_string(),
            delta: r#"{"query":"rust borrow che"#.to_string(),
        },
    ];
    let reducer = fold(&events);

    let blocks = reducer.current_message().unwrap().blocks();
    let ContentBlock::ToolUse { tool } = &blocks[0] else {
        panic!("expected tool block");
    };
    // The truncated string value is surfaced as-is.
    assert_eq!(tool.parsed_input, Some(json!({"query": "rust borrow che"})));
    assert!(tool.result.is_none());
}

#[test]
fn tool_result_attaches_by_id_across_interleaved_tools() {
    let events = vec![
        StreamEvent::ToolUseStart {
            id: "toolu_a".to_string(),
            name: "read_file".to_string(),
            stream_index: 0,
            input: json!({"path": "/a"}),
        },
        StreamEvent::ToolUseStart {
            id: "toolu_b".to_string(),
            name: "read_file".to_string(),
            stream_index: 1,
            input: json!({"path": "/b"}),
        },
        // Results arrive out of order relative to invocation.
        StreamEvent::ToolResultStart {
            tool_use_id: "toolu_b".to_string(),
            content: "contents of b".to_string(),
            is_error: false,
        },
        StreamEvent::ToolResultDelta {
            tool_use_id: "toolu_a".to_string(),
            delta: "contents ".to_string(),
        },
        StreamEvent::ToolResultDelta {
            tool_use_id: "toolu_a".to_string(),
            delta: "of a".to_string(),
        },
        StreamEvent::ToolResultComplete {
            tool_use_id: "toolu_a".to_string(),
            content: "contents of a".to_string(),
            is_error: Some(false),
        },
        StreamEvent::MessageComplete,
    ];
    let reducer = fold(&events);

    let blocks = reducer.conversation()[1].blocks();
    let tools: Vec<_> = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { tool } => Some(tool),
            _ => None,
        })
        .collect();
    assert_eq!(tools[0].result.as_deref(), Some("contents of a"));
    assert_eq!(tools[0].is_error, Some(false));
    assert_eq!(tools[1].result.as_deref(), Some("contents of b"));
}

#[test]
fn error_with_no_prior_content_still_yields_a_message() {
    let mut reducer = Reducer::new();
    reducer.push_user("hi");
    reducer.apply(&StreamEvent::MessageError {
        error: "overloaded_error: try again".to_string(),
    });

    assert_eq!(reducer.phase(), TurnPhase::Errored);
    let conversation = reducer.conversation();
    assert_eq!(conversation.len(), 2);
    let blocks = conversation[1].blocks();
    assert!(
        matches!(&blocks[0], ContentBlock::Error { error } if error.contains("overloaded"))
    );
}

#[test]
fn interrupt_force_completes_thinking() {
    let events = vec![
        StreamEvent::ThinkingStart { index: 0 },
        StreamEvent::ThinkingChunk {
            index: 0,
            delta: "half a thou".to_string(),
        },
    ];
    let mut reducer = fold(&events);
    reducer.interrupt();
    reducer.interrupt(); // Second call is a no-op.

    assert_eq!(reducer.phase(), TurnPhase::Stopped);
    let blocks = reducer.conversation()[1].blocks();
    match &blocks[0] {
        ContentBlock::Thinking {
            thinking,
            is_complete,
            ..
        } => {
            assert_eq!(thinking, "half a thou");
            assert!(is_complete);
        }
        other => panic!("expected thinking block, got {other:?}"),
    }
}

#[test]
fn projection_groups_the_leading_section_and_tracks_the_live_tail() {
    // Mid-stream: thinking + tool, no text yet.
    let mid_stream = vec![
        StreamEvent::ThinkingStart { index: 0 },
        StreamEvent::ThinkingChunk {
            index: 0,
            delta: "thinking".to_string(),
        },
        StreamEvent::ToolUseStart {
            id: "toolu_1".to_string(),
            name: "read_file".to_string(),
            stream_index: 1,
            input: serde_json::Value::Null,
        },
    ];
    let reducer = fold(&mid_stream);
    let blocks = reducer.current_message().unwrap().blocks();
    let units = view::project(blocks, reducer.is_streaming());

    assert_eq!(units.len(), 1);
    let DisplayUnit::Group(group) = &units[0] else {
        panic!("expected a group");
    };
    assert_eq!(group.blocks.len(), 2);
    assert!(group.is_latest_active_section);
    assert!(!group.has_text_after);
    assert!(group.auto_expanded);
}

#[test]
fn projection_collapses_the_group_once_text_follows_and_the_turn_ends() {
    let events = decode_transcript(FULL_TURN_TRANSCRIPT).unwrap();
    let reducer = fold(&events);
    let blocks = reducer.conversation()[1].blocks();
    let units = view::project(blocks, reducer.is_streaming());

    assert_eq!(units.len(), 2);
    let DisplayUnit::Group(group) = &units[0] else {
        panic!("expected a group first");
    };
    assert!(group.has_text_after);
    assert!(!group.auto_expanded);
    assert!(matches!(units[1], DisplayUnit::Text(_)));
}

#[test]
fn stopped_transcript_replays_to_a_stopped_turn() {
    let transcript = r#"event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"partial answ"}}

event: message_delta
data: {"type":"message_delta","delta":{"stop_reason":"interrupted"}}

event: message_stop
data: {"type":"message_stop"}

"#;
    let events = decode_transcript(transcript).unwrap();
    let reducer = fold(&events);

    assert_eq!(reducer.phase(), TurnPhase::Stopped);
    match &reducer.conversation()[1].content {
        MessageContent::Blocks(blocks) => {
            assert!(matches!(&blocks[0], ContentBlock::Text { text } if text == "partial answ"));
        }
        MessageContent::Text(_) => panic!("expected block content"),
    }
}
