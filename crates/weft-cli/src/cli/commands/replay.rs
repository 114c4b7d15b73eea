//! Replays a recorded SSE transcript through the session loop.

use std::io::Read;

use anyhow::{Context, Result};
use weft_core::core::interrupt;
use weft_core::core::model::{ContentBlock, Conversation, MessageContent, Role};
use weft_core::core::reducer::TurnPhase;
use weft_core::core::session::{EventSender, Session, create_event_channel};
use weft_core::view::{self, DisplayUnit};
use weft_core::wire::sse::decode_transcript;

pub async fn run(input: &str, json: bool) -> Result<()> {
    let text = read_input(input)?;
    let events = decode_transcript(&text).context("decode transcript")?;
    tracing::debug!(count = events.len(), "decoded transcript events");

    // Feed through the session loop so delivery matches a live stream.
    // Replay must be lossless, so every event is sent reliably.
    let (tx, rx) = create_event_channel();
    let sender = EventSender::new(tx);
    let feeder = tokio::spawn(async move {
        for event in events {
            sender.send_important(event).await;
        }
    });

    let mut session = Session::new();
    let phase = session.run(rx).await;
    feeder.await.context("event feeder task")?;

    if interrupt::is_interrupted() {
        return Err(interrupt::InterruptedError.into());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(session.conversation())?);
    } else {
        render_text(session.conversation(), phase);
    }
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("read transcript from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("read transcript '{input}'"))
    }
}

fn render_text(conversation: &Conversation, phase: TurnPhase) {
    for message in conversation {
        match (&message.role, &message.content) {
            (Role::User, MessageContent::Text(text)) => println!("> {text}"),
            (Role::Assistant, MessageContent::Text(text)) => println!("{text}"),
            (_, MessageContent::Blocks(_)) => {
                for unit in view::project(message.blocks(), false) {
                    render_unit(&unit);
                }
            }
        }
    }
    println!("[turn {}]", phase_label(phase));
}

fn render_unit(unit: &DisplayUnit<'_>) {
    match unit {
        DisplayUnit::Text(block) => {
            if let ContentBlock::Text { text } = block {
                println!("{text}");
            }
        }
        DisplayUnit::Group(group) => {
            for block in &group.blocks {
                render_summary(block);
            }
        }
    }
}

fn render_summary(block: &ContentBlock) {
    match block {
        ContentBlock::Thinking {
            thinking,
            duration_ms,
            ..
        } => {
            let duration = duration_ms
                .map(|ms| format!(" ({ms}ms)"))
                .unwrap_or_default();
            println!("· thinking{duration}: {}", first_line(thinking));
        }
        ContentBlock::ToolUse { tool } => {
            print!("· {}", tool.name);
            if let Some(input) = &tool.parsed_input {
                print!(" {input}");
            }
            match &tool.result {
                Some(result) => println!(" -> {}", first_line(result)),
                None => println!(),
            }
        }
        ContentBlock::Error { error } => println!("· error: {error}"),
        ContentBlock::Text { .. } => {}
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn phase_label(phase: TurnPhase) -> &'static str {
    match phase {
        TurnPhase::Idle => "idle",
        TurnPhase::Streaming => "streaming",
        TurnPhase::Completed => "completed",
        TurnPhase::Stopped => "stopped",
        TurnPhase::Errored => "errored",
    }
}
