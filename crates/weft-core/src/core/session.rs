//! Channel plumbing and the session loop that drives a [`Reducer`].
//!
//! Protocol events arrive on a bounded mpsc channel, get folded into the
//! document, and snapshots go out to consumers. A broadcaster task fans one
//! event stream out to multiple consumers without letting a slow one block
//! the rest.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::events::StreamEvent;
use crate::core::interrupt;
use crate::core::model::Conversation;
use crate::core::reducer::{Reducer, TurnPhase};

/// Channel-based event sender (async, bounded).
///
/// Events are wrapped in `Arc` for efficient cloning to multiple consumers.
pub type EventTx = mpsc::Sender<Arc<StreamEvent>>;

/// Channel-based event receiver (async, bounded).
pub type EventRx = mpsc::Receiver<Arc<StreamEvent>>;

/// Default channel capacity for event streams.
///
/// Set higher (128) to accommodate best-effort delta sends without blocking.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Creates a bounded event channel with the default capacity.
pub fn create_event_channel() -> (EventTx, EventRx) {
    mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY)
}

/// Event sender wrapper that provides best-effort and reliable send modes.
///
/// Use `send_delta()` for high-volume events (`MessageChunk`, chunk deltas)
/// that can be dropped if the consumer is slow. Use `send_important()` for
/// events that must be delivered (block boundaries, terminal events).
#[derive(Clone)]
pub struct EventSender {
    tx: EventTx,
}

impl EventSender {
    /// Creates a new `EventSender` wrapping the given channel sender.
    pub fn new(tx: EventTx) -> Self {
        Self { tx }
    }

    /// Best-effort send: never awaits, drops if channel is full.
    pub fn send_delta(&self, ev: StreamEvent) {
        let _ = self.tx.try_send(Arc::new(ev));
    }

    /// Reliable send: awaits delivery.
    pub async fn send_important(&self, ev: StreamEvent) {
        let _ = self.tx.send(Arc::new(ev)).await;
    }

    /// Routes by event class: chunk deltas go best-effort, everything
    /// else (block boundaries, terminal events) is awaited.
    pub async fn send(&self, ev: StreamEvent) {
        if is_delta(&ev) {
            self.send_delta(ev);
        } else {
            self.send_important(ev).await;
        }
    }
}

fn is_delta(ev: &StreamEvent) -> bool {
    matches!(
        ev,
        StreamEvent::MessageChunk { .. }
            | StreamEvent::ThinkingChunk { .. }
            | StreamEvent::ToolInputDelta { .. }
            | StreamEvent::ToolResultDelta { .. }
            | StreamEvent::DebugMessage { .. }
    )
}

/// Spawns a broadcast task that distributes events to multiple consumers.
///
/// Uses `try_send` (best-effort) to prevent slow consumers from blocking
/// others. Events are dropped if a consumer's channel is full. Closed
/// channels are automatically removed.
///
/// The task exits when the source channel closes.
pub fn spawn_broadcaster(mut rx: EventRx, mut subscribers: Vec<EventTx>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            subscribers.retain(|tx| {
                match tx.try_send(Arc::clone(&event)) {
                    Ok(()) | Err(TrySendError::Full(_)) => true, // drop this event, keep channel
                    Err(TrySendError::Closed(_)) => false,       // remove closed channel
                }
            });
        }
    })
}

/// Snapshot emitted to consumers after each applied event.
#[derive(Debug, Clone)]
pub struct DocumentUpdate {
    pub phase: TurnPhase,
    pub conversation: Conversation,
}

/// Owns a [`Reducer`] and feeds it from an event channel.
///
/// After an interrupt, events still in flight from the cancelled turn are
/// suppressed so they cannot restart a turn the user already stopped. The
/// suppression lifts when the host starts the next turn via [`push_user`].
///
/// [`push_user`]: Session::push_user
pub struct Session {
    reducer: Reducer,
    suppress_stale: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            reducer: Reducer::new(),
            suppress_stale: false,
        }
    }

    pub fn with_conversation(conversation: Conversation) -> Self {
        Self {
            reducer: Reducer::with_conversation(conversation),
            suppress_stale: false,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        self.reducer.conversation()
    }

    pub fn phase(&self) -> TurnPhase {
        self.reducer.phase()
    }

    /// Appends a user message and lifts post-interrupt suppression.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.suppress_stale = false;
        self.reducer.push_user(text);
    }

    /// Applies one event, unless it is stale leftover from an interrupted
    /// turn.
    pub fn handle(&mut self, event: &StreamEvent) {
        if self.suppress_stale {
            debug!(?event, "Dropping stale event from interrupted turn");
            return;
        }
        self.reducer.apply(event);
    }

    /// Stops the current turn and starts suppressing in-flight events.
    pub fn interrupt(&mut self) {
        self.reducer.interrupt();
        self.suppress_stale = true;
    }

    pub fn snapshot(&self) -> DocumentUpdate {
        DocumentUpdate {
            phase: self.reducer.phase(),
            conversation: self.reducer.conversation().clone(),
        }
    }

    /// Drives the session from a channel until the turn reaches a terminal
    /// phase, the channel closes, or the user interrupts.
    ///
    /// The caller is expected to call [`interrupt::reset`] before starting
    /// a new turn.
    pub async fn run(&mut self, mut rx: EventRx) -> TurnPhase {
        loop {
            tokio::select! {
                () = interrupt::wait_for_interrupt() => {
                    self.interrupt();
                    return self.reducer.phase();
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        return self.reducer.phase();
                    };
                    self.handle(&event);
                    if self.reducer.phase().is_terminal() {
                        return self.reducer.phase();
                    }
                }
            }
        }
    }

    pub fn into_conversation(self) -> Conversation {
        self.reducer.into_conversation()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
