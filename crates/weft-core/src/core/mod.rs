//! Core module: UI-agnostic document assembly runtime.
//!
//! This module contains:
//! - `model`: Conversation document types
//! - `events`: Protocol event types for streaming
//! - `reducer`: The event fold that assembles the document
//! - `session`: Event channels and the session loop
//! - `interrupt`: Signal handling for graceful interruption

pub mod events;
pub mod interrupt;
pub mod model;
pub mod reducer;
pub mod session;
