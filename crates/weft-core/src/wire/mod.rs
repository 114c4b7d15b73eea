//! Wire-level ingestion: decoding transport streams into protocol events.

pub mod sse;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Categories of wire decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorKind {
    /// Malformed event payload or unknown event shape.
    Parse,
    /// Underlying byte stream failed.
    Transport,
}

impl fmt::Display for WireErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireErrorKind::Parse => write!(f, "parse"),
            WireErrorKind::Transport => write!(f, "transport"),
        }
    }
}

/// Structured decode error with kind and a one-line summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
}

impl WireError {
    pub fn new(kind: WireErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(WireErrorKind::Parse, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(WireErrorKind::Transport, message)
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for WireError {}

/// Result type for wire operations.
pub type WireResult<T> = std::result::Result<T, WireError>;
