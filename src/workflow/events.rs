//! Wire events emitted by a streaming chat turn.

use serde::{Deserialize, Serialize};

use crate::workflow::SourceCitation;

/// Events in the order a client sees them: optional `status` updates, one
/// `sources` before any `token`, zero or more `token`s, at most one `error`,
/// then exactly one `complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    Sources { sources: Vec<SourceCitation> },
    Token { content: String },
    Status { state: String },
    Error { error: String },
    Complete { query: String },
}

impl ChatStreamEvent {
    /// SSE event name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sources { .. } => "sources",
            Self::Token { .. } => "token",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
        }
    }
}
