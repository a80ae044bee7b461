//! Shared error taxonomy and chat message type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the sitechat pipeline.
///
/// Transient per-URL fetch problems are *not* represented here; they are
/// [`crate::crawler::FetchFailure`] values, logged and skipped by the crawler.
/// Everything in this enum is either fatal to the operation that produced it
/// or a distinct user-visible condition (`NotReady`).
#[derive(Debug, Error)]
pub enum SiteChatError {
    /// Invalid configuration detected before any crawl or query begins.
    #[error("configuration error: {0}")]
    Config(String),

    /// The crawl itself could not run (not a per-page fetch failure).
    #[error("crawl error: {0}")]
    Crawl(String),

    /// The embedding provider failed in a way that could not be degraded.
    #[error("embedding provider error: {0}")]
    Embedding(String),

    /// The completion provider failed; the workflow never fabricates an
    /// answer in its place.
    #[error("completion provider error: {0}")]
    Completion(String),

    /// The vector index rejected an operation.
    #[error("index error: {0}")]
    Index(String),

    /// Search or chat was requested before any successful index build.
    #[error("knowledge index is empty; index a website first")]
    NotReady,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A chat message with a role and text content.
///
/// Used for chat history handed to the workflow and for the prompt sent to
/// the completion provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub const USER: &'static str = "user";
    pub const ASSISTANT: &'static str = "assistant";
    pub const SYSTEM: &'static str = "system";

    #[must_use]
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Self::USER, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Self::SYSTEM, content)
    }
}
