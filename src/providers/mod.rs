//! Model provider traits and OpenAI-compatible implementations.
//!
//! Both traits are object safe so the index and workflow layers can hold
//! `Arc<dyn ...>` and tests can substitute deterministic mocks.

pub mod completion;
pub mod embeddings;

pub use completion::{CompletionProvider, MockCompletionProvider, OpenAiCompletionProvider};
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, OpenAiEmbeddingProvider};
