//! sitechat turns a website into a queryable knowledge base.
//!
//! The pipeline has two halves. Indexing crawls a site breadth-first,
//! splits each page into overlapping passages, embeds them, and replaces
//! the vector collection wholesale. Querying retrieves the nearest
//! passages and composes a grounded answer that cites its sources.
//!
//! ```text
//!   +---------+    +---------+    +-----------+    +----------------+
//!   | crawler | -> | chunker | -> | providers | -> | knowledge index|
//!   +---------+    +---------+    +-----------+    +----------------+
//!                                                          |
//!                         +----------+    +----------+     |
//!          API / CLI  <-- | workflow | <- | retrieval| <---+
//!                         +----------+    +----------+
//! ```
//!
//! [`crawler`] fetches in-scope pages, [`chunker`] produces deterministic
//! overlapping passages, [`index`] embeds and searches them, and
//! [`workflow`] runs the search-then-compose chat turn that [`api`] and
//! the CLI expose.

pub mod api;
pub mod chunker;
pub mod config;
pub mod crawler;
pub mod index;
pub mod providers;
pub mod types;
pub mod workflow;

pub use chunker::{chunk_page, Passage};
pub use config::{ChunkConfig, CrawlConfig, SiteChatConfig};
pub use crawler::{Page, PageFetcher, SiteCrawler, StaticFetcher};
pub use index::{InMemoryVectorIndex, KnowledgeIndex, RetrievalResult};
pub use providers::{CompletionProvider, EmbeddingProvider};
pub use types::{ChatMessage, SiteChatError};
pub use workflow::{Answer, ChatStreamEvent, ChatWorkflow, SourceCitation};
