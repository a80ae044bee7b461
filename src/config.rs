//! Configuration for the crawl, chunking, providers, and API surface.
//!
//! All validation happens at construction time: a bad chunk geometry or a
//! missing origin fails fast here, before any crawl or query begins.

use std::time::Duration;

use crate::crawler::policy;
use crate::types::SiteChatError;

/// Bounds and pacing for one crawl session.
#[derive(Clone, Debug)]
pub struct CrawlConfig {
    /// Starting URL; also defines the in-scope host.
    pub origin: String,
    /// Maximum link depth from the origin (origin itself is depth 0).
    pub max_depth: usize,
    /// Maximum number of pages to record.
    pub max_pages: usize,
    /// Politeness delay applied after every page, success or failure.
    pub delay: Duration,
    /// Per-request fetch timeout.
    pub fetch_timeout: Duration,
}

impl CrawlConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            max_depth: 3,
            max_pages: 100,
            delay: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn validate(&self) -> Result<(), SiteChatError> {
        if self.origin.trim().is_empty() {
            return Err(SiteChatError::Config("origin URL is empty".into()));
        }
        let url = policy::canonicalize(&self.origin)
            .ok_or_else(|| SiteChatError::Config(format!("origin URL '{}' is not a valid absolute URL", self.origin)))?;
        if url.host_str().is_none() {
            return Err(SiteChatError::Config(format!("origin URL '{}' has no host", self.origin)));
        }
        if self.max_pages == 0 {
            return Err(SiteChatError::Config("max_pages must be at least 1".into()));
        }
        Ok(())
    }
}

/// Geometry of the sliding-window chunker.
#[derive(Clone, Copy, Debug)]
pub struct ChunkConfig {
    /// Window size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks. Must be < `chunk_size`.
    pub overlap: usize,
    /// Absolute upper bound on a single passage; oversized chunks are dropped
    /// with a warning to protect the embedding provider.
    pub hard_cap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            hard_cap: 10_000,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, SiteChatError> {
        let cfg = Self {
            chunk_size,
            overlap,
            ..Self::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), SiteChatError> {
        if self.chunk_size == 0 {
            return Err(SiteChatError::Config("chunk_size must be at least 1".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(SiteChatError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Process-wide settings, loaded from the environment.
#[derive(Clone, Debug)]
pub struct SiteChatConfig {
    pub chunk: ChunkConfig,
    /// OpenAI-compatible API base, e.g. `https://api.openai.com/v1`.
    pub api_base: String,
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    /// Vector width of the embedding model; 1536 for text-embedding-3-small.
    pub embedding_dimensions: usize,
    /// Where the index snapshot is persisted, if anywhere.
    pub snapshot_path: Option<std::path::PathBuf>,
    /// Bind address for the API server.
    pub bind: String,
    /// Default number of passages retrieved per query.
    pub top_k: usize,
}

impl SiteChatConfig {
    /// Reads configuration from the environment (after `dotenvy` has had a
    /// chance to populate it). Missing provider credentials fail fast.
    pub fn from_env() -> Result<Self, SiteChatError> {
        let chunk = ChunkConfig::new(
            read_usize("SITECHAT_CHUNK_SIZE", 1000)?,
            read_usize("SITECHAT_CHUNK_OVERLAP", 200)?,
        )?;

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| SiteChatError::Config("OPENAI_API_KEY is not set".into()))?;
        if api_key.trim().is_empty() {
            return Err(SiteChatError::Config("OPENAI_API_KEY is empty".into()));
        }

        Ok(Self {
            chunk,
            api_base: std::env::var("SITECHAT_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key,
            chat_model: std::env::var("SITECHAT_CHAT_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_model: std::env::var("SITECHAT_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            embedding_dimensions: read_usize("SITECHAT_EMBEDDING_DIMENSIONS", 1536)?,
            snapshot_path: std::env::var("SITECHAT_SNAPSHOT").ok().map(Into::into),
            bind: std::env::var("SITECHAT_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            top_k: read_usize("SITECHAT_TOP_K", 5)?,
        })
    }
}

fn read_usize(key: &str, default: usize) -> Result<usize, SiteChatError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|err| SiteChatError::Config(format!("{key}='{raw}' is not a number: {err}"))),
        Err(_) => Ok(default),
    }
}
