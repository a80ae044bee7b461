//! The knowledge index: chunking, embedding, and retrieval over one site.

pub mod store;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::chunker::{chunk_page, Passage};
use crate::config::ChunkConfig;
use crate::crawler::Page;
use crate::providers::EmbeddingProvider;
use crate::types::SiteChatError;

pub use store::{InMemoryVectorIndex, PassageMetadata, QueryHit, VectorEntry, VectorIndex};

/// Outcome of one rebuild, for operator visibility.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RebuildReport {
    pub pages: usize,
    pub passages: usize,
    /// Embedding batches that failed and were stored as zero-vector
    /// placeholders.
    pub degraded_batches: usize,
}

/// One retrieval match with its relevance score in (0, 1].
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub query: String,
    pub matches: Vec<ScoredPassage>,
    pub distinct_source_urls: BTreeSet<String>,
}

/// Embedding, storage, and search over crawled pages.
pub struct KnowledgeIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorIndex>,
    chunk: ChunkConfig,
}

impl KnowledgeIndex {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorIndex>,
        chunk: ChunkConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunk,
        }
    }

    /// Chunks, embeds, and stores the given pages, replacing whatever the
    /// collection held before. A failed embedding batch degrades to
    /// zero-vector placeholders instead of aborting the rebuild.
    pub async fn rebuild(&self, pages: &[Page]) -> Result<RebuildReport, SiteChatError> {
        let mut passages: Vec<Passage> = Vec::new();
        for page in pages {
            passages.extend(chunk_page(page, &self.chunk)?);
        }
        info!(pages = pages.len(), passages = passages.len(), "rebuilding index");

        let mut entries: Vec<VectorEntry> = Vec::with_capacity(passages.len());
        let mut degraded_batches = 0usize;
        let batch_size = self.embedder.max_batch_size().max(1);

        for batch in passages.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let vectors = match self.embedder.embed_batch(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => vectors,
                Ok(vectors) => {
                    error!(
                        expected = batch.len(),
                        got = vectors.len(),
                        "embedding batch size mismatch, storing placeholders"
                    );
                    degraded_batches += 1;
                    vec![vec![0.0; self.embedder.dimensions()]; batch.len()]
                }
                Err(e) => {
                    error!(error = %e, "embedding batch failed, storing placeholders");
                    degraded_batches += 1;
                    vec![vec![0.0; self.embedder.dimensions()]; batch.len()]
                }
            };
            for (passage, vector) in batch.iter().zip(vectors) {
                entries.push(VectorEntry {
                    id: Uuid::new_v4().to_string(),
                    vector,
                    text: passage.text.clone(),
                    metadata: PassageMetadata {
                        url: passage.source_url.clone(),
                        title: passage.source_title.clone(),
                        heading: passage.heading.clone(),
                        ordinal: passage.ordinal,
                    },
                });
            }
        }

        let report = RebuildReport {
            pages: pages.len(),
            passages: entries.len(),
            degraded_batches,
        };
        self.store.replace_collection(entries).await?;
        info!(?report, "index rebuilt");
        Ok(report)
    }

    /// Retrieves the `k` most relevant passages for `query`, best first.
    /// Scores map cosine distance d to 1 / (1 + d).
    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult, SiteChatError> {
        if k == 0 {
            return Err(SiteChatError::Config("top_k must be at least 1".into()));
        }
        if self.store.count().await == 0 {
            return Err(SiteChatError::NotReady);
        }

        let mut vectors = self.embedder.embed_batch(&[query.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| SiteChatError::Embedding("provider returned no query vector".into()))?;

        let hits = self.store.query(&vector, k).await?;
        let mut distinct_source_urls = BTreeSet::new();
        let matches: Vec<ScoredPassage> = hits
            .into_iter()
            .map(|hit| {
                distinct_source_urls.insert(hit.metadata.url.clone());
                ScoredPassage {
                    score: 1.0 / (1.0 + hit.distance),
                    passage: Passage {
                        source_url: hit.metadata.url,
                        source_title: hit.metadata.title,
                        heading: hit.metadata.heading,
                        text: hit.text,
                        ordinal: hit.metadata.ordinal,
                    },
                }
            })
            .collect();

        Ok(RetrievalResult {
            query: query.to_string(),
            matches,
            distinct_source_urls,
        })
    }

    pub async fn is_ready(&self) -> bool {
        self.store.count().await > 0
    }

    pub async fn count(&self) -> usize {
        self.store.count().await
    }

    pub async fn drop_if_exists(&self) -> Result<bool, SiteChatError> {
        self.store.drop_if_exists().await
    }
}
