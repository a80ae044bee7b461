//! Vector storage backends.
//!
//! The index layer talks to storage through [`VectorIndex`], which models a
//! single named collection that is replaced wholesale on every rebuild.
//! Readers always see either the previous complete collection or the new
//! one, never a mix.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::SiteChatError;

/// Provenance carried alongside every stored vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    pub url: String,
    pub title: String,
    pub heading: Option<String>,
    pub ordinal: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: PassageMetadata,
}

/// One nearest-neighbor match. `distance` is cosine distance in [0, 2].
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: PassageMetadata,
    pub distance: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replaces the whole collection atomically.
    async fn replace_collection(&self, entries: Vec<VectorEntry>) -> Result<(), SiteChatError>;

    /// Returns up to `k` entries nearest to `query`, closest first.
    async fn query(&self, query: &[f32], k: usize) -> Result<Vec<QueryHit>, SiteChatError>;

    async fn count(&self) -> usize;

    /// Clears the collection. Returns whether anything was there to drop.
    async fn drop_if_exists(&self) -> Result<bool, SiteChatError>;
}

/// Brute-force cosine index held in memory behind an `Arc` swap, with an
/// optional JSON snapshot for persistence across restarts.
pub struct InMemoryVectorIndex {
    collection: RwLock<Arc<Vec<VectorEntry>>>,
    snapshot: Option<PathBuf>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            collection: RwLock::new(Arc::new(Vec::new())),
            snapshot: None,
        }
    }

    /// Opens an index backed by a snapshot file, loading it if present.
    /// A missing file is a fresh index; a corrupt one is an error.
    pub async fn with_snapshot(path: impl Into<PathBuf>) -> Result<Self, SiteChatError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let entries: Vec<VectorEntry> = serde_json::from_slice(&bytes).map_err(|e| {
                    SiteChatError::Index(format!("corrupt snapshot {}: {e}", path.display()))
                })?;
                info!(path = %path.display(), entries = entries.len(), "loaded index snapshot");
                entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            collection: RwLock::new(Arc::new(entries)),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, entries: &[VectorEntry]) -> Result<(), SiteChatError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(entries)
            .map_err(|e| SiteChatError::Index(format!("failed to encode snapshot: {e}")))?;
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), entries = entries.len(), "wrote index snapshot");
        Ok(())
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine distance, 1 - similarity. Zero-norm vectors compare as maximally
/// distant from everything, so degraded placeholder entries sink to the
/// bottom of every ranking.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn replace_collection(&self, entries: Vec<VectorEntry>) -> Result<(), SiteChatError> {
        let entries = Arc::new(entries);
        if let Err(e) = self.persist(&entries).await {
            // The in-memory swap still proceeds; the snapshot is best effort.
            warn!(error = %e, "snapshot write failed");
        }
        *self.collection.write() = Arc::clone(&entries);
        info!(entries = entries.len(), "collection replaced");
        Ok(())
    }

    async fn query(&self, query: &[f32], k: usize) -> Result<Vec<QueryHit>, SiteChatError> {
        let collection = Arc::clone(&*self.collection.read());
        let mut hits: Vec<QueryHit> = collection
            .iter()
            .map(|entry| QueryHit {
                id: entry.id.clone(),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                distance: cosine_distance(query, &entry.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> usize {
        self.collection.read().len()
    }

    async fn drop_if_exists(&self) -> Result<bool, SiteChatError> {
        let had_entries = {
            let mut guard = self.collection.write();
            let had = !guard.is_empty();
            *guard = Arc::new(Vec::new());
            had
        };
        if let Some(path) = &self.snapshot {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(had_entries)
    }
}
