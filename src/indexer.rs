//! Embedding index maintenance.
//!
//! [`EmbeddingIndexer`] computes and persists one vector per document,
//! tagged with the provider's model name and the configured version, and
//! keeps the index fresh as content changes or the configured version
//! moves. Backfill makes monotonic progress: each candidate is processed
//! independently, and a malformed or provider-rejected document becomes an
//! error entry rather than aborting the batch.
//!
//! At most one writer per document facet at a time is assumed: callers
//! must not issue concurrent embed calls for the same document id; the
//! indexer takes no per-key locks of its own.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::embedding::{embed_query, vec_to_blob, EmbeddingProvider};
use crate::error::{PipelineError, Result};
use crate::extract::clip_chars;
use crate::models::Document;
use crate::store::DocumentStore;

/// Result of a single-document embed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedOutcome {
    /// A fresh vector was computed and persisted.
    Embedded,
    /// The stored facet was already current (same version, same content
    /// hash); nothing was written.
    AlreadyCurrent,
}

/// One failed item in a backfill batch.
#[derive(Debug, Clone)]
pub struct BackfillError {
    pub id: String,
    pub reason: String,
}

/// Outcome of one backfill invocation. Batches always report partial
/// success: the updated ids and an explicit list of failures.
#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    pub updated: Vec<String>,
    pub errors: Vec<BackfillError>,
}

pub struct EmbeddingIndexer {
    store: DocumentStore,
    provider: Arc<dyn EmbeddingProvider>,
    cfg: EmbeddingConfig,
    max_chars: usize,
}

impl EmbeddingIndexer {
    pub fn new(
        store: DocumentStore,
        provider: Arc<dyn EmbeddingProvider>,
        cfg: EmbeddingConfig,
        max_chars: usize,
    ) -> Self {
        Self {
            store,
            provider,
            cfg,
            max_chars,
        }
    }

    /// Embed one document. Re-running against an unchanged document with
    /// an unchanged configured version is a no-op and reports
    /// [`EmbedOutcome::AlreadyCurrent`].
    pub async fn embed_document(&self, id: &str) -> Result<EmbedOutcome> {
        let doc = self.store.require(id).await?;

        if let Some(record) = &doc.embedding {
            if !record.is_stale(&self.cfg.version, &doc.content_hash) {
                debug!(id, "embedding already current");
                return Ok(EmbedOutcome::AlreadyCurrent);
            }
        }

        self.compute_and_store(&doc).await?;
        Ok(EmbedOutcome::Embedded)
    }

    /// Embed a bounded batch of documents with missing or stale vectors.
    /// Failures are per-item; the call itself only fails when the
    /// candidate set cannot be fetched. Callers invoke repeatedly until
    /// the report comes back empty.
    pub async fn backfill(&self, owner: Option<&str>, limit: i64) -> Result<BackfillReport> {
        let candidates = self
            .store
            .embedding_candidates(&self.cfg.version, owner, limit)
            .await?;

        let mut report = BackfillReport::default();
        for doc in candidates {
            match self.compute_and_store(&doc).await {
                Ok(()) => report.updated.push(doc.id),
                Err(e) => {
                    warn!(id = %doc.id, "backfill item failed: {}", e);
                    report.errors.push(BackfillError {
                        id: doc.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Compute a vector over the truncated content and publish the facet
    /// in one write. Only the first `max_chars` characters are embedded;
    /// longer documents are an accepted approximation, not an error.
    async fn compute_and_store(&self, doc: &Document) -> Result<()> {
        let excerpt = clip_chars(&doc.content, self.max_chars);
        if excerpt.trim().is_empty() {
            return Err(PipelineError::EmbeddingFailed(
                "document text is empty after truncation".to_string(),
            ));
        }

        let vector = embed_query(self.provider.as_ref(), excerpt).await?;
        if let Some(dims) = self.cfg.dims {
            if vector.len() != dims {
                return Err(PipelineError::EmbeddingFailed(format!(
                    "expected {} dimensions, provider returned {}",
                    dims,
                    vector.len()
                )));
            }
        }

        let blob = vec_to_blob(&vector);
        self.store
            .write_embedding(
                &doc.id,
                &blob,
                self.provider.model_name(),
                &self.cfg.version,
                &doc.content_hash,
            )
            .await
    }
}
