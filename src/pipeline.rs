//! Upload processing orchestration.
//!
//! Coordinates the full flow: extraction → content persistence →
//! analysis and embedding running concurrently off the same normalized
//! text. Lifecycle: `pending` on insert, `processing` once extraction
//! succeeds, `completed` once both facets settle (success or isolated
//! failure), `error` with a recorded reason on unrecoverable extraction
//! failure. Facet re-runs (`reanalyze`, `EmbeddingIndexer::embed_document`)
//! reset only their facet, never the lifecycle.

use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::analyze::{AnalysisOptions, DocumentAnalyzer};
use crate::error::{PipelineError, Result};
use crate::extract::extract_text;
use crate::indexer::EmbeddingIndexer;
use crate::models::{AnalysisResult, DocumentStatus};
use crate::store::{DocumentStore, NewDocument};

pub struct Pipeline {
    store: DocumentStore,
    analyzer: DocumentAnalyzer,
    indexer: EmbeddingIndexer,
    embedding_enabled: bool,
}

/// What happened to one upload. Facet flags report isolated failures that
/// did not fail the upload itself.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub id: String,
    pub status: DocumentStatus,
    pub analysis_ok: bool,
    pub embedding_ok: bool,
}

impl Pipeline {
    pub fn new(
        store: DocumentStore,
        analyzer: DocumentAnalyzer,
        indexer: EmbeddingIndexer,
        embedding_enabled: bool,
    ) -> Self {
        Self {
            store,
            analyzer,
            indexer,
            embedding_enabled,
        }
    }

    /// Ingest an uploaded file: extract, persist content, then run the
    /// analysis and embedding facets concurrently. Either facet may fail
    /// in isolation without failing the upload.
    pub async fn process_upload(
        &self,
        owner: &str,
        filename: &str,
        bytes: &[u8],
        declared_mime: &str,
        opts: &AnalysisOptions,
    ) -> Result<UploadOutcome> {
        if bytes.is_empty() {
            return Err(PipelineError::ValidationError(
                "uploaded file is empty".to_string(),
            ));
        }
        if owner.trim().is_empty() || filename.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "owner and filename are required".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        self.store
            .insert_document(&NewDocument {
                id: id.clone(),
                owner: owner.to_string(),
                filename: filename.to_string(),
                content_type: declared_mime.to_string(),
            })
            .await?;

        let text = match extract_text(bytes, declared_mime) {
            Ok(text) => text,
            Err(e) => {
                self.store
                    .set_status(&id, DocumentStatus::Error, Some(&e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        self.store
            .store_content(&id, &text, &content_hash(&text))
            .await?;
        self.store
            .set_status(&id, DocumentStatus::Processing, None)
            .await?;

        let (analysis_res, embed_res) = tokio::join!(
            self.analyzer.analyze(&text, filename, opts),
            self.maybe_embed(&id),
        );

        let analysis_ok = match analysis_res {
            Ok(analysis) => {
                self.store.write_analysis(&id, &analysis).await?;
                true
            }
            Err(e) => {
                warn!(id = %id, "analysis facet failed: {}", e);
                false
            }
        };

        let embedding_ok = match embed_res {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                warn!(id = %id, "embedding facet failed: {}", e);
                false
            }
            None => false,
        };

        self.store
            .set_status(&id, DocumentStatus::Completed, None)
            .await?;

        Ok(UploadOutcome {
            id,
            status: DocumentStatus::Completed,
            analysis_ok,
            embedding_ok,
        })
    }

    /// One-shot analysis of raw bytes; nothing is persisted. This is the
    /// stateless `AnalyzeDocument` operation.
    pub async fn analyze_upload(
        &self,
        bytes: &[u8],
        declared_mime: &str,
        filename: &str,
        opts: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        if bytes.is_empty() {
            return Err(PipelineError::ValidationError(
                "uploaded file is empty".to_string(),
            ));
        }
        let text = extract_text(bytes, declared_mime)?;
        self.analyzer.analyze(&text, filename, opts).await
    }

    /// Re-run analysis for a stored document, replacing only the analysis
    /// facet.
    pub async fn reanalyze(&self, id: &str, opts: &AnalysisOptions) -> Result<AnalysisResult> {
        let doc = self.store.require(id).await?;
        if doc.content.trim().is_empty() {
            return Err(PipelineError::AnalysisFailed(
                "document has no extracted content".to_string(),
            ));
        }
        let analysis = self.analyzer.analyze(&doc.content, &doc.filename, opts).await?;
        self.store.write_analysis(id, &analysis).await?;
        Ok(analysis)
    }

    async fn maybe_embed(&self, id: &str) -> Option<Result<()>> {
        if !self.embedding_enabled {
            return None;
        }
        Some(self.indexer.embed_document(id).await.map(|_| ()))
    }
}

/// SHA-256 hash of normalized content, hex-encoded. Drives embedding
/// staleness detection.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_content_sensitive() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }
}
