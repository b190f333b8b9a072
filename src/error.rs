//! Typed errors for the document pipeline.
//!
//! Library code returns [`PipelineError`] so callers can branch on the
//! failure kind; `anyhow` is used only at the CLI boundary. Sub-extraction
//! failures inside the analyzer and per-document failures inside batch
//! embedding are recovered locally and reported in-band; they never
//! surface through this type to abort sibling work.

use thiserror::Error;

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Declared MIME type is not one the extractor supports.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Structural parsing of a supported container failed, or extraction
    /// produced no usable text.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Input was empty/unreadable, or every requested sub-extraction failed.
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    /// Embedding a single document failed (empty text, provider error,
    /// or a vector of unexpected dimensionality).
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// The generation provider errored while producing an answer.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Unknown document id.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Missing or malformed required input.
    #[error("invalid input: {0}")]
    ValidationError(String),

    /// Storage collaborator failure.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
