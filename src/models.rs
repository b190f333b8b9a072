//! Core data models used throughout the pipeline.
//!
//! These types represent documents, their derived facets (analysis and
//! embedding), and the search structures that flow through retrieval and
//! answering.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an uploaded document.
///
/// `pending` → `processing` once extraction succeeds; `completed` once the
/// analysis and embedding facets have both settled (success or isolated
/// failure); `error` on unrecoverable extraction failure. `completed` and
/// `error` are terminal for the upload itself; facet re-runs do not move
/// the document back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<DocumentStatus> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

/// Experience-level classification. Closed set: provider output that does
/// not match one of the named labels maps to `Unknown`, never a new label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Junior,
    Mid,
    Senior,
    #[default]
    Unknown,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Junior => "junior",
            ExperienceLevel::Mid => "mid",
            ExperienceLevel::Senior => "senior",
            ExperienceLevel::Unknown => "unknown",
        }
    }

    /// Map free-form provider text onto the closed set. Matches the first
    /// word case-insensitively; anything else is `Unknown`.
    pub fn from_label(s: &str) -> ExperienceLevel {
        match s
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "junior" | "entry" => ExperienceLevel::Junior,
            "mid" | "mid-level" | "intermediate" => ExperienceLevel::Mid,
            "senior" | "lead" | "principal" => ExperienceLevel::Senior,
            _ => ExperienceLevel::Unknown,
        }
    }
}

/// Sentiment classification. Closed set with the same mapping policy as
/// [`ExperienceLevel`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    #[default]
    Unknown,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
            Sentiment::Unknown => "unknown",
        }
    }

    pub fn from_label(s: &str) -> Sentiment {
        match s
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_matches(|c: char| !c.is_ascii_alphabetic())
            .to_ascii_lowercase()
            .as_str()
        {
            "positive" => Sentiment::Positive,
            "neutral" | "mixed" => Sentiment::Neutral,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Unknown,
        }
    }
}

/// Contact information found in a document. Populated by two independent
/// extractors (pattern-based and model-based) merged with pattern
/// precedence on conflicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Other identifiers (profile URLs, handles), deduplicated.
    #[serde(default)]
    pub other: Vec<String>,
}

impl ContactInfo {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.other.is_empty()
    }
}

/// Structured analysis result, owned by the document it was computed
/// from, persisted as one atomic facet, immutable except by re-analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_level")]
    pub experience_level: ExperienceLevel,
    #[serde(default = "default_sentiment")]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
}

fn default_level() -> ExperienceLevel {
    ExperienceLevel::Unknown
}

fn default_sentiment() -> Sentiment {
    Sentiment::Unknown
}

/// The embedding facet of a document. Either fully present or fully
/// absent; the store writes all fields in a single statement.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub vector: Vec<f32>,
    pub model: String,
    pub version: String,
    /// Content hash of the document at the time the vector was computed.
    pub content_hash: String,
    pub computed_at: i64,
}

impl EmbeddingRecord {
    /// A record is stale when its version tag no longer matches the
    /// configured version, or the owning document's content changed
    /// after it was computed.
    pub fn is_stale(&self, configured_version: &str, current_hash: &str) -> bool {
        self.version != configured_version || self.content_hash != current_hash
    }
}

/// A stored document with its derived facets.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub owner: String,
    pub filename: String,
    pub content_type: String,
    pub content: String,
    pub content_hash: String,
    pub status: DocumentStatus,
    pub status_reason: Option<String>,
    pub uploaded_at: i64,
    pub updated_at: i64,
    pub analysis: Option<AnalysisResult>,
    pub analyzed_at: Option<i64>,
    pub embedding: Option<EmbeddingRecord>,
}

/// Structured filter set for retrieval. All present constraints must pass
/// (logical AND) for a document to be eligible.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub owner: Option<String>,
    pub skill: Option<String>,
    pub experience_level: Option<ExperienceLevel>,
    pub status: Option<DocumentStatus>,
    /// Inclusive lower bound on `uploaded_at`, unix seconds.
    pub uploaded_after: Option<i64>,
    /// Inclusive upper bound on `uploaded_at`, unix seconds.
    pub uploaded_before: Option<i64>,
}

/// A free-text retrieval query with optional structured filters. An empty
/// query with filters is legal and ranks matches by recency.
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    pub query: String,
    pub filters: SearchFilters,
    pub limit: Option<i64>,
}

/// Per-hit relevance signal breakdown. `semantic` is `None` for documents
/// scored lexical-only (no stored vector, or the semantic channel was
/// unavailable for the call).
#[derive(Debug, Clone, Serialize)]
pub struct SignalBreakdown {
    pub lexical: f64,
    pub semantic: Option<f64>,
}

/// A ranked search result. `preview` is truncated to the configured
/// preview length. A presentation contract, not a storage one.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub filename: String,
    pub owner: String,
    pub updated_at: i64,
    pub score: f64,
    pub signals: SignalBreakdown,
    pub preview: String,
}

/// A generated answer tied to the retrieved context it was grounded on.
/// `grounded` is false when retrieval found nothing and the generator was
/// explicitly told so.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAnswer {
    pub text: String,
    pub supporting: Vec<String>,
    pub grounded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experience_label_mapping_is_closed() {
        assert_eq!(ExperienceLevel::from_label("Senior"), ExperienceLevel::Senior);
        assert_eq!(
            ExperienceLevel::from_label("mid-level engineer"),
            ExperienceLevel::Mid
        );
        assert_eq!(ExperienceLevel::from_label("entry"), ExperienceLevel::Junior);
        assert_eq!(
            ExperienceLevel::from_label("wizard-tier"),
            ExperienceLevel::Unknown
        );
        assert_eq!(ExperienceLevel::from_label(""), ExperienceLevel::Unknown);
    }

    #[test]
    fn sentiment_label_mapping_is_closed() {
        assert_eq!(Sentiment::from_label("POSITIVE"), Sentiment::Positive);
        assert_eq!(Sentiment::from_label("negative."), Sentiment::Negative);
        assert_eq!(Sentiment::from_label("mixed feelings"), Sentiment::Neutral);
        assert_eq!(Sentiment::from_label("enthusiastic"), Sentiment::Unknown);
    }

    #[test]
    fn staleness_on_version_or_hash_change() {
        let rec = EmbeddingRecord {
            vector: vec![0.0; 4],
            model: "text-embedding-3-small".to_string(),
            version: "1".to_string(),
            content_hash: "abc".to_string(),
            computed_at: 100,
        };
        assert!(!rec.is_stale("1", "abc"));
        assert!(rec.is_stale("2", "abc"));
        assert!(rec.is_stale("1", "def"));
    }

    #[test]
    fn status_roundtrip() {
        for s in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Error,
        ] {
            assert_eq!(DocumentStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(DocumentStatus::parse("archived"), None);
    }
}
