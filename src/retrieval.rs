//! Ranked document retrieval.
//!
//! [`RetrievalEngine::search`] combines three signal types:
//! structured filters (all must pass), lexical relevance (token overlap
//! between the query and document text/keywords, with a substring bonus),
//! and semantic relevance (cosine similarity against stored vectors).
//! Channel scores are min-max normalized over the candidate set and
//! merged with a configured weight. Documents without a stored vector are
//! scored lexical-only, never excluded for lack of one. Ordering is
//! deterministic: score desc, then update recency desc, then id asc.

use std::sync::Arc;
use tracing::warn;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::error::Result;
use crate::extract::clip_chars;
use crate::models::{Document, RetrievalQuery, SearchFilters, SearchHit, SignalBreakdown};
use crate::store::DocumentStore;

/// Weight of a query-token match against the analysis keyword set, on top
/// of plain content overlap.
const KEYWORD_BONUS: f64 = 0.5;
/// Bonus when the whole query appears verbatim in the content.
const SUBSTRING_BONUS: f64 = 0.25;

pub struct RetrievalEngine {
    store: DocumentStore,
    provider: Arc<dyn EmbeddingProvider>,
    embedding_cfg: EmbeddingConfig,
    cfg: RetrievalConfig,
    preview_chars: usize,
}

impl RetrievalEngine {
    pub fn new(
        store: DocumentStore,
        provider: Arc<dyn EmbeddingProvider>,
        embedding_cfg: EmbeddingConfig,
        cfg: RetrievalConfig,
        preview_chars: usize,
    ) -> Self {
        Self {
            store,
            provider,
            embedding_cfg,
            cfg,
            preview_chars,
        }
    }

    /// Run a search. An empty query with filters is legal and returns
    /// filter-matching documents ranked by recency. Every invocation is
    /// recorded in the search log.
    pub async fn search(&self, query: &RetrievalQuery) -> Result<Vec<SearchHit>> {
        let mut candidates = self.store.search_candidates(&query.filters).await?;
        candidates.retain(|doc| facet_filters_pass(doc, &query.filters));

        let limit = query.limit.unwrap_or(self.cfg.final_limit).max(1) as usize;
        let text = query.query.trim();

        let hits = if text.is_empty() {
            // Recency ranking: candidates arrive ordered updated_at desc,
            // id asc from the store.
            candidates
                .iter()
                .take(limit)
                .map(|doc| self.make_hit(doc, 0.0, SignalBreakdown { lexical: 0.0, semantic: None }))
                .collect()
        } else {
            let query_vec = self.query_vector(text).await;
            let ranked = rank(&candidates, text, query_vec.as_deref(), self.cfg.semantic_weight);
            ranked
                .into_iter()
                .take(limit)
                .map(|(idx, score, signals)| self.make_hit(&candidates[idx], score, signals))
                .collect::<Vec<_>>()
        };

        let filter_json = filters_to_json(&query.filters);
        self.store
            .log_search(text, &filter_json, hits.len() as i64)
            .await?;

        Ok(hits)
    }

    /// Embed the query for the semantic channel. A disabled or failing
    /// provider degrades the search to lexical-only instead of failing it.
    async fn query_vector(&self, text: &str) -> Option<Vec<f32>> {
        if !self.embedding_cfg.is_enabled() {
            return None;
        }
        match embed_query(self.provider.as_ref(), text).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("query embedding unavailable, falling back to lexical-only: {}", e);
                None
            }
        }
    }

    fn make_hit(&self, doc: &Document, score: f64, signals: SignalBreakdown) -> SearchHit {
        SearchHit {
            id: doc.id.clone(),
            filename: doc.filename.clone(),
            owner: doc.owner.clone(),
            updated_at: doc.updated_at,
            score,
            signals,
            preview: clip_chars(&doc.content, self.preview_chars).to_string(),
        }
    }
}

/// Apply the filters that live in the analysis facet. Documents without
/// an analysis facet cannot satisfy a skill or experience constraint.
fn facet_filters_pass(doc: &Document, filters: &SearchFilters) -> bool {
    if let Some(ref wanted_skill) = filters.skill {
        let Some(ref analysis) = doc.analysis else {
            return false;
        };
        if !analysis
            .skills
            .iter()
            .any(|s| s.eq_ignore_ascii_case(wanted_skill))
        {
            return false;
        }
    }

    if let Some(wanted_level) = filters.experience_level {
        let Some(ref analysis) = doc.analysis else {
            return false;
        };
        if analysis.experience_level != wanted_level {
            return false;
        }
    }

    true
}

/// Score and order candidates. Returns `(candidate_index, final_score,
/// breakdown)` sorted by score desc, `updated_at` desc, id asc.
fn rank(
    docs: &[Document],
    query: &str,
    query_vec: Option<&[f32]>,
    semantic_weight: f64,
) -> Vec<(usize, f64, SignalBreakdown)> {
    let query_tokens = tokenize(query);

    let raw_lexical: Vec<f64> = docs
        .iter()
        .map(|doc| lexical_score(doc, query, &query_tokens))
        .collect();
    // A channel with no signal at all stays at zero; min-max mapping an
    // all-zero set to 1.0 would rank every candidate as a perfect match.
    let norm_lexical = if raw_lexical.iter().all(|s| *s <= 0.0) {
        vec![0.0; raw_lexical.len()]
    } else {
        normalize(&raw_lexical)
    };

    // Semantic channel: raw cosine per document with a vector, normalized
    // over just those documents.
    let raw_semantic: Vec<Option<f64>> = docs
        .iter()
        .map(|doc| match (query_vec, &doc.embedding) {
            (Some(qv), Some(rec)) => Some(cosine_similarity(qv, &rec.vector) as f64),
            _ => None,
        })
        .collect();
    let present: Vec<f64> = raw_semantic.iter().filter_map(|s| *s).collect();
    let norm_present = normalize(&present);
    let mut norm_iter = norm_present.into_iter();
    let norm_semantic: Vec<Option<f64>> = raw_semantic
        .iter()
        .map(|s| s.map(|_| norm_iter.next().unwrap_or(0.0)))
        .collect();

    let mut scored: Vec<(usize, f64, SignalBreakdown)> = docs
        .iter()
        .enumerate()
        .map(|(idx, _)| {
            let lexical = norm_lexical[idx];
            let semantic = norm_semantic[idx];
            let score = match semantic {
                Some(sem) => (1.0 - semantic_weight) * lexical + semantic_weight * sem,
                None => lexical,
            };
            (idx, score, SignalBreakdown { lexical, semantic })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(docs[b.0].updated_at.cmp(&docs[a.0].updated_at))
            .then(docs[a.0].id.cmp(&docs[b.0].id))
    });

    // Drop documents with no relevance at all so a pure noise query does
    // not return the whole corpus.
    scored.retain(|(_, score, signals)| *score > 0.0 || signals.semantic.is_some());
    scored
}

/// Token overlap between the query and document content/keywords, plus a
/// verbatim-substring bonus. Raw (un-normalized) score.
fn lexical_score(doc: &Document, query: &str, query_tokens: &[String]) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }

    let content_lower = doc.content.to_lowercase();
    let content_tokens: std::collections::HashSet<String> =
        tokenize(&content_lower).into_iter().collect();
    let keyword_tokens: std::collections::HashSet<String> = doc
        .analysis
        .as_ref()
        .map(|a| {
            a.keywords
                .iter()
                .chain(a.skills.iter())
                .flat_map(|k| tokenize(k))
                .collect()
        })
        .unwrap_or_default();

    let mut content_hits = 0usize;
    let mut keyword_hits = 0usize;
    for token in query_tokens {
        if content_tokens.contains(token) {
            content_hits += 1;
        }
        if keyword_tokens.contains(token) {
            keyword_hits += 1;
        }
    }

    let n = query_tokens.len() as f64;
    let mut score = content_hits as f64 / n + KEYWORD_BONUS * (keyword_hits as f64 / n);

    let query_lower = query.trim().to_lowercase();
    if !query_lower.is_empty() && content_lower.contains(&query_lower) {
        score += SUBSTRING_BONUS;
    }

    score
}

/// Lowercased alphanumeric tokens of at least two characters, first
/// occurrence order, deduplicated.
fn tokenize(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Min-max normalize scores to [0, 1]; all-equal sets map to 1.0.
fn normalize(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let s_min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let s_max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    scores
        .iter()
        .map(|s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

fn filters_to_json(filters: &SearchFilters) -> String {
    serde_json::json!({
        "owner": filters.owner,
        "skill": filters.skill,
        "experience_level": filters.experience_level.map(|l| l.as_str()),
        "status": filters.status.map(|s| s.as_str()),
        "uploaded_after": filters.uploaded_after,
        "uploaded_before": filters.uploaded_before,
    })
    .to_string()
}
