//! Question answering over retrieved context.
//!
//! [`AnswerEngine::answer`] retrieves a small top-K set of supporting
//! documents, assembles bounded excerpts into a context block, and asks
//! the generation provider for an answer grounded in that block. Zero
//! retrieval hits is not an error: the context is replaced by an explicit
//! marker so the generator says so instead of hallucinating. The
//! assembled context is ephemeral, rebuilt on every call and never
//! persisted.

use std::sync::Arc;

use crate::config::AnswerConfig;
use crate::error::{PipelineError, Result};
use crate::extract::clip_chars;
use crate::llm::GenerationProvider;
use crate::models::{GeneratedAnswer, RetrievalQuery, SearchFilters};
use crate::retrieval::RetrievalEngine;
use crate::store::DocumentStore;

/// Substituted for the context block when retrieval finds nothing.
pub const NO_CONTEXT_MARKER: &str = "[no supporting documents found]";

const SYSTEM_PROMPT: &str = "You are an HR assistant answering questions about a document collection. Ground every statement in the provided context.";

pub struct AnswerEngine {
    store: DocumentStore,
    retrieval: RetrievalEngine,
    llm: Arc<dyn GenerationProvider>,
    cfg: AnswerConfig,
}

impl AnswerEngine {
    pub fn new(
        store: DocumentStore,
        retrieval: RetrievalEngine,
        llm: Arc<dyn GenerationProvider>,
        cfg: AnswerConfig,
    ) -> Self {
        Self {
            store,
            retrieval,
            llm,
            cfg,
        }
    }

    /// Answer a free-text question, optionally scoped to one owner's
    /// documents. Fails with `GenerationFailed` only when the generation
    /// call itself errors.
    pub async fn answer(&self, query: &str, owner_scope: Option<&str>) -> Result<GeneratedAnswer> {
        let question = query.trim();
        if question.is_empty() {
            return Err(PipelineError::ValidationError(
                "query must not be empty".to_string(),
            ));
        }

        let retrieval_query = RetrievalQuery {
            query: question.to_string(),
            filters: SearchFilters {
                owner: owner_scope.map(|o| o.to_string()),
                ..Default::default()
            },
            limit: Some(self.cfg.context_documents as i64),
        };
        let hits = self.retrieval.search(&retrieval_query).await?;

        let mut supporting = Vec::with_capacity(hits.len());
        let mut excerpts = Vec::with_capacity(hits.len());
        for hit in &hits {
            // A hit can only vanish if an external collaborator deleted the
            // record between retrieval and assembly; skip it.
            if let Some(doc) = self.store.get(&hit.id).await? {
                excerpts.push((doc.filename.clone(), doc.content.clone()));
                supporting.push(doc.id);
            }
        }

        let grounded = !excerpts.is_empty();
        let context = if grounded {
            build_context(&excerpts, self.cfg.excerpt_chars)
        } else {
            NO_CONTEXT_MARKER.to_string()
        };

        let text = self
            .llm
            .complete(SYSTEM_PROMPT, &build_prompt(&context, question))
            .await?;

        Ok(GeneratedAnswer {
            text,
            supporting,
            grounded,
        })
    }
}

/// Concatenate bounded excerpts with filename attribution.
fn build_context(excerpts: &[(String, String)], excerpt_chars: usize) -> String {
    let mut block = String::new();
    for (filename, content) in excerpts {
        block.push_str("--- ");
        block.push_str(filename);
        block.push_str(" ---\n");
        block.push_str(clip_chars(content, excerpt_chars));
        block.push_str("\n\n");
    }
    block.trim_end().to_string()
}

fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {}\n\nAnswer using only the context above. \
         If the context is \"{}\", state that no supporting documents were found \
         instead of guessing.",
        context, question, NO_CONTEXT_MARKER
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_excerpts_are_bounded_and_attributed() {
        let excerpts = vec![
            ("cv.txt".to_string(), "abcdefghij".to_string()),
            ("review.txt".to_string(), "short".to_string()),
        ];
        let block = build_context(&excerpts, 4);
        assert!(block.contains("--- cv.txt ---\nabcd"));
        assert!(block.contains("--- review.txt ---\nshort"));
        assert!(!block.contains("abcde"));
    }

    #[test]
    fn prompt_carries_marker_instruction() {
        let prompt = build_prompt(NO_CONTEXT_MARKER, "who knows React?");
        assert!(prompt.contains(NO_CONTEXT_MARKER));
        assert!(prompt.contains("who knows React?"));
    }
}
