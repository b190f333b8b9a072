//! Structured document analysis.
//!
//! [`DocumentAnalyzer`] fans out independent sub-extractions (summary,
//! keywords, skills, sentiment, experience level, contact info) over the
//! same input text. Each sub-extraction's failure is isolated: a dead
//! sentiment call must not abort keyword extraction. The call as a whole
//! fails with `AnalysisFailed` only when the input is empty or every
//! requested sub-extraction failed.
//!
//! Contact info comes from two independent extractors: a pattern path
//! (email/phone shapes, profile URLs) and a model path. They are merged
//! with explicit precedence: pattern-matched email and phone win on
//! conflict, the model path fills gaps.

use regex::Regex;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tracing::warn;

use crate::config::AnalysisConfig;
use crate::error::{PipelineError, Result};
use crate::extract::clip_chars;
use crate::llm::GenerationProvider;
use crate::models::{AnalysisResult, ContactInfo, ExperienceLevel, Sentiment};

const SYSTEM_PROMPT: &str = "You are an HR document analyst. Answer precisely and only in the requested format.";

/// Per-call toggles for the analyzer's sub-extractions. A disabled
/// sub-extraction yields an empty/absent field, never an error.
///
/// Defaults: everything enabled.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    pub keywords: bool,
    pub summary: bool,
    pub sentiment: bool,
    pub skills: bool,
    pub contact_info: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            keywords: true,
            summary: true,
            sentiment: true,
            skills: true,
            contact_info: true,
        }
    }
}

pub struct DocumentAnalyzer {
    llm: Arc<dyn GenerationProvider>,
    cfg: AnalysisConfig,
    max_chars: usize,
}

impl DocumentAnalyzer {
    pub fn new(llm: Arc<dyn GenerationProvider>, cfg: AnalysisConfig, max_chars: usize) -> Self {
        Self { llm, cfg, max_chars }
    }

    /// Analyze normalized text. `filename` is used for log attribution
    /// only. Input is clipped to the processing cap before any provider
    /// sees it.
    pub async fn analyze(
        &self,
        text: &str,
        filename: &str,
        opts: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        if text.trim().is_empty() {
            return Err(PipelineError::AnalysisFailed(
                "input text is empty".to_string(),
            ));
        }
        let excerpt = clip_chars(text, self.max_chars);

        let (summary_r, keywords_r, skills_r, sentiment_r, contact_model_r) = tokio::join!(
            maybe(opts.summary, self.generate_summary(excerpt)),
            maybe(opts.keywords, self.extract_list(excerpt, ListKind::Keywords)),
            maybe(opts.skills, self.extract_list(excerpt, ListKind::Skills)),
            maybe(opts.sentiment, self.classify_sentiment(excerpt)),
            maybe(opts.contact_info, self.model_contact(excerpt)),
        );

        let mut requested = 0usize;
        let mut failed = 0usize;

        let summary = match summary_r {
            Some(Ok(s)) => {
                requested += 1;
                Some(s)
            }
            Some(Err(e)) => {
                requested += 1;
                failed += 1;
                warn!(filename, "summary extraction failed: {}", e);
                None
            }
            None => None,
        };

        let keywords = match keywords_r {
            Some(Ok(list)) => {
                requested += 1;
                list
            }
            Some(Err(e)) => {
                requested += 1;
                failed += 1;
                warn!(filename, "keyword extraction failed: {}", e);
                Vec::new()
            }
            None => Vec::new(),
        };

        let skills = match skills_r {
            Some(Ok(list)) => {
                requested += 1;
                list
            }
            Some(Err(e)) => {
                requested += 1;
                failed += 1;
                warn!(filename, "skill extraction failed: {}", e);
                Vec::new()
            }
            None => Vec::new(),
        };

        let sentiment = match sentiment_r {
            Some(Ok(s)) => {
                requested += 1;
                s
            }
            Some(Err(e)) => {
                requested += 1;
                failed += 1;
                warn!(filename, "sentiment analysis failed: {}", e);
                Sentiment::Unknown
            }
            None => Sentiment::Unknown,
        };

        let contact = match contact_model_r {
            Some(model_res) => {
                requested += 1;
                let pattern = extract_contact_patterns(excerpt);
                let merged = match model_res {
                    Ok(model) => merge_contact(pattern, model),
                    Err(e) => {
                        if pattern.is_empty() {
                            failed += 1;
                            warn!(filename, "contact extraction failed: {}", e);
                        } else {
                            warn!(
                                filename,
                                "model contact extraction failed, keeping pattern matches: {}", e
                            );
                        }
                        pattern
                    }
                };
                if merged.is_empty() {
                    None
                } else {
                    Some(merged)
                }
            }
            None => None,
        };

        if requested > 0 && failed == requested {
            return Err(PipelineError::AnalysisFailed(format!(
                "all {} requested sub-extractions failed",
                requested
            )));
        }

        // Experience level is not flag-gated: the heuristic years scan is
        // free, and the provider only backs it up when the text has no
        // years signal.
        let experience_level = match max_years_mentioned(excerpt) {
            Some(years) => self.bucket_years(years),
            None if self.cfg.is_enabled() => match self.classify_experience(excerpt).await {
                Ok(level) => level,
                Err(e) => {
                    warn!(filename, "experience classification failed: {}", e);
                    ExperienceLevel::Unknown
                }
            },
            None => ExperienceLevel::Unknown,
        };

        Ok(AnalysisResult {
            summary,
            keywords,
            skills,
            experience_level,
            sentiment,
            contact,
        })
    }

    fn bucket_years(&self, years: u32) -> ExperienceLevel {
        if years <= self.cfg.junior_max_years {
            ExperienceLevel::Junior
        } else if years >= self.cfg.senior_min_years {
            ExperienceLevel::Senior
        } else {
            ExperienceLevel::Mid
        }
    }

    async fn generate_summary(&self, text: &str) -> Result<String> {
        let prompt = format!(
            "Summarize the following document in at most {} characters. Return only the summary.\n\n{}",
            self.cfg.summary_max_chars, text
        );
        let out = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;
        if out.trim().is_empty() {
            return Err(PipelineError::AnalysisFailed(
                "summary came back empty".to_string(),
            ));
        }
        Ok(clip_chars(out.trim(), self.cfg.summary_max_chars).to_string())
    }

    async fn extract_list(&self, text: &str, kind: ListKind) -> Result<Vec<String>> {
        let what = match kind {
            ListKind::Keywords => "the most important keywords",
            ListKind::Skills => "the professional skills mentioned",
        };
        let prompt = format!(
            "Extract {} from the following document. Respond with a JSON array of strings and nothing else.\n\n{}",
            what, text
        );
        let out = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;
        let list = dedup_ci(parse_string_list(&out));
        if list.is_empty() {
            return Err(PipelineError::AnalysisFailed(format!(
                "{:?} extraction returned no usable list",
                kind
            )));
        }
        Ok(list)
    }

    async fn classify_sentiment(&self, text: &str) -> Result<Sentiment> {
        let prompt = format!(
            "Classify the overall sentiment of the following document. Respond with exactly one word: positive, neutral, or negative.\n\n{}",
            text
        );
        let out = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;
        Ok(Sentiment::from_label(&out))
    }

    async fn classify_experience(&self, text: &str) -> Result<ExperienceLevel> {
        let prompt = format!(
            "Classify the experience level described by the following document. Respond with exactly one word: junior, mid, or senior.\n\n{}",
            text
        );
        let out = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;
        Ok(ExperienceLevel::from_label(&out))
    }

    async fn model_contact(&self, text: &str) -> Result<ContactInfo> {
        let prompt = format!(
            "Extract contact information from the following document. Respond with a JSON object with keys \"email\", \"phone\", and \"other\" (an array of profile URLs or handles), using null for missing fields, and nothing else.\n\n{}",
            text
        );
        let out = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;
        parse_contact_json(&out).ok_or_else(|| {
            PipelineError::AnalysisFailed("contact extraction returned no usable object".to_string())
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Keywords,
    Skills,
}

async fn maybe<F, T>(enabled: bool, fut: F) -> Option<Result<T>>
where
    F: Future<Output = Result<T>>,
{
    if enabled {
        Some(fut.await)
    } else {
        None
    }
}

// ============ Pattern-based contact extraction ============

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?[\d(][\d\s().-]{6,}\d").unwrap())
}

fn profile_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:https?://)?(?:www\.)?(?:linkedin\.com/in/|github\.com/)[A-Za-z0-9_-]+")
            .unwrap()
    })
}

fn years_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(\d{1,2})\s*\+?\s*years?\b").unwrap())
}

/// Accept a phone candidate only when its digit count looks like a real
/// number; filters out year ranges like "2019 - 2023".
fn plausible_phone(candidate: &str) -> bool {
    let digits = candidate.chars().filter(|c| c.is_ascii_digit()).count();
    (9..=15).contains(&digits)
        || ((7..=15).contains(&digits) && (candidate.contains('+') || candidate.contains('(')))
}

/// Heuristic contact extraction over raw text. First match wins for email
/// and phone; profile URLs land in `other`.
pub fn extract_contact_patterns(text: &str) -> ContactInfo {
    let email = email_re().find(text).map(|m| m.as_str().to_string());
    let phone = phone_re()
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .find(|c| plausible_phone(c));
    let other = dedup_ci(
        profile_re()
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect(),
    );

    ContactInfo { email, phone, other }
}

/// Merge pattern and model contact extractions. Pattern-matched email and
/// phone win on conflict; `other` identifiers are unioned and deduplicated.
pub fn merge_contact(pattern: ContactInfo, model: ContactInfo) -> ContactInfo {
    let mut other = pattern.other;
    other.extend(model.other);
    ContactInfo {
        email: pattern.email.or(model.email),
        phone: pattern.phone.or(model.phone),
        other: dedup_ci(other),
    }
}

/// Largest "N years" mention in the text, if any.
pub fn max_years_mentioned(text: &str) -> Option<u32> {
    years_re()
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .max()
}

// ============ Lenient provider-output parsing ============

/// Parse a provider response into a string list. Tries a JSON array first
/// (tolerating code fences and surrounding prose), then falls back to
/// splitting on newlines and commas with bullet markers stripped.
fn parse_string_list(raw: &str) -> Vec<String> {
    let cleaned = strip_code_fences(raw);

    if let (Some(start), Some(end)) = (cleaned.find('['), cleaned.rfind(']')) {
        if start < end {
            if let Ok(items) = serde_json::from_str::<Vec<String>>(&cleaned[start..=end]) {
                return items
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty() && s.chars().count() <= 64)
                    .collect();
            }
        }
    }

    cleaned
        .split(['\n', ','])
        .map(|s| {
            s.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim_matches('"')
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty() && s.chars().count() <= 64)
        .collect()
}

/// Parse a provider response into contact fields, tolerating fences and
/// surrounding prose around the JSON object.
fn parse_contact_json(raw: &str) -> Option<ContactInfo> {
    let cleaned = strip_code_fences(raw);
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if start >= end {
        return None;
    }
    serde_json::from_str::<ContactInfo>(&cleaned[start..=end]).ok()
}

fn strip_code_fences(raw: &str) -> &str {
    let s = raw.trim();
    let s = s.strip_prefix("```json").unwrap_or(s);
    let s = s.strip_prefix("```").unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

/// Case-insensitive dedup that preserves order and first-seen casing.
fn dedup_ci(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|s| seen.insert(s.to_ascii_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerationProvider;
    use async_trait::async_trait;

    /// Scripted provider: routes on markers in the user prompt.
    struct ScriptedLlm;

    #[async_trait]
    impl GenerationProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            if user.starts_with("Summarize") {
                Ok("A concise summary of the document.".to_string())
            } else if user.contains("positive, neutral, or negative") {
                Ok("Positive".to_string())
            } else if user.contains("junior, mid, or senior") {
                Ok("mid".to_string())
            } else if user.contains("\"email\"") {
                Ok(r#"{"email": "model@example.com", "phone": null, "other": ["github.com/jane"]}"#
                    .to_string())
            } else if user.starts_with("Extract the most important keywords") {
                Ok(r#"["React", "TypeScript", "react"]"#.to_string())
            } else if user.starts_with("Extract the professional skills") {
                Ok(r#"["React", "Team leadership"]"#.to_string())
            } else {
                Err(PipelineError::GenerationFailed("unexpected prompt".into()))
            }
        }
    }

    /// Provider where everything fails.
    struct DeadLlm;

    #[async_trait]
    impl GenerationProvider for DeadLlm {
        fn model_name(&self) -> &str {
            "dead"
        }
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Err(PipelineError::GenerationFailed("provider down".into()))
        }
    }

    fn analyzer(llm: Arc<dyn GenerationProvider>) -> DocumentAnalyzer {
        DocumentAnalyzer::new(llm, AnalysisConfig::default(), 8000)
    }

    #[test]
    fn email_and_phone_patterns() {
        let contact =
            extract_contact_patterns("Reach jane@example.com or (555) 123-4567 for details.");
        assert_eq!(contact.email.as_deref(), Some("jane@example.com"));
        assert_eq!(contact.phone.as_deref(), Some("(555) 123-4567"));
    }

    #[test]
    fn year_ranges_are_not_phones() {
        let contact = extract_contact_patterns("Acme Corp, 2019 - 2023. No phone here.");
        assert_eq!(contact.phone, None);
    }

    #[test]
    fn profile_urls_land_in_other() {
        let contact =
            extract_contact_patterns("See linkedin.com/in/jane-doe and github.com/janedoe.");
        assert_eq!(contact.other.len(), 2);
    }

    #[test]
    fn pattern_email_wins_over_model() {
        let pattern = ContactInfo {
            email: Some("pattern@example.com".to_string()),
            phone: None,
            other: vec!["github.com/a".to_string()],
        };
        let model = ContactInfo {
            email: Some("model@example.com".to_string()),
            phone: Some("555-123-4567".to_string()),
            other: vec!["GITHUB.COM/A".to_string(), "linkedin.com/in/b".to_string()],
        };
        let merged = merge_contact(pattern, model);
        assert_eq!(merged.email.as_deref(), Some("pattern@example.com"));
        assert_eq!(merged.phone.as_deref(), Some("555-123-4567"));
        assert_eq!(merged.other, vec!["github.com/a", "linkedin.com/in/b"]);
    }

    #[test]
    fn years_scan_takes_the_maximum() {
        assert_eq!(max_years_mentioned("2 years of Go, 7+ years of React"), Some(7));
        assert_eq!(max_years_mentioned("1 year of Go"), Some(1));
        assert_eq!(max_years_mentioned("no signal here"), None);
    }

    #[test]
    fn string_list_parsing_is_lenient() {
        assert_eq!(
            parse_string_list("```json\n[\"a\", \"b\"]\n```"),
            vec!["a", "b"]
        );
        assert_eq!(parse_string_list("- alpha\n- beta"), vec!["alpha", "beta"]);
        assert_eq!(parse_string_list("one, two"), vec!["one", "two"]);
        assert!(parse_string_list("").is_empty());
    }

    #[tokio::test]
    async fn full_analysis_with_scripted_provider() {
        let a = analyzer(Arc::new(ScriptedLlm));
        let text = "Jane Doe. jane@example.com. 7 years of React experience.";
        let result = a.analyze(text, "resume.txt", &AnalysisOptions::default()).await.unwrap();

        assert_eq!(result.summary.as_deref(), Some("A concise summary of the document."));
        // "react" deduplicates case-insensitively against "React"
        assert_eq!(result.keywords, vec!["React", "TypeScript"]);
        assert_eq!(result.skills, vec!["React", "Team leadership"]);
        assert_eq!(result.sentiment, Sentiment::Positive);
        // heuristic years signal outranks the provider's "mid"
        assert_eq!(result.experience_level, ExperienceLevel::Senior);
        let contact = result.contact.unwrap();
        assert_eq!(contact.email.as_deref(), Some("jane@example.com"));
        assert_eq!(contact.other, vec!["github.com/jane"]);
    }

    #[tokio::test]
    async fn disabled_flags_yield_empty_fields() {
        let a = analyzer(Arc::new(ScriptedLlm));
        let opts = AnalysisOptions {
            skills: false,
            summary: false,
            ..Default::default()
        };
        let result = a
            .analyze("Content mentioning React skills.", "doc.txt", &opts)
            .await
            .unwrap();
        assert!(result.skills.is_empty());
        assert!(result.summary.is_none());
        assert!(!result.keywords.is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_analysis_failure() {
        let a = analyzer(Arc::new(ScriptedLlm));
        let err = a
            .analyze("   \n ", "doc.txt", &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::AnalysisFailed(_)));
    }

    #[tokio::test]
    async fn one_dead_extractor_does_not_abort_the_rest() {
        // Dead provider, but the pattern path still finds contact info, so
        // the analysis as a whole survives.
        let a = analyzer(Arc::new(DeadLlm));
        let result = a
            .analyze(
                "Contact jane@example.com. 3 years of plumbing.",
                "doc.txt",
                &AnalysisOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            result.contact.unwrap().email.as_deref(),
            Some("jane@example.com")
        );
        assert!(result.keywords.is_empty());
        assert_eq!(result.sentiment, Sentiment::Unknown);
        assert_eq!(result.experience_level, ExperienceLevel::Mid);
    }

    #[tokio::test]
    async fn all_requested_failing_is_analysis_failure() {
        let a = analyzer(Arc::new(DeadLlm));
        // No contact patterns in the text, so every requested channel fails.
        let err = a
            .analyze("plain prose with nothing to find", "doc.txt", &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::AnalysisFailed(_)));
    }

    #[tokio::test]
    async fn zero_requested_subextractions_is_not_an_error() {
        let a = analyzer(Arc::new(DeadLlm));
        let opts = AnalysisOptions {
            keywords: false,
            summary: false,
            sentiment: false,
            skills: false,
            contact_info: false,
        };
        let result = a.analyze("9 years of service", "doc.txt", &opts).await.unwrap();
        assert!(result.keywords.is_empty());
        assert_eq!(result.experience_level, ExperienceLevel::Senior);
    }
}
