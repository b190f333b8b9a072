//! # Dossier CLI (`dsr`)
//!
//! The `dsr` binary is the primary interface for Dossier. It provides
//! commands for database initialization, document ingestion, one-shot
//! analysis, embedding maintenance, search, and grounded question
//! answering.
//!
//! ## Usage
//!
//! ```bash
//! dsr --config ./config/dossier.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dsr init` | Create the SQLite database and run schema migrations |
//! | `dsr upload <file>` | Ingest a document (extract, analyze, embed) |
//! | `dsr analyze <file>` | Analyze a file without storing anything |
//! | `dsr reanalyze <id>` | Re-run analysis for a stored document |
//! | `dsr embed document <id>` | Embed one document (no-op if current) |
//! | `dsr embed pending` | Backfill missing or stale embeddings |
//! | `dsr search "<query>"` | Search indexed documents |
//! | `dsr ask "<question>"` | Answer a question grounded in retrieved context |
//! | `dsr get <id>` | Show a document record with a content preview |

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use dossier::analyze::{AnalysisOptions, DocumentAnalyzer};
use dossier::answer::AnswerEngine;
use dossier::config::{load_config, Config};
use dossier::embedding;
use dossier::extract;
use dossier::indexer::EmbeddingIndexer;
use dossier::llm;
use dossier::models::{
    AnalysisResult, DocumentStatus, ExperienceLevel, RetrievalQuery, SearchFilters,
};
use dossier::pipeline::Pipeline;
use dossier::retrieval::RetrievalEngine;
use dossier::store::DocumentStore;

/// Dossier, a document intelligence and retrieval pipeline for HR
/// document collections.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dossier.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dsr",
    about = "Dossier — document intelligence and retrieval for HR document collections",
    version,
    long_about = "Dossier ingests uploaded documents, extracts structured knowledge from them, \
    maintains a versioned vector-embedding index, and answers free-text questions grounded in \
    retrieved context."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dossier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent; running it multiple times is safe.
    Init,

    /// Ingest a document.
    ///
    /// Extracts text from the file, stores the normalized content, and
    /// runs analysis and embedding concurrently. Facet failures are
    /// reported but do not fail the upload.
    Upload {
        /// Path to the file to ingest (PDF, DOCX, or plain text).
        file: PathBuf,

        /// Owner reference the document is stored under.
        #[arg(long)]
        owner: String,

        /// Declared MIME type. Guessed from the file extension if omitted.
        #[arg(long)]
        mime: Option<String>,

        #[command(flatten)]
        flags: AnalysisFlags,
    },

    /// Analyze a file without storing anything.
    ///
    /// Runs extraction and the requested sub-extractions, then prints the
    /// structured result.
    Analyze {
        /// Path to the file to analyze.
        file: PathBuf,

        /// Declared MIME type. Guessed from the file extension if omitted.
        #[arg(long)]
        mime: Option<String>,

        #[command(flatten)]
        flags: AnalysisFlags,
    },

    /// Re-run analysis for a stored document.
    ///
    /// Replaces only the analysis facet; lifecycle status and the
    /// embedding facet are untouched.
    Reanalyze {
        /// Document id.
        id: String,

        #[command(flatten)]
        flags: AnalysisFlags,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Search indexed documents.
    ///
    /// Combines structured filters, lexical overlap, and semantic
    /// similarity. An empty query with filters ranks matches by recency.
    Search {
        /// The search query string. May be omitted when filters are given.
        query: Option<String>,

        /// Restrict to one owner's documents.
        #[arg(long)]
        owner: Option<String>,

        /// Require a skill from the analysis facet (case-insensitive).
        #[arg(long)]
        skill: Option<String>,

        /// Require an experience level: junior, mid, senior, or unknown.
        #[arg(long)]
        level: Option<String>,

        /// Require a lifecycle status: pending, processing, completed, or error.
        #[arg(long)]
        status: Option<String>,

        /// Only documents uploaded on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only documents uploaded on or before this date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Answer a question grounded in retrieved context.
    Ask {
        /// The question.
        query: String,

        /// Restrict retrieval to one owner's documents.
        #[arg(long)]
        owner: Option<String>,
    },

    /// Show a document record with a content preview.
    Get {
        /// Document id.
        id: String,
    },
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed one document. Reports already-current without writing when
    /// the stored vector matches the configured version and content.
    Document {
        /// Document id.
        id: String,
    },

    /// Backfill documents with missing or stale embeddings.
    ///
    /// Processes a bounded batch per invocation; run repeatedly until no
    /// candidates remain. Per-document failures are listed, not fatal.
    Pending {
        /// Restrict the batch to one owner's documents.
        #[arg(long)]
        owner: Option<String>,

        /// Maximum number of documents to embed in this run.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

/// Sub-extraction toggles shared by upload/analyze/reanalyze.
#[derive(clap::Args)]
struct AnalysisFlags {
    /// Skip keyword extraction.
    #[arg(long)]
    no_keywords: bool,
    /// Skip summary generation.
    #[arg(long)]
    no_summary: bool,
    /// Skip sentiment analysis.
    #[arg(long)]
    no_sentiment: bool,
    /// Skip skill extraction.
    #[arg(long)]
    no_skills: bool,
    /// Skip contact-info extraction.
    #[arg(long)]
    no_contact: bool,
}

impl AnalysisFlags {
    fn to_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            keywords: !self.no_keywords,
            summary: !self.no_summary,
            sentiment: !self.no_sentiment,
            skills: !self.no_skills,
            contact_info: !self.no_contact,
        }
    }
}

/// Fully wired component set.
struct App {
    store: DocumentStore,
    pipeline: Pipeline,
    indexer: EmbeddingIndexer,
    retrieval: RetrievalEngine,
    answerer: AnswerEngine,
    preview_chars: usize,
}

/// Construct every component once at the entry point and inject the
/// shared store; no component builds its own clients.
async fn build_app(cfg: &Config) -> anyhow::Result<App> {
    let store = DocumentStore::connect(&cfg.db).await?;
    let embed_provider = embedding::create_provider(&cfg.embedding)?;
    let gen_provider = llm::create_provider(&cfg.analysis)?;

    let analyzer = DocumentAnalyzer::new(
        gen_provider.clone(),
        cfg.analysis.clone(),
        cfg.processing.max_chars,
    );
    let indexer = EmbeddingIndexer::new(
        store.clone(),
        embed_provider.clone(),
        cfg.embedding.clone(),
        cfg.processing.max_chars,
    );
    let pipeline = Pipeline::new(
        store.clone(),
        analyzer,
        EmbeddingIndexer::new(
            store.clone(),
            embed_provider.clone(),
            cfg.embedding.clone(),
            cfg.processing.max_chars,
        ),
        cfg.embedding.is_enabled(),
    );
    let retrieval = RetrievalEngine::new(
        store.clone(),
        embed_provider.clone(),
        cfg.embedding.clone(),
        cfg.retrieval.clone(),
        cfg.processing.preview_chars,
    );
    let answerer = AnswerEngine::new(
        store.clone(),
        RetrievalEngine::new(
            store.clone(),
            embed_provider,
            cfg.embedding.clone(),
            cfg.retrieval.clone(),
            cfg.processing.preview_chars,
        ),
        gen_provider,
        cfg.answer.clone(),
    );

    Ok(App {
        store,
        pipeline,
        indexer,
        retrieval,
        answerer,
        preview_chars: cfg.processing.preview_chars,
    })
}

fn read_upload(file: &PathBuf, mime: &Option<String>) -> anyhow::Result<(Vec<u8>, String, String)> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let mime = match mime {
        Some(m) => m.clone(),
        None => match extract::guess_mime(file) {
            Some(m) => m.to_string(),
            None => bail!(
                "Cannot guess MIME type for {}. Pass --mime explicitly.",
                file.display()
            ),
        },
    };
    Ok((bytes, filename, mime))
}

fn parse_date(s: &str, end_of_day: bool) -> anyhow::Result<i64> {
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time.unwrap().and_utc().timestamp())
}

fn print_analysis(analysis: &AnalysisResult) {
    println!("--- Analysis ---");
    println!(
        "summary:    {}",
        analysis.summary.as_deref().unwrap_or("(none)")
    );
    println!("keywords:   {}", analysis.keywords.join(", "));
    println!("skills:     {}", analysis.skills.join(", "));
    println!("experience: {}", analysis.experience_level.as_str());
    println!("sentiment:  {}", analysis.sentiment.as_str());
    match &analysis.contact {
        Some(contact) => {
            println!("contact:");
            if let Some(ref email) = contact.email {
                println!("  email: {}", email);
            }
            if let Some(ref phone) = contact.phone {
                println!("  phone: {}", phone);
            }
            for other in &contact.other {
                println!("  other: {}", other);
            }
        }
        None => println!("contact:    (none)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dossier=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = DocumentStore::connect(&cfg.db).await?;
            store.migrate().await?;
            store.close().await;
            println!("Database initialized successfully.");
        }

        Commands::Upload {
            file,
            owner,
            mime,
            flags,
        } => {
            let (bytes, filename, mime) = read_upload(&file, &mime)?;
            let app = build_app(&cfg).await?;
            let outcome = app
                .pipeline
                .process_upload(&owner, &filename, &bytes, &mime, &flags.to_options())
                .await?;
            println!("upload {}", filename);
            println!("  id: {}", outcome.id);
            println!("  status: {}", outcome.status.as_str());
            println!("  analysis: {}", if outcome.analysis_ok { "ok" } else { "failed" });
            println!(
                "  embedding: {}",
                if outcome.embedding_ok { "ok" } else { "skipped/failed" }
            );
            app.store.close().await;
        }

        Commands::Analyze { file, mime, flags } => {
            let (bytes, filename, mime) = read_upload(&file, &mime)?;
            let app = build_app(&cfg).await?;
            let analysis = app
                .pipeline
                .analyze_upload(&bytes, &mime, &filename, &flags.to_options())
                .await?;
            print_analysis(&analysis);
            app.store.close().await;
        }

        Commands::Reanalyze { id, flags } => {
            let app = build_app(&cfg).await?;
            let analysis = app.pipeline.reanalyze(&id, &flags.to_options()).await?;
            print_analysis(&analysis);
            app.store.close().await;
        }

        Commands::Embed { action } => {
            let app = build_app(&cfg).await?;
            match action {
                EmbedAction::Document { id } => {
                    let outcome = app.indexer.embed_document(&id).await?;
                    println!("embed document {}", id);
                    println!("  outcome: {:?}", outcome);
                }
                EmbedAction::Pending { owner, limit } => {
                    let report = app.indexer.backfill(owner.as_deref(), limit).await?;
                    println!("embed pending");
                    println!("  updated: {}", report.updated.len());
                    for id in &report.updated {
                        println!("    {}", id);
                    }
                    println!("  errors: {}", report.errors.len());
                    for err in &report.errors {
                        println!("    {}: {}", err.id, err.reason);
                    }
                }
            }
            app.store.close().await;
        }

        Commands::Search {
            query,
            owner,
            skill,
            level,
            status,
            since,
            until,
            limit,
        } => {
            let experience_level = match level.as_deref() {
                None => None,
                Some(s) => match ExperienceLevel::from_label(s) {
                    ExperienceLevel::Unknown if !s.eq_ignore_ascii_case("unknown") => {
                        bail!("Unknown level: {}. Use junior, mid, senior, or unknown.", s)
                    }
                    l => Some(l),
                },
            };
            let status = match status.as_deref() {
                None => None,
                Some(s) => match DocumentStatus::parse(s) {
                    Some(st) => Some(st),
                    None => bail!(
                        "Unknown status: {}. Use pending, processing, completed, or error.",
                        s
                    ),
                },
            };

            let retrieval_query = RetrievalQuery {
                query: query.unwrap_or_default(),
                filters: SearchFilters {
                    owner,
                    skill,
                    experience_level,
                    status,
                    uploaded_after: since.as_deref().map(|s| parse_date(s, false)).transpose()?,
                    uploaded_before: until.as_deref().map(|s| parse_date(s, true)).transpose()?,
                },
                limit,
            };

            let app = build_app(&cfg).await?;
            let hits = app.retrieval.search(&retrieval_query).await?;

            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                let date = chrono::DateTime::from_timestamp(hit.updated_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!("{}. [{:.2}] {} ({})", i + 1, hit.score, hit.filename, hit.owner);
                println!("    updated: {}", date);
                match hit.signals.semantic {
                    Some(sem) => println!(
                        "    signals: lexical {:.2}, semantic {:.2}",
                        hit.signals.lexical, sem
                    ),
                    None => println!("    signals: lexical {:.2} (no vector)", hit.signals.lexical),
                }
                println!("    preview: \"{}\"", hit.preview.replace('\n', " "));
                println!("    id: {}", hit.id);
                println!();
            }
            app.store.close().await;
        }

        Commands::Ask { query, owner } => {
            let app = build_app(&cfg).await?;
            let answer = app.answerer.answer(&query, owner.as_deref()).await?;
            println!("{}", answer.text);
            println!();
            if answer.grounded {
                println!("supporting documents:");
                for id in &answer.supporting {
                    println!("  {}", id);
                }
            } else {
                println!("(no supporting context was found)");
            }
            app.store.close().await;
        }

        Commands::Get { id } => {
            let app = build_app(&cfg).await?;
            let doc = app.store.require(&id).await?;
            println!("--- Document ---");
            println!("id:           {}", doc.id);
            println!("filename:     {}", doc.filename);
            println!("owner:        {}", doc.owner);
            println!("content_type: {}", doc.content_type);
            println!("status:       {}", doc.status.as_str());
            if let Some(ref reason) = doc.status_reason {
                println!("reason:       {}", reason);
            }
            println!("uploaded_at:  {}", format_ts_iso(doc.uploaded_at));
            println!("updated_at:   {}", format_ts_iso(doc.updated_at));
            match &doc.embedding {
                Some(rec) => println!(
                    "embedding:    {} v{} ({} dims, computed {})",
                    rec.model,
                    rec.version,
                    rec.vector.len(),
                    format_ts_iso(rec.computed_at)
                ),
                None => println!("embedding:    (none)"),
            }
            println!();
            if let Some(ref analysis) = doc.analysis {
                print_analysis(analysis);
                println!();
            }
            println!("--- Preview ---");
            println!("{}", extract::clip_chars(&doc.content, app.preview_chars));
            app.store.close().await;
        }
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
