//! # Dossier
//!
//! A document intelligence and retrieval pipeline for HR document
//! collections.
//!
//! Dossier ingests uploaded documents (PDF, Word, plain text), extracts
//! structured knowledge from them (summary, keywords, skills, experience
//! level, sentiment, contact info), maintains a versioned vector-embedding
//! index over their content, and answers free-text questions grounded in
//! retrieved context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────┐   ┌──────────┐
//! │  Upload  │──▶│  Extract → Analyze+Embed  │──▶│  SQLite  │
//! │  bytes   │   │   (independent facets)    │   │  store   │
//! └──────────┘   └───────────────────────────┘   └────┬─────┘
//!                                                     │
//!                                ┌────────────────────┤
//!                                ▼                    ▼
//!                          ┌───────────┐       ┌───────────┐
//!                          │  search   │       │  answer   │
//!                          │ (hybrid)  │──────▶│ (grounded)│
//!                          └───────────┘       └───────────┘
//! ```
//!
//! ## Quick start
//!
//! ```bash
//! dsr init                          # create database
//! dsr upload resume.pdf --owner hr  # ingest a document
//! dsr embed pending                 # backfill missing/stale embeddings
//! dsr search "React engineer" --skill react
//! dsr ask "Who has React experience?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed pipeline errors |
//! | [`models`] | Core data types |
//! | [`extract`] | Multi-format text extraction |
//! | [`analyze`] | Structured document analysis |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Generation provider abstraction |
//! | [`indexer`] | Embedding index maintenance and backfill |
//! | [`retrieval`] | Filtered, hybrid-scored search |
//! | [`answer`] | Context assembly and grounded answering |
//! | [`pipeline`] | Upload orchestration and lifecycle |
//! | [`store`] | Storage collaborator |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyze;
pub mod answer;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod retrieval;
pub mod store;
