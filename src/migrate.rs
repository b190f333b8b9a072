use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Documents table. The analysis facet is one JSON column; the
    // embedding facet is the five embedding_* columns, written together.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            filename TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text/plain',
            content TEXT NOT NULL DEFAULT '',
            content_hash TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            status_reason TEXT,
            uploaded_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            analysis_json TEXT,
            analyzed_at INTEGER,
            embedding BLOB,
            embedding_model TEXT,
            embedding_version TEXT,
            embedding_hash TEXT,
            embedding_updated_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Search query log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_log (
            id TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            filter_json TEXT NOT NULL DEFAULT '{}',
            result_count INTEGER NOT NULL,
            searched_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for owner scoping, recency ordering, and backfill scans
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_embedding_version ON documents(embedding_version)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
