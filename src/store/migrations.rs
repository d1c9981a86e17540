//! Schema migrations for the libSQL job store.
//!
//! Versions are tracked in a `schema_version` table; on open, every
//! version above the recorded one is applied in order.

use libsql::Connection;
use tracing::info;

use crate::error::StoreError;

const SCHEMA: &[(i64, &str, &str)] = &[(
    1,
    "jobs",
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        job_id TEXT PRIMARY KEY,
        snapshot TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_jobs_expires_at ON jobs(expires_at);
    "#,
)];

/// Bring the database up to the latest schema version.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(migration_err)?;

    let applied = current_version(conn).await?;

    for (version, name, sql) in SCHEMA.iter().filter(|(v, _, _)| *v > applied) {
        info!(version, name, "Applying schema migration");
        conn.execute_batch(sql).await.map_err(migration_err)?;
        conn.execute(
            "INSERT INTO schema_version (version, name) VALUES (?1, ?2)",
            libsql::params![*version, *name],
        )
        .await
        .map_err(migration_err)?;
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await
        .map_err(migration_err)?;

    match rows.next().await.map_err(migration_err)? {
        Some(row) => row.get(0).map_err(migration_err),
        None => Ok(0),
    }
}

fn migration_err(e: libsql::Error) -> StoreError {
    StoreError::Migration(e.to_string())
}
