//! SQLite session snapshots
//!
//! Best-effort record of where the show was, written after every completed
//! block. Nothing reads it back during normal operation; `latest_snapshot`
//! exists for operators and tooling.

use super::{SessionSnapshot, SnapshotSink};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::path::Path;
use tracing::info;

pub struct SqliteSnapshotSink {
    pool: SqlitePool,
}

impl SqliteSnapshotSink {
    /// Open (creating if needed) the snapshot database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        info!("Opened snapshot database: {}", db_path.display());
        Self::with_pool(pool).await
    }

    /// Use an existing pool (e.g. `sqlite::memory:`)
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        create_snapshots_table(&pool).await?;
        Ok(Self { pool })
    }

    /// Most recently saved snapshot
    pub async fn latest_snapshot(&self) -> Result<Option<SessionSnapshot>> {
        let row = sqlx::query(
            "SELECT timeline_id, cursor, position_ms, saved_at FROM session_snapshots ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SessionSnapshot {
            timeline_id: row.get("timeline_id"),
            cursor: row.get::<i64, _>("cursor") as usize,
            position_ms: row.get::<i64, _>("position_ms") as u64,
            saved_at: row.get("saved_at"),
        }))
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn create_snapshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timeline_id TEXT NOT NULL,
            cursor INTEGER NOT NULL,
            position_ms INTEGER NOT NULL,
            saved_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl SnapshotSink for SqliteSnapshotSink {
    async fn save_snapshot(&self, snapshot: SessionSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_snapshots (timeline_id, cursor, position_ms, saved_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&snapshot.timeline_id)
        .bind(snapshot.cursor as i64)
        .bind(snapshot.position_ms as i64)
        .bind(snapshot.saved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
