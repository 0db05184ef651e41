use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::defs::TrainingRow;

/// Durable log of feature rows, labeled offline and used to train the ranker.
///
/// Rows are keyed by record id. Appending never overwrites an existing row, so
/// labels written earlier survive later runs that see the same story again.
pub struct TrainingLog {
    pool: SqlitePool,
}

impl TrainingLog {
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options)
            .await
            .with_context(|| format!("Failed to open training log: {}", path.display()))
    }

    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // one connection: an in-memory database lives and dies with its connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let log = Self { pool };
        log.setup_schema().await?;
        Ok(log)
    }

    async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS training_events (
                id TEXT PRIMARY KEY,
                features TEXT NOT NULL,
                label INTEGER,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert rows whose id is not logged yet. Returns how many were new.
    pub async fn append_rows(&self, rows: &[TrainingRow]) -> Result<usize> {
        let recorded_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for row in rows {
            let features = serde_json::to_string(&row.features)?;
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO training_events (id, features, label, recorded_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&row.id)
            .bind(features)
            .bind(row.label.map(i64::from))
            .bind(&recorded_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        debug!("Appended {} of {} training rows", inserted, rows.len());
        Ok(inserted)
    }

    /// Label every logged row: ids in `positive_ids` become positives, all others
    /// negatives. Returns the resulting positive rate.
    pub async fn label_positives(&self, positive_ids: &HashSet<String>) -> Result<f64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE training_events SET label = 0")
            .execute(&mut *tx)
            .await?;

        for id in positive_ids {
            sqlx::query("UPDATE training_events SET label = 1 WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(label), 0) AS positives FROM training_events",
        )
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.get("total");
        let positives: i64 = row.get("positives");

        let rate = if total == 0 {
            0.0
        } else {
            positives as f64 / total as f64
        };
        info!("Labeled {} training rows, positive rate {:.3}", total, rate);
        Ok(rate)
    }

    pub async fn rows(&self) -> Result<Vec<TrainingRow>> {
        let records = sqlx::query("SELECT id, features, label FROM training_events ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let features: String = record.get("features");
            let label: Option<i64> = record.get("label");
            rows.push(TrainingRow {
                id: record.get("id"),
                features: serde_json::from_str(&features)?,
                label: label.map(|value| value != 0),
            });
        }
        Ok(rows)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
