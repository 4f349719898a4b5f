use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::history::HistoryStore;
use crate::db::models::{HistoryRecord, HistoryRow};

/// SQLite-backed [`HistoryStore`]; each record is kept as a JSON payload.
#[derive(Clone)]
pub struct SqliteHistory {
    pool: SqlitePool,
    limit: i64,
}

impl SqliteHistory {
    pub async fn init(database_url: &str, limit: usize) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every in-memory connection is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS history (\
                seq INTEGER PRIMARY KEY AUTOINCREMENT,\
                id TEXT NOT NULL UNIQUE,\
                snapshot_key TEXT NOT NULL UNIQUE,\
                created_at TEXT NOT NULL,\
                payload_json TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_created_at ON history(created_at);")
            .execute(&pool)
            .await?;

        info!("History table ready");

        Ok(SqliteHistory {
            pool,
            limit: i64::try_from(limit.max(1)).unwrap_or(i64::MAX),
        })
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn save(&self, record: HistoryRecord) -> Result<()> {
        let payload_json = serde_json::to_string(&record)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM history WHERE snapshot_key = ? OR id = ?")
            .bind(&record.snapshot_key)
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO history (id, snapshot_key, created_at, payload_json) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.snapshot_key)
        .bind(record.created_at)
        .bind(payload_json)
        .execute(&mut *tx)
        .await?;

        let evicted = sqlx::query(
            "DELETE FROM history WHERE seq NOT IN \
             (SELECT seq FROM history ORDER BY seq DESC LIMIT ?)",
        )
        .bind(self.limit)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        if evicted > 0 {
            info!("Evicted {} history record(s) past the limit", evicted);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, snapshot_key, created_at, payload_json FROM history ORDER BY seq DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_record() {
                Ok(record) => records.push(record),
                Err(err) => warn!("Skipping history row: {err}"),
            }
        }
        Ok(records)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM history WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM history").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_fixtures::sample_catalog;
    use crate::prompt::synth::PromptBundle;

    async fn memory_store(limit: usize) -> SqliteHistory {
        SqliteHistory::init("sqlite::memory:", limit).await.unwrap()
    }

    fn tag_record(ids: &[&str]) -> HistoryRecord {
        let catalog = sample_catalog();
        let tags = ids
            .iter()
            .map(|id| catalog.tag(id).unwrap().clone())
            .collect();
        let prompts = PromptBundle {
            image_prompt: ids.join(", "),
            ..PromptBundle::default()
        };
        HistoryRecord::new(tags, None, prompts)
    }

    #[tokio::test]
    async fn round_trips_records_newest_first() {
        let store = memory_store(10).await;
        store.health_check().await.unwrap();
        let first = tag_record(&["g-girl", "dress"]);
        let second = tag_record(&["g-boy"]).with_thumbnail(Some(vec![1, 2, 3]));
        store.save(first.clone()).await.unwrap();
        store.save(second.clone()).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed, vec![second, first]);
    }

    #[tokio::test]
    async fn dedups_by_snapshot_and_caps() {
        let store = memory_store(2).await;
        store.save(tag_record(&["g-girl"])).await.unwrap();
        store.save(tag_record(&["g-boy"])).await.unwrap();
        let repeat = tag_record(&["g-girl"]);
        store.save(repeat.clone()).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, repeat.id);

        store.save(tag_record(&["dress"])).await.unwrap();
        let keys: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.snapshot_key)
            .collect();
        assert_eq!(keys, vec!["dress", "g-girl"]);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let store = memory_store(10).await;
        let record = tag_record(&["g-girl"]);
        store.save(record.clone()).await.unwrap();
        store.save(tag_record(&["g-boy"])).await.unwrap();

        assert!(store.delete(&record.id).await.unwrap());
        assert!(!store.delete(&record.id).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
