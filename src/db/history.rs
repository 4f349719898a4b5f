use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::db::models::HistoryRecord;

/// Archive of synthesis results, newest first, deduplicated by snapshot key.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Stores `record`, replacing any record with the same snapshot key and
    /// evicting the oldest entries past the store's limit.
    async fn save(&self, record: HistoryRecord) -> Result<()>;

    async fn list(&self) -> Result<Vec<HistoryRecord>>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;
}

#[derive(Debug)]
pub struct MemoryHistory {
    records: Mutex<VecDeque<HistoryRecord>>,
    limit: usize,
}

impl MemoryHistory {
    pub fn new(limit: usize) -> Self {
        MemoryHistory {
            records: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn save(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.records.lock();
        records.retain(|existing| {
            existing.snapshot_key != record.snapshot_key && existing.id != record.id
        });
        records.push_front(record);
        while records.len() > self.limit {
            if let Some(evicted) = records.pop_back() {
                debug!("Evicted history record {}", evicted.id);
            }
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>> {
        Ok(self.records.lock().iter().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|record| record.id != id);
        Ok(records.len() != before)
    }

    async fn clear(&self) -> Result<()> {
        self.records.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::synth::PromptBundle;

    fn text_record(text: &str) -> HistoryRecord {
        HistoryRecord::new(Vec::new(), Some(text.to_string()), PromptBundle::default())
    }

    #[tokio::test]
    async fn newest_first_and_capped() {
        let history = MemoryHistory::new(2);
        history.save(text_record("a")).await.unwrap();
        history.save(text_record("b")).await.unwrap();
        history.save(text_record("c")).await.unwrap();

        let keys: Vec<String> = history
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.snapshot_key)
            .collect();
        assert_eq!(keys, vec!["text:c", "text:b"]);
    }

    #[tokio::test]
    async fn same_snapshot_replaces_and_moves_to_front() {
        let history = MemoryHistory::new(10);
        let first = text_record("a");
        history.save(first.clone()).await.unwrap();
        history.save(text_record("b")).await.unwrap();
        let again = text_record("a");
        history.save(again.clone()).await.unwrap();

        let listed = history.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, again.id);
        assert!(listed.iter().all(|record| record.id != first.id));
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let history = MemoryHistory::new(10);
        let record = text_record("a");
        history.save(record.clone()).await.unwrap();
        history.save(text_record("b")).await.unwrap();

        assert!(history.delete(&record.id).await.unwrap());
        assert!(!history.delete(&record.id).await.unwrap());
        assert_eq!(history.list().await.unwrap().len(), 1);

        history.clear().await.unwrap();
        assert!(history.list().await.unwrap().is_empty());
    }
}
