//! Record store interface
//!
//! One mutable record per item, updated with attribute-level SET semantics.
//! The in-memory implementation mirrors how the pipeline uses a key-value
//! store in production: partial updates, point reads, filtered scans.

use crate::error::AppError;
use crate::models::{ItemPatch, ItemRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Key-value record store consumed by every stage
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point read; `None` when the id is unknown
    async fn get_item(&self, id: Uuid) -> Result<Option<ItemRecord>, AppError>;

    /// Create or replace a whole record (ingestion-time only)
    async fn put_item(&self, record: ItemRecord) -> Result<(), AppError>;

    /// Partial, attribute-level update. Errors with `NotFound` on unknown id.
    async fn update_item(&self, id: Uuid, patch: ItemPatch) -> Result<ItemRecord, AppError>;

    /// Full scan with a caller-side filter predicate
    async fn scan(
        &self,
        predicate: &(dyn for<'a> Fn(&'a ItemRecord) -> bool + Send + Sync),
    ) -> Result<Vec<ItemRecord>, AppError>;
}

/// In-memory record store
pub struct MemoryRecordStore {
    items: RwLock<HashMap<Uuid, ItemRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_item(&self, id: Uuid) -> Result<Option<ItemRecord>, AppError> {
        let items = self.items.read().await;
        Ok(items.get(&id).cloned())
    }

    async fn put_item(&self, record: ItemRecord) -> Result<(), AppError> {
        let mut items = self.items.write().await;
        items.insert(record.id, record);
        Ok(())
    }

    async fn update_item(&self, id: Uuid, patch: ItemPatch) -> Result<ItemRecord, AppError> {
        let mut items = self.items.write().await;
        let record = items
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))?;
        patch.apply(record);
        Ok(record.clone())
    }

    async fn scan(
        &self,
        predicate: &(dyn for<'a> Fn(&'a ItemRecord) -> bool + Send + Sync),
    ) -> Result<Vec<ItemRecord>, AppError> {
        let items = self.items.read().await;
        Ok(items.values().filter(|r| predicate(r)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, ItemStatus};

    #[tokio::test]
    async fn test_update_is_partial() {
        let store = MemoryRecordStore::new();
        let id = Uuid::new_v4();
        let mut record = ItemRecord::new(id, "media/x.mp4");
        record.nsfw_score = 0.5;
        store.put_item(record).await.unwrap();

        let updated = store
            .update_item(id, ItemPatch::new().status(ItemStatus::Screened).risk_score(0.2))
            .await
            .unwrap();

        assert_eq!(updated.status, ItemStatus::Screened);
        assert_eq!(updated.risk_score, 0.2);
        assert_eq!(updated.nsfw_score, 0.5);
        assert_eq!(updated.decision, Decision::Pending);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let store = MemoryRecordStore::new();
        let err = store
            .update_item(Uuid::new_v4(), ItemPatch::new().risk_score(0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scan_filters() {
        let store = MemoryRecordStore::new();
        for status in [ItemStatus::Uploaded, ItemStatus::Review, ItemStatus::Review] {
            let mut record = ItemRecord::new(Uuid::new_v4(), "media/y.mp4");
            record.status = status;
            store.put_item(record).await.unwrap();
        }

        let pending_review = store
            .scan(&|r| r.status == ItemStatus::Review)
            .await
            .unwrap();
        assert_eq!(pending_review.len(), 2);
    }
}
