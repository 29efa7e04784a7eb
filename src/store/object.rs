//! Object store interface
//!
//! Raw media blobs live outside the core; the pipeline only needs get/put,
//! delete, and a presigned read URL for the review UI.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), AppError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;

    /// Time-limited read URL for external consumers (review UI, appeals)
    async fn presigned_read_url(&self, key: &str, ttl: Duration) -> Result<String, AppError>;
}

struct StoredObject {
    bytes: Vec<u8>,
    #[allow(dead_code)]
    content_type: String,
}

/// In-memory object store
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        let mut objects = self.objects.write().await;
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let objects = self.objects.read().await;
        objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| AppError::ObjectStore(format!("object '{}' not found", key)))
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut objects = self.objects.write().await;
        objects.remove(key);
        Ok(())
    }

    async fn presigned_read_url(&self, key: &str, ttl: Duration) -> Result<String, AppError> {
        let objects = self.objects.read().await;
        if !objects.contains_key(key) {
            return Err(AppError::ObjectStore(format!("object '{}' not found", key)));
        }
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("memory://{}?expires={}", key, expires))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete_roundtrip() {
        let store = MemoryObjectStore::new();
        store
            .put("media/a.mp4", vec![1, 2, 3], "video/mp4")
            .await
            .unwrap();
        assert_eq!(store.get("media/a.mp4").await.unwrap(), vec![1, 2, 3]);

        store.delete("media/a.mp4").await.unwrap();
        assert!(store.get("media/a.mp4").await.is_err());
    }

    #[tokio::test]
    async fn test_presigned_url_requires_existing_object() {
        let store = MemoryObjectStore::new();
        assert!(store
            .presigned_read_url("missing", Duration::from_secs(60))
            .await
            .is_err());

        store.put("k", vec![0], "video/mp4").await.unwrap();
        let url = store
            .presigned_read_url("k", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("memory://k?expires="));
    }
}
