//! In-memory blob store.
//!
//! Containers and blobs live in a `tokio::sync::RwLock<HashMap<...>>`.
//! Used for local runs without an Azure account and by the router tests.
//! Behaves like Azure for the cases handlers care about: uploads into a
//! missing container fail, and creating an existing container reports
//! [`StoreError::ContainerAlreadyExists`].

use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{resolve_container, BlobStore, StoreError, StoreFuture};

/// In-memory storage backend.
pub struct MemoryBlobStore {
    /// container -> (blob -> data)
    containers: RwLock<HashMap<String, HashMap<String, Bytes>>>,
    default_container: Option<String>,
}

impl MemoryBlobStore {
    /// Create a store whose default container (if any) already exists.
    pub fn new(default_container: Option<String>) -> Self {
        let mut containers = HashMap::new();
        if let Some(name) = &default_container {
            containers.insert(name.clone(), HashMap::new());
        }
        Self {
            containers: RwLock::new(containers),
            default_container,
        }
    }
}

impl BlobStore for MemoryBlobStore {
    fn default_container(&self) -> Option<&str> {
        self.default_container.as_deref()
    }

    fn put_blob<'a>(
        &'a self,
        container: Option<&'a str>,
        blob: &'a str,
        data: Bytes,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let container = resolve_container(container, self.default_container())?;
            debug!("Memory put: container={} blob={}", container, blob);

            let mut containers = self.containers.write().await;
            let blobs = containers
                .get_mut(container)
                .ok_or_else(|| StoreError::ContainerNotFound {
                    container: container.to_string(),
                })?;
            blobs.insert(blob.to_string(), data);
            Ok(())
        })
    }

    fn get_blob<'a>(&'a self, container: Option<&'a str>, blob: &'a str) -> StoreFuture<'a, Bytes> {
        Box::pin(async move {
            let container = resolve_container(container, self.default_container())?;
            debug!("Memory get: container={} blob={}", container, blob);

            let containers = self.containers.read().await;
            let blobs = containers
                .get(container)
                .ok_or_else(|| StoreError::ContainerNotFound {
                    container: container.to_string(),
                })?;
            blobs
                .get(blob)
                .cloned()
                .ok_or_else(|| StoreError::BlobNotFound {
                    container: container.to_string(),
                    blob: blob.to_string(),
                })
        })
    }

    fn create_container<'a>(&'a self, container: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            debug!("Memory create_container: {}", container);

            let mut containers = self.containers.write().await;
            if containers.contains_key(container) {
                return Err(StoreError::ContainerAlreadyExists {
                    container: container.to_string(),
                });
            }
            containers.insert(container.to_string(), HashMap::new());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> MemoryBlobStore {
        MemoryBlobStore::new(Some("bucket1".to_string()))
    }

    #[tokio::test]
    async fn test_put_and_get_default_container() {
        let store = test_store();
        store
            .put_blob(None, "key.txt", Bytes::from("hello world"))
            .await
            .unwrap();

        let data = store.get_blob(None, "key.txt").await.unwrap();
        assert_eq!(data, Bytes::from("hello world"));

        let explicit = store.get_blob(Some("bucket1"), "key.txt").await.unwrap();
        assert_eq!(explicit, data);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = test_store();
        store.put_blob(None, "k", Bytes::from("one")).await.unwrap();
        store.put_blob(None, "k", Bytes::from("two")).await.unwrap();
        assert_eq!(store.get_blob(None, "k").await.unwrap(), Bytes::from("two"));
    }

    #[tokio::test]
    async fn test_get_missing_blob() {
        let store = test_store();
        let err = store.get_blob(None, "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::BlobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_put_into_missing_container() {
        let store = test_store();
        let err = store
            .put_blob(Some("other"), "k", Bytes::from("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ContainerNotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_container_twice() {
        let store = test_store();
        store.create_container("newcon").await.unwrap();
        let err = store.create_container("newcon").await.unwrap_err();
        assert!(matches!(err, StoreError::ContainerAlreadyExists { .. }));

        store
            .put_blob(Some("newcon"), "blob", Bytes::from("data"))
            .await
            .unwrap();
        assert_eq!(
            store.get_blob(Some("newcon"), "blob").await.unwrap(),
            Bytes::from("data")
        );
    }

    #[tokio::test]
    async fn test_no_default_container() {
        let store = MemoryBlobStore::new(None);
        let err = store.get_blob(None, "k").await.unwrap_err();
        assert!(matches!(err, StoreError::NoDefaultContainer));
    }
}
