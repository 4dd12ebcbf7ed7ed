//! cosi-blob-app library -- COSI bucket test server for Azure Blob Storage.
//!
//! Reads the `BucketInfo` secret mounted by a COSI provisioner, builds a
//! blob client from its access token, and serves a handful of HTTP routes
//! that upload and download blobs or create containers.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

pub mod bucket_info;
pub mod config;
pub mod credential;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::storage::backend::BlobStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Current blob store; replaced wholesale by [`AppState::refresh`].
    store: RwLock<Arc<dyn BlobStore>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn BlobStore>) -> Self {
        Self {
            config,
            store: RwLock::new(store),
        }
    }

    /// Snapshot of the current store.
    pub async fn store(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&*self.store.read().await)
    }

    /// Re-read the bucket info secret and swap in a freshly built store.
    ///
    /// The in-memory backend has no secret and is left untouched.  On
    /// failure the current store stays in place.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        if self.config.storage.backend == "memory" {
            info!("Refresh requested; memory backend has no credentials to reload");
            return Ok(());
        }

        let store = storage::connect(&self.config).await?;
        *self.store.write().await = store;
        info!("Credentials refreshed from {}", self.config.secret.path);
        Ok(())
    }
}
