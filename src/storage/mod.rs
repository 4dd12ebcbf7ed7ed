//! Blob storage backends.
//!
//! The [`backend::BlobStore`] trait abstracts over where blobs live.
//! Implementations are the Azure Blob Storage gateway and an in-memory
//! store for local runs and tests.

pub mod azure;
pub mod backend;
pub mod memory;

use std::sync::Arc;

use tracing::info;

use crate::bucket_info::load_bucket_info;
use crate::config::Config;
use crate::credential::AzureCredential;
use backend::BlobStore;

/// Build the store selected by `storage.backend`.
///
/// For `azure` this reads the bucket info secret, parses the access token
/// and constructs the client.  Any failure is returned to the caller; a
/// malformed secret never yields an empty credential.
pub async fn connect(config: &Config) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.storage.backend.as_str() {
        "azure" => {
            let info = load_bucket_info(&config.secret.path).await?;
            let token = info.azure_access_token().ok_or_else(|| {
                anyhow::anyhow!("bucket info at {} has no Azure access token", config.secret.path)
            })?;
            let credential = AzureCredential::parse(token)?;
            let store =
                azure::AzureBlobStore::new(&credential, config.storage.default_container.clone())?;
            Ok(Arc::new(store))
        }
        "memory" => {
            let default_container = config
                .storage
                .default_container
                .clone()
                .unwrap_or_else(|| "default".to_string());
            info!(
                "Memory storage backend initialized: default_container={}",
                default_container
            );
            Ok(Arc::new(memory::MemoryBlobStore::new(Some(default_container))))
        }
        other => Err(anyhow::anyhow!(
            "unknown storage.backend '{}' (expected 'azure' or 'memory')",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_connect_memory() {
        let mut config = Config::default();
        config.storage.backend = "memory".to_string();
        let store = connect(&config).await.unwrap();
        assert_eq!(store.default_container(), Some("default"));
    }

    #[tokio::test]
    async fn test_connect_azure_from_secret_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"spec":{{"bucketName":"bucket1","secretAzure":{{"accessToken":"https://acct.blob.core.windows.net/bucket1?sv=1&sig=abc"}}}}}}"#
        )
        .unwrap();

        let mut config = Config::default();
        config.secret.path = file.path().display().to_string();
        let store = connect(&config).await.unwrap();
        assert_eq!(store.default_container(), Some("bucket1"));
    }

    #[tokio::test]
    async fn test_connect_azure_malformed_secret_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ this is not json").unwrap();

        let mut config = Config::default();
        config.secret.path = file.path().display().to_string();
        assert!(connect(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_unknown_backend() {
        let mut config = Config::default();
        config.storage.backend = "gcs".to_string();
        assert!(connect(&config).await.is_err());
    }
}
