//! Abstract blob store trait.
//!
//! Every storage backend must implement [`BlobStore`].  Handlers only see
//! this trait, so the Azure gateway and the in-memory store are
//! interchangeable behind `AppState`.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Classified storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The container already exists.
    #[error("container already exists: {container}")]
    ContainerAlreadyExists { container: String },

    /// The container does not exist.
    #[error("container not found: {container}")]
    ContainerNotFound { container: String },

    /// The blob does not exist.
    #[error("blob not found: {container}/{blob}")]
    BlobNotFound { container: String, blob: String },

    /// The credential does not grant the requested operation.
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// A single-name request was made but no default container is known.
    #[error("no default container configured")]
    NoDefaultContainer,

    /// Any other backend failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::ContainerAlreadyExists { .. } => "container_exists",
            StoreError::ContainerNotFound { .. } => "container_not_found",
            StoreError::BlobNotFound { .. } => "blob_not_found",
            StoreError::AccessDenied { .. } => "access_denied",
            StoreError::NoDefaultContainer => "no_default_container",
            StoreError::Backend(_) => "backend",
        }
    }
}

/// Boxed future returned by [`BlobStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Async blob storage contract.
///
/// `container: None` addresses the store's default container (the one named
/// by a container-scoped credential, or the configured fallback).
pub trait BlobStore: Send + Sync + 'static {
    /// Name of the default container, if any.
    fn default_container(&self) -> Option<&str>;

    /// Upload `data` as a block blob, overwriting any existing blob.
    fn put_blob<'a>(&'a self, container: Option<&'a str>, blob: &'a str, data: Bytes)
        -> StoreFuture<'a, ()>;

    /// Read the full contents of a blob.
    fn get_blob<'a>(&'a self, container: Option<&'a str>, blob: &'a str) -> StoreFuture<'a, Bytes>;

    /// Create a container.
    fn create_container<'a>(&'a self, container: &'a str) -> StoreFuture<'a, ()>;
}

/// Resolve the container for a request against a store's default.
pub fn resolve_container<'a>(
    requested: Option<&'a str>,
    default: Option<&'a str>,
) -> Result<&'a str, StoreError> {
    requested.or(default).ok_or(StoreError::NoDefaultContainer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_container_prefers_requested() {
        assert_eq!(resolve_container(Some("a"), Some("b")).unwrap(), "a");
        assert_eq!(resolve_container(None, Some("b")).unwrap(), "b");
    }

    #[test]
    fn test_resolve_container_without_default() {
        assert!(matches!(
            resolve_container(None, None),
            Err(StoreError::NoDefaultContainer)
        ));
    }
}
