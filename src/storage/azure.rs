//! Azure Blob Storage backend.
//!
//! Wraps an account-scoped `BlobServiceClient` from the Azure SDK.  The
//! default container comes from a container-scoped SAS URL, falling back to
//! `storage.default_container`.
//!
//! Credentials come from the COSI `BucketInfo` access token (see
//! [`crate::credential`]):
//!   - SAS URL / `SharedAccessSignature` -> SAS token auth
//!   - `AccountKey` connection string   -> Shared Key auth
//!
//! SDK failures are classified by the `x-ms-error-code` the SDK surfaces on
//! `HttpError`, never by matching on error message text.

use azure_core::auth::Secret;
use azure_core::error::ErrorKind;
use azure_core::StatusCode;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::prelude::*;
use bytes::Bytes;
use tracing::{debug, info};

use super::backend::{resolve_container, BlobStore, StoreError, StoreFuture};
use crate::credential::{AzureAuth, AzureCredential};

/// Gateway backend that forwards operations to Azure Blob Storage.
pub struct AzureBlobStore {
    /// Account-scoped service client.
    service: BlobServiceClient,
    /// Azure storage account name.
    account: String,
    /// Container addressed by single-name routes.
    default_container: Option<String>,
}

impl AzureBlobStore {
    /// Build the client from a parsed credential.
    ///
    /// No request is made; an unusable credential surfaces on the first call.
    pub fn new(
        credential: &AzureCredential,
        fallback_container: Option<String>,
    ) -> anyhow::Result<Self> {
        let credentials = match &credential.auth {
            AzureAuth::SharedKey { key } => StorageCredentials::access_key(
                credential.account.clone(),
                Secret::new(key.clone()),
            ),
            AzureAuth::SasToken { token } => StorageCredentials::sas_token(token.as_str())
                .map_err(|e| anyhow::anyhow!("Invalid SAS token: {}", e))?,
        };

        let builder = match &credential.endpoint {
            Some(uri) => ClientBuilder::with_location(
                CloudLocation::Custom {
                    account: credential.account.clone(),
                    uri: uri.clone(),
                },
                credentials,
            ),
            None => ClientBuilder::new(credential.account.clone(), credentials),
        };

        let default_container = credential.container.clone().or(fallback_container);

        info!(
            "Azure blob client initialized: account={} endpoint={} default_container={:?}",
            credential.account,
            credential.endpoint.as_deref().unwrap_or("public"),
            default_container
        );

        Ok(Self {
            service: builder.blob_service_client(),
            account: credential.account.clone(),
            default_container,
        })
    }
}

/// Map a well-known Azure error code to a [`StoreError`].
///
/// Returns `None` for codes that carry no meaning for handlers.
fn classify_error_code(code: &str, container: &str, blob: Option<&str>) -> Option<StoreError> {
    match code {
        "ContainerAlreadyExists" => Some(StoreError::ContainerAlreadyExists {
            container: container.to_string(),
        }),
        "ContainerNotFound" => Some(StoreError::ContainerNotFound {
            container: container.to_string(),
        }),
        "BlobNotFound" => Some(StoreError::BlobNotFound {
            container: container.to_string(),
            blob: blob.unwrap_or_default().to_string(),
        }),
        "AuthenticationFailed"
        | "AuthorizationFailure"
        | "AuthorizationPermissionMismatch"
        | "AuthorizationResourceTypeMismatch"
        | "InsufficientAccountPermissions" => Some(StoreError::AccessDenied {
            message: code.to_string(),
        }),
        _ => None,
    }
}

/// Status and `x-ms-error-code` of a failed HTTP call, if `err` is one.
fn http_failure(err: &azure_core::Error) -> Option<(StatusCode, Option<String>)> {
    if let Some(http) = err.as_http_error() {
        return Some((http.status(), http.error_code().map(str::to_owned)));
    }
    match err.kind() {
        ErrorKind::HttpResponse { status, error_code } => Some((*status, error_code.clone())),
        _ => None,
    }
}

/// Classify an SDK error for the given container / blob.
fn classify(
    err: azure_core::Error,
    context: &str,
    container: &str,
    blob: Option<&str>,
) -> StoreError {
    let classified = http_failure(&err).and_then(|(status, code)| {
        code.as_deref()
            .and_then(|code| classify_error_code(code, container, blob))
            .or_else(|| match status {
                StatusCode::NotFound => Some(match blob {
                    Some(b) => StoreError::BlobNotFound {
                        container: container.to_string(),
                        blob: b.to_string(),
                    },
                    None => StoreError::ContainerNotFound {
                        container: container.to_string(),
                    },
                }),
                StatusCode::Forbidden => Some(StoreError::AccessDenied {
                    message: "Forbidden".to_string(),
                }),
                _ => None,
            })
    });

    classified.unwrap_or_else(|| {
        StoreError::Backend(anyhow::Error::new(err).context(format!("Azure {} failed", context)))
    })
}

impl BlobStore for AzureBlobStore {
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
            debug!(
                "Azure put: account={} container={} blob={} bytes={}",
                self.account,
                container,
                blob,
                data.len()
            );

            self.service
                .container_client(container)
                .blob_client(blob)
                .put_block_blob(data)
                .content_type("application/octet-stream")
                .await
                .map_err(|e| classify(e, "upload", container, Some(blob)))?;
            Ok(())
        })
    }

    fn get_blob<'a>(&'a self, container: Option<&'a str>, blob: &'a str) -> StoreFuture<'a, Bytes> {
        Box::pin(async move {
            let container = resolve_container(container, self.default_container())?;
            debug!(
                "Azure get: account={} container={} blob={}",
                self.account, container, blob
            );

            let data = self
                .service
                .container_client(container)
                .blob_client(blob)
                .get_content()
                .await
                .map_err(|e| classify(e, "download", container, Some(blob)))?;
            Ok(Bytes::from(data))
        })
    }

    fn create_container<'a>(&'a self, container: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            debug!(
                "Azure create_container: account={} container={}",
                self.account, container
            );

            self.service
                .container_client(container)
                .create()
                .await
                .map_err(|e| classify(e, "create container", container, None))
        })
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sas_credential(url: &str) -> AzureCredential {
        AzureCredential::parse(url).unwrap()
    }

    #[test]
    fn test_container_scoped_sas_sets_default_container() {
        let cred = sas_credential("https://acct.blob.core.windows.net/bucket1?sv=1&sig=abc");
        let store = AzureBlobStore::new(&cred, Some("fallback".to_string())).unwrap();
        assert_eq!(store.account, "acct");
        assert_eq!(store.default_container(), Some("bucket1"));
    }

    #[test]
    fn test_account_scoped_sas_uses_fallback_container() {
        let cred = sas_credential("https://acct.blob.core.windows.net/?sv=1&sig=abc");
        let store = AzureBlobStore::new(&cred, Some("fallback".to_string())).unwrap();
        assert_eq!(store.default_container(), Some("fallback"));

        let store = AzureBlobStore::new(&cred, None).unwrap();
        assert_eq!(store.default_container(), None);
    }

    #[test]
    fn test_shared_key_emulator_client() {
        let cred = AzureCredential::parse("UseDevelopmentStorage=true").unwrap();
        let store = AzureBlobStore::new(&cred, None).unwrap();
        assert_eq!(store.account, "devstoreaccount1");
    }

    #[test]
    fn test_classify_container_already_exists() {
        let err = classify_error_code("ContainerAlreadyExists", "c1", None).unwrap();
        assert!(matches!(
            err,
            StoreError::ContainerAlreadyExists { ref container } if container == "c1"
        ));
    }

    #[test]
    fn test_classify_not_found_codes() {
        assert!(matches!(
            classify_error_code("BlobNotFound", "c1", Some("b")),
            Some(StoreError::BlobNotFound { .. })
        ));
        assert!(matches!(
            classify_error_code("ContainerNotFound", "c1", Some("b")),
            Some(StoreError::ContainerNotFound { .. })
        ));
    }

    #[test]
    fn test_classify_auth_codes() {
        assert!(matches!(
            classify_error_code("AuthenticationFailed", "c1", None),
            Some(StoreError::AccessDenied { .. })
        ));
        assert!(matches!(
            classify_error_code("AuthorizationPermissionMismatch", "c1", None),
            Some(StoreError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_classify_unknown_code() {
        assert!(classify_error_code("ServerBusy", "c1", None).is_none());
    }

    #[tokio::test]
    async fn test_single_name_request_without_container() {
        let cred = sas_credential("https://acct.blob.core.windows.net/?sv=1&sig=abc");
        let store = AzureBlobStore::new(&cred, None).unwrap();
        let err = store.get_blob(None, "blob").await.unwrap_err();
        assert!(matches!(err, StoreError::NoDefaultContainer));
    }

    async fn http_error(status: StatusCode, error_code: Option<&str>) -> azure_core::Error {
        use azure_core::headers::{HeaderName, HeaderValue, Headers};
        use std::collections::HashMap;

        let mut headers: HashMap<HeaderName, HeaderValue> = HashMap::new();
        if let Some(code) = error_code {
            headers.insert(
                HeaderName::from("x-ms-error-code".to_string()),
                HeaderValue::from(code.to_string()),
            );
        }
        let response = azure_core::Response::new(
            status,
            Headers::from(headers),
            Box::pin(futures::stream::once(futures::future::ready(Ok::<
                _,
                azure_core::Error,
            >(
                Bytes::new(),
            )))),
        );
        let http = azure_core::error::HttpError::new(response).await;
        azure_core::Error::new(
            ErrorKind::HttpResponse {
                status,
                error_code: error_code.map(str::to_owned),
            },
            http,
        )
    }

    #[tokio::test]
    async fn test_classify_sdk_container_already_exists() {
        let err = http_error(StatusCode::Conflict, Some("ContainerAlreadyExists")).await;
        assert!(err.as_http_error().is_some());
        let classified = classify(err, "create container", "c1", None);
        assert!(matches!(
            classified,
            StoreError::ContainerAlreadyExists { ref container } if container == "c1"
        ));
    }

    #[tokio::test]
    async fn test_classify_sdk_not_found_without_code() {
        let err = http_error(StatusCode::NotFound, None).await;
        assert!(matches!(
            classify(err, "download", "c1", Some("b1")),
            StoreError::BlobNotFound { ref container, ref blob } if container == "c1" && blob == "b1"
        ));

        let err = http_error(StatusCode::NotFound, None).await;
        assert!(matches!(
            classify(err, "create container", "c1", None),
            StoreError::ContainerNotFound { ref container } if container == "c1"
        ));
    }

    #[tokio::test]
    async fn test_classify_sdk_forbidden_and_unknown_codes() {
        let err = http_error(StatusCode::Forbidden, Some("AuthorizationFailure")).await;
        assert!(matches!(
            classify(err, "upload", "c1", Some("b1")),
            StoreError::AccessDenied { ref message } if message == "AuthorizationFailure"
        ));

        let err = http_error(StatusCode::ServiceUnavailable, Some("ServerBusy")).await;
        assert!(matches!(
            classify(err, "upload", "c1", Some("b1")),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn test_classify_error_kind_without_http_error() {
        let err = azure_core::Error::message(
            ErrorKind::HttpResponse {
                status: StatusCode::Conflict,
                error_code: Some("ContainerAlreadyExists".to_string()),
            },
            "conflict",
        );
        assert!(matches!(
            classify(err, "create container", "c1", None),
            StoreError::ContainerAlreadyExists { .. }
        ));
    }

    #[test]
    fn test_classify_non_http_error_is_backend() {
        let err = azure_core::Error::message(ErrorKind::Io, "connection reset");
        let classified = classify(err, "download", "c1", Some("b1"));
        assert_eq!(classified.kind(), "backend");
        assert!(classified.to_string().contains("download"));
    }
}
