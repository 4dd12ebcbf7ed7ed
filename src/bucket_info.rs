//! COSI `BucketInfo` secret loading.
//!
//! The COSI provisioner mounts a JSON document describing the provisioned
//! bucket (by default at `/cosi/bucket1/BucketInfo`).  For Azure the
//! interesting part is `spec.secretAzure.accessToken`, which holds either a
//! SAS URL or a storage connection string.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while loading the bucket info secret.
#[derive(Debug, Error)]
pub enum BucketInfoError {
    /// The secret file could not be read.
    #[error("failed to read bucket info at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The secret file is not a valid `BucketInfo` document.
    #[error("failed to parse bucket info at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The document carries no (or an empty) Azure access token.
    #[error("bucket info at {path} has no Azure access token")]
    MissingAzureSecret { path: String },
}

/// `BucketInfo` as written by the COSI provisioner (`objectstorage.k8s.io/v1alpha1`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: BucketInfoMeta,
    #[serde(default)]
    pub spec: BucketInfoSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketInfoMeta {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfoSpec {
    /// Name of the bucket on the storage provider.
    #[serde(default)]
    pub bucket_name: String,
    /// `Key` or `IAM`.
    #[serde(default)]
    pub authentication_type: Option<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub secret_azure: Option<SecretAzure>,
}

/// Azure credential block of a `BucketInfo`.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretAzure {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, rename = "expiryTimeStamp")]
    pub expiry_timestamp: Option<String>,
}

// Never print the token itself.
impl fmt::Debug for SecretAzure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretAzure")
            .field("access_token", &"<redacted>")
            .field("expiry_timestamp", &self.expiry_timestamp)
            .finish()
    }
}

impl BucketInfo {
    /// The Azure access token, if present and non-empty.
    pub fn azure_access_token(&self) -> Option<&str> {
        self.spec
            .secret_azure
            .as_ref()
            .map(|s| s.access_token.trim())
            .filter(|t| !t.is_empty())
    }

    /// Whether the Azure secret carries an expiry timestamp in the past.
    ///
    /// Unparseable timestamps are treated as not expired.
    pub fn is_expired_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.spec
            .secret_azure
            .as_ref()
            .and_then(|s| s.expiry_timestamp.as_deref())
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .is_some_and(|expiry| expiry < now)
    }
}

/// Parse a `BucketInfo` document. `path` is only used for error messages.
pub fn parse_bucket_info(path: &str, raw: &[u8]) -> Result<BucketInfo, BucketInfoError> {
    let info: BucketInfo =
        serde_json::from_slice(raw).map_err(|source| BucketInfoError::Parse {
            path: path.to_string(),
            source,
        })?;

    if info.azure_access_token().is_none() {
        return Err(BucketInfoError::MissingAzureSecret {
            path: path.to_string(),
        });
    }

    Ok(info)
}

/// Read and parse the bucket info secret at `path`.
///
/// A malformed document is an error rather than an empty credential.
pub async fn load_bucket_info<P: AsRef<Path>>(path: P) -> Result<BucketInfo, BucketInfoError> {
    let path_display = path.as_ref().display().to_string();
    let raw = tokio::fs::read(path.as_ref())
        .await
        .map_err(|source| BucketInfoError::Read {
            path: path_display.clone(),
            source,
        })?;

    let info = parse_bucket_info(&path_display, &raw)?;

    info!(
        path = %path_display,
        bucket = %info.spec.bucket_name,
        name = ?info.metadata.name,
        "Loaded bucket info"
    );
    if info.is_expired_at(chrono::Utc::now()) {
        warn!(path = %path_display, "Azure access token in bucket info has expired");
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "apiVersion": "objectstorage.k8s.io/v1alpha1",
        "kind": "BucketInfo",
        "metadata": { "name": "bc-2f3b9c" },
        "spec": {
            "bucketName": "bucket1",
            "authenticationType": "KEY",
            "protocols": ["Azure"],
            "secretAzure": {
                "accessToken": "https://acct.blob.core.windows.net/bucket1?sv=2021-08-06&sig=abc",
                "expiryTimeStamp": "2099-01-01T00:00:00Z"
            }
        }
    }"#;

    #[test]
    fn test_parse_full_document() {
        let info = parse_bucket_info("mem", SAMPLE.as_bytes()).unwrap();
        assert_eq!(info.kind.as_deref(), Some("BucketInfo"));
        assert_eq!(info.metadata.name.as_deref(), Some("bc-2f3b9c"));
        assert_eq!(info.spec.bucket_name, "bucket1");
        assert_eq!(info.spec.protocols, vec!["Azure".to_string()]);
        assert_eq!(
            info.azure_access_token(),
            Some("https://acct.blob.core.windows.net/bucket1?sv=2021-08-06&sig=abc")
        );
        assert!(!info.is_expired_at(chrono::Utc::now()));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let raw = r#"{"spec":{"secretAzure":{"accessToken":"tok"},"extra":1},"status":{}}"#;
        let info = parse_bucket_info("mem", raw.as_bytes()).unwrap();
        assert_eq!(info.azure_access_token(), Some("tok"));
    }

    #[test]
    fn test_malformed_json_is_error() {
        let err = parse_bucket_info("mem", b"{not json").unwrap_err();
        assert!(matches!(err, BucketInfoError::Parse { .. }));
    }

    #[test]
    fn test_missing_azure_secret_is_error() {
        let raw = r#"{"spec":{"bucketName":"b","secretS3":{"endpoint":"x"}}}"#;
        let err = parse_bucket_info("mem", raw.as_bytes()).unwrap_err();
        assert!(matches!(err, BucketInfoError::MissingAzureSecret { .. }));
    }

    #[test]
    fn test_empty_token_is_error() {
        let raw = r#"{"spec":{"secretAzure":{"accessToken":"  "}}}"#;
        assert!(parse_bucket_info("mem", raw.as_bytes()).is_err());
    }

    #[test]
    fn test_expired_token() {
        let raw = r#"{"spec":{"secretAzure":{"accessToken":"t","expiryTimeStamp":"2001-01-01T00:00:00Z"}}}"#;
        let info = parse_bucket_info("mem", raw.as_bytes()).unwrap();
        assert!(info.is_expired_at(chrono::Utc::now()));
    }

    #[test]
    fn test_debug_redacts_token() {
        let info = parse_bucket_info("mem", SAMPLE.as_bytes()).unwrap();
        let printed = format!("{:?}", info);
        assert!(!printed.contains("sig=abc"));
        assert!(printed.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let info = load_bucket_info(file.path()).await.unwrap();
        assert_eq!(info.spec.bucket_name, "bucket1");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load_bucket_info("/nonexistent/cosi/BucketInfo")
            .await
            .unwrap_err();
        assert!(matches!(err, BucketInfoError::Read { .. }));
    }
}
