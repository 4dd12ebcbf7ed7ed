//! Azure credential parsing.
//!
//! The access token in a COSI `BucketInfo` takes one of two forms:
//!
//! - a SAS URL, either container-scoped
//!   (`https://{account}.blob.core.windows.net/{container}?sv=...&sig=...`)
//!   or account-scoped (no container segment).  Emulator URLs are
//!   path-style: `http://127.0.0.1:10000/{account}/{container}?...`.
//! - a storage connection string
//!   (`DefaultEndpointsProtocol=https;AccountName=...;AccountKey=...`),
//!   authenticated by `AccountKey` or `SharedAccessSignature`.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use thiserror::Error;
use url::{Host, Url};

/// Well-known Azurite account used by `UseDevelopmentStorage=true`.
const EMULATOR_ACCOUNT: &str = "devstoreaccount1";
const EMULATOR_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const EMULATOR_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

const PUBLIC_BLOB_HOST_SUFFIX: &str = ".blob.core.windows.net";

/// Errors raised while interpreting an access token.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("access token is neither a SAS URL nor a connection string")]
    Unrecognized,

    #[error("invalid SAS URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("SAS URL has no signature query string")]
    MissingSignature,

    #[error("cannot determine storage account name")]
    MissingAccount,

    #[error("connection string has neither AccountKey nor SharedAccessSignature")]
    MissingAuth,

    #[error("invalid AccountKey in connection string (not valid base64)")]
    InvalidAccountKey,
}

/// How requests are authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum AzureAuth {
    /// Shared Key authentication with the base64 storage account key.
    SharedKey { key: String },
    /// SAS token (query string without the leading `?`).
    SasToken { token: String },
}

impl fmt::Debug for AzureAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AzureAuth::SharedKey { .. } => f.write_str("SharedKey(<redacted>)"),
            AzureAuth::SasToken { .. } => f.write_str("SasToken(<redacted>)"),
        }
    }
}

/// A parsed Azure Blob Storage credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureCredential {
    /// Storage account name.
    pub account: String,
    /// Blob service endpoint for non-public clouds and emulators, without a
    /// trailing slash. `None` means `https://{account}.blob.core.windows.net`.
    pub endpoint: Option<String>,
    /// Container named by a container-scoped SAS URL.
    pub container: Option<String>,
    pub auth: AzureAuth,
}

impl AzureCredential {
    /// Parse a `BucketInfo` access token.
    pub fn parse(token: &str) -> Result<Self, CredentialError> {
        let token = token.trim();
        if token.starts_with("https://") || token.starts_with("http://") {
            Self::from_sas_url(token)
        } else if token.contains('=') {
            Self::from_connection_string(token)
        } else {
            Err(CredentialError::Unrecognized)
        }
    }

    /// Parse a container- or account-scoped SAS URL.
    pub fn from_sas_url(raw: &str) -> Result<Self, CredentialError> {
        let url = Url::parse(raw)?;

        let token = url.query().unwrap_or("").to_string();
        if token.is_empty() {
            return Err(CredentialError::MissingSignature);
        }

        let host = url.host_str().ok_or(CredentialError::MissingAccount)?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let path_style = matches!(url.host(), Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)))
            || host.eq_ignore_ascii_case("localhost");

        let (account, endpoint) = if path_style {
            if segments.is_empty() {
                return Err(CredentialError::MissingAccount);
            }
            let account = segments.remove(0).to_string();
            let endpoint = format!("{}://{}/{}", url.scheme(), authority, account);
            (account, Some(endpoint))
        } else {
            let account = host
                .split('.')
                .next()
                .filter(|a| !a.is_empty())
                .ok_or(CredentialError::MissingAccount)?
                .to_string();
            let public = url.scheme() == "https"
                && url.port().is_none()
                && host.to_ascii_lowercase().ends_with(PUBLIC_BLOB_HOST_SUFFIX);
            let endpoint = (!public).then(|| format!("{}://{}", url.scheme(), authority));
            (account, endpoint)
        };

        Ok(Self {
            account,
            endpoint,
            container: segments.first().map(|c| c.to_string()),
            auth: AzureAuth::SasToken { token },
        })
    }

    /// Parse a storage connection string.
    pub fn from_connection_string(raw: &str) -> Result<Self, CredentialError> {
        let mut protocol = "https";
        let mut account_name = None;
        let mut account_key = None;
        let mut sas = None;
        let mut blob_endpoint = None;
        let mut endpoint_suffix = None;
        let mut development = false;

        for part in raw.split(';') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "DefaultEndpointsProtocol" => protocol = value,
                "AccountName" => account_name = Some(value),
                "AccountKey" => account_key = Some(value),
                "SharedAccessSignature" => sas = Some(value),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/')),
                "EndpointSuffix" => endpoint_suffix = Some(value),
                "UseDevelopmentStorage" => development = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if development {
            account_name = account_name.or(Some(EMULATOR_ACCOUNT));
            account_key = account_key.or(Some(EMULATOR_KEY));
            blob_endpoint = blob_endpoint.or(Some(EMULATOR_BLOB_ENDPOINT));
        }

        let account = match (account_name, blob_endpoint) {
            (Some(name), _) if !name.is_empty() => name.to_string(),
            (_, Some(endpoint)) => account_from_endpoint(endpoint)?,
            _ => return Err(CredentialError::MissingAccount),
        };

        let endpoint = match (blob_endpoint, endpoint_suffix) {
            (Some(endpoint), _) => Some(endpoint.to_string()),
            (None, Some(suffix)) if suffix != "core.windows.net" => {
                Some(format!("{}://{}.blob.{}", protocol, account, suffix))
            }
            _ => None,
        };

        let auth = if let Some(key) = account_key {
            BASE64_STANDARD
                .decode(key)
                .map_err(|_| CredentialError::InvalidAccountKey)?;
            AzureAuth::SharedKey {
                key: key.to_string(),
            }
        } else if let Some(token) = sas {
            AzureAuth::SasToken {
                token: token.trim_start_matches('?').to_string(),
            }
        } else {
            return Err(CredentialError::MissingAuth);
        };

        Ok(Self {
            account,
            endpoint,
            container: None,
            auth,
        })
    }
}

/// Derive the account name from a `BlobEndpoint` value.
fn account_from_endpoint(endpoint: &str) -> Result<String, CredentialError> {
    let url = Url::parse(endpoint)?;
    let from_path = url
        .path_segments()
        .and_then(|mut s| s.find(|seg| !seg.is_empty()))
        .map(str::to_string);
    match url.host() {
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => from_path,
        Some(Host::Domain(d)) if d.eq_ignore_ascii_case("localhost") => from_path,
        Some(Host::Domain(d)) => d.split('.').next().map(str::to_string),
        None => None,
    }
    .filter(|a| !a.is_empty())
    .ok_or(CredentialError::MissingAccount)
}
