/// Google Cloud Storage implementation of the subtitle store.
use super::signing::{STORAGE_HOST, build_signed_url, encode_path};
use super::{OBJECT_PREFIX, StorageError, SubtitleStore, parse_gs_uri};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Metadata server endpoint handing out the runtime service account's token
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const IAM_CREDENTIALS_URL: &str = "https://iamcredentials.googleapis.com/v1";

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobResponse {
    signed_blob: String,
}

/// Subtitle store backed by a Cloud Storage bucket.
///
/// Authenticates with the token of the runtime service account from the
/// metadata server, so no key file is ever needed. Signing goes through the
/// IAM Credentials `signBlob` API for the same reason.
pub struct GcsStore {
    client: reqwest::blocking::Client,
    bucket: String,
    /// Service account used for signing; `None` disables signed URLs
    signer_email: Option<String>,
}

impl GcsStore {
    /// Creates a store for `bucket`
    ///
    /// # Arguments
    ///
    /// * `bucket` - Target bucket name
    /// * `signer_email` - Service account for V4 signed URLs, if enabled
    pub fn new(bucket: &str, signer_email: Option<String>) -> Result<Self, StorageError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StorageError::RequestError {
                url: STORAGE_HOST.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            signer_email,
        })
    }

    /// Fetches an OAuth access token from the metadata server
    fn access_token(&self) -> Result<String, StorageError> {
        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .map_err(|e| StorageError::TokenError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::TokenError(format!(
                "HTTP {} from metadata server",
                response.status().as_u16()
            )));
        }

        let token: AccessToken = response
            .json()
            .map_err(|e| StorageError::TokenError(e.to_string()))?;

        Ok(token.access_token)
    }

    /// Signs `payload` as `service_account` through the IAM Credentials API
    fn sign_blob(&self, service_account: &str, payload: &[u8]) -> Result<Vec<u8>, StorageError> {
        let url = format!(
            "{}/projects/-/serviceAccounts/{}:signBlob",
            IAM_CREDENTIALS_URL, service_account
        );
        let token = self.access_token()?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "payload": STANDARD.encode(payload) }))
            .send()
            .map_err(|e| StorageError::RequestError {
                url: url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(StorageError::RequestError {
                url,
                message: format!("HTTP {}", response.status().as_u16()),
            });
        }

        let signed: SignBlobResponse = response.json().map_err(|e| StorageError::ParseError {
            url: url.clone(),
            message: e.to_string(),
        })?;

        STANDARD
            .decode(signed.signed_blob)
            .map_err(|e| StorageError::ParseError {
                url,
                message: e.to_string(),
            })
    }
}

impl SubtitleStore for GcsStore {
    fn upload(&self, filename: &str, content: &str, content_type: &str) -> Result<String, StorageError> {
        let object = object_name(filename);
        let url = format!(
            "https://{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            STORAGE_HOST,
            encode_path(&self.bucket),
            utf8_percent_encode(&object, NON_ALPHANUMERIC)
        );
        let token = self.access_token()?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, content_type)
            .body(content.to_string())
            .send()
            .map_err(|e| StorageError::RequestError {
                url: url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(StorageError::RequestError {
                url,
                message: format!("HTTP {}: {}", status, body.trim()),
            });
        }

        Ok(format!("gs://{}/{}", self.bucket, object))
    }

    fn signed_url(&self, gs_uri: &str, ttl: Duration) -> Result<Option<String>, StorageError> {
        let Some(service_account) = self.signer_email.as_deref() else {
            return Ok(None);
        };
        let (bucket, object) = parse_gs_uri(gs_uri)?;

        build_signed_url(bucket, object, service_account, ttl, Utc::now(), |payload| {
            self.sign_blob(service_account, payload)
        })
        .map(Some)
    }
}

/// Object name of an uploaded subtitle file
fn object_name(filename: &str) -> String {
    format!("{}/{}", OBJECT_PREFIX, filename)
}
