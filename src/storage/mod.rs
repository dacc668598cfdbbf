//! Cloud Storage backup of rendered subtitles.
//!
//! Uploading is optional: without a bucket the service still returns the
//! subtitle text inline. When signing is enabled each uploaded object also
//! gets a time-limited V4 signed URL.
mod gcs;
mod signing;

pub use gcs::GcsStore;

use std::time::Duration;
use thiserror::Error;

/// Object name prefix for uploaded subtitles
pub const OBJECT_PREFIX: &str = "subs";

/// Longest lifetime Cloud Storage accepts for V4 signed URLs (7 days)
pub const MAX_SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Errors that can occur while talking to Cloud Storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to obtain an access token from the metadata server
    #[error("Failed to obtain access token: {0}")]
    TokenError(String),

    /// An API request failed
    #[error("Request to {url} failed: {message}")]
    RequestError { url: String, message: String },

    /// An API response could not be decoded
    #[error("Failed to parse response from {url}: {message}")]
    ParseError { url: String, message: String },

    /// A `gs://` URI was malformed
    #[error("Invalid Cloud Storage URI: {0}")]
    InvalidUri(String),
}

/// Trait for subtitle backup stores.
pub trait SubtitleStore: Send + Sync {
    /// Uploads a subtitle file and returns its `gs://` URI
    fn upload(&self, filename: &str, content: &str, content_type: &str) -> Result<String, StorageError>;

    /// Creates a signed download URL for an uploaded object
    ///
    /// Returns `Ok(None)` when signing is not configured for this store.
    fn signed_url(&self, gs_uri: &str, ttl: Duration) -> Result<Option<String>, StorageError>;
}

/// Splits `gs://bucket/object/name` into bucket and object name
pub fn parse_gs_uri(gs_uri: &str) -> Result<(&str, &str), StorageError> {
    gs_uri
        .strip_prefix("gs://")
        .and_then(|rest| rest.split_once('/'))
        .filter(|(bucket, object)| !bucket.is_empty() && !object.is_empty())
        .ok_or_else(|| StorageError::InvalidUri(gs_uri.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gs_uri() {
        assert_eq!(
            parse_gs_uri("gs://my-bucket/subs/abc.en.vtt").unwrap(),
            ("my-bucket", "subs/abc.en.vtt")
        );
        assert!(parse_gs_uri("https://my-bucket/subs/abc.en.vtt").is_err());
        assert!(parse_gs_uri("gs://my-bucket").is_err());
        assert!(parse_gs_uri("gs:///object").is_err());
    }
}
