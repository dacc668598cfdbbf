//! V4 signed URL construction
//!
//! Follows the GOOG4-RSA-SHA256 scheme: a canonical GET request is hashed,
//! wrapped in a string-to-sign and signed by the service account. The actual
//! RSA signature is produced remotely, so the signer is passed in.

use super::StorageError;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use std::time::Duration;

pub(super) const STORAGE_HOST: &str = "storage.googleapis.com";
const ALGORITHM: &str = "GOOG4-RSA-SHA256";

/// RFC 3986 unreserved characters stay as they are
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Object paths additionally keep their slashes
const PATH_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

fn encode_query(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE_SET).to_string()
}

pub(super) fn encode_path(value: &str) -> String {
    utf8_percent_encode(value, PATH_ENCODE_SET).to_string()
}

/// Builds a V4 signed GET URL for `bucket/object`
///
/// `sign` receives the string-to-sign and returns the raw signature bytes.
pub(super) fn build_signed_url<F>(
    bucket: &str,
    object: &str,
    service_account: &str,
    ttl: Duration,
    now: DateTime<Utc>,
    sign: F,
) -> Result<String, StorageError>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>, StorageError>,
{
    let expires = ttl.as_secs().clamp(1, super::MAX_SIGNED_URL_TTL.as_secs());
    let datestamp = now.format("%Y%m%d").to_string();
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();

    let credential_scope = format!("{}/auto/storage/goog4_request", datestamp);
    let credential = format!("{}/{}", service_account, credential_scope);
    let canonical_uri = format!("/{}/{}", encode_path(bucket), encode_path(object));

    // Already in sorted order
    let query = [
        ("X-Goog-Algorithm", ALGORITHM.to_string()),
        ("X-Goog-Credential", credential),
        ("X-Goog-Date", timestamp.clone()),
        ("X-Goog-Expires", expires.to_string()),
        ("X-Goog-SignedHeaders", "host".to_string()),
    ]
    .iter()
    .map(|(key, value)| format!("{}={}", key, encode_query(value)))
    .collect::<Vec<_>>()
    .join("&");

    let canonical_request = format!(
        "GET\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
        canonical_uri, query, STORAGE_HOST
    );

    let string_to_sign = format!(
        "{}\n{}\n{}\n{:x}",
        ALGORITHM,
        timestamp,
        credential_scope,
        Sha256::digest(canonical_request.as_bytes())
    );

    let signature: String = sign(string_to_sign.as_bytes())?
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();

    Ok(format!(
        "https://{}{}?{}&X-Goog-Signature={}",
        STORAGE_HOST, canonical_uri, query, signature
    ))
}
