//! Cookie file module
//!
//! yt-dlp reads cookies from a Netscape `cookies.txt` file. Cookies reach the
//! service either once at cold start (a secret injected as an environment
//! variable) or per request as a plain `Cookie` header string. Both are
//! normalised into a Netscape file here.

use crate::temp::{TempGuard, create_temp_file};
use log::{info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// First line of every Netscape cookie file
pub const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";

/// Domains every header cookie is emitted for
const COOKIE_DOMAINS: &[&str] = &[".youtube.com", ".www.youtube.com"];

/// Far-future expiry (2038-01-19), the largest 32-bit timestamp
const FAR_FUTURE_EXPIRY: i64 = 2_147_483_647;

/// Errors that can occur while writing cookie files
#[derive(Debug, Error)]
pub enum CookieError {
    /// Failed to create the directory holding the cookie file
    #[error("Failed to create cookie directory {path}: {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to write the cookie file
    #[error("Failed to write cookie file {path}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },
}

/// Converts a `NAME=VALUE; NAME2=VALUE2` header into a Netscape cookie file
///
/// Parts without `=` are dropped. Every cookie is emitted once per domain in
/// `COOKIE_DOMAINS`, marked secure with a far-future expiry.
pub fn header_to_netscape(cookie_header: &str) -> String {
    let pairs: Vec<(&str, &str)> = cookie_header
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.split_once('='))
        .map(|(name, value)| (name.trim(), value.trim()))
        .collect();

    let mut lines = vec![NETSCAPE_HEADER.to_string()];
    for domain in COOKIE_DOMAINS {
        for (name, value) in &pairs {
            // domain, include_subdomains, path, secure, expires, name, value
            lines.push(format!(
                "{domain}\tTRUE\t/\tTRUE\t{FAR_FUTURE_EXPIRY}\t{name}\t{value}"
            ));
        }
    }

    let mut content = lines.join("\n");
    content.push('\n');
    content
}

fn write_file(path: &Path, content: &str) -> Result<(), CookieError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CookieError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(path, content).map_err(|e| CookieError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Writes a cookie header as a Netscape cookie file at `path`
pub fn write_cookie_file(cookie_header: &str, path: &Path) -> Result<(), CookieError> {
    write_file(path, &header_to_netscape(cookie_header))
}

/// Writes the cookie secret supplied at cold start to `path`
///
/// Text already in Netscape format is written as-is (with a trailing newline);
/// anything else is treated as a header string. Failures are logged and
/// swallowed: a missing cookie file only weakens the yt-dlp fallback.
pub fn hydrate_from_env(cookies_text: Option<&str>, path: &Path) {
    let Some(text) = cookies_text else {
        return;
    };
    let text = text.trim();

    let result = if text.starts_with(NETSCAPE_HEADER) {
        let mut content = text.to_string();
        if !content.ends_with('\n') {
            content.push('\n');
        }
        write_file(path, &content).map(|_| "Netscape")
    } else {
        write_cookie_file(text, path).map(|_| "header")
    };

    match result {
        Ok(source) => info!("[cookies] hydrated {} to {}", source, path.display()),
        Err(e) => warn!("[cookies] hydrate failed: {}", e),
    }
}

/// Writes a per-request cookie file into `dir`
///
/// The returned guard removes the file when the request is done with it.
pub(crate) fn request_cookie_file(cookie_header: &str, dir: &Path) -> Result<TempGuard, CookieError> {
    let guard = create_temp_file(dir, "req_cookies", "txt").map_err(|e| {
        CookieError::WriteFailed {
            path: dir.to_path_buf(),
            source: e,
        }
    })?;

    write_cookie_file(cookie_header, guard.path())?;

    Ok(guard)
}
