//! Runtime configuration
//!
//! Every setting is a command line flag that falls back to the environment
//! variable the deployment injects, so the container only ever sets env vars.

use crate::subtitle_format::SubtitleFormat;
use clap::Parser;
use std::path::PathBuf;

/// Serves YouTube subtitles over HTTP
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Cloud Storage bucket for subtitle backups (uploads are skipped without it)
    #[arg(long, env = "VIDEO_BUCKET")]
    pub video_bucket: Option<String>,

    /// Format used when a request does not name one (`srt` or `vtt`)
    #[arg(long, env = "DEFAULT_FORMAT", default_value = "vtt")]
    pub default_format: String,

    /// Return V4 signed URLs for uploaded files (`true` to enable)
    #[arg(long, env = "ENABLE_SIGNED_URL", default_value = "false")]
    pub enable_signed_url: String,

    /// Service account that signs URLs; required for signed URLs
    #[arg(long, env = "SERVICE_ACCOUNT_EMAIL")]
    pub service_account_email: Option<String>,

    /// Netscape cookie file handed to yt-dlp
    #[arg(long, env = "YT_COOKIES_PATH", default_value = "/tmp/cookies.txt")]
    pub cookies_path: PathBuf,

    /// Cookies written to the cookie file at startup, Netscape or header format
    #[arg(long, env = "YT_COOKIES_TEXT", hide_env_values = true)]
    pub cookies_text: Option<String>,

    /// Scratch directory for per-request files (defaults to the system temp dir)
    #[arg(long, env = "OUT_DIR")]
    pub out_dir: Option<PathBuf>,

    /// yt-dlp program to run for the fallback
    #[arg(long, env = "YT_DLP_BIN", default_value = "yt-dlp")]
    pub yt_dlp_bin: String,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Config {
    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Bucket for backups, ignoring an empty variable
    pub fn bucket(&self) -> Option<String> {
        non_empty(&self.video_bucket)
    }

    pub fn default_format(&self) -> SubtitleFormat {
        SubtitleFormat::from_name(&self.default_format)
    }

    /// Service account to sign with, when signing is switched on
    pub fn signer_email(&self) -> Option<String> {
        if !self.enable_signed_url.trim().eq_ignore_ascii_case("true") {
            return None;
        }
        non_empty(&self.service_account_email)
    }

    /// Cookie secret, ignoring an empty variable
    pub fn cookies_text(&self) -> Option<String> {
        non_empty(&self.cookies_text)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.out_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
