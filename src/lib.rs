//! fetch_subtitles - YouTube subtitles as an HTTP function
//!
//! This library resolves a YouTube URL or id to its subtitles, rendered as
//! SRT or WebVTT. YouTube's own caption tracks are tried first; when they
//! yield nothing, yt-dlp is run as a fallback. Rendered files can be backed
//! up to Cloud Storage and shared through signed URLs.

mod config;
mod cookies;
mod server;
mod storage;
mod subtitle_format;
mod temp;
mod transcript_api;
mod video_id;
mod ytdlp;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use config::Config;
pub use cookies::{CookieError, header_to_netscape, hydrate_from_env, write_cookie_file};
pub use server::{ServerError, router, serve};
pub use storage::{GcsStore, StorageError, SubtitleStore};
pub use subtitle_format::{FetchedSubtitles, Snippet, SubtitleFile, SubtitleFormat, to_srt, to_vtt};
pub use transcript_api::{
    CaptionTrack, SelectedTrack, TranscriptError, TranscriptList, TranscriptProvider,
    YouTubeTranscriptProvider, fetch_transcripts,
};
pub use video_id::parse_video_id;
pub use ytdlp::{Pauses, SubtitleDownloader, YtDlpDownloader, YtDlpError};

/// Default lifetime of signed URLs in seconds
const DEFAULT_TTL_SECONDS: i64 = 3600;

/// JSON body of a subtitle request
///
/// Every field is optional at the type level; `url` or `id` is checked by
/// [`FetchRequest::target`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchRequest {
    /// Video URL, preferred over `id`
    pub url: Option<String>,
    /// Bare video id
    pub id: Option<String>,
    /// `srt` or `vtt`; the configured default when absent
    pub format: Option<String>,
    /// Wanted languages; all available when absent or empty
    pub langs: Option<Vec<String>>,
    /// Translate from another track when a language is missing
    pub translate_missing: Option<bool>,
    /// Signed URL lifetime in seconds
    pub ttl_seconds: Option<i64>,
    /// `NAME=VALUE; ...` cookies for this request only
    pub cookie_header: Option<String>,
}

impl FetchRequest {
    /// Parses a request body
    ///
    /// A body that is not a JSON object counts as an empty request. Fields
    /// of an unexpected type are read leniently or ignored on their own, so
    /// they never hide the `url` or `id`.
    pub fn from_body(body: &[u8]) -> Self {
        let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) else {
            return Self::default();
        };

        let string = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            url: string("url"),
            id: string("id"),
            format: string("format"),
            langs: fields.get("langs").and_then(lenient_langs),
            translate_missing: fields.get("translate_missing").map(truthy),
            ttl_seconds: fields.get("ttl_seconds").and_then(lenient_seconds),
            cookie_header: string("cookie_header"),
        }
    }

    /// The URL or id to fetch, whichever is given first and non-empty
    pub fn target(&self) -> Option<&str> {
        [self.url.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .find(|value| !value.is_empty())
    }

    fn cookie_header(&self) -> Option<&str> {
        self.cookie_header
            .as_deref()
            .map(str::trim)
            .filter(|header| !header.is_empty())
    }

    fn ttl(&self) -> Duration {
        let seconds = self.ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS).max(0);
        Duration::from_secs(seconds as u64)
    }
}

fn lenient_langs(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Value::String(lang) => Some(vec![lang.clone()]),
        _ => None,
    }
}

/// Integer, float (truncated) or numeric string
fn lenient_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JSON truthiness: null, false, zero and empty values are false
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// One subtitle file in a successful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub lang: String,
    pub filename: String,
    /// `gs://` URI of the backup, when uploaded
    pub gcs_uri: Option<String>,
    /// Signed download URL of the backup, when signing is enabled
    pub signed_url: Option<String>,
    /// The subtitle text itself, always present
    pub content: String,
}

/// Successful response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub ok: bool,
    pub video_id: String,
    pub format: SubtitleFormat,
    pub files: Vec<FileEntry>,
    /// Languages the transcript API advertised for the video
    pub languages_detected: Vec<String>,
}

/// Failure response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub video_id: String,
    pub error: String,
}

/// Health response body, returned for every GET
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub cookies_file: bool,
    pub cookies_path: PathBuf,
}

/// Top-level error type for subtitle fetching
#[derive(Debug, Error)]
pub enum FetchSubtitlesError {
    /// Neither `url` nor `id` was supplied
    #[error("Missing 'url' or 'id'")]
    MissingTarget,

    /// Both sources came back without subtitles
    #[error("No subtitles found by either transcript API or yt-dlp.")]
    NoSubtitles { video_id: String },

    /// The yt-dlp fallback failed outright
    #[error("{source}")]
    Fallback { video_id: String, source: YtDlpError },

    /// Error while preparing the per-request cookie file
    #[error("Cookie error: {0}")]
    Cookie(#[from] CookieError),

    /// Error while setting up the transcript source
    #[error("Transcript source error: {0}")]
    Transcript(#[from] TranscriptError),

    /// Error while setting up the backup store
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FetchSubtitlesError {
    /// The video the failed request was about, if it got that far
    pub fn video_id(&self) -> Option<&str> {
        match self {
            FetchSubtitlesError::NoSubtitles { video_id }
            | FetchSubtitlesError::Fallback { video_id, .. } => Some(video_id),
            _ => None,
        }
    }
}

/// The subtitle fetching pipeline with its sources and optional store
pub struct SubtitleService {
    transcripts: Box<dyn TranscriptProvider>,
    downloader: Box<dyn SubtitleDownloader>,
    store: Option<Box<dyn SubtitleStore>>,
    default_format: SubtitleFormat,
    /// Global cookie file, hydrated at startup
    cookies_path: PathBuf,
    /// Where per-request cookie files are written
    work_dir: PathBuf,
}

impl SubtitleService {
    /// Assembles a service from explicit parts
    pub fn new(
        transcripts: Box<dyn TranscriptProvider>,
        downloader: Box<dyn SubtitleDownloader>,
        store: Option<Box<dyn SubtitleStore>>,
        default_format: SubtitleFormat,
        cookies_path: PathBuf,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            transcripts,
            downloader,
            store,
            default_format,
            cookies_path,
            work_dir,
        }
    }

    /// Builds the production service: YouTube caption tracks, yt-dlp and,
    /// when a bucket is configured, Cloud Storage
    pub fn from_config(config: &Config) -> Result<Self, FetchSubtitlesError> {
        let work_dir = config.work_dir();

        let store: Option<Box<dyn SubtitleStore>> = match config.bucket() {
            Some(bucket) => Some(Box::new(GcsStore::new(&bucket, config.signer_email())?)),
            None => None,
        };

        Ok(Self::new(
            Box::new(YouTubeTranscriptProvider::new()?),
            Box::new(YtDlpDownloader::new(config.yt_dlp_bin.clone(), work_dir.clone())),
            store,
            config.default_format(),
            config.cookies_path.clone(),
            work_dir,
        ))
    }

    /// Reports whether the global cookie file is in place
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            ok: true,
            cookies_file: self.cookies_path.exists(),
            cookies_path: self.cookies_path.clone(),
        }
    }

    /// Fetches subtitles for a request
    ///
    /// Tries the transcript API first and falls back to yt-dlp only when it
    /// produced no files. Uploads are best effort: a failed upload leaves
    /// `gcs_uri` empty but the content is still returned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fetch_subtitles::{Config, FetchRequest, SubtitleService};
    /// use clap::Parser;
    ///
    /// let service = SubtitleService::from_config(&Config::parse()).unwrap();
    /// let response = service
    ///     .fetch(&FetchRequest {
    ///         url: Some("https://youtu.be/dQw4w9WgXcQ".to_string()),
    ///         langs: Some(vec!["en".to_string()]),
    ///         ..FetchRequest::default()
    ///     })
    ///     .unwrap();
    ///
    /// for file in response.files {
    ///     println!("{}: {} bytes", file.filename, file.content.len());
    /// }
    /// ```
    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchSubtitlesError> {
        let target = request.target().ok_or(FetchSubtitlesError::MissingTarget)?;

        let format = request
            .format
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(SubtitleFormat::from_name)
            .unwrap_or(self.default_format);
        let langs = request.langs.as_deref().filter(|langs| !langs.is_empty());
        let translate_missing = request.translate_missing.unwrap_or(true);
        let video_id = parse_video_id(target);

        // Removed again when the guard drops, on every return path
        let request_cookies = match request.cookie_header() {
            Some(header) => Some(cookies::request_cookie_file(header, &self.work_dir)?),
            None => None,
        };
        let cookie_file: &Path = request_cookies
            .as_deref()
            .unwrap_or(self.cookies_path.as_path());

        info!(
            "[REQ] video_id={} fmt={} langs={:?} translate_missing={}",
            video_id, format, langs, translate_missing
        );

        let mut fetched = match fetch_transcripts(
            self.transcripts.as_ref(),
            &video_id,
            langs,
            format,
            translate_missing,
        ) {
            Ok(fetched) => {
                info!(
                    "[TranscriptAPI] got files={} langs_meta={:?}",
                    fetched.files.len(),
                    fetched.languages_meta
                );
                fetched
            }
            Err(e) if e.is_known() => {
                warn!("[TranscriptAPI] known: {}", e);
                FetchedSubtitles::default()
            }
            Err(e) => {
                error!("[TranscriptAPI] unexpected: {}", e);
                FetchedSubtitles::default()
            }
        };

        if fetched.files.is_empty() {
            match self
                .downloader
                .download_subtitles(target, langs, format, Some(cookie_file))
            {
                Ok(files) => {
                    info!("[yt-dlp] got files={}", files.len());
                    fetched.files = files;
                }
                Err(source) => {
                    error!("[yt-dlp] failed: {}", source);
                    return Err(FetchSubtitlesError::Fallback { video_id, source });
                }
            }
        }

        if fetched.files.is_empty() {
            return Err(FetchSubtitlesError::NoSubtitles { video_id });
        }

        let files = fetched
            .files
            .into_iter()
            .map(|file| self.backup(file, format, request.ttl()))
            .collect();

        Ok(FetchResponse {
            ok: true,
            video_id,
            format,
            files,
            languages_detected: fetched.languages_meta,
        })
    }

    /// Uploads a file when a store is configured and builds its entry
    fn backup(&self, file: SubtitleFile, format: SubtitleFormat, ttl: Duration) -> FileEntry {
        let (gcs_uri, signed_url) = match &self.store {
            Some(store) => {
                let gcs_uri = store
                    .upload(&file.filename, &file.text, format.content_type())
                    .map_err(|e| warn!("[GCS] upload failed: {}", e))
                    .ok();

                let signed_url = gcs_uri.as_deref().and_then(|uri| {
                    store
                        .signed_url(uri, ttl)
                        .unwrap_or_else(|e| {
                            warn!("[GCS] signed URL failed: {}", e);
                            None
                        })
                });

                (gcs_uri, signed_url)
            }
            None => (None, None),
        };

        FileEntry {
            lang: file.lang,
            filename: file.filename,
            gcs_uri,
            signed_url,
            content: file.text,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Stub sources shared by the orchestration and server tests

    use super::*;
    use std::sync::Mutex;

    pub(crate) struct StubTranscripts {
        pub list: Result<TranscriptList, fn(&str) -> TranscriptError>,
    }

    impl StubTranscripts {
        pub(crate) fn with_tracks(codes: &[&str]) -> Self {
            Self {
                list: Ok(TranscriptList {
                    video_id: String::new(),
                    tracks: codes
                        .iter()
                        .map(|code| CaptionTrack {
                            language_code: code.to_string(),
                            language: code.to_string(),
                            is_generated: false,
                            is_translatable: true,
                            base_url: String::new(),
                        })
                        .collect(),
                    translation_languages: Vec::new(),
                }),
            }
        }

        pub(crate) fn failing(error: fn(&str) -> TranscriptError) -> Self {
            Self { list: Err(error) }
        }
    }

    impl TranscriptProvider for StubTranscripts {
        fn list_transcripts(&self, video_id: &str) -> Result<TranscriptList, TranscriptError> {
            match &self.list {
                Ok(list) => Ok(TranscriptList {
                    video_id: video_id.to_string(),
                    ..list.clone()
                }),
                Err(error) => Err(error(video_id)),
            }
        }

        fn fetch_snippets(&self, selected: &SelectedTrack<'_>) -> Result<Vec<Snippet>, TranscriptError> {
            Ok(vec![Snippet {
                text: format!("caption in {}", selected.track.language_code),
                start: 0.0,
                duration: 2.0,
            }])
        }
    }

    /// Downloader returning fixed files and recording the cookie file it saw
    pub(crate) struct StubDownloader {
        pub result: fn() -> Result<Vec<SubtitleFile>, YtDlpError>,
        pub calls: Mutex<Vec<Option<(PathBuf, String)>>>,
    }

    impl StubDownloader {
        pub(crate) fn returning(result: fn() -> Result<Vec<SubtitleFile>, YtDlpError>) -> Self {
            Self {
                result,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl SubtitleDownloader for StubDownloader {
        fn download_subtitles(
            &self,
            _url_or_id: &str,
            _langs: Option<&[String]>,
            _format: SubtitleFormat,
            cookie_file: Option<&Path>,
        ) -> Result<Vec<SubtitleFile>, YtDlpError> {
            let seen = cookie_file.map(|path| {
                (
                    path.to_path_buf(),
                    std::fs::read_to_string(path).unwrap_or_default(),
                )
            });
            self.calls.lock().unwrap().push(seen);
            (self.result)()
        }
    }

    pub(crate) fn ytdlp_files() -> Result<Vec<SubtitleFile>, YtDlpError> {
        Ok(vec![SubtitleFile {
            lang: "en".to_string(),
            filename: "Clip-abcdefghijk.en.vtt".to_string(),
            text: "WEBVTT\n".to_string(),
        }])
    }

    pub(crate) fn ytdlp_empty() -> Result<Vec<SubtitleFile>, YtDlpError> {
        Ok(Vec::new())
    }

    pub(crate) fn ytdlp_rate_limited() -> Result<Vec<SubtitleFile>, YtDlpError> {
        Err(YtDlpError::CommandFailed {
            code: Some(1),
            stderr: "HTTP Error 429: Too Many Requests".to_string(),
        })
    }

    /// Store recording uploads; `fail_uploads` makes every upload fail
    pub(crate) struct StubStore {
        pub fail_uploads: bool,
        pub uploads: Mutex<Vec<(String, String)>>,
    }

    impl SubtitleStore for StubStore {
        fn upload(&self, filename: &str, _content: &str, content_type: &str) -> Result<String, StorageError> {
            if self.fail_uploads {
                return Err(StorageError::TokenError("no metadata server".to_string()));
            }
            self.uploads
                .lock()
                .unwrap()
                .push((filename.to_string(), content_type.to_string()));
            Ok(format!("gs://bucket/subs/{}", filename))
        }

        fn signed_url(&self, gs_uri: &str, ttl: Duration) -> Result<Option<String>, StorageError> {
            Ok(Some(format!("https://signed.test/{}?ttl={}", gs_uri, ttl.as_secs())))
        }
    }

    pub(crate) fn service(
        transcripts: StubTranscripts,
        downloader: StubDownloader,
        store: Option<StubStore>,
        work_dir: &Path,
    ) -> SubtitleService {
        SubtitleService::new(
            Box::new(transcripts),
            Box::new(downloader),
            store.map(|s| Box::new(s) as Box<dyn SubtitleStore>),
            SubtitleFormat::Vtt,
            work_dir.join("cookies.txt"),
            work_dir.to_path_buf(),
        )
    }
}
