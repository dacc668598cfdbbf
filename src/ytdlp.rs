//! yt-dlp subtitle downloader
//!
//! Fallback subtitle source that runs the `yt-dlp` program in subtitle-only
//! mode. YouTube rate-limits aggressively, so every attempt rotates to the
//! next player-client profile and pauses with random jitter in between.

use crate::subtitle_format::{SubtitleFile, SubtitleFormat};
use crate::temp::create_temp_dir;
use log::{error, info, warn};
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// User agent of the Android YouTube app, sent with every yt-dlp request
pub const ANDROID_USER_AGENT: &str =
    "com.google.android.youtube/19.15.38 (Linux; U; Android 13) gzip";

/// Player client profiles tried in order
pub const CLIENT_PROFILES: &[&str] = &[
    "android",
    "android_embedded",
    "web_embedded,android",
    "mweb",
];

/// Errors that can occur while running yt-dlp
#[derive(Debug, Error)]
pub enum YtDlpError {
    /// The yt-dlp program could not be started
    #[error("Failed to spawn {binary}: {source}")]
    SpawnFailed { binary: String, source: io::Error },

    /// yt-dlp ran but reported a failure
    #[error("yt-dlp failed with exit code {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    /// yt-dlp finished without writing any subtitle file
    #[error("no subtitle files written")]
    NoSubtitles,

    /// The scratch directory for yt-dlp output could not be created
    #[error("Failed to create output directory in {path}: {source}")]
    OutputDirFailed { path: PathBuf, source: io::Error },

    /// A subtitle file written by yt-dlp could not be read
    #[error("Failed to read subtitle file {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },
}

impl YtDlpError {
    /// Whether YouTube throttled or refused the request
    pub fn is_rate_limited(&self) -> bool {
        match self {
            YtDlpError::CommandFailed { stderr, .. } => {
                stderr.contains("429") || stderr.contains("Too Many Requests") || stderr.contains("403")
            }
            _ => false,
        }
    }
}

/// Trait for subtitle downloaders used when the transcript API comes up empty
pub trait SubtitleDownloader: Send + Sync {
    /// Downloads subtitle files for a video
    ///
    /// # Arguments
    ///
    /// * `url_or_id` - The URL or id exactly as the caller supplied it
    /// * `langs` - Wanted language codes; `None` or empty downloads all
    /// * `format` - Subtitle format to request
    /// * `cookie_file` - Netscape cookie file, used only if it exists
    fn download_subtitles(
        &self,
        url_or_id: &str,
        langs: Option<&[String]>,
        format: SubtitleFormat,
        cookie_file: Option<&Path>,
    ) -> Result<Vec<SubtitleFile>, YtDlpError>;
}

/// Random pause ranges, in seconds, between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pauses {
    /// Before every profile attempt
    pub before_attempt: (f64, f64),
    /// After a rate-limited attempt
    pub rate_limited: (f64, f64),
    /// After an unexpected failure
    pub unexpected: (f64, f64),
}

impl Default for Pauses {
    fn default() -> Self {
        Self {
            before_attempt: (0.5, 1.5),
            rate_limited: (3.0, 7.0),
            unexpected: (1.0, 3.0),
        }
    }
}

impl Pauses {
    /// No pauses at all
    pub fn none() -> Self {
        Self {
            before_attempt: (0.0, 0.0),
            rate_limited: (0.0, 0.0),
            unexpected: (0.0, 0.0),
        }
    }

    fn sleep(range: (f64, f64)) -> f64 {
        let (min, max) = range;
        if max <= 0.0 || max < min {
            return 0.0;
        }

        let seconds = rand::thread_rng().gen_range(min..=max);
        thread::sleep(Duration::from_secs_f64(seconds));
        seconds
    }
}

/// Subtitle downloader driving the yt-dlp command line program
pub struct YtDlpDownloader {
    /// Program name or path of the yt-dlp binary
    binary: String,
    /// Directory in which per-attempt output directories are created
    work_dir: PathBuf,
    pauses: Pauses,
}

impl YtDlpDownloader {
    /// Creates a new downloader
    pub fn new(binary: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
            pauses: Pauses::default(),
        }
    }

    /// Replaces the pause ranges between attempts
    pub fn with_pauses(mut self, pauses: Pauses) -> Self {
        self.pauses = pauses;
        self
    }

    /// Runs yt-dlp once and collects the subtitle files it wrote
    fn run_profile(
        &self,
        url_or_id: &str,
        langs: Option<&[String]>,
        format: SubtitleFormat,
        cookie_file: Option<&Path>,
        profile: &str,
    ) -> Result<Vec<SubtitleFile>, YtDlpError> {
        let out_dir = create_temp_dir(&self.work_dir, "ytdlp").map_err(|e| {
            YtDlpError::OutputDirFailed {
                path: self.work_dir.clone(),
                source: e,
            }
        })?;

        let args = build_args(url_or_id, langs, format, cookie_file, profile, out_dir.path());

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| YtDlpError::SpawnFailed {
                binary: self.binary.clone(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(YtDlpError::CommandFailed {
                code: output.status.code(),
                stderr,
            });
        }

        collect_subtitle_files(out_dir.path(), format)
        // out_dir is dropped here, removing everything yt-dlp wrote
    }
}

impl SubtitleDownloader for YtDlpDownloader {
    fn download_subtitles(
        &self,
        url_or_id: &str,
        langs: Option<&[String]>,
        format: SubtitleFormat,
        cookie_file: Option<&Path>,
    ) -> Result<Vec<SubtitleFile>, YtDlpError> {
        let cookie_file = cookie_file.filter(|path| path.exists());
        if cookie_file.is_some() {
            info!("[yt-dlp] Using cookiefile");
        }

        let mut last_error = None;

        for (index, profile) in CLIENT_PROFILES.iter().enumerate() {
            Pauses::sleep(self.pauses.before_attempt);
            info!("[yt-dlp] Try profile #{}: player_client={}", index + 1, profile);

            match self.run_profile(url_or_id, langs, format, cookie_file, profile) {
                Ok(files) if !files.is_empty() => return Ok(files),
                Ok(_) => last_error = Some(YtDlpError::NoSubtitles),
                Err(e @ YtDlpError::CommandFailed { .. }) => {
                    if e.is_rate_limited() {
                        let waited = Pauses::sleep(self.pauses.rate_limited);
                        warn!("[yt-dlp] {} -> backoff {:.1}s", e, waited);
                    } else {
                        warn!("[yt-dlp] {}", e);
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("[yt-dlp] unexpected: {}", e);
                    Pauses::sleep(self.pauses.unexpected);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(YtDlpError::NoSubtitles))
    }
}

/// Builds the yt-dlp command line for one attempt
fn build_args(
    url_or_id: &str,
    langs: Option<&[String]>,
    format: SubtitleFormat,
    cookie_file: Option<&Path>,
    profile: &str,
    out_dir: &Path,
) -> Vec<String> {
    let ext = format.extension();
    // `%` in the directory would start an output template field
    let dir = out_dir.to_string_lossy().replace('%', "%%");
    let template = Path::new(&dir).join("%(title).80s-%(id)s.%(ext)s");

    let mut args: Vec<String> = vec![
        "--skip-download".into(),
        "--write-subs".into(),
        "--write-auto-subs".into(),
        "--sub-format".into(),
        ext.into(),
        "-o".into(),
        template.to_string_lossy().into_owned(),
        "--quiet".into(),
        "--retries".into(),
        "10".into(),
        "--retry-sleep".into(),
        "exp=1:20".into(),
        "--sleep-requests".into(),
        "2".into(),
        "--throttled-rate".into(),
        "256K".into(),
        "--socket-timeout".into(),
        "30".into(),
        "--add-header".into(),
        format!("User-Agent:{}", ANDROID_USER_AGENT),
    ];

    let langs = langs.filter(|l| !l.is_empty());
    if let Some(langs) = langs {
        args.push("--add-header".into());
        args.push(format!("Accept-Language:{}", accept_language(langs)));
        args.push("--sub-langs".into());
        args.push(langs.join(","));
    } else {
        args.push("--sub-langs".into());
        args.push("all".into());
    }

    args.push("--extractor-args".into());
    args.push(format!("youtube:player_client={}", profile));

    if let Some(cookie_file) = cookie_file {
        args.push("--cookies".into());
        args.push(cookie_file.to_string_lossy().into_owned());
    }

    args.push("--".into());
    args.push(url_or_id.into());
    args
}

/// `Accept-Language` value weighting the first three wanted languages equally
fn accept_language(langs: &[String]) -> String {
    langs
        .iter()
        .take(3)
        .map(|l| format!("{};q=1.0", l))
        .collect::<Vec<_>>()
        .join(",")
}

/// Language code from a `<title>-<id>.<lang>.<ext>` file name
fn language_from_filename(filename: &str) -> String {
    let parts: Vec<&str> = filename.split('.').collect();
    if parts.len() >= 3 {
        parts[parts.len() - 2].to_string()
    } else {
        "unknown".to_string()
    }
}

/// Reads every file with the format's extension from `dir`, sorted by name
fn collect_subtitle_files(dir: &Path, format: SubtitleFormat) -> Result<Vec<SubtitleFile>, YtDlpError> {
    let suffix = format!(".{}", format.extension());

    let entries = fs::read_dir(dir).map_err(|e| YtDlpError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix))
        })
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| -> Result<SubtitleFile, YtDlpError> {
            let text = fs::read_to_string(&path).map_err(|e| YtDlpError::ReadFailed {
                path: path.clone(),
                source: e,
            })?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            Ok(SubtitleFile {
                lang: language_from_filename(&filename),
                filename,
                text,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_filename() {
        assert_eq!(language_from_filename("My Video-abcdefghijk.en.vtt"), "en");
        assert_eq!(language_from_filename("v1.2 talk-abcdefghijk.zh-Hans.srt"), "zh-Hans");
        assert_eq!(language_from_filename("plain.vtt"), "unknown");
    }

    #[test]
    fn test_accept_language_uses_first_three() {
        let langs: Vec<String> = ["en", "de", "fr", "ja"].iter().map(|s| s.to_string()).collect();
        assert_eq!(accept_language(&langs), "en;q=1.0,de;q=1.0,fr;q=1.0");
    }

    #[test]
    fn test_build_args_with_languages() {
        let langs = vec!["en".to_string(), "de".to_string()];
        let args = build_args(
            "https://youtu.be/abcdefghijk",
            Some(langs.as_slice()),
            SubtitleFormat::Srt,
            Some(Path::new("/tmp/cookies.txt")),
            "mweb",
            Path::new("/tmp/out"),
        );

        let joined = args.join(" ");
        assert!(joined.contains("--sub-format srt"));
        assert!(joined.contains("--sub-langs en,de"));
        assert!(joined.contains("Accept-Language:en;q=1.0,de;q=1.0"));
        assert!(joined.contains("--extractor-args youtube:player_client=mweb"));
        assert!(joined.contains("--cookies /tmp/cookies.txt"));
        assert!(joined.contains("/tmp/out/%(title).80s-%(id)s.%(ext)s"));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abcdefghijk"));
    }

    #[test]
    fn test_build_args_all_languages() {
        let args = build_args(
            "abcdefghijk",
            Some(&[][..]),
            SubtitleFormat::Vtt,
            None,
            "android",
            Path::new("/tmp/out"),
        );

        let joined = args.join(" ");
        assert!(joined.contains("--sub-langs all"));
        assert!(!joined.contains("Accept-Language"));
        assert!(!joined.contains("--cookies"));
    }

    #[test]
    fn test_build_args_escapes_percent_in_directory() {
        let args = build_args(
            "abcdefghijk",
            None,
            SubtitleFormat::Vtt,
            None,
            "android",
            Path::new("/tmp/100%(id)s"),
        );

        let template = &args[args.iter().position(|a| a == "-o").unwrap() + 1];
        assert_eq!(template, "/tmp/100%%(id)s/%(title).80s-%(id)s.%(ext)s");
    }

    #[test]
    fn test_rate_limit_detection() {
        let limited = YtDlpError::CommandFailed {
            code: Some(1),
            stderr: "ERROR: HTTP Error 429: Too Many Requests".to_string(),
        };
        let forbidden = YtDlpError::CommandFailed {
            code: Some(1),
            stderr: "HTTP Error 403: Forbidden".to_string(),
        };
        let other = YtDlpError::CommandFailed {
            code: Some(1),
            stderr: "Video unavailable".to_string(),
        };

        assert!(limited.is_rate_limited());
        assert!(forbidden.is_rate_limited());
        assert!(!other.is_rate_limited());
        assert!(!YtDlpError::NoSubtitles.is_rate_limited());
    }

    #[test]
    fn test_collect_subtitle_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Clip-abcdefghijk.en.vtt"), "WEBVTT\n").unwrap();
        fs::write(dir.path().join("Clip-abcdefghijk.de.vtt"), "WEBVTT\n\nHallo").unwrap();
        fs::write(dir.path().join("Clip-abcdefghijk.en.srt"), "1").unwrap();

        let files = collect_subtitle_files(dir.path(), SubtitleFormat::Vtt).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].lang, "de");
        assert_eq!(files[0].text, "WEBVTT\n\nHallo");
        assert_eq!(files[1].filename, "Clip-abcdefghijk.en.vtt");
    }

    #[test]
    fn test_missing_binary_fails_every_profile() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = YtDlpDownloader::new("/nonexistent/yt-dlp", dir.path())
            .with_pauses(Pauses::none());

        let result = downloader.download_subtitles("abcdefghijk", None, SubtitleFormat::Vtt, None);

        assert!(matches!(result, Err(YtDlpError::SpawnFailed { .. })));
        // Per-attempt output directories are cleaned up
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    mod with_fake_binary {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_binary(dir: &Path, script: &str) -> PathBuf {
            let path = dir.join("fake-yt-dlp");
            fs::write(&path, format!("#!/bin/sh\n{}", script)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_successful_download() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            // Write one subtitle next to the -o template
            let binary = fake_binary(
                bin_dir.path(),
                r#"while [ "$#" -gt 0 ]; do
  if [ "$1" = "-o" ]; then out=$(dirname "$2"); fi
  shift
done
printf 'WEBVTT\n' > "$out/Clip-abcdefghijk.en.vtt"
"#,
            );

            let downloader = YtDlpDownloader::new(binary.to_string_lossy(), work_dir.path())
                .with_pauses(Pauses::none());
            let files = downloader
                .download_subtitles("abcdefghijk", None, SubtitleFormat::Vtt, None)
                .unwrap();

            assert_eq!(files.len(), 1);
            assert_eq!(files[0].lang, "en");
            assert_eq!(files[0].text, "WEBVTT\n");
            assert_eq!(fs::read_dir(work_dir.path()).unwrap().count(), 0);
        }

        #[test]
        fn test_rate_limited_download_tries_every_profile() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let counter = bin_dir.path().join("calls");
            let binary = fake_binary(
                bin_dir.path(),
                &format!(
                    "echo call >> '{}'\necho 'ERROR: HTTP Error 429: Too Many Requests' >&2\nexit 1\n",
                    counter.display()
                ),
            );

            let downloader = YtDlpDownloader::new(binary.to_string_lossy(), work_dir.path())
                .with_pauses(Pauses::none());
            let result = downloader.download_subtitles("abcdefghijk", None, SubtitleFormat::Vtt, None);

            match result {
                Err(e) => assert!(e.is_rate_limited()),
                Ok(files) => panic!("unexpected files: {:?}", files),
            }
            let calls = fs::read_to_string(&counter).unwrap();
            assert_eq!(calls.lines().count(), CLIENT_PROFILES.len());
        }

        #[test]
        fn test_empty_output_reports_no_subtitles() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let binary = fake_binary(bin_dir.path(), "exit 0\n");

            let downloader = YtDlpDownloader::new(binary.to_string_lossy(), work_dir.path())
                .with_pauses(Pauses::none());
            let result = downloader.download_subtitles("abcdefghijk", None, SubtitleFormat::Srt, None);

            assert!(matches!(result, Err(YtDlpError::NoSubtitles)));
        }
    }
}
