//! Subtitle rendering module
//!
//! Timed snippets from the transcript API are rendered locally into SRT or
//! WebVTT text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output format for rendered subtitles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    /// SubRip (`.srt`)
    Srt,
    /// WebVTT (`.vtt`)
    Vtt,
}

impl SubtitleFormat {
    /// Parses a user-supplied format name
    ///
    /// Only `srt` (case-insensitive) selects SRT; every other value falls back
    /// to WebVTT.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("srt") {
            SubtitleFormat::Srt
        } else {
            SubtitleFormat::Vtt
        }
    }

    /// File extension without the dot
    pub fn extension(self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Vtt => "vtt",
        }
    }

    /// Content type used for storage uploads
    pub fn content_type(self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "text/plain",
            SubtitleFormat::Vtt => "text/vtt",
        }
    }

    /// Renders snippets in this format
    pub fn render(self, snippets: &[Snippet]) -> String {
        match self {
            SubtitleFormat::Srt => to_srt(snippets),
            SubtitleFormat::Vtt => to_vtt(snippets),
        }
    }
}

impl fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A single timed line of a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    /// Caption text, possibly spanning several lines
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// Display duration in seconds
    #[serde(default)]
    pub duration: f64,
}

impl Snippet {
    /// End time in seconds
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Caption text collapsed onto a single line
    fn single_line_text(&self) -> String {
        self.text.replace('\n', " ").trim().to_string()
    }
}

/// Splits seconds into hours, minutes, seconds and milliseconds
fn split_timestamp(seconds: f64) -> (u64, u64, u64, u64) {
    if seconds.is_nan() || seconds.is_infinite() || seconds < 0.0 {
        return (0, 0, 0, 0);
    }

    let whole = seconds.trunc();
    let millis = (((seconds - whole) * 1000.0).round() as u64).min(999);
    let whole = whole as u64;

    (whole / 3600, (whole % 3600) / 60, whole % 60, millis)
}

/// Formats a timestamp as `HH:MM:SS,mmm`
pub fn format_srt_time(seconds: f64) -> String {
    let (h, m, s, ms) = split_timestamp(seconds);
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Formats a timestamp as `HH:MM:SS.mmm`
pub fn format_vtt_time(seconds: f64) -> String {
    let (h, m, s, ms) = split_timestamp(seconds);
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

/// Renders snippets as SubRip text
pub fn to_srt(snippets: &[Snippet]) -> String {
    let mut lines = Vec::with_capacity(snippets.len() * 4);

    for (index, snippet) in snippets.iter().enumerate() {
        lines.push((index + 1).to_string());
        lines.push(format!(
            "{} --> {}",
            format_srt_time(snippet.start),
            format_srt_time(snippet.end())
        ));
        lines.push(snippet.single_line_text());
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Renders snippets as WebVTT text
pub fn to_vtt(snippets: &[Snippet]) -> String {
    let mut lines = vec!["WEBVTT".to_string(), String::new()];

    for snippet in snippets {
        lines.push(format!(
            "{} --> {}",
            format_vtt_time(snippet.start),
            format_vtt_time(snippet.end())
        ));
        lines.push(snippet.single_line_text());
        lines.push(String::new());
    }

    lines.join("\n")
}

/// A rendered subtitle file for a single language
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleFile {
    /// Language code the subtitles are in
    pub lang: String,
    /// File name used for storage uploads and in the response
    pub filename: String,
    /// Full subtitle text in the requested format
    pub text: String,
}

/// The outcome of a subtitle source: the files it produced plus the
/// language codes it saw while listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedSubtitles {
    pub files: Vec<SubtitleFile>,
    /// Sorted, unique language codes advertised for the video
    pub languages_meta: Vec<String>,
}
