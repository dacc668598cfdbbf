//! YouTube video id extraction

use regex::Regex;
use std::sync::LazyLock;

/// Matches the id after the common URL markers, or a bare 11-character id.
static VIDEO_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtu\.be/|v=|shorts/|live/|embed/)([A-Za-z0-9_-]{11})|^([A-Za-z0-9_-]{11})$")
        .expect("video id pattern is valid")
});

/// Extracts the video id from a YouTube URL or a bare id
///
/// Recognises `youtu.be/<id>`, `watch?v=<id>`, `/shorts/<id>`, `/live/<id>`
/// and `/embed/<id>`. Input that matches none of these is returned trimmed
/// but otherwise unchanged, so downstream fetchers can still try it.
///
/// # Examples
///
/// ```
/// use fetch_subtitles::parse_video_id;
///
/// assert_eq!(parse_video_id("https://youtu.be/dQw4w9WgXcQ?t=3"), "dQw4w9WgXcQ");
/// assert_eq!(parse_video_id("  dQw4w9WgXcQ "), "dQw4w9WgXcQ");
/// ```
pub fn parse_video_id(url_or_id: &str) -> String {
    let input = url_or_id.trim();

    VIDEO_ID_PATTERN
        .captures(input)
        .and_then(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| input.to_string())
}
