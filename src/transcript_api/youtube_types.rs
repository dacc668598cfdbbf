/// YouTube Innertube and timed text response types for deserialization.
///
/// These structures mirror only the parts of the JSON responses we read.
use serde::Deserialize;

/// The response of the Innertube `player` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PlayerResponse {
    pub playability_status: Option<PlayabilityStatus>,
    pub captions: Option<Captions>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PlayabilityStatus {
    /// `OK`, `ERROR`, `LOGIN_REQUIRED`, `UNPLAYABLE`, ...
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Captions {
    pub player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TracklistRenderer {
    pub caption_tracks: Option<Vec<RawCaptionTrack>>,
    #[serde(default)]
    pub translation_languages: Vec<TranslationLanguage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawCaptionTrack {
    pub base_url: String,
    pub name: Option<Text>,
    pub language_code: String,
    /// `asr` for speech recognition tracks
    pub kind: Option<String>,
    #[serde(default)]
    pub is_translatable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TranslationLanguage {
    pub language_code: String,
}

/// Innertube text, either a plain string or a list of runs
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Text {
    pub simple_text: Option<String>,
    #[serde(default)]
    pub runs: Vec<TextRun>,
}

impl Text {
    pub fn to_plain(&self) -> String {
        match &self.simple_text {
            Some(text) => text.clone(),
            None => self.runs.iter().map(|r| r.text.as_str()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TextRun {
    pub text: String,
}

/// Timed text in `json3` form.
#[derive(Debug, Deserialize)]
pub(super) struct TimedText {
    #[serde(default)]
    pub events: Vec<TimedTextEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TimedTextEvent {
    #[serde(default)]
    pub t_start_ms: u64,
    #[serde(default)]
    pub d_duration_ms: u64,
    /// Missing on window/style events that carry no text
    pub segs: Option<Vec<TimedTextSegment>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TimedTextSegment {
    #[serde(default)]
    pub utf8: String,
}
