//! Transcript retrieval from YouTube's own caption tracks.
//!
//! This is the primary subtitle source: caption tracks are listed for a video,
//! the wanted languages are picked (translating when allowed), and the timed
//! text is rendered locally into SRT or WebVTT.
mod youtube;
mod youtube_types;

pub use youtube::YouTubeTranscriptProvider;

use crate::subtitle_format::{FetchedSubtitles, Snippet, SubtitleFile, SubtitleFormat};
use log::info;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur while retrieving transcripts.
#[derive(Debug, Error)]
pub enum TranscriptError {
    /// The video has captions switched off
    #[error("Subtitles are disabled for video {0}")]
    TranscriptsDisabled(String),

    /// None of the requested languages has a caption track
    #[error("No transcript found for video {video_id} in languages {requested:?}")]
    NoTranscriptFound {
        video_id: String,
        requested: Vec<String>,
    },

    /// The video does not exist or was removed
    #[error("Video {0} is unavailable")]
    VideoUnavailable(String),

    /// The video exists but cannot be played (age gate, bot check, region lock)
    #[error("Video {video_id} is unplayable: {reason}")]
    VideoUnplayable { video_id: String, reason: String },

    /// Request to YouTube failed
    #[error("Request failed: {0}")]
    RequestError(String),

    /// YouTube answered with something we could not understand
    #[error("Failed to parse YouTube response: {0}")]
    ParseError(String),
}

impl TranscriptError {
    /// Whether this is one of the expected "no subtitles here" outcomes
    /// rather than an operational failure
    pub fn is_known(&self) -> bool {
        matches!(
            self,
            TranscriptError::TranscriptsDisabled(_)
                | TranscriptError::NoTranscriptFound { .. }
                | TranscriptError::VideoUnavailable(_)
        )
    }
}

/// A caption track advertised for a video.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    /// Language code, e.g. `en` or `zh-Hans`
    pub language_code: String,
    /// Human readable language name
    pub language: String,
    /// Whether the track was generated by speech recognition
    pub is_generated: bool,
    /// Whether YouTube can machine-translate this track
    pub is_translatable: bool,
    /// Timed text URL for this track
    pub base_url: String,
}

/// All caption tracks of a video together with the languages YouTube can
/// translate them into.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptList {
    pub video_id: String,
    pub tracks: Vec<CaptionTrack>,
    pub translation_languages: Vec<String>,
}

/// A track selected for download, optionally translated
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedTrack<'a> {
    pub track: &'a CaptionTrack,
    /// Target language when YouTube should translate the track
    pub translate_to: Option<String>,
}

impl TranscriptList {
    /// Sorted, unique language codes of all tracks
    pub fn language_codes(&self) -> Vec<String> {
        self.tracks
            .iter()
            .map(|t| t.language_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Finds the track for `lang`, preferring manually created tracks over
    /// generated ones
    pub fn find_transcript(&self, lang: &str) -> Result<&CaptionTrack, TranscriptError> {
        let matching = || self.tracks.iter().filter(|t| t.language_code == lang);

        matching()
            .find(|t| !t.is_generated)
            .or_else(|| matching().next())
            .ok_or_else(|| TranscriptError::NoTranscriptFound {
                video_id: self.video_id.clone(),
                requested: vec![lang.to_string()],
            })
    }

    /// Picks the track to download for `lang`
    ///
    /// Falls back to translating the first translatable track when
    /// `translate_missing` is set and YouTube offers `lang` as a target.
    pub fn select(&self, lang: &str, translate_missing: bool) -> Option<SelectedTrack<'_>> {
        if let Ok(track) = self.find_transcript(lang) {
            return Some(SelectedTrack {
                track,
                translate_to: None,
            });
        }

        if !translate_missing || !self.translation_languages.iter().any(|l| l == lang) {
            return None;
        }

        self.tracks
            .iter()
            .find(|t| t.is_translatable)
            .map(|track| SelectedTrack {
                track,
                translate_to: Some(lang.to_string()),
            })
    }
}

/// Trait for sources of timed transcripts.
///
/// Implementors talk to the remote service; the selection and rendering logic
/// lives in [`fetch_transcripts`] so it is shared by every implementation.
pub trait TranscriptProvider: Send + Sync {
    /// Lists the caption tracks of a video
    fn list_transcripts(&self, video_id: &str) -> Result<TranscriptList, TranscriptError>;

    /// Downloads the timed text of a selected track
    fn fetch_snippets(&self, selected: &SelectedTrack<'_>) -> Result<Vec<Snippet>, TranscriptError>;
}

/// Fetches and renders transcripts for the wanted languages
///
/// When `langs` is `None` or empty every listed language is fetched.
/// Languages without a usable track are skipped; a download failure of a
/// selected track aborts the whole fetch.
pub fn fetch_transcripts<P>(
    provider: &P,
    video_id: &str,
    langs: Option<&[String]>,
    format: SubtitleFormat,
    translate_missing: bool,
) -> Result<FetchedSubtitles, TranscriptError>
where
    P: TranscriptProvider + ?Sized,
{
    let list = provider.list_transcripts(video_id)?;
    let languages_meta = list.language_codes();

    let wanted: Vec<String> = match langs {
        Some(langs) if !langs.is_empty() => langs.to_vec(),
        _ => languages_meta.clone(),
    };

    let mut files = Vec::new();
    for lang in &wanted {
        let Some(selected) = list.select(lang, translate_missing) else {
            info!("[TranscriptAPI:list] No transcript for {}", lang);
            continue;
        };

        info!(
            "[TranscriptAPI:list] {}: {} track \"{}\"{}",
            lang,
            if selected.track.is_generated { "generated" } else { "manual" },
            selected.track.language,
            selected
                .translate_to
                .as_deref()
                .map(|to| format!(" translated to {}", to))
                .unwrap_or_default()
        );

        let snippets = provider.fetch_snippets(&selected)?;
        files.push(SubtitleFile {
            lang: lang.clone(),
            filename: format!("{}.{}.{}", video_id, lang, format.extension()),
            text: format.render(&snippets),
        });
    }

    Ok(FetchedSubtitles {
        files,
        languages_meta,
    })
}
