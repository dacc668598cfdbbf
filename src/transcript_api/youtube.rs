/// YouTube caption track provider implementation.
use super::youtube_types::{PlayerResponse, TimedText};
use super::{CaptionTrack, SelectedTrack, TranscriptError, TranscriptList, TranscriptProvider};
use crate::subtitle_format::Snippet;
use log::debug;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue};
use serde_json::json;
use std::sync::LazyLock;
use std::time::Duration;

static API_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#).expect("api key pattern is valid")
});

static CONSENT_VALUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="v" value="(.*?)""#).expect("consent pattern is valid")
});

const CONSENT_FORM_MARKER: &str = r#"action="https://consent.youtube.com/s""#;
const RECAPTCHA_MARKER: &str = r#"class="g-recaptcha""#;

/// Innertube client identity used for the player request
const INNERTUBE_CLIENT_NAME: &str = "ANDROID";
const INNERTUBE_CLIENT_VERSION: &str = "20.10.38";

/// Caption track provider for YouTube.
///
/// Lists tracks by reading the Innertube API key from the watch page and
/// asking the `player` endpoint for the caption tracklist, the same path the
/// official apps take. Timed text is downloaded in `json3` form.
pub struct YouTubeTranscriptProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YouTubeTranscriptProvider {
    /// Creates a new provider talking to https://www.youtube.com
    pub fn new() -> Result<Self, TranscriptError> {
        Self::with_base_url("https://www.youtube.com")
    }

    /// Creates a provider for a different origin
    pub fn with_base_url(base_url: &str) -> Result<Self, TranscriptError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TranscriptError::RequestError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get_text(&self, url: &str, cookie: Option<&str>) -> Result<String, TranscriptError> {
        let mut request = self.client.get(url);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .map_err(|e| TranscriptError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranscriptError::RequestError(format!(
                "HTTP {} {} for {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown"),
                url
            )));
        }

        response
            .text()
            .map_err(|e| TranscriptError::RequestError(e.to_string()))
    }

    /// Fetches the watch page, accepting the EU consent form once if needed
    fn fetch_watch_html(&self, video_id: &str) -> Result<String, TranscriptError> {
        let url = format!("{}/watch?v={}", self.base_url, video_id);
        let html = self.get_text(&url, None)?;

        if !html.contains(CONSENT_FORM_MARKER) {
            return Ok(html);
        }

        let consent = consent_cookie(&html).ok_or_else(|| {
            TranscriptError::RequestError("Failed to create consent cookie".to_string())
        })?;
        let html = self.get_text(&url, Some(&consent))?;

        if html.contains(CONSENT_FORM_MARKER) {
            return Err(TranscriptError::RequestError(
                "Consent cookie was not accepted".to_string(),
            ));
        }

        Ok(html)
    }

    fn fetch_player(&self, api_key: &str, video_id: &str) -> Result<PlayerResponse, TranscriptError> {
        let url = format!("{}/youtubei/v1/player?key={}", self.base_url, api_key);
        let body = json!({
            "context": {
                "client": {
                    "clientName": INNERTUBE_CLIENT_NAME,
                    "clientVersion": INNERTUBE_CLIENT_VERSION,
                }
            },
            "videoId": video_id,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| TranscriptError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranscriptError::RequestError(format!(
                "HTTP {} from Innertube player",
                response.status().as_u16()
            )));
        }

        response
            .json()
            .map_err(|e| TranscriptError::ParseError(e.to_string()))
    }
}

impl TranscriptProvider for YouTubeTranscriptProvider {
    fn list_transcripts(&self, video_id: &str) -> Result<TranscriptList, TranscriptError> {
        let html = self.fetch_watch_html(video_id)?;
        let api_key = extract_api_key(&html)?;
        debug!("[TranscriptAPI] innertube key found for {}", video_id);

        let player = self.fetch_player(&api_key, video_id)?;
        convert_player_response(video_id, player)
    }

    fn fetch_snippets(&self, selected: &SelectedTrack<'_>) -> Result<Vec<Snippet>, TranscriptError> {
        let url = timed_text_url(&selected.track.base_url, selected.translate_to.as_deref());
        let body = self.get_text(&url, None)?;

        let timed_text: TimedText =
            serde_json::from_str(&body).map_err(|e| TranscriptError::ParseError(e.to_string()))?;

        Ok(convert_timed_text(timed_text))
    }
}

/// Builds the `CONSENT` cookie from the consent form on the watch page
fn consent_cookie(html: &str) -> Option<String> {
    CONSENT_VALUE_PATTERN
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|v| format!("CONSENT=YES+{}", v.as_str()))
}

/// Extracts the Innertube API key embedded in the watch page
fn extract_api_key(html: &str) -> Result<String, TranscriptError> {
    if let Some(key) = API_KEY_PATTERN.captures(html).and_then(|c| c.get(1)) {
        return Ok(key.as_str().to_string());
    }

    if html.contains(RECAPTCHA_MARKER) {
        return Err(TranscriptError::RequestError(
            "YouTube is blocking requests from this IP (captcha)".to_string(),
        ));
    }

    Err(TranscriptError::ParseError(
        "Innertube API key not found in watch page".to_string(),
    ))
}

/// Converts the player response into our track list
fn convert_player_response(
    video_id: &str,
    player: PlayerResponse,
) -> Result<TranscriptList, TranscriptError> {
    if let Some(status) = player.playability_status {
        if status.status != "OK" {
            let reason = status.reason.unwrap_or_default();
            if status.status == "ERROR" || reason.contains("unavailable") {
                return Err(TranscriptError::VideoUnavailable(video_id.to_string()));
            }
            return Err(TranscriptError::VideoUnplayable {
                video_id: video_id.to_string(),
                reason: format!("{} {}", status.status, reason).trim().to_string(),
            });
        }
    }

    let renderer = player
        .captions
        .and_then(|c| c.player_captions_tracklist_renderer)
        .ok_or_else(|| TranscriptError::TranscriptsDisabled(video_id.to_string()))?;

    let raw_tracks = renderer
        .caption_tracks
        .ok_or_else(|| TranscriptError::TranscriptsDisabled(video_id.to_string()))?;

    let tracks = raw_tracks
        .into_iter()
        .map(|raw| CaptionTrack {
            language: raw
                .name
                .map(|n| n.to_plain())
                .unwrap_or_else(|| raw.language_code.clone()),
            is_generated: raw.kind.as_deref() == Some("asr"),
            is_translatable: raw.is_translatable,
            base_url: raw.base_url.replace("&fmt=srv3", ""),
            language_code: raw.language_code,
        })
        .collect();

    Ok(TranscriptList {
        video_id: video_id.to_string(),
        tracks,
        translation_languages: renderer
            .translation_languages
            .into_iter()
            .map(|l| l.language_code)
            .collect(),
    })
}

/// Builds the `json3` timed text URL, optionally translated
fn timed_text_url(base_url: &str, translate_to: Option<&str>) -> String {
    let mut url = format!("{}&fmt=json3", base_url);
    if let Some(lang) = translate_to {
        let encoded = utf8_percent_encode(lang, NON_ALPHANUMERIC);
        url.push_str(&format!("&tlang={}", encoded));
    }
    url
}

/// Converts `json3` events into snippets, dropping events without text
fn convert_timed_text(timed_text: TimedText) -> Vec<Snippet> {
    timed_text
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs?.into_iter().map(|s| s.utf8).collect();
            if text.trim().is_empty() {
                return None;
            }
            Some(Snippet {
                text,
                start: event.t_start_ms as f64 / 1000.0,
                duration: event.d_duration_ms as f64 / 1000.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(json: serde_json::Value) -> PlayerResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_extract_api_key() {
        let html = r#"<script>ytcfg.set({"INNERTUBE_API_KEY": "AIzaSy-abc_123","X":1})</script>"#;
        assert_eq!(extract_api_key(html).unwrap(), "AIzaSy-abc_123");

        assert!(matches!(
            extract_api_key(r#"<div class="g-recaptcha"></div>"#),
            Err(TranscriptError::RequestError(_))
        ));
        assert!(matches!(
            extract_api_key("<html></html>"),
            Err(TranscriptError::ParseError(_))
        ));
    }

    #[test]
    fn test_consent_cookie() {
        let html = r#"<form action="https://consent.youtube.com/s"><input name="v" value="cb.20240101-00-p0"></form>"#;
        assert_eq!(
            consent_cookie(html).as_deref(),
            Some("CONSENT=YES+cb.20240101-00-p0")
        );
        assert_eq!(consent_cookie("<form></form>"), None);
    }

    #[test]
    fn test_convert_player_response() {
        let response = player(serde_json::json!({
            "playabilityStatus": {"status": "OK"},
            "captions": {
                "playerCaptionsTracklistRenderer": {
                    "captionTracks": [
                        {
                            "baseUrl": "https://www.youtube.com/api/timedtext?v=x&lang=en&fmt=srv3",
                            "name": {"runs": [{"text": "English"}]},
                            "languageCode": "en",
                            "isTranslatable": true
                        },
                        {
                            "baseUrl": "https://www.youtube.com/api/timedtext?v=x&lang=de&kind=asr",
                            "name": {"simpleText": "German (auto-generated)"},
                            "languageCode": "de",
                            "kind": "asr"
                        }
                    ],
                    "translationLanguages": [{"languageCode": "fr", "languageName": {"simpleText": "French"}}]
                }
            }
        }));

        let list = convert_player_response("x", response).unwrap();

        assert_eq!(list.tracks.len(), 2);
        assert_eq!(list.tracks[0].language, "English");
        assert_eq!(
            list.tracks[0].base_url,
            "https://www.youtube.com/api/timedtext?v=x&lang=en"
        );
        assert!(list.tracks[0].is_translatable);
        assert!(!list.tracks[0].is_generated);
        assert!(list.tracks[1].is_generated);
        assert_eq!(list.tracks[1].language, "German (auto-generated)");
        assert_eq!(list.translation_languages, vec!["fr"]);
    }

    #[test]
    fn test_missing_captions_means_disabled() {
        let response = player(serde_json::json!({"playabilityStatus": {"status": "OK"}}));
        assert!(matches!(
            convert_player_response("x", response),
            Err(TranscriptError::TranscriptsDisabled(_))
        ));
    }

    #[test]
    fn test_unplayable_statuses() {
        let unavailable = player(serde_json::json!({
            "playabilityStatus": {"status": "ERROR", "reason": "This video is unavailable"}
        }));
        assert!(matches!(
            convert_player_response("x", unavailable),
            Err(TranscriptError::VideoUnavailable(_))
        ));

        let login = player(serde_json::json!({
            "playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": "Sign in to confirm your age"}
        }));
        match convert_player_response("x", login) {
            Err(TranscriptError::VideoUnplayable { reason, .. }) => {
                assert_eq!(reason, "LOGIN_REQUIRED Sign in to confirm your age");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_timed_text_url() {
        assert_eq!(
            timed_text_url("https://x.test/api/timedtext?v=a", None),
            "https://x.test/api/timedtext?v=a&fmt=json3"
        );
        assert_eq!(
            timed_text_url("https://x.test/api/timedtext?v=a", Some("zh-Hans")),
            "https://x.test/api/timedtext?v=a&fmt=json3&tlang=zh%2DHans"
        );
    }

    #[test]
    fn test_convert_timed_text() {
        let timed_text: TimedText = serde_json::from_value(serde_json::json!({
            "events": [
                {"tStartMs": 0, "dDurationMs": 5000},
                {"tStartMs": 1200, "dDurationMs": 2500, "segs": [{"utf8": "Hello "}, {"utf8": "there"}]},
                {"tStartMs": 3700, "segs": [{"utf8": "\n"}]},
                {"tStartMs": 4000, "dDurationMs": 1000, "segs": [{"utf8": "again"}]}
            ]
        }))
        .unwrap();

        let snippets = convert_timed_text(timed_text);

        assert_eq!(
            snippets,
            vec![
                Snippet {
                    text: "Hello there".to_string(),
                    start: 1.2,
                    duration: 2.5
                },
                Snippet {
                    text: "again".to_string(),
                    start: 4.0,
                    duration: 1.0
                },
            ]
        );
    }
}
