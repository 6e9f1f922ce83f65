use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{Result, TelopError};

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub speaker: u32,
    pub speed: f32,
    /// Scales the pauses the engine inserts at punctuation (0.0 to 2.0).
    pub pause_scale: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            speaker: 3,
            speed: 1.0,
            pause_scale: 1.0,
        }
    }
}

pub const DEFAULT_STYLE: &str = "ノーマル";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeakerStyle {
    pub name: String,
    pub id: u32,
}

/// One voice from the engine's `/speakers` listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Speaker {
    pub name: String,
    #[serde(default)]
    pub styles: Vec<SpeakerStyle>,
}

pub fn find_speaker_id(speakers: &[Speaker], name: &str, style: &str) -> Option<u32> {
    speakers
        .iter()
        .filter(|s| s.name == name)
        .flat_map(|s| &s.styles)
        .find(|st| st.name == style)
        .map(|st| st.id)
}

/// Turns one line of text into a WAV container.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>>;
}

/// VOICEVOX engine over its HTTP API.
pub struct Voicevox {
    base_url: String,
    client: reqwest::Client,
}

impl Voicevox {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn speakers(&self) -> Result<Vec<Speaker>> {
        self.client
            .get(format!("{}/speakers", self.base_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TelopError::collaborator("VOICEVOX speakers", e.to_string()))?
            .json()
            .await
            .map_err(|e| TelopError::collaborator("VOICEVOX speakers", e.to_string()))
    }

    /// Style id for a speaker name, e.g. ("ずんだもん", "ノーマル").
    pub async fn resolve_speaker(&self, name: &str, style: &str) -> Result<u32> {
        let speakers = self.speakers().await?;
        match find_speaker_id(&speakers, name, style) {
            Some(id) => {
                info!("Speaker {} / {} is style id {}", name, style, id);
                Ok(id)
            }
            None => Err(unknown_speaker(&speakers, name, style)),
        }
    }

    async fn audio_query(&self, text: &str, speaker: u32) -> Result<Value> {
        let speaker = speaker.to_string();
        let query = self
            .client
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TelopError::collaborator("VOICEVOX audio_query", e.to_string()))?
            .json::<Value>()
            .await
            .map_err(|e| TelopError::collaborator("VOICEVOX audio_query", e.to_string()))?;
        Ok(query)
    }
}

fn unknown_speaker(speakers: &[Speaker], name: &str, style: &str) -> TelopError {
    let known = match speakers.iter().find(|s| s.name == name) {
        Some(speaker) => speaker
            .styles
            .iter()
            .map(|st| st.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        None => speakers
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };
    TelopError::Input(format!(
        "no VOICEVOX voice {} / {} (available: {})",
        name, style, known
    ))
}

fn apply_voice(query: &mut Value, voice: &VoiceSettings) -> Result<()> {
    let obj = query.as_object_mut().ok_or_else(|| {
        TelopError::collaborator("VOICEVOX audio_query", "response is not a JSON object")
    })?;
    obj.insert("speedScale".into(), Value::from(voice.speed));
    obj.insert("pauseLengthScale".into(), Value::from(voice.pause_scale));
    obj.insert("outputStereo".into(), Value::Bool(true));
    Ok(())
}

#[async_trait]
impl SpeechSynthesizer for Voicevox {
    fn name(&self) -> &'static str {
        "VOICEVOX"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>> {
        debug!("Synthesizing with speaker {}: {}", voice.speaker, text);
        let mut query = self.audio_query(text, voice.speaker).await?;
        apply_voice(&mut query, voice)?;

        let bytes = self
            .client
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", voice.speaker)])
            .json(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TelopError::collaborator("VOICEVOX synthesis", e.to_string()))?
            .bytes()
            .await
            .map_err(|e| TelopError::collaborator("VOICEVOX synthesis", e.to_string()))?;

        if bytes.is_empty() {
            error!("VOICEVOX returned no audio for: {}", text);
            return Err(TelopError::collaborator("VOICEVOX synthesis", "empty audio payload"));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn voice_settings_are_written_into_the_query() {
        let mut query = json!({"accent_phrases": [], "speedScale": 1.0});
        apply_voice(
            &mut query,
            &VoiceSettings {
                speaker: 1,
                speed: 1.25,
                pause_scale: 0.5,
            },
        )
        .unwrap();
        assert_eq!(query["speedScale"], json!(1.25));
        assert_eq!(query["pauseLengthScale"], json!(0.5));
        assert_eq!(query["outputStereo"], json!(true));
        assert_eq!(query["accent_phrases"], json!([]));
    }

    #[test]
    fn non_object_query_is_a_collaborator_error() {
        let mut query = json!([1, 2, 3]);
        let err = apply_voice(&mut query, &VoiceSettings::default()).unwrap_err();
        assert!(matches!(err, TelopError::Collaborator { .. }));
    }

    fn speakers() -> Vec<Speaker> {
        serde_json::from_value(json!([
            {"name": "四国めたん", "speaker_uuid": "7ffcb7ce", "version": "0.14.1", "styles": [
                {"name": "ノーマル", "id": 2, "type": "talk"},
                {"name": "あまあま", "id": 0, "type": "talk"}
            ]},
            {"name": "ずんだもん", "speaker_uuid": "388f246b", "styles": [
                {"name": "ノーマル", "id": 3},
                {"name": "ささやき", "id": 22}
            ]}
        ]))
        .unwrap()
    }

    #[test]
    fn speakers_are_found_by_name_and_style() {
        let speakers = speakers();
        assert_eq!(find_speaker_id(&speakers, "ずんだもん", DEFAULT_STYLE), Some(3));
        assert_eq!(find_speaker_id(&speakers, "ずんだもん", "ささやき"), Some(22));
        assert_eq!(find_speaker_id(&speakers, "四国めたん", "あまあま"), Some(0));
        assert_eq!(find_speaker_id(&speakers, "四国めたん", "ささやき"), None);
        assert_eq!(find_speaker_id(&speakers, "春日部つむぎ", DEFAULT_STYLE), None);
    }

    #[test]
    fn unknown_voices_list_what_is_available() {
        let speakers = speakers();
        match unknown_speaker(&speakers, "春日部つむぎ", DEFAULT_STYLE) {
            TelopError::Input(msg) => assert!(msg.contains("四国めたん, ずんだもん"), "{}", msg),
            other => panic!("unexpected error {:?}", other),
        }
        match unknown_speaker(&speakers, "ずんだもん", "あまあま") {
            TelopError::Input(msg) => assert!(msg.contains("ノーマル, ささやき"), "{}", msg),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_engine_is_a_collaborator_error() {
        let err = Voicevox::new("http://127.0.0.1:9")
            .resolve_speaker("ずんだもん", DEFAULT_STYLE)
            .await
            .unwrap_err();
        assert!(matches!(err, TelopError::Collaborator { .. }), "{:?}", err);
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(Voicevox::new("http://localhost:50021/").base_url, "http://localhost:50021");
    }
}
