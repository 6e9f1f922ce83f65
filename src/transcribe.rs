use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Result, TelopError};

const GLADIA_URL: &str = "https://api.gladia.io/v2";
const SERVICE: &str = "Gladia transcription";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub words: Vec<Word>,
}

/// Timestamped speech-to-text output: utterance segments plus the flat word list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionResult {
    pub segments: Vec<TranscriptSegment>,
    pub words: Vec<Word>,
}

impl TranscriptionResult {
    pub fn from_segments(segments: Vec<TranscriptSegment>) -> Self {
        let words = segments.iter().flat_map(|s| s.words.clone()).collect();
        Self { segments, words }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The flat word list, rebuilt from the segments when only those were stored.
    pub fn all_words(&self) -> Vec<Word> {
        if self.words.is_empty() {
            self.segments.iter().flat_map(|s| s.words.clone()).collect()
        } else {
            self.words.clone()
        }
    }

    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    audio_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: String,
    #[serde(default)]
    result: Option<PollResult>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PollResult {
    transcription: PollTranscription,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PollTranscription {
    utterances: Vec<TranscriptSegment>,
}

/// `Some` once the job is done, `None` while it is still queued or processing.
fn interpret_poll(response: PollResponse) -> Result<Option<TranscriptionResult>> {
    match response.status.as_str() {
        "done" => {
            let utterances = response
                .result
                .map(|r| r.transcription.utterances)
                .unwrap_or_default();
            let segments = utterances
                .into_iter()
                .map(|u| TranscriptSegment {
                    text: u.text.trim().to_string(),
                    ..u
                })
                .collect();
            Ok(Some(TranscriptionResult::from_segments(segments)))
        }
        "error" => {
            let reason = response
                .error
                .map(|e| match e {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "unknown error".to_string());
            Err(TelopError::collaborator(SERVICE, reason))
        }
        _ => Ok(None),
    }
}

fn transport(e: reqwest::Error) -> TelopError {
    TelopError::collaborator(SERVICE, e.to_string())
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}

pub struct Gladia {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    max_attempts: u32,
}

impl Gladia {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: GLADIA_URL.to_string(),
            client: reqwest::Client::new(),
            poll_interval: Duration::from_secs(3),
            max_attempts: 60,
        }
    }

    pub async fn upload(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        info!("Uploading {} ({}) to Gladia", filename, mime_for(path));

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str(mime_for(path))
            .map_err(transport)?;
        let res: UploadResponse = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header("x-gladia-key", &self.api_key)
            .multipart(Form::new().part("audio", part))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;
        res.audio_url
            .ok_or_else(|| TelopError::collaborator(SERVICE, "upload response had no audio_url"))
    }

    pub async fn submit(&self, audio_url: &str, language: &str) -> Result<String> {
        let res: SubmitResponse = self
            .client
            .post(format!("{}/pre-recorded", self.base_url))
            .header("x-gladia-key", &self.api_key)
            .json(&json!({
                "audio_url": audio_url,
                "language_config": { "languages": [language] },
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;
        res.id
            .ok_or_else(|| TelopError::collaborator(SERVICE, "submit response had no id"))
    }

    pub async fn poll(&self, id: &str) -> Result<TranscriptionResult> {
        let url = format!("{}/pre-recorded/{}", self.base_url, id);
        for attempt in 1..=self.max_attempts {
            let response = self
                .client
                .get(&url)
                .header("x-gladia-key", &self.api_key)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            let parsed = match response {
                Ok(r) => r.json::<PollResponse>().await,
                Err(e) => Err(e),
            };
            match parsed {
                Ok(body) => {
                    debug!("Poll {}/{}: status = {}", attempt, self.max_attempts, body.status);
                    if let Some(result) = interpret_poll(body)? {
                        info!(
                            "Transcription finished: {} segments, {} words",
                            result.segments.len(),
                            result.words.len()
                        );
                        return Ok(result);
                    }
                }
                Err(e) => warn!("Poll {}/{} failed, retrying: {}", attempt, self.max_attempts, e),
            }
            sleep(self.poll_interval).await;
        }
        Err(TelopError::collaborator(
            SERVICE,
            format!("no result after {} polls", self.max_attempts),
        ))
    }

    pub async fn transcribe_file(&self, path: &Path, language: &str) -> Result<TranscriptionResult> {
        let audio_url = self.upload(path).await?;
        let id = self.submit(&audio_url, language).await?;
        self.poll(&id).await
    }
}
