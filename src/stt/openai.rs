//! OpenAI-backed transcription and repair.
//!
//! `transcribe` posts the WAV blob to `/v1/audio/transcriptions` (Whisper);
//! `repair` is a `/v1/chat/completions` call that rewrites the raw
//! transcript using the gathered context hint.  Both race against the task's
//! cancellation token so an aborted task never waits out a slow request.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::OpenAiSettings;

use super::{SttError, Transcriber};

const REPAIR_SYSTEM_PROMPT: &str = "You are a voice-to-text typing assistant. \
You receive a machine-generated transcription of dictated speech together \
with context describing what the user is currently looking at or working on. \
Rewrite the transcription so that names, phrases and technical terms match \
the context. Preserve the speaker's wording otherwise. Reply with the \
corrected transcription only, no commentary.";

// ---------------------------------------------------------------------------
// OpenAiTranscriber
// ---------------------------------------------------------------------------

/// Talks to an OpenAI-compatible API.
///
/// All connection details come from [`OpenAiSettings`]; the API key may also
/// be supplied through the `OPENAI_API_KEY` environment variable, which takes
/// precedence over the config file.
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    config: OpenAiSettings,
}

impl OpenAiTranscriber {
    pub fn from_config(config: &OpenAiSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn api_key(&self) -> Result<String, SttError> {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                return Ok(key);
            }
        }
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(SttError::MissingApiKey),
        }
    }

    async fn request_transcription(&self, audio: &[u8]) -> Result<String, SttError> {
        let key = self.api_key()?;

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| SttError::Request(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.transcribe_model.clone())
            .text("language", self.config.language.clone())
            .text("temperature", self.config.temperature.to_string());

        let url = format!("{}/v1/audio/transcriptions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SttError::Parse(e.to_string()))?;

        let text = json["text"]
            .as_str()
            .ok_or(SttError::EmptyResponse)?
            .trim()
            .to_string();
        Ok(text)
    }

    async fn request_repair(&self, raw: &str, hint: &str) -> Result<String, SttError> {
        let key = self.api_key()?;

        let user_msg = format!("Context:\n{hint}\n\nTranscription:\n{raw}");
        let body = serde_json::json!({
            "model": self.config.chat_model,
            "messages": [
                { "role": "system", "content": REPAIR_SYSTEM_PROMPT },
                { "role": "user",   "content": user_msg }
            ],
            "temperature": self.config.temperature,
        });

        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SttError::Parse(e.to_string()))?;

        let repaired = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(SttError::EmptyResponse)?
            .trim()
            .to_string();

        if repaired.is_empty() {
            return Err(SttError::EmptyResponse);
        }
        Ok(repaired)
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(
        &self,
        cancel: CancellationToken,
        audio: &[u8],
    ) -> Result<String, SttError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SttError::Cancelled),
            result = self.request_transcription(audio) => result,
        }
    }

    async fn repair(
        &self,
        cancel: CancellationToken,
        raw: &str,
        hint: &str,
    ) -> Result<String, SttError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SttError::Cancelled),
            result = self.request_repair(raw, hint) => result,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
