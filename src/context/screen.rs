//! Screen-description context source.
//!
//! Captures a screenshot with an external capture command, then asks a
//! vision-capable chat endpoint for a one-sentence description of what the
//! user is engaging with plus the salient keywords visible on screen.

use async_trait::async_trait;
use base64::Engine as _;
use tokio_util::sync::CancellationToken;

use crate::config::{OpenAiSettings, ScreenSettings};

use super::{ContextError, ScreenDescriber};

const DESCRIBE_SYSTEM_PROMPT: &str = "You are a voice-to-text typing assistant \
who is collecting text on the user's current screen so that a machine \
generated transcription can be edited to match any phrases appearing on the \
screen. Include a 1 sentence description of what the user is engaging with. \
Then list out all relevant keywords/names/words that appear in the provided \
image so that the transcription may be corrected.";

// ---------------------------------------------------------------------------
// VisionScreenDescriber
// ---------------------------------------------------------------------------

/// Screenshots the display and describes it through the vision model.
pub struct VisionScreenDescriber {
    client: reqwest::Client,
    openai: OpenAiSettings,
    capture_command: Vec<String>,
}

impl VisionScreenDescriber {
    pub fn from_config(openai: &OpenAiSettings, screen: &ScreenSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(openai.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            openai: openai.clone(),
            capture_command: screen.capture_command.clone(),
        }
    }

    fn api_key(&self) -> Result<String, ContextError> {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                return Ok(key);
            }
        }
        match self.openai.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(ContextError::MissingApiKey),
        }
    }

    /// Run the capture command against a temp file and read the PNG back.
    /// The temp file is removed when the guard drops.
    async fn take_screenshot(&self) -> Result<Vec<u8>, ContextError> {
        let (program, args) = self
            .capture_command
            .split_first()
            .ok_or_else(|| ContextError::Capture("capture command is empty".into()))?;

        let file = tempfile::Builder::new()
            .prefix("voxtyper-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| ContextError::Capture(e.to_string()))?;

        let status = tokio::process::Command::new(program)
            .args(args)
            .arg(file.path())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| ContextError::Capture(format!("{program}: {e}")))?;

        if !status.success() {
            return Err(ContextError::Capture(format!(
                "{program} exited with {status}"
            )));
        }

        tokio::fs::read(file.path())
            .await
            .map_err(|e| ContextError::Capture(e.to_string()))
    }

    async fn describe_image(&self, png: &[u8]) -> Result<String, ContextError> {
        let key = self.api_key()?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(png);
        let image_url = format!("data:image/png;base64,{encoded}");

        let body = serde_json::json!({
            "model": self.openai.vision_model,
            "messages": [
                { "role": "system", "content": DESCRIBE_SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "image_url", "image_url": { "url": image_url } }
                    ]
                }
            ],
        });

        let url = format!("{}/v1/chat/completions", self.openai.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ContextError::Describe(e.to_string()))?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ContextError::Describe(e.to_string()))?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ContextError::Describe("empty description".into()))
    }

    async fn capture_and_describe(&self) -> Result<String, ContextError> {
        let png = self.take_screenshot().await?;
        let description = self.describe_image(&png).await?;
        log::info!("context: screen description: {description}");
        Ok(format!(
            "{description}\n\nPlease use this information about the user's \
             screen to aid in transcribing the audio."
        ))
    }
}

#[async_trait]
impl ScreenDescriber for VisionScreenDescriber {
    async fn describe(&self, cancel: CancellationToken) -> Result<String, ContextError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ContextError::Cancelled),
            result = self.capture_and_describe() => result,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
