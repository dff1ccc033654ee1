//! Application settings, defaults and TOML persistence.
//!
//! Every struct implements `Serialize`, `Deserialize`, `Default` and `Clone`
//! so settings can be round-tripped through the config file and shared across
//! threads.  All fields carry `#[serde(default)]` so a partial config file
//! loads cleanly.

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use super::ConfigPaths;

// ---------------------------------------------------------------------------
// ContextSource
// ---------------------------------------------------------------------------

/// Which context-gathering strategy runs alongside each recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    /// No context gathering; transcripts are never repaired unless a manual
    /// context annotation is set.
    #[default]
    None,
    /// Screenshot the display and describe it with the vision model.
    Screen,
    /// Extract viewport / cursor-adjacent text from a running editor.
    Editor,
}

// ---------------------------------------------------------------------------
// OpenAiSettings
// ---------------------------------------------------------------------------

/// Connection settings for the OpenAI-compatible API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    /// API key; the `OPENAI_API_KEY` environment variable takes precedence.
    pub api_key: Option<String>,
    /// Base URL of the API endpoint.
    pub base_url: String,
    /// Model for the speech-to-text pass.
    pub transcribe_model: String,
    /// Model for the repair pass.
    pub chat_model: String,
    /// Model for screen description.
    pub vision_model: String,
    /// Speech language as an ISO-639-1 code.
    pub language: String,
    /// Sampling temperature for transcription and repair.
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".into(),
            transcribe_model: "whisper-1".into(),
            chat_model: "gpt-4o-mini".into(),
            vision_model: "gpt-4o".into(),
            language: "en".into(),
            temperature: 0.5,
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContextSettings {
    pub source: ContextSource,
}

/// Capture device and recording duration bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Input device name; `None` means the system default.
    pub device: Option<String>,
    /// Recordings shorter than this are discarded as accidental taps.
    pub min_record_secs: f32,
    /// Hard ceiling; recording is cancelled when it is reached.
    pub max_record_secs: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: None,
            min_record_secs: 1.0,
            max_record_secs: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Bind address of the control surface.
    pub listen_address: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:9898".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeySettings {
    /// Toggle key name, e.g. `"F9"`.
    pub key: String,
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self { key: "F9".into() }
    }
}

/// External command used to capture a screenshot; the output path is
/// appended as the last argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenSettings {
    pub capture_command: Vec<String>,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            capture_command: vec!["scrot".into(), "--overwrite".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingSettings {
    /// Whether completed results are typed into the focused window.
    pub enabled: bool,
}

impl Default for TypingSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Root settings object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of completed results retained in history.
    pub history_limit: usize,
    pub openai: OpenAiSettings,
    pub context: ContextSettings,
    pub audio: AudioSettings,
    pub http: HttpSettings,
    pub hotkey: HotkeySettings,
    pub screen: ScreenSettings,
    pub typing: TypingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_limit: 100,
            openai: OpenAiSettings::default(),
            context: ContextSettings::default(),
            audio: AudioSettings::default(),
            http: HttpSettings::default(),
            hotkey: HotkeySettings::default(),
            screen: ScreenSettings::default(),
            typing: TypingSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from the config file.  On first run the defaults are
    /// written to disk so the user has a file to edit.
    pub fn load() -> Result<Self> {
        let paths = ConfigPaths::new();
        if !paths.config_file.exists() {
            log::info!(
                "config: no file at {}, writing defaults",
                paths.config_file.display()
            );
            let settings = Self::default();
            settings.save()?;
            return Ok(settings);
        }

        let settings = Self::read_from(&paths.config_file)?;
        log::info!("config: loaded {}", paths.config_file.display());
        Ok(settings)
    }

    /// Write settings to the config file, creating the directory if needed.
    pub fn save(&self) -> Result<()> {
        let paths = ConfigPaths::new();
        self.write_to(&paths.config_dir, &paths.config_file)?;
        log::info!("config: wrote {}", paths.config_file.display());
        Ok(())
    }

    fn read_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    fn write_to(&self, dir: &Path, file: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let raw = toml::to_string_pretty(self).context("serializing settings")?;
        std::fs::write(file, raw).with_context(|| format!("writing {}", file.display()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
