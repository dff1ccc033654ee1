//! voxtyper — voice capture to typed text.
//!
//! Press a hotkey (or hit the HTTP API), speak, press again: the recording is
//! transcribed, optionally repaired with on-screen or in-editor context, and
//! typed into the focused window.
//!
//! Module map:
//!
//! * [`task`] — the lifecycle core: single-flight [`task::TaskManager`],
//!   cancelable [`task::TranscribeTask`], bounded [`task::HistoryStore`].
//! * [`audio`] — microphone capture (cpal) and WAV encoding (hound).
//! * [`stt`] — speech-to-text and transcript repair over the OpenAI API.
//! * [`context`] — hint gathering: screen description or editor extraction.
//! * [`inject`] — clipboard-based typing of results into the focused window.
//! * [`hotkey`] — global toggle-key listener.
//! * [`http`] — localhost control surface.
//! * [`config`] — TOML settings.

pub mod audio;
pub mod config;
pub mod context;
pub mod hotkey;
pub mod http;
pub mod inject;
pub mod stt;
pub mod task;
