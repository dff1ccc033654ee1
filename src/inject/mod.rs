//! Keystroke injection — types the final transcript into the focused window.
//!
//! Injection goes through the clipboard rather than per-character key
//! events: save the current clipboard, set the transcript, simulate the
//! paste shortcut, restore the clipboard.  This survives layouts and
//! characters that raw key simulation mangles.

use arboard::Clipboard;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use thiserror::Error;

// ---------------------------------------------------------------------------
// InjectError
// ---------------------------------------------------------------------------

/// Errors that can surface while typing a transcript.
#[derive(Debug, Error)]
pub enum InjectError {
    /// Could not open or read the system clipboard.
    #[error("cannot access clipboard: {0}")]
    ClipboardAccess(String),

    /// Could not write the transcript into the clipboard.
    #[error("cannot set clipboard: {0}")]
    ClipboardSet(String),

    /// The paste shortcut could not be simulated.
    #[error("key simulation failed: {0}")]
    KeySimulation(String),
}

// ---------------------------------------------------------------------------
// Typist trait
// ---------------------------------------------------------------------------

/// Consumes the final result text.  Blocking; call from a blocking context
/// (`tokio::task::spawn_blocking`).
pub trait Typist: Send + Sync {
    fn type_text(&self, text: &str) -> Result<(), InjectError>;
}

// ---------------------------------------------------------------------------
// ClipboardTypist
// ---------------------------------------------------------------------------

/// Clipboard-paste implementation of [`Typist`].
///
/// `Clipboard` and `Enigo` handles are not `Send` on every platform, so a
/// fresh one is created per call; both are cheap to construct.
pub struct ClipboardTypist;

impl Typist for ClipboardTypist {
    fn type_text(&self, text: &str) -> Result<(), InjectError> {
        if text.is_empty() {
            return Ok(());
        }

        let saved = save_clipboard()?;
        set_clipboard(text)?;
        simulate_paste()?;

        // Give the focused application a moment to read the clipboard
        // before the original content is restored.
        std::thread::sleep(std::time::Duration::from_millis(150));

        if let Err(e) = restore_clipboard(saved) {
            log::warn!("inject: failed to restore clipboard: {e}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Clipboard helpers
// ---------------------------------------------------------------------------

fn open_clipboard() -> Result<Clipboard, InjectError> {
    Clipboard::new().map_err(|e| InjectError::ClipboardAccess(e.to_string()))
}

/// Current clipboard text; `None` when empty or non-text (e.g. an image).
fn save_clipboard() -> Result<Option<String>, InjectError> {
    let mut clipboard = open_clipboard()?;
    Ok(clipboard.get_text().ok())
}

fn set_clipboard(text: &str) -> Result<(), InjectError> {
    let mut clipboard = open_clipboard()?;
    clipboard
        .set_text(text)
        .map_err(|e| InjectError::ClipboardSet(e.to_string()))
}

fn restore_clipboard(saved: Option<String>) -> Result<(), InjectError> {
    match saved {
        Some(text) => set_clipboard(&text),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Paste simulation
// ---------------------------------------------------------------------------

/// Send the OS paste shortcut (⌘V on macOS, Ctrl+V elsewhere) to the
/// focused window.
fn simulate_paste() -> Result<(), InjectError> {
    let mut enigo =
        Enigo::new(&Settings::default()).map_err(|e| InjectError::KeySimulation(e.to_string()))?;

    #[cfg(target_os = "macos")]
    let modifier = Key::Meta;
    #[cfg(not(target_os = "macos"))]
    let modifier = Key::Control;

    enigo
        .key(modifier, Direction::Press)
        .map_err(|e| InjectError::KeySimulation(e.to_string()))?;
    enigo
        .key(Key::Unicode('v'), Direction::Click)
        .map_err(|e| InjectError::KeySimulation(e.to_string()))?;
    enigo
        .key(modifier, Direction::Release)
        .map_err(|e| InjectError::KeySimulation(e.to_string()))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
