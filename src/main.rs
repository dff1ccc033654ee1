//! Application entry point — voxtyper.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`Settings`] from disk (defaults on first run).
//! 3. Build the collaborators: cpal recorder, WAV encoder, OpenAI
//!    transcriber, and the configured context gatherer.
//! 4. Create the [`TaskManager`].
//! 5. Spawn the typing worker (subscribes to completed results).
//! 6. Spawn the hotkey listener thread and its toggle-forwarding worker.
//! 7. Serve the HTTP control surface — blocks until the process exits.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use voxtyper::{
    audio::{CpalRecorder, WavEncoder},
    config::{ContextSource, Settings},
    context::{
        ContextGatherer, EditorContextProvider, NvimContextProvider, ScreenDescriber,
        VisionScreenDescriber,
    },
    hotkey::{parse_key, HotkeyEvent, HotkeyListener},
    http::{self, HttpState},
    inject::{ClipboardTypist, Typist},
    stt::OpenAiTranscriber,
    task::{Collaborators, TaskManager},
};

// ---------------------------------------------------------------------------
// Typing worker
// ---------------------------------------------------------------------------

/// Forwards every completed result to the typist.
///
/// Clipboard and key simulation are blocking, so each result is typed on the
/// blocking pool.  A lagged subscription skips the missed results rather than
/// typing stale text.
async fn run_typing_worker(manager: Arc<TaskManager>, typist: Arc<dyn Typist>) {
    let mut results = manager.subscribe_results();
    loop {
        match results.recv().await {
            Ok(result) => {
                let typist = Arc::clone(&typist);
                let text = result.text().to_string();
                let typed = tokio::task::spawn_blocking(move || typist.type_text(&text)).await;
                match typed {
                    Ok(Ok(())) => log::info!("inject: typed result {}", result.id),
                    Ok(Err(e)) => log::warn!("inject: typing failed: {e}"),
                    Err(e) => log::error!("inject: typing task panicked: {e}"),
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("inject: lagged behind, skipped {n} results");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voxtyper starting up");

    // 2. Configuration
    let settings = Settings::load().unwrap_or_else(|e| {
        log::warn!("failed to load config ({e}); using defaults");
        Settings::default()
    });

    // 3. Collaborators
    let screen: Arc<dyn ScreenDescriber> = Arc::new(VisionScreenDescriber::from_config(
        &settings.openai,
        &settings.screen,
    ));
    let editor: Arc<dyn EditorContextProvider> = Arc::new(NvimContextProvider::new());

    let gatherer = match settings.context.source {
        ContextSource::None => ContextGatherer::None,
        ContextSource::Screen => ContextGatherer::Screen(Arc::clone(&screen)),
        ContextSource::Editor => ContextGatherer::Editor(Arc::clone(&editor)),
    };
    log::info!("context source: {:?}", settings.context.source);

    let collab = Collaborators {
        recorder: Arc::new(CpalRecorder::from_config(&settings.audio)),
        encoder: Arc::new(WavEncoder),
        transcriber: Arc::new(OpenAiTranscriber::from_config(&settings.openai)),
        gatherer,
    };

    // 4. Task manager
    let manager = TaskManager::new(collab, settings.history_limit);

    // Phase transitions at info level, for following along in the journal.
    {
        let mut states = manager.subscribe_states();
        tokio::spawn(async move {
            loop {
                match states.recv().await {
                    Ok(state) => log::info!("task: {}", state.label()),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // 5. Typing worker
    if settings.typing.enabled {
        tokio::spawn(run_typing_worker(
            Arc::clone(&manager),
            Arc::new(ClipboardTypist),
        ));
    } else {
        log::info!("inject: typing disabled by config");
    }

    // 6. Hotkey
    let (hotkey_tx, mut hotkey_rx) = mpsc::channel::<HotkeyEvent>(16);
    let hotkey_key = parse_key(&settings.hotkey.key).unwrap_or_else(|| {
        log::warn!("unknown hotkey {:?}, falling back to F9", settings.hotkey.key);
        rdev::Key::F9
    });
    let _hotkey = HotkeyListener::start(hotkey_key, hotkey_tx);
    {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            while let Some(HotkeyEvent::Toggle) = hotkey_rx.recv().await {
                log::debug!("hotkey: toggle");
                manager.start_or_stop_task();
            }
        });
    }

    // 7. HTTP control surface (blocks)
    http::serve(
        &settings.http.listen_address,
        HttpState {
            manager,
            screen,
            editor,
        },
    )
    .await
}
