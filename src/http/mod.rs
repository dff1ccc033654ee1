//! HTTP control surface.
//!
//! A small localhost API mirroring the tray-menu actions so external tools
//! (editor plugins, shell scripts, foot pedals) can drive the lifecycle:
//!
//! | Route               | Method     | Effect                                   |
//! |---------------------|------------|------------------------------------------|
//! | `/`                 | GET        | plain-text index of the endpoints        |
//! | `/start-recording`  | POST       | start a new task, superseding any running|
//! | `/stop-recording`   | POST       | end the recording phase                  |
//! | `/abort-recording`  | POST       | cancel the current task outright         |
//! | `/context`          | GET / POST | read / replace the context annotation    |
//! | `/state`            | GET        | current task phase                       |
//! | `/history`          | GET        | completed results as JSON (audio omitted)|
//! | `/describe-screen`  | GET        | one-off screen description               |
//! | `/editor-context`   | GET        | one-off editor context extraction        |
//!
//! CORS is wide open so browser-based frontends on other origins can call in.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::context::{EditorContextProvider, ScreenDescriber};
use crate::task::{TaskManager, TranscriptionResult};

const INDEX: &str = "\
voxtyper control surface

POST /start-recording   start a new transcribe task
POST /stop-recording    finish recording and transcribe
POST /abort-recording   cancel the current task
GET  /context           read the context annotation
POST /context           replace the context annotation (request body)
GET  /state             current task phase
GET  /history           completed results as JSON
GET  /describe-screen   capture and describe the screen
GET  /editor-context    extract text from the active editor
";

// ---------------------------------------------------------------------------
// HttpState
// ---------------------------------------------------------------------------

/// Shared state handed to every handler.
///
/// The describer and editor provider are held separately from the manager's
/// configured gatherer so the preview endpoints work regardless of which
/// context source is active.
#[derive(Clone)]
pub struct HttpState {
    pub manager: Arc<TaskManager>,
    pub screen: Arc<dyn ScreenDescriber>,
    pub editor: Arc<dyn EditorContextProvider>,
}

// ---------------------------------------------------------------------------
// Router / server
// ---------------------------------------------------------------------------

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/start-recording", post(start_recording))
        .route("/stop-recording", post(stop_recording))
        .route("/abort-recording", post(abort_recording))
        .route("/context", get(get_context).post(set_context))
        .route("/state", get(state_label))
        .route("/history", get(history))
        .route("/describe-screen", get(describe_screen))
        .route("/editor-context", get(editor_context))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve the control surface until the process exits.
pub async fn serve(addr: &str, state: HttpState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("http: listening on {addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> &'static str {
    INDEX
}

async fn start_recording(State(state): State<HttpState>) -> &'static str {
    state.manager.start_new_task();
    "recording started\n"
}

async fn stop_recording(State(state): State<HttpState>) -> &'static str {
    state.manager.stop_recording();
    "recording stopped\n"
}

async fn abort_recording(State(state): State<HttpState>) -> &'static str {
    state.manager.abort();
    "recording aborted\n"
}

async fn get_context(State(state): State<HttpState>) -> String {
    state.manager.context()
}

async fn set_context(State(state): State<HttpState>, body: String) -> &'static str {
    state.manager.set_context(body);
    "context updated\n"
}

async fn state_label(State(state): State<HttpState>) -> &'static str {
    if state.manager.is_busy() {
        "busy"
    } else {
        "idle"
    }
}

async fn history(State(state): State<HttpState>) -> Json<Vec<TranscriptionResult>> {
    Json(state.manager.history())
}

async fn describe_screen(
    State(state): State<HttpState>,
) -> Result<String, (StatusCode, String)> {
    state
        .screen
        .describe(CancellationToken::new())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn editor_context(
    State(state): State<HttpState>,
) -> Result<String, (StatusCode, String)> {
    state
        .editor
        .context(CancellationToken::new())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::context::{ContextError, ContextGatherer, EditorContextProvider, ScreenDescriber};
    use crate::task::transcribe::mocks::{FixedEncoder, ScriptedTranscriber, SignalRecorder};
    use crate::task::{Collaborators, TaskManager, TaskState};

    use super::{router, HttpState};

    struct StubScreen;

    #[async_trait]
    impl ScreenDescriber for StubScreen {
        async fn describe(&self, _cancel: CancellationToken) -> Result<String, ContextError> {
            Ok("a terminal".into())
        }
    }

    struct StubEditor;

    #[async_trait]
    impl EditorContextProvider for StubEditor {
        async fn context(&self, _cancel: CancellationToken) -> Result<String, ContextError> {
            Err(ContextError::Editor("no session".into()))
        }
    }

    fn test_state() -> HttpState {
        let manager = TaskManager::new(
            Collaborators {
                recorder: Arc::new(SignalRecorder),
                encoder: Arc::new(FixedEncoder),
                transcriber: ScriptedTranscriber::new("hello world", None),
                gatherer: ContextGatherer::None,
            },
            100,
        );
        HttpState {
            manager,
            screen: Arc::new(StubScreen),
            editor: Arc::new(StubEditor),
        }
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn index_lists_the_endpoints() {
        let response = router(test_state()).oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("/start-recording"));
        assert!(text.contains("/history"));
    }

    #[tokio::test]
    async fn context_roundtrips_through_the_api() {
        let state = test_state();
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(post("/context", "rust glossary"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.manager.context(), "rust glossary");

        let response = app.oneshot(get("/context")).await.unwrap();
        assert_eq!(body_text(response).await, "rust glossary");
    }

    #[tokio::test]
    async fn start_and_stop_drive_a_full_task() {
        let state = test_state();
        let app = router(state.clone());
        let mut states = state.manager.subscribe_states();
        let mut results = state.manager.subscribe_results();

        let response = app
            .clone()
            .oneshot(post("/start-recording", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(states.recv().await.unwrap(), TaskState::Recording);
        assert_eq!(
            app.clone()
                .oneshot(get("/state"))
                .await
                .map(|r| r.status())
                .unwrap(),
            StatusCode::OK
        );

        let response = app
            .clone()
            .oneshot(post("/stop-recording", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let result = timeout(Duration::from_millis(500), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.original, "hello world");

        let response = app.oneshot(get("/history")).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["original"], "hello world");
        assert!(entries[0].get("audio").is_none());
    }

    #[tokio::test]
    async fn abort_leaves_no_history() {
        let state = test_state();
        let app = router(state.clone());
        let mut states = state.manager.subscribe_states();

        app.clone()
            .oneshot(post("/start-recording", ""))
            .await
            .unwrap();
        assert_eq!(states.recv().await.unwrap(), TaskState::Recording);

        app.clone()
            .oneshot(post("/abort-recording", ""))
            .await
            .unwrap();
        assert_eq!(
            timeout(Duration::from_millis(500), states.recv())
                .await
                .unwrap()
                .unwrap(),
            TaskState::Idle
        );

        let response = app.oneshot(get("/history")).await.unwrap();
        assert_eq!(body_text(response).await, "[]");
    }

    #[tokio::test]
    async fn describe_screen_returns_the_description() {
        let response = router(test_state())
            .oneshot(get("/describe-screen"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "a terminal");
    }

    #[tokio::test]
    async fn editor_context_failure_maps_to_500() {
        let response = router(test_state())
            .oneshot(get("/editor-context"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("no session"));
    }
}
