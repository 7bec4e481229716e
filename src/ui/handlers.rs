//! HTTP API handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::coordinator::{PlaybackCoordinator, ShutdownReport};
use crate::error::CoordinatorError;
use crate::protocol::{CoordinatorStatus, DisplaySlot, FocusChange, PauseReason, SessionStatus};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn error_status(e: &CoordinatorError) -> StatusCode {
    match e {
        CoordinatorError::SessionNotFound(_) | CoordinatorError::UnknownSlot => StatusCode::NOT_FOUND,
        CoordinatorError::ShutdownInProgress
        | CoordinatorError::InvalidFocusTarget { .. }
        | CoordinatorError::IncompleteRegistration { .. } => StatusCode::CONFLICT,
        CoordinatorError::ShutdownTimeout { .. } | CoordinatorError::AllSessionsFailed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

fn reply<T>(result: Result<T, CoordinatorError>) -> ApiResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Err(e) => (error_status(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// Run `f` under the coordinator lock on the blocking pool
///
/// A stop holds the lock for its whole bounded wait, so no handler takes it
/// on an async worker.
async fn locked<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&mut PlaybackCoordinator) -> Result<T, CoordinatorError> + Send + 'static,
    T: Send + 'static,
{
    let coordinator = state.coordinator.clone();
    match tokio::task::spawn_blocking(move || f(&mut coordinator.lock())).await {
        Ok(result) => reply(result),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// Get coordinator status
pub async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<CoordinatorStatus> {
    locked(&state, |c| Ok(c.status())).await
}

/// Get all sessions
pub async fn get_sessions(State(state): State<Arc<AppState>>) -> ApiResult<Vec<SessionStatus>> {
    locked(&state, |c| Ok(c.status().sessions)).await
}

/// Get one session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> ApiResult<SessionStatus> {
    locked(&state, move |c| {
        c.session_status(index)
            .ok_or(CoordinatorError::SessionNotFound(index))
    })
    .await
}

#[derive(serde::Deserialize)]
pub struct FocusRequest {
    pub index: usize,
}

/// Move focus to a session
pub async fn set_focus(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FocusRequest>,
) -> ApiResult<FocusChange> {
    locked(&state, move |c| c.swap_focus(req.index)).await
}

/// A display slot was clicked
pub async fn select_slot(
    State(state): State<Arc<AppState>>,
    Path(slot): Path<String>,
) -> ApiResult<FocusChange> {
    match slot.parse::<DisplaySlot>() {
        Ok(slot) => locked(&state, move |c| c.on_surface_selected(slot)).await,
        Err(e) => reply(Err(e)),
    }
}

#[derive(serde::Deserialize)]
pub struct PauseRequest {
    #[serde(default)]
    pub reason: Option<PauseReason>,
}

/// Pause playback; the body may carry `{ "reason": "interrupt" }`
pub async fn pause(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PauseRequest>, JsonRejection>,
) -> ApiResult<Vec<usize>> {
    let reason = match body {
        Ok(Json(req)) => req.reason.unwrap_or(PauseReason::User),
        Err(JsonRejection::MissingJsonContentType(_)) => PauseReason::User,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.body_text()))),
    };
    locked(&state, move |c| Ok(c.pause_all(reason))).await
}

pub async fn resume(State(state): State<Arc<AppState>>) -> ApiResult<Vec<usize>> {
    locked(&state, |c| Ok(c.resume_all())).await
}

/// Stop every session
pub async fn stop(State(state): State<Arc<AppState>>) -> ApiResult<ShutdownReport> {
    locked(&state, |c| c.stop_all()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::coordinator::{PlaybackCoordinator, SharedCoordinator};
    use crate::engine::testing::{factory, Behavior, Journal};
    use crate::coordinator::CoordinatorEvent;
    use crate::protocol::{SessionState, StreamSet};
    use crate::surface::{HeadlessSurface, RenderSurface};
    use crate::ui::WebServer;
    use axum::body::Body;
    use axum::http::Request;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Weak;
    use tower::ServiceExt;

    fn playing(count: usize) -> (SharedCoordinator, Journal) {
        let streams =
            StreamSet::from_uris((0..count).map(|i| format!("rtsp://cam/{}", i))).unwrap();
        let mut coordinator = PlaybackCoordinator::new(&AppConfig::default(), streams);
        let journal = Journal::new();
        for _ in 0..count {
            let none: Weak<dyn RenderSurface> = Weak::<HeadlessSurface>::new();
            coordinator.register(factory(&journal, Behavior::responsive()), none).unwrap();
        }
        coordinator.open_all().unwrap();
        for i in 0..count {
            coordinator.notify_ready(i).unwrap();
        }
        (Arc::new(Mutex::new(coordinator)), journal)
    }

    async fn call(server: &WebServer, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = server.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_status_and_sessions() {
        let (coordinator, _journal) = playing(3);
        let server = WebServer::new(AppConfig::default().ui, coordinator);

        let (status, body) = call(&server, "GET", "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["phase"], "playing");
        assert_eq!(body["data"]["focused"], 0);
        assert_eq!(body["data"]["sessions"].as_array().unwrap().len(), 3);

        let (status, body) = call(&server, "GET", "/api/sessions/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["uri"], "rtsp://cam/2");
        assert_eq!(body["data"]["state"], "playing");

        let (status, body) = call(&server, "GET", "/api/sessions/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_focus_and_slot_selection() {
        let (coordinator, _journal) = playing(3);
        let server = WebServer::new(AppConfig::default().ui, coordinator.clone());

        let (status, body) = call(&server, "POST", "/api/focus", Some(serde_json::json!({ "index": 2 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["result"], "moved");
        assert_eq!(coordinator.lock().focused(), Some(2));

        let (status, body) = call(&server, "POST", "/api/slots/primary/select", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["result"], "unchanged");

        let (status, _) = call(&server, "POST", "/api/slots/bogus/select", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pause_resume_stop() {
        let (coordinator, journal) = playing(2);
        let server = WebServer::new(AppConfig::default().ui, coordinator.clone());

        let (_, body) = call(&server, "POST", "/api/pause", None).await;
        assert_eq!(body["data"], serde_json::json!([0, 1]));
        let (_, body) = call(&server, "POST", "/api/resume", None).await;
        assert_eq!(body["data"], serde_json::json!([0, 1]));

        let (status, body) = call(&server, "POST", "/api/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["requested"], serde_json::json!([0, 1]));
        assert_eq!(journal.count(0, &crate::engine::testing::Call::RequestStop), 1);

        let (status, _) = call(&server, "POST", "/api/focus", Some(serde_json::json!({ "index": 1 }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_pause_with_interrupt_reason() {
        let (coordinator, _journal) = playing(2);
        let mut events = coordinator.lock().subscribe();
        let server = WebServer::new(AppConfig::default().ui, coordinator.clone());

        let (status, _) = call(&server, "POST", "/api/pause", Some(serde_json::json!({ "reason": "bogus" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            call(&server, "POST", "/api/pause", Some(serde_json::json!({ "reason": "interrupt" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], serde_json::json!([0, 1]));

        let mut reasons = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CoordinatorEvent::Paused { reason, .. } = event {
                reasons.push(reason);
            }
        }
        assert_eq!(reasons, vec![PauseReason::Interrupt]);
        assert_eq!(coordinator.lock().status().sessions[1].state, SessionState::Paused);
    }

    #[tokio::test]
    async fn test_handlers_wait_out_a_held_lock() {
        let (coordinator, _journal) = playing(2);
        let server = WebServer::new(AppConfig::default().ui, coordinator.clone());

        let guard = coordinator.lock();
        let request = tokio::spawn(async move { call(&server, "GET", "/api/status", None).await });
        // The runtime stays free to run other tasks while the handler is blocked
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!request.is_finished());
        drop(guard);

        let (status, body) = request.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["phase"], "playing");
    }
}
