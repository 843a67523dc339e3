//! HTTP surface: webhook intake, direct join, liveness.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tracing::{error, warn};

use crate::supervisor::{Supervisor, SupervisorError};
use crate::webhook;

/// Shared handler state.
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub api_key: String,
    pub api_secret: String,
}

/// Builds the application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook", post(receive_webhook))
        .route("/join/{room}", post(join_room))
        .with_state(state)
}

/// `GET /` — liveness.
async fn health() -> &'static str {
    "OK"
}

/// `POST /webhook` — SFU-signed event intake.
///
/// Always answers 200: webhooks are fire-and-forget from the SFU's
/// perspective and a non-2xx only earns a redelivery of the same
/// payload.
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match webhook::receive(&body, auth, &state.api_key, &state.api_secret) {
        Ok(event) => state.supervisor.on_webhook(event).await,
        Err(e) => warn!(error = %e, "error receiving webhook event"),
    }
    StatusCode::OK
}

/// `POST /join/{room}` — explicit agent creation.
async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> impl IntoResponse {
    match state.supervisor.join_room(&room).await {
        Ok(()) => (StatusCode::OK, "Success"),
        Err(SupervisorError::RoomNotFound(_)) => (StatusCode::NOT_FOUND, "Room not found"),
        Err(e) => {
            error!(room = %room, error = %e, "join failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
