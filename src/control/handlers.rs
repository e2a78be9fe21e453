use crate::run_state::RunState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::server::ControlState;

/// `{"state": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateBody {
    pub state: RunState,
}

/// Response to a state write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateChange {
    pub state: RunState,
    pub previous: RunState,
}

/// Handler for reading the current run state
pub async fn get_state_handler(State(state): State<ControlState>) -> impl IntoResponse {
    Json(StateBody {
        state: state.run_state.get(),
    })
}

/// Handler for overwriting the run state.
///
/// Takes `{"state": "..."}` or the raw value as the body. Any value is
/// accepted; unrecognized ones leave the loop idle.
pub async fn put_state_handler(State(state): State<ControlState>, body: String) -> Response {
    let requested = match parse_state_body(&body) {
        Some(requested) => requested,
        None => {
            warn!("Rejected empty state update");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "state value required" })),
            )
                .into_response();
        }
    };

    if !requested.is_known() {
        warn!("Accepting unrecognized run state '{}'", requested);
    }

    let previous = state.run_state.set(requested.clone());
    info!("Run state set via control surface: {} -> {}", previous, requested);

    (
        StatusCode::OK,
        Json(StateChange {
            state: requested,
            previous,
        }),
    )
        .into_response()
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ControlState>) -> impl IntoResponse {
    let components = state.components.snapshot().await;
    let components: serde_json::Map<String, serde_json::Value> = components
        .into_iter()
        .map(|(name, component)| (name, serde_json::json!(format!("{:?}", component))))
        .collect();

    let health_info = serde_json::json!({
        "status": "healthy",
        "state": state.run_state.get(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "components": components,
    });

    (StatusCode::OK, Json(health_info))
}

fn parse_state_body(body: &str) -> Option<RunState> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<StateBody>(trimmed) {
        return Some(parsed.state);
    }

    if let Ok(serde_json::Value::String(raw)) = serde_json::from_str::<serde_json::Value>(trimmed)
    {
        return Some(RunState::from(raw));
    }

    Some(RunState::parse(trimmed))
}
