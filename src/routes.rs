//! HTTP surface: Slack Events API receiver and a health check.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::channels::SlackAdapter;
use crate::ticket::TicketOutcome;

/// Shared state for the intake routes.
#[derive(Clone)]
pub struct IntakeRouteState {
    /// `None` when Slack is not configured.
    pub slack: Option<Arc<SlackAdapter>>,
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "omnichannel-intake"}))
}

/// POST /slack/events
///
/// Accepts the Events API envelope (`url_verification`, `event_callback`)
/// or a bare message event.
async fn slack_events(
    State(state): State<IntakeRouteState>,
    Json(payload): Json<Value>,
) -> Response {
    let kind = payload.get("type").and_then(Value::as_str);

    if kind == Some("url_verification") {
        let challenge = payload.get("challenge").cloned().unwrap_or(Value::Null);
        return Json(json!({"challenge": challenge})).into_response();
    }

    let Some(adapter) = state.slack else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": "Slack channel is not configured"})),
        )
            .into_response();
    };

    let (event, event_id) = if kind == Some("event_callback") {
        let event_id = payload
            .get("event_id")
            .and_then(Value::as_str)
            .map(String::from);
        let event = payload.get("event").cloned().unwrap_or(Value::Null);
        (event, event_id)
    } else {
        (payload, None)
    };

    match adapter.handle_incoming_event(event, event_id.as_deref()).await {
        TicketOutcome::Created(draft) => {
            Json(json!({"status": "created", "ticket": draft})).into_response()
        }
        TicketOutcome::Skipped(reason) => {
            Json(json!({"status": "skipped", "reason": reason.label()})).into_response()
        }
        TicketOutcome::Failed(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "Error processing Slack message"})),
        )
            .into_response(),
    }
}

/// Build the intake routes.
pub fn intake_routes(state: IntakeRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(slack_events))
        .with_state(state)
}
