//! Follow-up retrieval for deferred commands

use crate::error::{LogisticsError, Result};
use crate::services::followups::FollowupState;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

/// GET /followups/:ticket
///
/// `202` while the command is still running, then the command's own reply.
pub async fn get_followup(State(state): State<AppState>, Path(ticket): Path<Uuid>) -> Result<Response> {
    match state.followups.get(ticket).await {
        Some(FollowupState::Pending) => {
            Ok((StatusCode::ACCEPTED, Json(json!({"state": "pending", "ticket": ticket}))).into_response())
        }
        Some(FollowupState::Done(reply)) => Ok(reply.into_response()),
        None => Err(LogisticsError::not_found("follow-up", ticket.to_string())),
    }
}

pub fn followup_routes() -> Router<AppState> {
    Router::new().route("/followups/:ticket", get(get_followup))
}
