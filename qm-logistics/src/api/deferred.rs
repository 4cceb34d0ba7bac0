//! Acknowledge-then-follow-up replies
//!
//! Every command that touches storage goes through here, since a writer queued
//! behind the SQLite lock can wait longer than the acknowledgement deadline.
//! The work runs on its own task. If it finishes within the deadline the
//! caller gets the reply directly; otherwise `202 Accepted` with a ticket, and
//! the reply lands in the follow-up store when the task ends.

use crate::error::{LogisticsError, Result};
use crate::services::followups::StoredReply;
use crate::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use tokio::task::JoinError;
use tracing::{error, info};

/// Run `work`, answering `200 OK` directly or with a follow-up ticket
pub async fn reply_within<T, F>(state: &AppState, command: &'static str, work: F) -> Response
where
    T: Serialize + Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    reply_within_as(state, command, StatusCode::OK, work).await
}

/// Same as [`reply_within`] with `success` as the status of a successful reply
pub async fn reply_within_as<T, F>(
    state: &AppState,
    command: &'static str,
    success: StatusCode,
    work: F,
) -> Response
where
    T: Serialize + Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let mut handle = tokio::spawn(work);

    match tokio::time::timeout(state.ack_deadline, &mut handle).await {
        Ok(joined) => stored_reply(joined, success).into_response(),
        Err(_) => {
            let ticket = state.followups.open(command).await;
            info!(
                "{} exceeded {:?}, acknowledged with follow-up {}",
                command, state.ack_deadline, ticket
            );

            let followups = state.followups.clone();
            tokio::spawn(async move {
                let reply = stored_reply(handle.await, success);
                followups.complete(ticket, reply).await;
            });

            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "state": "pending",
                    "ticket": ticket,
                    "followup": format!("/followups/{}", ticket),
                })),
            )
                .into_response()
        }
    }
}

/// Reply of a finished command in the shape it is sent or parked
pub fn stored_reply<T: Serialize>(
    joined: std::result::Result<Result<T>, JoinError>,
    success: StatusCode,
) -> StoredReply {
    let result = joined.unwrap_or_else(|e| {
        error!("Command task failed: {}", e);
        Err(LogisticsError::Internal("command did not finish".to_string()))
    });

    match result.and_then(|value| {
        serde_json::to_value(value).map_err(|e| LogisticsError::Internal(e.to_string()))
    }) {
        Ok(body) => StoredReply {
            http_status: success.as_u16(),
            body,
        },
        Err(e) => StoredReply {
            http_status: e.status().as_u16(),
            body: e.to_body(),
        },
    }
}

impl IntoResponse for StoredReply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}
