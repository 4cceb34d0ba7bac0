//! `dashboard_set`

use super::deferred::reply_within;
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::Response,
    routing::post,
    Json, Router,
};
use qm_common::db::{ChannelId, GuildId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DashboardRequest {
    pub project: String,
    /// Where to post if the guild has no live message yet
    pub channel_id: ChannelId,
}

/// POST /guilds/:guild/dashboard
pub async fn dashboard_set(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Json(request): Json<DashboardRequest>,
) -> Response {
    let dashboard = state.dashboard.clone();
    reply_within(&state, "dashboard_set", async move {
        dashboard.bind(guild_id, request.channel_id, &request.project).await
    })
    .await
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/guilds/:guild/dashboard", post(dashboard_set))
}
