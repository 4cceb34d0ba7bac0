//! Read-only item lookups: autocomplete, holders, production

use super::deferred::reply_within;
use crate::db::items;
use crate::db::ledger;
use crate::db::snapshot;
use crate::error::{LogisticsError, Result};
use crate::services::production::production_report;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use qm_common::db::{GuildId, OwnerId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ItemAutocompleteQuery {
    #[serde(default)]
    pub q: String,
    pub guild: Option<GuildId>,
    /// Restrict to items this member holds (withdraw, set)
    pub owner: Option<OwnerId>,
}

/// GET /items/autocomplete?q=&guild=&owner=
///
/// Answered inline, like project autocomplete.
pub async fn item_autocomplete(
    State(state): State<AppState>,
    Query(query): Query<ItemAutocompleteQuery>,
) -> Result<Json<Vec<String>>> {
    let names = match (query.guild, query.owner) {
        (Some(guild_id), Some(owner_id)) => {
            items::autocomplete_owner_items(&state.db, guild_id, owner_id, &query.q).await?
        }
        _ => items::autocomplete_items(&state.db, &query.q).await?,
    };
    Ok(Json(names))
}

/// GET /guilds/:guild/items/:item/holders
pub async fn locate(
    State(state): State<AppState>,
    Path((guild_id, item)): Path<(GuildId, String)>,
) -> Response {
    let db = state.db.clone();
    reply_within(&state, "locate", async move { ledger::locate(&db, guild_id, &item).await }).await
}

/// GET /guilds/:guild/items/:item/production
pub async fn production(
    State(state): State<AppState>,
    Path((guild_id, item)): Path<(GuildId, String)>,
) -> Response {
    let db = state.db.clone();
    reply_within(&state, "production", async move {
        let snapshot = snapshot::load_production(&db, guild_id, &item).await?;
        Ok::<_, LogisticsError>(production_report(snapshot))
    })
    .await
}

pub fn lookup_routes() -> Router<AppState> {
    Router::new()
        .route("/items/autocomplete", get(item_autocomplete))
        .route("/guilds/:guild/items/:item/holders", get(locate))
        .route("/guilds/:guild/items/:item/production", get(production))
}
