//! Ledger commands: deposit, withdraw, set, bulk paste, snapshots, wipe
//!
//! The `{owner}` path segment is the member whose rows change. For the member
//! commands it is the caller; the admin variants target someone else through
//! the same routes, permission checks belonging to the interaction layer.

use super::deferred::reply_within;
use super::BulkText;
use crate::db::ledger::{self, Holding, LedgerChange};
use crate::error::LogisticsError;
use crate::services::bulk::format_export;
use crate::validate::whole_number;
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use qm_common::db::{GuildId, OwnerId};
use qm_common::events::LogisticsEvent;
use qm_common::time::now;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Phrase `wipe_all_user_stock` must receive verbatim
pub const WIPE_CONFIRMATION: &str = "DELETE EVERYTHING";

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub item: String,
    pub amount: serde_json::Number,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub item: String,
    pub quantity: serde_json::Number,
}

#[derive(Debug, Deserialize)]
pub struct WipeRequest {
    pub confirm: String,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub owner_id: OwnerId,
    pub items: Vec<Holding>,
}

#[derive(Debug, Serialize)]
pub struct StockExportResponse {
    pub owner_id: OwnerId,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct WipeResponse {
    pub removed: u64,
}

fn ledger_changed(state: &AppState, guild_id: GuildId, owner_id: OwnerId, change: &LedgerChange) {
    state.after_mutation(LogisticsEvent::LedgerChanged {
        guild_id,
        owner_id,
        item_id: change.item.id,
        timestamp: now(),
    });
}

/// POST /guilds/:guild/members/:owner/deposit
pub async fn deposit(
    State(state): State<AppState>,
    Path((guild_id, owner_id)): Path<(GuildId, OwnerId)>,
    Json(request): Json<AmountRequest>,
) -> Response {
    let task_state = state.clone();
    reply_within(&state, "deposit", async move {
        let amount = whole_number("amount", &request.amount)?;
        let change = ledger::deposit(&task_state.db, guild_id, owner_id, &request.item, amount).await?;

        ledger_changed(&task_state, guild_id, owner_id, &change);
        Ok::<_, LogisticsError>(change)
    })
    .await
}

/// POST /guilds/:guild/members/:owner/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Path((guild_id, owner_id)): Path<(GuildId, OwnerId)>,
    Json(request): Json<AmountRequest>,
) -> Response {
    let task_state = state.clone();
    reply_within(&state, "withdraw_item", async move {
        let amount = whole_number("amount", &request.amount)?;
        let change = ledger::withdraw(&task_state.db, guild_id, owner_id, &request.item, amount).await?;

        ledger_changed(&task_state, guild_id, owner_id, &change);
        Ok::<_, LogisticsError>(change)
    })
    .await
}

/// PUT /guilds/:guild/members/:owner/stock
pub async fn modify_quantity(
    State(state): State<AppState>,
    Path((guild_id, owner_id)): Path<(GuildId, OwnerId)>,
    Json(request): Json<QuantityRequest>,
) -> Response {
    let task_state = state.clone();
    reply_within(&state, "modify_item_qty", async move {
        let quantity = whole_number("quantity", &request.quantity)?;
        let change =
            ledger::set_quantity(&task_state.db, guild_id, owner_id, &request.item, quantity).await?;

        ledger_changed(&task_state, guild_id, owner_id, &change);
        Ok::<_, LogisticsError>(change)
    })
    .await
}

/// POST /guilds/:guild/members/:owner/stock/bulk
pub async fn update_stock(
    State(state): State<AppState>,
    Path((guild_id, owner_id)): Path<(GuildId, OwnerId)>,
    Json(request): Json<BulkText>,
) -> Response {
    let task_state = state.clone();
    reply_within(&state, "update_stock", async move {
        let outcome = ledger::bulk_set(&task_state.db, guild_id, owner_id, &request.text).await?;

        if !outcome.applied.is_empty() {
            task_state.after_mutation(LogisticsEvent::LedgerBatchApplied {
                guild_id,
                owner_id,
                applied: outcome.applied.len(),
                timestamp: now(),
            });
        }
        outcome.into_result()
    })
    .await
}

/// GET /guilds/:guild/members/:owner/stock
pub async fn my_stock(
    State(state): State<AppState>,
    Path((guild_id, owner_id)): Path<(GuildId, OwnerId)>,
) -> Response {
    let db = state.db.clone();
    reply_within(&state, "my_stock", async move {
        let items = ledger::owner_snapshot(&db, guild_id, owner_id).await?;
        Ok::<_, LogisticsError>(StockResponse { owner_id, items })
    })
    .await
}

/// GET /guilds/:guild/members/:owner/stock/export
pub async fn my_stock_export(
    State(state): State<AppState>,
    Path((guild_id, owner_id)): Path<(GuildId, OwnerId)>,
) -> Response {
    let db = state.db.clone();
    reply_within(&state, "my_stock_export", async move {
        let items = ledger::owner_snapshot(&db, guild_id, owner_id).await?;
        let text = format_export(items.iter().map(|h| (h.item.as_str(), h.quantity)));
        Ok::<_, LogisticsError>(StockExportResponse { owner_id, text })
    })
    .await
}

/// DELETE /guilds/:guild/stock
pub async fn wipe_all(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Json(request): Json<WipeRequest>,
) -> Response {
    if request.confirm != WIPE_CONFIRMATION {
        return LogisticsError::InvalidInput(format!(
            "type '{}' exactly to confirm",
            WIPE_CONFIRMATION
        ))
        .into_response();
    }

    let task_state = state.clone();
    reply_within(&state, "wipe_all_user_stock", async move {
        let removed = ledger::wipe_guild(&task_state.db, guild_id).await?;
        warn!("All member stock of guild {} wiped ({} entries)", guild_id, removed);

        task_state.after_mutation(LogisticsEvent::LedgerWiped {
            guild_id,
            timestamp: now(),
        });
        Ok::<_, LogisticsError>(WipeResponse { removed })
    })
    .await
}

pub fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/guilds/:guild/members/:owner/deposit", post(deposit))
        .route("/guilds/:guild/members/:owner/withdraw", post(withdraw))
        .route("/guilds/:guild/members/:owner/stock", get(my_stock).put(modify_quantity))
        .route("/guilds/:guild/members/:owner/stock/bulk", post(update_stock))
        .route("/guilds/:guild/members/:owner/stock/export", get(my_stock_export))
        .route("/guilds/:guild/stock", delete(wipe_all))
}
