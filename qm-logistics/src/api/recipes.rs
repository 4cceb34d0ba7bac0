//! Recipe commands

use super::deferred::{reply_within, reply_within_as};
use crate::db::items::Item;
use crate::db::recipes::{self, RecipeEdge};
use crate::error::LogisticsError;
use crate::validate::whole_number;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{delete, post},
    Json, Router,
};
use qm_common::events::LogisticsEvent;
use qm_common::time::now;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RecipeRequest {
    pub output: String,
    pub input: String,
    pub ratio: serde_json::Number,
}

#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub output: Item,
    pub edge: RecipeEdge,
}

/// POST /recipes
pub async fn add_recipe(State(state): State<AppState>, Json(request): Json<RecipeRequest>) -> Response {
    let task_state = state.clone();
    reply_within_as(&state, "recipe_add", StatusCode::CREATED, async move {
        let ratio = whole_number("ratio", &request.ratio)?;
        let (output, edge) =
            recipes::add_recipe(&task_state.db, &request.output, &request.input, ratio).await?;

        task_state.after_mutation(LogisticsEvent::RecipesChanged {
            output_item_id: output.id,
            timestamp: now(),
        });
        Ok::<_, LogisticsError>(RecipeResponse { output, edge })
    })
    .await
}

/// DELETE /recipes/:output/:input
pub async fn remove_recipe(
    State(state): State<AppState>,
    Path((output, input)): Path<(String, String)>,
) -> Response {
    let task_state = state.clone();
    reply_within(&state, "recipe_remove", async move {
        let output = recipes::remove_recipe(&task_state.db, &output, &input).await?;

        task_state.after_mutation(LogisticsEvent::RecipesChanged {
            output_item_id: output.id,
            timestamp: now(),
        });
        Ok::<_, LogisticsError>(output)
    })
    .await
}

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", post(add_recipe))
        .route("/recipes/:output/:input", delete(remove_recipe))
}
