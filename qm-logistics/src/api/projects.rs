//! Project commands: create, status, requirements, status report

use super::deferred::{reply_within, reply_within_as};
use super::{AutocompleteQuery, BulkText};
use crate::db::projects::{self, Project, Requirement};
use crate::db::snapshot;
use crate::error::{LogisticsError, Result};
use crate::services::aggregation::compute_report;
use crate::validate::whole_number;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use qm_common::db::{GuildId, ProjectStatus};
use qm_common::events::LogisticsEvent;
use qm_common::time::now;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RequirementRequest {
    pub item: String,
    pub amount: serde_json::Number,
}

#[derive(Debug, Serialize)]
pub struct RequirementResponse {
    pub project: Project,
    pub requirement: Requirement,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub project: String,
    pub text: String,
}

/// POST /guilds/:guild/projects
pub async fn create_project(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Json(request): Json<CreateProjectRequest>,
) -> Response {
    let db = state.db.clone();
    reply_within_as(&state, "project_create", StatusCode::CREATED, async move {
        projects::create_project(&db, guild_id, &request.name).await
    })
    .await
}

/// GET /guilds/:guild/projects/autocomplete?q=
///
/// Answered inline; suggestions have no follow-up channel.
pub async fn autocomplete(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Query(query): Query<AutocompleteQuery>,
) -> Result<Json<Vec<String>>> {
    let names = projects::autocomplete_projects(&state.db, guild_id, &query.q).await?;
    Ok(Json(names))
}

/// PUT /guilds/:guild/projects/:project/status
pub async fn set_status(
    State(state): State<AppState>,
    Path((guild_id, project)): Path<(GuildId, String)>,
    Json(request): Json<SetStatusRequest>,
) -> Response {
    let task_state = state.clone();
    reply_within(&state, "project_set_status", async move {
        let status: ProjectStatus = request.status.parse()?;
        let project = projects::set_status(&task_state.db, guild_id, &project, status).await?;

        task_state.after_mutation(LogisticsEvent::ProjectStatusChanged {
            guild_id,
            project_id: project.id,
            status,
            timestamp: now(),
        });
        Ok::<_, LogisticsError>(project)
    })
    .await
}

/// PUT /guilds/:guild/projects/:project/requirements
///
/// Replaces the target if the item is already required.
pub async fn add_item(
    State(state): State<AppState>,
    Path((guild_id, project)): Path<(GuildId, String)>,
    Json(request): Json<RequirementRequest>,
) -> Response {
    let task_state = state.clone();
    reply_within(&state, "project_add_item", async move {
        let amount = whole_number("target amount", &request.amount)?;
        let (project, requirement) =
            projects::add_requirement(&task_state.db, guild_id, &project, &request.item, amount).await?;

        task_state.after_mutation(LogisticsEvent::RequirementsChanged {
            guild_id,
            project_id: project.id,
            timestamp: now(),
        });
        Ok::<_, LogisticsError>(RequirementResponse { project, requirement })
    })
    .await
}

/// POST /guilds/:guild/projects/:project/requirements/bulk
pub async fn bulk_edit(
    State(state): State<AppState>,
    Path((guild_id, project)): Path<(GuildId, String)>,
    Json(request): Json<BulkText>,
) -> Response {
    let task_state = state.clone();
    reply_within(&state, "project_item_bulk_edit", async move {
        let (project, outcome) =
            projects::bulk_requirements(&task_state.db, guild_id, &project, &request.text).await?;

        if !outcome.applied.is_empty() {
            task_state.after_mutation(LogisticsEvent::RequirementsChanged {
                guild_id,
                project_id: project.id,
                timestamp: now(),
            });
        }
        outcome.into_result()
    })
    .await
}

/// GET /guilds/:guild/projects/:project/requirements/export
pub async fn export(
    State(state): State<AppState>,
    Path((guild_id, project)): Path<(GuildId, String)>,
) -> Response {
    let db = state.db.clone();
    reply_within(&state, "project_item_export", async move {
        let (project, text) = projects::export_requirements(&db, guild_id, &project).await?;
        Ok::<_, LogisticsError>(ExportResponse {
            project: project.name,
            text,
        })
    })
    .await
}

/// GET /guilds/:guild/projects/:project/status
pub async fn status(
    State(state): State<AppState>,
    Path((guild_id, project)): Path<(GuildId, String)>,
) -> Response {
    let db = state.db.clone();
    reply_within(&state, "status", async move {
        let snapshot = snapshot::load_project(&db, guild_id, &project).await?;
        Ok::<_, LogisticsError>(compute_report(&snapshot))
    })
    .await
}

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/guilds/:guild/projects", post(create_project))
        .route("/guilds/:guild/projects/autocomplete", get(autocomplete))
        .route("/guilds/:guild/projects/:project/status", put(set_status).get(status))
        .route("/guilds/:guild/projects/:project/requirements", put(add_item))
        .route("/guilds/:guild/projects/:project/requirements/bulk", post(bulk_edit))
        .route("/guilds/:guild/projects/:project/requirements/export", get(export))
}
