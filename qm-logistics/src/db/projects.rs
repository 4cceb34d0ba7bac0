//! Projects and their requirement lines
//!
//! Project names are unique per guild (case-insensitive). Requirements are
//! keyed by (project, item); adding an existing pair replaces the target.

use super::items::{contains_pattern, ensure_item, AUTOCOMPLETE_LIMIT};
use crate::error::{LogisticsError, Result};
use crate::services::bulk::{format_export, parse_bulk, AppliedLine, BatchOutcome, LineFailure, QuantityRule};
use crate::validate::{clean_name, positive_amount};
use qm_common::db::{GuildId, ItemId, ProjectId, ProjectStatus};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;

/// Project row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub guild_id: GuildId,
    pub name: String,
    pub status: ProjectStatus,
}

/// One requirement line of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub item_id: ItemId,
    pub item: String,
    pub target_amount: i64,
}

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Project> {
    let status: String = row.get("status");
    Ok(Project {
        id: row.get("id"),
        guild_id: row.get("guild_id"),
        name: row.get("name"),
        status: status.parse()?,
    })
}

/// Create an active project; fails with `DuplicateName` if the guild has one by that name
pub async fn create_project(pool: &SqlitePool, guild_id: GuildId, name: &str) -> Result<Project> {
    let name = clean_name("project", name)?;

    let mut tx = pool.begin().await?;
    let inserted: Option<ProjectId> = sqlx::query_scalar(
        r#"
        INSERT INTO projects (guild_id, name, status) VALUES (?, ?, 'active')
        ON CONFLICT (guild_id, name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(guild_id)
    .bind(&name)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(id) = inserted else {
        let existing = require_project(&mut tx, guild_id, &name).await?;
        return Err(LogisticsError::duplicate("project", existing.name));
    };
    tx.commit().await?;

    info!("Project created: guild {} '{}' (id {})", guild_id, name, id);

    Ok(Project {
        id,
        guild_id,
        name,
        status: ProjectStatus::Active,
    })
}

/// Case-insensitive lookup within a guild
pub async fn find_project(
    conn: &mut SqliteConnection,
    guild_id: GuildId,
    name: &str,
) -> Result<Option<Project>> {
    let row = sqlx::query("SELECT id, guild_id, name, status FROM projects WHERE guild_id = ? AND name = ?")
        .bind(guild_id)
        .bind(name.trim())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(project_from_row).transpose()
}

/// Lookup that fails with `NotFound`
pub async fn require_project(conn: &mut SqliteConnection, guild_id: GuildId, name: &str) -> Result<Project> {
    find_project(conn, guild_id, name)
        .await?
        .ok_or_else(|| LogisticsError::not_found("project", name.trim()))
}

/// Lookup by surrogate key
pub async fn project_by_id(conn: &mut SqliteConnection, id: ProjectId) -> Result<Option<Project>> {
    let row = sqlx::query("SELECT id, guild_id, name, status FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(project_from_row).transpose()
}

/// Explicit lifecycle transition; returns the updated project
pub async fn set_status(
    pool: &SqlitePool,
    guild_id: GuildId,
    name: &str,
    status: ProjectStatus,
) -> Result<Project> {
    let mut tx = pool.begin().await?;
    let project = require_project(&mut tx, guild_id, name).await?;

    sqlx::query("UPDATE projects SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(project.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("Project '{}' (guild {}) is now {}", project.name, guild_id, status);
    Ok(Project { status, ..project })
}

/// Upsert-replace one requirement: an existing (project, item) pair gets the new target
pub async fn add_requirement(
    pool: &SqlitePool,
    guild_id: GuildId,
    project: &str,
    item: &str,
    target_amount: i64,
) -> Result<(Project, Requirement)> {
    let target_amount = positive_amount("target amount", target_amount)?;
    clean_name("item", item)?;

    let mut tx = pool.begin().await?;
    let project = require_project(&mut tx, guild_id, project).await?;
    let requirement = upsert_requirement(&mut tx, project.id, item, target_amount).await?;
    tx.commit().await?;

    info!(
        "Requirement set: '{}' needs {} x {}",
        project.name, requirement.target_amount, requirement.item
    );
    Ok((project, requirement))
}

/// Requirement lines in insertion order
pub async fn requirements_of(conn: &mut SqliteConnection, project_id: ProjectId) -> Result<Vec<Requirement>> {
    let rows = sqlx::query(
        r#"
        SELECT pr.item_id, i.name, pr.target_amount
        FROM project_requirements pr
        JOIN items i ON pr.item_id = i.id
        WHERE pr.project_id = ?
        ORDER BY pr.id
        "#,
    )
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Requirement {
            item_id: row.get("item_id"),
            item: row.get("name"),
            target_amount: row.get("target_amount"),
        })
        .collect())
}

/// Apply a pasted `Item: Amount` block as requirement upserts
///
/// The project must exist; after that, lines succeed or fail independently.
pub async fn bulk_requirements(
    pool: &SqlitePool,
    guild_id: GuildId,
    project: &str,
    text: &str,
) -> Result<(Project, BatchOutcome)> {
    let parsed = parse_bulk(text, QuantityRule::Positive);
    let mut outcome = BatchOutcome::from_parse_failures(parsed.failures);

    let mut tx = pool.begin().await?;
    let project = require_project(&mut tx, guild_id, project).await?;

    for line in parsed.lines {
        let checked = positive_amount("target amount", line.quantity)
            .and_then(|amount| clean_name("item", &line.item).map(|_| amount));

        match checked {
            Ok(amount) => {
                let requirement = upsert_requirement(&mut tx, project.id, &line.item, amount).await?;
                outcome.applied.push(AppliedLine {
                    line_number: line.line_number,
                    item: requirement.item,
                    quantity: requirement.target_amount,
                });
            }
            Err(e) => outcome.failures.push(LineFailure {
                line_number: line.line_number,
                line: format!("{}: {}", line.item, line.quantity),
                reason: e.to_string(),
            }),
        }
    }
    tx.commit().await?;

    info!(
        "Bulk requirement edit on '{}': {} applied, {} rejected",
        project.name,
        outcome.applied.len(),
        outcome.failures.len()
    );
    Ok((project, outcome))
}

/// Requirements in the paste format accepted by `bulk_requirements`
pub async fn export_requirements(pool: &SqlitePool, guild_id: GuildId, project: &str) -> Result<(Project, String)> {
    let mut conn = pool.acquire().await?;
    let project = require_project(&mut conn, guild_id, project).await?;
    let requirements = requirements_of(&mut conn, project.id).await?;

    let text = format_export(requirements.iter().map(|r| (r.item.as_str(), r.target_amount)));
    Ok((project, text))
}

/// Project names of a guild containing `fragment`, alphabetical
pub async fn autocomplete_projects(pool: &SqlitePool, guild_id: GuildId, fragment: &str) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(
        r#"
        SELECT name FROM projects
        WHERE guild_id = ? AND name LIKE ? ESCAPE '\'
        ORDER BY name
        LIMIT ?
        "#,
    )
    .bind(guild_id)
    .bind(contains_pattern(fragment))
    .bind(AUTOCOMPLETE_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(names)
}

async fn upsert_requirement(
    conn: &mut SqliteConnection,
    project_id: ProjectId,
    item: &str,
    target_amount: i64,
) -> Result<Requirement> {
    let item = ensure_item(conn, item).await?;

    sqlx::query(
        r#"
        INSERT INTO project_requirements (project_id, item_id, target_amount)
        VALUES (?, ?, ?)
        ON CONFLICT (project_id, item_id) DO UPDATE SET target_amount = excluded.target_amount
        "#,
    )
    .bind(project_id)
    .bind(item.id)
    .bind(target_amount)
    .execute(&mut *conn)
    .await?;

    Ok(Requirement {
        item_id: item.id,
        item: item.name,
        target_amount,
    })
}
