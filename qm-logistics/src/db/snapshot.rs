//! Consistent read views for the aggregation engine and production check
//!
//! Each loader runs inside one read transaction so totals come from a single
//! database snapshot; a concurrent deposit is either fully visible or not at all.

use super::items::{require_item, Item};
use super::ledger::{holders_of, total_of, Holder, TOP_HOLDERS};
use super::projects::{project_by_id, require_project, Project};
use crate::error::{LogisticsError, Result};
use qm_common::db::{GuildId, ItemId, ProjectId};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;

/// One ingredient line with the guild's current holdings of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientStock {
    pub item_id: ItemId,
    pub item: String,
    /// Units of this ingredient per unit of output
    pub ratio: i64,
    pub guild_total: i64,
}

/// One requirement line with everything needed to compute its progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementStock {
    pub item_id: ItemId,
    pub item: String,
    pub target_amount: i64,
    pub is_crafted: bool,
    pub direct_total: i64,
    pub ingredients: Vec<IngredientStock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub project: Project,
    pub requirements: Vec<RequirementStock>,
}

/// Inputs for the `production` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionSnapshot {
    pub item: Item,
    pub direct_total: i64,
    /// Each ingredient with the members who individually hold at least one batch of it
    pub ingredients: Vec<(IngredientStock, Vec<Holder>)>,
}

/// Snapshot of a project looked up by name
pub async fn load_project(pool: &SqlitePool, guild_id: GuildId, project: &str) -> Result<ProjectSnapshot> {
    let mut tx = pool.begin().await?;
    let project = require_project(&mut tx, guild_id, project).await?;
    let requirements = requirement_stock(&mut tx, guild_id, project.id).await?;
    tx.commit().await?;

    Ok(ProjectSnapshot { project, requirements })
}

/// Snapshot of a bound project; `None` if the project no longer exists
pub async fn load_project_by_id(
    pool: &SqlitePool,
    guild_id: GuildId,
    project_id: ProjectId,
) -> Result<Option<ProjectSnapshot>> {
    let mut tx = pool.begin().await?;
    let Some(project) = project_by_id(&mut tx, project_id).await? else {
        return Ok(None);
    };
    let requirements = requirement_stock(&mut tx, guild_id, project.id).await?;
    tx.commit().await?;

    Ok(Some(ProjectSnapshot { project, requirements }))
}

/// Recipe inputs of one item with holdings; `NotFound` if it has no recipe
pub async fn load_production(pool: &SqlitePool, guild_id: GuildId, item: &str) -> Result<ProductionSnapshot> {
    let mut tx = pool.begin().await?;
    let item = require_item(&mut tx, item).await?;

    let edges = super::recipes::inputs_for(&mut tx, item.id).await?;
    if edges.is_empty() {
        return Err(LogisticsError::not_found("recipe", item.name));
    }

    let direct_total = total_of(&mut tx, guild_id, item.id).await?;

    let mut ingredients = Vec::with_capacity(edges.len());
    for edge in edges {
        let guild_total = total_of(&mut tx, guild_id, edge.input_item_id).await?;
        let capable = holders_of(&mut tx, guild_id, edge.input_item_id, edge.quantity_required, TOP_HOLDERS).await?;
        ingredients.push((
            IngredientStock {
                item_id: edge.input_item_id,
                item: edge.input_name,
                ratio: edge.quantity_required,
                guild_total,
            },
            capable,
        ));
    }
    tx.commit().await?;

    Ok(ProductionSnapshot {
        item,
        direct_total,
        ingredients,
    })
}

async fn requirement_stock(
    conn: &mut SqliteConnection,
    guild_id: GuildId,
    project_id: ProjectId,
) -> Result<Vec<RequirementStock>> {
    let rows = sqlx::query(
        r#"
        SELECT pr.item_id, i.name, i.is_crafted, pr.target_amount,
               COALESCE((SELECT SUM(le.quantity) FROM ledger_entries le
                         WHERE le.guild_id = ?1 AND le.item_id = pr.item_id), 0) AS direct_total
        FROM project_requirements pr
        JOIN items i ON pr.item_id = i.id
        WHERE pr.project_id = ?2
        ORDER BY pr.id
        "#,
    )
    .bind(guild_id)
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut requirements: Vec<RequirementStock> = rows
        .iter()
        .map(|row| RequirementStock {
            item_id: row.get("item_id"),
            item: row.get("name"),
            target_amount: row.get("target_amount"),
            is_crafted: row.get::<i64, _>("is_crafted") != 0,
            direct_total: row.get("direct_total"),
            ingredients: Vec::new(),
        })
        .collect();

    let rows = sqlx::query(
        r#"
        SELECT r.output_item_id, r.input_item_id, i.name, r.quantity_required,
               COALESCE((SELECT SUM(le.quantity) FROM ledger_entries le
                         WHERE le.guild_id = ?1 AND le.item_id = r.input_item_id), 0) AS guild_total
        FROM recipes r
        JOIN items i ON r.input_item_id = i.id
        WHERE r.output_item_id IN (SELECT item_id FROM project_requirements WHERE project_id = ?2)
        ORDER BY r.id
        "#,
    )
    .bind(guild_id)
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_output: HashMap<ItemId, Vec<IngredientStock>> = HashMap::new();
    for row in &rows {
        by_output
            .entry(row.get("output_item_id"))
            .or_default()
            .push(IngredientStock {
                item_id: row.get("input_item_id"),
                item: row.get("name"),
                ratio: row.get("quantity_required"),
                guild_total: row.get("guild_total"),
            });
    }

    for requirement in &mut requirements {
        if let Some(ingredients) = by_output.remove(&requirement.item_id) {
            requirement.ingredients = ingredients;
        }
    }

    Ok(requirements)
}
