//! Recipe graph
//!
//! Edges `output <- (input, ratio)`: `ratio` units of input make one unit of
//! output. Several edges on one output are the ingredient lines of that item.
//! Resolution is single-level; an ingredient's own recipe is never expanded.

use super::items::{ensure_item, mark_crafted, require_item, Item};
use crate::error::{LogisticsError, Result};
use crate::validate::{clean_name, positive_amount};
use qm_common::db::ItemId;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;

/// One ingredient line of a crafted item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeEdge {
    pub output_item_id: ItemId,
    pub input_item_id: ItemId,
    pub input_name: String,
    pub quantity_required: i64,
}

/// Add one edge; creates both items if absent and marks the output crafted
pub async fn add_recipe(
    pool: &SqlitePool,
    output: &str,
    input: &str,
    ratio: i64,
) -> Result<(Item, RecipeEdge)> {
    let ratio = positive_amount("ratio", ratio)?;
    let output = clean_name("item", output)?;
    let input = clean_name("item", input)?;

    // Catalog names compare ASCII case-insensitively (COLLATE NOCASE)
    if output.eq_ignore_ascii_case(&input) {
        return Err(LogisticsError::InvalidInput(format!(
            "'{}' cannot be an ingredient of itself",
            output
        )));
    }

    let mut tx = pool.begin().await?;

    let output_item = ensure_item(&mut tx, &output).await?;
    let input_item = ensure_item(&mut tx, &input).await?;

    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM recipes WHERE output_item_id = ? AND input_item_id = ?",
    )
    .bind(output_item.id)
    .bind(input_item.id)
    .fetch_optional(&mut *tx)
    .await?;

    if exists.is_some() {
        return Err(LogisticsError::duplicate(
            "recipe",
            format!("{} <- {}", output_item.name, input_item.name),
        ));
    }

    sqlx::query(
        "INSERT INTO recipes (output_item_id, input_item_id, quantity_required) VALUES (?, ?, ?)",
    )
    .bind(output_item.id)
    .bind(input_item.id)
    .bind(ratio)
    .execute(&mut *tx)
    .await?;

    mark_crafted(&mut tx, output_item.id).await?;
    tx.commit().await?;

    info!(
        "Recipe added: {} x {} -> 1 {}",
        ratio, input_item.name, output_item.name
    );

    let edge = RecipeEdge {
        output_item_id: output_item.id,
        input_item_id: input_item.id,
        input_name: input_item.name,
        quantity_required: ratio,
    };
    let output_item = Item {
        is_crafted: true,
        ..output_item
    };
    Ok((output_item, edge))
}

/// Delete one edge; the output stays flagged as crafted
pub async fn remove_recipe(pool: &SqlitePool, output: &str, input: &str) -> Result<Item> {
    let mut tx = pool.begin().await?;

    let output_item = require_item(&mut tx, output).await?;
    let input_item = require_item(&mut tx, input).await?;

    let removed = sqlx::query("DELETE FROM recipes WHERE output_item_id = ? AND input_item_id = ?")
        .bind(output_item.id)
        .bind(input_item.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(LogisticsError::not_found(
            "recipe",
            format!("{} <- {}", output_item.name, input_item.name),
        ));
    }

    tx.commit().await?;
    info!("Recipe removed: {} <- {}", output_item.name, input_item.name);
    Ok(output_item)
}

/// Ingredient lines of `output`, in the order they were added
///
/// Empty for uncrafted or unknown items.
pub async fn inputs_for(conn: &mut SqliteConnection, output: ItemId) -> Result<Vec<RecipeEdge>> {
    let rows = sqlx::query(
        r#"
        SELECT r.output_item_id, r.input_item_id, i.name AS input_name, r.quantity_required
        FROM recipes r
        JOIN items i ON r.input_item_id = i.id
        WHERE r.output_item_id = ?
        ORDER BY r.id
        "#,
    )
    .bind(output)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| RecipeEdge {
            output_item_id: row.get("output_item_id"),
            input_item_id: row.get("input_item_id"),
            input_name: row.get("input_name"),
            quantity_required: row.get("quantity_required"),
        })
        .collect())
}
