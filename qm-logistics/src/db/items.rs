//! Item catalog
//!
//! Items are created on first reference by any mutating command and never
//! deleted. Lookups are case-insensitive; the first spelling seen is kept as
//! the display name.

use crate::error::{LogisticsError, Result};
use crate::validate::clean_name;
use qm_common::db::{GuildId, ItemId, OwnerId};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Autocomplete result cap
pub const AUTOCOMPLETE_LIMIT: i64 = 25;

/// LIKE pattern matching `fragment` anywhere; `%`, `_` and `\` match literally
///
/// Pair with `ESCAPE '\'` in the query.
pub fn contains_pattern(fragment: &str) -> String {
    let fragment = fragment.trim();
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// True once any recipe names this item as output
    pub is_crafted: bool,
}

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> Item {
    Item {
        id: row.get("id"),
        name: row.get("name"),
        is_crafted: row.get::<i64, _>("is_crafted") != 0,
    }
}

/// Get-or-create an item by name (idempotent)
pub async fn ensure_item(conn: &mut SqliteConnection, name: &str) -> Result<Item> {
    let name = clean_name("item", name)?;

    sqlx::query("INSERT OR IGNORE INTO items (name) VALUES (?)")
        .bind(&name)
        .execute(&mut *conn)
        .await?;

    find_item(conn, &name)
        .await?
        .ok_or_else(|| LogisticsError::Internal(format!("item '{}' vanished after insert", name)))
}

/// Read-only lookup; `None` if the catalog has never seen the name
pub async fn find_item(conn: &mut SqliteConnection, name: &str) -> Result<Option<Item>> {
    let row = sqlx::query("SELECT id, name, is_crafted FROM items WHERE name = ?")
        .bind(name.trim())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(item_from_row))
}

/// Lookup that fails with `NotFound`
pub async fn require_item(conn: &mut SqliteConnection, name: &str) -> Result<Item> {
    find_item(conn, name)
        .await?
        .ok_or_else(|| LogisticsError::not_found("item", name.trim()))
}

/// Flag an item as crafted; never unset automatically
pub async fn mark_crafted(conn: &mut SqliteConnection, item_id: ItemId) -> Result<()> {
    sqlx::query("UPDATE items SET is_crafted = 1 WHERE id = ?")
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Item names containing `fragment`, alphabetical
pub async fn autocomplete_items(pool: &SqlitePool, fragment: &str) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(
        r#"
        SELECT name FROM items
        WHERE name LIKE ? ESCAPE '\'
        ORDER BY name
        LIMIT ?
        "#,
    )
    .bind(contains_pattern(fragment))
    .bind(AUTOCOMPLETE_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(names)
}

/// Item names containing `fragment` that one owner currently holds
pub async fn autocomplete_owner_items(
    pool: &SqlitePool,
    guild_id: GuildId,
    owner_id: OwnerId,
    fragment: &str,
) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(
        r#"
        SELECT i.name
        FROM ledger_entries le
        JOIN items i ON le.item_id = i.id
        WHERE le.guild_id = ? AND le.owner_id = ? AND le.quantity > 0
          AND i.name LIKE ? ESCAPE '\'
        ORDER BY i.name
        LIMIT ?
        "#,
    )
    .bind(guild_id)
    .bind(owner_id)
    .bind(contains_pattern(fragment))
    .bind(AUTOCOMPLETE_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(names)
}
