//! Ledger store: the distributed warehouse
//!
//! One row per (guild, owner, item). Quantities change through single atomic
//! statements (`quantity = quantity + ?`, guarded decrement), never through
//! read-modify-write in application code. A row whose quantity reaches zero is
//! deleted, so every stored row holds a positive quantity.

use super::items::{ensure_item, require_item, Item};
use crate::error::{LogisticsError, Result};
use crate::services::bulk::{parse_bulk, AppliedLine, BatchOutcome, LineFailure, QuantityRule};
use crate::validate::{non_negative_quantity, positive_amount};
use chrono::{DateTime, NaiveDateTime, Utc};
use qm_common::db::{GuildId, ItemId, OwnerId};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

/// Number of holders `locate` reports
pub const TOP_HOLDERS: i64 = 10;

/// Reply data for a single-row mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerChange {
    pub item: Item,
    /// The owner's quantity after the mutation
    pub owner_quantity: i64,
    /// Sum over every owner in the guild after the mutation
    pub guild_total: i64,
}

/// One line of an owner's snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub item_id: ItemId,
    pub item: String,
    pub quantity: i64,
    pub last_updated: DateTime<Utc>,
}

/// One holder of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holder {
    pub owner_id: OwnerId,
    pub quantity: i64,
}

/// Reply data for `locate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemLocation {
    pub item: Item,
    pub guild_total: i64,
    pub holders: Vec<Holder>,
}

/// `quantity += amount`, creating the item and row as needed
pub async fn deposit(
    pool: &SqlitePool,
    guild_id: GuildId,
    owner_id: OwnerId,
    item: &str,
    amount: i64,
) -> Result<LedgerChange> {
    let amount = positive_amount("amount", amount)?;

    let mut tx = pool.begin().await?;
    let item = ensure_item(&mut tx, item).await?;

    let owner_quantity: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO ledger_entries (guild_id, owner_id, item_id, quantity)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (guild_id, owner_id, item_id)
        DO UPDATE SET quantity = ledger_entries.quantity + excluded.quantity,
                      last_updated = CURRENT_TIMESTAMP
        RETURNING quantity
        "#,
    )
    .bind(guild_id)
    .bind(owner_id)
    .bind(item.id)
    .bind(amount)
    .fetch_one(&mut *tx)
    .await?;

    let guild_total = total_of(&mut tx, guild_id, item.id).await?;
    tx.commit().await?;

    debug!(
        "Deposit: guild {} owner {} +{} {} (now {}, guild total {})",
        guild_id, owner_id, amount, item.name, owner_quantity, guild_total
    );

    Ok(LedgerChange {
        item,
        owner_quantity,
        guild_total,
    })
}

/// `quantity -= amount`; rejected without any change if it would go negative
pub async fn withdraw(
    pool: &SqlitePool,
    guild_id: GuildId,
    owner_id: OwnerId,
    item: &str,
    amount: i64,
) -> Result<LedgerChange> {
    let amount = positive_amount("amount", amount)?;

    let mut tx = pool.begin().await?;

    // Guarded decrement: no row is touched unless the balance covers the amount.
    // It runs first so the transaction takes the write lock before reading anything.
    let remaining: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE ledger_entries
        SET quantity = quantity - ?1, last_updated = CURRENT_TIMESTAMP
        WHERE guild_id = ?2 AND owner_id = ?3 AND quantity >= ?1
          AND item_id = (SELECT id FROM items WHERE name = ?4)
        RETURNING quantity
        "#,
    )
    .bind(amount)
    .bind(guild_id)
    .bind(owner_id)
    .bind(item.trim())
    .fetch_optional(&mut *tx)
    .await?;

    let item = require_item(&mut tx, item).await?;

    let Some(owner_quantity) = remaining else {
        let held = held_quantity(&mut tx, guild_id, owner_id, item.id).await?;
        return Err(LogisticsError::InsufficientStock {
            item: item.name,
            requested: amount,
            held,
        });
    };

    if owner_quantity == 0 {
        delete_entry(&mut tx, guild_id, owner_id, item.id).await?;
    }

    let guild_total = total_of(&mut tx, guild_id, item.id).await?;
    tx.commit().await?;

    debug!(
        "Withdraw: guild {} owner {} -{} {} (now {}, guild total {})",
        guild_id, owner_id, amount, item.name, owner_quantity, guild_total
    );

    Ok(LedgerChange {
        item,
        owner_quantity,
        guild_total,
    })
}

/// Absolute overwrite; zero removes the row
pub async fn set_quantity(
    pool: &SqlitePool,
    guild_id: GuildId,
    owner_id: OwnerId,
    item: &str,
    quantity: i64,
) -> Result<LedgerChange> {
    let quantity = non_negative_quantity(quantity)?;

    let mut tx = pool.begin().await?;
    let item = ensure_item(&mut tx, item).await?;
    set_in(&mut tx, guild_id, owner_id, item.id, quantity).await?;
    let guild_total = total_of(&mut tx, guild_id, item.id).await?;
    tx.commit().await?;

    Ok(LedgerChange {
        item,
        owner_quantity: quantity,
        guild_total,
    })
}

/// Parse a pasted inventory block and overwrite each listed item
///
/// Lines are independent: malformed ones are reported, the rest applied.
/// Storage failures abort the whole batch.
pub async fn bulk_set(
    pool: &SqlitePool,
    guild_id: GuildId,
    owner_id: OwnerId,
    text: &str,
) -> Result<BatchOutcome> {
    let parsed = parse_bulk(text, QuantityRule::AllowZero);
    let mut outcome = BatchOutcome::from_parse_failures(parsed.failures);

    let mut tx = pool.begin().await?;
    for line in parsed.lines {
        let applied = match non_negative_quantity(line.quantity) {
            Ok(quantity) => match ensure_item(&mut tx, &line.item).await {
                Ok(item) => {
                    set_in(&mut tx, guild_id, owner_id, item.id, quantity).await?;
                    Ok(item)
                }
                Err(e @ LogisticsError::InvalidInput(_)) => Err(e),
                Err(e) => return Err(e),
            },
            Err(e) => Err(e),
        };

        match applied {
            Ok(item) => outcome.applied.push(AppliedLine {
                line_number: line.line_number,
                item: item.name,
                quantity: line.quantity,
            }),
            Err(e) => outcome.failures.push(LineFailure {
                line_number: line.line_number,
                line: format!("{}: {}", line.item, line.quantity),
                reason: e.to_string(),
            }),
        }
    }
    tx.commit().await?;

    info!(
        "Bulk stock update: guild {} owner {} applied {} line(s), {} rejected",
        guild_id,
        owner_id,
        outcome.applied.len(),
        outcome.failures.len()
    );

    Ok(outcome)
}

/// Everything one owner holds, alphabetical by item
pub async fn owner_snapshot(
    pool: &SqlitePool,
    guild_id: GuildId,
    owner_id: OwnerId,
) -> Result<Vec<Holding>> {
    let rows = sqlx::query(
        r#"
        SELECT le.item_id, i.name, le.quantity, le.last_updated
        FROM ledger_entries le
        JOIN items i ON le.item_id = i.id
        WHERE le.guild_id = ? AND le.owner_id = ? AND le.quantity > 0
        ORDER BY i.name
        "#,
    )
    .bind(guild_id)
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Holding {
            item_id: row.get("item_id"),
            item: row.get("name"),
            quantity: row.get("quantity"),
            last_updated: qm_common::time::from_sqlite(row.get::<NaiveDateTime, _>("last_updated")),
        })
        .collect())
}

/// Top holders of one item plus the guild total, read in one transaction
pub async fn locate(pool: &SqlitePool, guild_id: GuildId, item: &str) -> Result<ItemLocation> {
    let mut tx = pool.begin().await?;
    let item = require_item(&mut tx, item).await?;
    let holders = holders_of(&mut tx, guild_id, item.id, 1, TOP_HOLDERS).await?;
    let guild_total = total_of(&mut tx, guild_id, item.id).await?;
    tx.commit().await?;

    Ok(ItemLocation {
        item,
        guild_total,
        holders,
    })
}

/// Holders with at least `min_quantity`, largest first, at most `limit`
pub async fn holders_of(
    conn: &mut SqliteConnection,
    guild_id: GuildId,
    item_id: ItemId,
    min_quantity: i64,
    limit: i64,
) -> Result<Vec<Holder>> {
    let rows = sqlx::query(
        r#"
        SELECT owner_id, quantity
        FROM ledger_entries
        WHERE guild_id = ? AND item_id = ? AND quantity >= ? AND quantity > 0
        ORDER BY quantity DESC, owner_id ASC
        LIMIT ?
        "#,
    )
    .bind(guild_id)
    .bind(item_id)
    .bind(min_quantity)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Holder {
            owner_id: row.get("owner_id"),
            quantity: row.get("quantity"),
        })
        .collect())
}

/// Sum across all owners of the guild, as one aggregate query
pub async fn total_of(conn: &mut SqliteConnection, guild_id: GuildId, item_id: ItemId) -> Result<i64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM ledger_entries WHERE guild_id = ? AND item_id = ?",
    )
    .bind(guild_id)
    .bind(item_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(total)
}

/// Delete every ledger entry of a guild; returns the number of rows removed
pub async fn wipe_guild(pool: &SqlitePool, guild_id: GuildId) -> Result<u64> {
    let removed = sqlx::query("DELETE FROM ledger_entries WHERE guild_id = ?")
        .bind(guild_id)
        .execute(pool)
        .await?
        .rows_affected();

    info!("Wiped {} ledger entries for guild {}", removed, guild_id);
    Ok(removed)
}

async fn held_quantity(
    conn: &mut SqliteConnection,
    guild_id: GuildId,
    owner_id: OwnerId,
    item_id: ItemId,
) -> Result<i64> {
    let quantity: Option<i64> = sqlx::query_scalar(
        "SELECT quantity FROM ledger_entries WHERE guild_id = ? AND owner_id = ? AND item_id = ?",
    )
    .bind(guild_id)
    .bind(owner_id)
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(quantity.unwrap_or(0))
}

async fn set_in(
    conn: &mut SqliteConnection,
    guild_id: GuildId,
    owner_id: OwnerId,
    item_id: ItemId,
    quantity: i64,
) -> Result<()> {
    if quantity == 0 {
        return delete_entry(conn, guild_id, owner_id, item_id).await;
    }

    sqlx::query(
        r#"
        INSERT INTO ledger_entries (guild_id, owner_id, item_id, quantity)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (guild_id, owner_id, item_id)
        DO UPDATE SET quantity = excluded.quantity, last_updated = CURRENT_TIMESTAMP
        "#,
    )
    .bind(guild_id)
    .bind(owner_id)
    .bind(item_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn delete_entry(
    conn: &mut SqliteConnection,
    guild_id: GuildId,
    owner_id: OwnerId,
    item_id: ItemId,
) -> Result<()> {
    sqlx::query("DELETE FROM ledger_entries WHERE guild_id = ? AND owner_id = ? AND item_id = ?")
        .bind(guild_id)
        .bind(owner_id)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
