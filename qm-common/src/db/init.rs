//! Database initialization
//!
//! Creates the database on first run and the schema idempotently on every start.
//! Invariants the domain relies on are backed by constraints:
//! - positive recipe ratios and requirement targets
//! - non-negative ledger quantities
//! - no recipe whose input is its own output
//! - case-insensitive uniqueness of item names and per-guild project names

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Each in-memory connection is its own database, so the pool is capped at one.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_items_table(pool).await?;
    create_recipes_table(pool).await?;
    create_projects_table(pool).await?;
    create_project_requirements_table(pool).await?;
    create_ledger_entries_table(pool).await?;
    create_dashboard_bindings_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Item catalog. `is_crafted` is set when a recipe names the item as output.
async fn create_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            is_crafted INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Recipe edges: `quantity_required` units of input make one unit of output
async fn create_recipes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY,
            output_item_id INTEGER NOT NULL REFERENCES items(id),
            input_item_id INTEGER NOT NULL REFERENCES items(id),
            quantity_required INTEGER NOT NULL CHECK (quantity_required > 0),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (output_item_id, input_item_id),
            CHECK (output_item_id <> input_item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_projects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY,
            guild_id INTEGER NOT NULL,
            name TEXT NOT NULL COLLATE NOCASE,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (guild_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_project_requirements_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_requirements (
            id INTEGER PRIMARY KEY,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            item_id INTEGER NOT NULL REFERENCES items(id),
            target_amount INTEGER NOT NULL CHECK (target_amount > 0),
            UNIQUE (project_id, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// The distributed warehouse: one row per (guild, owner, item)
async fn create_ledger_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            guild_id INTEGER NOT NULL,
            owner_id INTEGER NOT NULL,
            item_id INTEGER NOT NULL REFERENCES items(id),
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (guild_id, owner_id, item_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Totals and holder lookups are per (guild, item)
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entries_item ON ledger_entries (guild_id, item_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// At most one live dashboard per guild
async fn create_dashboard_bindings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dashboard_bindings (
            guild_id INTEGER PRIMARY KEY,
            channel_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_database_has_all_tables() {
        let pool = init_memory_database().await.unwrap();

        assert_eq!(
            table_names(&pool).await,
            vec![
                "dashboard_bindings",
                "items",
                "ledger_entries",
                "project_requirements",
                "projects",
                "recipes",
                "schema_version",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_schema_idempotent() {
        let pool = init_memory_database().await.unwrap();
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();

        let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[tokio::test]
    async fn test_item_names_unique_ignoring_case() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO items (name) VALUES ('Polaris Bit')")
            .execute(&pool)
            .await
            .unwrap();

        let dup = sqlx::query("INSERT INTO items (name) VALUES ('polaris bit')")
            .execute(&pool)
            .await;
        assert!(dup.is_err(), "case variant must collide with existing item");
    }

    #[tokio::test]
    async fn test_negative_quantity_rejected_by_constraint() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO items (id, name) VALUES (1, 'Scrap')")
            .execute(&pool)
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO ledger_entries (guild_id, owner_id, item_id, quantity) VALUES (1, 1, 1, -5)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_recipe_self_loop_rejected_by_constraint() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO items (id, name) VALUES (1, 'Widget')")
            .execute(&pool)
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO recipes (output_item_id, input_item_id, quantity_required) VALUES (1, 1, 2)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let pool = init_memory_database().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO ledger_entries (guild_id, owner_id, item_id, quantity) VALUES (1, 1, 999, 5)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err(), "ledger rows must reference a catalog item");
    }
}
