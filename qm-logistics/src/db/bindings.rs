//! Dashboard bindings: which message is the live rendering for a guild
//!
//! No row means the guild is unbound. Rebinding overwrites the row.

use crate::error::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use qm_common::db::{ChannelId, GuildId, MessageId, MessageRef, ProjectId};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Current binding of one guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardBinding {
    pub guild_id: GuildId,
    pub message: MessageRef,
    pub project_id: ProjectId,
    pub updated_at: DateTime<Utc>,
}

pub async fn get_binding(conn: &mut SqliteConnection, guild_id: GuildId) -> Result<Option<DashboardBinding>> {
    let row = sqlx::query(
        "SELECT guild_id, channel_id, message_id, project_id, updated_at FROM dashboard_bindings WHERE guild_id = ?",
    )
    .bind(guild_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| DashboardBinding {
        guild_id: row.get("guild_id"),
        message: MessageRef {
            channel_id: row.get::<ChannelId, _>("channel_id"),
            message_id: row.get::<MessageId, _>("message_id"),
        },
        project_id: row.get("project_id"),
        updated_at: qm_common::time::from_sqlite(row.get::<NaiveDateTime, _>("updated_at")),
    }))
}

/// Insert or overwrite the guild's binding
pub async fn upsert_binding(
    conn: &mut SqliteConnection,
    guild_id: GuildId,
    message: MessageRef,
    project_id: ProjectId,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dashboard_bindings (guild_id, channel_id, message_id, project_id)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (guild_id) DO UPDATE SET
            channel_id = excluded.channel_id,
            message_id = excluded.message_id,
            project_id = excluded.project_id,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(guild_id)
    .bind(message.channel_id)
    .bind(message.message_id)
    .bind(project_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Every guild with a live dashboard
pub async fn bound_guilds(pool: &SqlitePool) -> Result<Vec<GuildId>> {
    let guilds = sqlx::query_scalar("SELECT guild_id FROM dashboard_bindings ORDER BY guild_id")
        .fetch_all(pool)
        .await?;
    Ok(guilds)
}
