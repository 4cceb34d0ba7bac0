//! Event types for the Quartermaster event system
//!
//! Every successful mutation emits one `LogisticsEvent`. Subscribers (the
//! dashboard refresh worker) decide what to recompute; emitters never wait.

use crate::db::{GuildId, ItemId, OwnerId, ProjectId, ProjectStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Mutation notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LogisticsEvent {
    /// One owner's quantity for one item changed
    ///
    /// Triggers:
    /// - Dashboard: refresh the guild's bound project
    LedgerChanged {
        guild_id: GuildId,
        owner_id: OwnerId,
        item_id: ItemId,
        timestamp: DateTime<Utc>,
    },

    /// Several of one owner's rows changed in a bulk paste
    LedgerBatchApplied {
        guild_id: GuildId,
        owner_id: OwnerId,
        applied: usize,
        timestamp: DateTime<Utc>,
    },

    /// Every ledger entry of a guild was deleted
    LedgerWiped {
        guild_id: GuildId,
        timestamp: DateTime<Utc>,
    },

    /// A project's requirement set changed
    RequirementsChanged {
        guild_id: GuildId,
        project_id: ProjectId,
        timestamp: DateTime<Utc>,
    },

    /// A project's lifecycle state changed
    ProjectStatusChanged {
        guild_id: GuildId,
        project_id: ProjectId,
        status: ProjectStatus,
        timestamp: DateTime<Utc>,
    },

    /// The shared recipe graph changed
    ///
    /// Recipes are not guild-scoped, so every bound dashboard may be affected.
    RecipesChanged {
        output_item_id: ItemId,
        timestamp: DateTime<Utc>,
    },
}

/// Which dashboards an event can affect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    Guild(GuildId),
    AllGuilds,
}

impl LogisticsEvent {
    /// Dashboards to refresh after this event
    pub fn scope(&self) -> RefreshScope {
        match self {
            LogisticsEvent::LedgerChanged { guild_id, .. }
            | LogisticsEvent::LedgerBatchApplied { guild_id, .. }
            | LogisticsEvent::LedgerWiped { guild_id, .. }
            | LogisticsEvent::RequirementsChanged { guild_id, .. }
            | LogisticsEvent::ProjectStatusChanged { guild_id, .. } => RefreshScope::Guild(*guild_id),
            LogisticsEvent::RecipesChanged { .. } => RefreshScope::AllGuilds,
        }
    }
}

/// Broadcast bus for `LogisticsEvent`
///
/// Clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LogisticsEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers that fall more than `capacity` events behind observe
    /// `RecvError::Lagged` and must treat their view as stale.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<LogisticsEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: LogisticsEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
