//! Follow-up tickets for deferred replies
//!
//! A command that misses its acknowledgement deadline gets a ticket; the
//! finished reply is parked here until the caller fetches it. Tickets expire
//! after `FOLLOWUP_TTL`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// How long a ticket is kept after it was opened
pub const FOLLOWUP_TTL_MINUTES: i64 = 10;

/// Final reply of a deferred command, as it would have been sent directly
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReply {
    pub http_status: u16,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FollowupState {
    Pending,
    Done(StoredReply),
}

#[derive(Debug, Clone)]
struct Followup {
    command: &'static str,
    opened_at: DateTime<Utc>,
    state: FollowupState,
}

/// Shared ticket table; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct FollowupStore {
    entries: Arc<RwLock<HashMap<Uuid, Followup>>>,
}

impl FollowupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending ticket for `command`
    pub async fn open(&self, command: &'static str) -> Uuid {
        let ticket = Uuid::new_v4();
        let now = Utc::now();

        let mut entries = self.entries.write().await;
        prune(&mut entries, now);
        entries.insert(
            ticket,
            Followup {
                command,
                opened_at: now,
                state: FollowupState::Pending,
            },
        );

        debug!("Follow-up {} opened for {}", ticket, command);
        ticket
    }

    /// Park the final reply; ignored if the ticket already expired
    pub async fn complete(&self, ticket: Uuid, reply: StoredReply) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&ticket) {
            debug!("Follow-up {} for {} finished with {}", ticket, entry.command, reply.http_status);
            entry.state = FollowupState::Done(reply);
        }
    }

    pub async fn get(&self, ticket: Uuid) -> Option<FollowupState> {
        let entries = self.entries.read().await;
        entries
            .get(&ticket)
            .filter(|entry| !expired(entry, Utc::now()))
            .map(|entry| entry.state.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn expired(entry: &Followup, now: DateTime<Utc>) -> bool {
    now - entry.opened_at > Duration::minutes(FOLLOWUP_TTL_MINUTES)
}

fn prune(entries: &mut HashMap<Uuid, Followup>, now: DateTime<Utc>) {
    entries.retain(|_, entry| !expired(entry, now));
}
