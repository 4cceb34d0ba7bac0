//! qm-logistics library
//!
//! Distributed inventory reconciliation for guild projects: item catalog,
//! recipe graph, per-member ledger, project requirements, aggregation and the
//! live dashboard. Exposed as a library so the HTTP surface is testable.

pub mod api;
pub mod db;
pub mod error;
pub mod services;
pub mod validate;

pub use crate::error::{LogisticsError, Result};

use axum::Router;
use chrono::{DateTime, Utc};
use qm_common::events::{EventBus, LogisticsEvent};
use services::{DashboardSynchronizer, FollowupStore};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Mutation notifications consumed by the dashboard refresh worker
    pub events: EventBus,
    pub dashboard: Arc<DashboardSynchronizer>,
    /// Replies of commands that outlived their acknowledgement deadline
    pub followups: FollowupStore,
    /// How long a slow command may run before the caller gets a ticket instead
    pub ack_deadline: Duration,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        events: EventBus,
        dashboard: Arc<DashboardSynchronizer>,
        ack_deadline: Duration,
    ) -> Self {
        Self {
            db,
            events,
            dashboard,
            followups: FollowupStore::new(),
            ack_deadline,
            startup_time: Utc::now(),
        }
    }

    /// Post-mutation hook shared by every command that changes state
    ///
    /// Never waits: the refresh worker picks the event up on its own schedule.
    pub fn after_mutation(&self, event: LogisticsEvent) {
        self.events.emit_lossy(event);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::project_routes())
        .merge(api::recipe_routes())
        .merge(api::ledger_routes())
        .merge(api::lookup_routes())
        .merge(api::dashboard_routes())
        .merge(api::followup_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
