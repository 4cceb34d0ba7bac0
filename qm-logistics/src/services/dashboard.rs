//! Dashboard synchronizer
//!
//! Keeps exactly one live status message per guild. `bind` handles the
//! `dashboard_set` transitions (Unbound -> Bound, rebind, retarget); `refresh`
//! re-renders the bound project after mutations. A message deleted externally
//! is replaced by a fresh one and the binding updated.
//!
//! Work for one guild is serialized through a per-guild gate. Database reads
//! finish before any publisher call starts; no transaction spans the network.

use crate::db::bindings::{bound_guilds, get_binding, upsert_binding};
use crate::db::projects::Project;
use crate::db::snapshot::{load_project, load_project_by_id, ProjectSnapshot};
use crate::error::{LogisticsError, Result};
use crate::services::aggregation::{compute_report, StatusReport};
use crate::services::publisher::{MessagePublisher, PublishError};
use crate::services::render::{render_dashboard, RenderedDashboard};
use qm_common::db::{ChannelId, GuildId, MessageRef};
use qm_common::events::{EventBus, RefreshScope};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What `bind` or `refresh` did to the live message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardAction {
    /// First message for an unbound guild
    Published,
    /// Existing message updated in place
    Edited,
    /// Previous message was gone; a new one replaced it
    Republished,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindOutcome {
    pub project: Project,
    pub message: MessageRef,
    pub action: DashboardAction,
    pub report: StatusReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Unbound,
    Updated(DashboardAction),
}

pub struct DashboardSynchronizer {
    db: SqlitePool,
    publisher: Arc<dyn MessagePublisher>,
    publish_timeout: Duration,
    gates: Mutex<HashMap<GuildId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DashboardSynchronizer {
    pub fn new(db: SqlitePool, publisher: Arc<dyn MessagePublisher>, publish_timeout: Duration) -> Self {
        Self {
            db,
            publisher,
            publish_timeout,
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn gate(&self, guild_id: GuildId) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        gates.entry(guild_id).or_default().clone()
    }

    /// `dashboard_set`: show `project` in the guild's single live message
    ///
    /// `channel_id` is only used when a new message has to be posted; an
    /// existing live message is edited where it is.
    pub async fn bind(&self, guild_id: GuildId, channel_id: ChannelId, project: &str) -> Result<BindOutcome> {
        let gate = self.gate(guild_id);
        let _guard = gate.lock().await;

        let snapshot = load_project(&self.db, guild_id, project).await?;
        let existing = {
            let mut conn = self.db.acquire().await?;
            get_binding(&mut conn, guild_id).await?
        };

        let (report, rendered) = render(&snapshot);
        let (message, action) = match existing {
            Some(binding) => self.edit_or_replace(binding.message, &rendered).await?,
            None => (self.publish(channel_id, &rendered).await?, DashboardAction::Published),
        };

        {
            let mut conn = self.db.acquire().await?;
            upsert_binding(&mut conn, guild_id, message, snapshot.project.id).await?;
        }

        info!(
            "Dashboard for guild {} now tracks '{}' ({:?}, message {})",
            guild_id, snapshot.project.name, action, message.message_id
        );

        Ok(BindOutcome {
            project: snapshot.project,
            message,
            action,
            report,
        })
    }

    /// Re-render the guild's bound project, if any
    pub async fn refresh(&self, guild_id: GuildId) -> Result<RefreshOutcome> {
        let gate = self.gate(guild_id);
        let _guard = gate.lock().await;

        let binding = {
            let mut conn = self.db.acquire().await?;
            get_binding(&mut conn, guild_id).await?
        };
        let Some(binding) = binding else {
            return Ok(RefreshOutcome::Unbound);
        };
        let Some(snapshot) = load_project_by_id(&self.db, guild_id, binding.project_id).await? else {
            return Ok(RefreshOutcome::Unbound);
        };

        let (_, rendered) = render(&snapshot);
        let (message, action) = self.edit_or_replace(binding.message, &rendered).await?;

        if message != binding.message {
            let mut conn = self.db.acquire().await?;
            upsert_binding(&mut conn, guild_id, message, binding.project_id).await?;
        }

        debug!("Dashboard for guild {} refreshed ({:?})", guild_id, action);
        Ok(RefreshOutcome::Updated(action))
    }

    /// Refresh every guild in `scope`, logging failures
    pub async fn refresh_scope(&self, scope: RefreshScope) {
        let guilds = match scope {
            RefreshScope::Guild(guild_id) => vec![guild_id],
            RefreshScope::AllGuilds => match bound_guilds(&self.db).await {
                Ok(guilds) => guilds,
                Err(e) => {
                    warn!("Dashboard refresh skipped, cannot list bindings: {}", e);
                    return;
                }
            },
        };
        self.refresh_guilds(guilds).await;
    }

    async fn refresh_guilds(&self, guilds: impl IntoIterator<Item = GuildId>) {
        for guild_id in guilds {
            if let Err(e) = self.refresh(guild_id).await {
                warn!("Dashboard refresh for guild {} failed, will retry on next change: {}", guild_id, e);
            }
        }
    }

    /// Start the background task that turns mutation events into refreshes
    ///
    /// After the first event of a burst the worker waits `debounce`, drains
    /// whatever else arrived, and refreshes each affected guild once.
    pub fn spawn_refresh_worker(self: Arc<Self>, events: &EventBus, debounce: Duration) -> JoinHandle<()> {
        let mut rx = events.subscribe();

        tokio::spawn(async move {
            info!("Dashboard refresh worker started");
            loop {
                let mut burst = Burst::default();
                match rx.recv().await {
                    Ok(event) => burst.add(event.scope()),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Dashboard worker lagged by {} events, refreshing all dashboards", missed);
                        burst.add(RefreshScope::AllGuilds);
                    }
                    Err(RecvError::Closed) => break,
                }

                tokio::time::sleep(debounce).await;

                let mut closed = false;
                loop {
                    match rx.try_recv() {
                        Ok(event) => burst.add(event.scope()),
                        Err(TryRecvError::Lagged(_)) => burst.add(RefreshScope::AllGuilds),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Closed) => {
                            closed = true;
                            break;
                        }
                    }
                }

                if burst.all_guilds {
                    self.refresh_scope(RefreshScope::AllGuilds).await;
                } else {
                    self.refresh_guilds(burst.guilds).await;
                }

                if closed {
                    break;
                }
            }
            info!("Dashboard refresh worker stopped");
        })
    }

    async fn edit_or_replace(
        &self,
        message: MessageRef,
        rendered: &RenderedDashboard,
    ) -> Result<(MessageRef, DashboardAction)> {
        match self.edit(&message, rendered).await {
            Ok(()) => Ok((message, DashboardAction::Edited)),
            Err(PublishError::MessageGone(_)) => {
                warn!(
                    "Dashboard message {} in channel {} is gone, posting a new one",
                    message.message_id, message.channel_id
                );
                let fresh = self.publish(message.channel_id, rendered).await?;
                Ok((fresh, DashboardAction::Republished))
            }
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn publish(&self, channel_id: ChannelId, rendered: &RenderedDashboard) -> Result<MessageRef> {
        tokio::time::timeout(self.publish_timeout, self.publisher.publish(channel_id, rendered))
            .await
            .map_err(|_| timed_out(self.publish_timeout))?
            .map_err(unavailable)
    }

    async fn edit(&self, message: &MessageRef, rendered: &RenderedDashboard) -> std::result::Result<(), PublishError> {
        tokio::time::timeout(self.publish_timeout, self.publisher.edit(message, rendered))
            .await
            .map_err(|_| PublishError::Unavailable(format!("no reply within {:?}", self.publish_timeout)))?
    }
}

fn render(snapshot: &ProjectSnapshot) -> (StatusReport, RenderedDashboard) {
    let report = compute_report(snapshot);
    let rendered = render_dashboard(&report);
    (report, rendered)
}

fn unavailable(err: PublishError) -> LogisticsError {
    warn!("Dashboard publisher failure: {}", err);
    LogisticsError::ExternalUnavailable(err.to_string())
}

fn timed_out(timeout: Duration) -> LogisticsError {
    unavailable(PublishError::Unavailable(format!("no reply within {:?}", timeout)))
}

/// Guilds touched by one burst of events
#[derive(Default)]
struct Burst {
    guilds: BTreeSet<GuildId>,
    all_guilds: bool,
}

impl Burst {
    fn add(&mut self, scope: RefreshScope) {
        match scope {
            RefreshScope::Guild(guild_id) => {
                self.guilds.insert(guild_id);
            }
            RefreshScope::AllGuilds => self.all_guilds = true,
        }
    }
}
