//! Dashboard message publishing
//!
//! The synchronizer talks to the chat platform only through `MessagePublisher`.
//! `HttpPublisher` posts renderings to a chat gateway; `LogPublisher` stands in
//! when no gateway is configured.

use crate::services::render::RenderedDashboard;
use async_trait::async_trait;
use qm_common::db::{ChannelId, MessageId, MessageRef};
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The referenced message no longer exists (deleted externally)
    #[error("message {0:?} no longer exists")]
    MessageGone(MessageRef),

    /// Transport failure or timeout
    #[error("publisher unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Post a new message; returns its reference
    async fn publish(
        &self,
        channel_id: ChannelId,
        content: &RenderedDashboard,
    ) -> Result<MessageRef, PublishError>;

    /// Replace the content of an existing message
    async fn edit(&self, message: &MessageRef, content: &RenderedDashboard) -> Result<(), PublishError>;
}

#[derive(Debug, Deserialize)]
struct PostedMessage {
    id: i64,
}

/// Publisher backed by an HTTP chat gateway
///
/// `POST {gateway}/channels/{channel}/messages` creates a message and answers
/// `{"id": <message id>}`; `PATCH {gateway}/channels/{channel}/messages/{id}`
/// edits one. A 404 on edit means the message is gone.
pub struct HttpPublisher {
    client: reqwest::Client,
    gateway_url: String,
}

impl HttpPublisher {
    pub fn new(gateway_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("quartermaster/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self, channel_id: ChannelId) -> String {
        format!("{}/channels/{}/messages", self.gateway_url, channel_id)
    }
}

fn transport(err: reqwest::Error) -> PublishError {
    PublishError::Unavailable(err.to_string())
}

#[async_trait]
impl MessagePublisher for HttpPublisher {
    async fn publish(
        &self,
        channel_id: ChannelId,
        content: &RenderedDashboard,
    ) -> Result<MessageRef, PublishError> {
        let response = self
            .client
            .post(self.messages_url(channel_id))
            .json(content)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(PublishError::Unavailable(format!(
                "gateway returned {} for new message",
                response.status()
            )));
        }

        let posted: PostedMessage = response.json().await.map_err(transport)?;
        debug!("Published dashboard message {} in channel {}", posted.id, channel_id);

        Ok(MessageRef {
            channel_id,
            message_id: MessageId(posted.id),
        })
    }

    async fn edit(&self, message: &MessageRef, content: &RenderedDashboard) -> Result<(), PublishError> {
        let url = format!("{}/{}", self.messages_url(message.channel_id), message.message_id);
        let response = self
            .client
            .patch(url)
            .json(content)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(PublishError::MessageGone(*message))
        } else {
            Err(PublishError::Unavailable(format!(
                "gateway returned {} for message {}",
                status, message.message_id
            )))
        }
    }
}

/// Publisher that only logs renderings
#[derive(Debug, Default)]
pub struct LogPublisher {
    next_id: AtomicI64,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessagePublisher for LogPublisher {
    async fn publish(
        &self,
        channel_id: ChannelId,
        content: &RenderedDashboard,
    ) -> Result<MessageRef, PublishError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Dashboard published to channel {} as message {}: {}", channel_id, id, content.title);

        Ok(MessageRef {
            channel_id,
            message_id: MessageId(id),
        })
    }

    async fn edit(&self, message: &MessageRef, content: &RenderedDashboard) -> Result<(), PublishError> {
        info!(
            "Dashboard message {} in channel {} updated: {}",
            message.message_id, message.channel_id, content.title
        );
        Ok(())
    }
}
