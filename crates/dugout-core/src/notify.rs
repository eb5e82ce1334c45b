// Notification side channel.
//
// Channel posts and direct messages are fire-and-forget from the core's point
// of view: a failed delivery is logged and never blocks or reverses a state
// transition.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_to_channel(&self, channel: &str, message: &str) -> anyhow::Result<()>;

    async fn send_direct_message(&self, user_id: &str, message: &str) -> anyhow::Result<()>;
}

/// Post to a channel, logging instead of propagating any failure.
pub async fn announce(notifier: &dyn Notifier, channel: &str, message: &str) {
    if let Err(e) = notifier.post_to_channel(channel, message).await {
        warn!(channel, "failed to post notification: {e:#}");
    }
}

/// Direct-message a user, logging instead of propagating any failure.
pub async fn direct_message(notifier: &dyn Notifier, user_id: &str, message: &str) {
    if let Err(e) = notifier.send_direct_message(user_id, message).await {
        warn!(user_id, "failed to send direct message: {e:#}");
    }
}

/// Notifications queued while the draft lock is held and delivered once it
/// has been released, in the order they were queued.
#[derive(Debug, Default)]
pub struct Outbox {
    queued: Vec<Outgoing>,
}

#[derive(Debug, Clone, PartialEq)]
enum Outgoing {
    Channel { channel: String, message: String },
    Direct { user_id: String, message: String },
}

impl Outbox {
    pub fn post(&mut self, channel: &str, message: impl Into<String>) {
        self.queued.push(Outgoing::Channel {
            channel: channel.to_string(),
            message: message.into(),
        });
    }

    pub fn direct(&mut self, user_id: &str, message: impl Into<String>) {
        self.queued.push(Outgoing::Direct {
            user_id: user_id.to_string(),
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Best-effort delivery of everything queued.
    pub async fn deliver(self, notifier: &dyn Notifier) {
        for item in self.queued {
            match item {
                Outgoing::Channel { channel, message } => {
                    announce(notifier, &channel, &message).await
                }
                Outgoing::Direct { user_id, message } => {
                    direct_message(notifier, &user_id, &message).await
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Writes every notification to the log. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn post_to_channel(&self, channel: &str, message: &str) -> anyhow::Result<()> {
        info!(channel, "{message}");
        Ok(())
    }

    async fn send_direct_message(&self, user_id: &str, message: &str) -> anyhow::Result<()> {
        info!(user_id, "DM: {message}");
        Ok(())
    }
}

/// Posts notifications as JSON to an HTTP webhook relay.
///
/// Body shape: `{"kind": "channel"|"direct", "target": "...", "content": "..."}`.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

/// Upper bound on a single relay request.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

impl WebhookNotifier {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self { http, url })
    }

    async fn send(&self, kind: &str, target: &str, content: &str) -> anyhow::Result<()> {
        let body = json!({
            "kind": kind,
            "target": target,
            "content": content,
        });
        self.http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn post_to_channel(&self, channel: &str, message: &str) -> anyhow::Result<()> {
        self.send("channel", channel, message).await
    }

    async fn send_direct_message(&self, user_id: &str, message: &str) -> anyhow::Result<()> {
        self.send("direct", user_id, message).await
    }
}
