//! Outbound alerting for failure conditions
//!
//! The engine receives a [`Notifier`] at construction and calls it for
//! failures an operator should hear about (failed actions, failed metadata
//! fetches at flush time, failed snapshot writes). Delivery is best-effort.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, instrument};

use crate::config::{Alert, Discord, Webhook};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Fire a notification without waiting for delivery
pub fn notify_detached(notifier: &Arc<dyn Notifier>, message: String) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        notifier.notify(&message).await;
    });
}

/// Notifier used when no alert target is configured
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, message: &str) {
        debug!("no alert target configured, dropping notification: {message}");
    }
}

#[derive(Debug, Clone, Serialize)]
struct DiscordMessage {
    content: String,
}

/// Posts notifications to a Discord or generic webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    alert: Alert,
    source: String,
}

impl WebhookNotifier {
    /// `source` names the monitored container in generic webhook payloads
    pub fn new(alert: Alert, source: impl ToString) -> Self {
        Self {
            client: Client::new(),
            alert,
            source: source.to_string(),
        }
    }

    /// Build the notifier for an optional alert configuration
    pub fn from_config(alert: Option<Alert>, source: impl ToString) -> Arc<dyn Notifier> {
        match alert {
            Some(alert) => Arc::new(Self::new(alert, source)),
            None => Arc::new(NoopNotifier),
        }
    }

    #[instrument(skip(self, discord, message))]
    async fn send_discord(&self, discord: &Discord, message: &str) {
        let content = match &discord.user_id {
            Some(user_id) => format!("{message} <@{user_id}>"),
            None => message.to_string(),
        };

        match self
            .client
            .post(&discord.url)
            .json(&DiscordMessage { content })
            .send()
            .await
        {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent Discord message");
                } else {
                    error!("Discord message failed with status: {}", response.status());
                    if let Ok(error_text) = response.text().await {
                        error!("Discord API error response: {}", error_text);
                    }
                }
            }
            Err(e) => {
                error!("Failed to send Discord message: {}", e);
            }
        }
    }

    #[instrument(skip(self, webhook, message))]
    async fn send_webhook(&self, webhook: &Webhook, message: &str) {
        let payload = json!({
            "message": message,
            "source": self.source,
            "timestamp": Utc::now().to_rfc3339()
        });

        match self.client.post(&webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) {
        match &self.alert {
            Alert::Discord(discord) => self.send_discord(discord, message).await,
            Alert::Webhook(webhook) => self.send_webhook(webhook, message).await,
        }
    }
}
