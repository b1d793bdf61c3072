//! Alert delivery to Discord and generic webhooks
//!
//! A [`Notifier`] turns into an alert callback via [`Notifier::into_callback`]. The
//! callback only spawns the HTTP request onto the runtime, so slow endpoints never hold
//! up alert dispatch.

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument};

use crate::config::{self, Discord, Webhook};

use super::{Alert, AlertSeverity};

/// Discord webhook body: an optional mention line and one embed per alert
#[derive(Debug, Clone, Serialize)]
struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl Message {
    fn for_alert(alert: &Alert, user_id: Option<&str>) -> Self {
        Self {
            content: user_id
                .map(|user_id| format!("[{}] {} <@{user_id}>", alert.severity, alert.title)),
            embeds: vec![Embed::from(alert)],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    fields: Vec<EmbedField>,
    footer: EmbedFooter,
    /// RFC 3339 creation time of the alert
    timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

impl EmbedField {
    fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbedFooter {
    text: String,
}

impl AlertSeverity {
    fn embed_color(&self) -> u32 {
        match self {
            AlertSeverity::Info => 0x5865F2,
            AlertSeverity::Warning => 0xE67E22,
            AlertSeverity::Critical => 0xE74C3C,
            AlertSeverity::Emergency => 0x992D22,
        }
    }
}

impl From<&Alert> for Embed {
    fn from(alert: &Alert) -> Self {
        let mut fields = vec![
            EmbedField::inline("Severity", alert.severity.as_str()),
            EmbedField::inline("Component", alert.component.clone()),
        ];

        // the reading that tripped the rule and its limit, when the rule recorded them
        fields.extend(
            ["value", "threshold"]
                .into_iter()
                .filter_map(|key| Some(EmbedField::inline(key, alert.metrics.get(key)?.to_string()))),
        );

        Self {
            title: alert.title.clone(),
            description: alert.message.clone(),
            color: alert.severity.embed_color(),
            fields,
            footer: EmbedFooter {
                text: format!("Alert: {}", alert.id),
            },
            timestamp: alert.created_at.to_rfc3339(),
        }
    }
}

/// Sends alerts to one configured target
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    target: config::Alert,
}

impl Notifier {
    pub fn new(target: config::Alert) -> Self {
        Self {
            client: Client::new(),
            target,
        }
    }

    #[instrument(skip(self, alert), fields(alert = %alert.id))]
    pub async fn send(&self, alert: &Alert) -> Result<()> {
        match &self.target {
            config::Alert::Discord(discord) => self.send_discord(discord, alert).await,
            config::Alert::Webhook(webhook) => self.send_webhook(webhook, alert).await,
        }
    }

    async fn send_discord(&self, discord: &Discord, alert: &Alert) -> Result<()> {
        let message = Message::for_alert(alert, discord.user_id.as_deref());
        self.post(&discord.url, &message).await
    }

    async fn send_webhook(&self, webhook: &Webhook, alert: &Alert) -> Result<()> {
        let payload = json!({
            "message": format!("[{}] {}: {}", alert.severity, alert.title, alert.message),
            "alert": alert,
            "timestamp": Utc::now().to_rfc3339()
        });

        self.post(&webhook.url, &payload).await
    }

    async fn post(&self, url: &str, body: &impl Serialize) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("failed to send alert")?;

        if !response.status().is_success() {
            anyhow::bail!("alert endpoint responded with {}", response.status());
        }

        info!("successfully sent alert notification");
        Ok(())
    }

    /// Alert callback that delivers in the background
    pub fn into_callback(self) -> impl Fn(&Alert) -> Result<()> + Send + Sync + 'static {
        move |alert: &Alert| -> Result<()> {
            let runtime = tokio::runtime::Handle::try_current()
                .context("alert notifier requires a tokio runtime")?;

            let notifier = self.clone();
            let alert = alert.clone();
            runtime.spawn(async move {
                if let Err(e) = notifier.send(&alert).await {
                    error!("failed to deliver alert {}: {e:#}", alert.id);
                }
            });

            Ok(())
        }
    }
}
