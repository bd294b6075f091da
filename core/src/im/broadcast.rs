//! Broadcaster: formats one feed event and delivers it to every recipient in the directory.
//! Best-effort fan-out: each recipient is attempted exactly once, failures are logged and
//! reported, never retried, and never stop delivery to the others.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use super::log::{prefix_channel, truncate_content_default};
use super::transport::{FormatMode, ImTransport, Recipient};
use crate::config::{Config, ConfigError};
use crate::stats::Stats;

/// One matched feed item, pushed by the fetch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub title: String,
    pub url: String,
    pub group: String,
    pub published: DateTime<Utc>,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
}

/// Recipient directory, fixed for the process lifetime. Users come before channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipients {
    users: Vec<i64>,
    channels: Vec<String>,
}

impl Recipients {
    /// Validate the directory from config. Any bad id is fatal.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let users = config
            .users
            .iter()
            .map(|u| u.trim().parse::<i64>().map_err(|_| ConfigError::InvalidUserId(u.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let channels = config
            .channels
            .iter()
            .map(|c| {
                let c = c.trim();
                let valid = match c.strip_prefix('@') {
                    Some(name) => !name.is_empty() && !name.contains(char::is_whitespace),
                    None => c.parse::<i64>().is_ok(),
                };
                if valid {
                    Ok(c.to_string())
                } else {
                    Err(ConfigError::InvalidChannelId(c.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { users, channels })
    }

    pub fn users(&self) -> &[i64] {
        &self.users
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    fn len(&self) -> usize {
        self.users.len() + self.channels.len()
    }

    /// Every target in delivery order: users, then channels.
    pub fn iter(&self) -> impl Iterator<Item = Recipient> + '_ {
        self.users
            .iter()
            .map(|id| Recipient::Chat(*id))
            .chain(self.channels.iter().map(|c| match c.parse::<i64>() {
                Ok(id) => Recipient::Chat(id),
                Err(_) => Recipient::Channel(c.clone()),
            }))
    }
}

/// Outcome of one send during a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub recipient: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-recipient results of one broadcast, in directory order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl BroadcastReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

/// Render the notification text. Pure: same event and offset, same text.
pub fn format_event(event: &DeliveryEvent, offset: FixedOffset) -> String {
    let keywords = event
        .matched_keywords
        .iter()
        .map(|k| format!("*{}*", k))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "*{}*\n📡  {}\n🔍  {}\n🏷️  *{}*\n🕒  *{}*",
        event.title,
        event.url,
        keywords,
        event.group,
        event.published.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S")
    )
}

pub struct Broadcaster {
    transport: Arc<dyn ImTransport>,
    recipients: Arc<Recipients>,
    stats: Arc<Stats>,
    offset: FixedOffset,
}

impl Broadcaster {
    pub fn new(
        transport: Arc<dyn ImTransport>,
        recipients: Arc<Recipients>,
        stats: Arc<Stats>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            transport,
            recipients,
            stats,
            offset,
        }
    }

    /// Format and send `event` to every recipient concurrently. Never fails; see the report.
    pub async fn broadcast(&self, event: &DeliveryEvent) -> BroadcastReport {
        let text = format_event(event, self.offset);
        let log_prefix = prefix_channel(self.transport.capabilities().channel_id_prefix);
        tracing::info!(
            "{} direction=broadcast recipients={} content={}",
            log_prefix,
            self.recipients.len(),
            truncate_content_default(&text)
        );

        let sends = self.recipients.iter().map(|to| {
            let text = text.as_str();
            async move {
                let result = self.transport.send(&to, text, FormatMode::Markdown).await;
                (to, result)
            }
        });

        let mut outcomes = Vec::with_capacity(self.recipients.len());
        for (to, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    tracing::info!("{} chat_id={} direction=broadcast delivered", log_prefix, to);
                    self.stats.increment_message_count();
                    outcomes.push(DeliveryOutcome {
                        recipient: to.to_string(),
                        delivered: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!("{} chat_id={} direction=broadcast error={}", log_prefix, to, e);
                    outcomes.push(DeliveryOutcome {
                        recipient: to.to_string(),
                        delivered: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        BroadcastReport { outcomes }
    }
}
