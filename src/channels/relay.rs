//! Relay sender: hands social-channel messages to an HTTP relay.
//!
//! Platform APIs (DMs, inboxes) live behind the relay; this side only
//! posts `{channel, target, subject, body}` and treats any 2xx as delivered.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::channels::{Channel, OutreachMessage, OutreachSender};
use crate::config::secs;
use crate::error::{ChannelError, ConfigError};

/// Relay endpoint configuration for a single channel.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub channel: Channel,
    pub url: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl RelayConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

    /// Read `NEXUS_RELAY_<CHANNEL>_URL` (+ shared `NEXUS_RELAY_TOKEN` and
    /// `NEXUS_RELAY_TIMEOUT_SECS`). `Ok(None)` if the URL is not set.
    pub fn from_env(channel: Channel) -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(channel, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        channel: Channel,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let Some(url) = get(&Self::url_key(channel)) else {
            return Ok(None);
        };
        let token = get("NEXUS_RELAY_TOKEN").map(SecretString::from);
        let timeout = match get("NEXUS_RELAY_TIMEOUT_SECS") {
            Some(v) => secs("NEXUS_RELAY_TIMEOUT_SECS", &v)?,
            None => Self::DEFAULT_TIMEOUT,
        };

        Ok(Some(Self {
            channel,
            url,
            token,
            timeout,
        }))
    }

    pub fn url_key(channel: Channel) -> String {
        format!("NEXUS_RELAY_{}_URL", channel.as_str().to_ascii_uppercase())
    }
}

#[derive(Debug, Serialize)]
struct RelayPayload<'a> {
    channel: Channel,
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    body: &'a str,
}

/// HTTP relay sender for one channel.
pub struct RelaySender {
    config: RelayConfig,
    name: String,
    http: reqwest::Client,
}

impl RelaySender {
    pub fn new(config: RelayConfig) -> Result<Self, ChannelError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChannelError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            name: format!("relay:{}", config.channel),
            config,
            http,
        })
    }
}

#[async_trait]
impl OutreachSender for RelaySender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, target: &str, message: &OutreachMessage) -> Result<(), ChannelError> {
        let channel = self.config.channel;
        let payload = RelayPayload {
            channel,
            target,
            subject: message.subject.as_deref(),
            body: &message.body,
        };

        let mut request = self.http.post(&self.config.url).json(&payload);
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| ChannelError::SendFailed {
            name: channel.to_string(),
            reason: format!("relay request failed: {e}"),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ChannelError::AuthFailed {
                name: channel.to_string(),
                reason: format!("relay returned {status}"),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: channel.to_string(),
                reason: format!("relay returned {status}: {}", text.chars().take(200).collect::<String>()),
            });
        }

        tracing::info!(channel = %channel, target = target, "Relay accepted message");
        Ok(())
    }
}
