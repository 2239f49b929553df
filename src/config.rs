//! Runtime configuration from environment variables.
//!
//! Credentials for the search engine and the oracle are read by their own
//! adapters (`GoogleSearchConfig::from_env`, `LlmConfig::from_env`); this
//! module covers storage, scheduling, dispatch and the outbound senders.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::channels::{
    CapabilityTable, Channel, ChannelLimits, EmailSender, RelayConfig, RelaySender, SmtpConfig,
};
use crate::dispatch::{DispatchConfig, RunnerConfig};
use crate::error::ConfigError;
use crate::quota::LimiterConfig;

pub const DEFAULT_DB_PATH: &str = "./data/nexus.db";

/// Process configuration.
#[derive(Debug, Clone)]
pub struct NexusConfig {
    pub db_path: PathBuf,
    pub dispatch: DispatchConfig,
    pub runner: RunnerConfig,
    pub limiter: LimiterConfig,
    /// `NEXUS_LIMIT_<CHANNEL>` overrides of the channel defaults.
    pub limit_overrides: BTreeMap<Channel, ChannelLimits>,
    /// Status server port; disabled when unset.
    pub status_port: Option<u16>,
    /// Rolling log directory; file logging disabled when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            dispatch: DispatchConfig::default(),
            runner: RunnerConfig::default(),
            limiter: LimiterConfig::default(),
            limit_overrides: BTreeMap::new(),
            status_port: None,
            log_dir: None,
        }
    }
}

impl NexusConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get("NEXUS_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(v) = get("NEXUS_MAX_ATTEMPTS") {
            config.dispatch.max_attempts = parse_positive("NEXUS_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("NEXUS_MAX_IN_FLIGHT") {
            config.dispatch.max_in_flight = parse_positive::<u32>("NEXUS_MAX_IN_FLIGHT", &v)? as usize;
        }
        if let Some(v) = get("NEXUS_SEND_TIMEOUT_SECS") {
            config.dispatch.send_timeout = secs("NEXUS_SEND_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = get("NEXUS_RUN_BUDGET_SECS") {
            config.runner.run_budget = secs("NEXUS_RUN_BUDGET_SECS", &v)?;
        }
        if let Some(v) = get("NEXUS_IDLE_SLEEP_SECS") {
            config.runner.idle_sleep = secs("NEXUS_IDLE_SLEEP_SECS", &v)?;
        }
        if let Some(v) = get("NEXUS_CYCLE_SLEEP_SECS") {
            config.runner.cycle_sleep = secs("NEXUS_CYCLE_SLEEP_SECS", &v)?;
        }
        if let Some(v) = get("NEXUS_ERROR_SLEEP_SECS") {
            config.runner.error_sleep = secs("NEXUS_ERROR_SLEEP_SECS", &v)?;
        }

        if let Some(v) = get("NEXUS_WEIGHT_NORMALIZATION") {
            config.limiter.normalization = parse_positive("NEXUS_WEIGHT_NORMALIZATION", &v)?;
        }

        for channel in Channel::ALL {
            let key = format!("NEXUS_LIMIT_{}", channel.as_str().to_ascii_uppercase());
            if let Some(v) = get(&key) {
                config.limit_overrides.insert(channel, parse_limits(&key, &v)?);
            }
        }

        if let Some(v) = get("NEXUS_STATUS_PORT") {
            config.status_port = Some(v.trim().parse().map_err(|_| invalid("NEXUS_STATUS_PORT", &v))?);
        }
        config.log_dir = get("NEXUS_LOG_DIR").map(PathBuf::from);

        Ok(config)
    }

    /// Effective limits for `channel`: override, else the channel default.
    pub fn limits_for(&self, channel: Channel) -> ChannelLimits {
        self.limit_overrides
            .get(&channel)
            .copied()
            .unwrap_or_else(|| channel.default_limits())
    }

    /// Register every sender the environment configures: SMTP for email,
    /// an HTTP relay for each other channel with a relay URL. At least one
    /// is required.
    pub fn build_capabilities(&self) -> Result<CapabilityTable, ConfigError> {
        let mut table = CapabilityTable::new();

        if let Some(smtp) = SmtpConfig::from_env() {
            tracing::info!(host = %smtp.host, port = smtp.port, "Email sender enabled");
            table.register(
                Channel::Email,
                self.limits_for(Channel::Email),
                Arc::new(EmailSender::new(smtp)),
            );
        }

        for channel in Channel::ALL.into_iter().filter(|c| *c != Channel::Email) {
            let Some(relay) = RelayConfig::from_env(channel)? else {
                continue;
            };
            let sender = RelaySender::new(relay).map_err(|e| ConfigError::InvalidValue {
                key: RelayConfig::url_key(channel),
                message: e.to_string(),
            })?;
            table.register(channel, self.limits_for(channel), Arc::new(sender));
        }

        if table.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "SMTP_HOST or NEXUS_RELAY_<CHANNEL>_URL".to_string(),
                hint: "configure at least one outbound sender".to_string(),
            });
        }
        Ok(table)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse '{value}'"),
    }
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed: T = value.trim().parse().map_err(|_| invalid(key, value))?;
    if parsed <= T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}

pub(crate) fn secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_positive::<u64>(key, value).map(Duration::from_secs)
}

/// Parse an `hourly/daily` pair such as `10/50`.
pub fn parse_limits(key: &str, value: &str) -> Result<ChannelLimits, ConfigError> {
    let (hourly, daily) = value.split_once('/').ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected hourly/daily, got '{value}'"),
    })?;
    let hourly: u32 = parse_positive(key, hourly)?;
    let daily: u32 = parse_positive(key, daily)?;
    if daily < hourly {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("daily limit {daily} is below hourly limit {hourly}"),
        });
    }
    Ok(ChannelLimits::new(hourly, daily))
}
