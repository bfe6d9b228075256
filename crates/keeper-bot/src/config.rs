//! Application configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use keeper_engine::KeeperConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Environment variable overriding the alert webhook URL.
pub const WEBHOOK_URL_ENV: &str = "WEBHOOK_URL_TRIGGER";

/// Scan cycle tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperSection {
    /// Scan cycle interval (ms). Default: 1,000.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Perpetual trigger cooldown (ms). Default: 10,000.
    #[serde(default = "default_trigger_cooldown_ms")]
    pub trigger_cooldown_ms: u64,
    /// Minimum slots between account index resyncs. Default: 50.
    #[serde(default = "default_resync_cooldown_slots")]
    pub resync_cooldown_slots: u64,
    /// Snapshot lock timeout in scan intervals. Default: 10.
    #[serde(default = "default_snapshot_lock_timeout_intervals")]
    pub snapshot_lock_timeout_intervals: u32,
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_trigger_cooldown_ms() -> u64 {
    10_000
}

fn default_resync_cooldown_slots() -> u64 {
    50
}

fn default_snapshot_lock_timeout_intervals() -> u32 {
    10
}

impl Default for KeeperSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            trigger_cooldown_ms: default_trigger_cooldown_ms(),
            resync_cooldown_slots: default_resync_cooldown_slots(),
            snapshot_lock_timeout_intervals: default_snapshot_lock_timeout_intervals(),
        }
    }
}

/// Slot polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsSection {
    /// Slot poll interval (ms). Default: 400.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Whether the account loader tracks slots. Without it resyncs are not throttled.
    #[serde(default = "default_account_loader_polling")]
    pub account_loader_polling: bool,
}

fn default_poll_interval_ms() -> u64 {
    400
}

fn default_account_loader_polling() -> bool {
    true
}

impl Default for SlotsSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            account_loader_polling: default_account_loader_polling(),
        }
    }
}

/// Operator alerts. Alerts go to the log when no webhook is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsSection {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Health and metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_health_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_health_port() -> u16 {
    8888
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_health_port(),
        }
    }
}

/// Top-level bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Keeper name, used in logs, alerts and metric labels.
    #[serde(default = "default_name")]
    pub name: String,
    /// Log would-be triggers instead of submitting them.
    #[serde(default)]
    pub dry_run: bool,
    /// Base URL of the keeper gateway.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Keeper identity reported in error metrics.
    #[serde(default = "default_identity")]
    pub identity: String,
    #[serde(default)]
    pub keeper: KeeperSection,
    #[serde(default)]
    pub slots: SlotsSection,
    #[serde(default)]
    pub alerts: AlertsSection,
    #[serde(default)]
    pub health: HealthSection,
}

fn default_name() -> String {
    "trigger".to_string()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8899".to_string()
}

fn default_identity() -> String {
    "keeper".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            dry_run: false,
            gateway_url: default_gateway_url(),
            identity: default_identity(),
            keeper: KeeperSection::default(),
            slots: SlotsSection::default(),
            alerts: AlertsSection::default(),
            health: HealthSection::default(),
        }
    }
}

impl AppConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(path: &str) -> AppResult<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Self::default()
        };
        config.override_webhook(std::env::var(WEBHOOK_URL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Replace the webhook URL when an override is set.
    pub fn override_webhook(&mut self, url: Option<String>) {
        if let Some(url) = url {
            self.alerts.webhook_url = Some(url);
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Config("name must not be empty".to_string()));
        }
        if self.gateway_url.trim().is_empty() {
            return Err(AppError::Config("gateway_url must not be empty".to_string()));
        }
        if self.keeper.interval_ms == 0 {
            return Err(AppError::Config("keeper.interval_ms must be > 0".to_string()));
        }
        if self.keeper.snapshot_lock_timeout_intervals == 0 {
            return Err(AppError::Config(
                "keeper.snapshot_lock_timeout_intervals must be > 0".to_string(),
            ));
        }
        if self.slots.poll_interval_ms == 0 {
            return Err(AppError::Config("slots.poll_interval_ms must be > 0".to_string()));
        }
        if matches!(&self.alerts.webhook_url, Some(url) if url.trim().is_empty()) {
            return Err(AppError::Config("alerts.webhook_url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Engine configuration derived from this file.
    #[must_use]
    pub fn keeper_config(&self) -> KeeperConfig {
        KeeperConfig {
            name: self.name.clone(),
            interval: self.interval(),
            trigger_cooldown: Duration::from_millis(self.keeper.trigger_cooldown_ms),
            resync_cooldown_slots: self.keeper.resync_cooldown_slots,
            snapshot_lock_timeout_intervals: self.keeper.snapshot_lock_timeout_intervals,
            dry_run: self.dry_run,
            ..KeeperConfig::default()
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.keeper.interval_ms)
    }

    #[must_use]
    pub fn slot_poll_interval(&self) -> Duration {
        Duration::from_millis(self.slots.poll_interval_ms)
    }

    /// Address of the health and metrics endpoint.
    pub fn health_addr(&self) -> AppResult<SocketAddr> {
        format!("{}:{}", self.health.bind_addr, self.health.port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid health address: {e}")))
    }
}
