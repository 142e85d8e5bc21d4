//! # Sync Configuration
//!
//! Configuration management for the Tally sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     IRONMART_TALLY_URL=http://192.168.1.20:9000                        │
//! │     IRONMART_TALLY_ENABLED=false                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ironmart/tally-sync.toml (Linux)                         │
//! │     ~/Library/Application Support/in.ironmart.ironmart/... (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │                                                                         │
//! │  At runtime `system_settings.tally_sync_enabled` overrides             │
//! │  `tally.enabled` for every job run.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [tally]
//! url = "http://192.168.1.20:9000"
//! company = "IronMart Industrial Supplies"
//! sales_ledger = "Online Sales"
//!
//! [queue]
//! batch_size = 50
//!
//! [schedule]
//! timezone = "Asia/Kolkata"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use ironmart_core::schedule::parse_time_zone;
use ironmart_core::validation::{validate_reference_prefix, validate_tally_name};
use ironmart_core::{Cadence, JobKind, DEFAULT_ABANDONED_ORDER_TIMEOUT_MINS, DEFAULT_MAX_ATTEMPTS};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Tally Settings
// =============================================================================

/// Where Tally lives and how vouchers are framed for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallySettings {
    /// Base URL of the Tally HTTP server (port 9000 by default in Tally).
    #[serde(default = "default_tally_url")]
    pub url: String,

    /// Master switch used when the database has no runtime override.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Company to import into. Unset means Tally's currently loaded company.
    #[serde(default)]
    pub company: Option<String>,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_sales_ledger")]
    pub sales_ledger: String,

    #[serde(default = "default_purchase_ledger")]
    pub purchase_ledger: String,

    /// Party ledger debited on marketplace sales.
    #[serde(default = "default_party_ledger")]
    pub default_party_ledger: String,

    /// Prefix of every REMOTEID/REFERENCE the marketplace writes.
    #[serde(default = "default_reference_prefix")]
    pub reference_prefix: String,
}

fn default_tally_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_true() -> bool {
    true
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_sales_ledger() -> String {
    "Sales".to_string()
}

fn default_purchase_ledger() -> String {
    "Purchase".to_string()
}

fn default_party_ledger() -> String {
    "Marketplace Customers".to_string()
}

fn default_reference_prefix() -> String {
    "IM".to_string()
}

impl Default for TallySettings {
    fn default() -> Self {
        TallySettings {
            url: default_tally_url(),
            enabled: true,
            company: None,
            probe_timeout_secs: default_probe_timeout(),
            request_timeout_secs: default_request_timeout(),
            sales_ledger: default_sales_ledger(),
            purchase_ledger: default_purchase_ledger(),
            default_party_ledger: default_party_ledger(),
            reference_prefix: default_reference_prefix(),
        }
    }
}

impl TallySettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Tasks loaded per page during a drain.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Attempts after which a task is parked as `stuck`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// How long a `queued` claim survives before a drain reclaims it.
    #[serde(default = "default_lease")]
    pub lease_secs: u64,
}

fn default_batch_size() -> i64 {
    50
}

fn default_max_attempts() -> i64 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_lease() -> u64 {
    15 * 60
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            lease_secs: default_lease(),
        }
    }
}

impl QueueSettings {
    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_secs as i64)
    }
}

// =============================================================================
// Schedule Settings
// =============================================================================

/// Time zone plus optional per-job cadence overrides.
///
/// ```toml
/// [schedule]
/// timezone = "Asia/Kolkata"
///
/// [schedule.cadences]
/// voucher_pull = { every_secs = 300 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub cadences: CadenceOverrides,
}

fn default_timezone() -> String {
    "Asia/Kolkata".to_string()
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            timezone: default_timezone(),
            cadences: CadenceOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher_pull: Option<CadenceSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_stock_reset: Option<CadenceSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<CadenceSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandoned_order_cleanup: Option<CadenceSetting>,
}

/// TOML form of a [`Cadence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CadenceSetting {
    Every { every_secs: u64 },
    DailyAt { daily_hour: u32, daily_minute: u32 },
    HourlyAt { hourly_minute: u32 },
}

impl From<CadenceSetting> for Cadence {
    fn from(setting: CadenceSetting) -> Self {
        match setting {
            CadenceSetting::Every { every_secs } => Cadence::Every(Duration::from_secs(every_secs)),
            CadenceSetting::HourlyAt { hourly_minute } => Cadence::HourlyAt {
                minute: hourly_minute,
            },
            CadenceSetting::DailyAt {
                daily_hour,
                daily_minute,
            } => Cadence::DailyAt {
                hour: daily_hour,
                minute: daily_minute,
            },
        }
    }
}

impl CadenceOverrides {
    fn get(&self, kind: JobKind) -> Option<CadenceSetting> {
        match kind {
            JobKind::VoucherPull => self.voucher_pull,
            JobKind::FullStockReset => self.full_stock_reset,
            JobKind::HealthCheck => self.health_check,
            JobKind::AbandonedOrderCleanup => self.abandoned_order_cleanup,
        }
    }
}

// =============================================================================
// Retention / Orders / Admin / Database
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    #[serde(default = "default_retention_days")]
    pub days: i64,

    #[serde(default = "default_max_entries")]
    pub max_entries: i64,
}

fn default_retention_days() -> i64 {
    30
}

fn default_max_entries() -> i64 {
    1000
}

impl Default for RetentionSettings {
    fn default() -> Self {
        RetentionSettings {
            days: default_retention_days(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettings {
    /// Minutes an unpaid online order holds stock before it is released.
    #[serde(default = "default_abandoned_timeout")]
    pub abandoned_timeout_mins: i64,
}

fn default_abandoned_timeout() -> i64 {
    DEFAULT_ABANDONED_ORDER_TIMEOUT_MINS
}

impl Default for OrderSettings {
    fn default() -> Self {
        OrderSettings {
            abandoned_timeout_mins: default_abandoned_timeout(),
        }
    }
}

impl OrderSettings {
    pub fn abandoned_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.abandoned_timeout_mins)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_admin_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    8787
}

impl Default for AdminSettings {
    fn default() -> Self {
        AdminSettings {
            bind_addr: default_bind_addr(),
            port: default_admin_port(),
        }
    }
}

impl AdminSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("in", "ironmart", "ironmart")
        .map(|dirs| dirs.data_dir().join("marketplace.db"))
        .unwrap_or_else(|| PathBuf::from("marketplace.db"))
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub tally: TallySettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub retention: RetentionSettings,

    #[serde(default)]
    pub orders: OrderSettings,

    #[serde(default)]
    pub admin: AdminSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally-sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        let url = url::Url::parse(&self.tally.url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Tally URL must start with http:// or https://, got: {}",
                self.tally.url
            )));
        }

        if self.tally.probe_timeout_secs == 0 || self.tally.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig("timeouts must be greater than 0".into()));
        }

        validate_reference_prefix(&self.tally.reference_prefix)?;
        validate_tally_name("sales_ledger", &self.tally.sales_ledger)?;
        validate_tally_name("purchase_ledger", &self.tally.purchase_ledger)?;
        validate_tally_name("default_party_ledger", &self.tally.default_party_ledger)?;

        if self.queue.batch_size <= 0 {
            return Err(SyncError::InvalidConfig("batch_size must be greater than 0".into()));
        }
        if self.queue.max_attempts <= 0 {
            return Err(SyncError::InvalidConfig("max_attempts must be greater than 0".into()));
        }
        if self.retention.days <= 0 || self.retention.max_entries <= 0 {
            return Err(SyncError::InvalidConfig("retention limits must be greater than 0".into()));
        }
        if self.orders.abandoned_timeout_mins <= 0 {
            return Err(SyncError::InvalidConfig(
                "abandoned_timeout_mins must be greater than 0".into(),
            ));
        }

        parse_time_zone(&self.schedule.timezone)?;
        for kind in JobKind::ALL {
            self.cadence(kind).validate()?;
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("IRONMART_TALLY_URL") {
            debug!(url = %url, "Overriding Tally URL from environment");
            self.tally.url = url;
        }

        if let Ok(enabled) = std::env::var("IRONMART_TALLY_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.tally.enabled = true,
                "false" | "0" | "no" => self.tally.enabled = false,
                _ => warn!(value = %enabled, "Unknown IRONMART_TALLY_ENABLED value"),
            }
        }

        if let Ok(path) = std::env::var("IRONMART_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }

        if let Ok(port) = std::env::var("IRONMART_ADMIN_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                debug!(port = p, "Overriding admin port from environment");
                self.admin.port = p;
            }
        }

        if let Ok(tz) = std::env::var("IRONMART_TIMEZONE") {
            self.schedule.timezone = tz;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("in", "ironmart", "ironmart")
            .map(|dirs| dirs.config_dir().join("tally-sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Cadence for a job: the override if configured, else the default table.
    pub fn cadence(&self, kind: JobKind) -> Cadence {
        self.schedule
            .cadences
            .get(kind)
            .map(Cadence::from)
            .unwrap_or_else(|| kind.default_cadence())
    }

    pub fn time_zone(&self) -> SyncResult<chrono_tz::Tz> {
        Ok(parse_time_zone(&self.schedule.timezone)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.tally.url, "http://localhost:9000");
        assert_eq!(config.tally.probe_timeout_secs, 5);
        assert_eq!(config.tally.request_timeout_secs, 30);
        assert_eq!(config.queue.max_attempts, 10);
        assert_eq!(config.retention.days, 30);
        assert_eq!(config.retention.max_entries, 1000);
        assert_eq!(config.orders.abandoned_timeout_mins, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_cadence_table() {
        let config = SyncConfig::default();
        assert_eq!(
            config.cadence(JobKind::VoucherPull),
            Cadence::Every(Duration::from_secs(600))
        );
        assert_eq!(
            config.cadence(JobKind::FullStockReset),
            Cadence::DailyAt { hour: 2, minute: 0 }
        );
        assert_eq!(config.cadence(JobKind::HealthCheck), Cadence::HourlyAt { minute: 0 });
        assert_eq!(
            config.cadence(JobKind::AbandonedOrderCleanup),
            Cadence::Every(Duration::from_secs(1800))
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [tally]
            url = "http://192.168.1.20:9000"
            company = "IronMart Industrial Supplies"

            [schedule.cadences]
            voucher_pull = { every_secs = 300 }
            full_stock_reset = { daily_hour = 3, daily_minute = 30 }
            "#,
        )
        .unwrap();

        assert_eq!(config.tally.company.as_deref(), Some("IronMart Industrial Supplies"));
        assert_eq!(config.tally.sales_ledger, "Sales");
        assert_eq!(config.queue.batch_size, 50);
        assert_eq!(
            config.cadence(JobKind::VoucherPull),
            Cadence::Every(Duration::from_secs(300))
        );
        assert_eq!(
            config.cadence(JobKind::FullStockReset),
            Cadence::DailyAt { hour: 3, minute: 30 }
        );
        assert_eq!(config.cadence(JobKind::HealthCheck), Cadence::HourlyAt { minute: 0 });
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.tally.url = "ftp://tally".to_string();
        assert!(config.validate().is_err());

        config.tally.url = "http://tally.local:9000".to_string();
        config.schedule.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        config.schedule.timezone = "Asia/Kolkata".to_string();
        config.queue.batch_size = 0;
        assert!(config.validate().is_err());

        config.queue.batch_size = 10;
        config.schedule.cadences.health_check = Some(CadenceSetting::HourlyAt { hourly_minute: 75 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[tally]"));
        assert!(toml_str.contains("[queue]"));
        assert!(toml_str.contains("[schedule]"));
    }
}
