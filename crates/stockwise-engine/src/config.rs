//! # Engine Configuration
//!
//! Configuration management for the inventory engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKWISE_DB_PATH=/var/lib/stockwise/stockwise.db                  │
//! │     STOCKWISE_UTC_OFFSET_MINUTES=60                                    │
//! │     STOCKWISE_ALERT_MODE=level                                         │
//! │     STOCKWISE_MAX_COMMIT_RETRIES=8                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ledger/stockwise.toml (Linux)                            │
//! │     ~/Library/Application Support/com.stockwise.ledger/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     UTC dates, edge alerts, 5 commit attempts                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # stockwise.toml
//! [database]
//! path = "/var/lib/stockwise/stockwise.db"
//! max_connections = 5
//!
//! [clock]
//! utc_offset_minutes = 60   # metric dates are local to UTC+01:00
//!
//! [ledger]
//! max_commit_retries = 5
//! initial_retry_backoff_ms = 5
//! max_retry_backoff_ms = 200
//!
//! [alerts]
//! mode = "edge"             # edge | level
//!
//! [analytics]
//! default_top_selling_limit = 10
//! ```

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use stockwise_db::DbConfig;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// Largest accepted UTC offset, in minutes (UTC-14:00 ..= UTC+14:00).
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

// =============================================================================
// Alert Mode
// =============================================================================

/// When a low-stock notification is requested.
///
/// ```text
/// stock:   30 ─► 20 ─► 15 ─► 40 ─► 18
///                 │     │     │     │
/// EDGE:        alert    -  resolve alert      one notice per crossing
/// LEVEL:       alert  notice resolve alert    a notice on every low commit
/// ```
///
/// Both modes keep at most one active alert per product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    /// Notify once when stock first drops to or below the threshold.
    #[default]
    Edge,

    /// Notify on every commit that leaves stock at or below the threshold.
    Level,
}

impl std::fmt::Display for AlertMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertMode::Edge => write!(f, "edge"),
            AlertMode::Level => write!(f, "level"),
        }
    }
}

impl std::str::FromStr for AlertMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "edge" | "crossing" => Ok(AlertMode::Edge),
            "level" | "always" => Ok(AlertMode::Level),
            other => Err(EngineError::Config(format!(
                "Unknown alert mode: '{}'. Valid options: edge, level",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// SQLite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Defaults to `stockwise.db` in the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Timezone used to bucket transactions into calendar dates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockSettings {
    /// Minutes east of UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Stock ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Commit attempts before giving up with a conflict.
    #[serde(default = "default_max_commit_retries")]
    pub max_commit_retries: u32,

    #[serde(default = "default_initial_retry_backoff")]
    pub initial_retry_backoff_ms: u64,

    #[serde(default = "default_max_retry_backoff")]
    pub max_retry_backoff_ms: u64,
}

fn default_max_commit_retries() -> u32 {
    5
}
fn default_initial_retry_backoff() -> u64 {
    5
}
fn default_max_retry_backoff() -> u64 {
    200
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_commit_retries: default_max_commit_retries(),
            initial_retry_backoff_ms: default_initial_retry_backoff(),
            max_retry_backoff_ms: default_max_retry_backoff(),
        }
    }
}

/// Alert dispatcher settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default)]
    pub mode: AlertMode,
}

/// Analytics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSettings {
    #[serde(default = "default_top_selling_limit")]
    pub default_top_selling_limit: usize,
}

fn default_top_selling_limit() -> usize {
    10
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            default_top_selling_limit: default_top_selling_limit(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub clock: ClockSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub alerts: AlertSettings,

    #[serde(default)]
    pub analytics: AnalyticsSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (stockwise.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
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

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::Config("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        let offset = self.clock.utc_offset_minutes;
        if !(-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&offset) {
            return Err(EngineError::Config(format!(
                "utc_offset_minutes must be within ±{}, got {}",
                MAX_UTC_OFFSET_MINUTES, offset
            )));
        }

        if self.ledger.max_commit_retries == 0 {
            return Err(EngineError::Config(
                "max_commit_retries must be greater than 0".into(),
            ));
        }

        if self.ledger.initial_retry_backoff_ms > self.ledger.max_retry_backoff_ms {
            return Err(EngineError::Config(
                "initial_retry_backoff_ms must not exceed max_retry_backoff_ms".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.analytics.default_top_selling_limit == 0 {
            return Err(EngineError::Config(
                "default_top_selling_limit must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STOCKWISE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(offset) = std::env::var("STOCKWISE_UTC_OFFSET_MINUTES") {
            match offset.parse::<i32>() {
                Ok(minutes) => self.clock.utc_offset_minutes = minutes,
                Err(_) => warn!(offset = %offset, "Invalid UTC offset in environment"),
            }
        }

        if let Ok(mode) = std::env::var("STOCKWISE_ALERT_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding alert mode from environment");
                    self.alerts.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown alert mode in environment"),
            }
        }

        if let Ok(retries) = std::env::var("STOCKWISE_MAX_COMMIT_RETRIES") {
            if let Ok(r) = retries.parse::<u32>() {
                self.ledger.max_commit_retries = r;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockwise", "ledger")
            .map(|dirs| dirs.config_dir().join("stockwise.toml"))
    }

    /// Returns the default database file path.
    fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockwise", "ledger")
            .map(|dirs| dirs.data_dir().join("stockwise.db"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the configured timezone offset.
    pub fn utc_offset(&self) -> EngineResult<FixedOffset> {
        let seconds = self.clock.utc_offset_minutes.checked_mul(60);
        seconds.and_then(FixedOffset::east_opt).ok_or_else(|| {
            EngineError::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.clock.utc_offset_minutes
            ))
        })
    }

    /// Returns the pool configuration for the configured database.
    pub fn db_config(&self) -> EngineResult<DbConfig> {
        let path = self
            .database
            .path
            .clone()
            .or_else(Self::default_database_path)
            .ok_or_else(|| EngineError::Config("No database path available".into()))?;

        Ok(DbConfig::new(path).max_connections(self.database.max_connections))
    }

    /// Initial and maximum backoff between commit attempts.
    pub fn retry_backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.ledger.initial_retry_backoff_ms),
            Duration::from_millis(self.ledger.max_retry_backoff_ms),
        )
    }
}
