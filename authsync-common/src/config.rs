//! Engine configuration loading and defaults
//!
//! Configuration is host-side: the engine takes an [`EngineConfig`] value and
//! never reads files or environment variables itself. Hosts that want a file
//! use [`load_config`], which resolves in this order:
//! 1. Explicit path (highest priority, must exist and parse)
//! 2. `<config_dir>/authsync/config.toml` if present
//! 3. Compiled defaults (fallback, logged as a warning)

use crate::tier::AuthorityTier;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Bounded retry policy for one tier: fixed delay, capped attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl RetryBudget {
    pub const fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Primary data may arrive through a slow external fetch
    pub const PRIMARY_DEFAULT: RetryBudget = RetryBudget::new(10, 3000);

    /// Secondary/Tertiary are backed by local, fast-initializing components
    pub const LOCAL_DEFAULT: RetryBudget = RetryBudget::new(5, 1000);
}

/// Per-tier retry budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBudgets {
    pub primary: RetryBudget,
    pub secondary: RetryBudget,
    pub tertiary: RetryBudget,
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self {
            primary: RetryBudget::PRIMARY_DEFAULT,
            secondary: RetryBudget::LOCAL_DEFAULT,
            tertiary: RetryBudget::LOCAL_DEFAULT,
        }
    }
}

impl RetryBudgets {
    /// Budget for an external tier; `None` for `Manual`, which never retries
    pub fn for_tier(&self, tier: AuthorityTier) -> Option<RetryBudget> {
        match tier {
            AuthorityTier::Primary => Some(self.primary),
            AuthorityTier::Secondary => Some(self.secondary),
            AuthorityTier::Tertiary => Some(self.tertiary),
            AuthorityTier::Manual => None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Optional log file path (stdout when absent)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Authorization engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// When false every identity may interact
    pub enforcement_enabled: bool,

    /// Session owner always passes the gate when set
    pub owner_override: bool,

    /// Static fallback list used when no external tier supplies data
    pub manual_list: Vec<String>,

    /// Interval between change-indicator checks on the active tier
    pub drift_poll_interval_secs: u64,

    pub retry: RetryBudgets,

    /// Capacity of the notification channel
    pub event_bus_capacity: usize,

    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforcement_enabled: true,
            owner_override: true,
            manual_list: Vec::new(),
            drift_poll_interval_secs: 10,
            retry: RetryBudgets::default(),
            event_bus_capacity: 100,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn drift_poll_interval(&self) -> Duration {
        Duration::from_secs(self.drift_poll_interval_secs)
    }

    /// Reject values that would turn the schedulers into busy loops
    pub fn validate(&self) -> Result<()> {
        if self.drift_poll_interval_secs == 0 {
            return Err(Error::Config(
                "drift_poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        for tier in AuthorityTier::EXTERNAL {
            if let Some(budget) = self.retry.for_tier(tier) {
                if budget.delay_ms == 0 {
                    return Err(Error::Config(format!(
                        "retry.{}.delay_ms must be greater than zero",
                        tier
                    )));
                }
            }
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config(
                "event_bus_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Default configuration file path for the platform
///
/// `None` when the platform has no notion of a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("authsync").join("config.toml"))
}

/// Load engine configuration following the priority order in the module docs
///
/// An explicit path that is missing or malformed is an error. A malformed
/// file at the default location is also an error, but its absence is not:
/// the compiled defaults are used instead.
pub fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }

    if let Some(path) = default_config_path() {
        if path.exists() {
            return load_config_file(&path);
        }
    }

    warn!("No authsync config file found, using compiled defaults");
    Ok(EngineConfig::default())
}

fn load_config_file(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config {} failed: {}", path.display(), e)))?;
    let config = EngineConfig::from_toml_str(&content)?;
    info!("Loaded authsync config from {}", path.display());
    Ok(config)
}

/// Write configuration atomically (temp file + rename)
pub fn write_config(config: &EngineConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, content)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}
