//! ---
//! ctk_section: "01-core-functionality"
//! ctk_subsection: "module"
//! ctk_type: "source"
//! ctk_scope: "code"
//! ctk_description: "Shared primitives and utilities for the telemetry core."
//! ctk_version: "v0.0.0-prealpha"
//! ctk_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_storage_directory() -> PathBuf {
    PathBuf::from("target/ctk-store")
}

fn default_batch_endpoint() -> String {
    "/api/telemetry/batch".to_owned()
}

fn default_interaction_endpoint() -> String {
    "/api/telemetry/track".to_owned()
}

fn default_queue_cap() -> usize {
    10_000
}

fn default_backoff_floor() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_ceiling() -> Duration {
    Duration::from_secs(300)
}

fn default_demo_ttl() -> Duration {
    Duration::from_secs(2 * 60 * 60)
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_warning_lead() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_sync_debounce() -> Duration {
    Duration::from_millis(120)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the CTK runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where a [`CoreConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedCoreConfig {
    pub config: CoreConfig,
    pub source: PathBuf,
}

impl CoreConfig {
    pub const ENV_CONFIG_PATH: &str = "CTK_CONFIG";

    /// Load configuration from disk, respecting the `CTK_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedCoreConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedCoreConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedCoreConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<CoreConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.delivery.validate()?;
        self.session.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for CoreConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: CoreConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Location of the client-scoped key/value store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_directory")]
    pub directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_storage_directory(),
        }
    }
}

/// Event delivery endpoints and queue/backoff tuning.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_batch_endpoint")]
    pub batch_endpoint: String,
    #[serde(default = "default_interaction_endpoint")]
    pub interaction_endpoint: String,
    #[serde(default = "default_queue_cap")]
    pub queue_cap: usize,
    #[serde(default = "default_backoff_floor")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub backoff_floor: Duration,
    #[serde(default = "default_backoff_ceiling")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub backoff_ceiling: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_endpoint: default_batch_endpoint(),
            interaction_endpoint: default_interaction_endpoint(),
            queue_cap: default_queue_cap(),
            backoff_floor: default_backoff_floor(),
            backoff_ceiling: default_backoff_ceiling(),
        }
    }
}

impl DeliveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_cap == 0 {
            return Err(anyhow!("delivery queue_cap must be greater than zero"));
        }
        if self.backoff_floor.is_zero() {
            return Err(anyhow!("delivery backoff_floor must be greater than zero"));
        }
        if self.backoff_ceiling < self.backoff_floor {
            return Err(anyhow!(
                "delivery backoff_ceiling ({:?}) must not be below backoff_floor ({:?})",
                self.backoff_ceiling,
                self.backoff_floor
            ));
        }
        if self.batch_endpoint.trim().is_empty() || self.interaction_endpoint.trim().is_empty() {
            return Err(anyhow!("delivery endpoints must not be empty"));
        }
        Ok(())
    }
}

/// Token lifetimes and cross-tab sync tuning.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_demo_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub demo_ttl: Duration,
    #[serde(default = "default_session_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub session_ttl: Duration,
    #[serde(default = "default_warning_lead")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub warning_lead: Duration,
    /// Debounce window for cross-tab resync, in milliseconds.
    #[serde(default = "default_sync_debounce_ms")]
    pub sync_debounce_ms: u64,
}

fn default_sync_debounce_ms() -> u64 {
    default_sync_debounce().as_millis() as u64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            demo_ttl: default_demo_ttl(),
            session_ttl: default_session_ttl(),
            warning_lead: default_warning_lead(),
            sync_debounce_ms: default_sync_debounce_ms(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.demo_ttl.is_zero() || self.session_ttl.is_zero() {
            return Err(anyhow!("token lifetimes must be greater than zero"));
        }
        if self.warning_lead >= self.demo_ttl {
            return Err(anyhow!(
                "warning_lead ({:?}) must be shorter than demo_ttl ({:?})",
                self.warning_lead,
                self.demo_ttl
            ));
        }
        Ok(())
    }

    pub fn sync_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_debounce_ms)
    }
}

/// Logging output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = CoreConfig::default();
        config.validate().unwrap();
        assert_eq!(config.delivery.queue_cap, 10_000);
        assert_eq!(config.delivery.backoff_floor, Duration::from_secs(10));
        assert_eq!(config.delivery.backoff_ceiling, Duration::from_secs(300));
        assert_eq!(config.session.demo_ttl, Duration::from_secs(7200));
        assert_eq!(config.session.session_ttl, Duration::from_secs(604_800));
        assert_eq!(config.session.sync_debounce(), Duration::from_millis(120));
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: CoreConfig = r#"
            [delivery]
            batch_endpoint = "https://example.invalid/batch"

            [session]
            demo_ttl = 60
            warning_lead = 10
        "#
        .parse()
        .unwrap();
        assert_eq!(config.delivery.batch_endpoint, "https://example.invalid/batch");
        assert_eq!(config.session.demo_ttl, Duration::from_secs(60));
        assert_eq!(config.delivery.queue_cap, 10_000);
    }

    #[test]
    fn rejects_inverted_backoff_range() {
        let result: Result<CoreConfig> = r#"
            [delivery]
            backoff_floor = 300
            backoff_ceiling = 10
        "#
        .parse();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_queue_cap() {
        let result: Result<CoreConfig> = "[delivery]\nqueue_cap = 0\n".parse();
        assert!(result.is_err());
    }

    #[test]
    fn load_picks_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctk.toml");
        fs::write(&path, "[delivery]\nqueue_cap = 50\n").unwrap();

        let missing = dir.path().join("missing.toml");
        let loaded = CoreConfig::load_with_source(&[&missing, &path]).unwrap();
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.delivery.queue_cap, 50);
    }

    #[test]
    fn load_reports_inspected_candidates() {
        let err = CoreConfig::load(&["definitely/missing.toml"]).unwrap_err();
        assert!(err.to_string().contains("definitely/missing.toml"));
    }
}
