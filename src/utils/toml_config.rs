//! TOML-based configuration for OpenLab
//!
//! Scheduler, context and worker tuning plus the server and database settings
//! live in `openlab.toml`. Every section is optional; missing values fall back
//! to the defaults below.
//!
//! # Hot Reloading
//!
//! Edits to the file are picked up at runtime. Engines read the current
//! configuration through [`LabConfigManager::config`] on every operation, so a
//! reload takes effect on the next claim.

use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from openlab.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text
    #[serde(default)]
    pub log_json: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

// ============= Database Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local database path, or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Environment variable for Turso URL (optional cloud config)
    pub turso_url_env: Option<String>,

    /// Environment variable for Turso auth token
    pub turso_token_env: Option<String>,
}

fn default_database_url() -> String {
    "./data/openlab.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            turso_url_env: None,
            turso_token_env: None,
        }
    }
}

// ============= Scheduler Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Priority of the three VERIFY tasks spawned per submitted finding
    #[serde(default = "default_verify_priority")]
    pub verify_priority: i32,

    /// Priority of hypothesis test tasks
    #[serde(default = "default_hypothesis_priority")]
    pub hypothesis_priority: i32,

    /// Priority of re-research forks spawned by a rejected finding
    #[serde(default = "default_verify_priority")]
    pub re_research_priority: i32,

    /// Priority used for research tasks created without an explicit one
    #[serde(default = "default_research_priority")]
    pub research_priority: i32,

    /// How long a claim stays valid without a heartbeat. 0 disables leases.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Claim attempts after losing a race before giving up with "none"
    #[serde(default = "default_max_claim_retries")]
    pub max_claim_retries: u32,
}

fn default_verify_priority() -> i32 {
    1
}

fn default_hypothesis_priority() -> i32 {
    2
}

fn default_research_priority() -> i32 {
    5
}

fn default_lease_secs() -> u64 {
    1800
}

fn default_max_claim_retries() -> u32 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            verify_priority: default_verify_priority(),
            hypothesis_priority: default_hypothesis_priority(),
            re_research_priority: default_verify_priority(),
            research_priority: default_research_priority(),
            lease_secs: default_lease_secs(),
            max_claim_retries: default_max_claim_retries(),
        }
    }
}

impl SchedulerConfig {
    /// Lease expiry for a claim made at `now` (millis), if leases are enabled.
    pub fn lease_deadline(&self, now: i64) -> Option<i64> {
        if self.lease_secs == 0 {
            None
        } else {
            Some(now + (self.lease_secs as i64) * 1000)
        }
    }
}

// ============= Context Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Recent findings rendered as L1 summaries
    #[serde(default = "default_l1_limit")]
    pub l1_limit: usize,

    /// Further findings rendered as L0 one-liners
    #[serde(default = "default_l0_limit")]
    pub l0_limit: usize,

    #[serde(default = "default_dead_end_limit")]
    pub dead_end_limit: usize,
}

fn default_l1_limit() -> usize {
    10
}

fn default_l0_limit() -> usize {
    50
}

fn default_dead_end_limit() -> usize {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            l1_limit: default_l1_limit(),
            l0_limit: default_l0_limit(),
            dead_end_limit: default_dead_end_limit(),
        }
    }
}

// ============= Worker Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Wait after a claim returned nothing
    #[serde(default = "default_idle_wait_secs")]
    pub idle_wait_secs: u64,

    /// Wait after the loop itself hit an error
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

fn default_idle_wait_secs() -> u64 {
    30
}

fn default_error_backoff_secs() -> u64 {
    10
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_wait_secs: default_idle_wait_secs(),
            error_backoff_secs: default_error_backoff_secs(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(e: ConfigError) -> Self {
        crate::types::AppError::Configuration(e.to_string())
    }
}

impl LabConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: LabConfig = toml::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for internal consistency and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref env) = self.database.turso_url_env {
            self.validate_env_var(env)?;
        }
        if let Some(ref env) = self.database.turso_token_env {
            self.validate_env_var(env)?;
        }

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".to_string(),
            ));
        }

        let scheduler = &self.scheduler;
        if scheduler.verify_priority >= scheduler.research_priority {
            return Err(ConfigError::ValidationError(format!(
                "scheduler.verify_priority ({}) must be more urgent than research_priority ({})",
                scheduler.verify_priority, scheduler.research_priority
            )));
        }
        if scheduler.max_claim_retries == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.max_claim_retries must be at least 1".to_string(),
            ));
        }

        if self.context.l1_limit == 0 && self.context.l0_limit == 0 {
            warn!("context.l1_limit and context.l0_limit are both 0; briefs will only carry dependency findings");
        }

        Ok(())
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct LabConfigManager {
    config: Arc<ArcSwap<LabConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl LabConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = LabConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a config manager directly from a config (tests, defaults).
    /// This won't have file watching capabilities.
    pub fn from_config(config: LabConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("openlab.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<LabConfig> {
        self.config.load_full()
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = LabConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        // debounced in the receiver
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let mut last_reload: Option<std::time::Instant> = None;
            let debounce_duration = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|at| at.elapsed() < debounce_duration) {
                    continue;
                }

                // Let the writer finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                match LabConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

impl Clone for LabConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            watcher: RwLock::new(None), // Watcher is not cloned
        }
    }
}
