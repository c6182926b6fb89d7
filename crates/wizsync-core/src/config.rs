//! Layered configuration
//!
//! Defaults, then an optional TOML file, then the environment. Every field is
//! optional in the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use wizsync_draft::{DraftStoreConfig, DEFAULT_INSTANCE, DEFAULT_MAX_AGE_HOURS};
use wizsync_guard::{ScanMonitorConfig, DEFAULT_MAX_POLLS};
use wizsync_model::steps::{DOCUMENT_REVIEW, QUERY_CONFIGURATION, WEBSITE_SELECTION};
use wizsync_model::{LayoutError, StepLayout};
use wizsync_session::{RevisionConflictRetrier, DEFAULT_MAX_ATTEMPTS};

/// Environment variable replacing `server.base_url`
pub const SERVER_URL_ENV: &str = "WIZSYNC_SERVER_URL";

/// Wizard definition used when none is configured
pub const DEFAULT_DEFINITION_ID: &str = "beleidsscan-wizard";

const MAX_DRAFT_AGE_HOURS: i64 = 24 * 366 * 10;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// File
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Step list is unusable
    #[error("invalid wizard steps: {0}")]
    Layout(#[from] LayoutError),

    /// A value is out of range
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted field name
        field: &'static str,
        /// What is wrong
        reason: String,
    },
}

/// Full configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WizsyncConfig {
    /// Session server
    pub server: ServerConfig,
    /// Revision conflict retries
    pub retry: RetryConfig,
    /// Local draft persistence
    pub draft: DraftConfig,
    /// Async load deduplication
    pub guard: GuardConfig,
    /// Scan progress polling
    pub scan: ScanConfig,
    /// Wizard definition
    pub wizard: WizardConfig,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// API root
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000/api".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts per mutation, first one included
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// `[draft]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DraftConfig {
    /// Autosave debounce
    pub debounce_ms: u64,
    /// Drafts older than this are not offered for restore
    pub max_age_hours: i64,
    /// Draft slot name
    pub instance: String,
    /// Directory of the file store; memory store when absent
    pub store_dir: Option<PathBuf>,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
            instance: DEFAULT_INSTANCE.to_string(),
            store_dir: None,
        }
    }
}

/// `[guard]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// Window in which a repeat request for the same key is suppressed
    pub dedup_window_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 5000,
        }
    }
}

/// `[scan]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Interval between progress polls
    pub poll_interval_ms: u64,
    /// Polls before giving up
    pub max_polls: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

/// `[wizard]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WizardConfig {
    /// Wizard definition to instantiate
    pub definition_id: String,
    /// Definition version; server default when absent
    pub definition_version: Option<u32>,
    /// Ordered step ids
    pub steps: Vec<String>,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            definition_id: DEFAULT_DEFINITION_ID.to_string(),
            definition_version: None,
            steps: [QUERY_CONFIGURATION, WEBSITE_SELECTION, DOCUMENT_REVIEW]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl WizsyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document and validate it
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed TOML or unknown keys, or a
    /// validation error
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overlaid with `path` if given, then the environment
    ///
    /// # Errors
    /// File, parse or validation errors
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        let config = config.with_env_overrides();
        tracing::debug!(server = %config.server.base_url, "configuration loaded");
        Ok(config)
    }

    /// Apply `WIZSYNC_SERVER_URL` if set and non-empty
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        match std::env::var(SERVER_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => self.with_server_url(url.trim()),
            _ => self,
        }
    }

    /// With server URL
    #[inline]
    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server.base_url = url.into();
        self
    }

    /// With retry attempts
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// With file-backed draft storage under `dir`
    #[inline]
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.draft.store_dir = Some(dir.into());
        self
    }

    /// With autosave debounce
    #[inline]
    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.draft.debounce_ms = ms;
        self
    }

    /// With scan polling settings
    #[inline]
    #[must_use]
    pub fn with_scan_polling(mut self, interval_ms: u64, max_polls: u32) -> Self {
        self.scan.poll_interval_ms = interval_ms;
        self.scan.max_polls = max_polls;
        self
    }

    /// Check ranges and the step list
    ///
    /// # Errors
    /// The first invalid value found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.base_url.trim().is_empty() {
            return Err(invalid("server.base_url", "must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if !(1..=MAX_DRAFT_AGE_HOURS).contains(&self.draft.max_age_hours) {
            return Err(invalid(
                "draft.max_age_hours",
                &format!("must be between 1 and {MAX_DRAFT_AGE_HOURS}"),
            ));
        }
        if self.draft.instance.trim().is_empty() {
            return Err(invalid("draft.instance", "must not be empty"));
        }
        if self.scan.poll_interval_ms == 0 {
            return Err(invalid("scan.poll_interval_ms", "must be positive"));
        }
        if self.wizard.definition_id.trim().is_empty() {
            return Err(invalid("wizard.definition_id", "must not be empty"));
        }
        self.step_layout()?;
        Ok(())
    }

    /// Request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Retrier for the session client
    #[must_use]
    pub fn retrier(&self) -> RevisionConflictRetrier {
        RevisionConflictRetrier::new(self.retry.max_attempts)
    }

    /// Draft store settings
    #[must_use]
    pub fn draft_store_config(&self) -> DraftStoreConfig {
        DraftStoreConfig::default()
            .with_instance(self.draft.instance.clone())
            .with_debounce(Duration::from_millis(self.draft.debounce_ms))
            .with_max_age(chrono::Duration::hours(self.draft.max_age_hours))
    }

    /// Dedup window of the load guards
    #[must_use]
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.guard.dedup_window_ms)
    }

    /// Scan monitor settings
    #[must_use]
    pub fn scan_monitor_config(&self) -> ScanMonitorConfig {
        ScanMonitorConfig {
            poll_interval: Duration::from_millis(self.scan.poll_interval_ms),
            max_polls: self.scan.max_polls,
        }
    }

    /// Step layout of the wizard
    ///
    /// # Errors
    /// [`ConfigError::Layout`] for an empty or duplicated step list
    pub fn step_layout(&self) -> Result<StepLayout, ConfigError> {
        Ok(StepLayout::new(self.wizard.steps.iter().map(String::as_str))?)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
