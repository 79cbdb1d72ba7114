//! Configuration module for uplog.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Every section is optional in the file; missing sections take their defaults.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountlessPersonalDataPolicy, AnonymousDataPolicy, ConsentState, ReportKind};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for uplog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub connectivity: ConnectivityConfig,
    pub engines: EnginesConfig,
    pub consent: ConsentConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Local report storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per report kind.
    pub root: PathBuf,
    /// Name of the producer work directory inside each kind directory.
    pub work_dir: String,
}

/// Collection service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Base URL of the collection service, without trailing API path.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every upload.
    pub user_agent: String,
}

/// Reachability probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Seconds between two probes.
    pub probe_interval_secs: u64,
    /// Seconds before a probe connection attempt is abandoned.
    pub probe_timeout_secs: u64,
}

/// Settings of a single report engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Whether the engine is started.
    pub enabled: bool,
    /// Storage quota in MiB, `0` disables quota enforcement.
    pub quota_mb: u64,
}

impl EngineConfig {
    fn for_kind(kind: ReportKind) -> Self {
        Self {
            enabled: true,
            quota_mb: kind.default_quota_mb(),
        }
    }
}

/// Per-kind engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub flight_log: EngineConfig,
    pub crash_report: EngineConfig,
    pub black_box: EngineConfig,
    pub gutma_log: EngineConfig,
}

impl EnginesConfig {
    /// Settings of the engine handling `kind`.
    pub fn get(&self, kind: ReportKind) -> &EngineConfig {
        match kind {
            ReportKind::FlightLog => &self.flight_log,
            ReportKind::CrashReport => &self.crash_report,
            ReportKind::BlackBox => &self.black_box,
            ReportKind::GutmaLog => &self.gutma_log,
        }
    }

    fn get_mut(&mut self, kind: ReportKind) -> &mut EngineConfig {
        match kind {
            ReportKind::FlightLog => &mut self.flight_log,
            ReportKind::CrashReport => &mut self.crash_report,
            ReportKind::BlackBox => &mut self.black_box,
            ReportKind::GutmaLog => &mut self.gutma_log,
        }
    }
}

/// Initial user consent, until a consent provider publishes a change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// Signed-in account identifier, if any.
    pub account: Option<String>,
    /// Collection policy for anonymous data.
    pub anonymous_data: AnonymousDataPolicy,
    /// Upload policy for data recorded while signed out.
    pub accountless_personal_data: AccountlessPersonalDataPolicy,
    /// When `account` was signed in, as recorded by whoever wrote the file.
    pub account_changed_at: Option<DateTime<Utc>>,
}

impl ConsentConfig {
    /// Converts the configured values into a consent snapshot.
    ///
    /// Loading never stamps the current time: a restart under the same
    /// account is not a sign-in. Without a recorded `account_changed_at`
    /// nothing is screened as pre-login data.
    pub fn to_state(&self) -> ConsentState {
        ConsentState {
            account: self.account.clone(),
            anonymous_data: self.anonymous_data,
            accountless_personal_data: self.accountless_personal_data,
            account_changed_at: self.account.as_ref().and(self.account_changed_at),
        }
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether the `/metrics` endpoint is served.
    pub enabled: bool,
    /// Listen address, `host:port`.
    pub endpoint: String,
}

/// Resolved settings for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Report kind handled by the engine.
    pub kind: ReportKind,
    /// Durable storage root of the kind.
    pub root: PathBuf,
    /// Producer work directory.
    pub work_dir: PathBuf,
    /// Storage quota, `None` when disabled.
    pub quota_bytes: Option<u64>,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/uplog/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("uplog")
            .join("config.yaml")
    }

    /// Resolves the storage layout and quota of the engine handling `kind`.
    pub fn engine_settings(&self, kind: ReportKind) -> EngineSettings {
        let root = self.storage.root.join(kind.dir_name());
        let quota_mb = self.engines.get(kind).quota_mb;
        EngineSettings {
            kind,
            work_dir: root.join(&self.storage.work_dir),
            root,
            quota_bytes: (quota_mb > 0).then(|| quota_mb * 1024 * 1024),
        }
    }

    /// Kinds whose engine is enabled, in start order.
    pub fn enabled_kinds(&self) -> Vec<ReportKind> {
        ReportKind::ALL
            .into_iter()
            .filter(|k| self.engines.get(*k).enabled)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("uplog"),
            work_dir: "work".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: "https://collect.example.com".to_string(),
            timeout_secs: 60,
            user_agent: format!("uplog/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
            probe_timeout_secs: 5,
        }
    }
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            flight_log: EngineConfig::for_kind(ReportKind::FlightLog),
            crash_report: EngineConfig::for_kind(ReportKind::CrashReport),
            black_box: EngineConfig::for_kind(ReportKind::BlackBox),
            gutma_log: EngineConfig::for_kind(ReportKind::GutmaLog),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "127.0.0.1:9187".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.timeout_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- storage ---
        if self.storage.root.as_os_str().is_empty() {
            errors.push(ValidationError::new("storage.root", "must not be empty"));
        }
        let work_dir = Path::new(&self.storage.work_dir);
        if self.storage.work_dir.is_empty() || work_dir.components().count() != 1 {
            errors.push(ValidationError::new(
                "storage.work_dir",
                format!(
                    "must be a single directory name, got '{}'",
                    self.storage.work_dir
                ),
            ));
        }

        // --- upload ---
        if !(self.upload.base_url.starts_with("http://")
            || self.upload.base_url.starts_with("https://"))
        {
            errors.push(ValidationError::new(
                "upload.base_url",
                format!("must be an http(s) URL, got '{}'", self.upload.base_url),
            ));
        }
        if self.upload.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "upload.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.upload.user_agent.trim().is_empty() {
            errors.push(ValidationError::new("upload.user_agent", "must not be empty"));
        }

        // --- connectivity ---
        if self.connectivity.probe_interval_secs == 0 {
            errors.push(ValidationError::new(
                "connectivity.probe_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.connectivity.probe_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "connectivity.probe_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.connectivity.probe_timeout_secs > self.connectivity.probe_interval_secs {
            errors.push(ValidationError::new(
                "connectivity.probe_timeout_secs",
                format!(
                    "probe_timeout_secs ({}) must not exceed probe_interval_secs ({})",
                    self.connectivity.probe_timeout_secs, self.connectivity.probe_interval_secs
                ),
            ));
        }

        // --- engines ---
        if self.enabled_kinds().is_empty() {
            errors.push(ValidationError::new(
                "engines",
                "at least one engine must be enabled",
            ));
        }

        // --- consent ---
        if let Some(account) = &self.consent.account {
            if account.trim().is_empty() {
                errors.push(ValidationError::new(
                    "consent.account",
                    "must not be empty when set",
                ));
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError::new(
                "logging.format",
                format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            ));
        }

        // --- metrics ---
        if self.metrics.enabled
            && self
                .metrics
                .endpoint
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            errors.push(ValidationError::new(
                "metrics.endpoint",
                format!("not a socket address: '{}'", self.metrics.endpoint),
            ));
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use uplog_core::config::ConfigBuilder;
/// use uplog_core::domain::ReportKind;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .storage_root(PathBuf::from("/var/lib/uplog"))
///     .upload_base_url("https://collect.internal")
///     .engine_quota_mb(ReportKind::CrashReport, 20)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- storage ---

    pub fn storage_root(mut self, root: PathBuf) -> Self {
        self.config.storage.root = root;
        self
    }

    pub fn storage_work_dir(mut self, name: impl Into<String>) -> Self {
        self.config.storage.work_dir = name.into();
        self
    }

    // --- upload ---

    pub fn upload_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.upload.base_url = url.into();
        self
    }

    pub fn upload_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.upload.timeout_secs = seconds;
        self
    }

    pub fn upload_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.upload.user_agent = user_agent.into();
        self
    }

    // --- connectivity ---

    pub fn probe_interval_secs(mut self, seconds: u64) -> Self {
        self.config.connectivity.probe_interval_secs = seconds;
        self
    }

    pub fn probe_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.connectivity.probe_timeout_secs = seconds;
        self
    }

    // --- engines ---

    pub fn engine_enabled(mut self, kind: ReportKind, enabled: bool) -> Self {
        self.config.engines.get_mut(kind).enabled = enabled;
        self
    }

    pub fn engine_quota_mb(mut self, kind: ReportKind, mb: u64) -> Self {
        self.config.engines.get_mut(kind).quota_mb = mb;
        self
    }

    // --- consent ---

    pub fn consent_account(mut self, account: impl Into<String>) -> Self {
        self.config.consent.account = Some(account.into());
        self
    }

    pub fn consent_anonymous_data(mut self, policy: AnonymousDataPolicy) -> Self {
        self.config.consent.anonymous_data = policy;
        self
    }

    pub fn consent_accountless_personal_data(
        mut self,
        policy: AccountlessPersonalDataPolicy,
    ) -> Self {
        self.config.consent.accountless_personal_data = policy;
        self
    }

    pub fn consent_account_changed_at(mut self, at: DateTime<Utc>) -> Self {
        self.config.consent.account_changed_at = Some(at);
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- metrics ---

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.metrics.enabled = enabled;
        self
    }

    pub fn metrics_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.metrics.endpoint = endpoint.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
