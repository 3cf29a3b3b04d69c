use config::{Config, ConfigError, Environment, File};
use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{ConflictPolicy, SubstitutionMode};

/// Main application configuration
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub archive: ArchiveConfig,
    pub retry: RetrySettings,
    pub report: ReportConfig,
    pub notify: NotifyConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("ODV")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = with_defaults(Config::builder())?.add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = with_defaults(Config::builder())?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("ODV")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("graph.tenant_id", "")?
        .set_default("graph.client_id", "")?
        .set_default("graph.client_secret", "")?
        .set_default("graph.user_email", "")?
        .set_default("graph.base_url", default_graph_base_url())?
        .set_default("graph.token_url", default_token_url())?
        .set_default("graph.token_skew_seconds", 300)?
        .set_default("graph.upload_timeout_seconds", 60)?
        .set_default("archive.root_folder", default_root_folder())?
        .set_default("archive.conflict_policy", "get_existing")?
        .set_default("archive.unknown_client_folder", default_unknown_client_folder())?
        .set_default("retry.max_retries", 3)?
        .set_default("retry.base_delay_ms", 1000)?
        .set_default("retry.max_delay_ms", 60_000)?
        .set_default("retry.jitter", false)?
        .set_default("retry.retry_not_found", false)?
        .set_default("report.template_path", "templates/template_verbale_odv.docx")?
        .set_default("report.substitution_mode", "run")?
        .set_default("notify.channel_capacity", 256)?
        .set_default("telemetry.log_level", "info")?
        .set_default("telemetry.json_logs", false)
}

/// Remote folder store (Microsoft Graph) configuration
#[derive(Debug, Deserialize)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub user_email: String,
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
    /// Token endpoint, `{tenant}` is replaced with the tenant id
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Cached tokens are treated as expired this long before their stated expiry
    #[serde(default = "default_token_skew_seconds")]
    pub token_skew_seconds: u64,
    #[serde(default = "default_upload_timeout_seconds")]
    pub upload_timeout_seconds: u64,
}

impl GraphConfig {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        user_email: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
            user_email: user_email.into(),
            base_url: default_graph_base_url(),
            token_url: default_token_url(),
            token_skew_seconds: default_token_skew_seconds(),
            upload_timeout_seconds: default_upload_timeout_seconds(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn with_token_skew(mut self, seconds: u64) -> Self {
        self.token_skew_seconds = seconds;
        self
    }

    /// Token endpoint for the configured tenant
    pub fn resolved_token_url(&self) -> String {
        self.token_url.replace("{tenant}", &self.tenant_id)
    }

    pub fn token_skew(&self) -> Duration {
        Duration::from_secs(self.token_skew_seconds)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_seconds)
    }

    /// All four credentials are required before any remote call is made
    pub fn is_complete(&self) -> bool {
        use secrecy::ExposeSecret;

        !self.tenant_id.is_empty()
            && !self.client_id.is_empty()
            && !self.client_secret.expose_secret().is_empty()
            && !self.user_email.is_empty()
    }
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_token_url() -> String {
    "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token".to_string()
}

fn default_token_skew_seconds() -> u64 {
    300 // 5 minutes
}

fn default_upload_timeout_seconds() -> u64 {
    60
}

/// Archive layout configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_root_folder")]
    pub root_folder: String,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default = "default_unknown_client_folder")]
    pub unknown_client_folder: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root_folder: default_root_folder(),
            conflict_policy: ConflictPolicy::default(),
            unknown_client_folder: default_unknown_client_folder(),
        }
    }
}

impl ArchiveConfig {
    pub fn with_root_folder(mut self, root: impl Into<String>) -> Self {
        self.root_folder = root.into();
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

fn default_root_folder() -> String {
    "Modello231".to_string()
}

fn default_unknown_client_folder() -> String {
    "Cliente_Sconosciuto".to_string()
}

/// Retry settings for remote calls
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: bool,
    #[serde(default)]
    pub retry_not_found: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
            retry_not_found: false,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

/// Report rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub template_path: PathBuf,
    #[serde(default)]
    pub substitution_mode: SubstitutionMode,
}

/// Notification hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
