//! Configuration management for Plurprune
//!
//! The config file is TOML with three sections:
//!
//! ```toml
//! [prune]
//! max_age = "90d"
//! preserve_pinned = true
//! unlike = true
//!
//! [server]
//! bind = "127.0.0.1:8787"
//! default_interval = "6h"
//!
//! [[platforms]]
//! name = "mastodon"
//! kind = "archive"
//! path = "~/exports/mastodon.json"
//! interval = "12h"
//! ```

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::platforms::archive::ArchiveSource;
use crate::platforms::mock::MockSource;
use crate::platforms::PostSource;
use crate::prune::options::{PruneOptions, DEFAULT_PAGE_SIZE};

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "PLURPRUNE_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub prune: PruneConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,
}

/// Policy defaults, overridable per invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Humantime duration, e.g. "90d"
    #[serde(default)]
    pub max_age: Option<String>,
    /// Unix timestamp, YYYY-MM-DD, or RFC 3339
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub preserve_pinned: bool,
    #[serde(default)]
    pub preserve_self_liked: bool,
    #[serde(default)]
    pub unlike: bool,
    #[serde(default)]
    pub unshare: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_delay")]
    pub delay: String,
    #[serde(default = "default_delay")]
    pub round_delay: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub drain: bool,
    #[serde(default)]
    pub max_rounds: Option<u32>,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            max_age: None,
            before: None,
            preserve_pinned: false,
            preserve_self_liked: false,
            unlike: false,
            unshare: false,
            dry_run: false,
            delay: default_delay(),
            round_delay: default_delay(),
            page_size: default_page_size(),
            drain: false,
            max_rounds: None,
        }
    }
}

impl PruneConfig {
    /// Turn the policy section into validated options
    pub fn to_options(&self) -> Result<PruneOptions> {
        let mut builder = PruneOptions::builder()
            .preserve_pinned(self.preserve_pinned)
            .preserve_self_liked(self.preserve_self_liked)
            .unlike(self.unlike)
            .unshare(self.unshare)
            .dry_run(self.dry_run)
            .action_delay(parse_duration(&self.delay)?)
            .round_delay(parse_duration(&self.round_delay)?)
            .page_size(self.page_size)
            .drain_history(self.drain);

        if let Some(max_age) = &self.max_age {
            builder = builder.max_age(parse_duration(max_age)?);
        }
        if let Some(before) = &self.before {
            builder = builder.before(parse_date(before)?);
        }
        if let Some(rounds) = self.max_rounds {
            builder = builder.max_rounds(rounds);
        }
        builder.build()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// How long shutdown waits for in-flight runs
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: String,
    /// Schedule for platforms without their own interval
    #[serde(default = "default_interval")]
    pub default_interval: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            shutdown_grace: default_shutdown_grace(),
            default_interval: default_interval(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Result<Duration> {
        parse_duration(&self.shutdown_grace)
    }

    pub fn default_interval(&self) -> Result<Duration> {
        parse_duration(&self.default_interval)
    }
}

/// Supported post source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// JSON export on disk
    Archive,
    /// Empty in-memory source, useful to smoke-test a deployment
    Mock,
}

impl std::str::FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "archive" => Ok(SourceKind::Archive),
            "mock" => Ok(SourceKind::Mock),
            other => Err(ConfigError::UnknownPlatformKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    pub kind: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PlatformConfig {
    pub fn source_kind(&self) -> Result<SourceKind> {
        Ok(self.kind.parse::<SourceKind>()?)
    }

    /// Schedule interval, falling back to the server default
    pub fn interval(&self, server: &ServerConfig) -> Result<Duration> {
        match &self.interval {
            Some(value) => parse_duration(value),
            None => server.default_interval(),
        }
    }

    /// Open the post source this entry describes
    pub fn open_source(&self) -> Result<Arc<dyn PostSource>> {
        match self.source_kind()? {
            SourceKind::Archive => {
                let path = self.path.as_deref().ok_or_else(|| {
                    ConfigError::MissingField(format!("platforms.{}.path", self.name))
                })?;
                Ok(Arc::new(ArchiveSource::open(&self.name, path)?))
            }
            SourceKind::Mock => Ok(Arc::new(MockSource::paged(&self.name, Vec::new()))),
        }
    }
}

fn default_delay() -> String {
    "1s".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_shutdown_grace() -> String {
    "30s".to_string()
}

fn default_interval() -> String {
    "6h".to_string()
}

fn default_user() -> String {
    "me".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Load from the default location if a file exists there
    ///
    /// A missing file yields the built-in defaults; an unreadable or invalid
    /// one is still an error.
    pub fn load_or_default() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check everything the server needs before it starts any run
    pub fn validate(&self) -> Result<()> {
        self.prune.to_options()?;
        self.server.shutdown_grace()?;

        let mut seen = HashSet::new();
        for platform in &self.platforms {
            if !seen.insert(platform.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "platforms".to_string(),
                    reason: format!("duplicate platform name '{}'", platform.name),
                }
                .into());
            }
            let kind = platform.source_kind()?;
            if kind == SourceKind::Archive && platform.path.is_none() {
                return Err(
                    ConfigError::MissingField(format!("platforms.{}.path", platform.name)).into(),
                );
            }
            if platform.interval(&self.server)?.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: format!("platforms.{}.interval", platform.name),
                    reason: "must be greater than zero".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Platforms that should be scheduled
    pub fn enabled_platforms(&self) -> impl Iterator<Item = &PlatformConfig> {
        self.platforms.iter().filter(|p| p.enabled)
    }

    pub fn platform(&self, name: &str) -> Result<&PlatformConfig> {
        self.platforms
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownPlatform(name.to_string()).into())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("plurprune").join("config.toml"))
}

/// Parse a humantime duration such as "90d", "12h" or "500ms"
pub fn parse_duration(value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| {
        ConfigError::InvalidDuration {
            value: value.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Parse a cutoff date
///
/// Accepts a Unix timestamp, a calendar date (`YYYY-MM-DD`, midnight UTC), or
/// an RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(timestamp) = value.parse::<i64>() {
        return Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or_else(|| ConfigError::InvalidDate(value.to_string()).into());
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ConfigError::InvalidDate(value.to_string()).into())
}
