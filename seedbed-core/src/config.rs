use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::bootstrap::admin::{
    DEFAULT_ADMIN_DISPLAY_NAME, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD,
};
use crate::bootstrap::database::{ConnectionConfig, PoolSettings};
use crate::{Error, Result};

/// Bare environment variables read on top of the `SEEDBED_*` layer,
/// paired with the config key each one overrides.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("DATABASE_TLS_MODE", "database.tls_mode"),
    ("APP_ENV", "environment"),
    ("ADMIN_EMAIL", "bootstrap.admin_email"),
    ("ADMIN_PASSWORD", "bootstrap.admin_password"),
    ("ADMIN_NAME", "bootstrap.admin_display_name"),
];

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: RunEnvironment,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub bootstrap: BootstrapConfig,
    pub lifecycle: LifecycleConfig,
}

/// Deployment environment, selects verbose defaults in development.
///
/// Anything other than a development name loads as production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum RunEnvironment {
    Development,
    #[default]
    Production,
}

impl RunEnvironment {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub const fn default_log_verbosity(&self) -> LogVerbosity {
        match self {
            Self::Development => LogVerbosity::Verbose,
            Self::Production => LogVerbosity::Quiet,
        }
    }

    #[must_use]
    pub const fn default_log_format(&self) -> &'static str {
        match self {
            Self::Development => "pretty",
            Self::Production => "json",
        }
    }
}

impl FromStr for RunEnvironment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!("Unknown environment: {s}")),
        }
    }
}

impl From<String> for RunEnvironment {
    fn from(name: String) -> Self {
        name.trim().parse().unwrap_or_else(|_| {
            warn!(environment = %name, "Unrecognised APP_ENV, running as production");
            Self::Production
        })
    }
}

impl fmt::Display for RunEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the driver treats TLS.
///
/// There is deliberately no default: the operator has to pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TlsMode {
    /// Plain TCP
    Disabled,
    /// Encrypted, server certificate not verified
    Relaxed,
    /// Encrypted, certificate chain and hostname verified
    Strict,
}

impl TlsMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Relaxed => "relaxed",
            Self::Strict => "strict",
        }
    }
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disabled" | "disable" => Ok(Self::Disabled),
            "relaxed" | "require" => Ok(Self::Relaxed),
            "strict" | "verify-full" => Ok(Self::Strict),
            _ => Err(format!("Unknown TLS mode: {s}")),
        }
    }
}

impl TryFrom<String> for TlsMode {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.trim().parse()
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver statement logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum LogVerbosity {
    Quiet,
    Verbose,
}

impl LogVerbosity {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::Verbose => "verbose",
        }
    }
}

impl FromStr for LogVerbosity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quiet" => Ok(Self::Quiet),
            "verbose" => Ok(Self::Verbose),
            _ => Err(format!("Unknown log verbosity: {s}")),
        }
    }
}

impl TryFrom<String> for LogVerbosity {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.trim().parse()
    }
}

impl fmt::Display for LogVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub tls_mode: Option<TlsMode>,
    /// Falls back to the environment's default when unset
    pub log_verbosity: Option<LogVerbosity>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            tls_mode: None,
            log_verbosity: None,
            max_connections: 10,
            min_connections: 1,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact_url(&self.url))
            .field("tls_mode", &self.tls_mode)
            .field("log_verbosity", &self.log_verbosity)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("idle_timeout_seconds", &self.idle_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "pretty"; unset picks the environment's default
    pub format: Option<String>,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            file_path: None,
        }
    }
}

/// Admin seed settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub admin_email: String,
    pub admin_password: String,
    pub admin_display_name: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            admin_display_name: DEFAULT_ADMIN_DISPLAY_NAME.to_string(),
        }
    }
}

impl fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("admin_email", &self.admin_email)
            .field("admin_password", &"****")
            .field("admin_display_name", &self.admin_display_name)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub health_check_interval_seconds: u64,
    pub shutdown_timeout_seconds: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: 30,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Bare variables (`DATABASE_URL`, `APP_ENV`, `ADMIN_*`, ...)
    /// 2. `SEEDBED_*` environment variables (`SEEDBED_DATABASE__MAX_CONNECTIONS`)
    /// 3. Config file (if provided)
    /// 4. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> std::result::Result<Self, ConfigError> {
        Self::load_from(config_file, std::env::vars().collect())
    }

    /// Same as [`Config::load`] but reads variables from `vars` instead of
    /// the process environment.
    pub fn load_from(
        config_file: Option<&str>,
        vars: HashMap<String, String>,
    ) -> std::result::Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SEEDBED")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(vars.clone())),
        );

        for (var, key) in ENV_OVERRIDES {
            let value = vars
                .get(*var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check every setting and report all problems at once.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let db = &self.database;

        // A missing URL is reported by `init_database` along with its diagnostics
        if !db.url.trim().is_empty() {
            match url::Url::parse(&db.url) {
                Ok(parsed) if matches!(parsed.scheme(), "postgres" | "postgresql") => {}
                Ok(parsed) => errors.push(format!(
                    "DATABASE_URL must use the postgres:// scheme, got '{}'",
                    parsed.scheme()
                )),
                Err(e) => errors.push(format!("DATABASE_URL is not a valid URL: {e}")),
            }
        }

        if db.tls_mode.is_none() {
            errors.push(
                "database.tls_mode must be set explicitly (DATABASE_TLS_MODE=disabled|relaxed|strict)"
                    .to_string(),
            );
        }
        if db.max_connections == 0 {
            errors.push("database.max_connections must be greater than 0".to_string());
        }
        if db.min_connections > db.max_connections {
            errors.push(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                db.min_connections, db.max_connections
            ));
        }
        if db.connect_timeout_seconds == 0 {
            errors.push("database.connect_timeout_seconds must be greater than 0".to_string());
        }

        if let Some(format) = &self.logging.format {
            if !matches!(format.as_str(), "json" | "pretty") {
                errors.push(format!("logging.format must be 'json' or 'pretty', got '{format}'"));
            }
        }

        if !self.bootstrap.admin_email.contains('@') {
            errors.push(format!(
                "bootstrap.admin_email '{}' is not an email address",
                self.bootstrap.admin_email
            ));
        }
        if self.bootstrap.admin_password.is_empty() {
            errors.push("bootstrap.admin_password must not be empty".to_string());
        }

        if self.lifecycle.health_check_interval_seconds == 0 {
            errors.push("lifecycle.health_check_interval_seconds must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve the database section into the bootstrapper's input.
    ///
    /// The URL itself is checked by `init_database`, so an empty one passes here.
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let tls_mode = self.database.tls_mode.ok_or_else(|| {
            Error::Config(
                "database.tls_mode is not set; set DATABASE_TLS_MODE to disabled, relaxed or strict"
                    .to_string(),
            )
        })?;

        let log_verbosity = self
            .database
            .log_verbosity
            .unwrap_or_else(|| self.environment.default_log_verbosity());

        Ok(ConnectionConfig {
            connection_string: self.database.url.clone(),
            tls_mode,
            log_verbosity,
            pool: PoolSettings {
                max_connections: self.database.max_connections,
                min_connections: self.database.min_connections,
                connect_timeout: Duration::from_secs(self.database.connect_timeout_seconds),
                idle_timeout: Duration::from_secs(self.database.idle_timeout_seconds),
            },
            shutdown_timeout: Duration::from_secs(self.lifecycle.shutdown_timeout_seconds),
            environment: self.environment,
        })
    }

    /// Log format after applying the environment default
    #[must_use]
    pub fn log_format(&self) -> &str {
        self.logging
            .format
            .as_deref()
            .unwrap_or_else(|| self.environment.default_log_format())
    }

    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.lifecycle.health_check_interval_seconds)
    }
}

/// Mask the password component of a connection string.
#[must_use]
pub fn redact_url(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}
