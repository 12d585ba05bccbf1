//! Database initialization

use log::LevelFilter;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::ConnectOptions;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::handle::{DatabaseHandle, HandleState};
use crate::config::{redact_url, LogVerbosity, RunEnvironment, TlsMode};
use crate::{Error, Result};

const DEFAULT_PG_PORT: u16 = 5432;

/// Pool sizing and timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Bounds both connection acquisition and the liveness probe
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl PoolSettings {
    /// Slightly shorter than the probe timeout so the pool's own error
    /// surfaces before the probe gives up.
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        self.connect_timeout - self.connect_timeout / 10
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Everything the bootstrapper needs to open the pool.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub connection_string: String,
    pub tls_mode: TlsMode,
    pub log_verbosity: LogVerbosity,
    pub pool: PoolSettings,
    pub shutdown_timeout: Duration,
    /// Reported in failure diagnostics
    pub environment: RunEnvironment,
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(connection_string: impl Into<String>, tls_mode: TlsMode, log_verbosity: LogVerbosity) -> Self {
        Self {
            connection_string: connection_string.into(),
            tls_mode,
            log_verbosity,
            pool: PoolSettings::default(),
            shutdown_timeout: Duration::from_secs(10),
            environment: RunEnvironment::default(),
        }
    }

    #[must_use]
    pub const fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub const fn with_environment(mut self, environment: RunEnvironment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Host, port and database name, safe to log.
    #[must_use]
    pub fn target(&self) -> DatabaseTarget {
        DatabaseTarget::from_connection_string(&self.connection_string)
    }

    fn connect_options(&self) -> Result<PgConnectOptions> {
        let options = PgConnectOptions::from_str(&self.connection_string)
            .map_err(|e| Error::Config(format!("Invalid DATABASE_URL: {e}")))?
            .ssl_mode(ssl_mode(self.tls_mode));

        Ok(match self.log_verbosity {
            LogVerbosity::Verbose => options.log_statements(LevelFilter::Debug),
            LogVerbosity::Quiet => options.log_statements(LevelFilter::Off),
        })
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("connection_string", &redact_url(&self.connection_string))
            .field("tls_mode", &self.tls_mode)
            .field("log_verbosity", &self.log_verbosity)
            .field("pool", &self.pool)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("environment", &self.environment)
            .finish()
    }
}

const fn ssl_mode(mode: TlsMode) -> PgSslMode {
    match mode {
        TlsMode::Disabled => PgSslMode::Disable,
        TlsMode::Relaxed => PgSslMode::Require,
        TlsMode::Strict => PgSslMode::VerifyFull,
    }
}

/// Where a connection string points, without credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
}

impl DatabaseTarget {
    /// Best effort: an unparseable string yields an empty target.
    #[must_use]
    pub fn from_connection_string(raw: &str) -> Self {
        let Ok(parsed) = url::Url::parse(raw) else {
            return Self::default();
        };

        let host = parsed.host_str().filter(|h| !h.is_empty()).map(str::to_string);
        let port = host.as_ref().map(|_| parsed.port().unwrap_or(DEFAULT_PG_PORT));
        let database = Some(parsed.path().trim_start_matches('/'))
            .filter(|db| !db.is_empty())
            .map(str::to_string);

        Self { host, port, database }
    }
}

impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = self.host.as_deref().unwrap_or("<unknown>");
        let database = self.database.as_deref().unwrap_or("<default>");
        match self.port {
            Some(port) => write!(f, "{host}:{port}/{database}"),
            None => write!(f, "{host}/{database}"),
        }
    }
}

/// Open the pool, probe it once and hand back a ready handle.
///
/// An empty connection string fails with [`Error::Config`] before any
/// network activity. A failed or timed-out probe fails with
/// [`Error::Connection`] and the pool is closed again. Terminating the
/// process is left to the caller.
pub async fn init_database(config: &ConnectionConfig) -> Result<DatabaseHandle> {
    let result = connect(config).await;
    if let Err(e) = &result {
        log_connection_failure(config, e);
    }
    result
}

async fn connect(config: &ConnectionConfig) -> Result<DatabaseHandle> {
    if config.connection_string.trim().is_empty() {
        return Err(Error::Config(
            "DATABASE_URL is missing. Add it to the environment or a .env file".to_string(),
        ));
    }

    let options = config.connect_options()?;
    let target = config.target();

    let pool = PgPoolOptions::new()
        .max_connections(config.pool.max_connections)
        .min_connections(config.pool.min_connections)
        .acquire_timeout(config.pool.acquire_timeout())
        .idle_timeout(config.pool.idle_timeout)
        .connect_lazy_with(options);

    let handle = DatabaseHandle::new(
        pool,
        target.clone(),
        config.pool.connect_timeout,
        config.shutdown_timeout,
    );
    handle.advance(HandleState::Uninitialized, HandleState::Connecting);
    debug!(target_db = %target, tls_mode = %config.tls_mode, "Connecting to database...");

    if let Err(e) = handle.probe().await {
        handle.abandon().await;
        return Err(e);
    }

    handle.advance(HandleState::Connecting, HandleState::Ready);
    info!(
        host = target.host.as_deref().unwrap_or_default(),
        port = target.port.unwrap_or_default(),
        database = target.database.as_deref().unwrap_or_default(),
        tls_mode = %config.tls_mode,
        log_verbosity = %config.log_verbosity,
        max_connections = config.pool.max_connections,
        "Database connected successfully"
    );

    Ok(handle)
}

const TROUBLESHOOTING_HINTS: &[&str] = &[
    "Use the provider's pooled connection endpoint if one exists",
    "Check firewall rules and that the database user may connect to this database",
    "Confirm the server is reachable from this host on the configured port",
];

/// What gets logged when the database cannot be reached. Never holds credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectionDiagnostics {
    version: &'static str,
    environment: RunEnvironment,
    database_url_present: bool,
    host: String,
    port: String,
    database: String,
    tls_mode: TlsMode,
}

impl ConnectionDiagnostics {
    fn collect(config: &ConnectionConfig) -> Self {
        let target = config.target();
        Self {
            version: env!("CARGO_PKG_VERSION"),
            environment: config.environment,
            database_url_present: !config.connection_string.trim().is_empty(),
            host: target.host.unwrap_or_else(|| "<unknown>".to_string()),
            port: target.port.map_or_else(|| "<unknown>".to_string(), |p| p.to_string()),
            database: target.database.unwrap_or_else(|| "<unknown>".to_string()),
            tls_mode: config.tls_mode,
        }
    }
}

fn log_connection_failure(config: &ConnectionConfig, err: &Error) {
    let diagnostics = ConnectionDiagnostics::collect(config);

    error!(error = %err, "Database connection failed");
    error!(
        version = diagnostics.version,
        environment = %diagnostics.environment,
        database_url_present = diagnostics.database_url_present,
        host = %diagnostics.host,
        port = %diagnostics.port,
        database = %diagnostics.database,
        tls_mode = %diagnostics.tls_mode,
        "Database connection diagnostics"
    );

    if matches!(err, Error::Config(_)) {
        return;
    }

    for hint in TROUBLESHOOTING_HINTS {
        warn!("Hint: {}", hint);
    }
    match config.tls_mode {
        TlsMode::Disabled => {
            warn!("Hint: managed Postgres providers usually require TLS; try DATABASE_TLS_MODE=relaxed or strict");
        }
        TlsMode::Strict => {
            warn!("Hint: strict TLS verifies the certificate chain and hostname; check the server certificate");
        }
        TlsMode::Relaxed => {}
    }
}
