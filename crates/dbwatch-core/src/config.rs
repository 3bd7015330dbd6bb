//! Connection and monitor configuration.
//!
//! Connection defaults follow the client conventions of each dialect:
//! - postgresql: PGHOST, PGPORT, PGUSER (fallback $USER), PGPASSWORD, PGDATABASE
//! - mysql: MYSQL_HOST, MYSQL_TCP_PORT, $USER (fallback root), MYSQL_PWD
//!
//! Explicit values (CLI flags) are layered on top with the `with_*` builders.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::MonitorError;

/// Default interval between checks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Database engine variant targeted by the probe set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgresql,
    Mysql,
}

impl Dialect {
    /// Default TCP port of the server.
    pub fn default_port(self) -> u16 {
        match self {
            Dialect::Postgresql => 5432,
            Dialect::Mysql => 3306,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgresql => "postgresql",
            Dialect::Mysql => "mysql",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Dialect::Postgresql),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            other => Err(MonitorError::Configuration(format!(
                "unsupported database type: {}",
                other
            ))),
        }
    }
}

/// Parameters of the monitored database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    dialect: Dialect,
    host: String,
    port: u16,
    database: String,
    user: String,
    password: String,
}

impl ConnectionConfig {
    /// Creates a config with explicit values and no password.
    pub fn new(
        dialect: Dialect,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            dialect,
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: String::new(),
        }
    }

    /// Builds a config from the process environment.
    pub fn from_env(dialect: Dialect) -> Self {
        Self::from_lookup(dialect, |key| std::env::var(key).ok())
    }

    /// Builds a config using `lookup` to resolve environment variables.
    pub fn from_lookup(dialect: Dialect, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        match dialect {
            Dialect::Postgresql => {
                let user = get("PGUSER")
                    .or_else(|| get("USER"))
                    .unwrap_or_else(|| "postgres".to_string());
                let port = get("PGPORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(dialect.default_port());
                Self {
                    dialect,
                    host: get("PGHOST").unwrap_or_else(|| "localhost".to_string()),
                    port,
                    database: get("PGDATABASE").unwrap_or_else(|| user.clone()),
                    user,
                    password: get("PGPASSWORD").unwrap_or_default(),
                }
            }
            Dialect::Mysql => {
                let port = get("MYSQL_TCP_PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(dialect.default_port());
                Self {
                    dialect,
                    host: get("MYSQL_HOST").unwrap_or_else(|| "localhost".to_string()),
                    port,
                    database: "mysql".to_string(),
                    user: get("USER").unwrap_or_else(|| "root".to_string()),
                    password: get("MYSQL_PWD").unwrap_or_default(),
                }
            }
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field(
                "password",
                &if self.password.is_empty() { "" } else { "***" },
            )
            .finish()
    }
}

/// Alert thresholds used by the analysis rules.
#[derive(Clone, Debug, PartialEq)]
pub struct Thresholds {
    /// Minimum running time for a session to appear in the slow-query snapshot.
    pub slow_query_ms: u64,
    /// A slow query running longer than this raises a finding.
    pub very_slow_query_ms: f64,
    /// More active connections than this raises a finding.
    pub max_active_connections: i64,
    /// A cache hit ratio (percent) below this raises a finding.
    pub min_cache_hit_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            slow_query_ms: 1000,
            very_slow_query_ms: 5000.0,
            max_active_connections: 100,
            min_cache_hit_ratio: 95.0,
        }
    }
}

/// Scheduling and threshold settings of a monitor run.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorSettings {
    /// Pause between the end of one check and the start of the next.
    pub interval: Duration,
    /// Total run budget; `None` runs until cancelled.
    pub duration: Option<Duration>,
    pub thresholds: Thresholds,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            duration: None,
            thresholds: Thresholds::default(),
        }
    }
}

impl MonitorSettings {
    /// Rejects thresholds the analysis rules cannot use.
    pub fn validate(&self) -> Result<(), MonitorError> {
        let t = &self.thresholds;
        if !t.very_slow_query_ms.is_finite() || t.very_slow_query_ms < 0.0 {
            return Err(MonitorError::Configuration(format!(
                "invalid very-slow query threshold: {}",
                t.very_slow_query_ms
            )));
        }
        if !(0.0..=100.0).contains(&t.min_cache_hit_ratio) {
            return Err(MonitorError::Configuration(format!(
                "cache hit ratio threshold must be within 0..=100, got {}",
                t.min_cache_hit_ratio
            )));
        }
        Ok(())
    }

    /// Rejects a schedule the watch loop cannot honour. One-shot runs never
    /// look at the interval.
    pub fn validate_schedule(&self) -> Result<(), MonitorError> {
        if self.interval < Duration::from_secs(1) {
            return Err(MonitorError::Configuration(
                "interval must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}
