//! Destination and pool configuration
//!
//! Loading configuration files is the host's job; these types only describe
//! the shape and defaults.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "postgresql")]
    Postgres,
    Sqlite,
    Clickhouse,
    #[serde(alias = "elasticsearch")]
    Elastic,
    Redis,
}

/// Which compiler/executor family a backend belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFamily {
    Sql,
    Search,
    KeyValue,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Mysql => "mysql",
            BackendKind::Postgres => "postgres",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Clickhouse => "clickhouse",
            BackendKind::Elastic => "elastic",
            BackendKind::Redis => "redis",
        }
    }

    pub fn family(&self) -> BackendFamily {
        match self {
            BackendKind::Mysql
            | BackendKind::Postgres
            | BackendKind::Sqlite
            | BackendKind::Clickhouse => BackendFamily::Sql,
            BackendKind::Elastic => BackendFamily::Search,
            BackendKind::Redis => BackendFamily::KeyValue,
        }
    }

    /// Identifier quote character for SQL backends
    pub fn quote_char(&self) -> char {
        match self {
            BackendKind::Postgres => '"',
            _ => '`',
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved destination: which backend, how to reach it, and call policy.
///
/// Timeouts are in milliseconds; zero or negative means no deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbAddress {
    /// Logical name, used in logs
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub kind: BackendKind,

    /// Connection string; also the pool registry key
    pub dsn: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Backend major version (search engines change path layout between versions)
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: i64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: i64,

    /// Calls slower than this are logged as slow
    #[serde(default = "default_warn_timeout_ms")]
    pub warn_timeout_ms: i64,

    #[serde(default)]
    pub debug: bool,

    /// Suppress error logging for this destination
    #[serde(default)]
    pub omit_error: bool,
}

fn default_read_timeout_ms() -> i64 {
    5_000
}

fn default_write_timeout_ms() -> i64 {
    5_000
}

fn default_warn_timeout_ms() -> i64 {
    200
}

fn as_deadline(ms: i64) -> Option<Duration> {
    if ms > 0 {
        Some(Duration::from_millis(ms as u64))
    } else {
        None
    }
}

impl DbAddress {
    pub fn new(kind: BackendKind, dsn: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            kind,
            dsn: dsn.into(),
            password: None,
            version: None,
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            warn_timeout_ms: default_warn_timeout_ms(),
            debug: false,
            omit_error: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeouts(mut self, read_ms: i64, write_ms: i64) -> Self {
        self.read_timeout_ms = read_ms;
        self.write_timeout_ms = write_ms;
        self
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        as_deadline(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        as_deadline(self.write_timeout_ms)
    }

    /// Deadline for a read or a write
    pub fn timeout_for(&self, is_write: bool) -> Option<Duration> {
        if is_write {
            self.write_timeout()
        } else {
            self.read_timeout()
        }
    }

    pub fn warn_threshold(&self) -> Duration {
        as_deadline(self.warn_timeout_ms)
            .unwrap_or_else(|| Duration::from_millis(default_warn_timeout_ms() as u64))
    }

    /// Major version number, if one was configured
    pub fn major_version(&self) -> Option<u32> {
        self.version
            .as_deref()
            .and_then(|v| v.trim_start_matches(|c| c == 'v' || c == 'V').split('.').next())
            .and_then(|v| v.parse().ok())
    }
}

/// Connection pool sizing handed to the connector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolOptions {
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    #[serde(default = "default_max_open")]
    pub max_open: usize,

    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,

    #[serde(default = "default_max_idle_time_secs")]
    pub max_idle_time_secs: u64,
}

fn default_max_idle() -> usize {
    10
}

fn default_max_open() -> usize {
    10_000
}

fn default_max_lifetime_secs() -> u64 {
    180
}

fn default_max_idle_time_secs() -> u64 {
    180
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_idle: default_max_idle(),
            max_open: default_max_open(),
            max_lifetime_secs: default_max_lifetime_secs(),
            max_idle_time_secs: default_max_idle_time_secs(),
        }
    }
}

impl PoolOptions {
    /// Defaults for key-value pools, which keep many more idle connections
    pub fn key_value() -> Self {
        Self {
            max_idle: 2048,
            max_open: 0,
            max_lifetime_secs: 0,
            max_idle_time_secs: 180,
        }
    }

    /// Defaults for the given backend
    pub fn for_backend(kind: BackendKind) -> Self {
        match kind.family() {
            BackendFamily::KeyValue => Self::key_value(),
            _ => Self::default(),
        }
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn max_idle_time(&self) -> Duration {
        Duration::from_secs(self.max_idle_time_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_defaults() {
        let addr: DbAddress =
            serde_json::from_value(json!({"type": "mysql", "dsn": "root@tcp(db:3306)/app"}))
                .unwrap();
        assert_eq!(addr.kind, BackendKind::Mysql);
        assert_eq!(addr.read_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(addr.warn_threshold(), Duration::from_millis(200));
        assert!(!addr.omit_error);
    }

    #[test]
    fn test_non_positive_timeout_means_no_deadline() {
        let addr = DbAddress::new(BackendKind::Redis, "redis://x").with_timeouts(0, -1);
        assert_eq!(addr.read_timeout(), None);
        assert_eq!(addr.timeout_for(true), None);
    }

    #[test]
    fn test_backend_aliases() {
        let kind: BackendKind = serde_json::from_value(json!("elasticsearch")).unwrap();
        assert_eq!(kind, BackendKind::Elastic);
        assert_eq!(kind.family(), BackendFamily::Search);
        assert_eq!(BackendKind::Postgres.quote_char(), '"');
    }

    #[test]
    fn test_major_version() {
        let mut addr = DbAddress::new(BackendKind::Elastic, "http://es:9200");
        assert_eq!(addr.major_version(), None);
        addr.version = Some("v6.8".to_string());
        assert_eq!(addr.major_version(), Some(6));
    }

    #[test]
    fn test_pool_defaults_per_family() {
        assert_eq!(PoolOptions::for_backend(BackendKind::Mysql).max_open, 10_000);
        assert_eq!(PoolOptions::for_backend(BackendKind::Redis).max_idle, 2048);
    }
}
