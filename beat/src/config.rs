//! Configuration for mysqlbeat
//!
//! Loaded from a YAML file, then overridden from `MYSQLBEAT_*` environment
//! variables. [`Config::validate`] turns the raw file into a
//! [`ResolvedConfig`] or fails with [`BeatError::Configuration`].
//!
//! ```yaml
//! mysqlbeat:
//!   period: 10s
//!   hostname: 127.0.0.1
//!   port: 3306
//!   username: mysqlbeat_user
//!   encryptedpassword: 2321f38819cf693951
//!   queries:
//!     - sql: SHOW GLOBAL STATUS
//!       kind: two-columns
//!       tag: status
//!     - SHOW SLAVE STATUS
//!   querytypes:
//!     - two-columns
//!     - show-slave-delay
//! output:
//!   format: json
//! logging:
//!   level: info
//! ```

use crate::backoff::BackoffConfig;
use crate::connector::{ConnectorConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONNECT_ATTEMPTS};
use crate::error::{BeatError, Result};
use crate::password::decrypt_password;
use crate::statement::{PollRequest, Statement, StatementKind};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_PERIOD: &str = "10s";
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_USERNAME: &str = "mysqlbeat_user";
pub const DEFAULT_PASSWORD: &str = "mysqlbeat_pass";

/// Shortest accepted poll period
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = BeatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(BeatError::config(format!("unknown log format '{other}'"))),
        }
    }
}

/// `logging:` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `mysqlbeat=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// How the stdout output renders events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document per line
    #[default]
    Json,
    /// Boxed, human readable
    Pretty,
}

/// `output.retry:` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after a failed emit; 0 disables the retry wrapper
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_attempts: self.max_attempts,
            ..Default::default()
        }
    }
}

/// `output:` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub retry: RetryConfig,
}

/// `metrics:` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Listen address of the `/metrics` server; unset disables it
    pub addr: Option<SocketAddr>,
}

/// One `queries:` entry, either bare SQL or a full table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QueryEntry {
    Plain(String),
    Detailed {
        sql: String,
        #[serde(default)]
        kind: Option<StatementKind>,
        #[serde(default)]
        tag: Option<String>,
    },
}

/// `mysqlbeat:` section, as written in the file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BeatSection {
    pub period: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encryptedpassword: Option<String>,
    pub max_connect_attempts: Option<u32>,
    pub connect_timeout: Option<String>,
    pub query_timeout: Option<String>,
    pub queries: Vec<QueryEntry>,
    /// Kinds for plain `queries` entries, by index
    pub querytypes: Vec<String>,
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mysqlbeat: BeatSection,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Read a YAML file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BeatError::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml(&text)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse YAML text without looking at the environment
    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty file is an empty mapping
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| BeatError::config(format!("invalid YAML: {e}")))
    }

    /// Apply `MYSQLBEAT_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(level) = lookup("MYSQLBEAT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("MYSQLBEAT_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(host) = lookup("MYSQLBEAT_HOSTNAME") {
            self.mysqlbeat.hostname = Some(host);
        }
        if let Some(port) = lookup("MYSQLBEAT_PORT") {
            let port = port
                .trim()
                .parse()
                .map_err(|_| BeatError::config(format!("MYSQLBEAT_PORT is not a port: {port}")))?;
            self.mysqlbeat.port = Some(port);
        }
        if let Some(user) = lookup("MYSQLBEAT_USERNAME") {
            self.mysqlbeat.username = Some(user);
        }
        if let Some(password) = lookup("MYSQLBEAT_PASSWORD") {
            self.mysqlbeat.password = Some(password);
            self.mysqlbeat.encryptedpassword = None;
        }
        if let Some(addr) = lookup("MYSQLBEAT_METRICS_ADDR") {
            let addr = addr.trim().parse().map_err(|_| {
                BeatError::config(format!("MYSQLBEAT_METRICS_ADDR is not an address: {addr}"))
            })?;
            self.metrics.addr = Some(addr);
        }
        Ok(())
    }

    /// Resolve defaults and check everything needed to start polling
    pub fn validate(&self) -> Result<ResolvedConfig> {
        let section = &self.mysqlbeat;

        let period = match &section.period {
            Some(p) => parse_duration(p)?,
            None => {
                info!(period = DEFAULT_PERIOD, "period not set, using default");
                parse_duration(DEFAULT_PERIOD)?
            }
        };
        if period < MIN_PERIOD {
            return Err(BeatError::config(format!(
                "period must be at least 1ms, got {period:?}"
            )));
        }

        let hostname = section.hostname.clone().unwrap_or_else(|| {
            info!(hostname = DEFAULT_HOSTNAME, "hostname not set, using default");
            DEFAULT_HOSTNAME.to_string()
        });
        let port = section.port.unwrap_or_else(|| {
            info!(port = DEFAULT_PORT, "port not set, using default");
            DEFAULT_PORT
        });
        let username = section.username.clone().unwrap_or_else(|| {
            info!(username = DEFAULT_USERNAME, "username not set, using default");
            DEFAULT_USERNAME.to_string()
        });

        let password = match (&section.password, &section.encryptedpassword) {
            (Some(plain), _) => plain.clone(),
            (None, Some(encrypted)) => decrypt_password(encrypted)?,
            (None, None) => {
                info!("password not set, using default");
                DEFAULT_PASSWORD.to_string()
            }
        };

        let max_connect_attempts = section
            .max_connect_attempts
            .unwrap_or(DEFAULT_MAX_CONNECT_ATTEMPTS);
        if max_connect_attempts == 0 {
            return Err(BeatError::config("max_connect_attempts must be at least 1"));
        }

        let connect_timeout = match &section.connect_timeout {
            Some(t) => parse_duration(t)?,
            None => DEFAULT_CONNECT_TIMEOUT,
        };
        if connect_timeout.is_zero() {
            return Err(BeatError::config("connect_timeout must be positive"));
        }

        let query_timeout = match &section.query_timeout {
            Some(t) => {
                let timeout = parse_duration(t)?;
                if timeout.is_zero() {
                    return Err(BeatError::config("query_timeout must be positive"));
                }
                Some(timeout)
            }
            None => None,
        };

        let request = PollRequest::new(self.statements()?)?;

        Ok(ResolvedConfig {
            period,
            hostname,
            port,
            username,
            password,
            max_connect_attempts,
            connect_timeout,
            query_timeout,
            request,
            output: self.output.clone(),
            logging: self.logging.clone(),
            metrics_addr: self.metrics.addr,
        })
    }

    fn statements(&self) -> Result<Vec<Statement>> {
        let section = &self.mysqlbeat;
        if !section.querytypes.is_empty() && section.querytypes.len() != section.queries.len() {
            return Err(BeatError::config(format!(
                "queries ({}) and querytypes ({}) must have the same length",
                section.queries.len(),
                section.querytypes.len()
            )));
        }

        section
            .queries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let legacy_kind = section
                    .querytypes
                    .get(index)
                    .map(|k| k.parse::<StatementKind>())
                    .transpose()?;
                let default_tag = format!("query_{}", index + 1);

                match entry {
                    QueryEntry::Plain(sql) => {
                        Statement::new(default_tag, sql.as_str(), legacy_kind.unwrap_or_default())
                    }
                    QueryEntry::Detailed { sql, kind, tag } => Statement::new(
                        tag.clone().unwrap_or(default_tag),
                        sql.as_str(),
                        kind.or(legacy_kind).unwrap_or_default(),
                    ),
                }
            })
            .collect()
    }
}

/// Validated configuration the beat runs with
#[derive(Clone)]
pub struct ResolvedConfig {
    pub period: Duration,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub max_connect_attempts: u32,
    pub connect_timeout: Duration,
    pub query_timeout: Option<Duration>,
    pub request: PollRequest,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub metrics_addr: Option<SocketAddr>,
}

impl ResolvedConfig {
    /// Settings for the connector
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            max_attempts: self.max_connect_attempts,
            connect_timeout: self.connect_timeout,
            query_timeout: self.query_timeout,
            ..Default::default()
        }
    }
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("period", &self.period)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("max_connect_attempts", &self.max_connect_attempts)
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("statements", &self.request.len())
            .field("output", &self.output)
            .field("logging", &self.logging)
            .field("metrics_addr", &self.metrics_addr)
            .finish()
    }
}

/// Parse a duration such as `10s`, `500ms`, `1m30s` or `1.5h`
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare `0` is zero.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let invalid = || BeatError::config(format!("invalid duration '{text}'"));
    let s = text.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total_ns = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_ns += value * scale;
    }

    if !total_ns.is_finite() || total_ns > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_ns.round() as u64))
}
