//! lokiwatch.toml configuration parser.
//!
//! All fields have defaults, so an absent file yields a working config.
//! Environment variables (the names used by the existing deployment)
//! override file values; see [`WatchConfig::apply_env_overrides`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default LogQL query: extract the JSON body the collector logs as
/// `Body: Map({...})` and parse it into fields.
pub const DEFAULT_QUERY: &str = r#"{app="otel-collector"} |~ `Body: Map\(` | regexp `Body: Map\((?P<body>\{.*\})\)` | line_format "{{.body}}" | json"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WatchConfig {
    pub loki: LokiConfig,
    pub push: PushConfig,
    pub timeouts: TimeoutConfig,
    pub poll: PollConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LokiConfig {
    pub host: String,
    pub port: u16,
    pub query: String,
    /// Maximum entries per `query_range` call.
    pub limit: u32,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Pushgateway base URL, e.g. `http://10.9.8.59:9091`.
    pub gateway: String,
    pub job: String,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time in Error before a server is considered recovered.
    #[serde(with = "duration_str")]
    pub error: Duration,
    /// Silence before a Running/Error server turns Unresponsive.
    #[serde(with = "duration_str")]
    pub unresponsive: Duration,
    /// Silence before a server is forced to Stopped.
    #[serde(with = "duration_str")]
    pub reset: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Fixed period between cycle starts.
    #[serde(with = "duration_str")]
    pub interval: Duration,
    /// Length of the trailing range fetched each cycle.
    #[serde(with = "duration_str")]
    pub window: Duration,
    pub max_consecutive_failures: u32,
    #[serde(with = "duration_str")]
    pub backoff_base: Duration,
    #[serde(with = "duration_str")]
    pub backoff_cap: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub dir: PathBuf,
    /// File name prefix for the daily rolling log file.
    pub file_prefix: String,
    pub console: bool,
    pub json: bool,
    /// Rolled log files kept on disk; older ones are deleted.
    pub max_files: usize,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            host: "10.9.9.149".to_string(),
            port: 3100,
            query: DEFAULT_QUERY.to_string(),
            limit: 5000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            gateway: "http://10.9.8.59:9091".to_string(),
            job: "summary_metrics".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            error: Duration::from_secs(60 * 60),
            unresponsive: Duration::from_secs(5 * 60),
            reset: Duration::from_secs(3 * 60 * 60),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            window: Duration::from_secs(5 * 60),
            max_consecutive_failures: 3,
            backoff_base: Duration::from_secs(60),
            backoff_cap: Duration::from_secs(300),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: PathBuf::from("logs"),
            file_prefix: "lokiwatch.log".to_string(),
            console: false,
            json: false,
            max_files: 5,
        }
    }
}

impl LokiConfig {
    /// `http://host:port` of the Loki server.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl WatchConfig {
    /// Load the effective config: file (if any), then environment
    /// overrides, then validation.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from the environment, read through `lookup`.
    ///
    /// Timeouts keep the units of the legacy variables: hours for the
    /// error and reset timeouts, minutes for the unresponsive timeout.
    /// The unresponsive timeout also sets the poll window.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("Loki_SERVER_HOST").or_else(|| lookup("LOKI_SERVER_HOST")) {
            self.loki.host = host;
        }
        if let Some(port) = lookup("LOKI_SERVER_PORT").or_else(|| lookup("Loki_SERVER_PORT")) {
            self.loki.port = parse_env("LOKI_SERVER_PORT", &port)?;
        }
        if let Some(gateway) = lookup("PROMETHEUS_GATEWAY") {
            self.push.gateway = gateway;
        }
        if let Some(job) = lookup("PROMETHEUS_JOB_NAME") {
            self.push.job = job;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
        if let Some(console) = lookup("ENABLE_CONSOLE_LOG") {
            self.logging.console = console.eq_ignore_ascii_case("true");
        }
        if let Some(count) = lookup("LOG_BACKUP_COUNT") {
            self.logging.max_files = parse_env("LOG_BACKUP_COUNT", &count)?;
        }
        if let Some(hours) = lookup("ERROR_TIMEOUT_HOURS") {
            self.timeouts.error = env_duration("ERROR_TIMEOUT_HOURS", &hours, 60 * 60)?;
        }
        if let Some(minutes) = lookup("UNRESPONSIVE_TIMEOUT_MINUTES") {
            self.timeouts.unresponsive = env_duration("UNRESPONSIVE_TIMEOUT_MINUTES", &minutes, 60)?;
            self.poll.window = self.timeouts.unresponsive;
        }
        if let Some(hours) = lookup("RESET_TIMEOUT_HOURS") {
            self.timeouts.reset = env_duration("RESET_TIMEOUT_HOURS", &hours, 60 * 60)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let nonzero = [
            ("timeouts.error", self.timeouts.error),
            ("timeouts.unresponsive", self.timeouts.unresponsive),
            ("timeouts.reset", self.timeouts.reset),
            ("poll.interval", self.poll.interval),
            ("poll.window", self.poll.window),
            ("loki.timeout", self.loki.timeout),
        ];
        for (field, value) in nonzero {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{field} must be non-zero")));
            }
        }
        if self.timeouts.unresponsive >= self.timeouts.reset {
            return Err(ConfigError::Invalid(
                "timeouts.unresponsive must be shorter than timeouts.reset".to_string(),
            ));
        }
        if self.loki.host.trim().is_empty() {
            return Err(ConfigError::Invalid("loki.host must not be empty".to_string()));
        }
        if self.push.job.trim().is_empty() {
            return Err(ConfigError::Invalid("push.job must not be empty".to_string()));
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::Invalid("logging.max_files must be at least 1".to_string()));
        }
        if self.poll.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "poll.max_consecutive_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

/// A whole number of `unit_secs` units from an environment variable.
fn env_duration(var: &'static str, value: &str, unit_secs: u64) -> ConfigResult<Duration> {
    let count: u64 = parse_env(var, value)?;
    count
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        })
}

/// Parse a duration string like "500ms", "30s", "5m", "3h", or a plain
/// number of seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());
    let parse = |n: &str| n.trim().parse::<u64>().map_err(|_| invalid());
    let scaled = |n: &str, unit: u64| {
        parse(n)?
            .checked_mul(unit)
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    };

    if let Some(ms) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(parse(ms)?))
    } else if let Some(secs) = s.strip_suffix('s') {
        scaled(secs, 1)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled(mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 60 * 60)
    } else {
        scaled(s, 1)
    }
}

/// Render a duration in the largest unit that divides it exactly.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
