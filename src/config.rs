use crate::error::{ExporterError, Result as ExporterResult};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Port the EZ1 local API listens on out of the box.
pub const DEFAULT_INVERTER_PORT: u16 = 8050;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default, alias = "inverter_config")]
    pub inverter: InverterConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inverter address as found in the config file. Both parts are optional
/// here; [`resolve_inverter_address`] decides which source wins.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InverterConfig {
    #[serde(default, alias = "ip", alias = "IP")]
    pub host: Option<String>,
    #[serde(default, alias = "Port")]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Stop serving and exit as soon as SIGINT/SIGTERM arrives
    #[serde(default = "default_true")]
    pub exit_on_signal: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    #[serde(default = "default_collect_interval")]
    pub collect_interval_seconds: u64,
    #[serde(default = "default_max_failures")]
    pub max_failures_before_degraded: u32,
    #[serde(default = "default_true")]
    pub health_file_enabled: bool,
    #[serde(default = "default_health_file_path")]
    pub health_file_path: PathBuf,
    /// Custom metric schema; the built-in EZ1 schema is used when unset
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9120
}

fn default_collect_interval() -> u64 {
    30
}

fn default_max_failures() -> u32 {
    5
}

fn default_health_file_path() -> PathBuf {
    PathBuf::from("maybe_unhealthy")
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
            exit_on_signal: true,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            collect_interval_seconds: default_collect_interval(),
            max_failures_before_degraded: default_max_failures(),
            health_file_enabled: true,
            health_file_path: default_health_file_path(),
            schema_path: None,
        }
    }
}

impl Config {
    /// Read the layered configuration. Call [`Config::validate`] once any
    /// command line overrides are applied.
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("APSYSTEMS_EXPORTER").separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn validate(&self) -> ExporterResult<()> {
        if self.collector.collect_interval_seconds == 0 {
            return Err(ExporterError::Config(
                "collect_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.collector.max_failures_before_degraded == 0 {
            return Err(ExporterError::Config(
                "max_failures_before_degraded must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log verbosity, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Filter directive for `tracing_subscriber::EnvFilter`.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "10" => Ok(LogLevel::Debug),
            "info" | "20" => Ok(LogLevel::Info),
            "warning" | "warn" | "30" => Ok(LogLevel::Warning),
            "error" | "40" => Ok(LogLevel::Error),
            "critical" | "50" => Ok(LogLevel::Critical),
            other => Err(format!(
                "unknown log level '{}' (expected debug, info, warning, error, critical or 10..50)",
                other
            )),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, String> {
        value.parse()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

const INVERTER_IP_VARS: [&str; 2] = ["INVERTER_IP", "Inverter_IP"];
const INVERTER_PORT_VARS: [&str; 2] = ["INVERTER_PORT", "Inverter_Port"];
const COLLECT_INTERVAL_VARS: [&str; 2] = ["COLLECT_INTERVAL_SECONDS", "Collect_Interval_Seconds"];

fn first_var(lookup: &impl Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| lookup(*name))
}

/// Base interval from `COLLECT_INTERVAL_SECONDS` or `Collect_Interval_Seconds`.
pub fn collect_interval_from_env() -> Option<u64> {
    collect_interval_from_vars(|name| std::env::var(name).ok())
}

pub fn collect_interval_from_vars(lookup: impl Fn(&str) -> Option<String>) -> Option<u64> {
    first_var(&lookup, &COLLECT_INTERVAL_VARS).and_then(|v| v.trim().parse().ok())
}

/// Resolved `host:port` of the inverter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InverterAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for InverterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    CommandLine,
    Environment,
    ConfigFile,
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSource::CommandLine => f.write_str("command line parameters"),
            AddressSource::Environment => f.write_str("environment variables"),
            AddressSource::ConfigFile => f.write_str("config file"),
        }
    }
}

/// One possible origin of the inverter address.
#[derive(Debug, Clone)]
pub struct AddressCandidate {
    pub source: AddressSource,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl AddressCandidate {
    pub fn new(source: AddressSource, host: Option<String>, port: Option<u16>) -> Self {
        Self { source, host, port }
    }

    /// Read `INVERTER_IP` / `INVERTER_PORT`, falling back to the legacy
    /// `Inverter_IP` / `Inverter_Port` names.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`AddressCandidate::from_env`] over an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = first_var(&lookup, &INVERTER_IP_VARS);
        let port = first_var(&lookup, &INVERTER_PORT_VARS).and_then(|p| p.trim().parse().ok());
        Self::new(AddressSource::Environment, host, port)
    }

    pub fn from_file(config: &InverterConfig) -> Self {
        Self::new(
            AddressSource::ConfigFile,
            config.host.clone(),
            config.port,
        )
    }

    fn address(&self) -> Option<InverterAddress> {
        let host = self.host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        let port = self.port.filter(|p| *p != 0)?;
        Some(InverterAddress {
            host: host.to_string(),
            port,
        })
    }
}

/// Pick the first candidate that has both a non-empty host and a non-zero
/// port. Candidates are tried in the order given.
pub fn resolve_inverter_address(
    candidates: &[AddressCandidate],
) -> ExporterResult<(InverterAddress, AddressSource)> {
    candidates
        .iter()
        .find_map(|c| c.address().map(|addr| (addr, c.source)))
        .ok_or_else(|| {
            ExporterError::Config(
                "no inverter address configured (set --inverter-ip, \
                 INVERTER_IP/INVERTER_PORT or the [inverter] config section)"
                    .to_string(),
            )
        })
}
