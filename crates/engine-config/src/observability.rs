use crate::error::ConfigError;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(ConfigError::InvalidValue {
                field: "log_level",
                reason: format!("`{other}` is not one of DEBUG, INFO, WARNING, ERROR, CRITICAL"),
            }),
        }
    }
}

impl LogLevel {
    /// Maps to the `tracing`/`tracing-subscriber` filter directive.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "error",
        }
    }
}

/// Observability configuration (§6). `token` is required whenever `enabled
/// && send_to_cloud`; constructing with that combination missing a token
/// fails at config-parse time rather than at first export attempt.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    pub token: Option<String>,
    pub service_name: String,
    pub environment: String,
    pub send_to_cloud: bool,
    pub console_logging: bool,
    pub log_level: LogLevel,
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.send_to_cloud && self.token.is_none() {
            return Err(ConfigError::MissingField("token"));
        }
        Ok(())
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
            service_name: "evsnow".to_string(),
            environment: "development".to_string(),
            send_to_cloud: false,
            console_logging: true,
            log_level: LogLevel::Info,
        }
    }
}
