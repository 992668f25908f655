use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    Openai,
    Anthropic,
    Azure,
    Gemini,
    Groq,
    Cohere,
}

/// C1's configuration surface (§6). `max_attempts` and `timeout_seconds` are
/// validated at construction, not at first use, so a bad config fails fast
/// at startup (§8 "config-parse time" boundary).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub advisory_enabled: bool,
    pub oracle_provider: Option<OracleProvider>,
    pub oracle_model: Option<String>,
    pub oracle_key: Option<String>,
    pub max_attempts: u32,
    pub timeout_seconds: u32,
    pub enable_caching: bool,
}

impl RetryConfig {
    pub fn new(
        advisory_enabled: bool,
        oracle_provider: Option<OracleProvider>,
        oracle_model: Option<String>,
        oracle_key: Option<String>,
        max_attempts: u32,
        timeout_seconds: u32,
        enable_caching: bool,
    ) -> Result<Self, ConfigError> {
        if !(1..=10).contains(&max_attempts) {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                reason: format!("{max_attempts} not in 1..=10"),
            });
        }
        if !(1..=60).contains(&timeout_seconds) {
            return Err(ConfigError::InvalidValue {
                field: "timeout_seconds",
                reason: format!("{timeout_seconds} not in 1..=60"),
            });
        }
        if advisory_enabled && oracle_provider.is_none() {
            return Err(ConfigError::MissingField("oracle_provider"));
        }

        Ok(Self {
            advisory_enabled,
            oracle_provider,
            oracle_model,
            oracle_key,
            max_attempts,
            timeout_seconds,
            enable_caching,
        })
    }

    pub fn fixed(max_attempts: u32, timeout_seconds: u32) -> Result<Self, ConfigError> {
        Self::new(false, None, None, None, max_attempts, timeout_seconds, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_max_attempts_out_of_range() {
        assert!(RetryConfig::fixed(0, 10).is_err());
        assert!(RetryConfig::fixed(11, 10).is_err());
        assert!(RetryConfig::fixed(10, 10).is_ok());
    }

    #[test]
    fn rejects_timeout_out_of_range() {
        assert!(RetryConfig::fixed(3, 0).is_err());
        assert!(RetryConfig::fixed(3, 61).is_err());
        assert!(RetryConfig::fixed(3, 60).is_ok());
    }

    #[test]
    fn advisory_mode_requires_a_provider() {
        let result = RetryConfig::new(true, None, None, None, 3, 10, false);
        assert!(result.is_err());
    }
}
