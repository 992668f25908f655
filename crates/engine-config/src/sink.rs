use crate::error::ConfigError;
use std::time::Duration;

/// Connection credentials for the Snowflake account (§6 "Sink connection").
#[derive(Debug, Clone)]
pub struct SinkConnectionConfig {
    pub account: String,
    pub user: String,
    pub private_key_file: String,
    pub private_key_password: Option<String>,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: Option<String>,
    pub pipe_name: String,
}

impl SinkConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipe_name.trim().is_empty() {
            return Err(ConfigError::MissingField("pipe_name"));
        }
        if self.account.trim().is_empty() {
            return Err(ConfigError::MissingField("account"));
        }
        if self.private_key_file.trim().is_empty() {
            return Err(ConfigError::MissingField("private_key_file"));
        }
        Ok(())
    }
}

/// One sink target: a warehouse table plus its own retry/timeout tuning
/// (§6 "Sink topology").
#[derive(Debug, Clone)]
pub struct SinkTargetConfig {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub batch_size: usize,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub connection_timeout_seconds: u64,
}

impl SinkTargetConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }
}

/// Control table location (§6). Defaults to `CONTROL.PUBLIC.INGESTION_STATUS`.
#[derive(Debug, Clone)]
pub struct ControlTableConfig {
    pub control_db: String,
    pub control_schema: String,
    pub control_table: String,
}

impl Default for ControlTableConfig {
    fn default() -> Self {
        Self {
            control_db: "CONTROL".to_string(),
            control_schema: "PUBLIC".to_string(),
            control_table: "INGESTION_STATUS".to_string(),
        }
    }
}
