use crate::env::EnvManager;
use crate::error::ConfigError;
use crate::mapping::MappingConfig;
use crate::observability::{LogLevel, ObservabilityConfig};
use crate::retry::{OracleProvider, RetryConfig};
use crate::sink::{ControlTableConfig, SinkConnectionConfig, SinkTargetConfig};
use crate::source::{SourceTopology, StreamConfig, StreamTunables};
use std::collections::HashMap;
use std::str::FromStr;

/// The complete configuration surface of §6, assembled from an [`EnvManager`]
/// snapshot. Mirrors the original pipeline's environment variable naming
/// (`EVENTHUB_NAMESPACE`, `EVENTHUBNAME_{N}[_CONSUMER_GROUP|_CONNECTION_STRING]`,
/// `SNOWFLAKE_*` connection fields, `SNOWFLAKE_{N}_*` targets, `SMART_RETRY_*`,
/// `LOGFIRE_*`) so a deployment's existing `.env` carries over unchanged.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: SourceTopology,
    pub sink_connection: SinkConnectionConfig,
    pub control_table: ControlTableConfig,
    pub targets: HashMap<String, SinkTargetConfig>,
    pub mappings: Vec<MappingConfig>,
    pub retry: RetryConfig,
    pub observability: ObservabilityConfig,
    pub environment: Option<String>,
    pub region: Option<String>,
}

impl AppConfig {
    pub fn load(env: &EnvManager) -> Result<Self, ConfigError> {
        let namespace = require(env, "EVENTHUB_NAMESPACE")?;
        let numbered_streams = parse_streams(env);
        let streams = numbered_streams.iter().map(|(_, s)| s.clone()).collect();
        let targets = parse_targets(env);
        let mappings = build_mappings(&numbered_streams, &targets);

        let config = Self {
            source: SourceTopology { namespace, streams },
            sink_connection: parse_sink_connection(env)?,
            control_table: parse_control_table(env),
            targets,
            mappings,
            retry: parse_retry(env)?,
            observability: parse_observability(env)?,
            environment: env.get("ENVIRONMENT").map(str::to_string),
            region: env.get("REGION").map(str::to_string),
        };

        config.sink_connection.validate()?;
        config.observability.validate()?;
        crate::mapping::resolve_targets(&config.mappings, &config.targets)?;

        Ok(config)
    }
}

fn require(env: &EnvManager, key: &'static str) -> Result<String, ConfigError> {
    env.get(key).map(str::to_string).ok_or(ConfigError::MissingField(key))
}

fn parse_bool(env: &EnvManager, key: &str, default: bool) -> bool {
    env.get(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn parse_u32(env: &EnvManager, key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env.get(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            field: key,
            reason: format!("`{v}` is not a valid integer"),
        }),
    }
}

/// Scans `EVENTHUBNAME_{N}[_CONSUMER_GROUP|_CONNECTION_STRING]` entries and
/// groups them by `N`, the same dynamic parsing the original config module
/// performs over `os.environ`. Returned in ascending `N` order so mapping
/// names stay stable across runs.
fn parse_streams(env: &EnvManager) -> Vec<(String, StreamConfig)> {
    let mut names: HashMap<String, String> = HashMap::new();
    let mut consumer_groups: HashMap<String, String> = HashMap::new();
    let mut connection_strings: HashMap<String, String> = HashMap::new();

    for (key, value) in env.all() {
        let Some(rest) = key.strip_prefix("EVENTHUBNAME_") else { continue };
        if let Some(n) = rest.strip_suffix("_CONSUMER_GROUP") {
            consumer_groups.insert(n.to_string(), value.clone());
        } else if let Some(n) = rest.strip_suffix("_CONNECTION_STRING") {
            connection_strings.insert(n.to_string(), value.clone());
        } else if rest.chars().all(|c| c.is_ascii_digit()) {
            names.insert(rest.to_string(), value.clone());
        }
    }

    let mut streams: Vec<(String, StreamConfig)> = names
        .into_iter()
        .map(|(n, name)| {
            let stream = StreamConfig {
                name,
                consumer_group: consumer_groups.get(&n).cloned().unwrap_or_else(|| "$Default".to_string()),
                connection_string: connection_strings.get(&n).cloned(),
                tunables: StreamTunables::default(),
            };
            (n, stream)
        })
        .collect();
    streams.sort_by(|a, b| a.0.cmp(&b.0));
    streams
}

/// Scans `SNOWFLAKE_{N}_{DATABASE,SCHEMA,TABLE,BATCH_SIZE,...}` entries,
/// keyed by the same `N` used in [`parse_streams`]'s `EVENTHUBNAME_{N}` so
/// [`build_mappings`] can pair them by number. Targets missing one of the
/// three required fields are dropped rather than registered half-built.
fn parse_targets(env: &EnvManager) -> HashMap<String, SinkTargetConfig> {
    let mut fields: HashMap<String, HashMap<&'static str, String>> = HashMap::new();

    for (key, value) in env.all() {
        let Some(rest) = key.strip_prefix("SNOWFLAKE_") else { continue };
        let Some((num, field)) = rest.split_once('_') else { continue };
        if !num.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let field_name = match field {
            "DATABASE" => "database",
            "SCHEMA" => "schema",
            "TABLE" => "table",
            "BATCH_SIZE" => "batch_size",
            "MAX_RETRY_ATTEMPTS" => "max_retry_attempts",
            "RETRY_DELAY_SECONDS" => "retry_delay_seconds",
            "CONNECTION_TIMEOUT_SECONDS" => "connection_timeout_seconds",
            _ => continue,
        };
        fields.entry(num.to_string()).or_default().insert(field_name, value.clone());
    }

    fields
        .into_iter()
        .filter_map(|(num, f)| {
            let target = SinkTargetConfig {
                database: f.get("database")?.clone(),
                schema: f.get("schema")?.clone(),
                table: f.get("table")?.clone(),
                batch_size: f.get("batch_size").and_then(|v| v.parse().ok()).unwrap_or(1000),
                max_retry_attempts: f.get("max_retry_attempts").and_then(|v| v.parse().ok()).unwrap_or(3),
                retry_delay_seconds: f.get("retry_delay_seconds").and_then(|v| v.parse().ok()).unwrap_or(5),
                connection_timeout_seconds: f
                    .get("connection_timeout_seconds")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            };
            Some((format!("SNOWFLAKE_{num}"), target))
        })
        .collect()
}

/// Auto-maps each numbered source stream to the sink target sharing its
/// suffix — `EVENTHUBNAME_1` to `SNOWFLAKE_1` — the same convention the
/// original pipeline's mapping builder uses. A stream with no matching
/// target is left unmapped rather than erroring here; `resolve_targets`
/// only validates targets a mapping actually references.
fn build_mappings(
    numbered_streams: &[(String, StreamConfig)],
    targets: &HashMap<String, SinkTargetConfig>,
) -> Vec<MappingConfig> {
    numbered_streams
        .iter()
        .filter_map(|(num, stream)| {
            let target_key = format!("SNOWFLAKE_{num}");
            targets.contains_key(&target_key).then(|| MappingConfig {
                name: format!("{}-to-{}", stream.name, target_key),
                stream: stream.clone(),
                target_key,
            })
        })
        .collect()
}

fn parse_sink_connection(env: &EnvManager) -> Result<SinkConnectionConfig, ConfigError> {
    Ok(SinkConnectionConfig {
        account: require(env, "SNOWFLAKE_ACCOUNT")?,
        user: require(env, "SNOWFLAKE_USER")?,
        private_key_file: require(env, "SNOWFLAKE_PRIVATE_KEY_FILE")?,
        private_key_password: env.get("SNOWFLAKE_PRIVATE_KEY_PASSWORD").map(str::to_string),
        warehouse: require(env, "SNOWFLAKE_WAREHOUSE")?,
        database: require(env, "SNOWFLAKE_DATABASE")?,
        schema: require(env, "SNOWFLAKE_SCHEMA")?,
        role: env.get("SNOWFLAKE_ROLE").map(str::to_string),
        pipe_name: require(env, "SNOWFLAKE_PIPE_NAME")?,
    })
}

fn parse_control_table(env: &EnvManager) -> ControlTableConfig {
    let default = ControlTableConfig::default();
    ControlTableConfig {
        control_db: env.get("CONTROL_DB").map(str::to_string).unwrap_or(default.control_db),
        control_schema: env.get("CONTROL_SCHEMA").map(str::to_string).unwrap_or(default.control_schema),
        control_table: env.get("CONTROL_TABLE").map(str::to_string).unwrap_or(default.control_table),
    }
}

fn parse_retry(env: &EnvManager) -> Result<RetryConfig, ConfigError> {
    let advisory_enabled = parse_bool(env, "SMART_RETRY_ENABLED", false);
    let oracle_provider = if advisory_enabled {
        Some(parse_oracle_provider(env.get("SMART_RETRY_LLM_PROVIDER").unwrap_or("openai"))?)
    } else {
        None
    };

    RetryConfig::new(
        advisory_enabled,
        oracle_provider,
        env.get("SMART_RETRY_LLM_MODEL").map(str::to_string),
        env.get("SMART_RETRY_LLM_API_KEY").map(str::to_string),
        parse_u32(env, "SMART_RETRY_MAX_ATTEMPTS", 3)?,
        parse_u32(env, "SMART_RETRY_TIMEOUT_SECONDS", 10)?,
        parse_bool(env, "SMART_RETRY_ENABLE_CACHING", true),
    )
}

fn parse_oracle_provider(value: &str) -> Result<OracleProvider, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "openai" => Ok(OracleProvider::Openai),
        "anthropic" => Ok(OracleProvider::Anthropic),
        "azure" => Ok(OracleProvider::Azure),
        "gemini" => Ok(OracleProvider::Gemini),
        "groq" => Ok(OracleProvider::Groq),
        "cohere" => Ok(OracleProvider::Cohere),
        other => Err(ConfigError::InvalidValue {
            field: "oracle_provider",
            reason: format!("unsupported provider `{other}`"),
        }),
    }
}

fn parse_observability(env: &EnvManager) -> Result<ObservabilityConfig, ConfigError> {
    let default = ObservabilityConfig::default();
    let log_level = match env.get("LOGFIRE_LOG_LEVEL") {
        Some(v) => LogLevel::from_str(v)?,
        None => default.log_level,
    };

    Ok(ObservabilityConfig {
        enabled: parse_bool(env, "LOGFIRE_ENABLED", default.enabled),
        token: env.get("LOGFIRE_TOKEN").map(str::to_string),
        service_name: env.get("LOGFIRE_SERVICE_NAME").map(str::to_string).unwrap_or(default.service_name),
        environment: env.get("LOGFIRE_ENVIRONMENT").map(str::to_string).unwrap_or(default.environment),
        send_to_cloud: parse_bool(env, "LOGFIRE_SEND_TO_LOGFIRE", default.send_to_cloud),
        console_logging: parse_bool(env, "LOGFIRE_CONSOLE_LOGGING", default.console_logging),
        log_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> EnvManager {
        let mut content = String::new();
        for (k, v) in pairs {
            content.push_str(&format!("{k}={v}\n"));
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, content).unwrap();
        EnvManager::from_file(&path).unwrap()
    }

    fn base_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("EVENTHUB_NAMESPACE", "myhub.servicebus.windows.net"),
            ("EVENTHUBNAME_1", "orders"),
            ("EVENTHUBNAME_1_CONSUMER_GROUP", "$Default"),
            ("SNOWFLAKE_1_DATABASE", "DB"),
            ("SNOWFLAKE_1_SCHEMA", "SCHEMA"),
            ("SNOWFLAKE_1_TABLE", "ORDERS"),
            ("SNOWFLAKE_ACCOUNT", "acct"),
            ("SNOWFLAKE_USER", "user"),
            ("SNOWFLAKE_PRIVATE_KEY_FILE", "/tmp/key.pem"),
            ("SNOWFLAKE_WAREHOUSE", "wh"),
            ("SNOWFLAKE_DATABASE", "DB"),
            ("SNOWFLAKE_SCHEMA", "SCHEMA"),
            ("SNOWFLAKE_PIPE_NAME", "ORDERS_PIPE"),
        ]
    }

    #[test]
    fn loads_a_minimal_complete_configuration() {
        let env = env_from(&base_pairs());
        let config = AppConfig::load(&env).unwrap();

        assert_eq!(config.source.namespace, "myhub.servicebus.windows.net");
        assert_eq!(config.source.streams.len(), 1);
        assert_eq!(config.source.streams[0].name, "orders");
        assert_eq!(config.mappings.len(), 1);
        assert_eq!(config.mappings[0].target_key, "SNOWFLAKE_1");
        assert_eq!(config.control_table.control_db, "CONTROL");
        assert!(!config.retry.advisory_enabled);
    }

    #[test]
    fn missing_namespace_is_a_config_error() {
        let pairs: Vec<_> = base_pairs().into_iter().filter(|(k, _)| *k != "EVENTHUB_NAMESPACE").collect();
        let env = env_from(&pairs);
        assert!(AppConfig::load(&env).is_err());
    }

    #[test]
    fn stream_without_a_matching_target_is_left_unmapped() {
        let mut pairs = base_pairs();
        pairs.push(("EVENTHUBNAME_2", "returns"));
        let env = env_from(&pairs);
        let config = AppConfig::load(&env).unwrap();

        assert_eq!(config.source.streams.len(), 2);
        assert_eq!(config.mappings.len(), 1);
    }

    #[test]
    fn smart_retry_enabled_without_provider_defaults_to_openai() {
        let mut pairs = base_pairs();
        pairs.push(("SMART_RETRY_ENABLED", "true"));
        let env = env_from(&pairs);
        let config = AppConfig::load(&env).unwrap();
        assert!(config.retry.advisory_enabled);
        assert_eq!(config.retry.oracle_provider, Some(OracleProvider::Openai));
    }
}
