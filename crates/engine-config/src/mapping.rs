use crate::error::ConfigError;
use crate::sink::SinkTargetConfig;
use crate::source::StreamConfig;
use std::collections::HashMap;

/// Binds one source stream to one sink target by a symbolic key (§6
/// "Mappings"). The orchestrator constructs one mapping per entry.
#[derive(Debug, Clone)]
pub struct MappingConfig {
    pub name: String,
    pub stream: StreamConfig,
    pub target_key: String,
}

/// Resolves each [`MappingConfig`]'s `target_key` against the registered
/// sink targets, failing fast at config-parse time on a dangling reference
/// rather than at first flush.
pub fn resolve_targets<'a>(
    mappings: &'a [MappingConfig],
    targets: &'a HashMap<String, SinkTargetConfig>,
) -> Result<Vec<(&'a MappingConfig, &'a SinkTargetConfig)>, ConfigError> {
    mappings
        .iter()
        .map(|mapping| {
            targets
                .get(&mapping.target_key)
                .map(|target| (mapping, target))
                .ok_or_else(|| ConfigError::UnknownMappingTarget(mapping.target_key.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StreamTunables;

    fn stream() -> StreamConfig {
        StreamConfig {
            name: "orders".into(),
            consumer_group: "$Default".into(),
            connection_string: None,
            tunables: StreamTunables::default(),
        }
    }

    #[test]
    fn resolves_mappings_with_known_targets() {
        let mapping = MappingConfig { name: "orders-ingest".into(), stream: stream(), target_key: "warehouse".into() };
        let mut targets = HashMap::new();
        targets.insert(
            "warehouse".to_string(),
            SinkTargetConfig {
                database: "DB".into(),
                schema: "SCHEMA".into(),
                table: "ORDERS".into(),
                batch_size: 500,
                max_retry_attempts: 5,
                retry_delay_seconds: 2,
                connection_timeout_seconds: 30,
            },
        );

        let resolved = resolve_targets(&[mapping], &targets).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].1.table, "ORDERS");
    }

    #[test]
    fn rejects_a_dangling_target_key() {
        let mapping = MappingConfig { name: "orders-ingest".into(), stream: stream(), target_key: "missing".into() };
        let targets = HashMap::new();
        assert!(resolve_targets(&[mapping], &targets).is_err());
    }
}
