use clap::Parser;
use commands::Commands;
use connectors::eventhub::azure::AzureEventHubSource;
use connectors::eventhub::mock::MockEventSource;
use connectors::snowflake::checkpoint_store::{CheckpointStore, SnowflakeCheckpointStore};
use connectors::snowflake::client::SnowflakeClient;
use connectors::snowflake::jwt::KeyPairCredentials;
use connectors::snowflake::sink::{self, SnowflakeStreamingSink};
use engine_config::app::AppConfig;
use engine_config::env::EnvManager;
use engine_config::sink::SinkConnectionConfig;
use engine_config::telemetry::init_tracing;
use engine_core::metrics::Metrics;
use engine_core::retry::RetryPolicy;
use engine_processing::identity::MappingIdentity;
use engine_processing::mapping::{Mapping, MappingHandle};
use engine_runtime::orchestrator::Orchestrator;
use engine_runtime::shutdown::ShutdownCoordinator;
use error::CliError;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod commands;
mod error;

#[derive(Parser)]
#[command(name = "evsnow", version = env!("CARGO_PKG_VERSION"), about = "Event Hubs to Snowflake ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let exit_code = match run_cli().await {
        Ok(()) => 0,
        Err(CliError::ShutdownRequested) => {
            info!("shutdown requested, exiting");
            0
        }
        Err(e) => {
            tracing::error!("{e}");
            1
        }
    };

    process::exit(exit_code);
}

async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("evsnow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::CheckCredentials { env_file } => {
            let config = load_config(env_file.as_deref())?;
            init_tracing(&config.observability);
            check_credentials(&config).await
        }
        Commands::ValidateConfig { env_file } => {
            let config = load_config(env_file.as_deref())?;
            println!(
                "configuration valid: {} stream(s), {} mapping(s)",
                config.source.streams.len(),
                config.mappings.len()
            );
            for mapping in &config.mappings {
                println!("  {} -> {}", mapping.name, mapping.target_key);
            }
            Ok(())
        }
        Commands::Run { dry_run, smart, env_file } => {
            let mut config = load_config(env_file.as_deref())?;
            init_tracing(&config.observability);
            if smart {
                config.retry.advisory_enabled = true;
            }
            run_pipeline(config, dry_run).await
        }
        Commands::Status { env_file, json } => {
            let config = load_config(env_file.as_deref())?;
            init_tracing(&config.observability);
            print_status(&config, json).await
        }
    }
}

fn load_config(env_file: Option<&str>) -> Result<AppConfig, CliError> {
    let mut env = EnvManager::new();
    if let Some(path) = env_file {
        env.load_from_file(path)?;
    }
    Ok(AppConfig::load(&env)?)
}

/// The client suffix each process's channels are cached under (§4.3) — scoped
/// to this run so two concurrent processes never contend for the same
/// Snowflake Streaming channel.
fn client_suffix(environment: Option<&str>) -> String {
    format!("{}-{}", environment.unwrap_or("default"), process::id())
}

fn account_host(connection: &SinkConnectionConfig) -> String {
    format!("{}.snowflakecomputing.com", connection.account)
}

async fn load_private_key_pem(connection: &SinkConnectionConfig) -> Result<String, CliError> {
    Ok(tokio::fs::read_to_string(&connection.private_key_file).await?)
}

async fn build_snowflake_client(connection: &SinkConnectionConfig) -> Result<SnowflakeClient, CliError> {
    let pem = load_private_key_pem(connection).await?;
    let credentials = KeyPairCredentials::load(
        connection.account.clone(),
        connection.user.clone(),
        &pem,
        connection.private_key_password.as_deref(),
    )?;
    Ok(SnowflakeClient::new(account_host(connection), credentials))
}

async fn build_checkpoint_store(config: &AppConfig) -> Result<Arc<SnowflakeCheckpointStore>, CliError> {
    let client = build_snowflake_client(&config.sink_connection).await?;
    let store = SnowflakeCheckpointStore::new(
        client,
        config.control_table.control_db.clone(),
        config.control_table.control_schema.clone(),
        config.control_table.control_table.clone(),
    )?;
    store.ensure_table().await?;
    Ok(Arc::new(store))
}

async fn build_streaming_sink(config: &AppConfig) -> Result<Arc<SnowflakeStreamingSink>, CliError> {
    let connection = &config.sink_connection;
    let pem = load_private_key_pem(connection).await?;
    let streaming_sink = sink::build_sink(
        account_host(connection),
        connection.account.clone(),
        connection.user.clone(),
        &pem,
        connection.private_key_password.as_deref(),
        connection.pipe_name.clone(),
        client_suffix(config.environment.as_deref()),
    )?;
    Ok(Arc::new(streaming_sink))
}

/// Exercises the same pooled connection path the checkpoint store and sink
/// both depend on (§6 "check-credentials"): one lightweight statement against
/// the SQL API proves the key pair and account are usable before any mapping
/// is started.
async fn check_credentials(config: &AppConfig) -> Result<(), CliError> {
    let client = build_snowflake_client(&config.sink_connection).await?;
    let result = client.execute_sql("SELECT CURRENT_VERSION()").await?;
    info!(?result, "Snowflake credentials valid");
    println!("Snowflake credentials OK ({})", config.sink_connection.account);
    Ok(())
}

fn retry_policy(config: &AppConfig) -> Result<RetryPolicy, CliError> {
    if config.retry.advisory_enabled {
        return Err(CliError::Unexpected(
            "SMART_RETRY_ENABLED requires a configured decision oracle, and none is wired up yet".to_string(),
        ));
    }

    Ok(RetryPolicy::fixed(
        config.retry.max_attempts as usize,
        Duration::from_secs(1),
        Duration::from_secs(30),
    ))
}

/// Builds one `Mapping` per configured mapping. Under `--dry-run` the event
/// source is the in-memory `MockEventSource` rather than a live Event Hubs
/// consumer (mirroring the adapter `validate-config` and tests use, per
/// SPEC_FULL's crate layout), so a dry run never needs Event Hubs credentials
/// or network access; the sink and checkpoint store stay real, so a dry run
/// still proves out Snowflake connectivity the way `check-credentials` does.
async fn build_mappings(config: &AppConfig, dry_run: bool) -> Result<Vec<Box<dyn MappingHandle>>, CliError> {
    let sink = build_streaming_sink(config).await?;
    let checkpoint_store = build_checkpoint_store(config).await?;
    let metrics = Metrics::new();

    let mut mappings: Vec<Box<dyn MappingHandle>> = Vec::with_capacity(config.mappings.len());

    for mapping_config in &config.mappings {
        let target = config
            .targets
            .get(&mapping_config.target_key)
            .ok_or_else(|| CliError::Unexpected(format!("no target registered for `{}`", mapping_config.target_key)))?;

        let identity = MappingIdentity {
            source_namespace: config.source.namespace.clone(),
            source_name: mapping_config.stream.name.clone(),
            target_db: target.database.clone(),
            target_schema: target.schema.clone(),
            target_table: target.table.clone(),
        };

        if dry_run {
            let mapping = Mapping::new(
                mapping_config.name.clone(),
                identity,
                sink.clone(),
                checkpoint_store.clone(),
                MockEventSource::new,
                target.batch_size,
                Duration::from_secs(target.retry_delay_seconds.max(1)),
                retry_policy(config)?,
                retry_policy(config)?,
                metrics.clone(),
            );
            mappings.push(Box::new(mapping));
            continue;
        }

        let namespace = config.source.namespace.clone();
        let event_hub_name = mapping_config.stream.name.clone();
        let consumer_group = mapping_config.stream.consumer_group.clone();

        let mapping = Mapping::new(
            mapping_config.name.clone(),
            identity,
            sink.clone(),
            checkpoint_store.clone(),
            move || {
                AzureEventHubSource::with_default_credential(&namespace, &event_hub_name, &consumer_group)
                    .unwrap_or_else(|e| panic!("failed to build Event Hubs source: {e}"))
            },
            target.batch_size,
            Duration::from_secs(target.retry_delay_seconds.max(1)),
            retry_policy(config)?,
            retry_policy(config)?,
            metrics.clone(),
        );

        mappings.push(Box::new(mapping));
    }

    Ok(mappings)
}

/// `run` (§6). A plain `--dry-run` initializes every mapping against a mock
/// event source — opening the sink channel and loading checkpoints, but never
/// touching Event Hubs — then stops immediately without entering the
/// steady-state consume loop.
async fn run_pipeline(config: AppConfig, dry_run: bool) -> Result<(), CliError> {
    if config.mappings.is_empty() {
        return Err(CliError::Unexpected("no mappings configured; nothing to run".to_string()));
    }

    let mappings = build_mappings(&config, dry_run).await?;

    let cancel = CancellationToken::new();
    let shutdown_coordinator = ShutdownCoordinator::new(cancel.clone());
    shutdown_coordinator.register_handlers();

    let mut orchestrator = Orchestrator::new(cancel.clone());
    orchestrator.init(mappings).await?;

    if dry_run {
        info!("dry run: configuration and Snowflake connectivity validated, skipping steady-state run");
        orchestrator.shutdown().await;
        shutdown_coordinator.mark_shutdown_complete();
        return Ok(());
    }

    orchestrator.run().await;
    orchestrator.shutdown().await;
    shutdown_coordinator.mark_shutdown_complete();

    let stats = orchestrator.stats();
    info!(
        mappings = stats.mapping_count,
        rows_appended = stats.rows_appended,
        batches = stats.batches_processed,
        "pipeline stopped"
    );

    if shutdown_coordinator.is_shutdown_requested() {
        return Err(CliError::ShutdownRequested);
    }

    Ok(())
}

/// `status` (§6). This process has no running orchestrator to query, so
/// status is reported from the control table directly: the latest checkpoint
/// per configured mapping's partitions, the same data `load_all_partitions`
/// feeds a mapping on resume.
async fn print_status(config: &AppConfig, as_json: bool) -> Result<(), CliError> {
    let checkpoint_store = build_checkpoint_store(config).await?;

    let mut report = Vec::new();
    for mapping_config in &config.mappings {
        let target = config
            .targets
            .get(&mapping_config.target_key)
            .ok_or_else(|| CliError::Unexpected(format!("no target registered for `{}`", mapping_config.target_key)))?;

        let checkpoints = checkpoint_store
            .load_all_partitions(
                &config.source.namespace,
                &mapping_config.stream.name,
                &target.database,
                &target.schema,
                &target.table,
            )
            .await?;

        report.push(serde_json::json!({
            "mapping": mapping_config.name,
            "target": mapping_config.target_key,
            "checkpoints": checkpoints.into_iter().map(|c| serde_json::json!({
                "partition_id": c.key.partition_id,
                "waterlevel": c.waterlevel,
                "inserted_at": c.inserted_at.to_rfc3339(),
            })).collect::<Vec<_>>(),
        }));
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entry in &report {
            println!("{} ({})", entry["mapping"], entry["target"]);
            for checkpoint in entry["checkpoints"].as_array().into_iter().flatten() {
                println!(
                    "  partition {}: waterlevel {} @ {}",
                    checkpoint["partition_id"], checkpoint["waterlevel"], checkpoint["inserted_at"]
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::sink::SinkConnectionConfig;

    fn connection() -> SinkConnectionConfig {
        SinkConnectionConfig {
            account: "myorg-myaccount".to_string(),
            user: "ingest_user".to_string(),
            private_key_file: "/tmp/key.pem".to_string(),
            private_key_password: None,
            warehouse: "INGEST_WH".to_string(),
            database: "RAW".to_string(),
            schema: "PUBLIC".to_string(),
            role: None,
            pipe_name: "events_pipe".to_string(),
        }
    }

    #[test]
    fn account_host_appends_the_snowflakecomputing_domain() {
        assert_eq!(account_host(&connection()), "myorg-myaccount.snowflakecomputing.com");
    }

    #[test]
    fn client_suffix_falls_back_to_default_when_environment_is_unset() {
        let suffix = client_suffix(None);
        assert_eq!(suffix, format!("default-{}", process::id()));
    }

    #[test]
    fn client_suffix_uses_the_configured_environment_name() {
        let suffix = client_suffix(Some("staging"));
        assert_eq!(suffix, format!("staging-{}", process::id()));
    }
}
