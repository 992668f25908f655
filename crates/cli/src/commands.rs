use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Print the CLI version and exit
    Version,

    /// Load configuration and exercise the Snowflake connection the
    /// checkpoint store and sink both depend on, without starting any
    /// mapping
    CheckCredentials {
        #[arg(long, help = "Load environment variables from this file before the process env")]
        env_file: Option<String>,
    },

    /// Load and validate configuration, reporting every error found instead
    /// of stopping at the first one
    ValidateConfig {
        #[arg(long, help = "Load environment variables from this file before the process env")]
        env_file: Option<String>,
    },

    /// Start the ingestion pipeline
    Run {
        #[arg(long, help = "Validate configuration and connectivity, then exit without consuming events")]
        dry_run: bool,

        #[arg(long, help = "Force advisory (LLM-backed) retry mode on, overriding SMART_RETRY_ENABLED")]
        smart: bool,

        #[arg(long, help = "Load environment variables from this file before the process env")]
        env_file: Option<String>,
    },

    /// Print the latest checkpoint for every configured mapping's partitions
    Status {
        #[arg(long, help = "Load environment variables from this file before the process env")]
        env_file: Option<String>,

        #[arg(long, help = "Print the checkpoints as JSON instead of a table")]
        json: bool,
    },
}
