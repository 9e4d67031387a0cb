mod commands;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use metasync_engine::retry::{DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_RETRIES};
use metasync_engine::AgentConfig;

#[derive(Parser)]
#[command(
    name = "metasync",
    version,
    about = "Collect metadata from sources and deliver it to sinks"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    agent: AgentArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every recipe at a path
    Run {
        /// Recipe file, or directory of recipe files
        path: PathBuf,
    },
    /// Check recipes without running them
    Lint {
        /// Recipe file, or directory of recipe files
        path: PathBuf,
    },
    /// List registered plugins
    List,
}

#[derive(Args, Debug)]
struct AgentArgs {
    /// Retries after the first attempt for extractors and sink writes
    #[arg(long, env = "METASYNC_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES, global = true)]
    max_retries: u32,

    /// Wait before the first retry, in seconds
    #[arg(
        long,
        env = "METASYNC_RETRY_INITIAL_INTERVAL_SECS",
        default_value_t = DEFAULT_INITIAL_INTERVAL.as_secs(),
        global = true
    )]
    retry_initial_interval_secs: u64,

    /// Fail a run when a sink write still fails after retries
    #[arg(
        long,
        env = "METASYNC_STOP_ON_SINK_ERROR",
        default_value_t = true,
        action = ArgAction::Set,
        global = true
    )]
    stop_on_sink_error: bool,

    /// Records per sink delivery (0 delivers everything at the end)
    #[arg(long, env = "METASYNC_SINK_BATCH_SIZE", default_value_t = 0, global = true)]
    sink_batch_size: usize,
}

impl AgentArgs {
    fn into_config(self) -> AgentConfig {
        AgentConfig {
            max_retries: self.max_retries,
            retry_initial_interval: Duration::from_secs(self.retry_initial_interval_secs),
            sink_batch_size: self.sink_batch_size,
            stop_on_sink_error: self.stop_on_sink_error,
            ..AgentConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let config = cli.agent.into_config();
    tracing::debug!(?config, "Agent configuration");

    match cli.command {
        Commands::Run { path } => commands::run::execute(&path, config).await,
        Commands::Lint { path } => commands::lint::execute(&path),
        Commands::List => commands::list::execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn agent_flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "metasync",
            "run",
            "recipes/",
            "--max-retries",
            "2",
            "--retry-initial-interval-secs",
            "1",
            "--stop-on-sink-error",
            "false",
            "--sink-batch-size",
            "50",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Run { .. }));

        let config = cli.agent.into_config();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_initial_interval, Duration::from_secs(1));
        assert!(!config.stop_on_sink_error);
        assert_eq!(config.sink_batch_size, 50);
    }
}
