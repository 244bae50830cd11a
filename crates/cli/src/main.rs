//! EchoGarden CLI — the main entry point.
//!
//! Commands:
//! - `search` — Hybrid-ranked search over a JSONL archive
//! - `pack`   — Token-budgeted context pack from message identifiers
//! - `config` — Print the effective configuration

use clap::{Parser, Subcommand, ValueEnum};
use echogarden_config::EngineConfig;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "echogarden",
    about = "EchoGarden — hybrid search and context packs over conversation archives",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.echogarden/config.toml)
    #[arg(long, global = true, env = "ECHO_GARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Search an archive
    Search(commands::search::SearchArgs),

    /// Build a context pack from message identifiers
    Pack(commands::pack::PackArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = config_path(&cli);
    let config = EngineConfig::load_with_env(&config_path)?;

    // The log level comes from the config, so the load is reported here.
    init_tracing(&cli, &config);
    if config_path.exists() {
        tracing::debug!(path = %config_path.display(), "Loaded configuration");
    } else {
        tracing::info!(path = %config_path.display(), "No config file found, using defaults");
    }

    match cli.command {
        Commands::Search(args) => commands::search::run(args, &config).await?,
        Commands::Pack(args) => commands::pack::run(args, &config).await?,
        Commands::Config => commands::config_cmd::show(&config),
    }

    Ok(())
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(EngineConfig::default_path)
}

fn init_tracing(cli: &Cli, config: &EngineConfig) {
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log.level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match cli.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_path_wins() {
        let cli = Cli::try_parse_from(["echogarden", "--config", "/tmp/eg.toml", "config"]).unwrap();
        assert_eq!(config_path(&cli), PathBuf::from("/tmp/eg.toml"));
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "echogarden",
            "pack",
            "--archive",
            "a.jsonl",
            "c1/1",
            "--log-format",
            "json",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.log_format == LogFormat::Json);
        assert!(matches!(cli.command, Commands::Pack(_)));
    }
}
