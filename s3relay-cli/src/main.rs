//! S3Relay command-line interface.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use s3relay::logging::{init_logging, LogConfig};

use commands::run::RunArgs;

#[derive(Debug, Parser)]
#[command(name = "s3relay", version, about, long_about = None)]
struct Cli {
    /// Path to the INI config file (default: ~/.config/s3relay/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download the source and upload it to S3
    Run(RunArgs),

    /// Print the resolved configuration
    ShowConfig,
}

fn main() {
    let cli = Cli::parse();

    let mut log_config = LogConfig::default().verbose(cli.verbose);
    if let Some(path) = cli.log_file.clone() {
        log_config = log_config.with_file(path);
    }
    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: {}", e);
            None
        }
    };

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args, config_path),
        Commands::ShowConfig => commands::show_config::run(config_path),
    };

    if let Err(e) = result {
        // process::exit skips destructors; flush file logs first.
        drop(guard);
        e.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_global_flags() {
        let cli = Cli::try_parse_from([
            "s3relay",
            "run",
            "--bucket",
            "b",
            "--dry-run",
            "-v",
            "--config",
            "/tmp/relay.ini",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/relay.ini")));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.bucket.as_deref(), Some("b"));
                assert!(args.dry_run);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_show_config() {
        let cli = Cli::try_parse_from(["s3relay", "show-config"]).unwrap();
        assert!(matches!(cli.command, Commands::ShowConfig));
    }
}
