use anyhow::Result;
use clap::{Parser, Subcommand};
use classpulse_core::ActionKind;

mod commands;
mod config;

use config::ConfigLoader;

#[derive(Parser)]
#[command(name = "classpulse", about = "Classroom behavior telemetry and teacher signals")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file of recorded envelopes
    Replay(commands::replay::ReplayArgs),
    /// Show praise-worthy and need-attention students of a classroom
    Signals(commands::signals::SignalsArgs),
    /// Praise students
    Praise(commands::action::ActionArgs),
    /// Send students an attention reminder
    Attention(commands::action::ActionArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Replay(args) => commands::replay::run(args, ConfigLoader::load()?).await,
        Commands::Signals(args) => commands::signals::run(args, ConfigLoader::load()?).await,
        Commands::Praise(args) => {
            commands::action::run(ActionKind::Praise, args, ConfigLoader::load()?).await
        }
        Commands::Attention(args) => {
            commands::action::run(ActionKind::Attention, args, ConfigLoader::load()?).await
        }
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
    fn test_praise_parses_student_ids() {
        let cli = Cli::try_parse_from([
            "classpulse", "praise", "--school", "1", "--class", "2", "--classroom", "3",
            "--teacher", "4", "10", "11",
        ])
        .unwrap();
        match cli.command {
            Commands::Praise(args) => assert_eq!(args.students, vec![10, 11]),
            _ => panic!("expected praise"),
        }
    }

    #[test]
    fn test_action_requires_students() {
        let result = Cli::try_parse_from([
            "classpulse", "attention", "--school", "1", "--class", "2", "--classroom", "3",
            "--teacher", "4",
        ]);
        assert!(result.is_err());
    }
}
