pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use presence_core::config::{AppConfig, LoadOptions, LogFormat};

use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "presence",
    about = "Slack user status operator CLI",
    long_about = "Verify Slack accounts, inspect their presence entities, and set or clear their profile status.",
    after_help = "Examples:\n  presence check\n  presence set-status --entity sensor.jane_doe --text \"In a meeting\" --emoji :calendar:\n  presence clear-status"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to the config file (defaults to presence.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the auth probe for every configured account")]
    Check,
    #[command(about = "Set up every account and print its entity state")]
    Status,
    #[command(about = "Set status text, emoji and expiration on one or more entities")]
    SetStatus {
        #[arg(long = "entity", help = "Target entity id; repeat for several (default: all)")]
        entities: Vec<String>,
        #[arg(long, help = "Status text; an empty value clears it")]
        text: Option<String>,
        #[arg(long, help = "Status emoji such as :car:; an empty value clears it")]
        emoji: Option<String>,
        #[arg(long, help = "Expiration datetime, or an empty value for none")]
        expiration: Option<String>,
    },
    #[command(about = "Clear status text, emoji and expiration on one or more entities")]
    ClearStatus {
        #[arg(long = "entity", help = "Target entity id; repeat for several (default: all)")]
        entities: Vec<String>,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        config_path: cli.config.clone(),
        require_file: cli.config.is_some(),
        ..LoadOptions::default()
    };

    let result = match cli.command {
        Command::Config => commands::config::run(options),
        Command::Check => with_config(options, "check", commands::check::run),
        Command::Status => with_config(options, "status", commands::status::run),
        Command::SetStatus { entities, text, emoji, expiration } => {
            let request = commands::set_status::SetStatusArgs { entities, text, emoji, expiration };
            with_config(options, "set-status", |config| commands::set_status::run(config, request))
        }
        Command::ClearStatus { entities } => with_config(options, "clear-status", |config| {
            commands::set_status::run_clear(config, entities)
        }),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Loads config and logging before a command that talks to Slack.
fn with_config(
    options: LoadOptions,
    command: &str,
    body: impl FnOnce(&AppConfig) -> CommandResult,
) -> CommandResult {
    match AppConfig::load(options) {
        Ok(config) => {
            init_logging(&config);
            body(&config)
        }
        Err(error) => CommandResult::config_failure(command, &error),
    }
}

// Results go to stdout, so logs stay on stderr.
fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use presence_core::config::LoadOptions;

    use super::with_config;

    #[test]
    fn config_failure_short_circuits_before_the_command_body() {
        let options = LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/presence.toml")),
            require_file: true,
            ..LoadOptions::default()
        };

        let result = with_config(options, "status", |_| panic!("command body must not run"));

        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("\"command\":\"status\""));
        assert!(result.output.contains("\"error_class\":\"config_validation\""));
    }
}
