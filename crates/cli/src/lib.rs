pub mod commands;
pub mod logging;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use reune_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "reune",
    about = "Reune operator CLI",
    long_about = "Operate the reune event-planning assistant: migrations, config inspection, \
                  readiness checks and offline planning commands.",
    after_help = "Examples:\n  reune doctor --json\n  reune classify churrasco para 12 pessoas\n  \
                  reune split --event 42"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model provider readiness and database schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Classify an utterance and show the extracted slots, without the model")]
    Classify {
        #[arg(required = true, num_args = 1.., help = "Utterance to classify")]
        text: Vec<String>,
    },
    #[command(about = "Compute and store the cost split of an event")]
    Split {
        #[arg(long, help = "Numeric event id")]
        event: String,
    },
    #[command(about = "Show the full plan of an event with its cost summary")]
    Plan {
        #[arg(long, help = "Numeric event id")]
        event: String,
    },
    #[command(about = "Delete a user's conversation context and message history")]
    Clear {
        #[arg(long, help = "User id whose history is removed")]
        user: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Commands report their own config failures; logging just falls back to defaults.
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    logging::init_logging(&logging);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Classify { text } => commands::classify::run(&text.join(" ")),
        Command::Split { event } => commands::split::run(&event),
        Command::Plan { event } => commands::plan::run(&event),
        Command::Clear { user } => commands::clear::run(&user),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
