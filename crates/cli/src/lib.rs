pub mod bootstrap;
pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tally_core::config::{AppConfig, ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "tally",
    about = "Time-tracking agent CLI",
    long_about = "Book and query time entries through a conversational agent. Every booking, \
                  update or deletion waits for a human decision before it runs.",
    after_help = "Examples:\n  tally chat \"Book 4 hours on Website for Wednesday\"\n  tally pending\n  tally resume <thread-id> --decision '{\"action\":\"approve\"}'\n  tally config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this TOML file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override the configured log level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override the time-tracking API base URL")]
    api_url: Option<String>,
    #[arg(long, global = true, help = "Override the directory holding suspended threads")]
    session_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Send a message to the agent; stops when a call needs review")]
    Chat {
        message: String,
        #[arg(long, help = "Thread id to use instead of a generated one")]
        thread: Option<String>,
    },
    #[command(about = "Apply a review decision to a suspended thread and continue it")]
    Resume {
        thread_id: String,
        #[arg(
            long,
            help = "Decision JSON: approve, edit (revised_arguments), reject (reason) or feedback (message)"
        )]
        decision: String,
    },
    #[command(about = "List threads waiting for a review decision")]
    Pending,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                api_base_url: self.api_url.clone(),
                session_dir: self.session_dir.clone(),
                log_level: self.log_level.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    if let Ok(config) = AppConfig::load(options.clone()) {
        logging::init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Chat { message, thread } => commands::chat::run(&options, &message, thread),
        Command::Resume { thread_id, decision } => {
            commands::resume::run(&options, &thread_id, &decision)
        }
        Command::Pending => commands::pending::run(&options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
