//! FinMentor CLI: the main entry point.
//!
//! Commands:
//! - `serve`  : Start the HTTP gateway
//! - `ask`    : Send one message through the full pipeline
//! - `usage`  : Show a user's rate and budget consumption
//! - `config` : Print, locate or validate configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "finmentor",
    about = "FinMentor: conversational financial mentor orchestration",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask the mentor a single question
    Ask {
        /// The question to send
        message: String,

        /// Acting user id
        #[arg(short, long, default_value = "local-user")]
        user: String,

        /// Continue an existing thread instead of starting a new one
        #[arg(short, long)]
        thread: Option<String>,

        /// Response locale (vi, en, zh)
        #[arg(short, long)]
        locale: Option<String>,
    },

    /// Show rate and budget consumption for a user
    Usage {
        /// User id to report on
        #[arg(short, long, default_value = "local-user")]
        user: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a default config file
    Default,
    /// Print the effective configuration (secrets omitted)
    Show,
    /// Print the config file path
    Path,
    /// Validate the config file
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ask {
            message,
            user,
            thread,
            locale,
        } => commands::ask::run(&message, &user, thread.as_deref(), locale.as_deref()).await?,
        Commands::Usage { user } => commands::usage::run(&user).await?,
        Commands::Config { action } => match action {
            ConfigAction::Default => commands::config_cmd::default_toml(),
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
