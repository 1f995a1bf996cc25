//! Tilecast CLI: the main entry point.
//!
//! Commands:
//! - `init`    : Write the default config file
//! - `serve`   : Start the HTTP gateway
//! - `generate`: Run one generation and print the plan
//! - `status`  : Show the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tilecast",
    about = "Tilecast: LLM-driven dashboard generation",
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
    #[arg(long, global = true, env = "TILECAST_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate one dashboard and print it as JSON
    Generate {
        /// User preferences, as JSON or free text
        #[arg(short, long)]
        preferences: Option<String>,

        /// JSON file mapping endpoint paths to descriptors
        #[arg(short, long)]
        apis: Option<PathBuf>,

        /// Write the plan here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the iteration ceiling
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Generate {
            preferences,
            apis,
            output,
            max_iterations,
        } => {
            commands::generate::run(commands::generate::GenerateArgs {
                preferences,
                apis,
                output,
                max_iterations,
            })
            .await?
        }
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
