use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "freelancie")]
#[command(version, about = "Freelance marketplace API server")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (defaults to ./freelancie.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and WebSocket server
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind (overrides config and HOST)
        #[arg(long)]
        host: Option<String>,

        /// SQLite database file (overrides config and DATABASE_PATH)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Serve built frontend assets from this directory
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Enable permissive CORS for a separately served frontend
        #[arg(long)]
        dev: bool,
    },
    /// Create the database file and schema, then exit
    InitDb {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Run every payment processor and notification channel once
    Demo {
        /// Amount charged by each processor
        #[arg(long, default_value = "100")]
        amount: f64,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and print warnings
    Validate,
    /// Write a default freelancie.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            static_dir,
            dev,
        } => {
            cmd::cmd_serve(
                cli.config.as_deref(),
                cli.verbose,
                cmd::ServeOverrides {
                    port,
                    host,
                    db_path,
                    static_dir,
                    dev,
                },
            )
            .await?;
        }
        Commands::InitDb { db_path } => {
            cmd::cmd_init_db(cli.config.as_deref(), db_path)?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(cli.config.as_deref(), command)?;
        }
        Commands::Demo { amount } => {
            cmd::cmd_demo(amount, cli.verbose).await?;
        }
    }

    Ok(())
}
