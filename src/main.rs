use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use issueboard::board::models::{Severity, SortBy};
use issueboard::config::BoardConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "issueboard")]
#[command(version, about = "Issue board with optimistic moves, time-boxed undo and priority ranking")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory containing `.issueboard/board.toml` (defaults to the current directory)
    #[arg(long, global = true, env = "ISSUEBOARD_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the board HTTP API
    Serve {
        /// Port to listen on (overrides [server] port)
        #[arg(long)]
        port: Option<u16>,
        /// Bind every interface and allow cross-origin requests
        #[arg(long)]
        dev: bool,
    },
    /// Print the board grouped by column
    Board {
        /// Case-insensitive match on title or tags
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
        /// priority, created or updated
        #[arg(long, default_value = "priority")]
        sort: SortBy,
    },
    /// Show one issue and add it to the recently viewed list
    Show { id: String },
    /// Poll the backend and print a line per sync
    Watch {
        /// Poll interval in milliseconds (overrides [board] poll_interval_ms)
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Stop after this many updates
        #[arg(long)]
        ticks: Option<usize>,
    },
    /// List recently viewed issues
    Recent,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default board.toml file
    Init,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("ISSUEBOARD_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "issueboard=debug,info"
        } else {
            "issueboard=info,warn"
        })
    });

    let format = env::var("ISSUEBOARD_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&project_dir, command.clone());
    }

    let config = BoardConfig::new(project_dir, cli.verbose)?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    match &cli.command {
        Commands::Serve { port, dev } => cmd::cmd_serve(&config, *port, *dev).await?,
        Commands::Board {
            search,
            assignee,
            severity,
            sort,
        } => {
            cmd::cmd_board(&config, search, assignee.clone(), *severity, *sort).await?;
        }
        Commands::Show { id } => cmd::cmd_show(&config, id).await?,
        Commands::Watch { interval_ms, ticks } => {
            cmd::cmd_watch(&config, *interval_ms, *ticks).await?;
        }
        Commands::Recent => cmd::cmd_recent(&config).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
