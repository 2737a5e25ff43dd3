//! CLI module for OpenLab
//!
//! Provides command-line interface parsing for the openlab-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// OpenLab - task orchestration and verification consensus for research workers
#[derive(Parser, Debug)]
#[command(
    name = "openlab-server",
    version,
    about = "OpenLab - task orchestration and verification consensus server",
    long_about = "Coordinates independent research workers: a dependency-aware backlog,\n\
                  atomic task claims with frozen briefs, and 3-vote verification of findings.\n\n\
                  Run without arguments to start the server, or use 'init' to scaffold a deployment.",
    after_help = "EXAMPLES:\n    \
                  openlab-server init                # Write openlab.toml and data/\n    \
                  openlab-server                     # Start the server\n    \
                  openlab-server stats               # Print lab-wide counts\n    \
                  openlab-server reclaim             # Release tasks with expired leases\n    \
                  openlab-server --config lab.toml   # Use a custom config file"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "openlab.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (the default when no subcommand is given)
    Serve {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,

        /// Override server.port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Initialize a new OpenLab deployment
    ///
    /// Creates openlab.toml, the data/ directory, .env.example and .gitignore.
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files without prompting
        #[arg(short, long)]
        force: bool,

        /// Host address for the server
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port for the server
        #[arg(long, default_value = "3000")]
        port: u16,
    },

    /// Show configuration information
    Config {
        /// Show the full configuration
        #[arg(short = 'f', long)]
        full: bool,

        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },

    /// Print dashboard counts
    Stats {
        /// Restrict to one project (id)
        #[arg(long)]
        project: Option<String>,
    },

    /// Return tasks whose lease expired to the backlog
    Reclaim,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
