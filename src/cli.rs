use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Links inspecting tool
#[derive(Parser)]
#[command(name = "links")]
#[command(about = "Discover and check links under a single host")]
pub struct Cli {
    /// Path to config file (default location is displayed on the first line
    /// of 'links config show' output; the file is created only by
    /// 'config set')
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover and check links
    Inspect {
        /// host address
        #[arg(long)]
        host: String,

        /// start path
        #[arg(long, default_value = "/")]
        path: String,

        /// do not output links checks returning 200 status code
        #[arg(long)]
        skipok: bool,

        /// output format. Possible values are: stdout (default), html, csv
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Configure links tool
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show links tool version
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show configuration
    Show {
        /// output type. Possible values are: yaml (default), json
        #[arg(short, long, default_value = "yaml")]
        out: String,
    },

    /// Set configuration parameter
    Set { key: String, value: String },
}
