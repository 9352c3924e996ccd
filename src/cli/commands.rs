use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tracksync")]
#[command(version, about = "Local-first project tracker sync engine")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (YAML); defaults are used for missing keys
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the snapshot and keep it in sync until interrupted
    Run {
        /// Folder replicated by a cloud drive, holding the shared snapshot
        #[arg(long, value_name = "DIR")]
        cloud_dir: Option<PathBuf>,
    },

    /// Show per-project progress of the local snapshot
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
