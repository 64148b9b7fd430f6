//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the torrent downloader
#[derive(Debug, Parser)]
#[command(name = "torrent-fetch")]
#[command(about = "Download a single-file torrent from its tracker's swarm", long_about = None)]
pub struct CliArgs {
    /// Path to the .torrent file
    #[arg(value_name = "TORRENT_FILE")]
    pub torrent_file: PathBuf,

    /// Download directory
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Port reported to the tracker
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of concurrent peer connections
    #[arg(short, long)]
    pub max_connections: Option<usize>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the decoded torrent file and exit
    #[arg(long)]
    pub dump: bool,

    /// Verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Default filter directive based on verbosity settings
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "torrent_fetch=debug,info"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}
