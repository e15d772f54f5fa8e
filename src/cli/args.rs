//! CLI argument definitions using clap
//!
//! Commands:
//! - herdsman start|stop|reload|restart|rebuild <ids>...
//! - herdsman promote|demote|register <id>
//! - herdsman remaster <id> --master <id>
//! - herdsman failover --herd <id> --to <id>
//! - herdsman status --herd <id>
//! - herdsman run <action> <id>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// herdsman - replication orchestrator for PostgreSQL herds
#[derive(Parser, Debug)]
#[command(name = "herdsman")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./herdsman.json")]
    pub config: PathBuf,

    /// Record the commands that would run instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start instances
    Start {
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Stop instances
    Stop {
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Reload instance configuration
    Reload {
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Stop, then start instances
    Restart {
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Resynchronize replicas from their primaries
    Rebuild {
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Promote a replica to primary
    Promote { id: u64 },

    /// Demote a primary and rebuild it under the herd's other primary
    Demote { id: u64 },

    /// Point a replica at a different primary
    Remaster {
        id: u64,
        /// New upstream primary
        #[arg(long)]
        master: u64,
    },

    /// Fail a herd over to one of its replicas
    Failover {
        #[arg(long)]
        herd: u64,
        /// Replica that becomes the new primary
        #[arg(long)]
        to: u64,
    },

    /// Query a newly recorded instance and attach it to its herd
    Register { id: u64 },

    /// Show herd consistency and DR pair lag
    Status {
        #[arg(long)]
        herd: u64,
    },

    /// Run any configured template action on one instance
    Run { action: String, id: u64 },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
