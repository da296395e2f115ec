//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resolve cloud-storage share links into direct download URLs or file
/// listings.
#[derive(Parser, Debug)]
#[command(name = "panlink")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a JSON config file (timeouts, credentials, proxy)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a share link to a direct download URL
    Resolve {
        /// The share URL (e.g. https://www.ilanzou.com/s/abc123)
        url: String,

        /// Share password, if the link is protected
        #[arg(short, long, default_value = "")]
        password: String,

        /// One-shot login name for providers with an authenticated mode
        #[arg(long)]
        username: Option<String>,

        /// One-shot login password (paired with --username)
        #[arg(long)]
        auth_password: Option<String>,
    },

    /// Expand a share into its full file listing
    List {
        /// The share URL
        url: String,

        /// Share password, if the link is protected
        #[arg(short, long, default_value = "")]
        password: String,
    },

    /// Clear a provider's cached credentials and re-enable authentication
    ResetAuth {
        /// Provider id (e.g. ilanzou, feijipan, weiyun)
        provider: String,
    },
}
