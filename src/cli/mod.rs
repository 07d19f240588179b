//! Command-line interface, parsed with clap.

mod commands;

use clap::{Parser, Subcommand};

/// Eventdesk - session-authenticated event management
#[derive(Parser)]
#[command(name = "eventdesk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web server and the background status sweep
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,

    /// Create a default config.toml in the working directory
    #[command(alias = "--init")]
    Init,

    /// Give an existing user the admin role
    GrantAdmin {
        /// Username of the account to promote
        username: String,
    },

    /// Run one publish/expire pass and exit
    Sweep,
}

pub use commands::*;
