//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "chatter", version, about = "Two-peer chat over a single TCP connection")]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Player name shown to the other side
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Shared password; empty means no password
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Mode {
    /// Host a chat and wait for one peer
    Host,
    /// Join a hosted chat
    Join {
        /// Host address
        ip: String,
        /// Host port
        port: String,
    },
}

impl Cli {
    /// Command-line values take precedence over the config file
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(name) = &self.name {
            config.player.name = name.clone();
        }
        if let Some(password) = &self.password {
            config.player.password = password.clone();
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
    }
}
