//! Command-line interface definition for Docent
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for the relay server, the interactive chat client,
//! and thread inspection.

use clap::{Parser, Subcommand};

/// Docent - document-assistant chat relay and client
///
/// Run the streaming relay server with `serve`, talk to it with `chat`,
/// and inspect persisted conversation threads with `threads`.
#[derive(Parser, Debug, Clone)]
#[command(name = "docent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the thread snapshot database path
    #[arg(long, env = "DOCENT_STORE_PATH")]
    pub store_path: Option<String>,

    /// Override the relay base URL used by the chat client
    #[arg(long, env = "DOCENT_RELAY_URL")]
    pub relay_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Docent
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the streaming relay server
    Serve {
        /// Override the bind address from config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Start the interactive chat client
    Chat {
        /// Send one message non-interactively and exit
        #[arg(long)]
        message: Option<String>,
    },

    /// List persisted conversation threads
    Threads {
        /// Emit machine-readable JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            store_path: None,
            relay_url: None,
            command: Commands::Chat { message: None },
        }
    }
}
