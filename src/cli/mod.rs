//! CLI argument parsing and command routing

use clap::{Parser, Subcommand};

use crate::config::Overrides;

/// Ditto: talk to your companion from the terminal
#[derive(Debug, Parser)]
#[command(name = "ditto")]
#[command(about = "Streaming chat client for Ditto", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Backend root URL
    #[arg(long, global = true, env = "DITTO_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer token
    #[arg(long, global = true, env = "DITTO_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// User the token belongs to
    #[arg(long, global = true, env = "DITTO_USER_ID")]
    pub user_id: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send a message and stream the answer
    Chat {
        /// Message text
        text: String,

        /// Attach an image by URL (repeatable)
        #[arg(long = "image", value_name = "URL")]
        images: Vec<String>,

        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,

        /// Search older memories for this turn
        #[arg(long)]
        deep_search: bool,
    },

    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show recent prompt/answer pairs
    Conversations {
        /// Number of pairs to fetch
        #[arg(long, default_value_t = 10)]
        limit: u32,

        /// Continue from a previous page
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SessionAction {
    /// List sessions
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Show one session
    Get { id: String },
    /// Change a session's title
    Rename { id: String, title: String },
    /// Delete a session
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Store the bearer token and user id
    SetToken { token: String, user_id: String },
    /// Store the backend URL
    SetBaseUrl { url: String },
}

impl Cli {
    /// Parse CLI arguments from environment
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Configuration values given on the command line
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            user_id: self.user_id.clone(),
        }
    }
}
