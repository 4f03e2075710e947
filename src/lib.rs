#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

use clap::Subcommand;

pub mod config;
pub mod events;
pub mod gateway;
pub mod mention;
pub mod observability;
pub mod pipeline;
pub mod relay;
pub mod responder;
pub mod store;
pub mod teamwork;

pub use config::Config;

/// Stored event commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum EventCommands {
    /// List the most recently received events
    List {
        /// Maximum number of events to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one stored event, including its raw payload
    Show {
        /// Event kind (message_created, message_reply, comment_created, task_created, file_uploaded)
        kind: String,
        /// Teamwork id of the object
        source_event_id: i64,
    },
}

/// Configuration commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the JSON schema of config.toml
    Schema,
    /// Print the effective configuration (secrets redacted)
    Show,
}
