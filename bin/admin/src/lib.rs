//! obsidian-log administration CLI.
//!
//! Signs an administrator in through Supabase, reports the resolved auth
//! state, and publishes the site configuration to the content repository.

pub mod app;
pub mod config;
pub mod error;

pub use app::{App, ConfigChanges, print_json};
pub use config::{AdminConfig, GitHubConfig, Mode};
pub use error::CliError;
