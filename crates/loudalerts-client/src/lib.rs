//! CLI, configuration file, file event source
//!
//! This crate provides the `loudalerts` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod source;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use source::FileEventSource;
