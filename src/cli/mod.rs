//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, AvatarQuery, Command, ConfigAction, GenerateArgs};
pub use commands::{config_path, run, App, CliError};
