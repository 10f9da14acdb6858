//! Command-line driver for the GLAIR media core.
//!
//! - `glair crop` captures a framed, optionally mirrored JPEG from an image.
//! - `glair replay` runs a realtime session against a scripted remote.
//! - `glair settings` shows and edits the settings file.

#![deny(unsafe_code)]

pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;

pub use commands::{Commands, CropArgs, ReplayArgs, SettingsCommand, SettingsSetArgs};
pub use error::CliError;
pub use parser::Cli;
