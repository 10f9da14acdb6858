//! Command handlers.
//!
//! Handlers are thin: they turn CLI arguments into calls on the media and
//! session crates and format the result for the terminal.

pub mod crop;
pub mod replay;
pub mod settings;
