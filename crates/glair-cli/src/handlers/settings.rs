//! `glair settings`: show and edit the settings file.

use std::path::Path;

use anyhow::Result;
use glair_media::{LiveSettings, SettingsUpdate, validate_settings};

use crate::commands::SettingsCommand;
use crate::error::CliError;

/// Load the effective settings.
///
/// A missing file means defaults; a present but invalid one is an error.
pub fn load(config: Option<&Path>) -> Result<LiveSettings, CliError> {
    match config {
        Some(path) if path.exists() => {
            LiveSettings::load(path).map_err(|e| CliError::Config(e.to_string()))
        }
        Some(path) => {
            tracing::debug!(path = %path.display(), "Settings file not found, using defaults");
            Ok(LiveSettings::default())
        }
        None => Ok(LiveSettings::default()),
    }
}

/// Execute the settings command.
pub fn execute(config: Option<&Path>, command: Option<SettingsCommand>) -> Result<()> {
    match command.unwrap_or(SettingsCommand::Show) {
        SettingsCommand::Show => {
            let settings = load(config)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        SettingsCommand::Set(args) => {
            if args.is_empty() {
                println!("No settings provided. Use --help to see available options.");
                return Ok(());
            }
            let path = require_config(config)?;

            let mut settings = load(Some(path))?;
            settings.merge(&SettingsUpdate::from(args));
            validate_settings(&settings).map_err(CliError::from)?;
            settings
                .save(path)
                .map_err(|e| CliError::Io(e.to_string()))?;

            println!("✓ Settings saved to {}", path.display());
            Ok(())
        }
        SettingsCommand::Reset => {
            let path = require_config(config)?;
            LiveSettings::default()
                .save(path)
                .map_err(|e| CliError::Io(e.to_string()))?;
            println!("✓ Settings reset to defaults in {}", path.display());
            Ok(())
        }
    }
}

fn require_config(config: Option<&Path>) -> Result<&Path, CliError> {
    config.ok_or_else(|| CliError::Arguments("--config <file> is required to change settings".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::SettingsSetArgs;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load(Some(&dir.path().join("none.json"))).unwrap();
        assert_eq!(settings, LiveSettings::default());
    }

    #[test]
    fn set_merges_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glair.json");

        let args = SettingsSetArgs {
            voice_name: Some("Puck".into()),
            tool_delay_ms: Some(250),
            ..Default::default()
        };
        execute(Some(&path), Some(SettingsCommand::Set(args))).unwrap();

        let saved = load(Some(&path)).unwrap();
        assert_eq!(saved.voice_name, "Puck");
        assert_eq!(saved.tool_delay_ms, 250);
        assert_eq!(saved.model, LiveSettings::default().model);
    }

    #[test]
    fn invalid_update_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glair.json");
        let args = SettingsSetArgs {
            frame_interval_ms: Some(10),
            ..Default::default()
        };
        let err = execute(Some(&path), Some(SettingsCommand::Set(args))).unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Config(_))));
        assert!(!path.exists());
    }

    #[test]
    fn set_requires_config_path() {
        let args = SettingsSetArgs {
            model: Some("m".into()),
            ..Default::default()
        };
        let err = execute(None, Some(SettingsCommand::Set(args))).unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Arguments(_))));
    }
}
