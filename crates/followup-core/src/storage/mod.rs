mod config;
pub mod database;
pub mod migrations;
mod json_path;
mod reminders;
mod event_log;
mod preferences;
mod bundles;
mod popups;
mod rules;
mod snooze;
mod affirmations;

pub use config::{Config, EngineConfig, LoggingConfig, PopupConfig};
pub use database::Database;
pub use event_log::EventQuery;
pub use preferences::PreferenceStore;
pub use rules::RuleFiringStats;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory.
///
/// `FOLLOWUP_DATA_DIR` wins when set; otherwise `~/.config/followup[-dev]/`
/// based on `FOLLOWUP_ENV` (set `FOLLOWUP_ENV=dev` for the development
/// directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("FOLLOWUP_DATA_DIR") {
        Some(custom) => PathBuf::from(custom),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOLLOWUP_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("followup-dev")
            } else {
                base_dir.join("followup")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
