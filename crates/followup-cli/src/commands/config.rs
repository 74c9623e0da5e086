use clap::Subcommand;
use followup_core::storage::data_dir;
use followup_core::Config;

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value (e.g. "engine.default_timezone")
    Get {
        /// Dot-separated key
        key: String,
    },
    /// Change one value and write the file
    Set {
        /// Dot-separated key
        key: String,
        /// New value, parsed to the key's type
        value: String,
    },
    /// Print the whole config as JSON
    List,
    /// Print where config.toml and the database live
    Path,
    /// Overwrite config.toml with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CliResult {
    if let ConfigAction::Reset = action {
        Config::default().save()?;
        println!("config reset to defaults");
        return Ok(());
    }
    if let ConfigAction::Path = action {
        println!("{}", data_dir()?.display());
        return Ok(());
    }

    let mut config = Config::load()?;
    match action {
        ConfigAction::Get { key } => {
            let value = config
                .get(&key)
                .ok_or_else(|| format!("unknown key: {key}"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            tracing::info!(key = %key, "config updated");
            println!("ok");
        }
        ConfigAction::List => print_json(&config)?,
        ConfigAction::Path | ConfigAction::Reset => {}
    }
    Ok(())
}
