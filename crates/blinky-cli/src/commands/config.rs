//! Config command handlers

use anyhow::{bail, Context, Result};

use blinky_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "remote_db": config.remote_db_path(),
                    "user_id": config.user_id,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:  {}", config.data_dir.display());
            println!("  remote_db: {}", config.remote_db_path().display());
            println!(
                "  user_id:   {}",
                config.user_id.as_deref().unwrap_or("(signed out)")
            );
            println!(
                "  log_file:  {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    apply(&mut config, &key, &value)?;
    config.save().context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let unset = value.is_empty() || value == "none";

    match key {
        "data_dir" => {
            if unset {
                bail!("data_dir cannot be unset");
            }
            config.data_dir = value.into();
        }
        "remote_db" => {
            config.remote_db = if unset { None } else { Some(value.into()) };
        }
        "log_file" => {
            config.log_file = if unset { None } else { Some(value.into()) };
        }
        "user_id" => {
            bail!("Use `blinky auth sign-in <user>` or `blinky auth sign-out` to change the user");
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, remote_db, log_file",
                key
            );
        }
    }
    Ok(())
}
