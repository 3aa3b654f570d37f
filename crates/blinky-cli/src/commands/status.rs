//! Status command handler

use anyhow::Result;

use blinky_core::{Config, SectionStore, StoreMode};

use crate::output::{format_timestamp, Output, OutputFormat};

/// Show status information
pub async fn show(store: &SectionStore, config: &Config, output: &Output) -> Result<()> {
    let mode = store.mode().await;
    let sections = store.get_sections().await?;
    let link_count: usize = sections.iter().map(|s| s.links.len()).sum();
    let last_updated = sections.iter().filter_map(|s| s.last_updated).max();
    let backups = store.local().backups()?;

    let (mode_name, user_id) = match &mode {
        StoreMode::Local => ("local", None),
        StoreMode::Cloud { user_id } => ("cloud", Some(user_id.as_str())),
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "mode": mode_name,
                    "user_id": user_id,
                    "counts": {
                        "sections": sections.len(),
                        "links": link_count
                    },
                    "last_updated": last_updated,
                    "storage": {
                        "data_dir": config.data_dir,
                        "remote_db": config.remote_db_path(),
                        "backups": backups
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", mode_name);
        }
        OutputFormat::Human => {
            println!("Blinky Status");
            println!("=============");
            println!();
            println!("Storage mode: {}", mode_name);
            if let Some(user_id) = user_id {
                println!("Signed in as: {}", user_id);
            }
            println!();
            println!("Contents:");
            println!("  Sections: {}", sections.len());
            println!("  Links:    {}", link_count);
            println!("  Updated:  {}", format_timestamp(last_updated));
            println!();
            println!("Storage:");
            println!("  Local:   {}", config.data_dir.display());
            println!("  Cloud:   {}", config.remote_db_path().display());
            println!("  Backups: {}", backups.len());
        }
    }

    Ok(())
}
