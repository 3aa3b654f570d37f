//! Link command handlers

use anyhow::{bail, Context, Result};

use blinky_core::{Link, SectionStore};

use super::find_section;
use crate::output::Output;

/// Add a link to a section
pub async fn add(
    store: &SectionStore,
    section: String,
    url: String,
    name: Option<String>,
    output: &Output,
) -> Result<()> {
    let link = Link::parse(&url, name.as_deref()).context("Invalid link")?;

    let mut sections = store.get_sections().await?;
    let pos = find_section(&sections, &section)?;
    sections[pos].add_link(link.clone());
    let title = sections[pos].title.clone();

    store
        .set_sections(sections)
        .await
        .context("Failed to save sections")?;

    output.success(&format!("Added {} to {}", link.url, title));
    Ok(())
}

/// Remove the link at `index` from a section
pub async fn remove(
    store: &SectionStore,
    section: String,
    index: usize,
    output: &Output,
) -> Result<()> {
    let mut sections = store.get_sections().await?;
    let pos = find_section(&sections, &section)?;

    let Some(link) = sections[pos].remove_link(index) else {
        bail!(
            "No link at index {} in '{}' (see `blinky section show`)",
            index,
            sections[pos].title
        );
    };

    store
        .set_sections(sections)
        .await
        .context("Failed to save sections")?;

    output.success(&format!("Removed {}", link.url));
    Ok(())
}

/// Rename the link at `index` in a section
pub async fn rename(
    store: &SectionStore,
    section: String,
    index: usize,
    name: String,
    output: &Output,
) -> Result<()> {
    let mut sections = store.get_sections().await?;
    let pos = find_section(&sections, &section)?;

    if !sections[pos].rename_link(index, name.clone()) {
        bail!(
            "No link at index {} in '{}' (see `blinky section show`)",
            index,
            sections[pos].title
        );
    }

    store
        .set_sections(sections)
        .await
        .context("Failed to save sections")?;

    output.success(&format!("Renamed link {} to {}", index, name));
    Ok(())
}
