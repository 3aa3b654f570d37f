//! Section command handlers

use anyhow::{bail, Context, Result};

use blinky_core::models::section_slug;
use blinky_core::{Section, SectionStore};

use super::find_section;
use crate::output::Output;

/// List all sections
pub async fn list(store: &SectionStore, output: &Output) -> Result<()> {
    let sections = store.get_sections().await?;
    output.print_sections(&sections)
}

/// Show one section with its links
pub async fn show(store: &SectionStore, key: String, output: &Output) -> Result<()> {
    let sections = store.get_sections().await?;
    let pos = find_section(&sections, &key)?;
    output.print_section(&sections[pos])
}

/// Create a new section
///
/// With `slug` set the id is derived from the title instead of generated.
pub async fn add(store: &SectionStore, title: String, slug: bool, output: &Output) -> Result<()> {
    let title = title.trim().to_string();
    if title.is_empty() {
        bail!("Section title cannot be empty");
    }

    let mut sections = store.get_sections().await?;
    let section = if slug {
        let id = section_slug(&title);
        if sections.iter().any(|s| s.id() == Some(id.as_str())) {
            bail!("A section with id '{}' already exists", id);
        }
        Section::with_id(id, title)
    } else {
        Section::new(title)
    };

    sections.push(section);
    let written = store
        .set_sections(sections)
        .await
        .context("Failed to save sections")?;

    if let Some(section) = written.last() {
        output.success(&format!("Created section: {}", section.title));
        output.print_section(section)?;
    }
    Ok(())
}

/// Rename a section
pub async fn rename(
    store: &SectionStore,
    key: String,
    title: String,
    output: &Output,
) -> Result<()> {
    let title = title.trim().to_string();
    if title.is_empty() {
        bail!("Section title cannot be empty");
    }

    let mut sections = store.get_sections().await?;
    let pos = find_section(&sections, &key)?;
    let old = std::mem::take(&mut sections[pos].title);
    sections[pos].rename(title.clone());

    store
        .set_sections(sections)
        .await
        .context("Failed to save sections")?;

    output.success(&format!("Renamed section: {} -> {}", old, title));
    Ok(())
}

/// Delete a section and its links
pub async fn delete(store: &SectionStore, key: String, output: &Output) -> Result<()> {
    let mut sections = store.get_sections().await?;
    let pos = find_section(&sections, &key)?;
    let removed = sections.remove(pos);

    store
        .set_sections(sections)
        .await
        .context("Failed to save sections")?;

    output.success(&format!(
        "Deleted section: {} ({} link(s))",
        removed.title,
        removed.links.len()
    ));
    Ok(())
}
