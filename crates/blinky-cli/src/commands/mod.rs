//! Command handlers

pub mod auth;
pub mod config;
pub mod link;
pub mod section;
pub mod status;

use anyhow::{bail, Result};

use blinky_core::Section;

/// Resolve a section by id, title, or unique id prefix
///
/// Returns the section's position in `sections`.
pub fn find_section(sections: &[Section], key: &str) -> Result<usize> {
    if let Some(pos) = sections.iter().position(|s| s.id() == Some(key)) {
        return Ok(pos);
    }

    let by_title: Vec<usize> = matching(sections, |s| s.title.eq_ignore_ascii_case(key));
    if by_title.len() == 1 {
        return Ok(by_title[0]);
    }

    let by_prefix: Vec<usize> =
        matching(sections, |s| s.id().is_some_and(|id| id.starts_with(key)));
    match by_prefix.len() {
        1 => Ok(by_prefix[0]),
        0 if by_title.is_empty() => bail!("Section not found: {}", key),
        _ => bail!(
            "'{}' matches more than one section; use the full id (see `blinky section list`)",
            key
        ),
    }
}

fn matching(sections: &[Section], pred: impl Fn(&Section) -> bool) -> Vec<usize> {
    sections
        .iter()
        .enumerate()
        .filter(|(_, s)| pred(s))
        .map(|(i, _)| i)
        .collect()
}
