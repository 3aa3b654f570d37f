//! Last-write-wins reconciliation of two section collections
//!
//! Sections are matched by id. When both sides hold a section, the one with
//! the strictly greater `last_updated` is kept; ties keep the local copy.
//! A missing timestamp counts as 0.
//!
//! Resolution is per section, not per field. If the local copy has newer link
//! edits and the remote copy has a newer title, the whole local copy wins and
//! the remote title is lost.

use std::collections::HashMap;

use tracing::warn;

use crate::models::Section;

/// Merge `local` and `remote` into one collection
///
/// Output order is deterministic: local sections in their original order,
/// followed by remote-only sections in theirs. Sections without an id are
/// skipped.
pub fn merge(local: &[Section], remote: &[Section]) -> Vec<Section> {
    let mut merged: Vec<Section> = Vec::with_capacity(local.len() + remote.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for section in local.iter().chain(remote) {
        let Some(id) = section.id() else {
            warn!("Skipping section without id during merge: {:?}", section.title);
            continue;
        };

        match index.get(id).copied() {
            Some(pos) => {
                if section.timestamp() > merged[pos].timestamp() {
                    merged[pos] = section.clone();
                }
            }
            None => {
                index.insert(id.to_string(), merged.len());
                merged.push(section.clone());
            }
        }
    }

    merged
}
