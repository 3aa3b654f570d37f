//! Per-user cloud section store
//!
//! Each section is one record in the user's scope, keyed by section id and
//! tagged with an `owner` field. `set` commits the whole collection as one
//! batch: every incoming section is upserted and every stored record whose
//! id is absent from the input is deleted, so after a successful commit the
//! stored ids equal the input ids exactly.
//!
//! No retries happen here; failures go straight back to the caller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::documents::{DocumentStore, WriteBatch};
use super::error::StorageResult;
use super::SectionBackend;
use crate::id::generate_id;
use crate::models::{now_millis, Section};

/// Field stamped on every record with the owning user id
pub const OWNER_FIELD: &str = "owner";

/// Section collection stored remotely for one user
#[derive(Clone)]
pub struct RemoteStore {
    user_id: String,
    documents: Arc<dyn DocumentStore>,
}

impl RemoteStore {
    /// Bind a remote store to `user_id`
    pub fn new(user_id: impl Into<String>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            user_id: user_id.into(),
            documents,
        }
    }

    /// The user this store is scoped to
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn stored_ids(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .documents
            .list(&self.user_id)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    fn to_record(&self, section: &Section) -> StorageResult<Value> {
        let mut record = serde_json::to_value(section)?;
        if let Value::Object(ref mut map) = record {
            map.insert(OWNER_FIELD.to_string(), Value::String(self.user_id.clone()));
        }
        Ok(record)
    }
}

#[async_trait]
impl SectionBackend for RemoteStore {
    async fn get(&self) -> StorageResult<Vec<Section>> {
        let docs = self.documents.list(&self.user_id).await?;

        let mut sections: Vec<Section> = Vec::with_capacity(docs.len());
        let mut index: HashMap<String, (usize, bool)> = HashMap::new();
        for (doc_id, mut record) in docs {
            // The record key is authoritative when the body has no id
            if let Value::Object(ref mut map) = record {
                map.entry("id")
                    .or_insert_with(|| Value::String(doc_id.clone()));
            }
            let section: Section = serde_json::from_value(record)?;
            let Some(id) = section.id.clone() else {
                continue;
            };
            let keyed = id == doc_id;

            // Several records carrying one id: newest wins, then the one
            // stored under its own id
            match index.get(&id).copied() {
                Some((pos, existing_keyed)) => {
                    debug!("Record {} duplicates section {}", doc_id, id);
                    let existing = &sections[pos];
                    if section.timestamp() > existing.timestamp()
                        || (section.timestamp() == existing.timestamp() && keyed && !existing_keyed)
                    {
                        sections[pos] = section;
                        index.insert(id, (pos, keyed));
                    }
                }
                None => {
                    index.insert(id, (sections.len(), keyed));
                    sections.push(section);
                }
            }
        }
        Ok(sections)
    }

    async fn set(&self, sections: &[Section]) -> StorageResult<()> {
        let existing = self.stored_ids().await?;

        let mut batch = WriteBatch::new();
        let mut incoming = HashSet::new();
        for section in sections {
            let mut section = section.clone();
            let id = section.id.get_or_insert_with(generate_id).clone();
            section.last_updated.get_or_insert_with(now_millis);
            for link in &mut section.links {
                link.id
                    .get_or_insert_with(|| Uuid::new_v4().simple().to_string());
            }

            batch.upsert(id.clone(), self.to_record(&section)?);
            incoming.insert(id);
        }

        let mut removed = 0;
        for id in existing {
            if !incoming.contains(&id) {
                batch.delete(id);
                removed += 1;
            }
        }

        debug!(
            "Committing {} section(s), removing {} for user {}",
            incoming.len(),
            removed,
            self.user_id
        );
        self.documents.commit(&self.user_id, batch).await
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        for id in self.stored_ids().await? {
            batch.delete(id);
        }
        self.documents.commit(&self.user_id, batch).await
    }
}
