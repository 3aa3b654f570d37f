//! Per-user document store
//!
//! The cloud side of Blinky is a collection of JSON records scoped by user
//! (`users/{uid}/sections/{id}`). `DocumentStore` is the narrow interface
//! the remote store needs from it: list everything in a scope, and apply a
//! batch of upserts and deletes all-or-nothing.
//!
//! `SqliteDocumentStore` is the bundled implementation. Each batch runs in a
//! single SQLite transaction.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::error::{StorageError, StorageResult};
use super::schema::{init_schema, needs_init};
use crate::models::now_millis;

/// One operation inside a `WriteBatch`
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace a record
    ///
    /// With `merge` set, top-level fields of `record` are laid over the
    /// stored record instead of replacing it wholesale.
    Upsert {
        id: String,
        record: Value,
        merge: bool,
    },
    /// Delete a record; deleting a missing record is not an error
    Delete { id: String },
}

/// A set of writes committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a merging upsert
    pub fn upsert(&mut self, id: impl Into<String>, record: Value) -> &mut Self {
        self.ops.push(WriteOp::Upsert {
            id: id.into(),
            record,
            merge: true,
        });
        self
    }

    /// Queue a replacing upsert
    pub fn replace(&mut self, id: impl Into<String>, record: Value) -> &mut Self {
        self.ops.push(WriteOp::Upsert {
            id: id.into(),
            record,
            merge: false,
        });
        self
    }

    /// Queue a delete
    pub fn delete(&mut self, id: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { id: id.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Remote multi-record persistence scoped by user
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every record under `user_id`, ordered by record id
    async fn list(&self, user_id: &str) -> StorageResult<Vec<(String, Value)>>;

    /// Apply `batch` under `user_id`; either every op lands or none does
    async fn commit(&self, user_id: &str, batch: WriteBatch) -> StorageResult<()>;
}

/// SQLite-backed document store
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run blocking SQLite work off the async executor
    async fn run<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list(&self, user_id: &str) -> StorageResult<Vec<(String, Value)>> {
        check_user(user_id)?;
        let user_id = user_id.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT doc_id, body FROM documents WHERE user_id = ?1 ORDER BY doc_id",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut out: Vec<(String, Value)> = Vec::new();
            for row in rows {
                let (doc_id, body) = row?;
                out.push((doc_id, serde_json::from_str(&body)?));
            }
            Ok(out)
        })
        .await
    }

    async fn commit(&self, user_id: &str, batch: WriteBatch) -> StorageResult<()> {
        check_user(user_id)?;
        if batch.is_empty() {
            return Ok(());
        }
        let user_id = user_id.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let now = now_millis();

            for op in batch.into_ops() {
                match op {
                    WriteOp::Upsert { id, record, merge } => {
                        if !record.is_object() {
                            return Err(StorageError::WriteRejected {
                                key: id,
                                reason: "record must be a JSON object".to_string(),
                            });
                        }

                        let body = if merge {
                            let existing: Option<String> = tx
                                .query_row(
                                    "SELECT body FROM documents WHERE user_id = ?1 AND doc_id = ?2",
                                    params![user_id, id],
                                    |row| row.get(0),
                                )
                                .optional()?;
                            match existing {
                                Some(existing) => {
                                    merge_fields(serde_json::from_str(&existing)?, record)
                                }
                                None => record,
                            }
                        } else {
                            record
                        };

                        tx.execute(
                            "INSERT INTO documents (user_id, doc_id, body, updated_at)
                             VALUES (?1, ?2, ?3, ?4)
                             ON CONFLICT(user_id, doc_id)
                             DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                            params![user_id, id, serde_json::to_string(&body)?, now],
                        )?;
                    }
                    WriteOp::Delete { id } => {
                        tx.execute(
                            "DELETE FROM documents WHERE user_id = ?1 AND doc_id = ?2",
                            params![user_id, id],
                        )?;
                    }
                }
            }

            // Dropping an uncommitted transaction rolls it back
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

fn check_user(user_id: &str) -> StorageResult<()> {
    if user_id.trim().is_empty() {
        return Err(StorageError::Unauthorized {
            user_id: user_id.to_string(),
            reason: "no user identifier".to_string(),
        });
    }
    Ok(())
}

/// Lay the top-level fields of `incoming` over `existing`
fn merge_fields(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Object(mut base), Value::Object(patch)) => {
            base.extend(patch);
            Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}
