//! Storage layer
//!
//! Two interchangeable backends hold the section collection:
//!
//! - **Local**: one JSON blob in a device-local key-value medium
//! - **Remote**: one record per section in a per-user document store
//!
//! Both implement `SectionBackend`; the `SectionStore` facade decides which
//! one is active.

pub mod documents;
pub mod error;
pub mod local;
pub mod persistence;
pub mod remote;
pub mod schema;

use async_trait::async_trait;

use crate::models::Section;

pub use documents::{DocumentStore, SqliteDocumentStore, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use local::LocalStore;
pub use persistence::{FileMedium, KeyValueMedium, MemoryMedium};
pub use remote::RemoteStore;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};

/// A persistence backend for the whole section collection
#[async_trait]
pub trait SectionBackend: Send + Sync {
    /// Read the stored collection
    async fn get(&self) -> StorageResult<Vec<Section>>;

    /// Replace the stored collection with `sections`
    async fn set(&self, sections: &[Section]) -> StorageResult<()>;

    /// Remove the stored collection
    async fn clear(&self) -> StorageResult<()>;
}
