//! Blinky Core Library
//!
//! This crate provides the storage core for Blinky, a link organizer that
//! groups bookmarks into sections.
//!
//! # Architecture
//!
//! - **Local store**: the collection as one JSON payload on this device
//! - **Remote store**: one record per section, scoped to the signed-in user
//!
//! `SectionStore` serves every read and write from whichever backend is
//! active. Signing in merges the local collection into the user's remote
//! collection (last write wins per section) before switching over.
//!
//! # Quick Start
//!
//! ```text
//! let store = SectionStore::open(&Config::load()?)?;
//!
//! let mut sections = store.get_sections().await?;
//! let mut work = Section::new("Work");
//! work.add_link(Link::new("https://example.com", "Example"));
//! sections.push(work);
//! store.set_sections(sections).await?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified storage facade and sign-in lifecycle (main entry point)
//! - `auth`: Authentication state feed
//! - `merge`: Last-write-wins reconciliation
//! - `models`: Sections and links
//! - `storage`: Local and remote backends
//! - `config`: Application configuration

pub mod auth;
pub mod config;
pub mod error;
pub mod id;
pub mod merge;
pub mod models;
pub mod storage;
pub mod store;

pub use auth::{spawn_auth_listener, AuthState};
pub use config::Config;
pub use error::{StoreError, StoreResult};
pub use merge::merge;
pub use models::{Link, Section};
pub use storage::{LocalStore, RemoteStore, SectionBackend, StorageError};
pub use store::{SectionStore, StoreEvent, StoreMode, TransitionOutcome};
