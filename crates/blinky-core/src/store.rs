//! Unified section store
//!
//! `SectionStore` is what collaborators talk to. It serves every call from
//! exactly one backend at a time:
//!
//! - **Local** (initial): the device-local store
//! - **Cloud**: a remote store bound to the signed-in user
//!
//! ## Sign-in
//!
//! 1. Read the local collection and the user's remote collection
//! 2. Snapshot the local collection to a timestamped backup key
//! 3. Merge both with last-write-wins
//! 4. Commit the merged result to the remote store (removes stale records)
//! 5. Mirror the merged result locally as a warm cache
//! 6. Switch to Cloud and emit `StoreEvent::Changed`
//!
//! If steps 1, 3 or 4 fail the store stays Local, no `Changed` event is
//! sent, and `StoreEvent::SyncFailed` reports the degraded state. Steps 2 and
//! 5 are best-effort.
//!
//! ## Sign-out
//!
//! Switches straight back to Local and emits `Changed`. Nothing is merged and
//! the cloud copy is left as last committed.
//!
//! ## Usage
//!
//! ```text
//! let store = SectionStore::open(&config)?;
//! let mut sections = store.get_sections().await?;
//! sections.push(Section::new("Reading"));
//! store.set_sections(sections).await?;
//!
//! store.handle_auth(AuthState::signed_in("uid-123")).await?;
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::auth::AuthState;
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::id::generate_id;
use crate::merge::merge;
use crate::models::{now_millis, Section};
use crate::storage::{
    DocumentStore, FileMedium, LocalStore, RemoteStore, SectionBackend, SqliteDocumentStore,
};

/// Capacity of the notification channel
const EVENT_CAPACITY: usize = 16;

/// Which backend is serving calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    /// Device-local storage, no user signed in
    Local,
    /// Remote storage for a signed-in user
    Cloud { user_id: String },
}

/// Notifications for collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The visible collection may have changed; re-read with `get_sections`
    Changed,
    /// Sign-in succeeded but the cloud merge did not; still serving local data
    SyncFailed { user_id: String, message: String },
}

/// Result of applying an auth state change
#[derive(Debug)]
pub enum TransitionOutcome {
    /// The active backend changed and `Changed` was emitted
    Switched,
    /// The requested user is already active; nothing happened
    AlreadyActive,
    /// Sign-in was not completed; the store is serving local data
    Degraded(StoreError),
}

#[derive(Clone)]
enum Active {
    Local,
    Cloud(RemoteStore),
}

/// Section storage facade and sign-in/sign-out lifecycle
pub struct SectionStore {
    local: LocalStore,
    documents: Arc<dyn DocumentStore>,
    active: RwLock<Active>,
    /// Held for the duration of a transition
    transition: Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
}

impl SectionStore {
    /// Create a store over explicit backends, starting in Local mode
    pub fn new(local: LocalStore, documents: Arc<dyn DocumentStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            local,
            documents,
            active: RwLock::new(Active::Local),
            transition: Mutex::new(()),
            events,
        }
    }

    /// Open the file-backed local store and the SQLite document store
    /// described by `config`
    pub fn open(config: &Config) -> StoreResult<Self> {
        let local = LocalStore::new(Arc::new(FileMedium::new(config.data_dir.clone())));
        let documents = SqliteDocumentStore::open(&config.remote_db_path())?;
        Ok(Self::new(local, Arc::new(documents)))
    }

    /// Subscribe to store notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// The device-local store (backups, manual recovery)
    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Current mode
    pub async fn mode(&self) -> StoreMode {
        match &*self.active.read().await {
            Active::Local => StoreMode::Local,
            Active::Cloud(remote) => StoreMode::Cloud {
                user_id: remote.user_id().to_string(),
            },
        }
    }

    // ==================== Collection Operations ====================

    /// Read the collection from the active backend
    pub async fn get_sections(&self) -> StoreResult<Vec<Section>> {
        let active = self.active.read().await;
        Ok(self.backend(&active).get().await?)
    }

    /// Write the collection to the active backend
    ///
    /// Sections without an id get a generated one; sections without a
    /// timestamp get the current time. Existing ids and timestamps are left
    /// alone, so callers must `touch` a section they modify. Returns the
    /// collection as written.
    pub async fn set_sections(&self, mut sections: Vec<Section>) -> StoreResult<Vec<Section>> {
        normalize(&mut sections);
        let active = self.active.read().await;
        self.backend(&active).set(&sections).await?;
        Ok(sections)
    }

    /// Clear the collection in the active backend
    pub async fn clear(&self) -> StoreResult<()> {
        let active = self.active.read().await;
        Ok(self.backend(&active).clear().await?)
    }

    fn backend<'a>(&'a self, active: &'a Active) -> &'a dyn SectionBackend {
        match active {
            Active::Local => &self.local,
            Active::Cloud(remote) => remote,
        }
    }

    // ==================== Lifecycle ====================

    /// Apply an authentication state change
    ///
    /// Only one transition runs at a time. A change arriving while another is
    /// in progress is rejected with `StoreError::TransitionInProgress`; use
    /// `spawn_auth_listener` to have changes queued instead.
    pub async fn handle_auth(&self, state: AuthState) -> StoreResult<TransitionOutcome> {
        let _guard = self
            .transition
            .try_lock()
            .map_err(|_| StoreError::TransitionInProgress)?;

        match state {
            AuthState::SignedIn { user_id } => Ok(self.sign_in(user_id).await),
            AuthState::SignedOut => Ok(self.sign_out().await),
        }
    }

    /// Switch to Cloud for a user whose sign-in was applied by an earlier
    /// process, without merging
    ///
    /// The local copy is only a mirror once a sign-in has completed; merging
    /// it again would bring back sections deleted in the cloud since.
    pub async fn resume(&self, user_id: impl Into<String>) -> StoreResult<()> {
        let _guard = self
            .transition
            .try_lock()
            .map_err(|_| StoreError::TransitionInProgress)?;

        let remote = RemoteStore::new(user_id, Arc::clone(&self.documents));
        debug!("Resuming cloud session for {}", remote.user_id());
        *self.active.write().await = Active::Cloud(remote);
        self.emit(StoreEvent::Changed);
        Ok(())
    }

    async fn sign_in(&self, user_id: String) -> TransitionOutcome {
        // Callers wait here rather than write to a backend that is about to
        // be replaced
        let mut active = self.active.write().await;

        if let Active::Cloud(remote) = &*active {
            if remote.user_id() == user_id {
                debug!("User {} already active, skipping merge", user_id);
                return TransitionOutcome::AlreadyActive;
            }
        }

        info!("Signing in as {}, merging local sections into cloud", user_id);
        let remote = RemoteStore::new(user_id.clone(), Arc::clone(&self.documents));

        match self.migrate(&remote).await {
            Ok(count) => {
                *active = Active::Cloud(remote);
                drop(active);
                info!("Store switched to cloud for {} ({} sections)", user_id, count);
                self.emit(StoreEvent::Changed);
                TransitionOutcome::Switched
            }
            Err(e) => {
                *active = Active::Local;
                drop(active);
                error!("Cloud sync failed for {}: {}", user_id, e);
                self.emit(StoreEvent::SyncFailed {
                    user_id,
                    message: e.to_string(),
                });
                TransitionOutcome::Degraded(e)
            }
        }
    }

    async fn sign_out(&self) -> TransitionOutcome {
        *self.active.write().await = Active::Local;
        info!("Store switched to local (signed out)");
        self.emit(StoreEvent::Changed);
        TransitionOutcome::Switched
    }

    /// Merge local data into `remote` and mirror the result locally
    async fn migrate(&self, remote: &RemoteStore) -> StoreResult<usize> {
        let local_sections = self.local.load()?;
        let remote_sections = remote.get().await?;
        debug!(
            "Merging {} local and {} remote section(s)",
            local_sections.len(),
            remote_sections.len()
        );

        if let Err(e) = self.local.backup(&local_sections) {
            warn!("Could not save local backup: {}", e);
        }

        // Ids only: a missing timestamp must still lose to any stamped copy
        let mut local_sections = local_sections;
        for section in &mut local_sections {
            section.id.get_or_insert_with(generate_id);
        }

        let merged = merge(&local_sections, &remote_sections);
        remote.set(&merged).await?;

        if let Err(e) = self.local.write(&merged) {
            warn!("Could not update local sections after merge: {}", e);
        }

        Ok(merged.len())
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Fill in missing ids and timestamps
fn normalize(sections: &mut [Section]) {
    let now = now_millis();
    for section in sections {
        section.id.get_or_insert_with(generate_id);
        section.last_updated.get_or_insert(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SECTIONS_KEY;
    use crate::models::Link;
    use crate::storage::{KeyValueMedium, MemoryMedium, StorageError, StorageResult, WriteBatch};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Document store with switchable failures
    struct FlakyDocuments {
        inner: SqliteDocumentStore,
        fail_list: AtomicBool,
        fail_commit: AtomicBool,
        commits: AtomicUsize,
    }

    impl FlakyDocuments {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: SqliteDocumentStore::open_in_memory().unwrap(),
                fail_list: AtomicBool::new(false),
                fail_commit: AtomicBool::new(false),
                commits: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyDocuments {
        async fn list(&self, user_id: &str) -> StorageResult<Vec<(String, Value)>> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("network unreachable".to_string()));
            }
            self.inner.list(user_id).await
        }

        async fn commit(&self, user_id: &str, batch: WriteBatch) -> StorageResult<()> {
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(StorageError::Unauthorized {
                    user_id: user_id.to_string(),
                    reason: "permission denied".to_string(),
                });
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner.commit(user_id, batch).await
        }
    }

    /// Document store whose first `list` blocks until released
    struct GatedDocuments {
        inner: SqliteDocumentStore,
        gated: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DocumentStore for GatedDocuments {
        async fn list(&self, user_id: &str) -> StorageResult<Vec<(String, Value)>> {
            if self.gated.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.list(user_id).await
        }

        async fn commit(&self, user_id: &str, batch: WriteBatch) -> StorageResult<()> {
            self.inner.commit(user_id, batch).await
        }
    }

    struct Harness {
        store: SectionStore,
        medium: Arc<MemoryMedium>,
        docs: Arc<FlakyDocuments>,
    }

    fn harness() -> Harness {
        let medium = Arc::new(MemoryMedium::new());
        let docs = FlakyDocuments::new();
        let store = SectionStore::new(LocalStore::new(medium.clone()), docs.clone());
        Harness {
            store,
            medium,
            docs,
        }
    }

    fn section(id: &str, title: &str, ts: i64) -> Section {
        let mut s = Section::with_id(id, title);
        s.last_updated = Some(ts);
        s
    }

    fn ids(sections: &[Section]) -> Vec<String> {
        sections.iter().filter_map(|s| s.id.clone()).collect()
    }

    async fn seed_remote(h: &Harness, user: &str, sections: &[Section]) {
        RemoteStore::new(user, h.docs.clone())
            .set(sections)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_starts_local() {
        let h = harness();
        assert_eq!(h.store.mode().await, StoreMode::Local);
        assert!(h.store.get_sections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_sections_normalizes() {
        let h = harness();

        let mut bare = Section::with_id("x", "Bare");
        bare.id = None;
        bare.last_updated = None;

        let written = h.store.set_sections(vec![bare]).await.unwrap();
        assert!(written[0].id().unwrap().starts_with("id_"));
        assert!(written[0].last_updated.is_some());

        let stored = h.store.get_sections().await.unwrap();
        assert_eq!(stored, written);
    }

    #[tokio::test]
    async fn test_normalization_is_idempotent() {
        let h = harness();

        let first = h
            .store
            .set_sections(vec![section("s1", "Work", 100)])
            .await
            .unwrap();
        let second = h.store.set_sections(first.clone()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second[0].id(), Some("s1"));
        assert_eq!(second[0].last_updated, Some(100));
    }

    #[tokio::test]
    async fn test_clear_local() {
        let h = harness();
        h.store
            .set_sections(vec![section("s1", "Work", 1)])
            .await
            .unwrap();
        h.store.clear().await.unwrap();
        assert!(h.store.get_sections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_merges_whole_sections() {
        let h = harness();

        h.store
            .set_sections(vec![section("s1", "Work", 200)])
            .await
            .unwrap();

        let mut old = section("s1", "Old", 100);
        old.links.push(Link::new("https://x.com", "x"));
        seed_remote(&h, "alice", &[old]).await;

        let outcome = h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Switched));
        assert_eq!(
            h.store.mode().await,
            StoreMode::Cloud {
                user_id: "alice".to_string()
            }
        );

        // Local copy wins as a whole, including its empty link list
        let sections = h.store.get_sections().await.unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Work");
        assert_eq!(sections[0].last_updated, Some(200));
        assert!(sections[0].links.is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_takes_union() {
        let h = harness();
        h.store
            .set_sections(vec![section("local", "Local", 10), section("both", "L", 50)])
            .await
            .unwrap();
        seed_remote(
            &h,
            "alice",
            &[section("both", "R", 60), section("cloud", "Cloud", 10)],
        )
        .await;

        h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();

        let sections = h.store.get_sections().await.unwrap();
        let mut got = ids(&sections);
        got.sort();
        assert_eq!(got, vec!["both", "cloud", "local"]);
        let both = sections.iter().find(|s| s.id() == Some("both")).unwrap();
        assert_eq!(both.title, "R");
    }

    #[tokio::test]
    async fn test_sign_in_removes_stale_remote_records() {
        let h = harness();
        h.store
            .set_sections(vec![section("s1", "Work", 100)])
            .await
            .unwrap();

        // A record stored under a key that no longer matches its section id
        let mut batch = WriteBatch::new();
        batch.upsert(
            "stale-key",
            json!({"id": "s1", "title": "Old", "links": [], "lastUpdated": 50}),
        );
        h.docs.commit("alice", batch).await.unwrap();

        h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();

        let keys: Vec<String> = h
            .docs
            .list("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["s1"]);
    }

    #[tokio::test]
    async fn test_sign_in_backs_up_and_mirrors_local() {
        let h = harness();
        h.store
            .set_sections(vec![section("s1", "Mine", 100)])
            .await
            .unwrap();
        seed_remote(&h, "alice", &[section("s2", "Theirs", 100)]).await;

        h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();

        let backups = h.store.local().backups().unwrap();
        assert_eq!(backups.len(), 1);
        let snapshot = h.store.local().read_backup(&backups[0]).unwrap();
        assert_eq!(ids(&snapshot), vec!["s1"]);

        let mirror = h.store.local().load().unwrap();
        assert_eq!(ids(&mirror), vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_legacy_local_sections_get_ids_on_sign_in() {
        let h = harness();

        // Legacy payload: no ids, no timestamps
        h.medium
            .set(SECTIONS_KEY, r#"[{"title":"Legacy","links":[]}]"#)
            .unwrap();

        h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();

        let sections = h.store.get_sections().await.unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Legacy");
        assert!(sections[0].id().unwrap().starts_with("id_"));
    }

    #[tokio::test]
    async fn test_failed_remote_read_stays_local() {
        let h = harness();
        h.store
            .set_sections(vec![section("s1", "Work", 100)])
            .await
            .unwrap();
        let before = h.store.get_sections().await.unwrap();

        let mut events = h.store.subscribe();
        h.docs.fail_list.store(true, Ordering::SeqCst);

        let outcome = h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Degraded(_)));
        assert_eq!(h.store.mode().await, StoreMode::Local);
        assert_eq!(h.store.get_sections().await.unwrap(), before);

        // Degraded notice, but no change notification
        match events.try_recv().unwrap() {
            StoreEvent::SyncFailed { user_id, .. } => assert_eq!(user_id, "alice"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(events.try_recv().is_err());

        // Nothing was written remotely, no backup was taken
        assert_eq!(h.docs.commits.load(Ordering::SeqCst), 0);
        assert!(h.store.local().backups().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_stays_local() {
        let h = harness();
        h.store
            .set_sections(vec![section("s1", "Work", 100)])
            .await
            .unwrap();
        h.docs.fail_commit.store(true, Ordering::SeqCst);

        let outcome = h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();
        match outcome {
            TransitionOutcome::Degraded(StoreError::Storage(StorageError::Unauthorized {
                ..
            })) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.store.mode().await, StoreMode::Local);
        assert_eq!(ids(&h.store.get_sections().await.unwrap()), vec!["s1"]);

        // Recovery on the next sign-in
        h.docs.fail_commit.store(false, Ordering::SeqCst);
        let outcome = h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Switched));
    }

    #[tokio::test]
    async fn test_local_write_failure_does_not_abort_sign_in() {
        let h = harness();
        h.store
            .set_sections(vec![section("s1", "Work", 100)])
            .await
            .unwrap();
        h.medium.set_simulate_write_error(true);

        let outcome = h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Switched));
        assert_eq!(ids(&h.store.get_sections().await.unwrap()), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_cloud_mode_writes_go_remote() {
        let h = harness();
        h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();

        h.store
            .set_sections(vec![section("c1", "Cloud only", 10)])
            .await
            .unwrap();

        let remote = RemoteStore::new("alice", h.docs.clone());
        assert_eq!(ids(&remote.get().await.unwrap()), vec!["c1"]);
        assert!(h.store.local().load().unwrap().is_empty());

        // Deleting in cloud mode removes the record
        h.store.set_sections(Vec::new()).await.unwrap();
        assert!(remote.get().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_round_trip_keeps_ids() {
        let h = harness();
        h.store
            .set_sections(vec![section("s1", "A", 1), section("s2", "B", 1)])
            .await
            .unwrap();
        let before = ids(&h.store.get_sections().await.unwrap());

        h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();
        let outcome = h.store.handle_auth(AuthState::SignedOut).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Switched));
        assert_eq!(h.store.mode().await, StoreMode::Local);

        assert_eq!(ids(&h.store.get_sections().await.unwrap()), before);
    }

    #[tokio::test]
    async fn test_sign_out_leaves_cloud_untouched() {
        let h = harness();
        h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();
        h.store
            .set_sections(vec![section("c1", "Cloud", 10)])
            .await
            .unwrap();

        h.store.handle_auth(AuthState::SignedOut).await.unwrap();

        let remote = RemoteStore::new("alice", h.docs.clone());
        assert_eq!(ids(&remote.get().await.unwrap()), vec!["c1"]);
        // Edits made while signed in are not copied down
        assert!(h.store.get_sections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_skips_merge() {
        let h = harness();
        h.store
            .set_sections(vec![section("gone", "Deleted in cloud", 500)])
            .await
            .unwrap();
        seed_remote(&h, "alice", &[section("kept", "Kept", 1)]).await;
        let commits = h.docs.commits.load(Ordering::SeqCst);

        h.store.resume("alice").await.unwrap();

        assert_eq!(
            h.store.mode().await,
            StoreMode::Cloud {
                user_id: "alice".to_string()
            }
        );
        assert_eq!(ids(&h.store.get_sections().await.unwrap()), vec!["kept"]);
        assert_eq!(h.docs.commits.load(Ordering::SeqCst), commits);
        assert!(h.store.local().backups().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_events() {
        let h = harness();
        let mut events = h.store.subscribe();

        h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Changed);
        assert!(events.try_recv().is_err());

        // Same user again: no merge, no event
        let outcome = h.store.handle_auth(AuthState::signed_in("alice")).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::AlreadyActive));
        assert!(events.try_recv().is_err());

        h.store.handle_auth(AuthState::SignedOut).await.unwrap();
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Changed);
    }

    #[tokio::test]
    async fn test_concurrent_transition_is_rejected() {
        let docs = Arc::new(GatedDocuments {
            inner: SqliteDocumentStore::open_in_memory().unwrap(),
            gated: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let store = Arc::new(SectionStore::new(
            LocalStore::new(Arc::new(MemoryMedium::new())),
            docs.clone(),
        ));

        let first = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.handle_auth(AuthState::signed_in("alice")).await })
        };
        docs.entered.notified().await;

        let second = store.handle_auth(AuthState::SignedOut).await;
        assert!(matches!(second, Err(StoreError::TransitionInProgress)));

        docs.release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, TransitionOutcome::Switched));
        assert_eq!(
            store.mode().await,
            StoreMode::Cloud {
                user_id: "alice".to_string()
            }
        );
    }
}
