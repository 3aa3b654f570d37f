//! Authentication state feed
//!
//! The identity provider reports sign-in and sign-out as `AuthState` values.
//! `spawn_auth_listener` drains them from a channel and applies each one to
//! the store in order, so rapid changes queue up instead of racing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::store::{SectionStore, TransitionOutcome};

/// Delay before re-applying a change that hit an in-flight transition
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Authentication state reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedIn { user_id: String },
    SignedOut,
}

impl AuthState {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        AuthState::SignedIn {
            user_id: user_id.into(),
        }
    }

    /// Map an optional user id (as stored in config) to a state
    pub fn from_user_id(user_id: Option<&str>) -> Self {
        match user_id {
            Some(id) if !id.trim().is_empty() => AuthState::signed_in(id),
            _ => AuthState::SignedOut,
        }
    }
}

/// Spawn a task applying auth changes from `auth_rx` one at a time
///
/// The task ends when every sender is dropped.
pub fn spawn_auth_listener(
    store: Arc<SectionStore>,
    mut auth_rx: mpsc::Receiver<AuthState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(state) = auth_rx.recv().await {
            debug!("Auth state changed: {:?}", state);
            apply(&store, state).await;
        }
        debug!("Auth listener stopped");
    })
}

async fn apply(store: &SectionStore, state: AuthState) {
    loop {
        match store.handle_auth(state.clone()).await {
            Ok(TransitionOutcome::Degraded(e)) => {
                warn!("Sign-in degraded to local storage: {}", e);
                return;
            }
            Ok(_) => return,
            Err(StoreError::TransitionInProgress) => {
                // Someone called handle_auth directly; wait our turn
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => {
                error!("Failed to apply auth change: {}", e);
                return;
            }
        }
    }
}
