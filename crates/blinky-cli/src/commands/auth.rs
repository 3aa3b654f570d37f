//! Auth command handlers
//!
//! The signed-in user is remembered in the config file. Signing in runs the
//! full local-to-cloud merge; later commands resume the session without one.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::debug;

use blinky_core::{AuthState, Config, SectionStore, TransitionOutcome};

use crate::output::Output;

/// Reattach to the remembered user's cloud sections, if any
///
/// Their local sections were merged when they signed in; merging the local
/// mirror again would bring back sections deleted in the cloud since.
pub async fn resume(store: &SectionStore, config: &Config) -> Result<()> {
    if let Some(user_id) = config.user_id.as_deref() {
        debug!("Resuming session for {}", user_id);
        store.resume(user_id).await?;
    }
    Ok(())
}

/// Sign in and merge local sections into the user's cloud sections
///
/// Expects the remembered session to be resumed already, so signing in as
/// the current user is a no-op.
pub async fn sign_in(
    store: &SectionStore,
    config: &mut Config,
    config_path: &PathBuf,
    user_id: String,
    output: &Output,
) -> Result<()> {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        bail!("User id cannot be empty");
    }

    let mut events = store.subscribe();
    let outcome = store
        .handle_auth(AuthState::signed_in(user_id.clone()))
        .await?;
    while let Ok(event) = events.try_recv() {
        debug!("Store event: {:?}", event);
    }

    let merged = match outcome {
        TransitionOutcome::Switched => true,
        TransitionOutcome::AlreadyActive => false,
        TransitionOutcome::Degraded(e) => {
            let hint = e
                .recovery_suggestion()
                .unwrap_or("Run `blinky auth sign-in` again to retry.");
            bail!(
                "Could not merge local sections into the cloud for {}: {}\n\
                 Still using local sections. {}",
                user_id,
                e,
                hint
            )
        }
    };

    config.user_id = Some(user_id.clone());
    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    let count = store.get_sections().await?.len();
    if merged {
        output.success(&format!(
            "Signed in as {} ({} section(s) in the cloud)",
            user_id, count
        ));
    } else {
        output.success(&format!(
            "Already signed in as {} ({} section(s) in the cloud)",
            user_id, count
        ));
    }
    Ok(())
}

/// Sign out and go back to local sections
pub async fn sign_out(
    store: &SectionStore,
    config: &mut Config,
    config_path: &PathBuf,
    output: &Output,
) -> Result<()> {
    let previous = config.user_id.take();
    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;
    store.handle_auth(AuthState::SignedOut).await?;

    match previous {
        Some(user_id) => output.success(&format!("Signed out {}", user_id)),
        None => output.success("Not signed in; using local sections"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use blinky_core::{Section, StoreMode};
    use tempfile::TempDir;

    struct Env {
        _temp_dir: TempDir,
        config: Config,
        config_path: PathBuf,
    }

    fn env() -> Env {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().join("data"),
            remote_db: None,
            user_id: None,
            log_file: None,
        };
        let config_path = temp_dir.path().join("config.toml");
        Env {
            _temp_dir: temp_dir,
            config,
            config_path,
        }
    }

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    fn section(id: &str) -> Section {
        let mut s = Section::with_id(id, id.to_uppercase());
        s.last_updated = Some(100);
        s
    }

    fn ids(sections: &[Section]) -> Vec<String> {
        sections.iter().filter_map(|s| s.id.clone()).collect()
    }

    /// Each call stands in for a separate `blinky` invocation
    async fn start(env: &Env) -> (SectionStore, Config) {
        let config = if env.config_path.exists() {
            Config::load_from_path(&env.config_path).unwrap()
        } else {
            env.config.clone()
        };
        let store = SectionStore::open(&config).unwrap();
        resume(&store, &config).await.unwrap();
        (store, config)
    }

    #[tokio::test]
    async fn test_sign_in_remembers_user() {
        let env = env();
        env.config.save_to_path(&env.config_path).unwrap();

        let (store, mut config) = start(&env).await;
        store.set_sections(vec![section("s1")]).await.unwrap();
        sign_in(&store, &mut config, &env.config_path, "alice".to_string(), &quiet())
            .await
            .unwrap();

        let saved = Config::load_from_path(&env.config_path).unwrap();
        assert_eq!(saved.user_id.as_deref(), Some("alice"));

        let (store, _) = start(&env).await;
        assert_eq!(
            store.mode().await,
            StoreMode::Cloud {
                user_id: "alice".to_string()
            }
        );
        assert_eq!(ids(&store.get_sections().await.unwrap()), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_repeated_sign_in_keeps_cloud_deletions() {
        let env = env();
        env.config.save_to_path(&env.config_path).unwrap();

        let (store, mut config) = start(&env).await;
        store
            .set_sections(vec![section("s1"), section("s2")])
            .await
            .unwrap();
        sign_in(&store, &mut config, &env.config_path, "alice".to_string(), &quiet())
            .await
            .unwrap();

        // Delete s2 while signed in
        let (store, _) = start(&env).await;
        store.set_sections(vec![section("s1")]).await.unwrap();

        // Signing in again as the same user must not merge the local mirror
        let (store, mut config) = start(&env).await;
        sign_in(&store, &mut config, &env.config_path, "alice".to_string(), &quiet())
            .await
            .unwrap();
        assert_eq!(ids(&store.get_sections().await.unwrap()), vec!["s1"]);

        let (store, _) = start(&env).await;
        assert_eq!(ids(&store.get_sections().await.unwrap()), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_sign_out_forgets_user() {
        let env = env();
        env.config.save_to_path(&env.config_path).unwrap();

        let (store, mut config) = start(&env).await;
        store.set_sections(vec![section("s1")]).await.unwrap();
        sign_in(&store, &mut config, &env.config_path, "alice".to_string(), &quiet())
            .await
            .unwrap();

        let (store, mut config) = start(&env).await;
        sign_out(&store, &mut config, &env.config_path, &quiet())
            .await
            .unwrap();
        assert_eq!(store.mode().await, StoreMode::Local);

        let (store, config) = start(&env).await;
        assert!(config.user_id.is_none());
        assert_eq!(store.mode().await, StoreMode::Local);
        // The mirror written at sign-in is what local mode shows
        assert_eq!(ids(&store.get_sections().await.unwrap()), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_empty_user_is_rejected() {
        let env = env();
        let (store, mut config) = start(&env).await;
        let err = sign_in(&store, &mut config, &env.config_path, "  ".to_string(), &quiet())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
        assert!(!env.config_path.exists());
    }
}
