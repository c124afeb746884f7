//! Hot reload of the retry policy.
//!
//! A running client only takes new `[subscription]` retry settings. Edits to
//! the channel or transport sections are loaded, logged, and otherwise wait
//! for a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::RelayConfig;
use crate::resilience::backoff::BackoffPolicy;

/// Watches the configuration file and emits changed retry policies.
pub struct ConfigWatcher {
    path: PathBuf,
    current: RelayConfig,
    policy_tx: mpsc::UnboundedSender<BackoffPolicy>,
}

impl ConfigWatcher {
    /// `current` is the configuration the client was started with.
    pub fn new(
        path: &Path,
        current: RelayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<BackoffPolicy>) {
        let (policy_tx, policy_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                current,
                policy_tx,
            },
            policy_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            policy_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(next) => {
                            if let Some(policy) = apply_reload(&mut current, next) {
                                let _ = policy_tx.send(policy);
                            }
                        }
                        Err(e) => tracing::error!(
                            path = ?path,
                            error = %e,
                            "Failed to reload config, keeping current settings"
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

/// Replace `current` with `next`; the new retry policy if it differs.
pub fn apply_reload(current: &mut RelayConfig, next: RelayConfig) -> Option<BackoffPolicy> {
    if next.channel != current.channel || next.transport != current.transport {
        tracing::warn!("Channel or transport settings changed; restart to apply them");
    }

    let before = current.subscription.backoff_policy();
    let after = next.subscription.backoff_policy();
    *current = next;

    if before == after {
        tracing::debug!("Config reloaded, retry policy unchanged");
        return None;
    }
    tracing::info!(
        retry_limit = after.retry_limit,
        base_delay_ms = after.base_delay.as_millis() as u64,
        "Config reloaded with a new retry policy"
    );
    Some(after)
}
