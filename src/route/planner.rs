use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use log::{debug, info};
use regex::Regex;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::roster::Roster;

use super::link::{build_link, MapProvider};

/// Delay between dispatching a route link and removing its stops from the
/// roster. The window lets the operator re-trigger the same link if the
/// first navigation attempt did not register.
pub const BATCH_COMMIT_DELAY: Duration = Duration::from_secs(5);

fn is_mobile(user_agent: &str) -> bool {
    static MOBILE_MARKERS: OnceLock<Regex> = OnceLock::new();
    MOBILE_MARKERS
        .get_or_init(|| {
            Regex::new(r"(?i)Android|webOS|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini")
                .expect("mobile marker pattern compiles")
        })
        .is_match(user_agent)
}

/// Navigation collaborator. `redirect` replaces the current context (mobile
/// devices); `open_in_new_context` opens a fresh one (everything else).
pub trait Navigator: Send + Sync {
    fn redirect(&self, url: &str);
    fn open_in_new_context(&self, url: &str);
}

/// One issued route: the selected roster prefix, the link handed to the
/// navigator (cleared on a provider switch), and when the commit fires.
#[derive(Debug, Clone)]
pub struct RouteBatch {
    pub id: Uuid,
    pub prefix: Vec<String>,
    pub link: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Two-phase "queue then commit" batching of the roster into one deep-link.
///
/// Idle ↔ Pending. A request while Pending with a held link replays that
/// exact link and recomputes nothing. Otherwise the first
/// `min(provider cap, roster len)` addresses become the batch, the link is
/// dispatched, and a single deferred task removes the prefix after
/// `BATCH_COMMIT_DELAY`. Each batch carries an id so a superseded commit
/// (possible after a provider switch cleared the link) still removes its own
/// prefix but leaves a newer pending batch alone.
pub struct RoutePlanner {
    roster: Arc<Mutex<Roster>>,
    navigator: Arc<dyn Navigator>,
    pending: Arc<Mutex<Option<RouteBatch>>>,
    commit_delay: Duration,
    shutdown: CancellationToken,
}

impl RoutePlanner {
    pub fn new(roster: Arc<Mutex<Roster>>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            roster,
            navigator,
            pending: Arc::new(Mutex::new(None)),
            commit_delay: BATCH_COMMIT_DELAY,
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn request_directions(
        &self,
        provider: MapProvider,
        user_agent: &str,
    ) -> Result<String> {
        {
            let pending = self.pending.lock().await;
            if let Some(batch) = pending.as_ref() {
                if let Some(link) = batch.link.clone() {
                    info!("replaying pending route link for batch {}", batch.id);
                    drop(pending);
                    self.dispatch(&link, user_agent);
                    return Ok(link);
                }
            }
        }

        let prefix = {
            let roster = self.roster.lock().await;
            if roster.is_empty() {
                return Err(Error::EmptyRoster);
            }
            let limit = provider.stop_limit().min(roster.len());
            roster.items()[..limit].to_vec()
        };

        let link = build_link(provider, &prefix);
        let batch = RouteBatch {
            id: Uuid::new_v4(),
            prefix: prefix.clone(),
            link: Some(link.clone()),
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.commit_delay)
                    .unwrap_or_else(|_| chrono::Duration::zero()),
        };
        info!(
            "issued route batch {} via {}: {} stop(s)",
            batch.id,
            provider.as_str(),
            prefix.len()
        );

        let batch_id = batch.id;
        *self.pending.lock().await = Some(batch);

        self.dispatch(&link, user_agent);
        self.schedule_commit(batch_id, prefix);
        Ok(link)
    }

    /// Drops the held link so the next request recomputes a fresh batch.
    /// The already-scheduled commit and the roster are untouched.
    pub async fn clear_pending_link(&self) {
        if let Some(batch) = self.pending.lock().await.as_mut() {
            debug!("cleared pending route link for batch {}", batch.id);
            batch.link = None;
        }
    }

    pub async fn pending_batch(&self) -> Option<RouteBatch> {
        self.pending.lock().await.clone()
    }

    /// Stops any scheduled commit. Used at session teardown only; an
    /// uncommitted batch is simply abandoned with the rest of the session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn dispatch(&self, link: &str, user_agent: &str) {
        if is_mobile(user_agent) {
            self.navigator.redirect(link);
        } else {
            self.navigator.open_in_new_context(link);
        }
    }

    fn schedule_commit(&self, batch_id: Uuid, prefix: Vec<String>) {
        let roster = self.roster.clone();
        let pending = self.pending.clone();
        // anchored here, not at the task's first poll
        let deadline = tokio::time::Instant::now() + self.commit_delay;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = shutdown.cancelled() => {
                    debug!("commit for route batch {batch_id} cancelled at teardown");
                    return;
                }
            }

            let removed = roster.lock().await.remove_batch(&prefix);
            info!("committed route batch {batch_id}: removed {removed} address(es)");

            let mut guard = pending.lock().await;
            if guard.as_ref().map(|batch| batch.id) == Some(batch_id) {
                *guard = None;
            }
        });
    }
}
