//! Observes a [`PathMonitor`] and publishes the latest [`PathState`].
//!
//! One task owns the state slot. It consumes snapshots in order, commits each
//! one immediately with an empty peer view, and starts a peer lookup tagged
//! with that cycle's generation. Lookups for superseded cycles are allowed to
//! finish but their results are dropped.

use crate::monitor::{LookupError, MonitorError, PathMonitor};
use crate::path::{PathSnapshot, PeerPathSnapshot};
use crate::state::{Generation, ObservationSlot, PathState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Live observation handle. Dropping it stops the observer.
pub struct Subscription {
    state: watch::Receiver<Option<PathState>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl Subscription {
    /// Receiver of the current state; `None` until the first snapshot arrives.
    pub fn state(&self) -> watch::Receiver<Option<PathState>> {
        self.state.clone()
    }

    /// Stops observing and waits for the observer task to exit.
    pub async fn cancel(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Path observer task failed");
        }
    }
}

pub struct PathObserver;

impl PathObserver {
    pub fn subscribe<M: PathMonitor>(monitor: Arc<M>) -> Result<Subscription, MonitorError> {
        let paths = monitor.subscribe()?;
        let (publisher, state) = watch::channel(None);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(monitor, paths, publisher, cancel.clone()));
        info!("Path observation started");

        Ok(Subscription {
            state,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        })
    }
}

async fn run<M: PathMonitor>(
    monitor: Arc<M>,
    mut paths: mpsc::Receiver<PathSnapshot>,
    publisher: watch::Sender<Option<PathState>>,
    cancel: CancellationToken,
) {
    let mut slot = ObservationSlot::new();
    let mut lookups: JoinSet<Result<PeerPathSnapshot, LookupError>> = JoinSet::new();
    let mut pending: HashMap<task::Id, Generation> = HashMap::new();
    let mut stream_done = false;

    loop {
        if stream_done && lookups.is_empty() {
            break;
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Path observation cancelled");
                break;
            }

            next = paths.recv(), if !stream_done => {
                let Some(path) = next else {
                    info!("Path stream ended");
                    stream_done = true;
                    continue;
                };
                let generation = slot.begin(path.clone());
                debug!(?generation, status = ?path.status, "Path snapshot received");
                publisher.send_replace(slot.current().cloned());

                let monitor = monitor.clone();
                let handle = lookups.spawn(async move { monitor.peer_path(path).await });
                pending.insert(handle.id(), generation);
            }

            Some(joined) = lookups.join_next_with_id() => {
                let (id, peer) = match joined {
                    Ok((id, Ok(peer))) => (id, Some(peer)),
                    Ok((id, Err(e))) => {
                        debug!(reason = %e, "No peer path");
                        (id, None)
                    }
                    // A failed lookup counts as absent for its own cycle.
                    Err(e) => {
                        warn!(error = %e, "Peer path lookup task failed");
                        (e.id(), None)
                    }
                };
                let Some(generation) = pending.remove(&id) else {
                    continue;
                };
                if slot.complete(generation, peer) {
                    publisher.send_replace(slot.current().cloned());
                } else {
                    debug!(?generation, current = ?slot.generation(), "Discarding stale peer path result");
                }
            }
        }
    }
    // Dropping the JoinSet aborts any lookups still in flight.
}
