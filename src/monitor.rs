use crate::path::{PathSnapshot, PeerPathSnapshot};
use crate::replay::ReplayError;
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;

/// Buffered snapshots per subscription before the producer waits on the consumer.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),
}

/// Outcome of a peer-path lookup that produced nothing to show.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    #[error("path is not carried over a peer-to-peer link")]
    NotApplicable,
    #[error("peer-to-peer path lookups are not supported by this monitor")]
    Unsupported,
}

/// Source of network path snapshots.
///
/// `subscribe` starts a fresh, unbounded stream that never restarts on its own;
/// dropping the receiver ends it. `peer_path` is best effort.
pub trait PathMonitor: Send + Sync + 'static {
    fn subscribe(&self) -> Result<mpsc::Receiver<PathSnapshot>, MonitorError>;

    fn peer_path(
        &self,
        path: PathSnapshot,
    ) -> impl Future<Output = Result<PeerPathSnapshot, LookupError>> + Send;
}
