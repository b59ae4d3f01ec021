//! Path monitor that plays back a scripted sequence of snapshots.
//!
//! Scripts are TOML:
//!
//! ```toml
//! [[step]]
//! delay_ms = 0
//! lookup_delay_ms = 300
//!
//! [step.path]
//! status = "satisfied"
//!
//! [step.peer]
//! endpoint = { kind = "opaque", description = "aware-peer" }
//! ```

use crate::monitor::{LookupError, MonitorError, PathMonitor, SNAPSHOT_CHANNEL_CAPACITY};
use crate::path::{PathSnapshot, PeerPathSnapshot};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("replay script has no steps")]
    Empty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplayStep {
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub lookup_delay_ms: u64,
    pub path: PathSnapshot,
    pub peer: Option<PeerPathSnapshot>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplayScript {
    #[serde(rename = "step", default)]
    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn parse(content: &str) -> Result<Self, ReplayError> {
        let script: ReplayScript = toml::from_str(content)?;
        if script.steps.is_empty() {
            return Err(ReplayError::Empty);
        }
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// The latest step whose snapshot equals `path`.
    pub fn step_for(&self, path: &PathSnapshot) -> Option<&ReplayStep> {
        self.steps.iter().rev().find(|s| &s.path == path)
    }
}

pub struct ReplayMonitor {
    script: Arc<ReplayScript>,
}

impl ReplayMonitor {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            script: Arc::new(script),
        }
    }

    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        Ok(Self::new(ReplayScript::load(path)?))
    }
}

impl PathMonitor for ReplayMonitor {
    fn subscribe(&self) -> Result<mpsc::Receiver<PathSnapshot>, MonitorError> {
        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let script = self.script.clone();

        tokio::spawn(async move {
            info!(steps = script.steps.len(), "Replay started");
            for (idx, step) in script.steps.iter().enumerate() {
                tokio::select! {
                    _ = tx.closed() => return,
                    _ = tokio::time::sleep(Duration::from_millis(step.delay_ms)) => {}
                }
                debug!(step = idx, status = ?step.path.status, "Replaying path");
                if tx.send(step.path.clone()).await.is_err() {
                    return;
                }
            }
            // A path stream never ends on its own; hold it open until dropped.
            tx.closed().await;
            debug!("Replay subscriber went away");
        });

        Ok(rx)
    }

    async fn peer_path(&self, path: PathSnapshot) -> Result<PeerPathSnapshot, LookupError> {
        let step = self.script.step_for(&path).ok_or(LookupError::NotApplicable)?;
        tokio::time::sleep(Duration::from_millis(step.lookup_delay_ms)).await;
        step.peer.clone().ok_or(LookupError::NotApplicable)
    }
}
