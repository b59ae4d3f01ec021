use crate::path::{PathSnapshot, PeerPathSnapshot};
use serde::Serialize;

/// The most recent path and, when it qualifies, its peer-to-peer view.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct PathState {
    pub path: PathSnapshot,
    pub peer: Option<PeerPathSnapshot>,
    /// Whether this cycle's peer lookup has finished.
    #[serde(skip)]
    pub resolved: bool,
}

/// Identifies one observation cycle. Strictly increasing per subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Generation(u64);

/// Single current-state slot owned by the observer task.
///
/// Each incoming snapshot starts a new generation and clears the peer view.
/// Peer results are only accepted for the generation that is still current.
#[derive(Debug, Default)]
pub struct ObservationSlot {
    generation: Generation,
    state: Option<PathState>,
}

impl ObservationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&PathState> {
        self.state.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Starts a new cycle for `path` and returns its generation.
    pub fn begin(&mut self, path: PathSnapshot) -> Generation {
        self.generation = Generation(self.generation.0 + 1);
        self.state = Some(PathState {
            path,
            peer: None,
            resolved: false,
        });
        self.generation
    }

    /// Applies a peer lookup result. Returns false and leaves the slot
    /// untouched if `generation` has been superseded.
    pub fn complete(&mut self, generation: Generation, peer: Option<PeerPathSnapshot>) -> bool {
        if generation != self.generation {
            return false;
        }
        match self.state.as_mut() {
            Some(state) => {
                state.peer = peer;
                state.resolved = true;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::path::PathStatus;
    use std::time::Duration;

    fn peer(name: &str) -> PeerPathSnapshot {
        PeerPathSnapshot {
            endpoint: Endpoint::Opaque {
                description: name.to_string(),
            },
            performance: Default::default(),
            active_duration: Duration::from_secs(1),
        }
    }

    fn path(status: PathStatus) -> PathSnapshot {
        PathSnapshot {
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_begin_clears_peer() {
        let mut slot = ObservationSlot::new();
        let first = slot.begin(path(PathStatus::Satisfied));
        assert!(!slot.current().unwrap().resolved);
        assert!(slot.complete(first, Some(peer("a"))));
        assert!(slot.current().unwrap().peer.is_some());
        assert!(slot.current().unwrap().resolved);

        slot.begin(path(PathStatus::Unsatisfied));
        let state = slot.current().unwrap();
        assert_eq!(state.path.status, PathStatus::Unsatisfied);
        assert!(state.peer.is_none());
        assert!(!state.resolved);
    }

    #[test]
    fn test_stale_completion_discarded() {
        let mut slot = ObservationSlot::new();
        let a = slot.begin(path(PathStatus::Satisfied));
        let b = slot.begin(path(PathStatus::RequiresConnection));
        assert!(b > a);

        assert!(slot.complete(b, Some(peer("b"))));
        assert!(!slot.complete(a, Some(peer("a"))));
        assert_eq!(
            slot.current().unwrap().peer.as_ref().unwrap().endpoint.to_string(),
            "opaque(b)"
        );

        // A stale "absent" result must not clear the current peer either.
        assert!(!slot.complete(a, None));
        assert!(slot.current().unwrap().peer.is_some());
    }

    #[test]
    fn test_complete_before_begin() {
        let mut slot = ObservationSlot::new();
        assert!(!slot.complete(slot.generation(), Some(peer("x"))));
        assert!(slot.current().is_none());
    }
}
