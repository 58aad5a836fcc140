//! Leadership state of this controller instance.
//!
//! Only one instance in a cluster may write to the shared intent store.
//! Being told we are leader is not enough: the instance first reconciles the
//! store against its desired intents (`Electing`) and only then starts
//! forwarding live updates (`Leader`). Every acquisition starts a new epoch,
//! so work scheduled under an older acquisition can detect it is stale.

use std::fmt;
use tracing::info;

/// Phase of leadership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LeadershipState {
    /// Another instance (or nobody) owns the store; buffer only
    #[default]
    Follower,
    /// Elected, reconciliation in progress; not yet safe to forward
    Electing,
    /// Reconciled and forwarding every change
    Leader,
}

impl fmt::Display for LeadershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeadershipState::Follower => write!(f, "follower"),
            LeadershipState::Electing => write!(f, "electing"),
            LeadershipState::Leader => write!(f, "leader"),
        }
    }
}

/// Leadership state plus the acquisition epoch.
#[derive(Debug, Clone, Default)]
pub struct Leadership {
    state: LeadershipState,
    epoch: u64,
    acquisitions: u64,
}

impl Leadership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LeadershipState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of times leadership was granted.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    /// Records a leadership grant and returns the new epoch.
    ///
    /// A grant while already leader restarts reconciliation.
    pub fn elect(&mut self) -> u64 {
        self.epoch += 1;
        self.acquisitions += 1;
        self.state = LeadershipState::Electing;
        info!(epoch = self.epoch, "Leadership granted, reconciling");
        self.epoch
    }

    /// Records loss of leadership. Returns true if the state changed.
    pub fn demote(&mut self) -> bool {
        if self.state == LeadershipState::Follower {
            return false;
        }
        info!(epoch = self.epoch, previous = %self.state, "Leadership lost");
        self.state = LeadershipState::Follower;
        true
    }

    /// Completes the reconciliation of `epoch`.
    ///
    /// Fails if leadership was lost or granted again since `epoch` started.
    pub fn activate(&mut self, epoch: u64) -> bool {
        if !self.is_electing(epoch) {
            return false;
        }
        self.state = LeadershipState::Leader;
        info!(epoch, "Leadership activated");
        true
    }

    /// Returns true while the reconciliation of `epoch` may keep writing.
    pub fn is_electing(&self, epoch: u64) -> bool {
        self.state == LeadershipState::Electing && self.epoch == epoch
    }

    /// Returns true if live updates from `epoch` may be forwarded.
    pub fn is_leader(&self, epoch: u64) -> bool {
        self.state == LeadershipState::Leader && self.epoch == epoch
    }
}
