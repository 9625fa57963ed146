//! Tracking of connected validators and the engine startup gate

use crate::colored::Colorize;
use crate::message::Version;
use crate::zfx_id::NodeId;

use tracing::{debug, info, warn};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Connected-stake bookkeeping with a latched startup gate.
///
/// The tracker observes validator-set changes and peer connect/disconnect events
/// and maintains the running sum of connected stake. Once that sum has ever
/// reached `startup_weight`, [ValidatorTracker::should_start] stays true: the
/// engines must not oscillate in and out of startup at cluster boundaries.
#[derive(Debug)]
pub struct ValidatorTracker {
    /// Registered stake per validator.
    weights: HashMap<NodeId, u64>,
    /// The set of currently connected validators.
    connected: HashSet<NodeId>,
    /// Running sum of the weights of connected validators. Summed in 128 bits
    /// since the registered total may exceed a single weight's range.
    connected_weight: u128,
    /// The stake that must connect before the engines may start.
    startup_weight: u64,
    /// Latched once `connected_weight` first reaches `startup_weight`.
    started: bool,
}

impl ValidatorTracker {
    pub fn new(startup_weight: u64) -> Self {
        ValidatorTracker {
            weights: HashMap::default(),
            connected: HashSet::new(),
            connected_weight: 0,
            startup_weight,
            started: false,
        }
    }

    pub fn on_validator_added(&mut self, id: NodeId, weight: u64) {
        let _ = self.weights.insert(id.clone(), weight);
        if self.connected.contains(&id) {
            self.connected_weight += weight as u128;
            self.latch();
        }
    }

    pub fn on_validator_weight_changed(&mut self, id: NodeId, old: u64, new: u64) {
        let _ = self.weights.insert(id.clone(), new);
        if self.connected.contains(&id) {
            self.connected_weight -= old as u128;
            self.connected_weight += new as u128;
            self.latch();
        }
    }

    pub fn on_validator_removed(&mut self, id: NodeId, weight: u64) {
        let _ = self.weights.remove(&id);
        if self.connected.contains(&id) {
            self.connected_weight -= weight as u128;
        }
    }

    pub fn connected(&mut self, id: NodeId, version: Version) {
        if !version.compatible(&Version::current()) {
            warn!(
                "[{}] peer {} connected with incompatible {}",
                "tracker".cyan(),
                id,
                version
            );
        }
        if !self.connected.insert(id.clone()) {
            return;
        }
        if let Some(weight) = self.weights.get(&id) {
            self.connected_weight += *weight as u128;
            self.latch();
        }
        debug!(
            "[{}] connected {} ({} / {} stake online)",
            "tracker".cyan(),
            id,
            self.connected_weight,
            self.startup_weight
        );
    }

    pub fn disconnected(&mut self, id: NodeId) {
        if !self.connected.remove(&id) {
            return;
        }
        if let Some(weight) = self.weights.get(&id) {
            self.connected_weight -= *weight as u128;
        }
        debug!("[{}] disconnected {}", "tracker".cyan(), id);
    }

    /// The stake currently connected.
    pub fn connected_weight(&self) -> u128 {
        self.connected_weight
    }

    /// True once enough stake has ever been connected. Latched.
    pub fn should_start(&self) -> bool {
        self.started
    }

    fn latch(&mut self) {
        if !self.started && self.connected_weight >= self.startup_weight as u128 {
            info!(
                "[{}] startup threshold reached ({} >= {})",
                "tracker".cyan(),
                self.connected_weight,
                self.startup_weight
            );
            self.started = true;
        }
    }
}

/// A cloneable, lock-protected handle to the tracker.
///
/// This is the one piece of consensus state touched from outside the serialized
/// event loop: the network layer reports peer lifecycle events while the
/// engines read the gate.
#[derive(Debug, Clone)]
pub struct Tracker {
    inner: Arc<RwLock<ValidatorTracker>>,
}

impl Tracker {
    pub fn new(startup_weight: u64) -> Self {
        Tracker { inner: Arc::new(RwLock::new(ValidatorTracker::new(startup_weight))) }
    }

    pub fn on_validator_added(&self, id: NodeId, weight: u64) {
        self.inner.write().unwrap().on_validator_added(id, weight)
    }

    pub fn on_validator_weight_changed(&self, id: NodeId, old: u64, new: u64) {
        self.inner.write().unwrap().on_validator_weight_changed(id, old, new)
    }

    pub fn on_validator_removed(&self, id: NodeId, weight: u64) {
        self.inner.write().unwrap().on_validator_removed(id, weight)
    }

    pub fn connected(&self, id: NodeId, version: Version) {
        self.inner.write().unwrap().connected(id, version)
    }

    pub fn disconnected(&self, id: NodeId) {
        self.inner.write().unwrap().disconnected(id)
    }

    pub fn connected_weight(&self) -> u128 {
        self.inner.read().unwrap().connected_weight()
    }

    pub fn should_start(&self) -> bool {
        self.inner.read().unwrap().should_start()
    }
}
