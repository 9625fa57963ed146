//! Admission gating for vertices with unsatisfied prerequisites

use super::vertex::Vertex;

use crate::colored::Colorize;
use crate::zfx_id::Id;

use tracing::debug;

use std::collections::{HashMap, HashSet};

/// A pending admission record for one vertex.
///
/// The vertex is released once both dependency sets are empty; abandonment is
/// terminal and idempotent.
#[derive(Debug, Clone)]
pub struct Issuer {
    pub vertex: Vertex,
    /// Parents not yet admitted by the engine.
    pub vtx_deps: HashSet<Id>,
    /// Transactions whose inputs are not yet available.
    pub tx_deps: HashSet<Id>,
    pub issued: bool,
    pub abandoned: bool,
}

impl Issuer {
    pub fn new(vertex: Vertex, vtx_deps: HashSet<Id>, tx_deps: HashSet<Id>) -> Self {
        Issuer { vertex, vtx_deps, tx_deps, issued: false, abandoned: false }
    }

    /// Whether every prerequisite has been fulfilled.
    pub fn ready(&self) -> bool {
        !self.issued && !self.abandoned && self.vtx_deps.is_empty() && self.tx_deps.is_empty()
    }
}

/// Tracks pending issuers and the dependencies blocking them.
#[derive(Debug, Default)]
pub struct Blocker {
    issuers: HashMap<Id, Issuer>,
    /// Dependency id to the vertices waiting on it.
    waiting: HashMap<Id, HashSet<Id>>,
}

impl Blocker {
    pub fn new() -> Self {
        Blocker { issuers: HashMap::default(), waiting: HashMap::default() }
    }

    pub fn register(&mut self, issuer: Issuer) {
        let id = issuer.vertex.id.clone();
        for dep in issuer.vtx_deps.iter().chain(issuer.tx_deps.iter()) {
            self.waiting.entry(dep.clone()).or_insert_with(HashSet::new).insert(id.clone());
        }
        debug!(
            "[{}] blocked {} on {} vertex deps, {} tx deps",
            "issuer".cyan(),
            issuer.vertex,
            issuer.vtx_deps.len(),
            issuer.tx_deps.len()
        );
        let _ = self.issuers.insert(id, issuer);
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.issuers.contains_key(id)
    }

    pub fn pending(&self) -> usize {
        self.issuers.len()
    }

    /// Marks a dependency as fulfilled and returns the issuers that became
    /// ready for admission. Returned records are removed from the blocker.
    pub fn fulfill(&mut self, dep: &Id) -> Vec<Issuer> {
        let waiters = match self.waiting.remove(dep) {
            Some(waiters) => waiters,
            None => return vec![],
        };
        let mut ready = vec![];
        for waiter in waiters {
            let done = match self.issuers.get_mut(&waiter) {
                Some(issuer) => {
                    let _ = issuer.vtx_deps.remove(dep);
                    let _ = issuer.tx_deps.remove(dep);
                    issuer.ready()
                }
                None => false,
            };
            if done {
                if let Some(issuer) = self.issuers.remove(&waiter) {
                    ready.push(issuer);
                }
            }
        }
        ready
    }

    /// Abandons the given dependency: every issuer waiting on it is dropped,
    /// and since those vertices will never issue, their own waiters are
    /// abandoned in turn. Returns the ids of all abandoned vertices.
    pub fn abandon(&mut self, dep: &Id) -> Vec<Id> {
        let mut abandoned = vec![];
        let mut stack = vec![dep.clone()];
        while let Some(id) = stack.pop() {
            let waiters = match self.waiting.remove(&id) {
                Some(waiters) => waiters,
                None => continue,
            };
            for waiter in waiters {
                if let Some(mut issuer) = self.issuers.remove(&waiter) {
                    if issuer.abandoned {
                        continue;
                    }
                    issuer.abandoned = true;
                    debug!("[{}] abandoned {}", "issuer".cyan(), issuer.vertex);
                    abandoned.push(waiter.clone());
                    stack.push(waiter);
                }
            }
        }
        abandoned
    }
}
