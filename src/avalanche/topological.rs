//! The vertex DAG engine

use super::vertex::Vertex;
use super::{Error, Result};

use crate::collections::{Bag, BitSet64, UniqueBag};
use crate::colored::Colorize;
use crate::engine::{Health, SnowstormHealth};
use crate::params::Parameters;
use crate::snowstorm::{ConflictGraph, Status, Tx};
use crate::vm::{VertexStore, Vm};
use crate::zfx_id::Id;

use tracing::{debug, info};

use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Max number of parents to assign to a locally built vertex
pub const NPARENTS: usize = 3;

/// Per-poll scratch for the vote propagation.
#[derive(Debug, Clone, Copy, Default)]
struct KahnNode {
    in_degree: usize,
    votes: BitSet64,
}

/// Counters surfaced through the health report.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    pub polls: u64,
    pub polls_below_alpha: u64,
    pub vertices_accepted: u64,
    pub vertices_rejected: u64,
}

/// The topological DAG engine.
///
/// Vertices live in the engine-owned `nodes` arena while processing; parent
/// references are ids, never handles, so removal from `nodes` is the one and
/// only destruction event. Every admitted vertex is also registered in the
/// conflict graph as a transaction under its own id, which lets vertex-level
/// conflicts (derived from stop-vertex ancestry) resolve through the same
/// algorithm as transaction conflicts.
pub struct Topological {
    params: Parameters,
    cg: ConflictGraph,
    vm: Box<dyn Vm>,
    store: Box<dyn VertexStore>,

    /// Processing vertices.
    nodes: HashMap<Id, Vertex>,
    /// Terminal decisions.
    decided: HashMap<Id, Status>,
    /// The current frontier: leaves of the accepted-so-far DAG. May contain
    /// accepted vertices.
    frontier: HashMap<Id, Vertex>,
    /// Frontier vertices that are strongly preferred.
    preferred: HashSet<Id>,
    /// Frontier vertices that are strongly virtuous.
    virtuous: HashSet<Id>,
    /// Virtuous transactions not contained in any preferred-frontier vertex.
    orphans: HashSet<Id>,
    /// Ancestry whitelists of processing stop vertices.
    stop_whitelists: HashMap<Id, HashSet<Id>>,

    // Poll scratch, cleared at each poll rather than reallocated.
    kahn_nodes: HashMap<Id, KahnNode>,
    leaves: HashSet<Id>,
    votes: UniqueBag,
    // Memoization for the frontier update, cleared per traversal.
    preference_cache: HashMap<Id, bool>,
    virtuous_cache: HashMap<Id, bool>,

    poll_number: u64,
    start_times: HashMap<Id, Instant>,
    metrics: Metrics,
}

impl Topological {
    pub fn new(
        params: Parameters,
        vm: Box<dyn Vm>,
        store: Box<dyn VertexStore>,
    ) -> crate::Result<Self> {
        params.verify()?;
        Ok(Topological {
            params,
            cg: ConflictGraph::new(params),
            vm,
            store,
            nodes: HashMap::default(),
            decided: HashMap::default(),
            frontier: HashMap::default(),
            preferred: HashSet::new(),
            virtuous: HashSet::new(),
            orphans: HashSet::new(),
            stop_whitelists: HashMap::default(),
            kahn_nodes: HashMap::default(),
            leaves: HashSet::new(),
            votes: UniqueBag::new(),
            preference_cache: HashMap::default(),
            virtuous_cache: HashMap::default(),
            poll_number: 0,
            start_times: HashMap::default(),
            metrics: Metrics::default(),
        })
    }

    /// Installs the initial frontier. The given vertices are taken as already
    /// accepted.
    pub fn initialize(&mut self, frontier: Vec<Vertex>) -> Result<()> {
        for vtx in frontier {
            let _ = self.decided.insert(vtx.id.clone(), Status::Accepted);
            let _ = self.preferred.insert(vtx.id.clone());
            let _ = self.virtuous.insert(vtx.id.clone());
            let _ = self.frontier.insert(vtx.id.clone(), vtx);
        }
        Ok(())
    }

    /// Admits a vertex whose parents are known and not rejected.
    ///
    /// All non-decided transactions are registered in the conflict graph,
    /// followed by the vertex itself as a transaction-vertex, and the vertex is
    /// placed on the frontier if warranted. Old ancestors are not traversed to
    /// revoke their virtuous status here; the next poll corrects any staleness.
    pub fn add(&mut self, vertex: Vertex) -> Result<()> {
        let id = vertex.id.clone();
        if self.nodes.contains_key(&id) || self.decided.contains_key(&id) {
            debug!("[{}] {} already known", "avalanche".cyan(), vertex);
            return Ok(());
        }
        for pid in vertex.parents.iter() {
            match self.status(pid) {
                Some(Status::Rejected) => return Err(Error::RejectedParent(pid.clone())),
                Some(_) => (),
                None => return Err(Error::UnknownParent(pid.clone())),
            }
        }

        for tx in vertex.txs.iter() {
            if self.cg.status(&tx.id).map(|s| s.decided()).unwrap_or(false) {
                continue;
            }
            self.cg.add(tx.clone())?;
        }
        let conflicts = self.vertex_tx_conflicts(&vertex);
        self.cg.add(Tx::new(id.clone(), vec![], conflicts))?;

        let _ = self.nodes.insert(id.clone(), vertex.clone());
        let _ = self.start_times.insert(id, Instant::now());
        debug!("[{}] admitted {}", "avalanche".cyan(), vertex);

        self.update(vertex)
    }

    /// Processes the chits returned by one voting round.
    pub fn record_poll(&mut self, responses: &UniqueBag) -> Result<()> {
        self.poll_number += 1;
        self.metrics.polls += 1;

        // Below alpha distinct respondents the poll only decays confidence.
        let respondents = responses.respondents();
        if respondents.len() < self.params.alpha {
            debug!(
                "[{}] poll {} has {} respondents, alpha is {}",
                "avalanche".cyan(),
                self.poll_number,
                respondents.len(),
                self.params.alpha
            );
            self.metrics.polls_below_alpha += 1;
            let _ = self.cg.record_poll(&Bag::new())?;
            return Ok(());
        }

        let filtered = self.push_votes(responses);

        let outcome = self.cg.record_poll(&filtered)?;
        for id in outcome.accepted.iter() {
            if !self.is_vertex_id(id) {
                self.vm.accept_tx(id)?;
            }
        }
        for id in outcome.rejected.iter() {
            if !self.is_vertex_id(id) {
                self.vm.reject_tx(id)?;
            }
        }
        if outcome.changed() {
            self.update_frontiers()?;
        }
        Ok(())
    }

    /// The strongly preferred frontier.
    pub fn preferences(&self) -> &HashSet<Id> {
        &self.preferred
    }

    /// The strongly virtuous frontier.
    pub fn virtuous(&self) -> &HashSet<Id> {
        &self.virtuous
    }

    /// Virtuous transactions awaiting re-batching.
    pub fn orphans(&self) -> &HashSet<Id> {
        &self.orphans
    }

    /// The ids on the current frontier.
    pub fn frontier_ids(&self) -> Vec<Id> {
        self.frontier.keys().cloned().collect()
    }

    /// True when nothing left needs more votes to be accepted.
    pub fn quiesce(&self) -> bool {
        self.cg.virtuous_voting().is_empty()
    }

    pub fn finalized(&self) -> bool {
        self.cg.finalized()
    }

    pub fn status(&self, id: &Id) -> Option<Status> {
        if self.nodes.contains_key(id) {
            Some(Status::Processing)
        } else {
            self.decided.get(id).cloned()
        }
    }

    /// A processing or frontier vertex, if the engine still holds it.
    pub fn vertex(&self, id: &Id) -> Option<&Vertex> {
        self.nodes.get(id).or_else(|| self.frontier.get(id))
    }

    pub fn num_processing(&self) -> usize {
        self.nodes.len()
    }

    /// The status of a transaction in the conflict graph.
    pub fn tx_status(&self, id: &Id) -> Option<Status> {
        self.cg.status(id)
    }

    /// Batches transactions into a fresh vertex built on the preferred
    /// frontier. This is how orphaned virtuous transactions get re-issued.
    /// Returns `None` when there is nothing to build on.
    pub fn build_vertex(&self, txs: Vec<Tx>) -> Option<Vertex> {
        if txs.is_empty() {
            return None;
        }
        let mut candidates: Vec<&Vertex> = self
            .frontier
            .values()
            .filter(|vtx| self.preferred.contains(&vtx.id))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        // Deterministic parent choice among equally preferred candidates.
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        candidates.truncate(NPARENTS);
        let height = candidates.iter().map(|vtx| vtx.height).max().unwrap_or(0) + 1;
        let parents = candidates.into_iter().map(|vtx| vtx.id.clone()).collect();
        Some(Vertex::new(parents, height, txs, false))
    }

    /// The VM collaborator, for verification and parsing by the admission
    /// layer.
    pub fn vm_mut(&mut self) -> &mut dyn Vm {
        &mut *self.vm
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn health(&self) -> Health {
        let longest = self
            .start_times
            .values()
            .map(|t| t.elapsed().as_millis() as u64)
            .max()
            .unwrap_or(0);
        Health {
            outstanding_vertices: self.nodes.len(),
            longest_running_vertex_ms: longest,
            snowstorm: SnowstormHealth {
                processing: self.cg.num_processing(),
                virtuous: self.cg.virtuous().len(),
                preferences: self.cg.preferences().len(),
            },
        }
    }

    // Poll machinery

    /// Kahn-style vote propagation: seeds the in-degrees of the sub-DAG
    /// reached by the voted vertices, pushes each leaf's respondent set onto
    /// its transactions and parents, subtracts votes that went to conflicting
    /// transactions, and collapses the result into an alpha-filtered bag.
    fn push_votes(&mut self, responses: &UniqueBag) -> Bag {
        self.kahn_nodes.clear();
        self.leaves.clear();
        self.votes.clear();

        // In-degree computation over the ancestry of the voted vertices.
        let mut stack: Vec<Id> = vec![];
        for (vtx_id, set) in responses.iter() {
            let parents = match self.nodes.get(vtx_id) {
                Some(vtx) => vtx.parents.clone(),
                None => {
                    debug!("[{}] dropping vote for unknown {}", "avalanche".cyan(), vtx_id);
                    continue;
                }
            };
            let created = !self.kahn_nodes.contains_key(vtx_id);
            let entry = self.kahn_nodes.entry(vtx_id.clone()).or_insert_with(KahnNode::default);
            entry.votes.union(*set);
            if !created {
                continue;
            }
            if entry.in_degree == 0 {
                let _ = self.leaves.insert(vtx_id.clone());
            }
            stack.extend(parents);
            while let Some(pid) = stack.pop() {
                // Decided ancestors do not participate in the traversal.
                let grandparents = match self.nodes.get(&pid) {
                    Some(vtx) => vtx.parents.clone(),
                    None => continue,
                };
                let created = !self.kahn_nodes.contains_key(&pid);
                let entry = self.kahn_nodes.entry(pid.clone()).or_insert_with(KahnNode::default);
                entry.in_degree += 1;
                if created {
                    stack.extend(grandparents);
                } else if entry.in_degree == 1 {
                    let _ = self.leaves.remove(&pid);
                }
            }
        }

        // Topological vote push.
        let mut tx_conflicts: HashMap<Id, HashSet<Id>> = HashMap::new();
        loop {
            let leaf = match self.leaves.iter().next().cloned() {
                Some(leaf) => leaf,
                None => break,
            };
            let _ = self.leaves.remove(&leaf);
            let leaf_votes = self.kahn_nodes.get(&leaf).map(|k| k.votes).unwrap_or_default();
            let vtx = match self.nodes.get(&leaf) {
                Some(vtx) => vtx.clone(),
                None => continue,
            };
            for tx in vtx.txs.iter() {
                if self.cg.status(&tx.id) == Some(Status::Processing) {
                    self.votes.union_set(tx.id.clone(), leaf_votes);
                    if !tx_conflicts.contains_key(&tx.id) {
                        let _ = tx_conflicts.insert(tx.id.clone(), self.cg.conflicts(&tx.id));
                    }
                }
            }
            if self.cg.status(&leaf) == Some(Status::Processing) {
                self.votes.union_set(leaf.clone(), leaf_votes);
                if !tx_conflicts.contains_key(&leaf) {
                    let _ = tx_conflicts.insert(leaf.clone(), self.cg.conflicts(&leaf));
                }
            }
            for pid in vtx.parents.iter() {
                if let Some(entry) = self.kahn_nodes.get_mut(pid) {
                    entry.votes.union(leaf_votes);
                    entry.in_degree -= 1;
                    if entry.in_degree == 0 {
                        let _ = self.leaves.insert(pid.clone());
                    }
                }
            }
        }

        // A vote for a conflicting transaction is not a vote for this one.
        // The subtraction reads the pre-subtraction sets, so its result does
        // not depend on iteration order.
        let mut filtered = Bag::new();
        for (id, set) in self.votes.iter() {
            let mut bits = *set;
            if let Some(conflicts) = tx_conflicts.get(id) {
                for c in conflicts.iter() {
                    bits.difference(self.votes.get_set(c));
                }
            }
            let count = bits.len();
            if count >= self.params.alpha {
                filtered.set_count(id.clone(), count as u64);
            }
        }
        filtered
    }

    // Frontier maintenance

    fn update_frontiers(&mut self) -> Result<()> {
        let vts: Vec<Vertex> = self.frontier.values().cloned().collect();
        self.frontier.clear();
        self.preferred.clear();
        self.virtuous.clear();
        self.preference_cache.clear();
        self.virtuous_cache.clear();
        self.orphans = self.cg.virtuous_voting().clone();
        for vtx in vts {
            self.update(vtx)?;
        }
        Ok(())
    }

    /// Revisits one vertex (and, through recursion, its ancestry) against the
    /// current conflict-graph state, rebuilding the frontier sets and resolving
    /// terminal states.
    fn update(&mut self, vtx: Vertex) -> Result<()> {
        let id = vtx.id.clone();
        if self.preference_cache.contains_key(&id) {
            return Ok(());
        }
        let _ = self.orphans.remove(&id);

        match self.decided.get(&id) {
            Some(Status::Accepted) => {
                let _ = self.preference_cache.insert(id.clone(), true);
                let _ = self.virtuous_cache.insert(id.clone(), true);
                let _ = self.frontier.insert(id.clone(), vtx);
                let _ = self.preferred.insert(id.clone());
                let _ = self.virtuous.insert(id);
                return Ok(());
            }
            Some(Status::Rejected) => {
                let _ = self.preference_cache.insert(id.clone(), false);
                let _ = self.virtuous_cache.insert(id, false);
                return Ok(());
            }
            _ => (),
        }

        // Local flags over the contained transactions and the
        // transaction-vertex.
        let mut acceptable = true;
        let mut rejectable = false;
        let mut preferred = true;
        let mut virtuous = true;
        let mut tx_ids = vtx.tx_ids();
        tx_ids.push(id.clone());
        for txid in tx_ids.iter() {
            match self.cg.status(txid) {
                Some(Status::Accepted) => (),
                Some(Status::Rejected) => {
                    rejectable = true;
                    acceptable = false;
                    preferred = false;
                    virtuous = false;
                }
                _ => {
                    acceptable = false;
                    if !self.cg.preferences().contains(txid) {
                        preferred = false;
                    }
                    if !self.cg.virtuous().contains(txid) {
                        virtuous = false;
                    }
                }
            }
        }

        let mut any_parent_rejected = false;
        let mut any_parent_processing = false;
        for pid in vtx.parents.iter() {
            if self.decided.get(pid) == Some(&Status::Accepted) {
                continue;
            }
            if self.decided.get(pid) == Some(&Status::Rejected) {
                any_parent_rejected = true;
                continue;
            }
            let parent = match self.nodes.get(pid) {
                Some(parent) => parent.clone(),
                None => return Err(Error::UnknownVertex(pid.clone())),
            };
            self.update(parent)?;
            match self.decided.get(pid) {
                Some(Status::Accepted) => continue,
                Some(Status::Rejected) => {
                    any_parent_rejected = true;
                    continue;
                }
                _ => any_parent_processing = true,
            }
            preferred &= self.preference_cache.get(pid).cloned().unwrap_or(false);
            virtuous &= self.virtuous_cache.get(pid).cloned().unwrap_or(false);
        }

        if any_parent_rejected {
            self.reject_vertex(&vtx)?;
            let _ = self.preference_cache.insert(id.clone(), false);
            let _ = self.virtuous_cache.insert(id, false);
            return Ok(());
        }
        if any_parent_processing {
            acceptable = false;
        }

        if !rejectable {
            for pid in vtx.parents.iter() {
                let _ = self.frontier.remove(pid);
            }
            let _ = self.frontier.insert(id.clone(), vtx.clone());
        }

        let _ = self.preference_cache.insert(id.clone(), preferred);
        let _ = self.virtuous_cache.insert(id.clone(), virtuous);

        if preferred {
            let _ = self.preferred.insert(id.clone());
            for pid in vtx.parents.iter() {
                let _ = self.preferred.remove(pid);
            }
            for tx in vtx.txs.iter() {
                if self.cg.status(&tx.id) != Some(Status::Accepted) {
                    let _ = self.orphans.remove(&tx.id);
                }
            }
        }
        if virtuous {
            let _ = self.virtuous.insert(id.clone());
            for pid in vtx.parents.iter() {
                let _ = self.virtuous.remove(pid);
            }
        } else {
            self.cg.drop_virtuous_voting(&id);
        }

        if acceptable {
            self.accept_vertex(&vtx)?;
        } else if rejectable {
            self.reject_vertex(&vtx)?;
        }
        Ok(())
    }

    /// Accepts a vertex. The durable store is notified before the vertex's own
    /// accept runs.
    fn accept_vertex(&mut self, vtx: &Vertex) -> Result<()> {
        self.store.accept(vtx)?;
        self.vm.accept_vertex(vtx)?;
        let _ = self.decided.insert(vtx.id.clone(), Status::Accepted);
        let _ = self.nodes.remove(&vtx.id);
        let _ = self.start_times.remove(&vtx.id);
        let _ = self.stop_whitelists.remove(&vtx.id);
        self.metrics.vertices_accepted += 1;
        info!("[{}] accepted {}", "avalanche".cyan(), vtx);
        Ok(())
    }

    fn reject_vertex(&mut self, vtx: &Vertex) -> Result<()> {
        if self.cg.status(&vtx.id) == Some(Status::Processing) {
            self.cg.remove(&vtx.id)?;
        }
        self.vm.reject_vertex(vtx)?;
        let _ = self.decided.insert(vtx.id.clone(), Status::Rejected);
        let _ = self.nodes.remove(&vtx.id);
        let _ = self.start_times.remove(&vtx.id);
        let _ = self.stop_whitelists.remove(&vtx.id);
        self.metrics.vertices_rejected += 1;
        info!("[{}] rejected {}", "avalanche".cyan(), vtx);
        Ok(())
    }

    fn is_vertex_id(&self, id: &Id) -> bool {
        self.nodes.contains_key(id) || self.decided.contains_key(id)
    }

    /// The conflict set of a transaction-vertex, derived from stop-vertex
    /// ancestry: a stop vertex conflicts with every processing vertex outside
    /// its ancestry, and a vertex outside a processing stop vertex's whitelist
    /// conflicts with that stop vertex.
    fn vertex_tx_conflicts(&mut self, vertex: &Vertex) -> HashSet<Id> {
        let mut conflicts = HashSet::new();
        if vertex.whitelist {
            let ancestry = self.ancestry(vertex);
            for vtx_id in self.nodes.keys() {
                if !ancestry.contains(vtx_id) {
                    let _ = conflicts.insert(vtx_id.clone());
                }
            }
            let _ = self.stop_whitelists.insert(vertex.id.clone(), ancestry);
        } else {
            for (stop_id, whitelist) in self.stop_whitelists.iter() {
                if !whitelist.contains(&vertex.id) {
                    let _ = conflicts.insert(stop_id.clone());
                }
            }
        }
        conflicts
    }

    /// The processing ancestry of a vertex, including itself.
    fn ancestry(&self, vertex: &Vertex) -> HashSet<Id> {
        let mut seen: HashSet<Id> = HashSet::new();
        let _ = seen.insert(vertex.id.clone());
        let mut stack: Vec<Id> = vertex.parents.clone();
        while let Some(pid) = stack.pop() {
            if !seen.insert(pid.clone()) {
                continue;
            }
            if let Some(parent) = self.nodes.get(&pid) {
                stack.extend(parent.parents.iter().cloned());
            }
        }
        seen
    }
}
