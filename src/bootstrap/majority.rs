//! The majority poll and its dispatch loop

use super::{Error, Result};

use crate::colored::Colorize;
use crate::sender::Sender;
use crate::zfx_id::{Id, NodeId};

use tracing::{debug, info, warn};

use std::collections::{HashMap, HashSet, VecDeque};

/// Stake-weighted accept votes over candidate block ids.
///
/// Every peer starts in `pending_send`; up to `max_outstanding` requests are in
/// flight at a time. Vote weights accumulate in 128 bits, and the output is the
/// set of ids whose accumulated weight strictly exceeds half of the total.
/// Peers that time out count as zero votes: the host must synthesize an empty
/// opinion for them, otherwise the poll never finishes.
#[derive(Debug)]
pub struct MajorityPoll {
    weights: HashMap<NodeId, u64>,
    total_weight: u128,
    pending_send: VecDeque<NodeId>,
    pending_reply: HashSet<NodeId>,
    responded: HashSet<NodeId>,
    received: HashMap<Id, u128>,
    max_outstanding: usize,
}

impl MajorityPoll {
    pub fn new(peers: Vec<(NodeId, u64)>, max_outstanding: usize) -> Self {
        let total_weight = peers.iter().map(|(_, w)| *w as u128).sum();
        let pending_send = peers.iter().map(|(id, _)| id.clone()).collect();
        MajorityPoll {
            weights: peers.into_iter().collect(),
            total_weight,
            pending_send,
            pending_reply: HashSet::new(),
            responded: HashSet::new(),
            received: HashMap::default(),
            max_outstanding: std::cmp::max(max_outstanding, 1),
        }
    }

    /// Moves peers from `pending_send` into flight, up to the outstanding
    /// bound, and returns them for dispatch.
    pub fn next_batch(&mut self) -> Vec<NodeId> {
        let mut batch = vec![];
        while self.pending_reply.len() < self.max_outstanding {
            match self.pending_send.pop_front() {
                Some(peer) => {
                    let _ = self.pending_reply.insert(peer.clone());
                    batch.push(peer);
                }
                None => break,
            }
        }
        batch
    }

    /// Records one peer's set of accepted ids. Duplicate and unsolicited
    /// opinions are logged and dropped. A timeout is recorded as an empty set.
    pub fn record_opinion(&mut self, peer: &NodeId, accepted: HashSet<Id>) -> Result<()> {
        if !self.weights.contains_key(peer) {
            debug!("[{}] opinion from unknown peer {}", "bootstrap".blue(), peer);
            return Err(Error::UnknownPeer(peer.clone()));
        }
        if !self.pending_reply.remove(peer) {
            debug!("[{}] duplicate or unsolicited opinion from {}", "bootstrap".blue(), peer);
            return Ok(());
        }
        let _ = self.responded.insert(peer.clone());
        let weight = self.weights.get(peer).cloned().unwrap_or(0) as u128;
        for id in accepted {
            *self.received.entry(id).or_insert(0) += weight;
        }
        Ok(())
    }

    /// The number of peers still in flight or unsent.
    pub fn pending(&self) -> usize {
        self.pending_reply.len() + self.pending_send.len()
    }

    /// True once no replies are pending and none are left to send.
    pub fn finished(&self) -> bool {
        self.pending_reply.is_empty() && self.pending_send.is_empty()
    }

    /// The ids whose accumulated weight strictly exceeds half the total.
    pub fn result(&self) -> Result<Vec<Id>> {
        if !self.finished() {
            return Err(Error::PollUnfinished);
        }
        let required_weight = self.total_weight / 2 + 1;
        let mut accepted: Vec<Id> = self
            .received
            .iter()
            .filter(|(_, weight)| **weight >= required_weight)
            .map(|(id, _)| id.clone())
            .collect();
        accepted.sort();
        Ok(accepted)
    }
}

/// Drives a [MajorityPoll] over the wire.
///
/// The host feeds `accepted` / `failed` events back from the router; the
/// bootstrapper keeps the dispatch window full and reports the majority set
/// once every peer has answered or timed out.
pub struct Bootstrapper {
    poll: MajorityPoll,
    sender: Box<dyn Sender>,
    /// The candidate frontier put to the vote.
    candidates: Vec<Id>,
    request_id: u32,
    /// Request ids currently in flight per peer.
    outstanding: HashMap<NodeId, u32>,
}

impl Bootstrapper {
    pub fn new(
        peers: Vec<(NodeId, u64)>,
        candidates: Vec<Id>,
        max_outstanding: usize,
        sender: Box<dyn Sender>,
    ) -> Self {
        Bootstrapper {
            poll: MajorityPoll::new(peers, max_outstanding),
            sender,
            candidates,
            request_id: 0,
            outstanding: HashMap::default(),
        }
    }

    /// Dispatches the first window of requests.
    pub fn start(&mut self) {
        info!(
            "[{}] polling {} peers over {} candidate blocks",
            "bootstrap".blue(),
            self.poll.pending(),
            self.candidates.len()
        );
        self.dispatch();
    }

    /// A peer reported the subset of candidates it has accepted.
    pub fn accepted(&mut self, peer: NodeId, request_id: u32, ids: HashSet<Id>) -> Result<()> {
        if self.outstanding.get(&peer) != Some(&request_id) {
            debug!("[{}] late reply from {}", "bootstrap".blue(), peer);
            return Ok(());
        }
        let _ = self.outstanding.remove(&peer);
        match self.poll.record_opinion(&peer, ids) {
            Ok(()) => (),
            Err(Error::UnknownPeer(_)) => (),
            Err(e) => return Err(e),
        }
        self.dispatch();
        Ok(())
    }

    /// The request to a peer timed out; it counts as zero votes.
    pub fn failed(&mut self, peer: NodeId, request_id: u32) -> Result<()> {
        if self.outstanding.get(&peer) != Some(&request_id) {
            return Ok(());
        }
        warn!("[{}] no answer from {}", "bootstrap".blue(), peer);
        self.accepted(peer, request_id, HashSet::new())
    }

    pub fn finished(&self) -> bool {
        self.poll.finished()
    }

    /// The >½-stake subset, available once the poll finished.
    pub fn result(&self) -> Result<Vec<Id>> {
        self.poll.result()
    }

    fn dispatch(&mut self) {
        for peer in self.poll.next_batch() {
            self.request_id += 1;
            let _ = self.outstanding.insert(peer.clone(), self.request_id);
            let mut nodes = HashSet::new();
            let _ = nodes.insert(peer);
            self.sender.send_get_accepted(nodes, self.request_id, self.candidates.clone());
        }
    }
}
