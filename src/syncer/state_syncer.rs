//! The state-sync protocol state machine

use super::{Error, Result};

use crate::colored::Colorize;
use crate::engine::State;
use crate::sampler::WeightedSampler;
use crate::sender::Sender;
use crate::tracker::Tracker;
use crate::vm::{self, ChainSyncVm, Summary, SummaryMode};
use crate::zfx_id::{Id, NodeId};

use tracing::{debug, info, warn};

use std::collections::{HashMap, HashSet};

/// A candidate summary and the stake vouching for it.
#[derive(Debug, Clone)]
pub struct WeightedSummary {
    pub summary: Summary,
    pub weight: u64,
}

/// Where an attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the startup gate.
    Pending,
    /// Gathering summary frontiers from sampled seeders.
    Frontier,
    /// Gathering votes from the full beacon set.
    Voting,
    /// The VM is applying the chosen summary.
    Syncing,
    Done,
}

/// What the caller should do after feeding the syncer an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Not enough connected stake yet; call `start` again later.
    Waiting,
    /// The protocol is in flight; keep feeding events.
    Continue,
    /// Insufficient quorum; a fresh attempt was started.
    Restarted,
    /// State sync is over; begin bootstrapping.
    HandOffToBootstrap,
}

/// The two-phase state-sync protocol.
///
/// Driven entirely by events from the router: responses, synthesized failures
/// and the VM's sync-done notification. The syncer never blocks; every entry
/// point returns a [Step] telling the host how to proceed.
pub struct StateSyncer {
    beacons: HashMap<NodeId, u64>,
    total_beacon_stake: u128,
    /// Stake threshold a summary must reach to be syncable.
    alpha: u64,
    /// Beacons sampled for the frontier phase.
    k: usize,
    retry: bool,
    warn_frequency: u64,

    vm: Box<dyn ChainSyncVm>,
    sender: Box<dyn Sender>,
    tracker: Tracker,

    phase: Phase,
    request_id: u32,
    attempts: u64,

    frontier_seeders: HashSet<NodeId>,
    pending_seeders: HashSet<NodeId>,
    failed_seeders: HashSet<NodeId>,
    weighted_summaries: HashMap<Id, WeightedSummary>,
    heights: HashSet<u64>,

    pending_voters: HashSet<NodeId>,
    failed_voters: HashSet<NodeId>,

    /// A sync that was already in progress locally; preferred on selection so
    /// the node resumes instead of starting over.
    local_summary: Option<Summary>,
}

impl StateSyncer {
    pub fn new(
        beacons: Vec<(NodeId, u64)>,
        alpha: u64,
        k: usize,
        retry: bool,
        warn_frequency: u64,
        vm: Box<dyn ChainSyncVm>,
        sender: Box<dyn Sender>,
        tracker: Tracker,
    ) -> Self {
        let total_beacon_stake = beacons.iter().map(|(_, w)| *w as u128).sum();
        StateSyncer {
            beacons: beacons.into_iter().collect(),
            total_beacon_stake,
            alpha,
            k,
            retry,
            warn_frequency: std::cmp::max(warn_frequency, 1),
            vm,
            sender,
            tracker,
            phase: Phase::Pending,
            request_id: 0,
            attempts: 0,
            frontier_seeders: HashSet::new(),
            pending_seeders: HashSet::new(),
            failed_seeders: HashSet::new(),
            weighted_summaries: HashMap::default(),
            heights: HashSet::new(),
            pending_voters: HashSet::new(),
            failed_voters: HashSet::new(),
            local_summary: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Begins an attempt. A noop returning [Step::Waiting] until the startup
    /// gate opens.
    pub fn start(&mut self) -> Result<Step> {
        if !self.tracker.should_start() {
            debug!("[{}] waiting for startup stake", "syncer".yellow());
            return Ok(Step::Waiting);
        }
        self.attempts += 1;
        if self.attempts > 1 && self.attempts % self.warn_frequency == 0 {
            warn!(
                "[{}] state sync attempt {} still without quorum, check your network connectivity",
                "syncer".yellow(),
                self.attempts
            );
        }
        self.vm.set_state(State::StateSyncing)?;

        match self.vm.state_sync_enabled() {
            Ok(true) => (),
            Ok(false) => return self.hand_off("state sync disabled by the VM"),
            Err(vm::Error::NotImplemented) => {
                return self.hand_off("state sync not implemented by the VM")
            }
            Err(e) => return Err(e.into()),
        }
        if self.beacons.is_empty() {
            return self.hand_off("no beacons");
        }

        self.local_summary = match self.vm.get_ongoing_sync_state_summary() {
            Ok(summary) => Some(summary),
            Err(vm::Error::NotFound) | Err(vm::Error::NotImplemented) => None,
            Err(e) => return Err(e.into()),
        };

        // Phase 1: sample seeders and ask for their frontiers.
        self.frontier_seeders.clear();
        self.pending_seeders.clear();
        self.failed_seeders.clear();
        self.weighted_summaries.clear();
        self.heights.clear();

        if let Some(local) = self.local_summary.clone() {
            let _ = self.heights.insert(local.height);
            let _ = self
                .weighted_summaries
                .insert(local.id.clone(), WeightedSummary { summary: local, weight: 0 });
        }

        let sampler =
            WeightedSampler::new(self.beacons.iter().map(|(id, w)| (id.clone(), *w)).collect());
        let sampled = sampler.sample(self.k).map_err(Error::Sampler)?;
        if sampled.is_empty() {
            return self.hand_off("no beacon stake to sample");
        }
        self.frontier_seeders = sampled.clone();
        self.pending_seeders = sampled.clone();
        self.request_id += 1;
        self.phase = Phase::Frontier;
        info!(
            "[{}] attempt {}: asking {} seeders for their summary frontier",
            "syncer".yellow(),
            self.attempts,
            sampled.len()
        );
        self.sender.send_get_state_summary_frontier(sampled, self.request_id);
        Ok(Step::Continue)
    }

    /// A seeder answered with its latest summary.
    pub fn state_summary_frontier(
        &mut self,
        node: NodeId,
        request_id: u32,
        summary_bytes: &[u8],
    ) -> Result<Step> {
        if self.phase != Phase::Frontier || request_id != self.request_id {
            debug!("[{}] late frontier reply from {}", "syncer".yellow(), node);
            return Ok(Step::Continue);
        }
        if !self.pending_seeders.remove(&node) {
            debug!("[{}] unsolicited frontier reply from {}", "syncer".yellow(), node);
            return Ok(Step::Continue);
        }
        match self.vm.parse_state_summary(summary_bytes) {
            Ok(summary) => {
                let _ = self.heights.insert(summary.height);
                let _ = self
                    .weighted_summaries
                    .entry(summary.id.clone())
                    .or_insert(WeightedSummary { summary, weight: 0 });
            }
            Err(e) => {
                debug!("[{}] malformed summary from {}: {}", "syncer".yellow(), node, e);
                let _ = self.failed_seeders.insert(node);
            }
        }
        self.maybe_end_frontier_phase()
    }

    /// A frontier request timed out.
    pub fn get_state_summary_frontier_failed(
        &mut self,
        node: NodeId,
        request_id: u32,
    ) -> Result<Step> {
        if self.phase != Phase::Frontier || request_id != self.request_id {
            return Ok(Step::Continue);
        }
        if self.pending_seeders.remove(&node) {
            let _ = self.failed_seeders.insert(node);
        }
        self.maybe_end_frontier_phase()
    }

    /// A beacon voted on the summaries it has accepted.
    pub fn accepted_state_summary(
        &mut self,
        node: NodeId,
        request_id: u32,
        summary_ids: Vec<Id>,
    ) -> Result<Step> {
        if self.phase != Phase::Voting || request_id != self.request_id {
            debug!("[{}] late vote from {}", "syncer".yellow(), node);
            return Ok(Step::Continue);
        }
        if !self.pending_voters.remove(&node) {
            debug!("[{}] unsolicited vote from {}", "syncer".yellow(), node);
            return Ok(Step::Continue);
        }
        let weight = self.beacons.get(&node).cloned().unwrap_or(0);
        for id in summary_ids {
            if let Some(ws) = self.weighted_summaries.get_mut(&id) {
                ws.weight = ws.weight.saturating_add(weight);
            }
        }
        self.maybe_select_summary()
    }

    /// A vote request timed out; an empty vote.
    pub fn get_accepted_state_summary_failed(
        &mut self,
        node: NodeId,
        request_id: u32,
    ) -> Result<Step> {
        if self.phase != Phase::Voting || request_id != self.request_id {
            return Ok(Step::Continue);
        }
        if self.pending_voters.remove(&node) {
            let _ = self.failed_voters.insert(node);
        }
        self.maybe_select_summary()
    }

    /// The VM finished applying the summary.
    pub fn state_sync_done(&mut self) -> Result<Step> {
        if self.phase != Phase::Syncing {
            debug!("[{}] unexpected sync-done notification", "syncer".yellow());
            return Ok(Step::Continue);
        }
        self.hand_off("state sync complete")
    }

    fn maybe_end_frontier_phase(&mut self) -> Result<Step> {
        if !self.pending_seeders.is_empty() {
            return Ok(Step::Continue);
        }
        let seeders_stake = self.stake_of(&self.frontier_seeders);
        let failed_stake = self.stake_of(&self.failed_seeders);
        let frontier_alpha = seeders_stake * self.alpha as u128 / self.total_beacon_stake;
        let frontier_stake = seeders_stake - failed_stake;
        if frontier_stake < frontier_alpha {
            info!(
                "[{}] frontier stake {} below threshold {}",
                "syncer".yellow(),
                frontier_stake,
                frontier_alpha
            );
            if self.retry {
                return self.restart();
            }
        }
        self.start_vote_phase()
    }

    fn start_vote_phase(&mut self) -> Result<Step> {
        self.request_id += 1;
        self.pending_voters = self.beacons.keys().cloned().collect();
        self.failed_voters.clear();
        let mut heights: Vec<u64> = self.heights.iter().cloned().collect();
        heights.sort();
        self.phase = Phase::Voting;
        info!(
            "[{}] putting {} summaries at {} heights to the vote",
            "syncer".yellow(),
            self.weighted_summaries.len(),
            heights.len()
        );
        let voters: HashSet<NodeId> = self.beacons.keys().cloned().collect();
        self.sender.send_get_accepted_state_summary(voters, self.request_id, heights);
        Ok(Step::Continue)
    }

    fn maybe_select_summary(&mut self) -> Result<Step> {
        if !self.pending_voters.is_empty() {
            return Ok(Step::Continue);
        }

        let survivors: Vec<&WeightedSummary> = self
            .weighted_summaries
            .values()
            .filter(|ws| ws.weight as u128 >= self.alpha as u128)
            .collect();

        if survivors.is_empty() {
            let failed_stake = self.stake_of(&self.failed_voters);
            if self.total_beacon_stake - failed_stake < self.alpha as u128 && self.retry {
                info!("[{}] too many failed voters, retrying", "syncer".yellow());
                return self.restart();
            }
            return self.hand_off("no summary reached the stake threshold");
        }

        // Resume the locally ongoing sync when it is still viable; otherwise
        // the highest height wins, ties broken by smallest id.
        let chosen = {
            let local = self.local_summary.as_ref().and_then(|local| {
                survivors.iter().find(|ws| ws.summary.id == local.id).cloned()
            });
            match local {
                Some(ws) => ws.summary.clone(),
                None => {
                    let mut best: Option<&WeightedSummary> = None;
                    for &ws in survivors.iter() {
                        best = match best {
                            None => Some(ws),
                            Some(b)
                                if ws.summary.height > b.summary.height
                                    || (ws.summary.height == b.summary.height
                                        && ws.summary.id < b.summary.id) =>
                            {
                                Some(ws)
                            }
                            Some(b) => Some(b),
                        };
                    }
                    best.map(|ws| ws.summary.clone()).unwrap()
                }
            }
        };

        info!(
            "[{}] syncing to summary {} at height {}",
            "syncer".yellow(),
            chosen.id,
            chosen.height
        );
        match self.vm.accept_summary(&chosen)? {
            SummaryMode::Skipped => self.hand_off("VM skipped the summary"),
            SummaryMode::Dynamic => {
                // The VM syncs in the background; bootstrap proceeds now.
                self.hand_off("VM syncing dynamically")
            }
            SummaryMode::Static => {
                self.phase = Phase::Syncing;
                Ok(Step::Continue)
            }
        }
    }

    fn restart(&mut self) -> Result<Step> {
        self.phase = Phase::Pending;
        match self.start()? {
            Step::HandOffToBootstrap => Ok(Step::HandOffToBootstrap),
            _ => Ok(Step::Restarted),
        }
    }

    fn hand_off(&mut self, reason: &str) -> Result<Step> {
        info!("[{}] handing off to bootstrap: {}", "syncer".yellow(), reason);
        self.phase = Phase::Done;
        Ok(Step::HandOffToBootstrap)
    }

    fn stake_of(&self, nodes: &HashSet<NodeId>) -> u128 {
        nodes.iter().map(|n| self.beacons.get(n).cloned().unwrap_or(0) as u128).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::message::Version;
    use crate::sender::test_sender::{RecordingSender, Sent};
    use crate::vm::test_vm::TestSyncVm;

    use std::cell::RefCell;
    use std::rc::Rc;

    fn node(b: u8) -> NodeId {
        NodeId::filled(b)
    }

    fn open_tracker() -> Tracker {
        let tracker = Tracker::new(1);
        tracker.on_validator_added(node(1), 10);
        tracker.connected(node(1), Version::current());
        tracker
    }

    struct Setup {
        syncer: StateSyncer,
        sender: RecordingSender,
        accepted: Rc<RefCell<Vec<Id>>>,
        states: Rc<RefCell<Vec<State>>>,
    }

    fn setup(beacons: Vec<(NodeId, u64)>, alpha: u64, vm: TestSyncVm) -> Setup {
        let sender = RecordingSender::new();
        let accepted = vm.accepted.clone();
        let states = vm.states.clone();
        let k = beacons.len();
        let syncer = StateSyncer::new(
            beacons,
            alpha,
            k,
            true,
            50,
            Box::new(vm),
            Box::new(sender.clone()),
            open_tracker(),
        );
        Setup { syncer, sender, accepted, states }
    }

    fn summary(height: u64, tag: u8) -> Summary {
        Summary::new(height, vec![tag; 8])
    }

    fn frontier_request(sender: &RecordingSender) -> (Vec<NodeId>, u32) {
        let sent = sender.sent.borrow();
        match sent.last().unwrap() {
            Sent::GetStateSummaryFrontier { nodes, request_id } => {
                (nodes.iter().cloned().collect(), *request_id)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    fn vote_request(sender: &RecordingSender) -> (Vec<NodeId>, u32, Vec<u64>) {
        let sent = sender.sent.borrow();
        match sent.last().unwrap() {
            Sent::GetAcceptedStateSummary { nodes, request_id, heights } => {
                (nodes.iter().cloned().collect(), *request_id, heights.clone())
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_waits_for_startup_gate() {
        let sender = RecordingSender::new();
        let vm = TestSyncVm::new();
        let mut syncer = StateSyncer::new(
            vec![(node(1), 10)],
            5,
            1,
            true,
            50,
            Box::new(vm),
            Box::new(sender.clone()),
            Tracker::new(100),
        );
        assert_eq!(syncer.start().unwrap(), Step::Waiting);
        assert_eq!(syncer.phase(), Phase::Pending);
        assert!(sender.sent.borrow().is_empty());
    }

    #[test]
    fn test_empty_beacons_hand_off() {
        let mut setup = setup(vec![], 1, TestSyncVm::new());
        assert_eq!(setup.syncer.start().unwrap(), Step::HandOffToBootstrap);
        assert_eq!(setup.states.borrow().as_slice(), &[State::StateSyncing]);
    }

    #[test]
    fn test_disabled_vm_hands_off() {
        let mut vm = TestSyncVm::new();
        vm.enabled = false;
        let mut setup = setup(vec![(node(1), 10)], 5, vm);
        assert_eq!(setup.syncer.start().unwrap(), Step::HandOffToBootstrap);
    }

    #[test]
    fn test_selection_picks_highest_height() {
        // Beacons A:50 reporting s1@10, B:50 reporting s2@12, alpha = 50
        let s1 = summary(10, 1);
        let s2 = summary(12, 2);
        let mut setup = setup(vec![(node(1), 50), (node(2), 50)], 50, TestSyncVm::new());
        assert_eq!(setup.syncer.start().unwrap(), Step::Continue);

        let (seeders, req) = frontier_request(&setup.sender);
        assert_eq!(seeders.len(), 2);
        setup
            .syncer
            .state_summary_frontier(node(1), req, &bincode::serialize(&s1).unwrap())
            .unwrap();
        let step = setup
            .syncer
            .state_summary_frontier(node(2), req, &bincode::serialize(&s2).unwrap())
            .unwrap();
        assert_eq!(step, Step::Continue);
        assert_eq!(setup.syncer.phase(), Phase::Voting);

        let (voters, vote_req, heights) = vote_request(&setup.sender);
        assert_eq!(voters.len(), 2);
        assert_eq!(heights, vec![10, 12]);

        // Each beacon vouches for the summary it reported
        setup.syncer.accepted_state_summary(node(1), vote_req, vec![s1.id.clone()]).unwrap();
        let step = setup
            .syncer
            .accepted_state_summary(node(2), vote_req, vec![s2.id.clone()])
            .unwrap();

        // Both survive at alpha = 50; the higher summary wins
        assert_eq!(step, Step::Continue);
        assert_eq!(setup.syncer.phase(), Phase::Syncing);
        assert_eq!(setup.accepted.borrow().as_slice(), &[s2.id.clone()]);

        assert_eq!(setup.syncer.state_sync_done().unwrap(), Step::HandOffToBootstrap);
    }

    #[test]
    fn test_split_vote_below_alpha_hands_off() {
        // Same split but alpha = 51: both summaries drop, no retry triggers
        // because the beacons did answer
        let s1 = summary(10, 1);
        let s2 = summary(12, 2);
        let mut setup = setup(vec![(node(1), 50), (node(2), 50)], 51, TestSyncVm::new());
        let _ = setup.syncer.start().unwrap();

        let (_, req) = frontier_request(&setup.sender);
        setup
            .syncer
            .state_summary_frontier(node(1), req, &bincode::serialize(&s1).unwrap())
            .unwrap();
        setup
            .syncer
            .state_summary_frontier(node(2), req, &bincode::serialize(&s2).unwrap())
            .unwrap();

        let (_, vote_req, _) = vote_request(&setup.sender);
        setup.syncer.accepted_state_summary(node(1), vote_req, vec![s1.id.clone()]).unwrap();
        let step = setup
            .syncer
            .accepted_state_summary(node(2), vote_req, vec![s2.id.clone()])
            .unwrap();

        assert_eq!(step, Step::HandOffToBootstrap);
        assert!(setup.accepted.borrow().is_empty());
    }

    #[test]
    fn test_failed_voters_trigger_restart() {
        let s1 = summary(10, 1);
        let mut setup = setup(vec![(node(1), 50), (node(2), 50)], 60, TestSyncVm::new());
        let _ = setup.syncer.start().unwrap();

        let (_, req) = frontier_request(&setup.sender);
        setup
            .syncer
            .state_summary_frontier(node(1), req, &bincode::serialize(&s1).unwrap())
            .unwrap();
        setup
            .syncer
            .state_summary_frontier(node(2), req, &bincode::serialize(&s1).unwrap())
            .unwrap();

        let (_, vote_req, _) = vote_request(&setup.sender);
        setup.syncer.accepted_state_summary(node(1), vote_req, vec![s1.id.clone()]).unwrap();
        // The second voter times out: 100 - 50 = 50 < alpha = 60 and s1 only
        // gathered 50, so the whole attempt restarts
        let step =
            setup.syncer.get_accepted_state_summary_failed(node(2), vote_req).unwrap();
        assert_eq!(step, Step::Restarted);
        assert_eq!(setup.syncer.attempts(), 2);
        assert_eq!(setup.syncer.phase(), Phase::Frontier);
    }

    #[test]
    fn test_frontier_failures_trigger_restart() {
        let mut setup = setup(vec![(node(1), 50), (node(2), 50)], 60, TestSyncVm::new());
        let _ = setup.syncer.start().unwrap();

        let (_, req) = frontier_request(&setup.sender);
        setup.syncer.get_state_summary_frontier_failed(node(1), req).unwrap();
        let step = setup.syncer.get_state_summary_frontier_failed(node(2), req).unwrap();
        assert_eq!(step, Step::Restarted);
        assert_eq!(setup.syncer.attempts(), 2);
    }

    #[test]
    fn test_ongoing_local_sync_resumes() {
        let local = summary(8, 9);
        let s2 = summary(12, 2);
        let mut vm = TestSyncVm::new();
        vm.ongoing = Some(local.clone());
        let mut setup = setup(vec![(node(1), 50), (node(2), 50)], 50, vm);
        let _ = setup.syncer.start().unwrap();

        let (_, req) = frontier_request(&setup.sender);
        setup
            .syncer
            .state_summary_frontier(node(1), req, &bincode::serialize(&s2).unwrap())
            .unwrap();
        setup
            .syncer
            .state_summary_frontier(node(2), req, &bincode::serialize(&s2).unwrap())
            .unwrap();

        // Both beacons vouch for the local summary as well as the higher one
        let (_, vote_req, heights) = vote_request(&setup.sender);
        assert_eq!(heights, vec![8, 12]);
        setup
            .syncer
            .accepted_state_summary(node(1), vote_req, vec![local.id.clone(), s2.id.clone()])
            .unwrap();
        setup
            .syncer
            .accepted_state_summary(node(2), vote_req, vec![local.id.clone(), s2.id.clone()])
            .unwrap();

        // The resumable summary wins despite the lower height
        assert_eq!(setup.accepted.borrow().as_slice(), &[local.id.clone()]);
    }

    #[test]
    fn test_late_and_unsolicited_replies_dropped() {
        let s1 = summary(10, 1);
        let mut setup = setup(vec![(node(1), 50), (node(2), 50)], 50, TestSyncVm::new());
        let _ = setup.syncer.start().unwrap();
        let (_, req) = frontier_request(&setup.sender);

        // Wrong request id
        let step = setup
            .syncer
            .state_summary_frontier(node(1), req + 7, &bincode::serialize(&s1).unwrap())
            .unwrap();
        assert_eq!(step, Step::Continue);
        assert_eq!(setup.syncer.phase(), Phase::Frontier);

        // Unknown node
        let step = setup
            .syncer
            .state_summary_frontier(node(9), req, &bincode::serialize(&s1).unwrap())
            .unwrap();
        assert_eq!(step, Step::Continue);
        assert_eq!(setup.syncer.phase(), Phase::Frontier);
    }
}
