//! The actor shell around the topological engine
//!
//! [Avalanche] runs as an [Actor]: its mailbox is the serialized event loop the
//! engine relies on. Handlers translate inbound wire events (queries, chits,
//! vertex deliveries, fetch failures) into engine calls, gate not-yet-ready
//! vertices through the [issuer](super::issuer), and fan polls out to sampled
//! validators.

use super::issuer::{Blocker, Issuer};
use super::topological::Topological;
use super::vertex::Vertex;

use crate::collections::UniqueBag;
use crate::colored::Colorize;
use crate::engine::Health;
use crate::params::Parameters;
use crate::sampler::WeightedSampler;
use crate::sender::Sender;
use crate::settings::Settings;
use crate::zfx_id::{Id, NodeId};

use tracing::{debug, error, info, warn};

use actix::{Actor, Context, Handler};
use actix_derive::{Message, MessageResponse};

use std::collections::{HashMap, HashSet, VecDeque};

/// Ancestors served per `GetAncestors` request.
const MAX_ANCESTORS: usize = 2048;

/// One poll in flight.
struct OutstandingPoll {
    /// Sampled validators that have not answered, with their respondent index.
    pending: HashMap<NodeId, usize>,
    responses: UniqueBag,
}

pub struct Avalanche {
    engine: Topological,
    params: Parameters,
    settings: Settings,
    /// The weighted validator set polls are sampled from.
    committee: HashMap<NodeId, u64>,
    sender: Box<dyn Sender>,
    /// Vertices waiting for dependencies.
    blocker: Blocker,
    polls: HashMap<u32, OutstandingPoll>,
    /// Outstanding vertex fetches, keyed by request id.
    fetches: HashMap<u32, Id>,
    request_id: u32,
    /// Set when a chain-fatal error escaped the engine; all further admission
    /// is refused.
    errored: bool,
    stop_vertex_rejections: u64,
}

impl Avalanche {
    pub fn new(engine: Topological, params: Parameters, settings: Settings, sender: Box<dyn Sender>) -> Self {
        Avalanche {
            engine,
            params,
            settings,
            committee: HashMap::default(),
            sender,
            blocker: Blocker::new(),
            polls: HashMap::default(),
            fetches: HashMap::default(),
            request_id: 0,
            errored: false,
            stop_vertex_rejections: 0,
        }
    }

    /// Admits a vertex, gating it behind the issuer when parents are missing.
    /// `src` is the peer the vertex came from, used to fetch missing ancestry.
    fn issue(&mut self, vertex: Vertex, src: Option<NodeId>) -> crate::Result<()> {
        if self.errored {
            return Ok(());
        }
        if self.engine.status(&vertex.id).is_some() || self.blocker.contains(&vertex.id) {
            debug!("[{}] {} already seen", "avalanche".cyan(), vertex);
            return Ok(());
        }

        let missing: HashSet<Id> = vertex
            .parents
            .iter()
            .filter(|p| self.engine.status(p).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            if let Some(node) = src {
                for parent in missing.iter() {
                    self.request_id += 1;
                    let _ = self.fetches.insert(self.request_id, parent.clone());
                    self.sender.send_get(node.clone(), self.request_id, parent.clone());
                }
            }
            self.blocker.register(Issuer::new(vertex, missing, HashSet::new()));
            return Ok(());
        }

        self.deliver(vertex)
    }

    /// Verifies and admits a vertex whose dependencies are all met, then
    /// releases any issuers this admission unblocks.
    fn deliver(&mut self, vertex: Vertex) -> crate::Result<()> {
        let mut queue = VecDeque::new();
        queue.push_back(vertex);
        while let Some(vertex) = queue.pop_front() {
            if self.errored || self.engine.status(&vertex.id).is_some() {
                continue;
            }

            if let Err(e) = self.engine.vm_mut().verify_vertex(&vertex) {
                if vertex.whitelist {
                    // A failing stop vertex is counted, never escalated.
                    self.stop_vertex_rejections += 1;
                    warn!("[{}] stop vertex {} failed verification", "avalanche".cyan(), vertex);
                } else {
                    debug!("[{}] {} failed verification: {}", "avalanche".cyan(), vertex, e);
                }
                let _ = self.blocker.abandon(&vertex.id);
                continue;
            }

            let mut valid_txs = vec![];
            let mut dropped = 0usize;
            for tx in vertex.txs.iter() {
                match self.engine.vm_mut().verify_tx(tx) {
                    Ok(()) => valid_txs.push(tx.clone()),
                    Err(e) => {
                        debug!("[{}] dropping invalid {}: {}", "avalanche".cyan(), tx, e);
                        dropped += 1;
                    }
                }
            }
            if dropped > 0 {
                let _ = self.blocker.abandon(&vertex.id);
                if !valid_txs.is_empty() {
                    // Re-batch the valid remainder into a fresh admission.
                    let rebatched =
                        Vertex::new(vertex.parents.clone(), vertex.height, valid_txs, false);
                    info!(
                        "[{}] re-batching {} valid txs from {}",
                        "avalanche".cyan(),
                        rebatched.txs.len(),
                        vertex
                    );
                    queue.push_back(rebatched);
                }
                continue;
            }

            match self.engine.add(vertex.clone()) {
                Ok(()) => (),
                Err(e) => {
                    self.errored = true;
                    error!("[{}] chain-fatal: {}", "avalanche".cyan(), e);
                    return Err(e.into());
                }
            }
            self.issue_poll(Some(&vertex));

            for issuer in self.blocker.fulfill(&vertex.id) {
                queue.push_back(issuer.vertex);
            }
            for tx in vertex.txs.iter() {
                for issuer in self.blocker.fulfill(&tx.id) {
                    queue.push_back(issuer.vertex);
                }
            }
        }
        Ok(())
    }

    /// Fans a query out to a fresh sample of the committee: a push query
    /// carrying the vertex when one is given, a pull query on the preferred
    /// frontier otherwise.
    fn issue_poll(&mut self, vertex: Option<&Vertex>) {
        if self.polls.len() >= self.params.concurrent_polls {
            debug!("[{}] poll capacity reached", "avalanche".cyan());
            return;
        }
        let sampler = WeightedSampler::new(
            self.committee.iter().map(|(id, w)| (id.clone(), *w)).collect(),
        );
        let sampled = match sampler.sample(self.params.k) {
            Ok(sampled) => sampled,
            Err(e) => {
                // Transient; the next poll cycle retries.
                warn!("[{}] sampling failed: {}", "avalanche".cyan(), e);
                return;
            }
        };
        if sampled.is_empty() {
            return;
        }

        self.request_id += 1;
        let pending: HashMap<NodeId, usize> =
            sampled.iter().cloned().enumerate().map(|(i, node)| (node, i)).collect();
        let _ = self.polls.insert(
            self.request_id,
            OutstandingPoll { pending, responses: UniqueBag::new() },
        );

        match vertex {
            Some(vertex) => {
                self.sender.send_push_query(sampled, self.request_id, vertex.bytes.clone())
            }
            None => {
                let target = match self.engine.preferences().iter().next() {
                    Some(target) => target.clone(),
                    None => return,
                };
                self.sender.send_pull_query(sampled, self.request_id, target)
            }
        }
    }

    /// Issues a repoll when work remains and capacity allows.
    fn repoll(&mut self) {
        if self.engine.quiesce() {
            return;
        }
        self.issue_poll(None);
    }

    fn record_chits(&mut self, node: NodeId, request_id: u32, votes: Vec<Id>) -> crate::Result<()> {
        let finished = match self.polls.get_mut(&request_id) {
            Some(poll) => {
                match poll.pending.remove(&node) {
                    Some(index) => {
                        for id in votes {
                            poll.responses.add(id, index);
                        }
                    }
                    None => {
                        debug!(
                            "[{}] duplicate or unsolicited chits from {}",
                            "avalanche".cyan(),
                            node
                        );
                        return Ok(());
                    }
                }
                poll.pending.is_empty()
            }
            None => {
                debug!("[{}] late chits for request {}", "avalanche".cyan(), request_id);
                return Ok(());
            }
        };
        if finished {
            let poll = self.polls.remove(&request_id).unwrap();
            if let Err(e) = self.engine.record_poll(&poll.responses) {
                self.errored = true;
                error!("[{}] chain-fatal: {}", "avalanche".cyan(), e);
                return Err(e.into());
            }
            self.repoll();
        }
        Ok(())
    }

    /// The chits this node answers queries with: its preferred frontier.
    fn current_votes(&self) -> Vec<Id> {
        self.engine.preferences().iter().cloned().collect()
    }
}

impl Actor for Avalanche {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("started avalanche");
    }
}

/// Installs the weighted validator set polls are sampled from.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct LiveCommittee {
    pub validators: HashMap<NodeId, u64>,
}

impl Handler<LiveCommittee> for Avalanche {
    type Result = ();

    fn handle(&mut self, msg: LiveCommittee, _ctx: &mut Context<Self>) -> Self::Result {
        info!("[{}] committee of {} validators", "avalanche".cyan(), msg.validators.len());
        self.committee = msg.validators;
    }
}

/// Seeds the engine with the accepted frontier bootstrap produced.
#[derive(Debug, Clone, Message)]
#[rtype(result = "crate::Result<()>")]
pub struct InitializeFrontier {
    pub frontier: Vec<Vertex>,
}

impl Handler<InitializeFrontier> for Avalanche {
    type Result = crate::Result<()>;

    fn handle(&mut self, msg: InitializeFrontier, _ctx: &mut Context<Self>) -> Self::Result {
        self.engine.initialize(msg.frontier)?;
        Ok(())
    }
}

/// A locally built vertex entering consensus.
#[derive(Debug, Clone, Message)]
#[rtype(result = "crate::Result<()>")]
pub struct IssueVertex {
    pub vertex: Vertex,
}

impl Handler<IssueVertex> for Avalanche {
    type Result = crate::Result<()>;

    fn handle(&mut self, msg: IssueVertex, _ctx: &mut Context<Self>) -> Self::Result {
        self.issue(msg.vertex, None)
    }
}

/// A push query: the querying peer includes the vertex it is voting on.
#[derive(Debug, Clone, Message)]
#[rtype(result = "crate::Result<()>")]
pub struct PushQuery {
    pub node: NodeId,
    pub request_id: u32,
    pub vertex_bytes: Vec<u8>,
}

impl Handler<PushQuery> for Avalanche {
    type Result = crate::Result<()>;

    fn handle(&mut self, msg: PushQuery, _ctx: &mut Context<Self>) -> Self::Result {
        match self.engine.vm_mut().parse_vertex(&msg.vertex_bytes) {
            Ok(vertex) => self.issue(vertex, Some(msg.node.clone()))?,
            Err(e) => {
                let preview = hex::encode(&msg.vertex_bytes[..std::cmp::min(8, msg.vertex_bytes.len())]);
                debug!(
                    "[{}] malformed vertex {}.. from {}: {}",
                    "avalanche".cyan(),
                    preview,
                    msg.node,
                    e
                );
            }
        }
        let votes = self.current_votes();
        self.sender.send_chits(msg.node, msg.request_id, votes);
        Ok(())
    }
}

/// A pull query: the peer names a vertex id and expects chits.
#[derive(Debug, Clone, Message)]
#[rtype(result = "crate::Result<()>")]
pub struct PullQuery {
    pub node: NodeId,
    pub request_id: u32,
    pub vertex_id: Id,
}

impl Handler<PullQuery> for Avalanche {
    type Result = crate::Result<()>;

    fn handle(&mut self, msg: PullQuery, _ctx: &mut Context<Self>) -> Self::Result {
        if self.engine.status(&msg.vertex_id).is_none() && !self.blocker.contains(&msg.vertex_id) {
            self.request_id += 1;
            let _ = self.fetches.insert(self.request_id, msg.vertex_id.clone());
            self.sender.send_get(msg.node.clone(), self.request_id, msg.vertex_id.clone());
        }
        let votes = self.current_votes();
        self.sender.send_chits(msg.node, msg.request_id, votes);
        Ok(())
    }
}

/// Chits answering one of our queries.
#[derive(Debug, Clone, Message)]
#[rtype(result = "crate::Result<()>")]
pub struct Chits {
    pub node: NodeId,
    pub request_id: u32,
    pub votes: Vec<Id>,
}

impl Handler<Chits> for Avalanche {
    type Result = crate::Result<()>;

    fn handle(&mut self, msg: Chits, _ctx: &mut Context<Self>) -> Self::Result {
        self.record_chits(msg.node, msg.request_id, msg.votes)
    }
}

/// The network layer timed a query out; treated as an empty response.
#[derive(Debug, Clone, Message)]
#[rtype(result = "crate::Result<()>")]
pub struct QueryFailed {
    pub node: NodeId,
    pub request_id: u32,
}

impl Handler<QueryFailed> for Avalanche {
    type Result = crate::Result<()>;

    fn handle(&mut self, msg: QueryFailed, _ctx: &mut Context<Self>) -> Self::Result {
        self.record_chits(msg.node, msg.request_id, vec![])
    }
}

/// A vertex delivered in response to a `Get`.
#[derive(Debug, Clone, Message)]
#[rtype(result = "crate::Result<()>")]
pub struct Put {
    pub node: NodeId,
    pub request_id: u32,
    pub vertex_bytes: Vec<u8>,
}

impl Handler<Put> for Avalanche {
    type Result = crate::Result<()>;

    fn handle(&mut self, msg: Put, _ctx: &mut Context<Self>) -> Self::Result {
        let _ = self.fetches.remove(&msg.request_id);
        match self.engine.vm_mut().parse_vertex(&msg.vertex_bytes) {
            Ok(vertex) => self.issue(vertex, Some(msg.node)),
            Err(e) => {
                debug!("[{}] malformed vertex from {}: {}", "avalanche".cyan(), msg.node, e);
                Ok(())
            }
        }
    }
}

/// A `Get` went unanswered; everything waiting on that vertex is abandoned.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct GetFailed {
    pub node: NodeId,
    pub request_id: u32,
}

impl Handler<GetFailed> for Avalanche {
    type Result = ();

    fn handle(&mut self, msg: GetFailed, _ctx: &mut Context<Self>) -> Self::Result {
        if let Some(id) = self.fetches.remove(&msg.request_id) {
            let abandoned = self.blocker.abandon(&id);
            debug!(
                "[{}] fetch of {} failed, abandoned {} waiters",
                "avalanche".cyan(),
                id,
                abandoned.len()
            );
        }
    }
}

/// A peer requests a vertex we hold.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct Get {
    pub node: NodeId,
    pub request_id: u32,
    pub vertex_id: Id,
}

impl Handler<Get> for Avalanche {
    type Result = ();

    fn handle(&mut self, msg: Get, _ctx: &mut Context<Self>) -> Self::Result {
        match self.engine.vertex(&msg.vertex_id) {
            Some(vertex) => {
                let bytes = vertex.bytes.clone();
                self.sender.send_put(msg.node, msg.request_id, bytes);
            }
            None => debug!("[{}] {} not held, dropping get", "avalanche".cyan(), msg.vertex_id),
        }
    }
}

/// A peer requests the ancestry of a vertex, batched oldest-last.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct GetAncestors {
    pub node: NodeId,
    pub request_id: u32,
    pub vertex_id: Id,
}

impl Handler<GetAncestors> for Avalanche {
    type Result = ();

    fn handle(&mut self, msg: GetAncestors, _ctx: &mut Context<Self>) -> Self::Result {
        let mut containers = vec![];
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(msg.vertex_id.clone());
        while let Some(id) = queue.pop_front() {
            if containers.len() >= MAX_ANCESTORS || !seen.insert(id.clone()) {
                continue;
            }
            if let Some(vertex) = self.engine.vertex(&id) {
                containers.push(vertex.bytes.clone());
                queue.extend(vertex.parents.iter().cloned());
            }
        }
        self.sender.send_ancestors(msg.node, msg.request_id, containers);
    }
}

/// A peer requests our accepted frontier.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct GetAcceptedFrontier {
    pub node: NodeId,
    pub request_id: u32,
}

impl Handler<GetAcceptedFrontier> for Avalanche {
    type Result = ();

    fn handle(&mut self, msg: GetAcceptedFrontier, _ctx: &mut Context<Self>) -> Self::Result {
        let frontier = self.engine.frontier_ids();
        self.sender.send_accepted_frontier(msg.node, msg.request_id, frontier);
    }
}

/// Engine health, bounded by the configured limits.
#[derive(Debug, Clone, Message)]
#[rtype(result = "crate::Result<Health>")]
pub struct HealthCheck;

impl Handler<HealthCheck> for Avalanche {
    type Result = crate::Result<Health>;

    fn handle(&mut self, _msg: HealthCheck, _ctx: &mut Context<Self>) -> Self::Result {
        self.engine.vm_mut().health_check().map_err(crate::Error::Vm)?;
        let health = self.engine.health();
        if health.outstanding_vertices > self.settings.max_outstanding_items {
            return Err(crate::Error::HealthCheckFailed(format!(
                "{} outstanding vertices exceeds bound {}",
                health.outstanding_vertices, self.settings.max_outstanding_items
            )));
        }
        if health.longest_running_vertex_ms > self.settings.max_item_processing_time_ms {
            return Err(crate::Error::HealthCheckFailed(format!(
                "vertex processing for {}ms exceeds bound {}ms",
                health.longest_running_vertex_ms, self.settings.max_item_processing_time_ms
            )));
        }
        Ok(health)
    }
}

/// A snapshot of the engine's progress.
#[derive(Debug, Clone, Message)]
#[rtype(result = "StatusReport")]
pub struct GetStatus;

#[derive(Debug, Clone, MessageResponse)]
pub struct StatusReport {
    pub quiesce: bool,
    pub finalized: bool,
    pub outstanding_vertices: usize,
    pub pending_issuers: usize,
    pub stop_vertex_rejections: u64,
}

impl Handler<GetStatus> for Avalanche {
    type Result = StatusReport;

    fn handle(&mut self, _msg: GetStatus, _ctx: &mut Context<Self>) -> Self::Result {
        StatusReport {
            quiesce: self.engine.quiesce(),
            finalized: self.engine.finalized(),
            outstanding_vertices: self.engine.num_processing(),
            pending_issuers: self.blocker.pending(),
            stop_vertex_rejections: self.stop_vertex_rejections,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::sender::test_sender::{RecordingSender, Sent};
    use crate::snowstorm::{Status, Tx};
    use crate::vm::test_vm::{new_log, TestStore, TestVm};

    fn minimal_params() -> Parameters {
        Parameters { k: 1, alpha: 1, beta1: 1, beta2: 1, concurrent_polls: 1 }
    }

    fn shell() -> (Avalanche, RecordingSender, Vertex) {
        let params = minimal_params();
        let log = new_log();
        let vm = TestVm::new(log.clone());
        let store = TestStore { log };
        let mut engine = Topological::new(params, Box::new(vm), Box::new(store)).unwrap();
        let genesis = Vertex::new(vec![], 0, vec![], false);
        engine.initialize(vec![genesis.clone()]).unwrap();

        let sender = RecordingSender::new();
        let mut avalanche =
            Avalanche::new(engine, params, Settings::default(), Box::new(sender.clone()));
        let mut validators = HashMap::new();
        let _ = validators.insert(NodeId::filled(1), 10u64);
        avalanche.committee = validators;
        (avalanche, sender, genesis)
    }

    #[test]
    fn test_issue_polls_sampled_validator() {
        let (mut avalanche, sender, genesis) = shell();
        let vertex =
            Vertex::new(vec![genesis.id.clone()], 1, vec![Tx::virtuous(Id::one(), vec![])], false);
        avalanche.issue(vertex.clone(), None).unwrap();

        let sent = sender.sent.borrow();
        match &sent[0] {
            Sent::PushQuery { nodes, request_id, container } => {
                assert!(nodes.contains(&NodeId::filled(1)));
                assert_eq!(*request_id, 1);
                assert_eq!(*container, vertex.bytes);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_chits_complete_poll_and_accept() {
        let (mut avalanche, _sender, genesis) = shell();
        let tx = Tx::virtuous(Id::one(), vec![]);
        let vertex = Vertex::new(vec![genesis.id.clone()], 1, vec![tx], false);
        avalanche.issue(vertex.clone(), None).unwrap();

        avalanche
            .record_chits(NodeId::filled(1), 1, vec![vertex.id.clone()])
            .unwrap();
        assert_eq!(avalanche.engine.status(&vertex.id), Some(Status::Accepted));
        assert!(avalanche.engine.quiesce());
    }

    #[test]
    fn test_missing_parent_blocks_until_put() {
        let (mut avalanche, sender, genesis) = shell();
        let parent =
            Vertex::new(vec![genesis.id.clone()], 1, vec![Tx::virtuous(Id::one(), vec![])], false);
        let child =
            Vertex::new(vec![parent.id.clone()], 2, vec![Tx::virtuous(Id::two(), vec![])], false);

        let peer = NodeId::filled(7);
        avalanche.issue(child.clone(), Some(peer.clone())).unwrap();
        assert_eq!(avalanche.blocker.pending(), 1);
        assert!(avalanche.engine.status(&child.id).is_none());

        // The missing parent was requested from the peer
        {
            let sent = sender.sent.borrow();
            match &sent[0] {
                Sent::Get { node, id, .. } => {
                    assert_eq!(node, &peer);
                    assert_eq!(id, &parent.id);
                }
                other => panic!("unexpected: {:?}", other),
            }
        }

        // Delivering the parent releases the child
        avalanche.deliver(parent.clone()).unwrap();
        assert_eq!(avalanche.blocker.pending(), 0);
        assert_eq!(avalanche.engine.status(&child.id), Some(Status::Processing));
    }

    #[test]
    fn test_invalid_tx_rebatches_valid_remainder() {
        let (mut avalanche, _sender, genesis) = shell();
        let bad = Tx::virtuous(Id::filled(66), vec![]);
        let good = Tx::virtuous(Id::filled(67), vec![]);

        // Rebuild the shell's VM with a failing transaction
        let log = new_log();
        let mut vm = TestVm::new(log.clone());
        vm.invalid_txs = vec![bad.id.clone()];
        let store = TestStore { log };
        let mut engine =
            Topological::new(minimal_params(), Box::new(vm), Box::new(store)).unwrap();
        engine.initialize(vec![genesis.clone()]).unwrap();
        avalanche.engine = engine;

        let vertex =
            Vertex::new(vec![genesis.id.clone()], 1, vec![bad.clone(), good.clone()], false);
        avalanche.issue(vertex.clone(), None).unwrap();

        // The original vertex was dropped, the valid tx was re-batched
        assert!(avalanche.engine.status(&vertex.id).is_none());
        assert_eq!(avalanche.engine.tx_status(&good.id), Some(Status::Processing));
        assert_eq!(avalanche.engine.tx_status(&bad.id), None);
    }

    #[test]
    fn test_failing_stop_vertex_is_counted_not_escalated() {
        let (mut avalanche, _sender, genesis) = shell();
        let stop = Vertex::new(vec![genesis.id.clone()], 1, vec![], true);

        let log = new_log();
        let mut vm = TestVm::new(log.clone());
        vm.invalid_vertices = vec![stop.id.clone()];
        let store = TestStore { log };
        let mut engine =
            Topological::new(minimal_params(), Box::new(vm), Box::new(store)).unwrap();
        engine.initialize(vec![genesis.clone()]).unwrap();
        avalanche.engine = engine;

        avalanche.issue(stop.clone(), None).unwrap();
        assert_eq!(avalanche.stop_vertex_rejections, 1);
        assert!(avalanche.engine.status(&stop.id).is_none());
    }

    #[test]
    fn test_late_chits_dropped() {
        let (mut avalanche, _sender, genesis) = shell();
        let vertex =
            Vertex::new(vec![genesis.id.clone()], 1, vec![Tx::virtuous(Id::one(), vec![])], false);
        avalanche.issue(vertex.clone(), None).unwrap();

        // Wrong request id: silently dropped
        avalanche.record_chits(NodeId::filled(1), 99, vec![vertex.id.clone()]).unwrap();
        assert_eq!(avalanche.engine.status(&vertex.id), Some(Status::Processing));
    }

    #[actix_rt::test]
    async fn test_actor_round() {
        let (avalanche, sender, genesis) = shell();
        let addr = avalanche.start();

        let vertex =
            Vertex::new(vec![genesis.id.clone()], 1, vec![Tx::virtuous(Id::one(), vec![])], false);
        addr.send(IssueVertex { vertex: vertex.clone() }).await.unwrap().unwrap();
        addr.send(Chits {
            node: NodeId::filled(1),
            request_id: 1,
            votes: vec![vertex.id.clone()],
        })
        .await
        .unwrap()
        .unwrap();

        let status = addr.send(GetStatus).await.unwrap();
        assert!(status.finalized);
        assert!(status.quiesce);

        let peer = NodeId::filled(9);
        addr.send(GetAcceptedFrontier { node: peer.clone(), request_id: 5 }).await.unwrap();
        let sent = sender.sent.borrow();
        match sent.last().unwrap() {
            Sent::AcceptedFrontier { node, request_id, frontier } => {
                assert_eq!(node, &peer);
                assert_eq!(*request_id, 5);
                assert_eq!(frontier, &vec![vertex.id.clone()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
