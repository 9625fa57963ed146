use crate::avalanche::{Topological, Vertex};
use crate::bootstrap::Bootstrapper;
use crate::collections::UniqueBag;
use crate::message::Version;
use crate::params::Parameters;
use crate::sender::test_sender::{RecordingSender, Sent};
use crate::settings::Settings;
use crate::snowstorm::{Status, Tx};
use crate::syncer::{StateSyncer, Step};
use crate::tracker::Tracker;
use crate::vm::test_vm::{new_log, TestStore, TestSyncVm, TestVm};
use crate::vm::Summary;
use crate::zfx_id::{Id, NodeId};

use std::collections::HashSet;

fn node(b: u8) -> NodeId {
    NodeId::filled(b)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// The full path a node walks from cold start to its first accepted vertex:
/// the gate latches, state sync picks a summary, bootstrap finds the majority
/// frontier, and the DAG engine finalises a vertex built on it.
#[test]
fn test_cold_start_to_first_accept() {
    init_tracing();
    let settings = Settings {
        k: 2,
        alpha: 2,
        beta1: 1,
        beta2: 1,
        concurrent_polls: 1,
        startup_weight: 100,
        ..Settings::default()
    };
    let beacons = vec![(node(1), 60u64), (node(2), 60u64)];

    // Connect enough stake to open the gate.
    let tracker = Tracker::new(settings.startup_weight);
    for (id, weight) in beacons.iter() {
        tracker.on_validator_added(id.clone(), *weight);
    }
    tracker.connected(node(1), Version::current());
    assert!(!tracker.should_start());
    tracker.connected(node(2), Version::current());
    assert!(tracker.should_start());

    // State sync: both beacons report and vouch for the same summary.
    let summary = Summary::new(42, vec![7; 16]);
    let sync_vm = TestSyncVm::new();
    let accepted_summaries = sync_vm.accepted.clone();
    let sender = RecordingSender::new();
    let mut syncer = StateSyncer::new(
        beacons.clone(),
        60,
        settings.k,
        settings.retry_bootstrap,
        settings.retry_bootstrap_warn_frequency,
        Box::new(sync_vm),
        Box::new(sender.clone()),
        tracker.clone(),
    );
    assert_eq!(syncer.start().unwrap(), Step::Continue);

    let frontier_req = match sender.sent.borrow().last().unwrap() {
        Sent::GetStateSummaryFrontier { request_id, .. } => *request_id,
        other => panic!("unexpected: {:?}", other),
    };
    let encoded = bincode::serialize(&summary).unwrap();
    syncer.state_summary_frontier(node(1), frontier_req, &encoded).unwrap();
    syncer.state_summary_frontier(node(2), frontier_req, &encoded).unwrap();

    let vote_req = match sender.sent.borrow().last().unwrap() {
        Sent::GetAcceptedStateSummary { request_id, .. } => *request_id,
        other => panic!("unexpected: {:?}", other),
    };
    syncer.accepted_state_summary(node(1), vote_req, vec![summary.id.clone()]).unwrap();
    let step = syncer.accepted_state_summary(node(2), vote_req, vec![summary.id.clone()]).unwrap();
    assert_eq!(step, Step::Continue);
    let step = syncer.state_sync_done().unwrap();
    assert_eq!(step, Step::HandOffToBootstrap);
    assert_eq!(accepted_summaries.borrow().as_slice(), &[summary.id.clone()]);

    // Bootstrap: both peers vouch for the same frontier block.
    let genesis = Vertex::new(vec![], 0, vec![], false);
    let boot_sender = RecordingSender::new();
    let mut bootstrapper = Bootstrapper::new(
        beacons.clone(),
        vec![genesis.id.clone()],
        settings.max_outstanding_broadcast_requests,
        Box::new(boot_sender.clone()),
    );
    bootstrapper.start();
    let requests: Vec<(NodeId, u32)> = boot_sender
        .sent
        .borrow()
        .iter()
        .map(|s| match s {
            Sent::GetAccepted { nodes, request_id, .. } => {
                (nodes.iter().next().cloned().unwrap(), *request_id)
            }
            other => panic!("unexpected: {:?}", other),
        })
        .collect();
    for (peer, request_id) in requests {
        let mut accepted = HashSet::new();
        let _ = accepted.insert(genesis.id.clone());
        bootstrapper.accepted(peer, request_id, accepted).unwrap();
    }
    assert!(bootstrapper.finished());
    assert_eq!(bootstrapper.result().unwrap(), vec![genesis.id.clone()]);

    // Normal operation: the engine starts from the bootstrapped frontier and
    // accepts its first vertex after one unanimous poll.
    let params = Parameters {
        k: settings.k,
        alpha: settings.alpha,
        beta1: settings.beta1,
        beta2: settings.beta2,
        concurrent_polls: settings.concurrent_polls,
    };
    let log = new_log();
    let vm = TestVm::new(log.clone());
    let store = TestStore { log: log.clone() };
    let mut engine = Topological::new(params, Box::new(vm), Box::new(store)).unwrap();
    engine.initialize(vec![genesis.clone()]).unwrap();

    let tx = Tx::virtuous(Id::filled(200), vec![]);
    let vertex = Vertex::new(vec![genesis.id.clone()], 1, vec![tx.clone()], false);
    engine.add(vertex.clone()).unwrap();

    let mut votes = UniqueBag::new();
    votes.add(vertex.id.clone(), 0);
    votes.add(vertex.id.clone(), 1);
    engine.record_poll(&votes).unwrap();

    assert_eq!(engine.status(&vertex.id), Some(Status::Accepted));
    assert_eq!(engine.tx_status(&tx.id), Some(Status::Accepted));
    assert!(engine.quiesce());

    // The durable store saw the vertex before the VM did.
    let log = log.borrow();
    let store_at = log.iter().position(|l| l.starts_with("store.accept")).unwrap();
    let vm_at = log.iter().position(|l| l.starts_with("vm.accept_vertex")).unwrap();
    assert!(store_at < vm_at);
}

/// A disagreeing minority cannot outvote the majority during bootstrap, and
/// the engine refuses to build on anything the majority did not vouch for.
#[test]
fn test_minority_frontier_is_dropped() {
    init_tracing();
    let peers = vec![(node(1), 30u64), (node(2), 30u64), (node(3), 40u64)];
    let majority_block = Id::filled(10);
    let minority_block = Id::filled(11);

    let sender = RecordingSender::new();
    let mut bootstrapper = Bootstrapper::new(
        peers,
        vec![majority_block.clone(), minority_block.clone()],
        4,
        Box::new(sender.clone()),
    );
    bootstrapper.start();

    let requests: Vec<(NodeId, u32)> = sender
        .sent
        .borrow()
        .iter()
        .map(|s| match s {
            Sent::GetAccepted { nodes, request_id, .. } => {
                (nodes.iter().next().cloned().unwrap(), *request_id)
            }
            other => panic!("unexpected: {:?}", other),
        })
        .collect();

    for (peer, request_id) in requests {
        let mut accepted = HashSet::new();
        let _ = accepted.insert(majority_block.clone());
        if peer == node(3) {
            // The heaviest peer also vouches for the minority block, but 40
            // of 100 is not a majority.
            let _ = accepted.insert(minority_block.clone());
        }
        bootstrapper.accepted(peer, request_id, accepted).unwrap();
    }

    assert_eq!(bootstrapper.result().unwrap(), vec![majority_block]);
}
