//! Interfaces to the virtual machine owning block and state-summary semantics
//!
//! The consensus core never interprets vertex or summary contents; it hands
//! them to these collaborators and reacts to their verdicts. VM errors are
//! chain-fatal and propagate unmodified; [Error::NotFound] and
//! [Error::NotImplemented] are sentinels with protocol meaning.

use crate::avalanche::Vertex;
use crate::engine::State;
use crate::snowstorm::Tx;
use crate::zfx_id::{Id, NodeId};

#[derive(Debug)]
pub enum Error {
    /// Sentinel: the requested optional item does not exist
    NotFound,
    /// Sentinel: the VM does not implement this capability
    NotImplemented,
    /// The vertex or transaction failed verification
    InvalidItem(String),
    /// Any other VM failure; chain-fatal
    Fatal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// How the VM took a state summary it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryMode {
    /// The VM started syncing and will block until done.
    Static,
    /// The VM started syncing in the background.
    Dynamic,
    /// The VM declined the summary; proceed without syncing.
    Skipped,
}

/// An opaque snapshot of chain state at a height, suitable for initial sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: Id,
    pub height: u64,
    pub bytes: Vec<u8>,
}

impl Summary {
    pub fn new(height: u64, bytes: Vec<u8>) -> Self {
        Summary { id: Id::new(&bytes), height, bytes }
    }
}

/// The chain VM as the DAG engine sees it.
pub trait Vm {
    fn set_state(&mut self, state: State) -> Result<()>;
    fn last_accepted(&self) -> Result<Id>;
    /// Returns the encoded block, or [Error::NotFound].
    fn get_block(&self, id: &Id) -> Result<Vec<u8>>;
    fn parse_vertex(&self, bytes: &[u8]) -> Result<Vertex>;
    fn verify_vertex(&mut self, vertex: &Vertex) -> Result<()>;
    fn verify_tx(&mut self, tx: &Tx) -> Result<()>;
    fn accept_vertex(&mut self, vertex: &Vertex) -> Result<()>;
    fn reject_vertex(&mut self, vertex: &Vertex) -> Result<()>;
    fn accept_tx(&mut self, id: &Id) -> Result<()>;
    fn reject_tx(&mut self, id: &Id) -> Result<()>;
    fn connected(&mut self, node: &NodeId) -> Result<()>;
    fn disconnected(&mut self, node: &NodeId) -> Result<()>;
    fn health_check(&self) -> Result<()>;
}

/// The state-sync surface of the VM.
pub trait StateSyncableVm {
    /// [Error::NotImplemented] means state sync is disabled altogether.
    fn state_sync_enabled(&self) -> Result<bool>;
    /// A sync that was in progress when the node went down, or
    /// [Error::NotFound].
    fn get_ongoing_sync_state_summary(&self) -> Result<Summary>;
    fn get_last_state_summary(&self) -> Result<Summary>;
    fn get_state_summary(&self, height: u64) -> Result<Summary>;
    fn parse_state_summary(&self, bytes: &[u8]) -> Result<Summary>;
    /// Hands the chosen summary to the VM.
    fn accept_summary(&mut self, summary: &Summary) -> Result<SummaryMode>;
}

/// Durable record of accepted vertices.
///
/// The engine notifies this store before a vertex's own accept runs, so an
/// external observer never sees an accepted vertex that has not been recorded.
pub trait VertexStore {
    fn accept(&mut self, vertex: &Vertex) -> Result<()>;
}

/// A VM carrying both the chain and the state-sync surfaces; what the state
/// syncer is handed.
pub trait ChainSyncVm: Vm + StateSyncableVm {}

impl<T: Vm + StateSyncableVm> ChainSyncVm for T {}

#[cfg(test)]
pub mod test_vm {
    //! Recording collaborators used across the engine tests

    use super::*;

    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// A log of collaborator calls, shared between the VM and the store so
    /// that orderings between them are observable.
    pub type CallLog = Rc<RefCell<Vec<String>>>;

    pub fn new_log() -> CallLog {
        Rc::new(RefCell::new(vec![]))
    }

    /// A VM that records every call and accepts everything by default.
    pub struct TestVm {
        pub log: CallLog,
        pub known_vertices: Rc<RefCell<HashMap<Id, Vertex>>>,
        /// Transactions that fail verification.
        pub invalid_txs: Vec<Id>,
        /// Vertices that fail verification.
        pub invalid_vertices: Vec<Id>,
        pub state: State,
    }

    impl TestVm {
        pub fn new(log: CallLog) -> Self {
            TestVm {
                log,
                known_vertices: Rc::new(RefCell::new(HashMap::new())),
                invalid_txs: vec![],
                invalid_vertices: vec![],
                state: State::Initializing,
            }
        }
    }

    impl Vm for TestVm {
        fn set_state(&mut self, state: State) -> Result<()> {
            self.state = state;
            self.log.borrow_mut().push(format!("set_state {}", state));
            Ok(())
        }

        fn last_accepted(&self) -> Result<Id> {
            Err(Error::NotFound)
        }

        fn get_block(&self, _id: &Id) -> Result<Vec<u8>> {
            Err(Error::NotFound)
        }

        fn parse_vertex(&self, bytes: &[u8]) -> Result<Vertex> {
            bincode::deserialize(bytes)
                .map_err(|e| Error::InvalidItem(format!("undecodable vertex: {}", e)))
        }

        fn verify_vertex(&mut self, vertex: &Vertex) -> Result<()> {
            if self.invalid_vertices.contains(&vertex.id) {
                return Err(Error::InvalidItem(format!("vertex {}", vertex.id)));
            }
            self.known_vertices.borrow_mut().insert(vertex.id.clone(), vertex.clone());
            Ok(())
        }

        fn verify_tx(&mut self, tx: &Tx) -> Result<()> {
            if self.invalid_txs.contains(&tx.id) {
                return Err(Error::InvalidItem(format!("tx {}", tx.id)));
            }
            Ok(())
        }

        fn accept_vertex(&mut self, vertex: &Vertex) -> Result<()> {
            self.log.borrow_mut().push(format!("vm.accept_vertex {}", vertex.id));
            Ok(())
        }

        fn reject_vertex(&mut self, vertex: &Vertex) -> Result<()> {
            self.log.borrow_mut().push(format!("vm.reject_vertex {}", vertex.id));
            Ok(())
        }

        fn accept_tx(&mut self, id: &Id) -> Result<()> {
            self.log.borrow_mut().push(format!("vm.accept_tx {}", id));
            Ok(())
        }

        fn reject_tx(&mut self, id: &Id) -> Result<()> {
            self.log.borrow_mut().push(format!("vm.reject_tx {}", id));
            Ok(())
        }

        fn connected(&mut self, _node: &NodeId) -> Result<()> {
            Ok(())
        }

        fn disconnected(&mut self, _node: &NodeId) -> Result<()> {
            Ok(())
        }

        fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    /// A vertex store appending to the shared call log.
    pub struct TestStore {
        pub log: CallLog,
    }

    impl VertexStore for TestStore {
        fn accept(&mut self, vertex: &Vertex) -> Result<()> {
            self.log.borrow_mut().push(format!("store.accept {}", vertex.id));
            Ok(())
        }
    }

    /// A syncable VM over a fixed summary table.
    pub struct TestSyncVm {
        pub enabled: bool,
        pub ongoing: Option<Summary>,
        pub last: Option<Summary>,
        pub summaries: HashMap<u64, Summary>,
        pub mode: SummaryMode,
        pub accepted: Rc<RefCell<Vec<Id>>>,
        pub states: Rc<RefCell<Vec<State>>>,
    }

    impl TestSyncVm {
        pub fn new() -> Self {
            TestSyncVm {
                enabled: true,
                ongoing: None,
                last: None,
                summaries: HashMap::new(),
                mode: SummaryMode::Static,
                accepted: Rc::new(RefCell::new(vec![])),
                states: Rc::new(RefCell::new(vec![])),
            }
        }
    }

    impl Vm for TestSyncVm {
        fn set_state(&mut self, state: State) -> Result<()> {
            self.states.borrow_mut().push(state);
            Ok(())
        }

        fn last_accepted(&self) -> Result<Id> {
            Err(Error::NotFound)
        }

        fn get_block(&self, _id: &Id) -> Result<Vec<u8>> {
            Err(Error::NotFound)
        }

        fn parse_vertex(&self, _bytes: &[u8]) -> Result<Vertex> {
            Err(Error::NotImplemented)
        }

        fn verify_vertex(&mut self, _vertex: &Vertex) -> Result<()> {
            Err(Error::NotImplemented)
        }

        fn verify_tx(&mut self, _tx: &Tx) -> Result<()> {
            Err(Error::NotImplemented)
        }

        fn accept_vertex(&mut self, _vertex: &Vertex) -> Result<()> {
            Err(Error::NotImplemented)
        }

        fn reject_vertex(&mut self, _vertex: &Vertex) -> Result<()> {
            Err(Error::NotImplemented)
        }

        fn accept_tx(&mut self, _id: &Id) -> Result<()> {
            Err(Error::NotImplemented)
        }

        fn reject_tx(&mut self, _id: &Id) -> Result<()> {
            Err(Error::NotImplemented)
        }

        fn connected(&mut self, _node: &NodeId) -> Result<()> {
            Ok(())
        }

        fn disconnected(&mut self, _node: &NodeId) -> Result<()> {
            Ok(())
        }

        fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    impl StateSyncableVm for TestSyncVm {
        fn state_sync_enabled(&self) -> Result<bool> {
            Ok(self.enabled)
        }

        fn get_ongoing_sync_state_summary(&self) -> Result<Summary> {
            self.ongoing.clone().ok_or(Error::NotFound)
        }

        fn get_last_state_summary(&self) -> Result<Summary> {
            self.last.clone().ok_or(Error::NotFound)
        }

        fn get_state_summary(&self, height: u64) -> Result<Summary> {
            self.summaries.get(&height).cloned().ok_or(Error::NotFound)
        }

        fn parse_state_summary(&self, bytes: &[u8]) -> Result<Summary> {
            bincode::deserialize(bytes)
                .map_err(|e| Error::InvalidItem(format!("undecodable summary: {}", e)))
        }

        fn accept_summary(&mut self, summary: &Summary) -> Result<SummaryMode> {
            self.accepted.borrow_mut().push(summary.id.clone());
            Ok(self.mode)
        }
    }
}
