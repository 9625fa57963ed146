//! Vertices of the consensus DAG

use crate::snowstorm::Tx;
use crate::zfx_id::Id;

/// A vertex wraps a batch of transactions and points at its parents.
///
/// The `whitelist` flag marks a stop vertex: a distinguished vertex used to
/// finalise a DAG epoch, which conflicts with every processing vertex outside
/// its own ancestry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: Id,
    pub parents: Vec<Id>,
    pub height: u64,
    pub txs: Vec<Tx>,
    pub whitelist: bool,
    /// The opaque wire encoding this vertex was built from.
    pub bytes: Vec<u8>,
}

/// The serialized fields; the id is the hash of this encoding.
#[derive(Serialize, Deserialize)]
struct VertexContents {
    parents: Vec<Id>,
    height: u64,
    txs: Vec<Tx>,
    whitelist: bool,
}

impl Vertex {
    /// Builds a vertex, deriving its id and wire bytes from the contents.
    pub fn new(parents: Vec<Id>, height: u64, txs: Vec<Tx>, whitelist: bool) -> Self {
        let contents = VertexContents {
            parents: parents.clone(),
            height,
            txs: txs.clone(),
            whitelist,
        };
        let bytes = bincode::serialize(&contents).unwrap();
        let id = Id::new(&bytes);
        Vertex { id, parents, height, txs, whitelist, bytes }
    }

    /// Reconstructs a vertex from its wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Option<Vertex> {
        let contents: VertexContents = bincode::deserialize(bytes).ok()?;
        Some(Vertex {
            id: Id::new(bytes),
            parents: contents.parents,
            height: contents.height,
            txs: contents.txs,
            whitelist: contents.whitelist,
            bytes: bytes.to_vec(),
        })
    }

    pub fn tx_ids(&self) -> Vec<Id> {
        self.txs.iter().map(|tx| tx.id.clone()).collect()
    }
}

impl std::fmt::Display for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "vertex {} (height {}, {} txs, {} parents)",
            self.id,
            self.height,
            self.txs.len(),
            self.parents.len()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_id_derives_from_contents() {
        let a = Vertex::new(vec![Id::zero()], 1, vec![Tx::virtuous(Id::one(), vec![])], false);
        let b = Vertex::new(vec![Id::zero()], 1, vec![Tx::virtuous(Id::one(), vec![])], false);
        let c = Vertex::new(vec![Id::zero()], 2, vec![Tx::virtuous(Id::one(), vec![])], false);
        assert_eq!(a.id, b.id);
        assert!(a.id != c.id);
    }

    #[test]
    fn test_wire_roundtrip() {
        let v = Vertex::new(vec![Id::zero()], 7, vec![Tx::virtuous(Id::two(), vec![1])], true);
        let decoded = Vertex::from_bytes(&v.bytes).unwrap();
        assert_eq!(v, decoded);
        assert!(decoded.whitelist);
    }
}
