//! A sled-backed accepted-vertex store

use super::{Error, Result};

use crate::avalanche::Vertex;
use crate::vm;
use crate::zfx_id::Id;

use byteorder::BigEndian;
use zerocopy::{byteorder::U64, AsBytes, FromBytes, Unaligned};

/// Vertices are keyed by `(height, id)` so iteration order is chain order.
#[derive(Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct Key {
    pub height: U64<BigEndian>,
    pub id: [u8; 32],
}

impl Key {
    pub fn new(height: u64, id: Id) -> Key {
        Key { height: U64::new(height), id: id.bytes() }
    }
}

/// The default persistence collaborator: accepted vertices land here before
/// their own accept runs.
pub struct SledVertexStore {
    db: sled::Db,
}

impl SledVertexStore {
    /// Opens a store at the given path.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        Ok(SledVertexStore { db: sled::open(path)? })
    }

    /// An in-memory store for tests and ephemeral nodes.
    pub fn temporary() -> Result<Self> {
        Ok(SledVertexStore { db: sled::Config::new().temporary(true).open()? })
    }

    pub fn insert(&self, vertex: &Vertex) -> Result<()> {
        let encoded = bincode::serialize(vertex)?;
        let key = Key::new(vertex.height, vertex.id.clone());
        let _ = self.db.insert(key.as_bytes(), encoded)?;
        Ok(())
    }

    pub fn is_accepted(&self, height: u64, id: Id) -> Result<bool> {
        let key = Key::new(height, id);
        Ok(self.db.contains_key(key.as_bytes())?)
    }

    pub fn get(&self, height: u64, id: Id) -> Result<Option<Vertex>> {
        let key = Key::new(height, id);
        match self.db.get(key.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(value.as_bytes())?)),
            None => Ok(None),
        }
    }

    /// The accepted vertex with the greatest `(height, id)` key.
    pub fn last_accepted(&self) -> Result<Vertex> {
        match self.db.last()? {
            Some((_, value)) => Ok(bincode::deserialize(value.as_bytes())?),
            None => Err(Error::EmptyStore),
        }
    }

    pub fn flush(&self) -> Result<()> {
        let _ = self.db.flush()?;
        Ok(())
    }
}

impl vm::VertexStore for SledVertexStore {
    fn accept(&mut self, vertex: &Vertex) -> vm::Result<()> {
        self.insert(vertex).map_err(|e| vm::Error::Fatal(format!("vertex store: {}", e)))
    }
}
