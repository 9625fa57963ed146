//! One factory per wire opcode

use super::framing::{frame, FLAG_COMPRESSED};
use super::{Error, Op, Result, Version};

use crate::zfx_id::{Id, NodeId};

use bytes::Bytes;

/// Typed message bodies, serialized with bincode behind the opcode tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Version { version: Version },
    PeerList { peers: Vec<NodeId> },
    Ping,
    Pong,
    GetStateSummaryFrontier { request_id: u32 },
    StateSummaryFrontier { request_id: u32, summary: Vec<u8> },
    GetAcceptedStateSummary { request_id: u32, heights: Vec<u64> },
    AcceptedStateSummary { request_id: u32, summary_ids: Vec<Id> },
    GetAcceptedFrontier { request_id: u32 },
    AcceptedFrontier { request_id: u32, frontier: Vec<Id> },
    GetAccepted { request_id: u32, ids: Vec<Id> },
    Accepted { request_id: u32, ids: Vec<Id> },
    GetAncestors { request_id: u32, id: Id },
    Ancestors { request_id: u32, containers: Vec<Vec<u8>> },
    Get { request_id: u32, id: Id },
    Put { request_id: u32, container: Vec<u8> },
    PushQuery { request_id: u32, container: Vec<u8> },
    PullQuery { request_id: u32, id: Id },
    Chits { request_id: u32, votes: Vec<Id> },
    AppRequest { request_id: u32, bytes: Vec<u8> },
    AppResponse { request_id: u32, bytes: Vec<u8> },
    AppGossip { bytes: Vec<u8> },
}

impl Payload {
    pub fn op(&self) -> Op {
        match self {
            Payload::Version { .. } => Op::Version,
            Payload::PeerList { .. } => Op::PeerList,
            Payload::Ping => Op::Ping,
            Payload::Pong => Op::Pong,
            Payload::GetStateSummaryFrontier { .. } => Op::GetStateSummaryFrontier,
            Payload::StateSummaryFrontier { .. } => Op::StateSummaryFrontier,
            Payload::GetAcceptedStateSummary { .. } => Op::GetAcceptedStateSummary,
            Payload::AcceptedStateSummary { .. } => Op::AcceptedStateSummary,
            Payload::GetAcceptedFrontier { .. } => Op::GetAcceptedFrontier,
            Payload::AcceptedFrontier { .. } => Op::AcceptedFrontier,
            Payload::GetAccepted { .. } => Op::GetAccepted,
            Payload::Accepted { .. } => Op::Accepted,
            Payload::GetAncestors { .. } => Op::GetAncestors,
            Payload::Ancestors { .. } => Op::Ancestors,
            Payload::Get { .. } => Op::Get,
            Payload::Put { .. } => Op::Put,
            Payload::PushQuery { .. } => Op::PushQuery,
            Payload::PullQuery { .. } => Op::PullQuery,
            Payload::Chits { .. } => Op::Chits,
            Payload::AppRequest { .. } => Op::AppRequest,
            Payload::AppResponse { .. } => Op::AppResponse,
            Payload::AppGossip { .. } => Op::AppGossip,
        }
    }
}

/// A framed message ready for the wire.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub op: Op,
    pub bytes: Bytes,
    pub bypass_throttling: bool,
}

/// Builds framed wire payloads for every consensus opcode.
///
/// Compression is applied iff the opcode is compressible and compression is
/// enabled; the compression bit lives in the wrapper flags byte, the length
/// prefix is untouched by it.
#[derive(Debug, Clone)]
pub struct Builder {
    compression_enabled: bool,
    max_message_size: usize,
}

impl Builder {
    pub fn new(compression_enabled: bool, max_message_size: usize) -> Self {
        Builder { compression_enabled, max_message_size }
    }

    pub fn version(&self, version: Version) -> Result<OutboundMessage> {
        self.build(Payload::Version { version })
    }

    pub fn peer_list(&self, peers: Vec<NodeId>) -> Result<OutboundMessage> {
        self.build(Payload::PeerList { peers })
    }

    pub fn ping(&self) -> Result<OutboundMessage> {
        self.build(Payload::Ping)
    }

    pub fn pong(&self) -> Result<OutboundMessage> {
        self.build(Payload::Pong)
    }

    pub fn get_state_summary_frontier(&self, request_id: u32) -> Result<OutboundMessage> {
        self.build(Payload::GetStateSummaryFrontier { request_id })
    }

    pub fn state_summary_frontier(
        &self,
        request_id: u32,
        summary: Vec<u8>,
    ) -> Result<OutboundMessage> {
        self.build(Payload::StateSummaryFrontier { request_id, summary })
    }

    pub fn get_accepted_state_summary(
        &self,
        request_id: u32,
        heights: Vec<u64>,
    ) -> Result<OutboundMessage> {
        self.build(Payload::GetAcceptedStateSummary { request_id, heights })
    }

    pub fn accepted_state_summary(
        &self,
        request_id: u32,
        summary_ids: Vec<Id>,
    ) -> Result<OutboundMessage> {
        self.build(Payload::AcceptedStateSummary { request_id, summary_ids })
    }

    pub fn get_accepted_frontier(&self, request_id: u32) -> Result<OutboundMessage> {
        self.build(Payload::GetAcceptedFrontier { request_id })
    }

    pub fn accepted_frontier(&self, request_id: u32, frontier: Vec<Id>) -> Result<OutboundMessage> {
        self.build(Payload::AcceptedFrontier { request_id, frontier })
    }

    pub fn get_accepted(&self, request_id: u32, ids: Vec<Id>) -> Result<OutboundMessage> {
        self.build(Payload::GetAccepted { request_id, ids })
    }

    pub fn accepted(&self, request_id: u32, ids: Vec<Id>) -> Result<OutboundMessage> {
        self.build(Payload::Accepted { request_id, ids })
    }

    pub fn get_ancestors(&self, request_id: u32, id: Id) -> Result<OutboundMessage> {
        self.build(Payload::GetAncestors { request_id, id })
    }

    pub fn ancestors(&self, request_id: u32, containers: Vec<Vec<u8>>) -> Result<OutboundMessage> {
        self.build(Payload::Ancestors { request_id, containers })
    }

    pub fn get(&self, request_id: u32, id: Id) -> Result<OutboundMessage> {
        self.build(Payload::Get { request_id, id })
    }

    pub fn put(&self, request_id: u32, container: Vec<u8>) -> Result<OutboundMessage> {
        self.build(Payload::Put { request_id, container })
    }

    pub fn push_query(&self, request_id: u32, container: Vec<u8>) -> Result<OutboundMessage> {
        self.build(Payload::PushQuery { request_id, container })
    }

    pub fn pull_query(&self, request_id: u32, id: Id) -> Result<OutboundMessage> {
        self.build(Payload::PullQuery { request_id, id })
    }

    pub fn chits(&self, request_id: u32, votes: Vec<Id>) -> Result<OutboundMessage> {
        self.build(Payload::Chits { request_id, votes })
    }

    pub fn app_request(&self, request_id: u32, bytes: Vec<u8>) -> Result<OutboundMessage> {
        self.build(Payload::AppRequest { request_id, bytes })
    }

    pub fn app_response(&self, request_id: u32, bytes: Vec<u8>) -> Result<OutboundMessage> {
        self.build(Payload::AppResponse { request_id, bytes })
    }

    pub fn app_gossip(&self, bytes: Vec<u8>) -> Result<OutboundMessage> {
        self.build(Payload::AppGossip { bytes })
    }

    /// Parses a framed message back into its payload. Used for loopback
    /// delivery and in tests; inbound network parsing lives with the router.
    pub fn parse(&self, framed: &[u8]) -> Result<Payload> {
        let wrapper = super::unframe(framed, self.max_message_size)?;
        if wrapper.len() < 2 {
            return Err(Error::TruncatedFrame);
        }
        let flags = wrapper[0];
        let op = Op::from_byte(wrapper[1])?;
        let body = &wrapper[2..];
        let body = if flags & FLAG_COMPRESSED != 0 {
            zstd::decode_all(body).map_err(Error::Compression)?
        } else {
            body.to_vec()
        };
        let payload: Payload = bincode::deserialize(&body)?;
        if payload.op() != op {
            return Err(Error::UnknownOpcode(wrapper[1]));
        }
        Ok(payload)
    }

    fn build(&self, payload: Payload) -> Result<OutboundMessage> {
        let op = payload.op();
        let body = bincode::serialize(&payload)?;

        let mut flags = 0u8;
        let body = if self.compression_enabled && op.compressible() {
            flags |= FLAG_COMPRESSED;
            zstd::encode_all(&body[..], 0).map_err(Error::Compression)?
        } else {
            body
        };

        let mut wrapper = Vec::with_capacity(2 + body.len());
        wrapper.push(flags);
        wrapper.push(op.byte());
        wrapper.extend_from_slice(&body);

        let bytes = frame(&wrapper, self.max_message_size)?;
        Ok(OutboundMessage { op, bytes, bypass_throttling: op.bypass_throttling() })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MAX: usize = 1 << 20;

    #[test]
    fn test_uncompressed_roundtrip() {
        let builder = Builder::new(false, MAX);
        let msg = builder.chits(7, vec![Id::one(), Id::two()]).unwrap();
        assert_eq!(msg.op, Op::Chits);
        assert!(!msg.bypass_throttling);
        match builder.parse(&msg.bytes).unwrap() {
            Payload::Chits { request_id, votes } => {
                assert_eq!(request_id, 7);
                assert_eq!(votes, vec![Id::one(), Id::two()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_compression_only_for_compressible_ops() {
        let builder = Builder::new(true, MAX);

        let msg = builder.put(1, vec![0u8; 4096]).unwrap();
        assert_eq!(msg.bytes[4] & FLAG_COMPRESSED, FLAG_COMPRESSED);
        // A run of zeroes compresses well below the uncompressed body size.
        assert!(msg.bytes.len() < 4096);
        match builder.parse(&msg.bytes).unwrap() {
            Payload::Put { request_id: 1, container } => assert_eq!(container, vec![0u8; 4096]),
            other => panic!("unexpected: {:?}", other),
        }

        // Chits is not compressible, even with compression enabled.
        let msg = builder.chits(1, vec![Id::one()]).unwrap();
        assert_eq!(msg.bytes[4] & FLAG_COMPRESSED, 0);
    }

    #[test]
    fn test_handshake_bypasses_throttling() {
        let builder = Builder::new(false, MAX);
        assert!(builder.ping().unwrap().bypass_throttling);
        assert!(builder.version(Version::current()).unwrap().bypass_throttling);
        assert!(!builder.get(0, Id::one()).unwrap().bypass_throttling);
    }

    #[test]
    fn test_max_size_enforced() {
        let builder = Builder::new(false, 64);
        match builder.put(0, vec![0u8; 128]) {
            Err(Error::MessageTooLarge(_, 64)) => (),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_every_opcode_roundtrips() {
        let builder = Builder::new(true, MAX);
        let msgs = vec![
            builder.version(Version::current()).unwrap(),
            builder.peer_list(vec![NodeId::zero()]).unwrap(),
            builder.ping().unwrap(),
            builder.pong().unwrap(),
            builder.get_state_summary_frontier(1).unwrap(),
            builder.state_summary_frontier(1, vec![1, 2, 3]).unwrap(),
            builder.get_accepted_state_summary(2, vec![10, 12]).unwrap(),
            builder.accepted_state_summary(2, vec![Id::one()]).unwrap(),
            builder.get_accepted_frontier(3).unwrap(),
            builder.accepted_frontier(3, vec![Id::one()]).unwrap(),
            builder.get_accepted(4, vec![Id::one()]).unwrap(),
            builder.accepted(4, vec![Id::one()]).unwrap(),
            builder.get_ancestors(5, Id::two()).unwrap(),
            builder.ancestors(5, vec![vec![1], vec![2]]).unwrap(),
            builder.get(6, Id::one()).unwrap(),
            builder.put(6, vec![9; 32]).unwrap(),
            builder.push_query(7, vec![8; 32]).unwrap(),
            builder.pull_query(7, Id::two()).unwrap(),
            builder.chits(7, vec![Id::one()]).unwrap(),
            builder.app_request(8, vec![1]).unwrap(),
            builder.app_response(8, vec![2]).unwrap(),
            builder.app_gossip(vec![3]).unwrap(),
        ];
        for msg in msgs {
            let payload = builder.parse(&msg.bytes).unwrap();
            assert_eq!(payload.op(), msg.op);
        }
    }
}
