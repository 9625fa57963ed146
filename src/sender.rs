//! The outbound network surface consumed by the engines
//!
//! The networking layer implements [Sender] on top of the message
//! [Builder](crate::message::Builder); the engines call it and never block on
//! delivery. Per-request timeouts are the network collaborator's job: for every
//! request it must eventually deliver either the response or the matching
//! `*Failed` event.

use crate::zfx_id::{Id, NodeId};

use std::collections::HashSet;

pub trait Sender {
    fn send_get_state_summary_frontier(&mut self, nodes: HashSet<NodeId>, request_id: u32);

    fn send_get_accepted_state_summary(
        &mut self,
        nodes: HashSet<NodeId>,
        request_id: u32,
        heights: Vec<u64>,
    );

    fn send_get_accepted(&mut self, nodes: HashSet<NodeId>, request_id: u32, ids: Vec<Id>);

    fn send_get(&mut self, node: NodeId, request_id: u32, id: Id);

    fn send_put(&mut self, node: NodeId, request_id: u32, container: Vec<u8>);

    fn send_push_query(&mut self, nodes: HashSet<NodeId>, request_id: u32, container: Vec<u8>);

    fn send_pull_query(&mut self, nodes: HashSet<NodeId>, request_id: u32, id: Id);

    fn send_chits(&mut self, node: NodeId, request_id: u32, votes: Vec<Id>);

    fn send_accepted_frontier(&mut self, node: NodeId, request_id: u32, frontier: Vec<Id>);

    fn send_ancestors(&mut self, node: NodeId, request_id: u32, containers: Vec<Vec<u8>>);
}
