//! Causal hashgraph of operations
//!
//! The hashgraph is the DAG a host builds to describe the causal history of a
//! session: each node wraps a CRDT submission and lists the nodes it causally
//! depends on. Nodes are stored in an arena and referenced by index, with
//! back-edges (`prev`) and forward-edges (`next`) kept in sync.

pub mod schedule;

use crate::crdt::{Crdt, OpDraft};
use crate::types::NodeId;

/// Stable handle to a node inside a [`Hashgraph`]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeRef(usize);

struct OpNode {
    id: NodeId,
    depth: u32,
    draft: OpDraft,
    prev: Vec<NodeRef>,
    next: Vec<NodeRef>,
}

/// Arena-backed operation DAG
#[derive(Default)]
pub struct Hashgraph {
    nodes: Vec<OpNode>,
}

impl Hashgraph {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Wire a new node into the graph.
    ///
    /// Roots (empty `prev`) get depth 0; every other node sits one level
    /// below its deepest predecessor. The new node is registered in each
    /// predecessor's forward-edge list.
    pub fn add_node(&mut self, draft: OpDraft, prev: &[NodeRef]) -> NodeRef {
        let depth = prev
            .iter()
            .map(|p| self.nodes[p.0].depth + 1)
            .max()
            .unwrap_or(0);
        let node = NodeRef(self.nodes.len());
        self.nodes.push(OpNode {
            id: NodeId::new(),
            depth,
            draft,
            prev: prev.to_vec(),
            next: Vec::new(),
        });
        for p in prev {
            self.nodes[p.0].next.push(node);
        }
        node
    }

    /// Identifier assigned to `node` when it was wired in.
    pub fn node_id(&self, node: NodeRef) -> NodeId {
        self.nodes[node.0].id
    }

    /// Causal depth of `node` (longest path from a root).
    pub fn depth(&self, node: NodeRef) -> u32 {
        self.nodes[node.0].depth
    }

    /// Replay every node reachable from `root`, submitting its operation to
    /// `crdt` exactly once.
    ///
    /// The visitation order is a topological order whose tie-breaks are
    /// derived from `seed`; submissions are order-independent, so the CRDT
    /// contents do not depend on the seed. Submission failures (index
    /// collisions) are logged and skipped.
    pub fn run(&self, seed: i64, root: NodeRef, crdt: &mut Crdt) {
        schedule::run(
            seed,
            root,
            |n| self.nodes[n.0].next.clone(),
            |n| self.nodes[n.0].prev.clone(),
            |n| {
                let node = &self.nodes[n.0];
                let prev_ids: Vec<NodeId> =
                    node.prev.iter().map(|p| self.nodes[p.0].id).collect();
                crdt.submit(&node.draft, node.depth, node.id, &prev_ids)
            },
        );
    }
}
