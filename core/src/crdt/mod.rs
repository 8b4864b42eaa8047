//! Operation CRDT
//!
//! An ordered map of operations keyed by the 64-bit index of [`index`]. Any
//! replica that receives the same set of submissions emits the same operation
//! list, regardless of submission order; the list is what the access-control
//! state machine replays.
//!
//! Submissions are two-phase: a host first builds an [`OpDraft`] holding the
//! operation payload, then wires it into the hashgraph, and only when the
//! graph executes the node does the draft learn its depth, node id and causal
//! predecessors and get inserted here. The indirection exists because depth
//! is unknown until the node is wired into the graph.

mod index;

use crate::types::{NodeId, PointIdx, UserId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Payload of a single operation
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum OpBody {
    /// Create the group with a single founding member owning every point
    Init { initial: UserId, pretty_name: String },

    /// Grant membership to `added`, transferring `points` from `issuer`
    Add {
        issuer: UserId,
        added: UserId,
        points: Vec<PointIdx>,
        pretty_name: String,
    },

    /// Revoke `removed`'s membership, reclaiming their points
    Remove { issuer: UserId, removed: UserId },

    /// Append a message to the shared log
    Post { poster: UserId, message: String },
}

/// An operation stored in the CRDT
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Op {
    /// Total-order key (see [`index`])
    pub idx: i64,
    /// Hashgraph node that carried the submission
    pub node_id: NodeId,
    /// Hashgraph nodes this operation causally depends on
    pub prev_ids: Vec<NodeId>,
    /// Operation payload
    pub body: OpBody,
}

impl Op {
    /// Causal depth this operation was submitted at.
    pub fn depth(&self) -> u32 {
        index::depth_of(self.idx)
    }
}

/// Deferred submission: the payload of a hashgraph node before the node is
/// wired in and its depth is known
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct OpDraft {
    body: OpBody,
}

impl OpDraft {
    pub fn init(initial: UserId, pretty_name: impl Into<String>) -> Self {
        Self {
            body: OpBody::Init {
                initial,
                pretty_name: pretty_name.into(),
            },
        }
    }

    pub fn add(
        issuer: UserId,
        added: UserId,
        pretty_name: impl Into<String>,
        points: Vec<PointIdx>,
    ) -> Self {
        Self {
            body: OpBody::Add {
                issuer,
                added,
                points,
                pretty_name: pretty_name.into(),
            },
        }
    }

    pub fn remove(issuer: UserId, removed: UserId) -> Self {
        Self {
            body: OpBody::Remove { issuer, removed },
        }
    }

    pub fn post(poster: UserId, message: impl Into<String>) -> Self {
        Self {
            body: OpBody::Post {
                poster,
                message: message.into(),
            },
        }
    }

    pub fn body(&self) -> &OpBody {
        &self.body
    }
}

/// Ordered map of operations keyed by replay index
#[derive(Default, Clone, Debug)]
pub struct Crdt {
    ops: BTreeMap<i64, Op>,
}

impl Crdt {
    pub fn new() -> Self {
        Self {
            ops: BTreeMap::new(),
        }
    }

    /// Insert a draft that has been given its runtime coordinates.
    ///
    /// Fails when another operation already occupies the computed index; the
    /// duplicate is dropped and the existing operation is kept.
    pub fn submit(
        &mut self,
        draft: &OpDraft,
        depth: u32,
        node_id: NodeId,
        prev_ids: &[NodeId],
    ) -> Result<()> {
        let (idx, prev_ids) = match &draft.body {
            // Exactly one init per CRDT; it anchors the order at index zero
            // and carries no causal predecessors.
            OpBody::Init { .. } => (0, Vec::new()),
            OpBody::Add {
                issuer,
                added,
                points,
                ..
            } => (
                index::add_idx(depth, *issuer, *added, points.len()),
                prev_ids.to_vec(),
            ),
            OpBody::Remove { issuer, removed } => (
                index::remove_idx(depth, *issuer, *removed),
                prev_ids.to_vec(),
            ),
            OpBody::Post { poster, message } => (
                index::post_idx(depth, *poster, message),
                prev_ids.to_vec(),
            ),
        };
        match self.ops.entry(idx) {
            Entry::Occupied(_) => Err(match draft.body {
                OpBody::Init { .. } => Error::DuplicateInit,
                _ => Error::IndexCollision { idx },
            }),
            Entry::Vacant(slot) => {
                slot.insert(Op {
                    idx,
                    node_id,
                    prev_ids,
                    body: draft.body.clone(),
                });
                Ok(())
            }
        }
    }

    /// Operations in replay order (strictly increasing index).
    pub fn operations(&self) -> Vec<&Op> {
        self.ops.values().collect()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Drop all operations, e.g. between replays of a rebuilt graph.
    pub fn clear(&mut self) {
        self.ops.clear();
    }
}
