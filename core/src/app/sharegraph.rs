//! Share graph mirroring the operation hashgraph
//!
//! Every replayed operation leaves one node here, carrying the delta shares
//! of a fresh random secret and the owner reassignments the operation caused.
//! Summing the deltas over any causally-closed subgraph yields the "current"
//! shares for that cut of history; the coin toss recovers a group element
//! from them and hashes it down to a number in [0, 1).
//!
//! Nodes only hold back-edges. To execute a subgraph the traversal first
//! mirrors it with forward edges (breadth-first walk from the frontier), then
//! runs the mirrored graph under the DAG scheduler so that every node updates
//! the shared accumulator after all of its predecessors have.

use crate::cointoss::{
    hash_point_to_unit, hash_to_point, recover_from_points, share_to_point, PointShare, Share,
};
use crate::hashgraph::schedule;
use crate::types::{NodeId, PointIdx, UserId};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Reassignment of one share index to a new owner
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OwnerTransfer {
    pub share_idx: PointIdx,
    pub owner: UserId,
}

/// One node of the share graph
#[derive(Clone, Debug)]
pub struct ShareNode {
    pub id: NodeId,
    /// Shares of this operation's fresh secret, one per point index; empty
    /// for posts and dummies
    pub delta_vals: Vec<Share>,
    /// Ownership changes caused by the operation
    pub owner_transfers: Vec<OwnerTransfer>,
    /// Share nodes of the operation's causal predecessors
    pub prev: Vec<NodeId>,
}

impl ShareNode {
    pub fn new(
        id: NodeId,
        delta_vals: Vec<Share>,
        owner_transfers: Vec<OwnerTransfer>,
        prev: Vec<NodeId>,
    ) -> Self {
        Self {
            id,
            delta_vals,
            owner_transfers,
            prev,
        }
    }

    /// Root node: every share index is assigned to the founding owner.
    pub fn initial(id: NodeId, delta_vals: Vec<Share>, owner: UserId) -> Self {
        let owner_transfers = (0..delta_vals.len())
            .map(|i| OwnerTransfer {
                share_idx: i as PointIdx,
                owner,
            })
            .collect();
        Self {
            id,
            delta_vals,
            owner_transfers,
            prev: Vec::new(),
        }
    }

    /// Placeholder for a failed or losing operation: contributes nothing but
    /// keeps the causal links of later operations intact.
    pub fn dummy(id: NodeId, prev: Vec<NodeId>) -> Self {
        Self {
            id,
            delta_vals: Vec::new(),
            owner_transfers: Vec::new(),
            prev,
        }
    }
}

/// Current state of one share index: its owner and the accumulated share
#[derive(Clone, Debug)]
pub struct Point {
    pub owner: UserId,
    pub val: Share,
}

/// Accumulate the share state of the subgraph ending at `frontier`.
///
/// Walks back from the frontier to the root, mirrors the subgraph with
/// forward edges, and executes it: the root initializes the accumulator from
/// its deltas and transfers, every later node reassigns owners and adds its
/// delta values. Addition in the scalar field commutes, so the result is
/// independent of the scheduler's permutation.
pub fn current_points(
    nodes: &HashMap<NodeId, ShareNode>,
    frontier: &[NodeId],
) -> Result<Vec<Point>> {
    let (root, next) = forward_view(nodes, frontier)?;

    let mut points: Vec<Point> = Vec::new();
    schedule::run(
        0,
        root,
        |n| next.get(&n).cloned().unwrap_or_default(),
        |n| nodes[&n].prev.clone(),
        |n| {
            accumulate(&nodes[&n], &mut points);
            Ok(())
        },
    );
    Ok(points)
}

/// Like [`current_points`], stripped down to the share values.
pub fn current_shares(
    nodes: &HashMap<NodeId, ShareNode>,
    frontier: &[NodeId],
) -> Result<Vec<Share>> {
    Ok(current_points(nodes, frontier)?
        .into_iter()
        .map(|p| p.val)
        .collect())
}

/// Derive the conflict coin from accumulated shares and the conflict seed.
///
/// The base point is hashed from the seed so every conflict uses an
/// independent generator: the coin revealed for one conflict says nothing
/// about any other, even over identical histories.
pub fn derive_coin(seed: i64, shares: &[Share]) -> Result<f64> {
    let digest = Sha256::digest(seed.to_le_bytes());
    let base = hash_to_point(&digest, b"concurrent_rem_base");
    let point_shares: Vec<PointShare> = shares.iter().map(|s| share_to_point(s, &base)).collect();
    let secret = recover_from_points(&point_shares)?;
    Ok(hash_point_to_unit(&secret))
}

/// Mirror the subgraph reaching `frontier` with forward edges.
///
/// Returns the root to execute from (the unique reachable node without
/// predecessors) and the forward adjacency of every reachable node.
fn forward_view(
    nodes: &HashMap<NodeId, ShareNode>,
    frontier: &[NodeId],
) -> Result<(NodeId, HashMap<NodeId, Vec<NodeId>>)> {
    let mut next: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut layer: Vec<NodeId> = Vec::new();
    for id in frontier {
        if visited.insert(*id) {
            layer.push(*id);
        }
    }

    let mut root = None;
    while !layer.is_empty() {
        let mut preceding: Vec<NodeId> = Vec::new();
        for id in &layer {
            let node = nodes.get(id).ok_or(Error::MissingShareNode(*id))?;
            if node.prev.is_empty() && root.replace(*id).is_some() {
                // A second predecessor-less node leaves the forward walk
                // without a single entry point.
                return Err(Error::RootlessSubgraph);
            }
            for p in &node.prev {
                if !nodes.contains_key(p) {
                    return Err(Error::MissingShareNode(*p));
                }
                next.entry(*p).or_default().push(*id);
                if visited.insert(*p) {
                    preceding.push(*p);
                }
            }
        }
        layer = preceding;
    }

    root.ok_or(Error::RootlessSubgraph).map(|r| (r, next))
}

fn accumulate(node: &ShareNode, points: &mut Vec<Point>) {
    if points.is_empty() {
        // Only the root sees an empty accumulator; its transfers assign one
        // owner per share index, in index order.
        debug_assert_eq!(
            node.delta_vals.len(),
            node.owner_transfers.len(),
            "delta values and owner transfers must pair up at the root"
        );
        *points = node
            .delta_vals
            .iter()
            .zip(&node.owner_transfers)
            .map(|(val, transfer)| Point {
                owner: transfer.owner,
                val: val.clone(),
            })
            .collect();
        return;
    }
    for transfer in &node.owner_transfers {
        points[transfer.share_idx as usize].owner = transfer.owner;
    }
    if !node.delta_vals.is_empty() {
        debug_assert_eq!(
            node.delta_vals.len(),
            points.len(),
            "a delta must cover every share index"
        );
        for (point, delta) in points.iter_mut().zip(&node.delta_vals) {
            point.val.value += delta.value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cointoss::{recover_secret, share_secret};
    use curve25519_dalek::Scalar;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn graph(nodes: Vec<ShareNode>) -> HashMap<NodeId, ShareNode> {
        nodes.into_iter().map(|n| (n.id, n)).collect()
    }

    fn numbered_shares(n: u64) -> Vec<Share> {
        (0..n)
            .map(|i| Share {
                id: Scalar::from(i + 1),
                value: Scalar::from(i),
            })
            .collect()
    }

    fn constant_delta(n: usize, val: u64) -> Vec<Share> {
        (0..n as u64)
            .map(|i| Share {
                id: Scalar::from(i + 1),
                value: Scalar::from(val),
            })
            .collect()
    }

    #[test]
    fn test_single_node_returns_initial_shares() {
        let shares = numbered_shares(100);
        let owner = UserId::new();
        let root = ShareNode::initial(NodeId::new(), shares.clone(), owner);
        let root_id = root.id;
        let nodes = graph(vec![root]);

        let points = current_points(&nodes, &[root_id]).unwrap();
        assert_eq!(points.len(), 100);
        for (point, expected) in points.iter().zip(&shares) {
            assert_eq!(point.owner, owner);
            assert_eq!(point.val, *expected);
        }
    }

    #[test]
    fn test_zero_deltas_preserve_initial_shares() {
        let shares = numbered_shares(50);
        let owner = UserId::new();
        let root = ShareNode::initial(NodeId::new(), shares.clone(), owner);
        let mut nodes = vec![root];
        for _ in 0..100 {
            let prev = nodes.last().map(|n| n.id).into_iter().collect();
            nodes.push(ShareNode::new(
                NodeId::new(),
                constant_delta(50, 0),
                Vec::new(),
                prev,
            ));
        }
        let tip = nodes.last().map(|n| n.id).into_iter().collect::<Vec<_>>();
        let nodes = graph(nodes);

        let recovered = current_shares(&nodes, &tip).unwrap();
        assert_eq!(recovered, shares);
    }

    #[test]
    fn test_deltas_accumulate_along_chain() {
        let updates = 100u64;
        let owner = UserId::new();
        let root = ShareNode::initial(NodeId::new(), constant_delta(50, 0), owner);
        let mut nodes = vec![root];
        for _ in 0..updates {
            let prev = nodes.last().map(|n| n.id).into_iter().collect();
            nodes.push(ShareNode::new(
                NodeId::new(),
                constant_delta(50, 1),
                Vec::new(),
                prev,
            ));
        }
        let tip = nodes.last().map(|n| n.id).into_iter().collect::<Vec<_>>();
        let nodes = graph(nodes);

        let shares = current_shares(&nodes, &tip).unwrap();
        assert!(shares.iter().all(|s| s.value == Scalar::from(updates)));
    }

    #[test]
    fn test_owner_transfers_apply_in_order() {
        let first = UserId::new();
        let second = UserId::new();
        let third = UserId::new();
        let root = ShareNode::initial(NodeId::new(), constant_delta(9, 0), first);
        let handoff = ShareNode::new(
            NodeId::new(),
            Vec::new(),
            (3..6)
                .map(|i| OwnerTransfer {
                    share_idx: i,
                    owner: second,
                })
                .collect(),
            vec![root.id],
        );
        let handback = ShareNode::new(
            NodeId::new(),
            Vec::new(),
            (5..9)
                .map(|i| OwnerTransfer {
                    share_idx: i,
                    owner: third,
                })
                .collect(),
            vec![handoff.id],
        );
        let tip = handback.id;
        let nodes = graph(vec![root, handoff, handback]);

        let points = current_points(&nodes, &[tip]).unwrap();
        let owners: Vec<UserId> = points.iter().map(|p| p.owner).collect();
        assert!(owners[..3].iter().all(|o| *o == first));
        assert!(owners[3..5].iter().all(|o| *o == second));
        assert!(owners[5..].iter().all(|o| *o == third));
    }

    #[test]
    fn test_forked_deltas_both_count() {
        let owner = UserId::new();
        let root = ShareNode::initial(NodeId::new(), constant_delta(10, 0), owner);
        let up = ShareNode::new(NodeId::new(), constant_delta(10, 1), Vec::new(), vec![root.id]);
        let down = ShareNode::new(NodeId::new(), constant_delta(10, 2), Vec::new(), vec![root.id]);
        let frontier = vec![up.id, down.id];
        let nodes = graph(vec![root, up, down]);

        let shares = current_shares(&nodes, &frontier).unwrap();
        assert!(shares.iter().all(|s| s.value == Scalar::from(3u64)));
    }

    #[test]
    fn test_fork_not_reaching_frontier_is_ignored() {
        let owner = UserId::new();
        let root = ShareNode::initial(NodeId::new(), constant_delta(10, 0), owner);
        let counted = ShareNode::new(
            NodeId::new(),
            constant_delta(10, 1),
            Vec::new(),
            vec![root.id],
        );
        let ignored = ShareNode::new(
            NodeId::new(),
            constant_delta(10, 7),
            Vec::new(),
            vec![root.id],
        );
        let frontier = vec![counted.id];
        let nodes = graph(vec![root, counted, ignored]);

        let shares = current_shares(&nodes, &frontier).unwrap();
        assert!(shares.iter().all(|s| s.value == Scalar::from(1u64)));
    }

    #[test]
    fn test_accumulated_shares_recover_sum_of_secrets() {
        let mut rng = StdRng::seed_from_u64(0);
        let threshold = 2;
        let num_shares = 10;
        let owner = UserId::new();

        let secrets: Vec<Scalar> = (1u64..=4).map(Scalar::from).collect();
        let mut nodes: Vec<ShareNode> = Vec::new();
        for secret in &secrets {
            let shares = share_secret(threshold, num_shares, secret, &mut rng);
            let prev: Vec<NodeId> = nodes.last().map(|n| n.id).into_iter().collect();
            let node = if nodes.is_empty() {
                ShareNode::initial(NodeId::new(), shares, owner)
            } else {
                ShareNode::new(NodeId::new(), shares, Vec::new(), prev)
            };
            nodes.push(node);
        }
        let tip = nodes.last().map(|n| n.id).into_iter().collect::<Vec<_>>();
        let nodes = graph(nodes);

        let current = current_shares(&nodes, &tip).unwrap();
        let recovered = recover_secret(threshold, &current).unwrap();
        let expected: Scalar = secrets.iter().sum();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn test_missing_frontier_node_is_an_error() {
        let nodes = HashMap::new();
        let err = current_points(&nodes, &[NodeId::new()]).unwrap_err();
        assert!(matches!(err, Error::MissingShareNode(_)));
    }

    #[test]
    fn test_empty_frontier_is_an_error() {
        let nodes = HashMap::new();
        assert!(matches!(
            current_points(&nodes, &[]),
            Err(Error::RootlessSubgraph)
        ));
    }

    #[test]
    fn test_coin_is_deterministic_and_in_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let shares = share_secret(2, 10, &Scalar::from(99u64), &mut rng);
        let coin = derive_coin(1234, &shares).unwrap();
        assert!((0.0..1.0).contains(&coin));
        assert_eq!(coin, derive_coin(1234, &shares).unwrap());
        assert_ne!(coin, derive_coin(1235, &shares).unwrap());
    }
}
