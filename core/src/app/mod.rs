//! Access-control state machine
//!
//! Replays the CRDT's ordered operation list into application state: the
//! membership map (who owns which point indices) and the message log. Every
//! replica replaying the same list reaches the same state.
//!
//! Most failures are local: an operation whose preconditions do not hold is
//! dropped with a warning, leaving a dummy share-graph node behind so later
//! operations can still reference it causally. The one fatal error is a
//! second applied init.
//!
//! Two removal operations that mirror each other (`A removes B` while
//! `B removes A`) sit on consecutive indices by construction and are settled
//! together: a coin derived from the share state of their common causal
//! history picks the winner, weighted by point ownership.

pub mod sharegraph;

use crate::cointoss::{random_scalar, share_random_secret, Share};
use crate::crdt::{Crdt, Op, OpBody};
use crate::types::{Message, NodeId, PointIdx, UserId};
use crate::{Error, Result};
use curve25519_dalek::Scalar;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sharegraph::{OwnerTransfer, ShareNode};
use std::collections::{BTreeSet, HashMap};

/// A participant and the point indices they currently own
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct User {
    pub id: UserId,
    pub points: BTreeSet<PointIdx>,
}

/// Why an operation was dropped during replay
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum RejectionReason {
    #[error("previous operation ids do not exist")]
    MissingPredecessors,

    #[error("user cannot add themselves")]
    SelfAdd,

    #[error("at least a single point must be given")]
    NoPointsGiven,

    #[error("operation issuer is not a user")]
    UnknownIssuer,

    #[error("issuer cannot give more or equal points than what they have")]
    TooManyPoints,

    #[error("issuer cannot give points they do not have")]
    PointsNotOwned,

    #[error("added user already exists")]
    AlreadyMember,

    #[error("operation poster is not a user")]
    UnknownPoster,

    #[error("user cannot remove themselves")]
    SelfRemove,

    #[error("removed user is not in the system")]
    UnknownRemoved,
}

/// Fully-replayed application state
pub struct App {
    /// Current membership, keyed by user id
    pub users: HashMap<UserId, User>,
    /// Messages accepted into the log, in replay order
    pub messages: Vec<Message>,
    num_points: u32,
    threshold: u32,
    share_nodes: HashMap<NodeId, ShareNode>,
    root_share: Share,
}

/// A removal operation with its parties pulled out of the body
struct Removal<'a> {
    op: &'a Op,
    issuer: UserId,
    removed: UserId,
}

impl App {
    /// Replay `crdt` into a fresh state, sampling share secrets from the
    /// operating system RNG.
    pub fn execute(crdt: &Crdt, num_points: u32, threshold: u32) -> Result<Self> {
        Self::execute_with_rng(crdt, num_points, threshold, &mut OsRng)
    }

    /// Replay `crdt` with an explicit randomness handle. Fixing the seed
    /// makes the entire replay, coin tosses included, reproducible.
    pub fn execute_with_rng<R: RngCore + CryptoRng>(
        crdt: &Crdt,
        num_points: u32,
        threshold: u32,
        rng: &mut R,
    ) -> Result<Self> {
        let mut app = Self::new(num_points, threshold, rng);
        let ops = crdt.operations();
        let mut i = 0;
        while i < ops.len() {
            let op = ops[i];
            match &op.body {
                OpBody::Init { initial, .. } => {
                    app.apply_init(op, *initial, rng)?;
                    i += 1;
                }
                OpBody::Add {
                    issuer,
                    added,
                    points,
                    ..
                } => {
                    if let Err(reason) = app.apply_add(op, *issuer, *added, points, rng) {
                        tracing::warn!(idx = op.idx, reason = %reason, "unable to apply add operation");
                    }
                    i += 1;
                }
                OpBody::Remove { issuer, removed } => {
                    let first = Removal {
                        op,
                        issuer: *issuer,
                        removed: *removed,
                    };
                    if let Some(second) = mirror_of(&ops, i, &first) {
                        match app.apply_concurrent_removals(&first, &second, rng) {
                            Ok(consumed) => i += consumed,
                            Err(reason) => {
                                tracing::warn!(idx = op.idx, reason = %reason, "unable to apply concurrent removal");
                                i += 1;
                            }
                        }
                    } else {
                        if let Err(reason) = app.apply_removal(&first, rng) {
                            tracing::warn!(idx = op.idx, reason = %reason, "unable to apply removal");
                        }
                        i += 1;
                    }
                }
                OpBody::Post { poster, message } => {
                    if let Err(reason) = app.apply_post(op, *poster, message) {
                        tracing::warn!(idx = op.idx, reason = %reason, "unable to apply post operation");
                    }
                    i += 1;
                }
            }
        }
        Ok(app)
    }

    fn new<R: RngCore + CryptoRng>(num_points: u32, threshold: u32, rng: &mut R) -> Self {
        let root_share = Share {
            id: Scalar::ZERO,
            value: random_scalar(rng),
        };
        Self {
            users: HashMap::new(),
            messages: Vec::new(),
            num_points,
            threshold,
            share_nodes: HashMap::new(),
            root_share,
        }
    }

    pub fn num_points(&self) -> u32 {
        self.num_points
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// The replica's own share of the root secret, sampled at construction.
    pub fn root_share(&self) -> &Share {
        &self.root_share
    }

    /// Share-graph node recorded for the hashgraph node `id`, if any.
    pub fn share_node(&self, id: NodeId) -> Option<&ShareNode> {
        self.share_nodes.get(&id)
    }

    fn apply_init<R: RngCore + CryptoRng>(
        &mut self,
        op: &Op,
        initial: UserId,
        rng: &mut R,
    ) -> Result<()> {
        if !self.users.is_empty() {
            return Err(Error::AlreadyInitialized);
        }
        let shares = share_random_secret(self.threshold, self.num_points, rng);
        self.share_nodes
            .insert(op.node_id, ShareNode::initial(op.node_id, shares, initial));
        self.users.insert(
            initial,
            User {
                id: initial,
                points: (0..self.num_points).collect(),
            },
        );
        tracing::debug!(user = %initial, points = self.num_points, "initialized group");
        Ok(())
    }

    fn apply_add<R: RngCore + CryptoRng>(
        &mut self,
        op: &Op,
        issuer: UserId,
        added: UserId,
        points: &[PointIdx],
        rng: &mut R,
    ) -> std::result::Result<(), RejectionReason> {
        let given: BTreeSet<PointIdx> = points.iter().copied().collect();
        if let Err(reason) = self.check_add(op, issuer, added, &given) {
            self.insert_dummy(op);
            return Err(reason);
        }
        if let Some(owner) = self.users.get_mut(&issuer) {
            for p in &given {
                owner.points.remove(p);
            }
        }
        let transfers = given
            .iter()
            .map(|p| OwnerTransfer {
                share_idx: *p,
                owner: added,
            })
            .collect();
        self.share_nodes.insert(
            op.node_id,
            ShareNode::new(
                op.node_id,
                share_random_secret(self.threshold, self.num_points, rng),
                transfers,
                op.prev_ids.clone(),
            ),
        );
        self.users.insert(
            added,
            User {
                id: added,
                points: given,
            },
        );
        tracing::debug!(issuer = %issuer, added = %added, points = points.len(), "added user");
        Ok(())
    }

    fn check_add(
        &self,
        op: &Op,
        issuer: UserId,
        added: UserId,
        points: &BTreeSet<PointIdx>,
    ) -> std::result::Result<(), RejectionReason> {
        if !self.has_predecessors(op) {
            return Err(RejectionReason::MissingPredecessors);
        }
        if issuer == added {
            return Err(RejectionReason::SelfAdd);
        }
        if points.is_empty() {
            return Err(RejectionReason::NoPointsGiven);
        }
        let Some(owner) = self.users.get(&issuer) else {
            return Err(RejectionReason::UnknownIssuer);
        };
        if points.len() >= owner.points.len() {
            return Err(RejectionReason::TooManyPoints);
        }
        if !points.iter().all(|p| owner.points.contains(p)) {
            return Err(RejectionReason::PointsNotOwned);
        }
        if self.users.contains_key(&added) {
            return Err(RejectionReason::AlreadyMember);
        }
        Ok(())
    }

    fn apply_post(
        &mut self,
        op: &Op,
        poster: UserId,
        message: &str,
    ) -> std::result::Result<(), RejectionReason> {
        // The share node never carries deltas, so a failed post records the
        // same node a successful one would.
        self.insert_dummy(op);
        if !self.has_predecessors(op) {
            return Err(RejectionReason::MissingPredecessors);
        }
        if !self.users.contains_key(&poster) {
            return Err(RejectionReason::UnknownPoster);
        }
        self.messages.push(Message {
            issuer: poster,
            content: message.to_owned(),
        });
        tracing::debug!(poster = %poster, "posted message");
        Ok(())
    }

    fn apply_removal<R: RngCore + CryptoRng>(
        &mut self,
        removal: &Removal<'_>,
        rng: &mut R,
    ) -> std::result::Result<(), RejectionReason> {
        if let Err(reason) = self.check_removal(removal) {
            self.insert_dummy(removal.op);
            return Err(reason);
        }
        let Some(removed) = self.users.remove(&removal.removed) else {
            self.insert_dummy(removal.op);
            return Err(RejectionReason::UnknownRemoved);
        };
        let transfers: Vec<OwnerTransfer> = removed
            .points
            .iter()
            .map(|p| OwnerTransfer {
                share_idx: *p,
                owner: removal.issuer,
            })
            .collect();
        if let Some(issuer) = self.users.get_mut(&removal.issuer) {
            debug_assert!(
                issuer.points.is_disjoint(&removed.points),
                "point sets must be disjoint"
            );
            issuer.points.extend(removed.points.iter().copied());
        }
        self.share_nodes.insert(
            removal.op.node_id,
            ShareNode::new(
                removal.op.node_id,
                share_random_secret(self.threshold, self.num_points, rng),
                transfers,
                removal.op.prev_ids.clone(),
            ),
        );
        tracing::debug!(issuer = %removal.issuer, removed = %removal.removed, "removed user");
        Ok(())
    }

    fn check_removal(&self, removal: &Removal<'_>) -> std::result::Result<(), RejectionReason> {
        if removal.issuer == removal.removed {
            return Err(RejectionReason::SelfRemove);
        }
        if !self.users.contains_key(&removal.issuer) {
            return Err(RejectionReason::UnknownIssuer);
        }
        if !self.users.contains_key(&removal.removed) {
            return Err(RejectionReason::UnknownRemoved);
        }
        Ok(())
    }

    /// Settle a pair of mirrored removals.
    ///
    /// Returns how many operations of the pair were consumed. When the first
    /// operation's own preconditions fail the pair is not consumed
    /// atomically: only the first is dropped and the second is retried on
    /// its own in the next step.
    fn apply_concurrent_removals<R: RngCore + CryptoRng>(
        &mut self,
        first: &Removal<'_>,
        second: &Removal<'_>,
        rng: &mut R,
    ) -> std::result::Result<usize, RejectionReason> {
        if let Err(reason) = self.check_removal(first) {
            self.insert_dummy(first.op);
            return Err(reason);
        }
        if !self.has_predecessors(second.op) {
            self.apply_removal(first, rng)?;
            self.insert_dummy(second.op);
            return Ok(2);
        }

        let frontier: Vec<NodeId> = first
            .op
            .prev_ids
            .iter()
            .chain(&second.op.prev_ids)
            .copied()
            .collect();
        let coin = match self.toss_coin(first.op.idx, &frontier) {
            Ok(coin) => coin,
            Err(err) => {
                // No coin, no winner: both removals are dropped as dummies
                // so the history stays referenceable.
                tracing::warn!(idx = first.op.idx, error = %err, "unable to compute coin toss; dropping both removals");
                self.insert_dummy(first.op);
                self.insert_dummy(second.op);
                return Ok(2);
            }
        };

        let p_win = self.winning_probability(first);
        tracing::debug!(idx = first.op.idx, coin, p_win, "settling concurrent removals");
        if coin < p_win {
            self.apply_removal(first, rng)?;
            self.insert_dummy(second.op);
        } else {
            self.apply_removal(second, rng)?;
            self.insert_dummy(first.op);
        }
        Ok(2)
    }

    /// Probability that `removal`'s issuer wins the toss, proportional to
    /// point ownership.
    fn winning_probability(&self, removal: &Removal<'_>) -> f64 {
        let issuer_points = self
            .users
            .get(&removal.issuer)
            .map_or(0, |u| u.points.len());
        let removed_points = self
            .users
            .get(&removal.removed)
            .map_or(0, |u| u.points.len());
        issuer_points as f64 / (issuer_points + removed_points) as f64
    }

    fn toss_coin(&self, seed: i64, frontier: &[NodeId]) -> Result<f64> {
        let shares = sharegraph::current_shares(&self.share_nodes, frontier)?;
        sharegraph::derive_coin(seed, &shares)
    }

    fn has_predecessors(&self, op: &Op) -> bool {
        op.prev_ids
            .iter()
            .all(|prev| self.share_nodes.contains_key(prev))
    }

    fn insert_dummy(&mut self, op: &Op) {
        self.share_nodes.insert(
            op.node_id,
            ShareNode::dummy(op.node_id, op.prev_ids.clone()),
        );
    }
}

/// The mirror of `first` if it sits right behind it in the operation list.
fn mirror_of<'a>(ops: &[&'a Op], i: usize, first: &Removal<'_>) -> Option<Removal<'a>> {
    let op = *ops.get(i + 1)?;
    match op.body {
        OpBody::Remove { issuer, removed }
            if issuer == first.removed && removed == first.issuer =>
        {
            Some(Removal {
                op,
                issuer,
                removed,
            })
        }
        _ => None,
    }
}
