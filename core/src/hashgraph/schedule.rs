//! Seeded deterministic scheduling over a DAG
//!
//! The runner walks a graph from a single root and executes every reachable
//! node exactly once. Successors become ready only once all of their
//! predecessors have executed; ties between concurrently-ready siblings are
//! broken by a reproducible permutation, so two runs with the same seed visit
//! nodes in the same order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Execute every node reachable from `root` exactly once.
///
/// `successors` and `predecessors` describe the graph shape; `execute` runs
/// the node's effect. Execution failures are logged and do not abort the
/// traversal.
pub fn run<I, S, P, E>(seed: i64, root: I, mut successors: S, mut predecessors: P, mut execute: E)
where
    I: Copy + Eq + Hash,
    S: FnMut(I) -> Vec<I>,
    P: FnMut(I) -> Vec<I>,
    E: FnMut(I) -> crate::Result<()>,
{
    let mut rng = StdRng::seed_from_u64(seed as u64);
    let mut queue: VecDeque<I> = VecDeque::new();
    let mut scheduled: HashSet<I> = HashSet::new();
    let mut executed: HashSet<I> = HashSet::new();

    queue.push_back(root);
    scheduled.insert(root);

    while let Some(curr) = queue.pop_front() {
        if let Err(err) = execute(curr) {
            tracing::error!(error = %err, "error executing operation");
        }
        executed.insert(curr);

        // Only enqueue successors whose predecessors have all run, so each
        // node observes fully-accumulated predecessor state.
        let mut ready: Vec<I> = Vec::new();
        for next in successors(curr) {
            if scheduled.contains(&next) {
                continue;
            }
            if predecessors(next).iter().all(|p| executed.contains(p)) {
                scheduled.insert(next);
                ready.push(next);
            }
        }
        ready.shuffle(&mut rng);
        queue.extend(ready);

        debug_assert!(
            executed.iter().all(|id| scheduled.contains(id)),
            "every executed node must have been scheduled"
        );
        debug_assert!(
            queue.iter().all(|id| scheduled.contains(id)),
            "every queued node must have been flagged as scheduled"
        );
        debug_assert!(
            queue.iter().all(|id| !executed.contains(id)),
            "no queued node may have executed already"
        );
    }
}
