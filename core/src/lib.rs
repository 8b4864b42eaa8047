//! darc Core Library
//!
//! Research prototype of a decentralized, randomized access-control CRDT for
//! a shared messaging application. Participants issue operations (init, add,
//! remove, post) over a causal hashgraph; every replica that observes the same
//! graph replays the same membership set and message log. Concurrent mutual
//! removals are settled by a verifiable coin toss recovered from threshold
//! secret shares accumulated along the causal history.

pub mod app;
pub mod cointoss;
pub mod crdt;
pub mod hashgraph;
pub mod types;

pub use types::*;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("another operation already occupies index {idx:#x}")]
    IndexCollision { idx: i64 },

    #[error("init operation had already been issued")]
    DuplicateInit,

    #[error("replay is already initialized")]
    AlreadyInitialized,

    #[error("share graph node {0} does not exist")]
    MissingShareNode(types::NodeId),

    #[error("not enough shares: need {needed}, got {got}")]
    NotEnoughShares { needed: usize, got: usize },

    #[error("share subgraph has no root")]
    RootlessSubgraph,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
