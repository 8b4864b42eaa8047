//! Verifiable coin-toss primitives
//!
//! Everything the access-control state machine needs to turn a causal
//! history into an unpredictable yet replayable random number: Ristretto255
//! scalar/point helpers, Shamir sharing over the scalar field, recovery in
//! the exponent, and hashing a group element down to [0, 1).

pub mod arithmetic;
pub mod dleq;
pub mod sharing;

pub use arithmetic::{hash_to_point, hash_to_scalar, random_scalar};
pub use dleq::DleqProof;
pub use sharing::{
    hash_point_to_unit, recover_from_points, recover_secret, share_random_secret, share_secret,
    share_to_point, PointShare, Share,
};
