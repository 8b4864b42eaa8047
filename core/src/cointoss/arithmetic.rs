//! Thin adapter over the Ristretto255 prime-order group
//!
//! Scalar and point algebra comes straight from `curve25519-dalek`; this
//! module only adds the domain-separated hash-to-group helpers and the
//! explicit RNG entry point the rest of the crate goes through.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::Scalar;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};

/// Hash arbitrary bytes to a uniformly-distributed group element.
pub fn hash_to_point(msg: &[u8], dst: &[u8]) -> RistrettoPoint {
    let mut hasher = Sha512::new();
    hasher.update(dst);
    hasher.update(msg);
    RistrettoPoint::from_hash(hasher)
}

/// Hash arbitrary bytes to a uniformly-distributed scalar.
pub fn hash_to_scalar(msg: &[u8], dst: &[u8]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(dst);
    hasher.update(msg);
    Scalar::from_hash(hasher)
}

/// Sample a uniformly random scalar from the caller's RNG.
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    Scalar::random(rng)
}
