//! Discrete-log equality proofs
//!
//! Chaum-Pedersen NIZK that two group elements `A = G·x` and `B = H·x` hide
//! the same scalar, without revealing it. A participant publishing a point
//! share against the conflict base can attach one of these against a fixed
//! commitment base, letting anyone check the share was formed from the
//! committed value rather than an arbitrary point.

use crate::cointoss::arithmetic::{hash_to_scalar, random_scalar};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

const CHALLENGE_DST: &[u8] = b"dleq_challenge";

/// Non-interactive proof that `log_g(a) == log_h(b)`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct DleqProof {
    challenge: Scalar,
    response: Scalar,
}

impl DleqProof {
    /// Prove knowledge of `x` with `a = g·x` and `b = h·x`.
    pub fn prove<R: RngCore + CryptoRng>(
        x: &Scalar,
        g: &RistrettoPoint,
        a: &RistrettoPoint,
        h: &RistrettoPoint,
        b: &RistrettoPoint,
        rng: &mut R,
    ) -> Self {
        let nonce = random_scalar(rng);
        let commit_g = g * nonce;
        let commit_h = h * nonce;
        let challenge = challenge(g, a, h, b, &commit_g, &commit_h);
        DleqProof {
            challenge,
            response: nonce + challenge * x,
        }
    }

    /// Check the proof against the claimed relation.
    pub fn verify(
        &self,
        g: &RistrettoPoint,
        a: &RistrettoPoint,
        h: &RistrettoPoint,
        b: &RistrettoPoint,
    ) -> bool {
        // Reconstruct the prover's commitments from the response
        let commit_g = g * self.response - a * self.challenge;
        let commit_h = h * self.response - b * self.challenge;
        challenge(g, a, h, b, &commit_g, &commit_h) == self.challenge
    }
}

fn challenge(
    g: &RistrettoPoint,
    a: &RistrettoPoint,
    h: &RistrettoPoint,
    b: &RistrettoPoint,
    commit_g: &RistrettoPoint,
    commit_h: &RistrettoPoint,
) -> Scalar {
    let mut transcript = Vec::with_capacity(6 * 32);
    for point in [g, a, h, b, commit_g, commit_h] {
        transcript.extend_from_slice(&point.compress().to_bytes());
    }
    hash_to_scalar(&transcript, CHALLENGE_DST)
}
