//! Threshold secret sharing over the Ristretto255 scalar field
//!
//! Shamir sharing with a configurable reconstruction threshold: a secret is
//! the constant term of a random degree-`threshold` polynomial, and shares
//! are evaluations at x = 1..=n, so any `threshold + 1` of them recover it.
//! Shares can also be lifted into the group by multiplying a base point by
//! the share value; recovery then happens in the exponent, which is how the
//! coin toss turns accumulated shares into a single unpredictable element.

use crate::cointoss::arithmetic::random_scalar;
use crate::{Error, Result};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// One evaluation of the sharing polynomial
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, Debug)]
pub struct Share {
    /// Evaluation point (never zero)
    pub id: Scalar,
    /// Polynomial value at `id`
    pub value: Scalar,
}

/// A secret share hidden in a group element.
///
/// Used by the coin toss to keep the share value hidden while still letting
/// it contribute to a recoverable randomness source.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PointShare {
    pub id: Scalar,
    pub point: RistrettoPoint,
}

/// Split `secret` into `n` shares with reconstruction threshold
/// `threshold + 1`.
pub fn share_secret<R: RngCore + CryptoRng>(
    threshold: u32,
    n: u32,
    secret: &Scalar,
    rng: &mut R,
) -> Vec<Share> {
    let mut coeffs = Vec::with_capacity(threshold as usize + 1);
    coeffs.push(*secret);
    for _ in 0..threshold {
        coeffs.push(random_scalar(rng));
    }
    (1..=n)
        .map(|i| {
            let id = Scalar::from(u64::from(i));
            Share {
                id,
                value: eval(&coeffs, &id),
            }
        })
        .collect()
}

/// Split a freshly-sampled random secret.
pub fn share_random_secret<R: RngCore + CryptoRng>(
    threshold: u32,
    n: u32,
    rng: &mut R,
) -> Vec<Share> {
    let secret = random_scalar(rng);
    share_secret(threshold, n, &secret, rng)
}

/// Recover the secret scalar from at least `threshold + 1` shares.
pub fn recover_secret(threshold: u32, shares: &[Share]) -> Result<Scalar> {
    let needed = threshold as usize + 1;
    if shares.len() < needed {
        return Err(Error::NotEnoughShares {
            needed,
            got: shares.len(),
        });
    }
    let subset = &shares[..needed];
    let ids: Vec<Scalar> = subset.iter().map(|s| s.id).collect();
    Ok(subset
        .iter()
        .map(|s| lagrange_coefficient(&s.id, &ids) * s.value)
        .sum())
}

/// Lift a share into the group: `{id, base · value}`.
pub fn share_to_point(share: &Share, base: &RistrettoPoint) -> PointShare {
    PointShare {
        id: share.id,
        point: base * share.value,
    }
}

/// Recover `base · secret` from point shares by Lagrange interpolation in
/// the exponent, using every provided share.
pub fn recover_from_points(shares: &[PointShare]) -> Result<RistrettoPoint> {
    if shares.is_empty() {
        return Err(Error::NotEnoughShares { needed: 1, got: 0 });
    }
    let ids: Vec<Scalar> = shares.iter().map(|s| s.id).collect();
    Ok(shares
        .iter()
        .map(|s| s.point * lagrange_coefficient(&s.id, &ids))
        .sum())
}

/// Map a group element to a uniform number in [0, 1).
///
/// Canonical 32-byte encoding, SHA-256, first eight bytes as a little-endian
/// unsigned integer, divided by 2^64.
pub fn hash_point_to_unit(point: &RistrettoPoint) -> f64 {
    let digest = Sha256::digest(point.compress().to_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head) as f64 / 2f64.powi(64)
}

fn eval(coeffs: &[Scalar], x: &Scalar) -> Scalar {
    // Horner evaluation, highest coefficient first
    coeffs.iter().rev().fold(Scalar::ZERO, |acc, c| acc * x + c)
}

fn lagrange_coefficient(i: &Scalar, ids: &[Scalar]) -> Scalar {
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;
    for j in ids {
        if j == i {
            continue;
        }
        numerator *= -j;
        denominator *= i - j;
    }
    numerator * denominator.invert()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cointoss::arithmetic::hash_to_point;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_recover_secret_from_any_subset() {
        let mut rng = StdRng::seed_from_u64(0);
        let threshold = 20;
        let secret = Scalar::from(1234567890u64);
        let shares = share_secret(threshold, 50, &secret, &mut rng);
        assert_eq!(shares.len(), 50);

        let recovered = recover_secret(threshold, &shares[..21]).unwrap();
        assert_eq!(recovered, secret);
        let recovered = recover_secret(threshold, &shares[1..22]).unwrap();
        assert_eq!(recovered, secret);
        let recovered = recover_secret(threshold, &shares).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn test_too_few_shares_is_an_error() {
        let mut rng = StdRng::seed_from_u64(0);
        let shares = share_secret(5, 10, &Scalar::from(7u64), &mut rng);
        let err = recover_secret(5, &shares[..5]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::NotEnoughShares { needed: 6, got: 5 }
        ));
    }

    #[test]
    fn test_recover_in_the_exponent() {
        let mut rng = StdRng::seed_from_u64(0);
        let threshold = 20;
        let secret = Scalar::from(1234567890u64);
        let base = hash_to_point(b"base", b"sharing-tests");
        let shares = share_secret(threshold, 50, &secret, &mut rng);

        let hidden: Vec<PointShare> = shares.iter().map(|s| share_to_point(s, &base)).collect();
        let recovered = recover_from_points(&hidden).unwrap();
        assert_eq!(recovered.compress(), (base * secret).compress());
    }

    #[test]
    fn test_recover_from_no_points_is_an_error() {
        assert!(recover_from_points(&[]).is_err());
    }

    #[test]
    fn test_hash_point_to_unit_range_and_determinism() {
        let point = hash_to_point(b"base", b"point");
        let val = hash_point_to_unit(&point);
        assert!((0.0..1.0).contains(&val));
        assert_eq!(val, hash_point_to_unit(&point));
    }

    #[test]
    fn test_hash_point_to_unit_spreads_evenly() {
        let vals: Vec<f64> = (0u64..1000)
            .map(|i| hash_point_to_unit(&hash_to_point(&i.to_le_bytes(), b"spread")))
            .collect();
        let mean = vals.iter().sum::<f64>() / vals.len() as f64;
        assert!((0.45..0.55).contains(&mean), "mean was {mean}");
        assert!(vals.iter().any(|v| *v < 0.05));
        assert!(vals.iter().any(|v| *v > 0.95));
    }
}
