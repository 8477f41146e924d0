// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Pedersen commitments and key images over Ristretto255.
//!
//! A commitment to `value` with blinding factor `r` is `r*G + value*H`. `G` is
//! the Ristretto basepoint and `H` is obtained by hashing the encoding of `G`
//! to the group, so nobody knows `log_G(H)`.

use crate::consensus::{Money, POINT_SIZE};
use blake2::Blake2b512;
use curve25519_dalek::constants::{RISTRETTO_BASEPOINT_COMPRESSED, RISTRETTO_BASEPOINT_POINT};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use lazy_static::*;
use rand::{CryptoRng, RngCore};

lazy_static! {
    /// Value generator
    pub static ref GENERATOR_H: RistrettoPoint =
        RistrettoPoint::hash_from_bytes::<Blake2b512>(RISTRETTO_BASEPOINT_COMPRESSED.as_bytes());
}

/// Blinding generator
#[inline]
#[must_use]
pub fn generator_g() -> RistrettoPoint {
    RISTRETTO_BASEPOINT_POINT
}

#[must_use]
pub fn commit(value: u64, blind: &Scalar) -> RistrettoPoint {
    blind * RISTRETTO_BASEPOINT_POINT + Scalar::from(value) * *GENERATOR_H
}

/// Commitment to a plain amount, with a zero blinding factor
#[must_use]
pub fn commit_plain(value: Money) -> Option<RistrettoPoint> {
    let value = u64::try_from(value).ok()?;
    Some(commit(value, &Scalar::ZERO))
}

/// `sum(positive) - sum(negative)`
#[must_use]
pub fn blind_sum(positive: &[Scalar], negative: &[Scalar]) -> Scalar {
    positive.iter().sum::<Scalar>() - negative.iter().sum::<Scalar>()
}

/// Returns true if both sides commit to the same total
#[must_use]
pub fn verify_tally(commits: &[RistrettoPoint], against: &[RistrettoPoint]) -> bool {
    let lhs: RistrettoPoint = commits.iter().sum();
    let rhs: RistrettoPoint = against.iter().sum();
    lhs == rhs
}

/// Decodes a compressed point. Fails on non canonical encodings.
#[must_use]
pub fn decompress(bytes: &[u8]) -> Option<RistrettoPoint> {
    if bytes.len() != POINT_SIZE {
        return None;
    }

    CompressedRistretto::from_slice(bytes).ok()?.decompress()
}

/// Decodes a canonical scalar
#[must_use]
pub fn scalar_from_bytes(bytes: &[u8]) -> Option<Scalar> {
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    Option::from(Scalar::from_canonical_bytes(bytes))
}

#[must_use]
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    Scalar::random(rng)
}

/// Maps a compressed point to a group element with unknown discrete log
#[must_use]
pub fn hash_to_point(bytes: &[u8]) -> RistrettoPoint {
    RistrettoPoint::hash_from_bytes::<Blake2b512>(bytes)
}

/// Key image of the one-time key `pk` with secret `sk`: `sk * Hp(pk)`
#[must_use]
pub fn get_key_image(pk: &RistrettoPoint, sk: &Scalar) -> [u8; POINT_SIZE] {
    (sk * hash_to_point(pk.compress().as_bytes()))
        .compress()
        .to_bytes()
}

/// One-time public key of `sk`
#[must_use]
pub fn public_key(sk: &Scalar) -> RistrettoPoint {
    sk * RISTRETTO_BASEPOINT_POINT
}

#[must_use]
pub fn is_identity(point: &RistrettoPoint) -> bool {
    *point == RistrettoPoint::identity()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[quickcheck]
    fn commitments_are_homomorphic(a: u32, b: u32, seed: u64) -> bool {
        let mut rng = StdRng::seed_from_u64(seed);
        let ra = random_scalar(&mut rng);
        let rb = random_scalar(&mut rng);

        let sum = commit(u64::from(a), &ra) + commit(u64::from(b), &rb);
        sum == commit(u64::from(a) + u64::from(b), &(ra + rb))
    }

    #[test]
    fn it_verifies_tally() {
        let mut rng = StdRng::seed_from_u64(1);
        let r1 = random_scalar(&mut rng);
        let r2 = random_scalar(&mut rng);
        let input = commit(100, &(r1 + r2));
        let outs = [commit(60, &r1), commit(40, &r2)];

        assert!(verify_tally(&[input], &outs));

        let perturbed = [commit(61, &r1), commit(40, &r2)];
        assert!(!verify_tally(&[input], &perturbed));
    }

    #[test]
    fn it_sums_blinds() {
        let mut rng = StdRng::seed_from_u64(2);
        let a = random_scalar(&mut rng);
        let b = random_scalar(&mut rng);
        let c = random_scalar(&mut rng);
        assert_eq!(blind_sum(&[a, b], &[c]), a + b - c);
        assert_eq!(blind_sum(&[], &[]), Scalar::ZERO);
    }

    #[test]
    fn it_derives_distinct_generators() {
        assert_ne!(*GENERATOR_H, generator_g());
        assert!(!is_identity(&GENERATOR_H));
        assert_eq!(commit_plain(5), Some(Scalar::from(5_u64) * *GENERATOR_H));
        assert_eq!(commit_plain(-1), None);
    }

    #[test]
    fn key_images_depend_on_key_only() {
        let mut rng = StdRng::seed_from_u64(3);
        let sk = random_scalar(&mut rng);
        let pk = public_key(&sk);
        assert_eq!(get_key_image(&pk, &sk), get_key_image(&pk, &sk));

        let other = random_scalar(&mut rng);
        assert_ne!(
            get_key_image(&pk, &sk),
            get_key_image(&public_key(&other), &other)
        );
    }

    #[test]
    fn it_rejects_malformed_points() {
        assert!(decompress(&[0xff; 32]).is_none());
        assert!(decompress(&[0; 31]).is_none());
        let p = generator_g();
        assert_eq!(decompress(p.compress().as_bytes()), Some(p));
    }
}
