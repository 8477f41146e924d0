// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Range proofs of blinded amounts.
//!
//! A commitment `C = r*G + v*H` is split into one commitment per bit of `v`,
//! `C_i = r_i*G + b_i*2^i*H` with `sum(r_i) = r`, so the bit commitments add
//! up to `C`. Every bit commitment carries a two key ring signature over
//! `{C_i, C_i - 2^i*H}`, which can only be produced when `b_i` is 0 or 1.
//! Together they show that `v` is in `[0, 2^64)`.
//!
//! Each bit is encoded as `C_i || e0 || s0 || s1`.

use crate::consensus::POINT_SIZE;
use crate::ringct::{commit, decompress, random_scalar, scalar_from_bytes, GENERATOR_H};
use blake2::{Blake2b512, Digest};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use std::fmt;
use zeroize::Zeroize;

/// Bits covered by a proof
pub const RANGE_PROOF_BITS: usize = 64;

const BIT_PROOF_SIZE: usize = POINT_SIZE + 3 * 32;

/// Encoded size of a range proof
pub const RANGE_PROOF_SIZE: usize = RANGE_PROOF_BITS * BIT_PROOF_SIZE;

const RANGE_PROOF_TAG: &[u8] = b"veil-rangeproof";

/// Proves that `commit(value, blind)` hides a value in `[0, 2^64)`
pub fn prove_range<R: RngCore + CryptoRng>(rng: &mut R, value: u64, blind: &Scalar) -> Vec<u8> {
    let c = commit(value, blind).compress().to_bytes();
    let mut out = Vec::with_capacity(RANGE_PROOF_SIZE);

    let mut remaining = *blind;
    let mut h_i = *GENERATOR_H;

    for i in 0..RANGE_PROOF_BITS {
        let mut r_i = if i == RANGE_PROOF_BITS - 1 {
            remaining
        } else {
            random_scalar(rng)
        };
        remaining -= r_i;

        let bit = ((value >> i) & 1) as usize;
        let mut c_i = r_i * RISTRETTO_BASEPOINT_POINT;
        if bit == 1 {
            c_i += h_i;
        }
        let c_i_bytes = c_i.compress().to_bytes();
        let keys = [c_i, c_i - h_i];

        // The ring starts at the real key and closes back on it
        let mut alpha = random_scalar(rng);
        let other = 1 - bit;
        let e_other = bit_challenge(&c, i, &c_i_bytes, &(alpha * RISTRETTO_BASEPOINT_POINT));
        let s_other = random_scalar(rng);
        let l_other =
            RistrettoPoint::vartime_double_scalar_mul_basepoint(&e_other, &keys[other], &s_other);
        let e_real = bit_challenge(&c, i, &c_i_bytes, &l_other);
        let s_real = alpha - e_real * r_i;

        let (e0, s0, s1) = if bit == 0 {
            (e_real, s_real, s_other)
        } else {
            (e_other, s_other, s_real)
        };

        out.extend_from_slice(&c_i_bytes);
        out.extend_from_slice(e0.as_bytes());
        out.extend_from_slice(s0.as_bytes());
        out.extend_from_slice(s1.as_bytes());

        alpha.zeroize();
        r_i.zeroize();
        h_i += h_i;
    }

    out
}

/// Checks that `proof` shows `commitment` hides a value in `[0, 2^64)`
pub fn verify_range_proof(commitment: &RistrettoPoint, proof: &[u8]) -> Result<(), RangeProofErr> {
    if proof.len() != RANGE_PROOF_SIZE {
        return Err(RangeProofErr::BadSize);
    }

    let c = commitment.compress().to_bytes();
    let mut sum = RistrettoPoint::identity();
    let mut h_i = *GENERATOR_H;

    for (i, chunk) in proof.chunks_exact(BIT_PROOF_SIZE).enumerate() {
        let c_i_bytes = &chunk[..POINT_SIZE];
        let c_i = decompress(c_i_bytes).ok_or(RangeProofErr::BadPoint)?;
        let e0 = scalar_from_bytes(&chunk[POINT_SIZE..POINT_SIZE + 32])
            .ok_or(RangeProofErr::BadScalar)?;
        let s0 = scalar_from_bytes(&chunk[POINT_SIZE + 32..POINT_SIZE + 64])
            .ok_or(RangeProofErr::BadScalar)?;
        let s1 = scalar_from_bytes(&chunk[POINT_SIZE + 64..]).ok_or(RangeProofErr::BadScalar)?;

        let l0 = RistrettoPoint::vartime_double_scalar_mul_basepoint(&e0, &c_i, &s0);
        let e1 = bit_challenge(&c, i, c_i_bytes, &l0);
        let l1 = RistrettoPoint::vartime_double_scalar_mul_basepoint(&e1, &(c_i - h_i), &s1);
        if bit_challenge(&c, i, c_i_bytes, &l1) != e0 {
            return Err(RangeProofErr::BadBitProof(i));
        }

        sum += c_i;
        h_i += h_i;
    }

    if sum != *commitment {
        return Err(RangeProofErr::BadSum);
    }

    Ok(())
}

fn bit_challenge(c: &[u8; POINT_SIZE], i: usize, c_i: &[u8], l: &RistrettoPoint) -> Scalar {
    let hasher = Blake2b512::new()
        .chain_update(RANGE_PROOF_TAG)
        .chain_update(c)
        .chain_update([i as u8])
        .chain_update(c_i)
        .chain_update(l.compress().as_bytes());

    Scalar::from_hash(hasher)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeProofErr {
    /// The proof does not have the size of a 64 bit proof
    BadSize,

    /// A bit commitment is not a valid point
    BadPoint,

    /// A scalar is not canonically encoded
    BadScalar,

    /// The ring of the given bit does not close
    BadBitProof(usize),

    /// The bit commitments do not add up to the output commitment
    BadSum,
}

impl fmt::Display for RangeProofErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSize => write!(f, "bad range proof size"),
            Self::BadPoint => write!(f, "bad bit commitment"),
            Self::BadScalar => write!(f, "bad scalar encoding"),
            Self::BadBitProof(i) => write!(f, "bad proof for bit {}", i),
            Self::BadSum => write!(f, "bit commitments do not match commitment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ringct::commit_plain;
    use quickcheck_macros::quickcheck;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn it_proves_bounds_of_range() {
        let mut rng = StdRng::seed_from_u64(31);

        for value in [0, 1, 2, 1 << 63, u64::MAX] {
            let blind = random_scalar(&mut rng);
            let proof = prove_range(&mut rng, value, &blind);
            assert_eq!(proof.len(), RANGE_PROOF_SIZE);
            assert!(verify_range_proof(&commit(value, &blind), &proof).is_ok());
        }
    }

    #[quickcheck]
    fn proofs_only_open_their_commitment(value: u64, other: u64, seed: u64) -> bool {
        let mut rng = StdRng::seed_from_u64(seed);
        let blind = random_scalar(&mut rng);
        let proof = prove_range(&mut rng, value, &blind);

        let verifies = verify_range_proof(&commit(value, &blind), &proof).is_ok();
        let verifies_other = verify_range_proof(&commit(other, &blind), &proof).is_ok();
        verifies && (verifies_other == (value == other))
    }

    #[test]
    fn it_rejects_negative_amounts() {
        let mut rng = StdRng::seed_from_u64(32);
        let blind = random_scalar(&mut rng);

        // Commits to -5 by subtracting a plain commitment
        let negative = commit(0, &blind) - commit_plain(5).unwrap();

        // The best a prover can do is prove 2^64 - 5, which differs by 2^64 * H
        let proof = prove_range(&mut rng, u64::MAX - 4, &blind);
        assert_eq!(
            verify_range_proof(&negative, &proof),
            Err(RangeProofErr::BadSum)
        );
    }

    #[test]
    fn it_rejects_tampered_proofs() {
        let mut rng = StdRng::seed_from_u64(33);
        let blind = random_scalar(&mut rng);
        let c = commit(1000, &blind);
        let proof = prove_range(&mut rng, 1000, &blind);

        assert_eq!(
            verify_range_proof(&c, &proof[..RANGE_PROOF_SIZE - 1]),
            Err(RangeProofErr::BadSize)
        );
        assert_eq!(verify_range_proof(&c, &[]), Err(RangeProofErr::BadSize));

        // Swap the rings of bit 3 and bit 5
        let mut swapped = proof.clone();
        let (a, b) = (3 * BIT_PROOF_SIZE, 5 * BIT_PROOF_SIZE);
        let bit3 = proof[a..a + BIT_PROOF_SIZE].to_vec();
        swapped[a..a + BIT_PROOF_SIZE].copy_from_slice(&proof[b..b + BIT_PROOF_SIZE]);
        swapped[b..b + BIT_PROOF_SIZE].copy_from_slice(&bit3);
        assert!(matches!(
            verify_range_proof(&c, &swapped),
            Err(RangeProofErr::BadBitProof(3))
        ));

        let mut bad_scalar = proof.clone();
        bad_scalar[POINT_SIZE..POINT_SIZE + 32].copy_from_slice(&[0xff; 32]);
        assert_eq!(
            verify_range_proof(&c, &bad_scalar),
            Err(RangeProofErr::BadScalar)
        );

        // Moving value between bit commitments keeps the sum but breaks the rings
        let mut shifted = proof;
        let c0 = decompress(&shifted[..POINT_SIZE]).unwrap() + *GENERATOR_H;
        let c1_at = BIT_PROOF_SIZE;
        let c1 = decompress(&shifted[c1_at..c1_at + POINT_SIZE]).unwrap() - *GENERATOR_H;
        shifted[..POINT_SIZE].copy_from_slice(c0.compress().as_bytes());
        shifted[c1_at..c1_at + POINT_SIZE].copy_from_slice(c1.compress().as_bytes());
        assert!(matches!(
            verify_range_proof(&c, &shifted),
            Err(RangeProofErr::BadBitProof(0))
        ));
    }
}
