// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Multilayered linkable spontaneous anonymous group signatures.
//!
//! The public key matrix has `n_cols` ring members and `n_rows` rows. Entry
//! `(col, row)` lives at `col + row * n_cols`. Every row except the last holds
//! one-time keys and produces a key image. The last row holds the commitment
//! sums of each column, whose discrete log is only known for the real column
//! when inputs and outputs balance.

use crate::consensus::POINT_SIZE;
use crate::ringct::{decompress, hash_to_point, scalar_from_bytes};
use blake2::{Blake2b512, Digest};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use std::fmt;

/// Signature without key images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlsagSignature {
    pub c0: Scalar,
    pub ss: Vec<Scalar>,
}

impl MlsagSignature {
    /// `c0 || ss`
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((1 + self.ss.len()) * 32);
        out.extend_from_slice(self.c0.as_bytes());
        for s in &self.ss {
            out.extend_from_slice(s.as_bytes());
        }
        out
    }

    /// Decodes the first `(1 + n_cols * n_rows) * 32` bytes of `bytes`
    pub fn from_bytes(bytes: &[u8], n_cols: usize, n_rows: usize) -> Result<Self, MlsagErr> {
        let n = n_cols * n_rows;
        if bytes.len() < (1 + n) * 32 {
            return Err(MlsagErr::BadSignatureSize);
        }

        let c0 = scalar_from_bytes(&bytes[..32]).ok_or(MlsagErr::BadScalar)?;
        let ss = bytes[32..(1 + n) * 32]
            .chunks_exact(32)
            .map(|chunk| scalar_from_bytes(chunk).ok_or(MlsagErr::BadScalar))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { c0, ss })
    }
}

/// Fills the last row of `m` with `sum(column inputs) - sum(outputs)`.
///
/// `m` must have `n_cols * n_rows` entries, the first `n_rows - 1` rows being
/// the ring keys. `in_commits` holds the commitments of the ring members laid
/// out like the key rows.
pub fn prepare_mlsag(
    m: &mut [RistrettoPoint],
    in_commits: &[RistrettoPoint],
    out_commits: &[RistrettoPoint],
    n_cols: usize,
    n_rows: usize,
) -> Result<(), MlsagErr> {
    if n_cols < 1 || n_rows < 2 || m.len() != n_cols * n_rows {
        return Err(MlsagErr::BadDimensions);
    }

    let key_rows = n_rows - 1;
    if in_commits.len() != n_cols * key_rows || out_commits.is_empty() {
        return Err(MlsagErr::BadDimensions);
    }

    let out_sum: RistrettoPoint = out_commits.iter().sum();
    for col in 0..n_cols {
        let in_sum: RistrettoPoint = (0..key_rows).map(|row| in_commits[col + row * n_cols]).sum();
        m[col + key_rows * n_cols] = in_sum - out_sum;
    }

    Ok(())
}

/// Signs `msg` with the secrets of column `index`.
///
/// `sks` has one secret per row, the last one being the blinding factor of the
/// commitment row. Returns the key images of the key rows and the signature.
pub fn generate_mlsag<R: RngCore + CryptoRng>(
    rng: &mut R,
    msg: &[u8; 32],
    n_cols: usize,
    n_rows: usize,
    index: usize,
    sks: &[Scalar],
    m: &[RistrettoPoint],
) -> Result<(Vec<[u8; POINT_SIZE]>, MlsagSignature), MlsagErr> {
    if n_cols < 1 || n_rows < 2 || m.len() != n_cols * n_rows || sks.len() != n_rows {
        return Err(MlsagErr::BadDimensions);
    }

    if index >= n_cols {
        return Err(MlsagErr::BadIndex);
    }

    let key_rows = n_rows - 1;
    for (row, sk) in sks.iter().enumerate() {
        if sk * RISTRETTO_BASEPOINT_POINT != m[index + row * n_cols] {
            return Err(MlsagErr::SecretMismatch);
        }
    }

    let hp: Vec<RistrettoPoint> = (0..key_rows)
        .map(|row| hash_to_point(m[index + row * n_cols].compress().as_bytes()))
        .collect();
    let key_images: Vec<RistrettoPoint> = (0..key_rows).map(|row| sks[row] * hp[row]).collect();

    let alpha: Vec<Scalar> = (0..n_rows).map(|_| Scalar::random(rng)).collect();
    let mut ss = vec![Scalar::ZERO; n_cols * n_rows];

    let mut hasher = Blake2b512::new().chain_update(msg);
    for row in 0..n_rows {
        hasher.update((alpha[row] * RISTRETTO_BASEPOINT_POINT).compress().as_bytes());
        if row < key_rows {
            hasher.update((alpha[row] * hp[row]).compress().as_bytes());
        }
    }
    let mut c = Scalar::from_hash(hasher);

    let mut c0 = None;
    let mut col = (index + 1) % n_cols;
    if col == 0 {
        c0 = Some(c);
    }

    while col != index {
        for row in 0..n_rows {
            ss[col + row * n_cols] = Scalar::random(rng);
        }
        c = next_challenge(msg, n_cols, n_rows, col, m, &key_images, &ss, &c);

        col = (col + 1) % n_cols;
        if col == 0 {
            c0 = Some(c);
        }
    }

    for row in 0..n_rows {
        ss[index + row * n_cols] = alpha[row] - c * sks[row];
    }

    let c0 = c0.ok_or(MlsagErr::BadIndex)?;
    let key_images = key_images
        .iter()
        .map(|ki| ki.compress().to_bytes())
        .collect();

    Ok((key_images, MlsagSignature { c0, ss }))
}

/// Verifies a signature over `msg` against the full key matrix `m`
pub fn verify_mlsag_signature(
    msg: &[u8; 32],
    n_cols: usize,
    n_rows: usize,
    m: &[RistrettoPoint],
    key_images: &[u8],
    sig: &MlsagSignature,
) -> Result<(), MlsagErr> {
    if n_cols < 1 || n_rows < 2 || m.len() != n_cols * n_rows {
        return Err(MlsagErr::BadDimensions);
    }

    let key_rows = n_rows - 1;
    if sig.ss.len() != n_cols * n_rows || key_images.len() != key_rows * POINT_SIZE {
        return Err(MlsagErr::BadDimensions);
    }

    let key_images = key_images
        .chunks_exact(POINT_SIZE)
        .map(|ki| decompress(ki).ok_or(MlsagErr::BadKeyImage))
        .collect::<Result<Vec<_>, _>>()?;

    let mut c = sig.c0;
    for col in 0..n_cols {
        c = next_challenge(msg, n_cols, n_rows, col, m, &key_images, &sig.ss, &c);
    }

    if c == sig.c0 {
        Ok(())
    } else {
        Err(MlsagErr::VerifyFailed)
    }
}

#[allow(clippy::too_many_arguments)]
fn next_challenge(
    msg: &[u8; 32],
    n_cols: usize,
    n_rows: usize,
    col: usize,
    m: &[RistrettoPoint],
    key_images: &[RistrettoPoint],
    ss: &[Scalar],
    c: &Scalar,
) -> Scalar {
    let mut hasher = Blake2b512::new().chain_update(msg);
    for row in 0..n_rows {
        let pos = col + row * n_cols;
        let l = ss[pos] * RISTRETTO_BASEPOINT_POINT + c * m[pos];
        hasher.update(l.compress().as_bytes());

        if row < n_rows - 1 {
            let hp = hash_to_point(m[pos].compress().as_bytes());
            let r = ss[pos] * hp + c * key_images[row];
            hasher.update(r.compress().as_bytes());
        }
    }

    Scalar::from_hash(hasher)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MlsagErr {
    /// Matrix, secret or signature dimensions do not match
    BadDimensions,

    /// The real column is out of range
    BadIndex,

    /// A secret does not open its matrix entry
    SecretMismatch,

    /// A key image is not a valid point
    BadKeyImage,

    /// The signature is too short
    BadSignatureSize,

    /// A scalar is not canonically encoded
    BadScalar,

    /// The ring does not close
    VerifyFailed,
}

impl fmt::Display for MlsagErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadDimensions => write!(f, "bad mlsag dimensions"),
            Self::BadIndex => write!(f, "bad mlsag index"),
            Self::SecretMismatch => write!(f, "secret does not match public key"),
            Self::BadKeyImage => write!(f, "bad key image"),
            Self::BadSignatureSize => write!(f, "bad signature size"),
            Self::BadScalar => write!(f, "bad scalar encoding"),
            Self::VerifyFailed => write!(f, "mlsag verification failed"),
        }
    }
}
