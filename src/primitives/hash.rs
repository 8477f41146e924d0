// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::hash::Hash as HashTrait;
use zeroize::Zeroize;

#[derive(
    PartialEq,
    Eq,
    Encode,
    Decode,
    Clone,
    HashTrait,
    Zeroize,
    PartialOrd,
    Ord,
    Default,
    Copy,
    Serialize,
    Deserialize,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn zero() -> Self {
        Self([0; 32])
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Double SHA-256 of the given bytes
    #[inline]
    pub fn hash_from_slice<T: AsRef<[u8]>>(slice: T) -> Self {
        Self(sha256d(slice.as_ref()))
    }

    /// Low 32 bits of the hash, interpreting it as a little endian number.
    #[must_use]
    pub fn low_u32(&self) -> u32 {
        let mut buf = [0; 4];
        buf.copy_from_slice(&self.0[..4]);
        u32::from_le_bytes(buf)
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(v: [u8; 32]) -> Self {
        Self(v)
    }
}

impl From<Vec<u8>> for Hash256 {
    fn from(v: Vec<u8>) -> Self {
        debug_assert_eq!(v.len(), 32);
        let mut h: Self = Default::default();
        h.0.copy_from_slice(&v);
        h
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash256").field(&self.to_hex()).finish()
    }
}

#[inline]
#[must_use]
pub fn sha256d(bytes: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(bytes);
    Sha256::digest(first).into()
}

#[inline]
#[must_use]
pub fn sha512d(bytes: &[u8]) -> [u8; 64] {
    let first = Sha512::digest(bytes);
    Sha512::digest(first).into()
}

/// Writes the consensus byte layout of a structure and hashes it with double
/// SHA-256. Integers are little endian and variable length fields are
/// prefixed with a compact size.
#[derive(Default, Clone)]
pub struct HashWriter {
    buf: Vec<u8>,
}

impl HashWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> &mut Self {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> &mut Self {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_compact_size(&mut self, len: u64) -> &mut Self {
        write_compact_size(&mut self.buf, len);
        self
    }

    /// Length prefixed bytes
    pub fn write_var_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_compact_size(bytes.len() as u64);
        self.write_bytes(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn finalize(&self) -> Hash256 {
        Hash256::hash_from_slice(&self.buf)
    }
}

/// Bitcoin style compact size prefix
pub fn write_compact_size(buf: &mut Vec<u8>, len: u64) {
    if len < 253 {
        buf.push(len as u8);
    } else if len <= 0xffff {
        buf.push(253);
        buf.extend_from_slice(&(len as u16).to_le_bytes());
    } else if len <= 0xffff_ffff {
        buf.push(254);
        buf.extend_from_slice(&(len as u32).to_le_bytes());
    } else {
        buf.push(255);
        buf.extend_from_slice(&len.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256d_test() {
        let result = hex::encode(sha256d(b""));

        assert_eq!(
            &result,
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn it_writes_compact_sizes() {
        let mut buf = vec![];
        write_compact_size(&mut buf, 252);
        assert_eq!(buf, vec![252]);

        let mut buf = vec![];
        write_compact_size(&mut buf, 253);
        assert_eq!(buf, vec![253, 253, 0]);

        let mut buf = vec![];
        write_compact_size(&mut buf, 0x10000);
        assert_eq!(buf, vec![254, 0, 0, 1, 0]);
    }

    #[test]
    fn it_hashes_written_layout() {
        let mut writer = HashWriter::new();
        writer.write_u32(1).write_var_bytes(&[0xaa, 0xbb]);
        assert_eq!(writer.as_bytes(), &[1, 0, 0, 0, 2, 0xaa, 0xbb]);
        assert_eq!(
            writer.finalize(),
            Hash256::hash_from_slice([1, 0, 0, 0, 2, 0xaa, 0xbb])
        );
    }

    #[test]
    fn it_reads_low_u32() {
        let mut h = Hash256::zero();
        h.0[0] = 0x78;
        h.0[1] = 0x56;
        h.0[2] = 0x34;
        h.0[3] = 0x12;
        assert_eq!(h.low_u32(), 0x1234_5678);
    }
}
