// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::primitives::{sha256d, write_compact_size, Hash256};
use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use ibig::modular::ModuloRing;
use ibig::UBig;
use std::fmt;

/// Non-negative arbitrary precision integer used by the zerocoin group and
/// the accumulators.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BigNum(pub UBig);

impl BigNum {
    #[must_use]
    pub fn zero() -> Self {
        Self(UBig::from(0_u8))
    }

    #[must_use]
    pub fn one() -> Self {
        Self(UBig::from(1_u8))
    }

    #[must_use]
    pub fn from_u64(v: u64) -> Self {
        Self(UBig::from(v))
    }

    pub fn from_hex(hex: &str) -> Result<Self, &'static str> {
        let hex = hex.trim_start_matches("0x");
        UBig::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|_| "invalid hex big number")
    }

    #[must_use]
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        Self(UBig::from_le_bytes(bytes))
    }

    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        if self.is_zero() {
            return vec![];
        }

        self.0.to_le_bytes()
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == UBig::from(0_u8)
    }

    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.0.bit_len()
    }

    /// Magnitude as little endian bytes, padded with a zero byte when the most
    /// significant bit is set so the value never reads back as negative.
    #[must_use]
    pub fn getvch(&self) -> Vec<u8> {
        let mut out = self.to_le_bytes();

        if let Some(last) = out.last() {
            if last & 0x80 != 0 {
                out.push(0);
            }
        }

        out
    }

    /// Inverse of [`BigNum::getvch`]. A set sign bit is treated as part of
    /// the magnitude as we never store negative values.
    #[must_use]
    pub fn setvch(bytes: &[u8]) -> Self {
        Self::from_le_bytes(bytes)
    }

    /// Consensus serialization, length prefixed `getvch`
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let vch = self.getvch();
        let mut out = Vec::with_capacity(vch.len() + 9);
        write_compact_size(&mut out, vch.len() as u64);
        out.extend_from_slice(&vch);
        out
    }

    /// Double SHA-256 of the consensus serialization
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        Hash256(sha256d(&self.serialize()))
    }

    /// `self ^ exp mod m`
    #[must_use]
    pub fn pow_mod(&self, exp: &BigNum, m: &BigNum) -> BigNum {
        let ring = ModuloRing::new(&m.0);
        BigNum(ring.from(&self.0).pow(&exp.0).residue())
    }

    /// `self * other mod m`
    #[must_use]
    pub fn mul_mod(&self, other: &BigNum, m: &BigNum) -> BigNum {
        let ring = ModuloRing::new(&m.0);
        BigNum((ring.from(&self.0) * ring.from(&other.0)).residue())
    }

    /// `self + other mod m`
    #[must_use]
    pub fn add_mod(&self, other: &BigNum, m: &BigNum) -> BigNum {
        BigNum((&self.0 + &other.0) % &m.0)
    }

    /// `self mod m`
    #[must_use]
    pub fn modulo(&self, m: &BigNum) -> BigNum {
        BigNum(&self.0 % &m.0)
    }

    /// `2 ^ exp`
    #[must_use]
    pub fn pow2(exp: usize) -> BigNum {
        BigNum(UBig::from(1_u8) << exp)
    }
}

impl Default for BigNum {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<u64> for BigNum {
    fn from(v: u64) -> Self {
        Self::from_u64(v)
    }
}

impl From<UBig> for BigNum {
    fn from(v: UBig) -> Self {
        Self(v)
    }
}

impl fmt::Debug for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BigNum")
            .field(&format!("{:x}", self.0))
            .finish()
    }
}

impl fmt::Display for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl Encode for BigNum {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        Encode::encode(&self.getvch(), encoder)
    }
}

impl Decode for BigNum {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let bytes: Vec<u8> = Decode::decode(decoder)?;
        Ok(Self::setvch(&bytes))
    }
}

bincode::impl_borrow_decode!(BigNum);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_serializes_zero_as_empty() {
        assert!(BigNum::zero().getvch().is_empty());
        assert_eq!(BigNum::zero().serialize(), vec![0]);
    }

    #[test]
    fn it_pads_sign_bit() {
        assert_eq!(BigNum::from_u64(0x7f).getvch(), vec![0x7f]);
        assert_eq!(BigNum::from_u64(0x80).getvch(), vec![0x80, 0x00]);
        assert_eq!(BigNum::from_u64(0x1234).getvch(), vec![0x34, 0x12]);
        assert_eq!(BigNum::from_u64(0x80).serialize(), vec![2, 0x80, 0x00]);
    }

    #[test]
    fn it_reads_back_vch() {
        let n = BigNum::from_hex("ff00ee00dd").unwrap();
        assert_eq!(BigNum::setvch(&n.getvch()), n);
    }

    #[test]
    fn it_does_modular_arithmetic() {
        let m = BigNum::from_u64(97);
        assert_eq!(
            BigNum::from_u64(5).pow_mod(&BigNum::from_u64(3), &m),
            BigNum::from_u64(125 % 97)
        );
        assert_eq!(
            BigNum::from_u64(50).mul_mod(&BigNum::from_u64(4), &m),
            BigNum::from_u64(200 % 97)
        );
        assert_eq!(
            BigNum::from_u64(90).add_mod(&BigNum::from_u64(10), &m),
            BigNum::from_u64(3)
        );
        assert_eq!(BigNum::pow2(10), BigNum::from_u64(1024));
    }

    #[test]
    fn it_parses_prefixed_hex() {
        assert_eq!(BigNum::from_hex("0x3c1").unwrap(), BigNum::from_u64(961));
        assert!(BigNum::from_hex("xyz").is_err());
    }
}
