// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::codec::{decode_fixed_8_array_u32, encode_fixed_8_array_u32};
use crate::consensus::CHECKPOINT_SLOTS;
use crate::primitives::{CoinDenomination, ZEROCOIN_DENOMINATIONS};
use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use std::fmt;

/// 256-bit accumulator checkpoint committed in every block header.
///
/// Stored as 8 big endian ordered 32-bit words, `words[0]` being the most
/// significant. Checksums are shifted in from the least significant end in
/// denomination order so the first denomination lands in `words[4]` and the
/// last one in `words[7]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct AccumulatorCheckpoint(pub [u32; CHECKPOINT_SLOTS]);

impl AccumulatorCheckpoint {
    #[must_use]
    pub fn zero() -> Self {
        Self([0; CHECKPOINT_SLOTS])
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// `self = (self << 32) | checksum`
    pub fn push_checksum(&mut self, checksum: u32) {
        self.0.rotate_left(1);
        self.0[CHECKPOINT_SLOTS - 1] = checksum;
    }

    /// Builds a checkpoint from one checksum per denomination, in
    /// denomination order.
    #[must_use]
    pub fn from_checksums(checksums: &[u32]) -> Self {
        let mut out = Self::zero();
        for c in checksums {
            out.push_checksum(*c);
        }
        out
    }

    /// Extracts the checksum slot of `denom`. Returns 0 for the error
    /// denomination.
    #[must_use]
    pub fn parse_checksum(&self, denom: CoinDenomination) -> u32 {
        let pos = match denom.position() {
            Some(pos) => pos,
            None => return 0,
        };

        let shift_words = (ZEROCOIN_DENOMINATIONS.len() - 1) - pos;
        self.0[CHECKPOINT_SLOTS - 1 - shift_words]
    }

    /// Every checksum slot paired with its denomination
    pub fn checksums(&self) -> impl Iterator<Item = (CoinDenomination, u32)> + '_ {
        ZEROCOIN_DENOMINATIONS
            .iter()
            .map(move |d| (*d, self.parse_checksum(*d)))
    }

    /// Big endian bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0; 32];
        for (i, word) in self.0.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl fmt::Debug for AccumulatorCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccumulatorCheckpoint")
            .field(&self.to_hex())
            .finish()
    }
}

impl Encode for AccumulatorCheckpoint {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        encode_fixed_8_array_u32(&self.0, encoder)
    }
}

impl Decode for AccumulatorCheckpoint {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(Self(decode_fixed_8_array_u32(decoder)?))
    }
}

bincode::impl_borrow_decode!(AccumulatorCheckpoint);
