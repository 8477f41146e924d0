// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::primitives::{AccumulatorCheckpoint, Hash256, HashWriter, PublicCoin, Transaction};
use bincode::{Decode, Encode};

#[derive(Clone, Debug)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,

    /// Packed per denomination accumulator checksums
    pub accumulator_checkpoint: AccumulatorCheckpoint,

    pub hash: Option<Hash256>,
}

impl PartialEq for BlockHeader {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.prev_hash == other.prev_hash
            && self.merkle_root == other.merkle_root
            && self.timestamp == other.timestamp
            && self.bits == other.bits
            && self.nonce == other.nonce
            && self.accumulator_checkpoint == other.accumulator_checkpoint
    }
}

impl Eq for BlockHeader {}

impl BlockHeader {
    #[must_use]
    pub fn new(
        prev_hash: Hash256,
        merkle_root: Hash256,
        timestamp: u32,
        accumulator_checkpoint: AccumulatorCheckpoint,
    ) -> Self {
        let mut header = Self {
            version: 1,
            prev_hash,
            merkle_root,
            timestamp,
            bits: 0,
            nonce: 0,
            accumulator_checkpoint,
            hash: None,
        };
        header.compute_hash();
        header
    }

    #[must_use]
    pub fn hash(&self) -> Option<&Hash256> {
        self.hash.as_ref()
    }

    pub fn compute_hash(&mut self) {
        let mut writer = HashWriter::new();
        writer
            .write_i32(self.version)
            .write_bytes(self.prev_hash.as_bytes())
            .write_bytes(self.merkle_root.as_bytes())
            .write_u32(self.timestamp)
            .write_u32(self.bits)
            .write_u32(self.nonce)
            .write_bytes(&self.accumulator_checkpoint.to_bytes());

        self.hash = Some(writer.finalize());
    }
}

impl Encode for BlockHeader {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> core::result::Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.version, encoder)?;
        bincode::Encode::encode(&self.prev_hash, encoder)?;
        bincode::Encode::encode(&self.merkle_root, encoder)?;
        bincode::Encode::encode(&self.timestamp, encoder)?;
        bincode::Encode::encode(&self.bits, encoder)?;
        bincode::Encode::encode(&self.nonce, encoder)?;
        bincode::Encode::encode(&self.accumulator_checkpoint, encoder)?;
        Ok(())
    }
}

impl Decode for BlockHeader {
    fn decode<D: bincode::de::Decoder>(
        decoder: &mut D,
    ) -> core::result::Result<Self, bincode::error::DecodeError> {
        let mut header = Self {
            version: bincode::Decode::decode(decoder)?,
            prev_hash: bincode::Decode::decode(decoder)?,
            merkle_root: bincode::Decode::decode(decoder)?,
            timestamp: bincode::Decode::decode(decoder)?,
            bits: bincode::Decode::decode(decoder)?,
            nonce: bincode::Decode::decode(decoder)?,
            accumulator_checkpoint: bincode::Decode::decode(decoder)?,
            hash: None,
        };
        header.compute_hash();
        Ok(header)
    }
}

bincode::impl_borrow_decode!(BlockHeader);

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

impl Block {
    /// Assembles a block on top of `prev_hash`, computing the merkle root and
    /// the block hash.
    #[must_use]
    pub fn new(
        prev_hash: Hash256,
        timestamp: u32,
        accumulator_checkpoint: AccumulatorCheckpoint,
        mut txs: Vec<Transaction>,
    ) -> Self {
        for tx in &mut txs {
            tx.compute_hash();
        }

        let merkle_root = compute_merkle_root(&txs);
        Self {
            header: BlockHeader::new(prev_hash, merkle_root, timestamp, accumulator_checkpoint),
            txs,
        }
    }

    #[must_use]
    pub fn hash(&self) -> Option<&Hash256> {
        self.header.hash()
    }

    /// Every zerocoin mint of the block, in transaction order
    #[must_use]
    pub fn mints(&self) -> Vec<PublicCoin> {
        self.txs.iter().flat_map(Transaction::mints).collect()
    }

    #[must_use]
    pub fn has_valid_merkle_root(&self) -> bool {
        compute_merkle_root(&self.txs) == self.header.merkle_root
    }
}

/// Bitcoin style merkle root over the txids. Odd levels duplicate the last
/// element.
#[must_use]
pub fn compute_merkle_root(txs: &[Transaction]) -> Hash256 {
    let mut level: Vec<Hash256> = txs.iter().map(Transaction::txid).collect();

    if level.is_empty() {
        return Hash256::zero();
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                let mut writer = HashWriter::new();
                writer.write_bytes(pair[0].as_bytes()).write_bytes(right.as_bytes());
                writer.finalize()
            })
            .collect();
    }

    level[0]
}
