// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::{BlockStore, DBInterface, DBInterfaceErr};
use crate::chain::ChainOracle;
use crate::consensus::{is_checkpoint_height, CHECKPOINT_INTERVAL, CHECKPOINT_MIN_HEIGHT};
use crate::primitives::{AccumulatorCheckpoint, Hash256};
use crate::zerocoin::{AccumulatorErr, AccumulatorMap, ChecksumStore, ChecksumStoreErr};

/// Computes the accumulator checkpoint of the block at `height`, which must
/// extend the tip of `chain`.
///
/// Checkpoints move on multiples of 10 only. They trail mints by one window:
/// the checkpoint at `h` folds the mints of blocks `[h - 20, h - 10)` into
/// the checkpoint of the parent block. If that window holds no mint the parent
/// checkpoint is kept as is.
#[tracing::instrument(skip(chain, blocks, store, map))]
pub fn calculate_accumulator_checkpoint<C, S, B>(
    height: u64,
    chain: &C,
    blocks: &S,
    store: &ChecksumStore<B>,
    map: &mut AccumulatorMap,
) -> Result<AccumulatorCheckpoint, CheckpointErr>
where
    C: ChainOracle,
    S: BlockStore,
    B: DBInterface,
{
    let prev_height = height
        .checked_sub(1)
        .ok_or(CheckpointErr::HeightTooLow(height))?;
    let prev_checkpoint = chain
        .at(prev_height)
        .ok_or(CheckpointErr::MissingBlockIndex(prev_height))?
        .accumulator_checkpoint;

    if !is_checkpoint_height(height) {
        return Ok(prev_checkpoint);
    }

    if height < CHECKPOINT_MIN_HEIGHT {
        return Err(CheckpointErr::HeightTooLow(height));
    }

    map.reset();
    if !prev_checkpoint.is_zero() {
        map.load(&prev_checkpoint, store)?;
    }

    let mut total_mints = 0;
    for h in height - CHECKPOINT_MIN_HEIGHT..height - CHECKPOINT_INTERVAL {
        if crate::global::shutdown_requested() {
            return Err(CheckpointErr::Shutdown);
        }

        let index = chain.at(h).ok_or(CheckpointErr::MissingBlockIndex(h))?;
        let block = blocks.read_block(&index.hash)?.ok_or_else(|| {
            log::error!("Failed to read block {} from disk", h);
            CheckpointErr::MissingBlock(index.hash)
        })?;

        let mints = block.mints();
        total_mints += mints.len();
        if !mints.is_empty() {
            log::debug!("Found {} mints at height {}", mints.len(), h);
        }

        for coin in &mints {
            map.accumulate(coin, true).map_err(|err| {
                log::error!("Failed to add pubcoin to accumulator at height {}", h);
                CheckpointErr::Accumulate(err)
            })?;
        }
    }

    if total_mints == 0 {
        return Ok(prev_checkpoint);
    }

    Ok(map.get_checkpoint())
}

/// Checks the checkpoint claimed by the block at `height`. On a checkpoint
/// height it is recomputed and compared, everywhere else it must equal the
/// checkpoint of the parent.
pub fn validate_accumulator_checkpoint<C, S, B>(
    height: u64,
    claimed: &AccumulatorCheckpoint,
    chain: &C,
    blocks: &S,
    store: &ChecksumStore<B>,
    map: &mut AccumulatorMap,
) -> Result<(), CheckpointErr>
where
    C: ChainOracle,
    S: BlockStore,
    B: DBInterface,
{
    if height == 0 {
        return Ok(());
    }

    if is_checkpoint_height(height) {
        let calculated = calculate_accumulator_checkpoint(height, chain, blocks, store, map)?;

        if calculated != *claimed {
            log::warn!(
                "Accumulator checkpoint at {} does not match. calculated: {}, block: {}",
                height,
                calculated.to_hex(),
                claimed.to_hex()
            );
            return Err(CheckpointErr::Mismatch {
                height,
                calculated,
                claimed: *claimed,
            });
        }

        return Ok(());
    }

    let parent = chain
        .at(height - 1)
        .ok_or(CheckpointErr::MissingBlockIndex(height - 1))?;

    if parent.accumulator_checkpoint != *claimed {
        log::warn!(
            "New accumulator checkpoint generated on block {} which is not a checkpoint height",
            height
        );
        return Err(CheckpointErr::UnexpectedChange(height));
    }

    Ok(())
}

#[derive(Debug)]
pub enum CheckpointErr {
    /// Checkpoints cannot be computed at this height
    HeightTooLow(u64),

    /// The active chain has no entry at the height
    MissingBlockIndex(u64),

    /// Block could not be read from storage
    MissingBlock(Hash256),

    /// A mint could not be accumulated
    Accumulate(AccumulatorErr),

    /// Checksum store error
    Checksum(ChecksumStoreErr),

    /// Database error
    DB(DBInterfaceErr),

    /// Shutdown was requested while walking the chain
    Shutdown,

    /// Recomputed checkpoint differs from the one in the block
    Mismatch {
        height: u64,
        calculated: AccumulatorCheckpoint,
        claimed: AccumulatorCheckpoint,
    },

    /// Checkpoint changed on a height that is not a checkpoint height
    UnexpectedChange(u64),
}

impl CheckpointErr {
    /// Reject reason of consensus failures
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Mismatch { .. } => "bad-accumulator-checkpoint",
            Self::UnexpectedChange(_) => "bad-accumulator-checkpoint-change",
            Self::Shutdown => "shutdown-requested",
            _ => "accumulator-checkpoint-failed",
        }
    }
}

impl From<ChecksumStoreErr> for CheckpointErr {
    fn from(other: ChecksumStoreErr) -> Self {
        Self::Checksum(other)
    }
}

impl From<DBInterfaceErr> for CheckpointErr {
    fn from(other: DBInterfaceErr) -> Self {
        Self::DB(other)
    }
}
