// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::{BlockStore, DBInterface, DBInterfaceErr};
use crate::chain::{BlockIndex, ChainConfig, ChainOracle};
use crate::consensus::{
    next_checkpoint_height, prev_checkpoint_height, CHECKPOINT_INTERVAL, CHECKPOINT_MIN_HEIGHT,
    SECURITY_LEVEL_ALL, SECURITY_LEVEL_JITTER, WITNESS_LOCK_ATTEMPTS, WITNESS_LOCK_SLEEP_MS,
};
use crate::primitives::{BigNum, CoinDenomination, Hash256, PublicCoin, ZEROCOIN_DENOMINATIONS};
use crate::zerocoin::{Accumulator, AccumulatorWitness, ChecksumStore, ChecksumStoreErr};
use bincode::{Decode, Encode};
use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Adds jitter to a requested security level so that the number of folded
/// checkpoints does not reveal the window a spent mint came from. Level 100
/// is left untouched.
pub fn randomize_security_level<R: Rng>(level: u32, rng: &mut R) -> u32 {
    if level >= SECURITY_LEVEL_ALL {
        return level;
    }

    let level = level + rng.gen_range(0..SECURITY_LEVEL_JITTER);
    level.min(SECURITY_LEVEL_ALL - 1)
}

/// Witness of a mint together with the bookkeeping needed to extend it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinWitnessData {
    pub denom: CoinDenomination,
    pub coin: PublicCoin,

    /// Accumulation of every other coin folded in so far
    pub accumulator: Accumulator,

    pub mints_added: u32,
    pub height_mint_added: u64,
    pub height_checkpoint: u64,
    pub height_acc_start: u64,
    pub height_precomputed: u64,
    pub txid: Hash256,
}

impl CoinWitnessData {
    #[must_use]
    pub fn new(coin: PublicCoin, config: &ChainConfig) -> Self {
        let denom = coin.denomination();
        Self {
            denom,
            accumulator: Accumulator::new(config.zerocoin_params().clone(), denom),
            coin,
            mints_added: 0,
            height_mint_added: 0,
            height_checkpoint: 0,
            height_acc_start: 0,
            height_precomputed: 0,
            txid: Hash256::zero(),
        }
    }

    pub fn set_height_mint_added(&mut self, height: u64) {
        self.height_mint_added = height;
        self.height_checkpoint = next_checkpoint_height(height);
        self.height_acc_start = prev_checkpoint_height(height);
    }

    #[must_use]
    pub fn to_cache_data(&self) -> CoinWitnessCacheData {
        CoinWitnessCacheData {
            denom: self.denom,
            coin_value: self.coin.value().clone(),
            coin_denom: self.coin.denomination(),
            accumulator_value: self.accumulator.value().clone(),
            accumulator_denom: self.accumulator.denomination(),
            mints_added: self.mints_added,
            height_mint_added: self.height_mint_added,
            height_checkpoint: self.height_checkpoint,
            height_acc_start: self.height_acc_start,
            height_precomputed: self.height_precomputed,
            txid: self.txid,
        }
    }

    #[must_use]
    pub fn from_cache_data(data: &CoinWitnessCacheData, config: &ChainConfig) -> Self {
        Self {
            denom: data.denom,
            coin: PublicCoin::new(data.coin_denom, data.coin_value.clone()),
            accumulator: Accumulator::with_value(
                config.zerocoin_params().clone(),
                data.accumulator_denom,
                data.accumulator_value.clone(),
            ),
            mints_added: data.mints_added,
            height_mint_added: data.height_mint_added,
            height_checkpoint: data.height_checkpoint,
            height_acc_start: data.height_acc_start,
            height_precomputed: data.height_precomputed,
            txid: data.txid,
        }
    }
}

/// Persisted form of [`CoinWitnessData`]
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CoinWitnessCacheData {
    pub denom: CoinDenomination,
    pub coin_value: BigNum,
    pub coin_denom: CoinDenomination,
    pub accumulator_value: BigNum,
    pub accumulator_denom: CoinDenomination,
    pub mints_added: u32,
    pub height_mint_added: u64,
    pub height_checkpoint: u64,
    pub height_acc_start: u64,
    pub height_precomputed: u64,
    pub txid: Hash256,
}

/// A verified witness, ready to be used by a spend
#[derive(Debug, Clone)]
pub struct GeneratedWitness {
    /// Accumulator the witness was verified against
    pub accumulator: Accumulator,
    pub witness: AccumulatorWitness,

    /// Size of the anonymity set, including the mints accumulated before the
    /// window of the spent mint.
    pub mints_added: u32,

    /// Checkpoint height of `accumulator`
    pub checkpoint_height: u64,
}

/// Builds accumulator witnesses by walking the active chain. The chain is
/// guarded by the main validation lock.
pub struct WitnessBuilder<'a, C: ChainOracle, S: BlockStore, B: DBInterface> {
    chain: &'a Mutex<C>,
    blocks: &'a S,
    store: &'a ChecksumStore<B>,
    config: &'a ChainConfig,
}

impl<'a, C: ChainOracle, S: BlockStore, B: DBInterface> WitnessBuilder<'a, C, S, B> {
    pub fn new(
        chain: &'a Mutex<C>,
        blocks: &'a S,
        store: &'a ChecksumStore<B>,
        config: &'a ChainConfig,
    ) -> Self {
        Self {
            chain,
            blocks,
            store,
            config,
        }
    }

    /// Takes the validation lock, giving up after a bounded number of tries
    fn lock_chain(&self) -> Result<MutexGuard<'a, C>, WitnessErr> {
        for _ in 0..WITNESS_LOCK_ATTEMPTS {
            if let Some(guard) = self.chain.try_lock() {
                return Ok(guard);
            }

            std::thread::sleep(Duration::from_millis(WITNESS_LOCK_SLEEP_MS));
        }

        log::error!("Could not get lock on the main validation lock");
        Err(WitnessErr::LockContention)
    }

    /// Builds and verifies a witness for `coin`.
    ///
    /// The walk starts at the window holding the mint and stops two
    /// checkpoints below the tip, at `checkpoint_height - 10` when a specific
    /// checkpoint is requested, or once `security_level` checkpoints (with
    /// jitter) have been crossed.
    ///
    /// The validation lock is only taken to resolve chain entries. Blocks are
    /// read and folded into the witness with the lock released.
    #[tracing::instrument(skip(self, coin))]
    pub fn generate_accumulator_witness(
        &self,
        coin: &PublicCoin,
        security_level: u32,
        checkpoint_height: Option<u64>,
    ) -> Result<GeneratedWitness, WitnessErr> {
        let denom = coin.denomination();

        let mut data = CoinWitnessData::new(coin.clone(), self.config);
        self.init_from_mint(&mut data)?;

        let chain_height = self.lock_chain()?.height();
        let stop = match checkpoint_height {
            Some(h) => h.saturating_sub(CHECKPOINT_INTERVAL),
            None => (chain_height - chain_height % CHECKPOINT_INTERVAL)
                .saturating_sub(CHECKPOINT_MIN_HEIGHT),
        };

        let mut witness_acc = data.accumulator.clone();
        let level = randomize_security_level(security_level, &mut rand::thread_rng());
        let mut checkpoints_added = 0;
        let mut mints_added = 0;
        let mut replayed = HashSet::new();
        let mut height = data.height_acc_start;

        let final_height = loop {
            if crate::global::shutdown_requested() {
                return Err(WitnessErr::Shutdown);
            }

            let (index, new_checkpoint) = self.resolve_index(height, data.height_acc_start)?;
            if new_checkpoint {
                checkpoints_added += 1;
            }

            let level_satisfied = level != SECURITY_LEVEL_ALL && checkpoints_added >= level;
            if height >= stop || level_satisfied {
                break height;
            }

            mints_added += self.add_block_mints(&data, &index, &mut witness_acc)?;

            if let Some(target) = self.config.double_accumulation_exceptions.get(&height) {
                if replayed.insert(height) {
                    height = *target;
                    continue;
                }
            }

            height += 1;
        };

        let (value, accumulated) =
            self.closing_checkpoint(final_height + CHECKPOINT_INTERVAL, data.height_acc_start, denom)?;
        let accumulator = Accumulator::with_value(self.config.zerocoin_params().clone(), denom, value);

        let witness = AccumulatorWitness::new(&witness_acc, coin.clone());
        if !witness.verify(&accumulator, coin) {
            log::error!("Failed to verify witness");
            return Err(WitnessErr::VerifyFailed);
        }

        let required = self.config.required_accumulation;
        if mints_added < required {
            let err = WitnessErr::InsufficientAccumulation { required };
            log::error!("{}", err);
            return Err(err);
        }

        mints_added += accumulated;
        log::info!("{} mints added to witness", mints_added);

        Ok(GeneratedWitness {
            accumulator,
            witness,
            mints_added,
            checkpoint_height: final_height + CHECKPOINT_INTERVAL,
        })
    }

    /// Builds a witness at the configured default security level
    pub fn generate_default_witness(&self, coin: &PublicCoin) -> Result<GeneratedWitness, WitnessErr> {
        self.generate_accumulator_witness(coin, self.config.default_security_level, None)
    }

    /// Advances a cached witness up to `target_height`, checkpoint window by
    /// checkpoint window. The witness is never advanced closer than two
    /// checkpoints to the tip.
    pub fn precompute_witness(
        &self,
        data: &mut CoinWitnessData,
        target_height: u64,
    ) -> Result<(), WitnessErr> {
        if data.height_mint_added == 0 {
            self.init_from_mint(data)?;
            data.height_precomputed = data.height_acc_start;
        }

        let chain_height = self.lock_chain()?.height();
        let max_stop =
            (chain_height - chain_height % CHECKPOINT_INTERVAL).saturating_sub(CHECKPOINT_MIN_HEIGHT);
        let stop = target_height.min(max_stop);
        let stop = stop - stop % CHECKPOINT_INTERVAL;

        if stop <= data.height_precomputed {
            return Ok(());
        }

        let mut witness_acc = data.accumulator.clone();
        let mut added = 0;
        for height in data.height_precomputed..stop {
            if crate::global::shutdown_requested() {
                return Err(WitnessErr::Shutdown);
            }

            let (index, _) = self.resolve_index(height, height)?;
            added += self.add_block_mints(data, &index, &mut witness_acc)?;

            // Replay the doubly accumulated span
            if let Some(target) = self.config.double_accumulation_exceptions.get(&height) {
                for replay in *target..=height {
                    let (index, _) = self.resolve_index(replay, replay)?;
                    added += self.add_block_mints(data, &index, &mut witness_acc)?;
                }
            }
        }

        data.accumulator = witness_acc;
        data.mints_added += added;
        data.height_precomputed = stop;
        Ok(())
    }

    /// Verifies a precomputed witness against the checkpoint it was advanced to
    pub fn witness_from_precompute(
        &self,
        data: &CoinWitnessData,
    ) -> Result<GeneratedWitness, WitnessErr> {
        let checkpoint_height = data.height_precomputed + CHECKPOINT_INTERVAL;
        let (value, accumulated) =
            self.closing_checkpoint(checkpoint_height, data.height_acc_start, data.denom)?;
        let accumulator =
            Accumulator::with_value(self.config.zerocoin_params().clone(), data.denom, value);
        let witness = AccumulatorWitness::new(&data.accumulator, data.coin.clone());

        if !witness.verify(&accumulator, &data.coin) {
            log::error!("Failed to verify precomputed witness");
            return Err(WitnessErr::VerifyFailed);
        }

        let required = self.config.required_accumulation;
        if data.mints_added < required {
            return Err(WitnessErr::InsufficientAccumulation { required });
        }

        Ok(GeneratedWitness {
            accumulator,
            witness,
            mints_added: data.mints_added + accumulated,
            checkpoint_height,
        })
    }

    /// Number of `denom` mints accumulated below `end_height`
    pub fn compute_accumulated_coins(
        &self,
        chain: &C,
        end_height: u64,
        denom: CoinDenomination,
    ) -> u32 {
        (self.config.zerocoin_start_height..end_height)
            .filter_map(|h| chain.at(h))
            .map(|i| i.mint_count(denom) as u32)
            .sum()
    }

    /// Height from which a mint of each denomination can be spent. Zero when
    /// not enough mints have matured yet.
    pub fn get_mint_maturity_height(&self) -> Result<HashMap<CoinDenomination, u64>, WitnessErr> {
        let chain = self.lock_chain()?;
        let chain = &*chain;
        let required = self.config.required_accumulation;

        let mut found: HashMap<CoinDenomination, (u32, u64)> = ZEROCOIN_DENOMINATIONS
            .iter()
            .map(|d| (*d, (0, 0)))
            .collect();

        let confirmed = chain
            .height()
            .saturating_sub(self.config.mint_required_confirmations);
        let min_maturity = confirmed - confirmed % CHECKPOINT_INTERVAL;
        let mut cursor = chain.at(confirmed);

        while let Some(index) = cursor {
            let mut finished = true;

            for (denom, (count, height)) in found.iter_mut() {
                if *count >= required {
                    continue;
                }

                *count += index.mint_count(*denom) as u32;
                if *count >= required {
                    *height = index.height.min(min_maturity);
                }
                finished = false;
            }

            if finished || index.height == 0 {
                break;
            }

            cursor = chain.at(index.height - 1);
        }

        Ok(found.into_iter().map(|(d, (_, h))| (d, h)).collect())
    }

    /// Resolves the mint in the active chain and seeds `data` with the
    /// accumulator right before the mint's window.
    fn init_from_mint(&self, data: &mut CoinWitnessData) -> Result<(), WitnessErr> {
        let record = self
            .store
            .db()
            .read_coin_mint(data.coin.value())?
            .ok_or_else(|| {
                log::error!("Failed to read mint from db");
                WitnessErr::MintNotFound
            })?;

        let (index, seed_checksum) = {
            let chain = self.lock_chain()?;
            let index = chain
                .at(record.height)
                .cloned()
                .ok_or(WitnessErr::MintNotInChain(record.txid))?;
            let seed_checksum = chain
                .at(next_checkpoint_height(record.height))
                .map_or(0, |i| i.accumulator_checkpoint.parse_checksum(data.denom));

            (index, seed_checksum)
        };

        let block = self
            .blocks
            .read_block(&index.hash)?
            .ok_or(WitnessErr::MissingBlock(index.hash))?;

        if !block.txs.iter().any(|tx| tx.txid() == record.txid) {
            log::error!("Mint tx {} is not in chain", record.txid.to_hex());
            return Err(WitnessErr::MintNotInChain(record.txid));
        }

        data.txid = record.txid;
        data.set_height_mint_added(record.height);

        let mut seed = Accumulator::new(self.config.zerocoin_params().clone(), data.denom);
        if seed_checksum != 0 {
            if let Some(value) = self.store.get_value(seed_checksum, false)? {
                seed.set_value(value);
            }
        }

        data.accumulator = seed;
        Ok(())
    }

    /// Active chain entry at `height` and whether its checkpoint differs from
    /// its parent's. The parent is not looked up at `walk_start`.
    fn resolve_index(&self, height: u64, walk_start: u64) -> Result<(BlockIndex, bool), WitnessErr> {
        let chain = self.lock_chain()?;
        let index = chain
            .at(height)
            .ok_or(WitnessErr::MissingBlockIndex(height))?;

        let mut new_checkpoint = false;
        if height != walk_start {
            let parent = chain
                .at(height - 1)
                .ok_or(WitnessErr::MissingBlockIndex(height - 1))?;
            new_checkpoint = parent.accumulator_checkpoint != index.accumulator_checkpoint;
        }

        Ok((index.clone(), new_checkpoint))
    }

    /// Accumulator value of `denom` committed in the checkpoint at `height`,
    /// along with the mints accumulated below `acc_start`.
    fn closing_checkpoint(
        &self,
        height: u64,
        acc_start: u64,
        denom: CoinDenomination,
    ) -> Result<(BigNum, u32), WitnessErr> {
        let chain = self.lock_chain()?;
        let value = self.checkpoint_value(&*chain, height, denom)?;
        Ok((value, self.compute_accumulated_coins(&*chain, acc_start, denom)))
    }

    /// Accumulator value of `denom` committed in the checkpoint at `height`
    fn checkpoint_value(
        &self,
        chain: &C,
        height: u64,
        denom: CoinDenomination,
    ) -> Result<BigNum, WitnessErr> {
        let index = chain
            .at(height)
            .ok_or(WitnessErr::MissingBlockIndex(height))?;
        let checksum = index.accumulator_checkpoint.parse_checksum(denom);

        match self.store.get_value(checksum, false)? {
            Some(value) if checksum != 0 && !value.is_zero() => Ok(value),
            _ => {
                log::error!("Failed to find checksum {:08x} in database", checksum);
                Err(WitnessErr::MissingChecksum(checksum))
            }
        }
    }

    /// Folds the same denomination mints of a block into `acc`, skipping the
    /// witnessed mint itself.
    fn add_block_mints(
        &self,
        data: &CoinWitnessData,
        index: &BlockIndex,
        acc: &mut Accumulator,
    ) -> Result<u32, WitnessErr> {
        if index.mint_count(data.denom) == 0 {
            return Ok(0);
        }

        let block = self.blocks.read_block(&index.hash)?.ok_or_else(|| {
            log::error!("Failed to read block {} while adding pubcoins to witness", index.height);
            WitnessErr::MissingBlock(index.hash)
        })?;

        let mut added = 0;
        for mint in block.mints() {
            if mint.denomination() != data.denom {
                continue;
            }

            if index.height == data.height_mint_added && mint.value() == data.coin.value() {
                continue;
            }

            acc.increment(mint.value());
            added += 1;
        }

        Ok(added)
    }
}

#[derive(Debug)]
pub enum WitnessErr {
    /// The main validation lock could not be taken
    LockContention,

    /// The mint is not indexed
    MintNotFound,

    /// The mint transaction is not in the active chain
    MintNotInChain(Hash256),

    /// The active chain has no entry at the height
    MissingBlockIndex(u64),

    /// Block could not be read from storage
    MissingBlock(Hash256),

    /// No accumulator value is stored for the checksum
    MissingChecksum(u32),

    /// Built witness does not verify against the checkpoint accumulator
    VerifyFailed,

    /// Not enough mints were folded into the witness
    InsufficientAccumulation { required: u32 },

    /// Shutdown was requested while walking the chain
    Shutdown,

    /// Checksum store error
    Checksum(ChecksumStoreErr),

    /// Database error
    DB(DBInterfaceErr),
}

impl fmt::Display for WitnessErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientAccumulation { required } => {
                write!(f, "Less than {required} mints added, unable to create spend")
            }
            Self::LockContention => write!(f, "could not get lock on the main validation lock"),
            Self::MintNotFound => write!(f, "failed to read mint from db"),
            Self::MintNotInChain(txid) => write!(f, "mint tx {} is not in chain", txid.to_hex()),
            Self::VerifyFailed => write!(f, "failed to verify witness"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl From<ChecksumStoreErr> for WitnessErr {
    fn from(other: ChecksumStoreErr) -> Self {
        Self::Checksum(other)
    }
}

impl From<DBInterfaceErr> for WitnessErr {
    fn from(other: DBInterfaceErr) -> Self {
        Self::DB(other)
    }
}
