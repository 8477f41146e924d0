// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::{DBBatch, DBInterface, DBInterfaceErr};
use crate::chain::ChainOracle;
use crate::consensus::CHECKPOINT_INTERVAL;
use crate::primitives::{AccumulatorCheckpoint, BigNum, CoinDenomination, ZEROCOIN_DENOMINATIONS};
use crate::zerocoin::{get_checksum, AccumulatorMap, ZerocoinDb};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;

const CHECKSUM_HEIGHT_CACHE_SIZE: usize = 1024;

/// Durable `checksum -> accumulator value` map with a read through memory
/// cache in front of the zerocoin database.
pub struct ChecksumStore<B: DBInterface> {
    db: ZerocoinDb<B>,
    cache: Mutex<HashMap<u32, BigNum>>,
    height_cache: Mutex<LruCache<(u32, CoinDenomination), u64>>,
    missing: Mutex<Vec<u32>>,
}

impl<B: DBInterface> ChecksumStore<B> {
    pub fn new(db: ZerocoinDb<B>) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
            height_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CHECKSUM_HEIGHT_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
            missing: Mutex::new(vec![]),
        }
    }

    #[must_use]
    pub fn db(&self) -> &ZerocoinDb<B> {
        &self.db
    }

    /// Writes a value through to the database and the cache
    pub fn add_checksum(&self, checksum: u32, value: &BigNum) -> Result<(), ChecksumStoreErr> {
        self.db.write_accumulator_value(checksum, value)?;
        self.cache.lock().insert(checksum, value.clone());
        Ok(())
    }

    /// Looks up the value of `checksum`, checking the cache first. With
    /// `memory_only` set the database is never consulted.
    pub fn get_value(
        &self,
        checksum: u32,
        memory_only: bool,
    ) -> Result<Option<BigNum>, ChecksumStoreErr> {
        if let Some(value) = self.cache.lock().get(&checksum) {
            return Ok(Some(value.clone()));
        }

        if memory_only {
            return Ok(None);
        }

        Ok(self.db.read_accumulator_value(checksum)?)
    }

    /// Persists the checksum of every accumulator of the map
    pub fn database_checksums(&self, map: &AccumulatorMap) -> Result<(), ChecksumStoreErr> {
        let mut batch = DBBatch::new();
        let values = self.stage_checksums(&mut batch, map)?;
        self.db.write_batch(batch)?;
        self.cache_values(values);
        Ok(())
    }

    /// Adds the values of `database_checksums` to `batch`. The returned
    /// values go to `cache_values` once the batch is written.
    pub fn stage_checksums(
        &self,
        batch: &mut DBBatch,
        map: &AccumulatorMap,
    ) -> Result<Vec<(u32, BigNum)>, ChecksumStoreErr> {
        let mut values = Vec::with_capacity(ZEROCOIN_DENOMINATIONS.len());
        for denom in ZEROCOIN_DENOMINATIONS {
            let value = map.get_value(denom);
            let checksum = get_checksum(&value);
            self.db.stage_accumulator_value(batch, checksum, &value)?;
            values.push((checksum, value));
        }

        Ok(values)
    }

    pub fn cache_values(&self, values: Vec<(u32, BigNum)>) {
        self.cache.lock().extend(values);
    }

    /// Erases a checksum from both the cache and the database
    pub fn erase_checksum(&self, checksum: u32) -> Result<(), ChecksumStoreErr> {
        self.cache.lock().remove(&checksum);
        self.db.erase_accumulator_value(checksum)?;
        Ok(())
    }

    /// Erases the checksums of `erase` whose slot differs from `previous`.
    /// Returns true if anything was erased.
    pub fn erase_accumulator_values(
        &self,
        erase: &AccumulatorCheckpoint,
        previous: &AccumulatorCheckpoint,
    ) -> Result<bool, ChecksumStoreErr> {
        if erase == previous {
            return Ok(false);
        }

        let mut erased = false;
        for (denom, checksum) in erase.checksums() {
            if checksum != 0 && checksum != previous.parse_checksum(denom) {
                self.erase_checksum(checksum)?;
                erased = true;
            }
        }

        Ok(erased)
    }

    /// Warms the cache with every value referenced by `checkpoint`. Checksums
    /// without a stored value are recorded and reported as an error.
    pub fn load_accumulator_values_from_db(
        &self,
        checkpoint: &AccumulatorCheckpoint,
    ) -> Result<(), ChecksumStoreErr> {
        for (_, checksum) in checkpoint.checksums() {
            if checksum == 0 {
                continue;
            }

            match self.db.read_accumulator_value(checksum)? {
                Some(value) => {
                    self.cache.lock().insert(checksum, value);
                }
                None => {
                    let mut missing = self.missing.lock();
                    if !missing.contains(&checksum) {
                        missing.push(checksum);
                    }

                    log::warn!("Missing databased value for checksum {:08x}", checksum);
                    return Err(ChecksumStoreErr::MissingChecksum(checksum));
                }
            }
        }

        Ok(())
    }

    /// Checksums that were referenced by a checkpoint but not found on disk
    #[must_use]
    pub fn missing_checksums(&self) -> Vec<u32> {
        self.missing.lock().clone()
    }

    /// First height of the active chain whose checkpoint carries `checksum` in
    /// the slot of `denom`.
    pub fn get_checksum_height<C: ChainOracle>(
        &self,
        chain: &C,
        checksum: u32,
        denom: CoinDenomination,
    ) -> Option<u64> {
        let key = (checksum, denom);

        {
            let mut cache = self.height_cache.lock();
            if let Some(height) = cache.get(&key).copied() {
                let still_valid = chain
                    .at(height)
                    .map(|i| i.accumulator_checkpoint.parse_checksum(denom) == checksum)
                    .unwrap_or(false);

                if still_valid {
                    return Some(height);
                }

                cache.pop(&key);
            }
        }

        let mut index = chain.at(0)?;
        loop {
            if index.accumulator_checkpoint.parse_checksum(denom) == checksum {
                self.height_cache.lock().put(key, index.height);
                return Some(index.height);
            }

            // Checkpoints only move every 10 blocks
            if index.height % CHECKPOINT_INTERVAL == 0 {
                if index.height + CHECKPOINT_INTERVAL > chain.height() {
                    return None;
                }

                index = chain.at(index.height + CHECKPOINT_INTERVAL)?;
                continue;
            }

            index = chain.next(index)?;
        }
    }

    /// Erases the checksums introduced in the block range `[start, end]`,
    /// keeping those shared with the block before `start`.
    pub fn erase_checkpoints<C: ChainOracle>(
        &self,
        chain: &C,
        start: u64,
        end: u64,
    ) -> Result<bool, ChecksumStoreErr> {
        let mut batch = DBBatch::new();
        let erased = self.stage_erase_checkpoints(&mut batch, chain, start, end)?;
        self.db.write_batch(batch)?;
        Ok(erased)
    }

    /// Adds the deletes of `erase_checkpoints` to `batch`. Erased values
    /// leave the cache right away, later reads fall through to the database.
    pub fn stage_erase_checkpoints<C: ChainOracle>(
        &self,
        batch: &mut DBBatch,
        chain: &C,
        start: u64,
        end: u64,
    ) -> Result<bool, ChecksumStoreErr> {
        if start == 0 || chain.height() < start {
            return Ok(false);
        }

        let end = end.min(chain.height());
        let previous = chain
            .at(start - 1)
            .ok_or(ChecksumStoreErr::MissingBlockIndex(start - 1))?
            .accumulator_checkpoint;

        for height in start..=end {
            let index = chain
                .at(height)
                .ok_or(ChecksumStoreErr::MissingBlockIndex(height))?;

            for (denom, checksum) in index.accumulator_checkpoint.checksums() {
                if checksum != previous.parse_checksum(denom) {
                    self.cache.lock().remove(&checksum);
                    self.db.stage_erase_accumulator_value(batch, checksum);
                }
            }

            log::info!("Erasing checksums for block {}", height);
        }

        Ok(true)
    }
}

#[derive(Debug)]
pub enum ChecksumStoreErr {
    /// No accumulator value is stored for the checksum
    MissingChecksum(u32),

    /// No active chain entry at the height
    MissingBlockIndex(u64),

    /// Database error
    DB(DBInterfaceErr),
}

impl From<DBInterfaceErr> for ChecksumStoreErr {
    fn from(other: DBInterfaceErr) -> Self {
        Self::DB(other)
    }
}
