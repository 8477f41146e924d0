// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::{BlockStore, DBBatch, DBInterface, DBInterfaceErr, IteratorDirection};
use crate::chain::{ChainConfig, ChainOracle};
use crate::primitives::{Hash256, PublicCoin};
use crate::settings::SETTINGS;
use crate::zerocoin::{CoinWitnessCacheData, CoinWitnessData, GeneratedWitness, WitnessBuilder, WitnessErr};
use lru::LruCache;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use streaming_iterator::StreamingIterator;

const PRECOMPUTE_PREFIX: u8 = b'P';

/// Precomputed witnesses keyed by pubcoin hash. Entries live in an LRU and
/// are written back to the precompute keyspace in batches.
pub struct WitnessCache<B: DBInterface> {
    db: B,
    lru: LruCache<Hash256, CoinWitnessCacheData>,
    dirty: HashMap<Hash256, CoinWitnessCacheData>,
    dirty_limit: usize,
    flush_interval: Duration,
    last_flush: Instant,
}

impl<B: DBInterface> WitnessCache<B> {
    pub fn new(db: B, cache_size: usize, dirty_limit: usize, flush_interval: Duration) -> Self {
        Self {
            db,
            lru: LruCache::new(NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN)),
            dirty: HashMap::new(),
            dirty_limit: dirty_limit.max(1),
            flush_interval,
            last_flush: Instant::now(),
        }
    }

    #[must_use]
    pub fn from_settings(db: B) -> Self {
        Self::new(
            db,
            SETTINGS.zerocoin.precompute_cache_size as usize,
            SETTINGS.zerocoin.precompute_dirty_limit as usize,
            Duration::from_secs(SETTINGS.zerocoin.precompute_flush_secs as u64),
        )
    }

    pub fn get(&mut self, hash: &Hash256) -> Result<Option<CoinWitnessCacheData>, DBInterfaceErr> {
        if let Some(data) = self.lru.get(hash) {
            return Ok(Some(data.clone()));
        }

        let data: Option<CoinWitnessCacheData> = self.db.get(precompute_key(hash))?;
        if let Some(ref data) = data {
            self.lru.put(*hash, data.clone());
        }

        Ok(data)
    }

    /// Caches `data` and flushes the dirty set once it grows past its limit or
    /// the flush interval has passed
    pub fn insert(&mut self, hash: Hash256, data: CoinWitnessCacheData) -> Result<(), DBInterfaceErr> {
        self.lru.put(hash, data.clone());
        self.dirty.insert(hash, data);

        if self.dirty.len() >= self.dirty_limit || self.last_flush.elapsed() >= self.flush_interval {
            self.flush()?;
        }

        Ok(())
    }

    pub fn remove(&mut self, hash: &Hash256) -> Result<(), DBInterfaceErr> {
        self.lru.pop(hash);
        self.dirty.remove(hash);
        self.db.delete(precompute_key(hash))
    }

    /// Writes every dirty entry in one batch
    pub fn flush(&mut self) -> Result<(), DBInterfaceErr> {
        if !self.dirty.is_empty() {
            let mut batch = DBBatch::new();
            for (hash, data) in &self.dirty {
                batch.put(precompute_key(hash), data.clone())?;
            }
            self.db.write_batch(batch)?;
            log::debug!("Flushed {} precomputed witnesses", self.dirty.len());
            self.dirty.clear();
        }

        self.last_flush = Instant::now();
        Ok(())
    }

    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Drops every entry precomputed past `height`. Called when blocks above
    /// `height` are disconnected. Returns the number of dropped entries.
    pub fn invalidate_above(&mut self, height: u64) -> Result<usize, DBInterfaceErr> {
        self.flush()?;

        let mut stale = vec![];
        let mut iter = self.db.prefix_iterator::<CoinWitnessCacheData>(
            vec![PRECOMPUTE_PREFIX],
            IteratorDirection::Forward,
        );
        while let Some((key, data)) = iter.next() {
            if data.height_precomputed > height && key.len() == 33 {
                let mut hash = [0; 32];
                hash.copy_from_slice(&key[1..]);
                stale.push(Hash256(hash));
            }
        }

        for hash in &stale {
            self.remove(hash)?;
        }

        if !stale.is_empty() {
            log::info!(
                "Invalidated {} precomputed witnesses above height {}",
                stale.len(),
                height
            );
        }
        Ok(stale.len())
    }

    /// Advances the cached witness of `coin` to `target_height` and returns a
    /// verified witness. Starts from the mint when nothing is cached.
    pub fn precompute<C: ChainOracle, S: BlockStore, D: DBInterface>(
        &mut self,
        builder: &WitnessBuilder<'_, C, S, D>,
        config: &ChainConfig,
        coin: &PublicCoin,
        target_height: u64,
    ) -> Result<GeneratedWitness, WitnessCacheErr> {
        let hash = coin.hash();
        let mut data = match self.get(&hash)? {
            Some(cached) => CoinWitnessData::from_cache_data(&cached, config),
            None => CoinWitnessData::new(coin.clone(), config),
        };

        builder.precompute_witness(&mut data, target_height)?;
        self.insert(hash, data.to_cache_data())?;
        Ok(builder.witness_from_precompute(&data)?)
    }
}

fn precompute_key(hash: &Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(PRECOMPUTE_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key
}

#[derive(Debug)]
pub enum WitnessCacheErr {
    /// Witness could not be advanced or verified
    Witness(WitnessErr),

    /// Database error
    DB(DBInterfaceErr),
}

impl fmt::Display for WitnessCacheErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Witness(err) => write!(f, "{}", err),
            Self::DB(err) => write!(f, "Database error: {:?}", err),
        }
    }
}

impl From<WitnessErr> for WitnessCacheErr {
    fn from(other: WitnessErr) -> Self {
        Self::Witness(other)
    }
}

impl From<DBInterfaceErr> for WitnessCacheErr {
    fn from(other: DBInterfaceErr) -> Self {
        Self::DB(other)
    }
}
