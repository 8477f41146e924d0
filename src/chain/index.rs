// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::primitives::{AccumulatorCheckpoint, BlockHeader, CoinDenomination, Hash256};
use std::collections::HashMap;

/// Stable handle of an entry in the block index arena
pub type IndexHandle = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub height: u64,
    pub prev: Option<IndexHandle>,

    /// Ancestor at `get_skip_height(height)`
    pub skip: Option<IndexHandle>,

    pub accumulator_checkpoint: AccumulatorCheckpoint,

    /// Denominations of the mints found in the block, one per mint
    pub mint_denominations: Vec<CoinDenomination>,

    /// Index of the last anon output created at or before this block
    pub anon_outputs: i64,
}

impl BlockIndex {
    #[must_use]
    pub fn has_mints(&self) -> bool {
        !self.mint_denominations.is_empty()
    }

    #[must_use]
    pub fn mint_count(&self, denom: CoinDenomination) -> usize {
        self.mint_denominations
            .iter()
            .filter(|d| **d == denom)
            .count()
    }
}

/// Read only view over the active chain
pub trait ChainOracle {
    /// Height of the tip
    fn height(&self) -> u64;

    /// Active chain entry at `height`
    fn at(&self, height: u64) -> Option<&BlockIndex>;

    fn tip(&self) -> &BlockIndex;

    /// Successor of `index` in the active chain
    fn next(&self, index: &BlockIndex) -> Option<&BlockIndex> {
        if !self.contains(index) {
            return None;
        }

        self.at(index.height + 1)
    }

    fn contains(&self, index: &BlockIndex) -> bool {
        self.at(index.height)
            .map(|i| i.hash == index.hash)
            .unwrap_or(false)
    }

    fn lookup(&self, hash: &Hash256) -> Option<&BlockIndex>;
}

#[inline]
fn invert_lowest_one(n: u64) -> u64 {
    n & n.wrapping_sub(1)
}

/// Height of the skip pointer of an entry at `height`
#[must_use]
pub fn get_skip_height(height: u64) -> u64 {
    if height < 2 {
        return 0;
    }

    // Any number strictly lower than height is acceptable, but this
    // expression keeps walks logarithmic.
    if height & 1 != 0 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

/// Arena of every known block index plus the active chain
#[derive(Debug, Clone)]
pub struct ChainIndex {
    entries: Vec<BlockIndex>,
    by_hash: HashMap<Hash256, IndexHandle>,
    active: Vec<IndexHandle>,
}

impl ChainIndex {
    /// Creates an index holding only the genesis block, which becomes the tip.
    pub fn new(genesis: &BlockHeader) -> Result<Self, ChainIndexErr> {
        let hash = *genesis.hash().ok_or(ChainIndexErr::MissingHash)?;
        let entry = BlockIndex {
            hash,
            prev_hash: genesis.prev_hash,
            height: 0,
            prev: None,
            skip: None,
            accumulator_checkpoint: genesis.accumulator_checkpoint,
            mint_denominations: vec![],
            anon_outputs: 0,
        };

        let mut by_hash = HashMap::new();
        by_hash.insert(hash, 0);

        Ok(Self {
            entries: vec![entry],
            by_hash,
            active: vec![0],
        })
    }

    /// Adds a header whose parent is already indexed. Does not change the
    /// active chain.
    pub fn insert(
        &mut self,
        header: &BlockHeader,
        mint_denominations: Vec<CoinDenomination>,
        new_anon_outputs: i64,
    ) -> Result<IndexHandle, ChainIndexErr> {
        let hash = *header.hash().ok_or(ChainIndexErr::MissingHash)?;

        if let Some(handle) = self.by_hash.get(&hash) {
            return Ok(*handle);
        }

        let prev = *self
            .by_hash
            .get(&header.prev_hash)
            .ok_or(ChainIndexErr::UnknownParent)?;
        let height = self.entries[prev].height + 1;
        let skip = self.get_ancestor(prev, get_skip_height(height));
        let anon_outputs = self.entries[prev].anon_outputs + new_anon_outputs;
        let handle = self.entries.len();

        self.entries.push(BlockIndex {
            hash,
            prev_hash: header.prev_hash,
            height,
            prev: Some(prev),
            skip,
            accumulator_checkpoint: header.accumulator_checkpoint,
            mint_denominations,
            anon_outputs,
        });
        self.by_hash.insert(hash, handle);

        Ok(handle)
    }

    #[must_use]
    pub fn get(&self, handle: IndexHandle) -> Option<&BlockIndex> {
        self.entries.get(handle)
    }

    #[must_use]
    pub fn handle_of(&self, hash: &Hash256) -> Option<IndexHandle> {
        self.by_hash.get(hash).copied()
    }

    /// Ancestor of `handle` at `height`, following skip pointers
    #[must_use]
    pub fn get_ancestor(&self, handle: IndexHandle, height: u64) -> Option<IndexHandle> {
        let mut walk = self.entries.get(handle)?;
        let mut walk_handle = handle;

        if height > walk.height {
            return None;
        }

        let mut height_walk = walk.height;
        while height_walk > height {
            let height_skip = get_skip_height(height_walk);
            let height_skip_prev = get_skip_height(height_walk - 1);

            let take_skip = walk.skip.is_some()
                && (height_skip == height
                    || (height_skip > height
                        && !(height_skip_prev + 2 < height_skip && height_skip_prev >= height)));

            if take_skip {
                walk_handle = walk.skip?;
                height_walk = height_skip;
            } else {
                walk_handle = walk.prev?;
                height_walk -= 1;
            }

            walk = &self.entries[walk_handle];
        }

        Some(walk_handle)
    }

    /// Makes `handle` the tip of the active chain
    pub fn set_tip(&mut self, handle: IndexHandle) -> Result<(), ChainIndexErr> {
        let height = self
            .entries
            .get(handle)
            .ok_or(ChainIndexErr::UnknownHandle)?
            .height as usize;

        self.active.truncate(height + 1);
        self.active.resize(height + 1, usize::MAX);

        let mut cursor = Some(handle);
        while let Some(h) = cursor {
            let entry = &self.entries[h];
            let pos = entry.height as usize;

            if self.active[pos] == h {
                break;
            }

            self.active[pos] = h;
            cursor = entry.prev;
        }

        Ok(())
    }

    /// Removes the tip from the active chain and returns it. The genesis block
    /// is never removed.
    pub fn pop_tip(&mut self) -> Option<IndexHandle> {
        if self.active.len() <= 1 {
            return None;
        }

        self.active.pop()
    }
}

impl ChainOracle for ChainIndex {
    fn height(&self) -> u64 {
        (self.active.len() - 1) as u64
    }

    fn at(&self, height: u64) -> Option<&BlockIndex> {
        let handle = *self.active.get(usize::try_from(height).ok()?)?;
        self.entries.get(handle)
    }

    fn tip(&self) -> &BlockIndex {
        &self.entries[self.active[self.active.len() - 1]]
    }

    fn lookup(&self, hash: &Hash256) -> Option<&BlockIndex> {
        self.by_hash.get(hash).and_then(|h| self.entries.get(*h))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainIndexErr {
    /// Header hash has not been computed
    MissingHash,

    /// Parent of the header is not indexed
    UnknownParent,

    /// Handle does not point into the arena
    UnknownHandle,
}
