// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

#[cfg(feature = "disk")]
pub mod disk;
pub mod memory;
pub mod memory_store;

pub use memory::MemoryBackend;

use crate::primitives::{Block, Hash256};
use bincode::error::{DecodeError, EncodeError};
use std::collections::HashSet;
use bincode::{Decode, Encode};
#[cfg(feature = "disk")]
use rocksdb::Error as RocksDBErr;
use streaming_iterator::StreamingIterator;

pub const ZEROCOIN_CF: &str = "zerocoin";
pub const RINGCT_CF: &str = "ringct";
pub const BLOCKS_CF: &str = "blocks";
pub const PRECOMPUTE_CF: &str = "precompute";

/// Interface to a single keyspace of the underlying database. When using
/// `RocksDB` every keyspace is a column family.
pub trait DBInterface: Clone + Send + Sync {
    fn get<K: AsRef<[u8]>, V: Decode>(&self, key: K) -> Result<Option<V>, DBInterfaceErr>;

    /// Encoded value stored at `key`
    fn get_raw<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>, DBInterfaceErr>;

    fn put<K: AsRef<[u8]>, V: Encode>(&self, key: K, v: V) -> Result<(), DBInterfaceErr>;
    fn delete<K: AsRef<[u8]>>(&self, k: K) -> Result<(), DBInterfaceErr>;

    /// Iterates every entry whose key starts with `prefix`, in key order.
    /// Entries that fail to decode are skipped.
    fn prefix_iterator<'a, V: Decode + 'a>(
        &self,
        prefix: Vec<u8>,
        direction: IteratorDirection,
    ) -> Box<dyn StreamingIterator<Item = (Vec<u8>, V)> + 'a>;

    /// Atomically applies a batch of writes and deletes
    fn write_batch(&self, batch: DBBatch) -> Result<(), DBInterfaceErr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorDirection {
    Forward,
    Backward,
}

/// Pending writes of an atomic batch. `None` values are deletes.
#[derive(Debug, Default, Clone)]
pub struct DBBatch {
    ops: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl DBBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<K: AsRef<[u8]>, V: Encode>(&mut self, key: K, v: V) -> Result<(), DBInterfaceErr> {
        let encoded = crate::codec::encode_to_vec(&v)?;
        self.ops.push((key.as_ref().to_vec(), Some(encoded)));
        Ok(())
    }

    pub fn delete<K: AsRef<[u8]>>(&mut self, key: K) {
        self.ops.push((key.as_ref().to_vec(), None));
    }

    /// Batch restoring every key touched by this one to its value in `db`.
    /// Must be built before this batch is written.
    pub fn undo<B: DBInterface>(&self, db: &B) -> Result<Self, DBInterfaceErr> {
        let mut seen = HashSet::new();
        let mut undo = Self::new();

        for (key, _) in &self.ops {
            if !seen.insert(key.as_slice()) {
                continue;
            }

            let previous = db.get_raw(key)?;
            undo.ops.push((key.clone(), previous));
        }

        Ok(undo)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.ops
    }
}

/// Writes each batch to its keyspace, in order. When a write fails the
/// batches already written are reverted so no keyspace keeps a partial
/// update. The last batch should hold the record that makes the update
/// visible.
pub fn write_batches<B: DBInterface>(writes: Vec<(&B, DBBatch)>) -> Result<(), DBInterfaceErr> {
    let undo = writes
        .iter()
        .map(|(db, batch)| batch.undo(*db))
        .collect::<Result<Vec<_>, _>>()?;

    for (i, (db, batch)) in writes.iter().enumerate() {
        if batch.is_empty() {
            continue;
        }

        if let Err(err) = db.write_batch(batch.clone()) {
            log::error!("Batch {} of {} failed, reverting: {:?}", i + 1, writes.len(), err);

            for (j, undo) in undo.into_iter().enumerate().take(i).rev() {
                if let Err(revert_err) = writes[j].0.write_batch(undo) {
                    log::error!("Could not revert batch: {:?}", revert_err);
                }
            }

            return Err(err);
        }
    }

    Ok(())
}

/// Streaming iterator over entries already read from a backend
pub struct DBPrefixIterator<V> {
    items: Vec<(Vec<u8>, V)>,
    pos: Option<usize>,
}

impl<V: Decode> DBPrefixIterator<V> {
    /// Decodes and orders raw entries. Undecodable values are dropped.
    #[must_use]
    pub fn new(raw: Vec<(Vec<u8>, Vec<u8>)>, direction: IteratorDirection) -> Self {
        let mut items: Vec<(Vec<u8>, V)> = raw
            .into_iter()
            .filter_map(|(k, v)| match crate::codec::decode::<V>(&v) {
                Ok(v) => Some((k, v)),
                Err(err) => {
                    log::warn!("Skipping undecodable entry {}: {:?}", hex::encode(&k), err);
                    None
                }
            })
            .collect();

        items.sort_by(|a, b| a.0.cmp(&b.0));
        if direction == IteratorDirection::Backward {
            items.reverse();
        }

        Self { items, pos: None }
    }
}

impl<V> StreamingIterator for DBPrefixIterator<V> {
    type Item = (Vec<u8>, V);

    fn advance(&mut self) {
        self.pos = Some(self.pos.map_or(0, |p| p + 1));
    }

    fn get(&self) -> Option<&Self::Item> {
        self.pos.and_then(|p| self.items.get(p))
    }
}

/// Handles to every keyspace used by the node
#[derive(Clone)]
pub struct Stores<B: DBInterface> {
    pub zerocoin: B,
    pub ringct: B,
    pub blocks: B,
    pub precompute: B,
}

impl Stores<MemoryBackend> {
    #[must_use]
    pub fn memory() -> Self {
        Self {
            zerocoin: MemoryBackend::new(),
            ringct: MemoryBackend::new(),
            blocks: MemoryBackend::new(),
            precompute: MemoryBackend::new(),
        }
    }
}

/// Block storage. Blocks are keyed by their hash.
pub trait BlockStore {
    fn read_block(&self, hash: &Hash256) -> Result<Option<Block>, DBInterfaceErr>;
    fn write_block(&self, block: &Block) -> Result<(), DBInterfaceErr>;
}

impl<B: DBInterface> BlockStore for B {
    fn read_block(&self, hash: &Hash256) -> Result<Option<Block>, DBInterfaceErr> {
        self.get(block_key(hash))
    }

    fn write_block(&self, block: &Block) -> Result<(), DBInterfaceErr> {
        let mut batch = DBBatch::new();
        stage_block(&mut batch, block)?;
        self.write_batch(batch)
    }
}

/// Adds `block` to a batch of the blocks keyspace
pub fn stage_block(batch: &mut DBBatch, block: &Block) -> Result<(), DBInterfaceErr> {
    let hash = block
        .hash()
        .ok_or(DBInterfaceErr::Error("block hash not computed"))?;
    batch.put(block_key(hash), block)
}

fn block_key(hash: &Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(b'b');
    key.extend_from_slice(hash.as_bytes());
    key
}

#[derive(Debug)]
pub enum DBInterfaceErr {
    /// Rocksdb error
    #[cfg(feature = "disk")]
    RocksDB(RocksDBErr),

    /// Bincode encode error
    BincodeEncode(EncodeError),

    /// Bincode decode error
    BincodeDecode(DecodeError),

    /// Generic error
    Error(&'static str),
}

#[cfg(feature = "disk")]
impl From<RocksDBErr> for DBInterfaceErr {
    fn from(other: RocksDBErr) -> Self {
        Self::RocksDB(other)
    }
}

impl From<EncodeError> for DBInterfaceErr {
    fn from(other: EncodeError) -> Self {
        Self::BincodeEncode(other)
    }
}

impl From<DecodeError> for DBInterfaceErr {
    fn from(other: DecodeError) -> Self {
        Self::BincodeDecode(other)
    }
}
