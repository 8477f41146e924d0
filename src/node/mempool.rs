// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::codec::encode_to_vec;
use crate::consensus::KEY_IMAGE_SIZE;
use crate::primitives::{Hash256, Transaction};
use crate::ringct::tx_key_images;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use triomphe::Arc;

pub type KeyImage = [u8; KEY_IMAGE_SIZE];
pub type SharedMempool = Arc<RwLock<Mempool>>;

/// Entry of the mempool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub key_images: Vec<KeyImage>,
    pub tx_size: usize,
}

/// Unconfirmed transactions together with the key images they spend
#[derive(Debug, Default)]
pub struct Mempool {
    pub(crate) tx_map: HashMap<Hash256, MempoolEntry>,
    pub(crate) key_images: HashMap<KeyImage, Hash256>,
    pub(crate) current_size_bytes: u64,
}

impl Mempool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> SharedMempool {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Adds a transaction. Fails if one of its key images is already claimed
    /// by another in-flight transaction.
    pub fn append(&mut self, tx: Transaction) -> Result<(), MempoolErr> {
        let tx_hash = *tx.hash().ok_or(MempoolErr::MissingHash)?;

        // First check if we have the transaction present
        if self.tx_map.contains_key(&tx_hash) {
            return Ok(());
        }

        let key_images = tx_key_images(&tx).ok_or(MempoolErr::BadAnonInput)?;
        for ki in &key_images {
            if let Some(other) = self.key_images.get(ki) {
                log::debug!(
                    "Rejecting {}, key image {} is spent by {}",
                    tx_hash.to_hex(),
                    hex::encode(ki),
                    other.to_hex()
                );
                return Err(MempoolErr::Conflict(*other));
            }
        }

        let tx_size = encode_to_vec(&tx)
            .map_err(|_| MempoolErr::Encode)?
            .len();

        for ki in &key_images {
            self.key_images.insert(*ki, tx_hash);
        }

        self.current_size_bytes += tx_size as u64;
        self.tx_map.insert(
            tx_hash,
            MempoolEntry {
                tx,
                key_images,
                tx_size,
            },
        );

        Ok(())
    }

    pub fn append_batch(&mut self, txs: Vec<Transaction>) -> Result<(), MempoolErr> {
        for tx in txs {
            self.append(tx)?;
        }

        Ok(())
    }

    /// Removes a transaction and releases its key images
    pub fn remove(&mut self, tx_hash: &Hash256) -> Option<Transaction> {
        let entry = self.tx_map.remove(tx_hash)?;
        for ki in &entry.key_images {
            if self.key_images.get(ki) == Some(tx_hash) {
                self.key_images.remove(ki);
            }
        }

        self.current_size_bytes -= entry.tx_size as u64;
        Some(entry.tx)
    }

    /// Drops the transactions mined in a connected block along with every
    /// in-flight transaction spending one of the same key images. Returns
    /// the number of removed transactions.
    pub fn remove_for_block(&mut self, txs: &[Transaction]) -> usize {
        let mut removed = 0;

        for tx in txs {
            let tx_hash = tx.txid();
            if self.remove(&tx_hash).is_some() {
                removed += 1;
            }

            for ki in tx_key_images(tx).unwrap_or_default() {
                if let Some(conflict) = self.key_images.get(&ki).copied() {
                    log::debug!(
                        "Evicting {}, key image spent in block by {}",
                        conflict.to_hex(),
                        tx_hash.to_hex()
                    );
                    if self.remove(&conflict).is_some() {
                        removed += 1;
                    }
                }
            }
        }

        removed
    }

    #[must_use]
    pub fn spender_of(&self, key_image: &KeyImage) -> Option<&Hash256> {
        self.key_images.get(key_image)
    }

    #[must_use]
    pub fn contains(&self, tx_hash: &Hash256) -> bool {
        self.tx_map.contains_key(tx_hash)
    }

    #[must_use]
    pub fn get(&self, tx_hash: &Hash256) -> Option<&Transaction> {
        self.tx_map.get(tx_hash).map(|e| &e.tx)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tx_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx_map.is_empty()
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.current_size_bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MempoolErr {
    /// Transaction hash has not been computed
    MissingHash,

    /// An anon input could not be parsed
    BadAnonInput,

    /// A key image is already spent by the in-flight transaction
    Conflict(Hash256),

    /// Transaction could not be encoded
    Encode,
}

impl MempoolErr {
    /// Reject reason
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingHash => "bad-txns-hash",
            Self::BadAnonInput => "bad-anon-input",
            Self::Conflict(_) => "txn-mempool-conflict",
            Self::Encode => "bad-txns-encode",
        }
    }
}

impl fmt::Display for MempoolErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict(txid) => write!(f, "{}: {}", self.reason(), txid.to_hex()),
            _ => write!(f, "{}", self.reason()),
        }
    }
}
