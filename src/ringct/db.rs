// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::{DBBatch, DBInterface, DBInterfaceErr};
use crate::consensus::{COMMITMENT_SIZE, KEY_IMAGE_SIZE, POINT_SIZE};
use crate::primitives::{Hash256, OutPoint};
use bincode::{Decode, Encode};

const OUTPUT_PREFIX: u8 = b'o';
const LINK_PREFIX: u8 = b'l';
const KEY_IMAGE_PREFIX: u8 = b'k';
const LAST_INDEX_KEY: &[u8] = b"last";

/// Entry of the append-only anon output log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct AnonOutput {
    pub pubkey: [u8; POINT_SIZE],
    pub commitment: [u8; COMMITMENT_SIZE],
    pub outpoint: OutPoint,
    pub block_height: u64,
}

/// RingCT indexes. Output indices start at 1.
#[derive(Clone)]
pub struct RctDb<B: DBInterface> {
    db: B,
}

impl<B: DBInterface> RctDb<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Atomically applies writes staged by the `stage_*` methods
    pub fn write_batch(&self, batch: DBBatch) -> Result<(), DBInterfaceErr> {
        self.db.write_batch(batch)
    }

    /// Index of the last anon output, 0 if there are none
    pub fn last_index(&self) -> Result<i64, DBInterfaceErr> {
        Ok(self.db.get(LAST_INDEX_KEY)?.unwrap_or(0))
    }

    pub fn read_anon_output(&self, index: i64) -> Result<Option<AnonOutput>, DBInterfaceErr> {
        self.db.get(output_key(index))
    }

    pub fn read_anon_output_link(
        &self,
        pubkey: &[u8; POINT_SIZE],
    ) -> Result<Option<i64>, DBInterfaceErr> {
        self.db.get(link_key(pubkey))
    }

    /// Txid of the confirmed spend using `key_image`
    pub fn read_key_image(
        &self,
        key_image: &[u8; KEY_IMAGE_SIZE],
    ) -> Result<Option<Hash256>, DBInterfaceErr> {
        self.db.get(key_image_key(key_image))
    }

    pub fn write_key_image(
        &self,
        key_image: &[u8; KEY_IMAGE_SIZE],
        txid: Hash256,
    ) -> Result<(), DBInterfaceErr> {
        self.db.put(key_image_key(key_image), txid)
    }

    pub fn erase_key_image(&self, key_image: &[u8; KEY_IMAGE_SIZE]) -> Result<(), DBInterfaceErr> {
        self.db.delete(key_image_key(key_image))
    }

    /// Appends outputs to the log and returns the index of the first one
    pub fn append_anon_outputs(&self, outputs: &[AnonOutput]) -> Result<i64, DBInterfaceErr> {
        let mut batch = DBBatch::new();
        let first = self.stage_anon_outputs(&mut batch, outputs)?;
        self.db.write_batch(batch)?;
        Ok(first)
    }

    /// Adds the appends of `outputs` to `batch`. Only one append may be
    /// staged per batch.
    pub fn stage_anon_outputs(
        &self,
        batch: &mut DBBatch,
        outputs: &[AnonOutput],
    ) -> Result<i64, DBInterfaceErr> {
        let mut index = self.last_index()?;
        let first = index + 1;
        if outputs.is_empty() {
            return Ok(first);
        }

        for output in outputs {
            index += 1;
            batch.put(output_key(index), output)?;
            batch.put(link_key(&output.pubkey), index)?;
        }
        batch.put(LAST_INDEX_KEY, index)?;

        log::debug!("Staged anon outputs {} to {}", first, index);
        Ok(first)
    }

    /// Writes the key images spent by `txid` in one batch
    pub fn write_key_images(
        &self,
        key_images: &[[u8; KEY_IMAGE_SIZE]],
        txid: Hash256,
    ) -> Result<(), DBInterfaceErr> {
        if key_images.is_empty() {
            return Ok(());
        }

        let mut batch = DBBatch::new();
        self.stage_key_images(&mut batch, key_images, txid)?;
        self.db.write_batch(batch)
    }

    pub fn stage_key_images(
        &self,
        batch: &mut DBBatch,
        key_images: &[[u8; KEY_IMAGE_SIZE]],
        txid: Hash256,
    ) -> Result<(), DBInterfaceErr> {
        for ki in key_images {
            batch.put(key_image_key(ki), txid)?;
        }
        Ok(())
    }

    /// Truncates the output log to `last_valid` and erases the given key
    /// images. Returns the number of erased outputs.
    pub fn truncate(
        &self,
        last_valid: i64,
        key_images: &[[u8; KEY_IMAGE_SIZE]],
    ) -> Result<i64, DBInterfaceErr> {
        let mut batch = DBBatch::new();
        let erased = self.stage_truncate(&mut batch, last_valid, key_images)?;
        self.db.write_batch(batch)?;
        Ok(erased)
    }

    /// Adds the deletes of `truncate` to `batch`
    pub fn stage_truncate(
        &self,
        batch: &mut DBBatch,
        last_valid: i64,
        key_images: &[[u8; KEY_IMAGE_SIZE]],
    ) -> Result<i64, DBInterfaceErr> {
        let last = self.last_index()?;
        let mut erased = 0;

        let mut index = last;
        while index > last_valid {
            if let Some(output) = self.read_anon_output(index)? {
                batch.delete(link_key(&output.pubkey));
            }
            batch.delete(output_key(index));
            erased += 1;
            index -= 1;
        }

        if erased > 0 {
            batch.put(LAST_INDEX_KEY, last_valid.max(0))?;
        }

        for ki in key_images {
            batch.delete(key_image_key(ki));
        }

        Ok(erased)
    }
}

fn output_key(index: i64) -> [u8; 9] {
    let mut key = [OUTPUT_PREFIX; 9];
    key[1..].copy_from_slice(&index.to_be_bytes());
    key
}

fn link_key(pubkey: &[u8; POINT_SIZE]) -> [u8; 1 + POINT_SIZE] {
    let mut key = [LINK_PREFIX; 1 + POINT_SIZE];
    key[1..].copy_from_slice(pubkey);
    key
}

fn key_image_key(key_image: &[u8; KEY_IMAGE_SIZE]) -> [u8; 1 + KEY_IMAGE_SIZE] {
    let mut key = [KEY_IMAGE_PREFIX; 1 + KEY_IMAGE_SIZE];
    key[1..].copy_from_slice(key_image);
    key
}
