// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::{DBBatch, DBInterface, DBInterfaceErr};
use crate::primitives::{BigNum, Hash256, PublicCoin};
use bincode::{Decode, Encode};

const MINT_PREFIX: u8 = b'm';
const SPEND_PREFIX: u8 = b's';
const ACC_VALUE_PREFIX: u8 = b'a';

/// Location of a confirmed mint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct MintRecord {
    pub txid: Hash256,
    pub height: u64,
}

/// Zerocoin indexes: mints by coin value, spends by serial and accumulator
/// values by checksum.
#[derive(Clone)]
pub struct ZerocoinDb<B: DBInterface> {
    db: B,
}

impl<B: DBInterface> ZerocoinDb<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn write_coin_mint(
        &self,
        coin: &PublicCoin,
        txid: Hash256,
        height: u64,
    ) -> Result<(), DBInterfaceErr> {
        self.db
            .put(mint_key(coin.value()), MintRecord { txid, height })
    }

    pub fn read_coin_mint(&self, value: &BigNum) -> Result<Option<MintRecord>, DBInterfaceErr> {
        self.db.get(mint_key(value))
    }

    pub fn erase_coin_mint(&self, value: &BigNum) -> Result<(), DBInterfaceErr> {
        self.db.delete(mint_key(value))
    }

    pub fn write_coin_spend(&self, serial: &BigNum, txid: Hash256) -> Result<(), DBInterfaceErr> {
        self.db.put(spend_key(serial), txid)
    }

    pub fn read_coin_spend(&self, serial: &BigNum) -> Result<Option<Hash256>, DBInterfaceErr> {
        self.db.get(spend_key(serial))
    }

    pub fn erase_coin_spend(&self, serial: &BigNum) -> Result<(), DBInterfaceErr> {
        self.db.delete(spend_key(serial))
    }

    pub fn write_accumulator_value(
        &self,
        checksum: u32,
        value: &BigNum,
    ) -> Result<(), DBInterfaceErr> {
        log::debug!("Writing accumulator value for checksum {:08x}", checksum);
        self.db.put(acc_value_key(checksum), value)
    }

    pub fn read_accumulator_value(&self, checksum: u32) -> Result<Option<BigNum>, DBInterfaceErr> {
        self.db.get(acc_value_key(checksum))
    }

    pub fn erase_accumulator_value(&self, checksum: u32) -> Result<(), DBInterfaceErr> {
        log::debug!("Erasing accumulator value for checksum {:08x}", checksum);
        self.db.delete(acc_value_key(checksum))
    }

    /// Indexes every mint of a connected block in one batch
    pub fn write_mints(
        &self,
        mints: &[(PublicCoin, Hash256)],
        height: u64,
    ) -> Result<(), DBInterfaceErr> {
        if mints.is_empty() {
            return Ok(());
        }

        let mut batch = DBBatch::new();
        self.stage_mints(&mut batch, mints, height)?;
        self.db.write_batch(batch)
    }

    pub fn stage_mints(
        &self,
        batch: &mut DBBatch,
        mints: &[(PublicCoin, Hash256)],
        height: u64,
    ) -> Result<(), DBInterfaceErr> {
        for (coin, txid) in mints {
            batch.put(
                mint_key(coin.value()),
                MintRecord {
                    txid: *txid,
                    height,
                },
            )?;
        }
        Ok(())
    }

    /// Removes the mints of a disconnected block in one batch
    pub fn erase_mints(&self, mints: &[PublicCoin]) -> Result<(), DBInterfaceErr> {
        if mints.is_empty() {
            return Ok(());
        }

        let mut batch = DBBatch::new();
        self.stage_erase_mints(&mut batch, mints);
        self.db.write_batch(batch)
    }

    pub fn stage_erase_mints(&self, batch: &mut DBBatch, mints: &[PublicCoin]) {
        for coin in mints {
            batch.delete(mint_key(coin.value()));
        }
    }

    pub fn stage_accumulator_value(
        &self,
        batch: &mut DBBatch,
        checksum: u32,
        value: &BigNum,
    ) -> Result<(), DBInterfaceErr> {
        log::debug!("Staging accumulator value for checksum {:08x}", checksum);
        batch.put(acc_value_key(checksum), value)
    }

    pub fn stage_erase_accumulator_value(&self, batch: &mut DBBatch, checksum: u32) {
        log::debug!("Staging erase of accumulator value for checksum {:08x}", checksum);
        batch.delete(acc_value_key(checksum));
    }

    /// Atomically applies writes staged by the `stage_*` methods
    pub fn write_batch(&self, batch: DBBatch) -> Result<(), DBInterfaceErr> {
        self.db.write_batch(batch)
    }
}

fn prefixed(prefix: u8, hash: &Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(prefix);
    key.extend_from_slice(hash.as_bytes());
    key
}

fn mint_key(value: &BigNum) -> Vec<u8> {
    prefixed(MINT_PREFIX, &value.hash())
}

fn spend_key(serial: &BigNum) -> Vec<u8> {
    prefixed(SPEND_PREFIX, &serial.hash())
}

fn acc_value_key(checksum: u32) -> [u8; 5] {
    let mut key = [ACC_VALUE_PREFIX, 0, 0, 0, 0];
    key[1..].copy_from_slice(&checksum.to_be_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::backend::MemoryBackend;
    use crate::primitives::CoinDenomination;

    fn db() -> ZerocoinDb<MemoryBackend> {
        ZerocoinDb::new(MemoryBackend::new())
    }

    #[test]
    fn it_indexes_mints() {
        let db = db();
        let coin = PublicCoin::new(CoinDenomination::Ten, BigNum::from_u64(1_000_003));
        let other = PublicCoin::new(CoinDenomination::Ten, BigNum::from_u64(1_000_033));

        db.write_mints(&[(coin.clone(), Hash256([1; 32]))], 35)
            .unwrap();
        assert_eq!(
            db.read_coin_mint(coin.value()).unwrap(),
            Some(MintRecord {
                txid: Hash256([1; 32]),
                height: 35
            })
        );
        assert_eq!(db.read_coin_mint(other.value()).unwrap(), None);

        db.erase_mints(&[coin.clone()]).unwrap();
        assert_eq!(db.read_coin_mint(coin.value()).unwrap(), None);
    }

    #[test]
    fn it_indexes_spends() {
        let db = db();
        let serial = BigNum::from_u64(42);
        db.write_coin_spend(&serial, Hash256([3; 32])).unwrap();
        assert_eq!(db.read_coin_spend(&serial).unwrap(), Some(Hash256([3; 32])));
        db.erase_coin_spend(&serial).unwrap();
        assert_eq!(db.read_coin_spend(&serial).unwrap(), None);
    }

    #[test]
    fn it_stores_accumulator_values() {
        let db = db();
        let value = BigNum::from_u64(961);
        db.write_accumulator_value(0xdead_beef, &value).unwrap();
        assert_eq!(db.read_accumulator_value(0xdead_beef).unwrap(), Some(value));
        assert_eq!(db.read_accumulator_value(1).unwrap(), None);
        db.erase_accumulator_value(0xdead_beef).unwrap();
        assert_eq!(db.read_accumulator_value(0xdead_beef).unwrap(), None);
    }
}
