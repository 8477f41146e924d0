// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::{
    DBBatch, DBInterface, DBInterfaceErr, DBPrefixIterator, IteratorDirection, Stores,
    BLOCKS_CF, PRECOMPUTE_CF, RINGCT_CF, ZEROCOIN_CF,
};
use bincode::{Decode, Encode};
use rocksdb::{
    ColumnFamilyDescriptor, LogLevel, MultiThreaded, Options, TransactionDB,
    TransactionDBOptions, WriteBatchWithTransaction,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use streaming_iterator::StreamingIterator;

pub type DB = TransactionDB<MultiThreaded>;
pub type WriteBatch = WriteBatchWithTransaction<true>;

/// A single column family of the node database
#[derive(Clone)]
pub struct DiskBackend {
    db: Arc<DB>,
    cf: &'static str,
}

impl DiskBackend {
    #[must_use]
    pub fn new(db: Arc<DB>, cf: &'static str) -> Self {
        Self { db, cf }
    }

    fn handle(&self) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>, DBInterfaceErr> {
        self.db
            .cf_handle(self.cf)
            .ok_or(DBInterfaceErr::Error("missing column family"))
    }
}

impl DBInterface for DiskBackend {
    fn get<K: AsRef<[u8]>, V: Decode>(&self, key: K) -> Result<Option<V>, DBInterfaceErr> {
        let cf = self.handle()?;
        match self.db.get_cf(&cf, key)? {
            Some(bytes) => Ok(Some(crate::codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_raw<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>, DBInterfaceErr> {
        let cf = self.handle()?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    fn put<K: AsRef<[u8]>, V: Encode>(&self, key: K, v: V) -> Result<(), DBInterfaceErr> {
        let cf = self.handle()?;
        let encoded = crate::codec::encode_to_vec(&v)?;
        self.db.put_cf(&cf, key, encoded)?;
        Ok(())
    }

    fn delete<K: AsRef<[u8]>>(&self, k: K) -> Result<(), DBInterfaceErr> {
        let cf = self.handle()?;
        self.db.delete_cf(&cf, k)?;
        Ok(())
    }

    fn prefix_iterator<'a, V: Decode + 'a>(
        &self,
        prefix: Vec<u8>,
        direction: IteratorDirection,
    ) -> Box<dyn StreamingIterator<Item = (Vec<u8>, V)> + 'a> {
        let mut raw = vec![];

        match self.handle() {
            Ok(cf) => {
                for item in self.db.prefix_iterator_cf(&cf, &prefix) {
                    match item {
                        Ok((k, v)) => {
                            if !k.starts_with(&prefix) {
                                break;
                            }

                            raw.push((k.to_vec(), v.to_vec()));
                        }
                        Err(err) => {
                            log::error!("Prefix iteration failed on {}: {}", self.cf, err);
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                log::error!("Prefix iteration failed on {}: {:?}", self.cf, err);
            }
        }

        Box::new(DBPrefixIterator::new(raw, direction))
    }

    fn write_batch(&self, batch: DBBatch) -> Result<(), DBInterfaceErr> {
        let cf = self.handle()?;
        let mut wb = WriteBatch::default();

        for (k, v) in batch.into_ops() {
            match v {
                Some(v) => wb.put_cf(&cf, k, v),
                None => wb.delete_cf(&cf, k),
            }
        }

        self.db.write(wb)?;
        Ok(())
    }
}

impl Stores<DiskBackend> {
    #[must_use]
    pub fn disk(db: Arc<DB>) -> Self {
        Self {
            zerocoin: DiskBackend::new(db.clone(), ZEROCOIN_CF),
            ringct: DiskBackend::new(db.clone(), RINGCT_CF),
            blocks: DiskBackend::new(db.clone(), BLOCKS_CF),
            precompute: DiskBackend::new(db, PRECOMPUTE_CF),
        }
    }
}

/// Opens the node database under the configured data directory
pub fn create_rocksdb_backend() -> Result<Arc<DB>, DBInterfaceErr> {
    #[cfg(not(test))]
    let mut path = PathBuf::from_str(&crate::settings::SETTINGS.node.data_dir)
        .map_err(|_| DBInterfaceErr::Error("invalid data dir"))?;

    #[cfg(test)]
    let mut path = {
        use rand::Rng;
        let mut path = std::env::temp_dir();
        path.push(hex::encode(rand::thread_rng().gen::<[u8; 32]>()));
        path.push("Veil");
        path
    };

    path.push(&crate::settings::SETTINGS.node.network_name);
    path.push("data");

    let mut cf_opts = Options::default();
    cf_opts.set_max_write_buffer_number(3);
    let cfs = vec![
        ColumnFamilyDescriptor::new(ZEROCOIN_CF, cf_opts.clone()),
        ColumnFamilyDescriptor::new(RINGCT_CF, cf_opts.clone()),
        ColumnFamilyDescriptor::new(BLOCKS_CF, cf_opts.clone()),
        ColumnFamilyDescriptor::new(PRECOMPUTE_CF, cf_opts),
    ];

    let mut db_opts = Options::default();
    db_opts.create_missing_column_families(true);
    db_opts.create_if_missing(true);
    db_opts.set_log_level(LogLevel::Warn);
    db_opts.set_keep_log_file_num(1);
    let db = DB::open_cf_descriptors(&db_opts, &TransactionDBOptions::default(), path, cfs)?;
    Ok(Arc::new(db))
}
