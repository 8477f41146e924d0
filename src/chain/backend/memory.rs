// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::memory_store::MemoryStore;
use crate::chain::backend::{
    DBBatch, DBInterface, DBInterfaceErr, DBPrefixIterator, IteratorDirection,
};
use bincode::{Decode, Encode};
use streaming_iterator::StreamingIterator;

/// In memory keyspace. Used by tests and by nodes running with
/// `memory_only` set.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    store: MemoryStore<Vec<u8>, Vec<u8>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
        }
    }
}

impl DBInterface for MemoryBackend {
    fn get<K: AsRef<[u8]>, V: Decode>(&self, key: K) -> Result<Option<V>, DBInterfaceErr> {
        match self.store.get(&key.as_ref().to_vec()) {
            Some(bytes) => Ok(Some(crate::codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_raw<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>, DBInterfaceErr> {
        Ok(self.store.get(&key.as_ref().to_vec()))
    }

    fn put<K: AsRef<[u8]>, V: Encode>(&self, key: K, v: V) -> Result<(), DBInterfaceErr> {
        let encoded = crate::codec::encode_to_vec(&v)?;
        self.store.put(key.as_ref().to_vec(), encoded);
        Ok(())
    }

    fn delete<K: AsRef<[u8]>>(&self, k: K) -> Result<(), DBInterfaceErr> {
        self.store.delete(&k.as_ref().to_vec());
        Ok(())
    }

    fn prefix_iterator<'a, V: Decode + 'a>(
        &self,
        prefix: Vec<u8>,
        direction: IteratorDirection,
    ) -> Box<dyn StreamingIterator<Item = (Vec<u8>, V)> + 'a> {
        let raw = self.store.filter(|k| k.starts_with(&prefix));
        Box::new(DBPrefixIterator::new(raw, direction))
    }

    fn write_batch(&self, batch: DBBatch) -> Result<(), DBInterfaceErr> {
        self.store.apply_batch(batch.into_ops());
        Ok(())
    }
}
