// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::{
    stage_block, write_batches, BlockStore, DBBatch, DBInterface, DBInterfaceErr, Stores,
};
use crate::chain::{ChainConfig, ChainIndex, ChainIndexErr, ChainOracle, IndexHandle};
use crate::consensus::{is_checkpoint_height, KEY_IMAGE_SIZE};
use crate::node::{Mempool, MempoolErr, SharedMempool};
use crate::primitives::{AccumulatorCheckpoint, Block, Hash256, OutPoint, Transaction};
use crate::ringct::{
    all_anon_outputs_unknown, anon_outputs, stage_rollback_rct_index, tx_key_images,
    verify_coinbase, verify_mlsag, verify_range_proofs, AnonOutput, AnonVerifyErr, DecoyContext,
    RctDb,
};
use crate::zerocoin::{
    calculate_accumulator_checkpoint, validate_accumulator_checkpoint, AccumulatorMap,
    CheckpointErr, ChecksumStore, ChecksumStoreErr, WitnessBuilder, ZerocoinDb,
};
use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;

const ACTIVE_HEIGHT_PREFIX: u8 = b'h';

/// Validation state of the active chain. The block index doubles as the main
/// validation lock, every read of height indexed data goes through it.
pub struct ChainState<B: DBInterface> {
    chain: Mutex<ChainIndex>,
    stores: Stores<B>,
    config: ChainConfig,
    checksums: ChecksumStore<B>,
    map: Mutex<AccumulatorMap>,
    rct: RctDb<B>,
    pub mempool: SharedMempool,
}

impl<B: DBInterface> ChainState<B> {
    /// Creates a chain holding only `genesis`
    pub fn new(stores: Stores<B>, config: ChainConfig, genesis: &Block) -> Result<Self, ChainStateErr> {
        stores.blocks.write_block(genesis)?;
        let chain = ChainIndex::new(&genesis.header)?;
        let genesis_hash = *genesis.hash().ok_or(ChainStateErr::MissingHash)?;
        stores.blocks.put(height_key(0), genesis_hash)?;

        Ok(Self {
            chain: Mutex::new(chain),
            checksums: ChecksumStore::new(ZerocoinDb::new(stores.zerocoin.clone())),
            map: Mutex::new(AccumulatorMap::new(config.zerocoin_params().clone())),
            rct: RctDb::new(stores.ringct.clone()),
            mempool: Mempool::shared(),
            stores,
            config,
        })
    }

    /// Creates the chain and replays every block stored as part of the
    /// active chain on top of `genesis`
    pub fn open(stores: Stores<B>, config: ChainConfig, genesis: &Block) -> Result<Self, ChainStateErr> {
        let state = Self::new(stores, config, genesis)?;
        let mut height = 1;

        loop {
            if crate::global::shutdown_requested() {
                return Err(ChainStateErr::Shutdown);
            }

            let hash: Hash256 = match state.stores.blocks.get(height_key(height))? {
                Some(hash) => hash,
                None => break,
            };

            let block = state
                .stores
                .blocks
                .read_block(&hash)?
                .ok_or(ChainStateErr::MissingBlock(hash))?;

            state.connect_block(&block)?;
            height += 1;
        }

        log::info!(
            "Loaded {} chain at height {}",
            state.config.network_name(),
            state.height()
        );
        Ok(state)
    }

    #[must_use]
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Main validation lock
    #[must_use]
    pub fn chain(&self) -> &Mutex<ChainIndex> {
        &self.chain
    }

    #[must_use]
    pub fn stores(&self) -> &Stores<B> {
        &self.stores
    }

    #[must_use]
    pub fn checksums(&self) -> &ChecksumStore<B> {
        &self.checksums
    }

    #[must_use]
    pub fn rct(&self) -> &RctDb<B> {
        &self.rct
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.chain.lock().height()
    }

    #[must_use]
    pub fn tip_hash(&self) -> Hash256 {
        self.chain.lock().tip().hash
    }

    #[must_use]
    pub fn witness_builder(&self) -> WitnessBuilder<'_, ChainIndex, B, B> {
        WitnessBuilder::new(&self.chain, &self.stores.blocks, &self.checksums, &self.config)
    }

    /// Decoy selection context at the current tip
    pub fn decoy_context<'a>(
        &'a self,
        blacklist: &'a HashSet<OutPoint>,
    ) -> Result<DecoyContext<'a, B>, ChainStateErr> {
        Ok(DecoyContext {
            db: &self.rct,
            config: &self.config,
            best_height: self.height(),
            last_index: self.rct.last_index()?,
            blacklist,
        })
    }

    /// Checkpoint a block extending the current tip must carry
    pub fn next_accumulator_checkpoint(&self) -> Result<AccumulatorCheckpoint, ChainStateErr> {
        let chain = self.chain.lock();
        let mut map = self.map.lock();
        let checkpoint = calculate_accumulator_checkpoint(
            chain.height() + 1,
            &*chain,
            &self.stores.blocks,
            &self.checksums,
            &mut map,
        )?;

        Ok(checkpoint)
    }

    /// Validates `block` against the tip and connects it. Range proofs and
    /// anon spends are verified in parallel before any index is touched.
    /// Index writes are staged per keyspace and written together, the
    /// height record last.
    pub fn connect_block(&self, block: &Block) -> Result<IndexHandle, ChainStateErr> {
        let hash = *block.hash().ok_or(ChainStateErr::MissingHash)?;
        let mut chain = self.chain.lock();

        if block.header.prev_hash != chain.tip().hash {
            return Err(ChainStateErr::NotExtendingTip(hash));
        }

        if !block.has_valid_merkle_root() {
            return Err(ChainStateErr::BadMerkleRoot);
        }

        let height = chain.height() + 1;
        let mut map = self.map.lock();
        validate_accumulator_checkpoint(
            height,
            &block.header.accumulator_checkpoint,
            &*chain,
            &self.stores.blocks,
            &self.checksums,
            &mut map,
        )?;

        block.txs.par_iter().try_for_each(|tx| {
            verify_range_proofs(tx)?;
            if tx.has_anon_inputs() {
                verify_mlsag(tx, &self.rct)?;
            }
            Ok::<(), AnonVerifyErr>(())
        })?;

        self.check_coinbase(block)?;

        let mut block_key_images = HashSet::new();
        let mut spent: Vec<(Vec<[u8; KEY_IMAGE_SIZE]>, Hash256)> = vec![];
        let mut new_outputs: Vec<AnonOutput> = vec![];
        let mut anon_count = 0;
        let mut mints = vec![];

        for tx in &block.txs {
            let txid = tx.txid();

            if tx.has_anon_inputs() {
                let kis = tx_key_images(tx).ok_or(AnonVerifyErr::BadAnonInput)?;
                for ki in &kis {
                    if !block_key_images.insert(*ki) {
                        log::error!("Key image {} spent twice in block", hex::encode(ki));
                        return Err(ChainStateErr::DuplicateKeyImage(*ki));
                    }
                }
                spent.push((kis, txid));
            }

            let outputs = anon_outputs(tx, height);
            anon_count += outputs.len() as i64;
            if all_anon_outputs_unknown(tx, &self.rct)? {
                new_outputs.extend(outputs);
            }

            mints.extend(tx.mints().into_iter().map(|coin| (coin, txid)));
        }

        let mut rct_batch = DBBatch::new();
        for (kis, txid) in &spent {
            self.rct.stage_key_images(&mut rct_batch, kis, *txid)?;
        }
        self.rct.stage_anon_outputs(&mut rct_batch, &new_outputs)?;

        let mut zerocoin_batch = DBBatch::new();
        self.checksums
            .db()
            .stage_mints(&mut zerocoin_batch, &mints, height)?;
        let checksum_values = if is_checkpoint_height(height) {
            self.checksums.stage_checksums(&mut zerocoin_batch, &map)?
        } else {
            vec![]
        };
        drop(map);

        let mut blocks_batch = DBBatch::new();
        stage_block(&mut blocks_batch, block)?;
        blocks_batch.put(height_key(height), hash)?;

        write_batches(vec![
            (&self.stores.ringct, rct_batch),
            (&self.stores.zerocoin, zerocoin_batch),
            (&self.stores.blocks, blocks_batch),
        ])?;
        self.checksums.cache_values(checksum_values);

        let denoms = mints.iter().map(|(coin, _)| coin.denomination()).collect();
        let handle = chain.insert(&block.header, denoms, anon_count)?;
        chain.set_tip(handle)?;
        drop(chain);

        let removed = self.mempool.write().remove_for_block(&block.txs);
        log::info!(
            "Connected block {} at height {}, {} mints, {} anon outputs, {} removed from mempool",
            hash.to_hex(),
            height,
            mints.len(),
            anon_count,
            removed
        );

        Ok(handle)
    }

    /// Disconnects the tip, undoing its checksum, mint and RingCT index
    /// writes. Its transactions are offered back to the mempool.
    pub fn disconnect_tip(&self) -> Result<Block, ChainStateErr> {
        let mut chain = self.chain.lock();
        let height = chain.height();
        if height == 0 {
            return Err(ChainStateErr::DisconnectGenesis);
        }

        let tip = chain.tip().clone();
        let last_valid = chain
            .at(height - 1)
            .ok_or(ChainIndexErr::UnknownHandle)?
            .anon_outputs;

        let block = self
            .stores
            .blocks
            .read_block(&tip.hash)?
            .ok_or(ChainStateErr::MissingBlock(tip.hash))?;

        let mut kis = vec![];
        for tx in block.txs.iter().filter(|tx| tx.has_anon_inputs()) {
            kis.extend(tx_key_images(tx).unwrap_or_default());
        }
        let mut rct_batch = DBBatch::new();
        stage_rollback_rct_index(
            &self.rct,
            &mut rct_batch,
            last_valid,
            tip.anon_outputs,
            &kis,
        )?;

        let mut zerocoin_batch = DBBatch::new();
        self.checksums
            .stage_erase_checkpoints(&mut zerocoin_batch, &*chain, height, height)?;
        self.checksums
            .db()
            .stage_erase_mints(&mut zerocoin_batch, &block.mints());

        let mut blocks_batch = DBBatch::new();
        blocks_batch.delete(height_key(height));

        write_batches(vec![
            (&self.stores.ringct, rct_batch),
            (&self.stores.zerocoin, zerocoin_batch),
            (&self.stores.blocks, blocks_batch),
        ])?;
        chain.pop_tip();
        drop(chain);

        let mut mempool = self.mempool.write();
        for tx in block.txs.iter().filter(|tx| tx.has_anon_inputs()) {
            if let Err(err) = mempool.append(tx.clone()) {
                log::debug!("Dropping disconnected tx {}: {}", tx.txid().to_hex(), err);
            }
        }

        log::info!("Disconnected block {} at height {}", tip.hash.to_hex(), height);
        Ok(block)
    }

    /// The blinded outputs of a coinbase must commit to the flat reward plus
    /// the fees of the anon spends in its block, less its plain outputs
    fn check_coinbase(&self, block: &Block) -> Result<(), ChainStateErr> {
        let coinbase = match block.txs.first() {
            Some(tx) if tx.is_coinbase() => tx,
            _ => return Ok(()),
        };

        if coinbase.outs.iter().all(|out| out.commitment().is_none()) {
            return Ok(());
        }

        let mut expected = self.config.coinbase_reward;
        for tx in block.txs.iter().skip(1).filter(|tx| tx.has_anon_inputs()) {
            expected = expected
                .checked_add(tx.ct_fee().unwrap_or(0))
                .ok_or(AnonVerifyErr::BadPlainValue)?;
        }

        let plain = coinbase
            .get_plain_value_out()
            .map_err(|_| AnonVerifyErr::BadPlainValue)?;
        let expected = expected
            .checked_sub(plain)
            .filter(|v| *v >= 0)
            .ok_or(AnonVerifyErr::BadPlainValue)?;

        verify_coinbase(expected, coinbase)?;
        Ok(())
    }

    /// Verifies an unconfirmed transaction and adds it to the mempool
    pub fn accept_to_mempool(&self, tx: Transaction) -> Result<(), ChainStateErr> {
        verify_range_proofs(&tx)?;
        if tx.has_anon_inputs() {
            verify_mlsag(&tx, &self.rct)?;
        }

        self.mempool.write().append(tx)?;
        Ok(())
    }

    /// Locks the chain for callers reading several heights at once
    pub fn lock_chain(&self) -> MutexGuard<'_, ChainIndex> {
        self.chain.lock()
    }
}

fn height_key(height: u64) -> [u8; 9] {
    let mut key = [ACTIVE_HEIGHT_PREFIX; 9];
    key[1..].copy_from_slice(&height.to_be_bytes());
    key
}

#[derive(Debug)]
pub enum ChainStateErr {
    /// Block hash has not been computed
    MissingHash,

    /// Parent of the block is not the tip
    NotExtendingTip(Hash256),

    /// Merkle root does not match the transactions
    BadMerkleRoot,

    /// Accumulator checkpoint could not be validated
    Checkpoint(CheckpointErr),

    /// Anon spend failed verification
    Anon(AnonVerifyErr),

    /// Two transactions of the block spend the same key image
    DuplicateKeyImage([u8; KEY_IMAGE_SIZE]),

    /// Checksum store error
    Checksums(ChecksumStoreErr),

    /// Block index error
    Index(ChainIndexErr),

    /// Mempool rejected the transaction
    Mempool(MempoolErr),

    /// Block is indexed but not stored
    MissingBlock(Hash256),

    /// The genesis block cannot be disconnected
    DisconnectGenesis,

    /// Shutdown requested while loading
    Shutdown,

    /// Database error
    DB(DBInterfaceErr),
}

impl ChainStateErr {
    /// Reject reason
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingHash => "bad-blk-hash",
            Self::NotExtendingTip(_) => "prev-blk-not-tip",
            Self::BadMerkleRoot => "bad-txnmrklroot",
            Self::Checkpoint(err) => err.reason(),
            Self::Anon(err) => err.reason(),
            Self::DuplicateKeyImage(_) => "bad-anonin-dup-ki",
            Self::Mempool(err) => err.reason(),
            Self::Shutdown => "shutdown-requested",
            _ => "chainstate-failed",
        }
    }
}

impl fmt::Display for ChainStateErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anon(err) => write!(f, "{}", err),
            Self::Mempool(err) => write!(f, "{}", err),
            Self::NotExtendingTip(hash) | Self::MissingBlock(hash) => {
                write!(f, "{}: {}", self.reason(), hash.to_hex())
            }
            Self::DuplicateKeyImage(ki) => write!(f, "{}: {}", self.reason(), hex::encode(ki)),
            _ => write!(f, "{}: {:?}", self.reason(), self),
        }
    }
}

impl std::error::Error for ChainStateErr {}

impl From<CheckpointErr> for ChainStateErr {
    fn from(other: CheckpointErr) -> Self {
        Self::Checkpoint(other)
    }
}

impl From<AnonVerifyErr> for ChainStateErr {
    fn from(other: AnonVerifyErr) -> Self {
        Self::Anon(other)
    }
}

impl From<ChecksumStoreErr> for ChainStateErr {
    fn from(other: ChecksumStoreErr) -> Self {
        Self::Checksums(other)
    }
}

impl From<ChainIndexErr> for ChainStateErr {
    fn from(other: ChainIndexErr) -> Self {
        Self::Index(other)
    }
}

impl From<MempoolErr> for ChainStateErr {
    fn from(other: MempoolErr) -> Self {
        Self::Mempool(other)
    }
}

impl From<DBInterfaceErr> for ChainStateErr {
    fn from(other: DBInterfaceErr) -> Self {
        Self::DB(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::backend::MemoryBackend;
    use crate::consensus::{Money, COIN};
    use crate::primitives::{CoinDenomination, PublicCoin, TxIn, TxOut};
    use crate::chain::backend::IteratorDirection;
    use crate::ringct::{
        commit, inflating_spend, prove_range, public_key, random_scalar, AnonBuildErr,
        AnonTxBuilder, OwnedAnonOutput, TempRecipient,
    };
    use crate::zerocoin::random_coin;
    use bincode::{Decode, Encode};
    use curve25519_dalek::scalar::Scalar;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serial_test::serial;
    use std::sync::atomic::{AtomicBool, Ordering};
    use streaming_iterator::StreamingIterator;

    /// Memory keyspace whose writes fail while `fail_writes` is set
    #[derive(Clone, Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        failing: std::sync::Arc<AtomicBool>,
    }

    impl FlakyBackend {
        fn fail_writes(&self, fail: bool) {
            self.failing.store(fail, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), DBInterfaceErr> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DBInterfaceErr::Error("write failed"));
            }
            Ok(())
        }
    }

    impl DBInterface for FlakyBackend {
        fn get<K: AsRef<[u8]>, V: Decode>(&self, key: K) -> Result<Option<V>, DBInterfaceErr> {
            self.inner.get(key)
        }

        fn get_raw<K: AsRef<[u8]>>(&self, key: K) -> Result<Option<Vec<u8>>, DBInterfaceErr> {
            self.inner.get_raw(key)
        }

        fn put<K: AsRef<[u8]>, V: Encode>(&self, key: K, v: V) -> Result<(), DBInterfaceErr> {
            self.check()?;
            self.inner.put(key, v)
        }

        fn delete<K: AsRef<[u8]>>(&self, k: K) -> Result<(), DBInterfaceErr> {
            self.check()?;
            self.inner.delete(k)
        }

        fn prefix_iterator<'a, V: Decode + 'a>(
            &self,
            prefix: Vec<u8>,
            direction: IteratorDirection,
        ) -> Box<dyn StreamingIterator<Item = (Vec<u8>, V)> + 'a> {
            self.inner.prefix_iterator(prefix, direction)
        }

        fn write_batch(&self, batch: DBBatch) -> Result<(), DBInterfaceErr> {
            self.check()?;
            self.inner.write_batch(batch)
        }
    }

    fn genesis() -> Block {
        Block::new(Hash256::zero(), 0, AccumulatorCheckpoint::zero(), vec![])
    }

    fn new_state() -> (Stores<MemoryBackend>, ChainState<MemoryBackend>) {
        let stores = Stores::memory();
        let state =
            ChainState::new(stores.clone(), ChainConfig::new("regtest"), &genesis()).unwrap();
        (stores, state)
    }

    fn mine<B: DBInterface>(state: &ChainState<B>, txs: Vec<Transaction>) -> Block {
        let checkpoint = state.next_accumulator_checkpoint().unwrap();
        let height = state.height() + 1;
        let block = Block::new(state.tip_hash(), height as u32, checkpoint, txs);
        state.connect_block(&block).unwrap();
        block
    }

    fn mint_tx(height: u64, mints: &[PublicCoin]) -> Transaction {
        let mut tx = Transaction::new(
            vec![TxIn::new(OutPoint::new(Hash256([height as u8; 32]), 0))],
            mints.iter().map(TxOut::new_zerocoin_mint).collect(),
        );
        tx.compute_hash();
        tx
    }

    /// Transaction paying `count` anon outputs owned by the caller
    fn anon_funding(rng: &mut StdRng, count: usize, value: Money) -> (Transaction, Vec<OwnedAnonOutput>) {
        let mut owned = vec![];
        let mut outs = vec![];

        for _ in 0..count {
            let secret = random_scalar(rng);
            let blind = random_scalar(rng);
            outs.push(TxOut::RingCt {
                pk: public_key(&secret).compress().to_bytes(),
                commitment: commit(value as u64, &blind).compress().to_bytes(),
                range_proof: prove_range(rng, value as u64, &blind),
            });
            owned.push(OwnedAnonOutput {
                secret,
                blind,
                value,
            });
        }

        let mut tx = Transaction::new(
            vec![TxIn::new(OutPoint::new(Hash256([0xaa; 32]), 0))],
            outs,
        );
        tx.compute_hash();
        (tx, owned)
    }

    fn spend(
        rng: &mut StdRng,
        state: &ChainState<MemoryBackend>,
        coin: &OwnedAnonOutput,
    ) -> Result<Transaction, AnonBuildErr> {
        let blacklist = HashSet::new();
        let ctx = state.decoy_context(&blacklist).unwrap();
        let builder = AnonTxBuilder::new(ctx, 3, 32)?;
        let to = public_key(&random_scalar(rng)).compress().to_bytes();
        let change = public_key(&random_scalar(rng)).compress().to_bytes();
        builder.build(
            rng,
            std::slice::from_ref(coin),
            vec![TempRecipient::ringct(3 * COIN, to)],
            1000,
            Some(change),
        )
    }

    #[test]
    #[serial]
    fn it_connects_and_disconnects_mints() {
        let (_, state) = new_state();
        let params = state.config().zerocoin_params().clone();
        let early = random_coin(&params, CoinDenomination::Ten);
        let late = random_coin(&params, CoinDenomination::OneHundred);

        for h in 1..=45 {
            let txs = match h {
                3 => vec![mint_tx(h, &[early.clone()])],
                22 => vec![mint_tx(h, &[late.clone()])],
                _ => vec![],
            };
            mine(&state, txs);
        }

        assert_eq!(state.height(), 45);
        {
            let chain = state.lock_chain();
            assert!(chain.at(19).unwrap().accumulator_checkpoint.is_zero());
            assert!(!chain.at(20).unwrap().accumulator_checkpoint.is_zero());
            assert_ne!(
                chain.at(30).unwrap().accumulator_checkpoint,
                chain.at(40).unwrap().accumulator_checkpoint
            );
            assert_eq!(chain.at(3).unwrap().mint_count(CoinDenomination::Ten), 1);
        }
        assert!(state.checksums().db().read_coin_mint(early.value()).unwrap().is_some());
        assert!(state.checksums().db().read_coin_mint(late.value()).unwrap().is_some());

        while state.height() > 2 {
            state.disconnect_tip().unwrap();
        }

        assert!(state.checksums().db().read_coin_mint(early.value()).unwrap().is_none());
        assert!(state.checksums().db().read_coin_mint(late.value()).unwrap().is_none());
        state.disconnect_tip().unwrap();
        assert_eq!(state.height(), 1);
        state.disconnect_tip().unwrap();
        assert!(matches!(
            state.disconnect_tip(),
            Err(ChainStateErr::DisconnectGenesis)
        ));

        // The chain can be extended again after the rollback
        for h in 1..=21 {
            let txs = if h == 3 {
                vec![mint_tx(h, &[early.clone()])]
            } else {
                vec![]
            };
            mine(&state, txs);
        }
        assert_eq!(state.height(), 21);
    }

    #[test]
    #[serial]
    fn it_rejects_bad_blocks() {
        let (_, state) = new_state();
        let params = state.config().zerocoin_params().clone();
        for h in 1..=19 {
            let txs = if h == 5 {
                vec![mint_tx(h, &[random_coin(&params, CoinDenomination::Ten)])]
            } else {
                vec![]
            };
            mine(&state, txs);
        }

        // Checkpoint must move at 20
        let block = Block::new(state.tip_hash(), 20, AccumulatorCheckpoint::zero(), vec![]);
        let err = state.connect_block(&block).unwrap_err();
        assert_eq!(err.reason(), "bad-accumulator-checkpoint");

        let orphan = Block::new(Hash256([1; 32]), 20, AccumulatorCheckpoint::zero(), vec![]);
        assert!(matches!(
            state.connect_block(&orphan),
            Err(ChainStateErr::NotExtendingTip(_))
        ));

        mine(&state, vec![]);

        // Checkpoint must not move at 21
        let block = Block::new(
            state.tip_hash(),
            21,
            AccumulatorCheckpoint::zero(),
            vec![],
        );
        let err = state.connect_block(&block).unwrap_err();
        assert_eq!(err.reason(), "bad-accumulator-checkpoint-change");
        assert_eq!(state.height(), 20);
    }

    #[test]
    #[serial]
    fn it_connects_anon_spends() {
        let mut rng = StdRng::seed_from_u64(7);
        let (_, state) = new_state();
        let (funding, owned) = anon_funding(&mut rng, 20, 10 * COIN);
        mine(&state, vec![funding]);
        for _ in 0..12 {
            mine(&state, vec![]);
        }
        assert_eq!(state.rct().last_index().unwrap(), 20);

        let spend_a = spend(&mut rng, &state, &owned[4]).unwrap();
        let spend_b = spend(&mut rng, &state, &owned[4]).unwrap();
        let ki = tx_key_images(&spend_a).unwrap()[0];
        assert_eq!(tx_key_images(&spend_b).unwrap()[0], ki);

        state.accept_to_mempool(spend_a.clone()).unwrap();
        let err = state.accept_to_mempool(spend_b.clone()).unwrap_err();
        assert_eq!(err.reason(), "txn-mempool-conflict");

        // Both spends in one block
        let checkpoint = state.next_accumulator_checkpoint().unwrap();
        let block = Block::new(
            state.tip_hash(),
            14,
            checkpoint,
            vec![spend_a.clone(), spend_b.clone()],
        );
        assert!(matches!(
            state.connect_block(&block),
            Err(ChainStateErr::DuplicateKeyImage(_))
        ));

        mine(&state, vec![spend_a.clone()]);
        assert!(state.mempool.read().is_empty());
        assert_eq!(state.rct().read_key_image(&ki).unwrap(), Some(spend_a.txid()));
        assert_eq!(state.rct().last_index().unwrap(), 22);

        let err = state.accept_to_mempool(spend_b).unwrap_err();
        assert_eq!(err.reason(), "bad-anonin-dup-keyimage");
        assert!(matches!(
            spend(&mut rng, &state, &owned[4]),
            Err(AnonBuildErr::KeyImageSpent(_))
        ));

        state.disconnect_tip().unwrap();
        assert!(state.rct().read_key_image(&ki).unwrap().is_none());
        assert_eq!(state.rct().last_index().unwrap(), 20);
        assert!(state.mempool.read().contains(&spend_a.txid()));
    }

    #[test]
    #[serial]
    fn it_replays_stored_blocks() {
        let mut rng = StdRng::seed_from_u64(8);
        let (stores, state) = new_state();
        let params = state.config().zerocoin_params().clone();
        let (funding, _) = anon_funding(&mut rng, 5, COIN);
        mine(&state, vec![funding]);

        for h in 2..=31 {
            let txs = if h % 7 == 0 {
                vec![mint_tx(h, &[random_coin(&params, CoinDenomination::Ten)])]
            } else {
                vec![]
            };
            mine(&state, txs);
        }

        let tip = state.tip_hash();
        let checkpoint = state.lock_chain().tip().accumulator_checkpoint;
        drop(state);

        let reopened = ChainState::open(stores, ChainConfig::new("regtest"), &genesis()).unwrap();
        assert_eq!(reopened.height(), 31);
        assert_eq!(reopened.tip_hash(), tip);
        assert_eq!(reopened.lock_chain().tip().accumulator_checkpoint, checkpoint);
        assert_eq!(reopened.rct().last_index().unwrap(), 5);
    }

    #[test]
    #[serial]
    fn it_rejects_outputs_hiding_negative_amounts() {
        let mut rng = StdRng::seed_from_u64(10);
        let (_, state) = new_state();
        let (funding, owned) = anon_funding(&mut rng, 3, 10 * COIN);
        mine(&state, vec![funding]);

        let forged = inflating_spend(
            &mut rng,
            state.rct(),
            &owned[1].secret,
            &owned[1].blind,
            10 * COIN,
        );
        assert!(verify_mlsag(&forged, state.rct()).is_ok());

        let err = state.accept_to_mempool(forged.clone()).unwrap_err();
        assert_eq!(err.reason(), "bad-rangeproof");
        assert!(state.mempool.read().is_empty());

        let checkpoint = state.next_accumulator_checkpoint().unwrap();
        let block = Block::new(state.tip_hash(), 2, checkpoint, vec![forged]);
        let err = state.connect_block(&block).unwrap_err();
        assert_eq!(err.reason(), "bad-rangeproof");
        assert_eq!(state.height(), 1);
        assert_eq!(state.rct().last_index().unwrap(), 3);
    }

    fn coinbase(outs: Vec<TxOut>) -> Transaction {
        let mut tx = Transaction::new(vec![TxIn::new(OutPoint::null())], outs);
        tx.compute_hash();
        tx
    }

    fn blinded_reward(rng: &mut StdRng, value: Money, blind: &Scalar) -> TxOut {
        TxOut::Confidential {
            commitment: commit(value as u64, blind).compress().to_bytes(),
            script: vec![0x76],
            range_proof: prove_range(rng, value as u64, blind),
        }
    }

    #[test]
    #[serial]
    fn it_checks_blinded_coinbase_rewards() {
        let mut rng = StdRng::seed_from_u64(11);
        let (_, state) = new_state();
        let reward = state.config().coinbase_reward;
        let b = random_scalar(&mut rng);

        let first = blinded_reward(&mut rng, reward - 20 * COIN, &b);
        let second = blinded_reward(&mut rng, 20 * COIN, &(Scalar::ZERO - b));
        mine(&state, vec![coinbase(vec![first, second])]);

        let plain = TxOut::Standard {
            value: 10 * COIN,
            script: vec![0x76],
        };
        let blinded = blinded_reward(&mut rng, reward - 10 * COIN, &Scalar::ZERO);
        mine(&state, vec![coinbase(vec![plain, blinded])]);
        assert_eq!(state.height(), 2);

        let greedy = blinded_reward(&mut rng, reward + 1, &Scalar::ZERO);
        let checkpoint = state.next_accumulator_checkpoint().unwrap();
        let block = Block::new(state.tip_hash(), 3, checkpoint, vec![coinbase(vec![greedy])]);
        let err = state.connect_block(&block).unwrap_err();
        assert_eq!(err.reason(), "verify-commit-tally-failed");

        let unproven = TxOut::Confidential {
            commitment: commit(reward as u64, &Scalar::ZERO).compress().to_bytes(),
            script: vec![0x76],
            range_proof: vec![],
        };
        let checkpoint = state.next_accumulator_checkpoint().unwrap();
        let block = Block::new(state.tip_hash(), 3, checkpoint, vec![coinbase(vec![unproven])]);
        let err = state.connect_block(&block).unwrap_err();
        assert_eq!(err.reason(), "bad-rangeproof");
        assert_eq!(state.height(), 2);
    }

    #[test]
    #[serial]
    fn it_keeps_stores_unchanged_when_a_write_fails() {
        let mut rng = StdRng::seed_from_u64(12);
        let stores = Stores {
            zerocoin: FlakyBackend::default(),
            ringct: FlakyBackend::default(),
            blocks: FlakyBackend::default(),
            precompute: FlakyBackend::default(),
        };
        let state =
            ChainState::new(stores.clone(), ChainConfig::new("regtest"), &genesis()).unwrap();
        let params = state.config().zerocoin_params().clone();
        let coin = random_coin(&params, CoinDenomination::Ten);
        let (funding, owned) = anon_funding(&mut rng, 3, COIN);
        let pk = owned[0].pubkey();

        let checkpoint = state.next_accumulator_checkpoint().unwrap();
        let block = Block::new(
            state.tip_hash(),
            1,
            checkpoint,
            vec![funding, mint_tx(1, &[coin.clone()])],
        );
        let hash = *block.hash().unwrap();

        // The height record is the last write, failing it must undo the rest
        stores.blocks.fail_writes(true);
        assert!(matches!(
            state.connect_block(&block),
            Err(ChainStateErr::DB(_))
        ));
        assert_eq!(state.height(), 0);
        assert_eq!(state.rct().last_index().unwrap(), 0);
        assert!(state.rct().read_anon_output_link(&pk).unwrap().is_none());
        assert!(state.checksums().db().read_coin_mint(coin.value()).unwrap().is_none());
        assert!(stores.blocks.read_block(&hash).unwrap().is_none());
        assert!(stores.blocks.get::<_, Hash256>(height_key(1)).unwrap().is_none());

        stores.blocks.fail_writes(false);
        state.connect_block(&block).unwrap();
        assert_eq!(state.rct().last_index().unwrap(), 3);

        // The RingCT rollback goes through before the mint erase fails
        stores.zerocoin.fail_writes(true);
        assert!(state.disconnect_tip().is_err());
        assert_eq!(state.height(), 1);
        assert_eq!(state.rct().last_index().unwrap(), 3);
        assert_eq!(state.rct().read_anon_output_link(&pk).unwrap(), Some(1));
        assert!(state.checksums().db().read_coin_mint(coin.value()).unwrap().is_some());
        assert_eq!(
            stores.blocks.get::<_, Hash256>(height_key(1)).unwrap(),
            Some(hash)
        );

        stores.zerocoin.fail_writes(false);
        state.disconnect_tip().unwrap();
        assert_eq!(state.height(), 0);
        assert_eq!(state.rct().last_index().unwrap(), 0);
        assert!(state.checksums().db().read_coin_mint(coin.value()).unwrap().is_none());
    }
}
