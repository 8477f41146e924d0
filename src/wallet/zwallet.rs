// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::primitives::{sha256d, CoinDenomination, Hash256};
use crate::settings::SETTINGS;
use crate::zerocoin::{
    generate_mint, get_zerocoin_seed, seed_to_zerocoin, DeterministicMint, MintDeriveErr,
    MintEntropy, ZerocoinParams,
};
use bincode::{Decode, Encode};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use triomphe::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterSeed([u8; 32]);

/// Deterministic zerocoin wallet. Mint `n` is derived from the master seed
/// and `n`, the pool holds the mints expected to show up next on chain.
pub struct ZWallet {
    seed: Option<MasterSeed>,
    seed_id: Hash256,

    /// Counter of the next mint to generate
    count: u32,

    /// `pubcoin hash -> count` of the mints ahead of the counter
    pool: HashMap<Hash256, u32>,
    pool_size: u32,
    params: Arc<ZerocoinParams>,
}

/// Persisted state of a [`ZWallet`]. Never holds the seed.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct ZWalletState {
    pub seed_id: Hash256,
    pub count: u32,
    pub pool: Vec<(Hash256, u32)>,
}

impl ZWallet {
    /// Wallet for `master_seed`. The pool size comes from
    /// `zerocoin.mint_pool_size`.
    #[must_use]
    pub fn new(master_seed: [u8; 32], params: Arc<ZerocoinParams>) -> Self {
        Self {
            seed_id: Hash256(sha256d(&master_seed)),
            seed: Some(MasterSeed(master_seed)),
            count: 0,
            pool: HashMap::new(),
            pool_size: u32::from(SETTINGS.zerocoin.mint_pool_size),
            params,
        }
    }

    /// Restores a locked wallet from its persisted state
    #[must_use]
    pub fn from_state(state: ZWalletState, params: Arc<ZerocoinParams>) -> Self {
        Self {
            seed: None,
            seed_id: state.seed_id,
            count: state.count,
            pool: state.pool.into_iter().collect(),
            pool_size: u32::from(SETTINGS.zerocoin.mint_pool_size),
            params,
        }
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn state(&self) -> ZWalletState {
        let mut pool: Vec<(Hash256, u32)> = self.pool.iter().map(|(h, c)| (*h, *c)).collect();
        pool.sort_by_key(|(_, c)| *c);

        ZWalletState {
            seed_id: self.seed_id,
            count: self.count,
            pool,
        }
    }

    pub fn dump(&self, path: &Path) -> Result<(), ZWalletErr> {
        let bytes = crate::codec::encode_to_vec(&self.state()).map_err(|_| ZWalletErr::Encode)?;
        fs::write(path, bytes).map_err(|_| ZWalletErr::Io)
    }

    pub fn load(path: &Path, params: Arc<ZerocoinParams>) -> Result<Self, ZWalletErr> {
        let bytes = fs::read(path).map_err(|_| ZWalletErr::Io)?;
        let state: ZWalletState = crate::codec::decode(&bytes).map_err(|_| ZWalletErr::Corrupt)?;
        Ok(Self::from_state(state, params))
    }

    /// Drops the master seed from memory
    pub fn lock(&mut self) {
        self.seed = None;
    }

    /// Loads the master seed back. Fails if it is not the seed of this wallet.
    pub fn unlock(&mut self, master_seed: [u8; 32]) -> Result<(), ZWalletErr> {
        let seed = MasterSeed(master_seed);
        if Hash256(sha256d(&seed.0)) != self.seed_id {
            return Err(ZWalletErr::WrongSeed);
        }

        self.seed = Some(seed);
        Ok(())
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.seed.is_none()
    }

    #[must_use]
    pub fn seed_id(&self) -> &Hash256 {
        &self.seed_id
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Seed of mint number `count`
    pub fn get_zerocoin_seed(&self, count: u32) -> Result<Zeroizing<[u8; 64]>, MintDeriveErr> {
        let seed = self.master_seed()?;
        Ok(get_zerocoin_seed(&seed, count))
    }

    /// Derives the next mint and advances the counter
    pub fn generate_deterministic_mint(
        &mut self,
        denomination: CoinDenomination,
    ) -> Result<DeterministicMint, MintDeriveErr> {
        let mint = generate_mint(&*self, self.count, denomination, &self.params)?;
        self.pool.remove(&mint.pubcoin_hash());
        self.update_count();

        log::debug!(
            "Generated deterministic mint {} with count {}",
            mint.pubcoin_hash().to_hex(),
            mint.count
        );
        Ok(mint)
    }

    /// Fills the pool with the next `pool_size` mints after the counter.
    /// Returns the number of mints added.
    pub fn generate_mint_pool(&mut self) -> Result<usize, MintDeriveErr> {
        let master_seed = self.master_seed()?;
        let known: Vec<u32> = self.pool.values().copied().collect();
        let mut added = 0;

        for count in self.count..self.count.saturating_add(self.pool_size) {
            if known.contains(&count) {
                continue;
            }

            let seed = get_zerocoin_seed(&master_seed, count);
            let (value, _, _, _) = seed_to_zerocoin(&seed, &self.params)?;
            self.pool.insert(value.hash(), count);
            added += 1;
        }

        if added > 0 {
            log::info!(
                "Generated {} mints in pool, counter at {}",
                added,
                self.count
            );
        }
        Ok(added)
    }

    /// Count of a pooled mint
    #[must_use]
    pub fn pool_count(&self, pubcoin_hash: &Hash256) -> Option<u32> {
        self.pool.get(pubcoin_hash).copied()
    }

    #[must_use]
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Marks a pooled mint as found on chain. Mints below it are dropped from
    /// the pool and the counter moves past it.
    pub fn set_mint_seen(&mut self, pubcoin_hash: &Hash256) -> Option<u32> {
        let count = self.pool.remove(pubcoin_hash)?;
        self.pool.retain(|_, c| *c > count);

        if count >= self.count {
            self.count = count + 1;
        }

        Some(count)
    }

    pub fn update_count(&mut self) {
        self.count += 1;
        let count = self.count;
        self.pool.retain(|_, c| *c >= count);
    }
}

impl MintEntropy for ZWallet {
    fn master_seed(&self) -> Result<Zeroizing<[u8; 32]>, MintDeriveErr> {
        match &self.seed {
            Some(seed) => Ok(Zeroizing::new(seed.0)),
            None if self.seed_id == Hash256::zero() => Err(MintDeriveErr::SeedMissing),
            None => Err(MintDeriveErr::WalletLocked),
        }
    }
}

impl fmt::Debug for ZWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZWallet")
            .field("seed_id", &self.seed_id.to_hex())
            .field("locked", &self.is_locked())
            .field("count", &self.count)
            .field("pool", &self.pool.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZWalletErr {
    /// Seed does not match the wallet seed id
    WrongSeed,

    /// Wallet file could not be read or written
    Io,

    /// Wallet file does not decode
    Corrupt,

    /// Wallet state could not be encoded
    Encode,
}

impl fmt::Display for ZWalletErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongSeed => write!(f, "seed does not belong to this wallet"),
            Self::Io => write!(f, "unable to access wallet file"),
            Self::Corrupt => write!(f, "corrupt wallet"),
            Self::Encode => write!(f, "unable to encode wallet"),
        }
    }
}
