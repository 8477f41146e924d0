// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Deterministic mints. Every mint of a wallet is a pure function of the
//! wallet master seed and a counter, so mints can be recovered from the seed
//! alone by regenerating the pool and scanning the chain.

use crate::consensus::{
    MINT_KEYPAIR_MAX_ATTEMPTS, MINT_PRIME_MAX_ATTEMPTS, ZEROCOIN_MINT_PRIME_ROUNDS,
};
use crate::primitives::{sha256d, sha512d, BigNum, CoinDenomination, Hash256, PublicCoin};
use crate::zerocoin::{is_probable_prime, ZerocoinParams};
use ibig::UBig;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use std::fmt;
use zeroize::Zeroizing;

/// Serials are shifted right by this many bits before being marked
const SERIAL_BITSHIFT: usize = 4;

/// Top nibble marking a deterministic serial
const SERIAL_MARK: u8 = 0xf;

/// Largest accepted top byte of a shifted serial
const SERIAL_MAX_TOP_BYTE: u8 = 12;

/// Source of the master seed mints are derived from
pub trait MintEntropy {
    /// Returns the 256-bit master seed. Fails if the seed is locked or was
    /// never set.
    fn master_seed(&self) -> Result<Zeroizing<[u8; 32]>, MintDeriveErr>;
}

/// Secret and public parts of a mint derived from a seed
#[derive(Clone, PartialEq, Eq)]
pub struct DeterministicMint {
    pub count: u32,
    pub denomination: CoinDenomination,
    pub serial: BigNum,
    pub randomness: BigNum,
    pub private_key: SecretKey,
    pub value: BigNum,
}

impl DeterministicMint {
    #[must_use]
    pub fn public_coin(&self) -> PublicCoin {
        PublicCoin::new(self.denomination, self.value.clone())
    }

    /// Key of the mint in the spent serial index
    #[must_use]
    pub fn serial_hash(&self) -> Hash256 {
        self.serial.hash()
    }

    #[must_use]
    pub fn pubcoin_hash(&self) -> Hash256 {
        self.value.hash()
    }
}

impl fmt::Debug for DeterministicMint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeterministicMint")
            .field("count", &self.count)
            .field("denomination", &self.denomination)
            .field("pubcoin_hash", &self.pubcoin_hash())
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}

/// Seed of the mint number `count`
#[must_use]
pub fn get_zerocoin_seed(master_seed: &[u8; 32], count: u32) -> Zeroizing<[u8; 64]> {
    let mut buf = Zeroizing::new(Vec::with_capacity(36));
    buf.extend_from_slice(master_seed);
    buf.extend_from_slice(&count.to_le_bytes());
    Zeroizing::new(sha512d(&buf))
}

/// Derives the mint number `count` of the wallet
pub fn generate_mint<E: MintEntropy>(
    entropy: &E,
    count: u32,
    denomination: CoinDenomination,
    params: &ZerocoinParams,
) -> Result<DeterministicMint, MintDeriveErr> {
    let master_seed = entropy.master_seed()?;
    let seed = get_zerocoin_seed(&master_seed, count);
    let (value, serial, randomness, private_key) = seed_to_zerocoin(&seed, params)?;

    Ok(DeterministicMint {
        count,
        denomination,
        serial,
        randomness,
        private_key,
        value,
    })
}

/// Returns true if `value` can be accumulated
#[must_use]
pub fn is_valid_coin_value(params: &ZerocoinParams, value: &BigNum) -> bool {
    params.coin_value_in_range(value) && is_probable_prime(value, ZEROCOIN_MINT_PRIME_ROUNDS)
}

/// Turns a 512-bit mint seed into `(value, serial, randomness, key)`.
///
/// The low half of the seed drives the key pair and serial, the high half
/// drives the commitment randomness.
pub fn seed_to_zerocoin(
    seed: &[u8; 64],
    params: &ZerocoinParams,
) -> Result<(BigNum, BigNum, BigNum, SecretKey), MintDeriveErr> {
    let group = &params.coin_commitment_group;

    let mut key_seed = Zeroizing::new([0; 32]);
    key_seed.copy_from_slice(&seed[..32]);

    let mut key_pair = None;
    for _ in 0..MINT_KEYPAIR_MAX_ATTEMPTS {
        *key_seed = sha256d(&*key_seed);
        key_pair = generate_key_pair(&key_seed);
        if key_pair.is_some() {
            break;
        }
    }

    let (private_key, serial) = key_pair.ok_or_else(|| {
        log::error!("Failed to derive a valid key pair for a mint");
        MintDeriveErr::KeyPairExhausted
    })?;

    let randomness_seed = &seed[32..];
    let mut randomness =
        BigNum::from_le_bytes(&sha256d(randomness_seed)).modulo(&group.group_order);
    let mut commitment = group
        .g
        .pow_mod(&serial, &group.modulus)
        .mul_mod(&group.h.pow_mod(&randomness, &group.modulus), &group.modulus);

    // Perturb the randomness until the commitment is a prime in range
    let mut preimage = Vec::with_capacity(64);
    for attempt in 1..=MINT_PRIME_MAX_ATTEMPTS {
        if is_valid_coin_value(params, &commitment) {
            return Ok((commitment, serial, randomness, private_key));
        }

        let mut attempt_bytes = [0; 32];
        attempt_bytes[..4].copy_from_slice(&attempt.to_le_bytes());

        preimage.clear();
        preimage.extend_from_slice(randomness_seed);
        preimage.extend_from_slice(&attempt_bytes);

        let random = BigNum::from_le_bytes(&sha256d(&preimage));
        randomness = randomness.add_mod(&random, &group.group_order);
        commitment = commitment.mul_mod(&group.h.pow_mod(&random, &group.modulus), &group.modulus);
    }

    log::error!(
        "No valid commitment found after {} attempts",
        MINT_PRIME_MAX_ATTEMPTS
    );
    Err(MintDeriveErr::CommitmentExhausted)
}

/// Builds a secp256k1 key pair from `seed` and derives the serial from the
/// hash of its public key. Returns `None` for seeds that are not valid keys
/// or whose serial falls out of range.
fn generate_key_pair(seed: &[u8; 32]) -> Option<(SecretKey, BigNum)> {
    let secp = Secp256k1::signing_only();
    let private_key = SecretKey::from_slice(seed).ok()?;
    let public_key = PublicKey::from_secret_key(&secp, &private_key);

    let hash = UBig::from_le_bytes(&sha256d(&public_key.serialize())) >> SERIAL_BITSHIFT;
    if &hash >> 248 > UBig::from(SERIAL_MAX_TOP_BYTE) {
        return None;
    }

    let serial = hash | (UBig::from(SERIAL_MARK) << 252);
    Some((private_key, BigNum::from(serial)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintDeriveErr {
    /// The master seed was never set
    SeedMissing,

    /// The wallet is locked
    WalletLocked,

    /// No valid key pair was found
    KeyPairExhausted,

    /// No prime commitment in range was found
    CommitmentExhausted,
}

impl fmt::Display for MintDeriveErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeedMissing => write!(
                f,
                "trying to create new deterministic mint, but master seed is not loaded"
            ),
            Self::WalletLocked => write!(f, "wallet is locked"),
            Self::KeyPairExhausted => write!(f, "failed to derive mint key pair"),
            Self::CommitmentExhausted => write!(f, "failed to derive mint commitment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zerocoin::IntegerGroupParams;

    struct Seed(Option<[u8; 32]>);

    impl MintEntropy for Seed {
        fn master_seed(&self) -> Result<Zeroizing<[u8; 32]>, MintDeriveErr> {
            self.0.map(Zeroizing::new).ok_or(MintDeriveErr::SeedMissing)
        }
    }

    #[test]
    fn it_derives_valid_mints() {
        let params = ZerocoinParams::for_network("regtest");
        let seed = Seed(Some([7; 32]));
        let group = &params.coin_commitment_group;

        for count in 1..=4 {
            let mint = generate_mint(&seed, count, CoinDenomination::Ten, &params).unwrap();
            assert!(is_valid_coin_value(&params, &mint.value));
            assert!(mint.public_coin().validate(&params));
            assert!(mint.randomness < group.group_order);

            let commitment = group
                .g
                .pow_mod(&mint.serial, &group.modulus)
                .mul_mod(&group.h.pow_mod(&mint.randomness, &group.modulus), &group.modulus);
            assert_eq!(commitment, mint.value);
        }
    }

    #[test]
    fn it_is_deterministic() {
        let params = ZerocoinParams::for_network("regtest");
        let seed = Seed(Some([42; 32]));

        let a = generate_mint(&seed, 5, CoinDenomination::OneHundred, &params).unwrap();
        let b = generate_mint(&seed, 5, CoinDenomination::OneHundred, &params).unwrap();
        let c = generate_mint(&seed, 6, CoinDenomination::OneHundred, &params).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.serial, c.serial);
        assert_ne!(a.value, c.value);

        let other = generate_mint(&Seed(Some([43; 32])), 5, CoinDenomination::OneHundred, &params)
            .unwrap();
        assert_ne!(a.serial, other.serial);
    }

    #[test]
    fn it_marks_serials() {
        let params = ZerocoinParams::for_network("regtest");
        let seed = Seed(Some([1; 32]));

        for count in 0..3 {
            let mint = generate_mint(&seed, count, CoinDenomination::Ten, &params).unwrap();
            let serial = &mint.serial.0;
            assert_eq!(serial >> 252, UBig::from(SERIAL_MARK));

            let top_byte = (serial >> 248) & UBig::from(0x0f_u8);
            assert!(top_byte <= UBig::from(SERIAL_MAX_TOP_BYTE));
        }
    }

    #[test]
    fn it_separates_seed_counters() {
        let master = [9; 32];
        assert_ne!(*get_zerocoin_seed(&master, 0), *get_zerocoin_seed(&master, 1));
        assert_eq!(*get_zerocoin_seed(&master, 3), *get_zerocoin_seed(&master, 3));
    }

    #[test]
    fn it_requires_a_seed() {
        let params = ZerocoinParams::for_network("regtest");
        assert_eq!(
            generate_mint(&Seed(None), 1, CoinDenomination::Ten, &params).unwrap_err(),
            MintDeriveErr::SeedMissing
        );
    }

    #[test]
    fn it_gives_up_without_valid_commitments() {
        // Min coin value is above the group modulus, nothing is ever in range
        let group = IntegerGroupParams {
            modulus: BigNum::from_u64(23),
            group_order: BigNum::from_u64(11),
            g: BigNum::from_u64(2),
            h: BigNum::from_u64(3),
        };
        let params = ZerocoinParams::new(BigNum::from_u64(77), group);
        let seed = get_zerocoin_seed(&[3; 32], 0);

        assert_eq!(
            seed_to_zerocoin(&seed, &params).unwrap_err(),
            MintDeriveErr::CommitmentExhausted
        );
    }
}
