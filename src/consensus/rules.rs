// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use static_assertions::*;

/// Money type
pub type Money = i64;

/// Satoshis per coin
pub const COIN: Money = 100_000_000;

/// No amount larger than this is valid
pub const MAX_MONEY: Money = 300_000_000 * COIN;

/// Accumulator checkpoints only change on heights that are a multiple of `n`
pub const CHECKPOINT_INTERVAL: u64 = 10;

/// Checkpoints are never recomputed below this height
pub const CHECKPOINT_MIN_HEIGHT: u64 = CHECKPOINT_INTERVAL * 2;

/// Number of 32-bit checksum slots in a packed accumulator checkpoint
pub const CHECKPOINT_SLOTS: usize = 8;

/// Witness security level meaning "fold in all available history"
pub const SECURITY_LEVEL_ALL: u32 = 100;

/// Upper bound of the random jitter added to a requested security level
pub const SECURITY_LEVEL_JITTER: u32 = 10;

/// How many times the witness builder tries to take the validation lock
pub const WITNESS_LOCK_ATTEMPTS: u32 = 100;

/// Milliseconds slept between two validation lock attempts
pub const WITNESS_LOCK_SLEEP_MS: u64 = 50;

/// Miller-Rabin rounds used when checking a coin commitment for primality
pub const ZEROCOIN_MINT_PRIME_ROUNDS: usize = 20;

/// Key pair candidates tried before a deterministic mint gives up
pub const MINT_KEYPAIR_MAX_ATTEMPTS: u32 = 1_000;

/// Randomness perturbations tried before a deterministic mint gives up
pub const MINT_PRIME_MAX_ATTEMPTS: u32 = 100_000;

/// Minimum ring size of an anon input
pub const MIN_RINGSIZE: usize = 3;

/// Maximum ring size of an anon input
pub const MAX_RINGSIZE: usize = 32;

/// Maximum number of real outputs signed by a single anon input
pub const MAX_ANON_INPUTS: usize = 32;

/// Anon inputs pay `n` times the standard fee rate
pub const ANON_FEE_MULTIPLIER: Money = 2;

/// Maximum tries to pick a single decoy
pub const MAX_DECOY_TRIES: usize = 1_000;

/// `prevout.n` of an input spending anon outputs
pub const ANON_MARKER: u32 = 0xffff_ffa0;

/// Data output type tag carrying the transaction fee of a CT transaction
pub const DO_FEE: u8 = 6;

/// Script opcode marking a zerocoin mint output
pub const OP_ZEROCOINMINT: u8 = 0xc1;

/// Size of a compressed point, key image or commitment
pub const POINT_SIZE: usize = 32;

/// Size of a key image
pub const KEY_IMAGE_SIZE: usize = POINT_SIZE;

/// Size of a Pedersen commitment
pub const COMMITMENT_SIZE: usize = POINT_SIZE;

/// Money range check
pub fn money_range(amount: Money) -> bool {
    (0..=MAX_MONEY).contains(&amount)
}

/// Returns true if a new accumulator checkpoint may be computed at `height`
pub fn is_checkpoint_height(height: u64) -> bool {
    height % CHECKPOINT_INTERVAL == 0 && height != CHECKPOINT_INTERVAL
}

/// First checkpoint height strictly above `height`
pub fn next_checkpoint_height(height: u64) -> u64 {
    height + (CHECKPOINT_INTERVAL - (height % CHECKPOINT_INTERVAL))
}

/// Checkpoint height at or below `height`
pub fn prev_checkpoint_height(height: u64) -> u64 {
    height - (height % CHECKPOINT_INTERVAL)
}

/// Size in bytes of the MLSAG signature of an anon input
pub fn mlsag_sig_size(n_inputs: usize, ring_size: usize, split_commitments: bool) -> usize {
    (1 + (n_inputs + 1) * ring_size) * POINT_SIZE
        + if split_commitments { COMMITMENT_SIZE } else { 0 }
}

const_assert!(COIN > 0);
const_assert!(MAX_MONEY > COIN);
const_assert!(CHECKPOINT_INTERVAL > 1);
const_assert_eq!(CHECKPOINT_MIN_HEIGHT, 2 * CHECKPOINT_INTERVAL);
const_assert_eq!(CHECKPOINT_SLOTS * 32, 256);
const_assert!(SECURITY_LEVEL_JITTER < SECURITY_LEVEL_ALL);
const_assert!(MIN_RINGSIZE >= 3);
const_assert!(MIN_RINGSIZE <= MAX_RINGSIZE);
const_assert!(MAX_ANON_INPUTS > 0);
const_assert!(ZEROCOIN_MINT_PRIME_ROUNDS >= 10);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_checks_money_range() {
        assert!(!money_range(-1));
        assert!(money_range(0));
        assert!(money_range(MAX_MONEY));
        assert!(!money_range(MAX_MONEY + 1));
    }

    #[test]
    fn it_detects_checkpoint_heights() {
        assert!(!is_checkpoint_height(9));
        assert!(!is_checkpoint_height(10));
        assert!(is_checkpoint_height(20));
        assert!(!is_checkpoint_height(21));
        assert!(is_checkpoint_height(1_050_010));
    }

    #[test]
    fn it_maps_heights_to_checkpoint_windows() {
        assert_eq!(next_checkpoint_height(35), 40);
        assert_eq!(next_checkpoint_height(40), 50);
        assert_eq!(prev_checkpoint_height(35), 30);
        assert_eq!(prev_checkpoint_height(40), 40);
    }

    #[test]
    fn it_computes_mlsag_sig_size() {
        assert_eq!(mlsag_sig_size(1, 11, false), (1 + 2 * 11) * 32);
        assert_eq!(mlsag_sig_size(2, 3, true), (1 + 3 * 3) * 32 + 32);
    }
}
