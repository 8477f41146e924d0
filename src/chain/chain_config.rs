// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::{Money, COIN};
use crate::primitives::{AccumulatorCheckpoint, Block, Hash256};
use crate::zerocoin::ZerocoinParams;
use std::collections::HashMap;
use triomphe::Arc;

/// Network consensus parameters
#[derive(Debug, Clone)]
pub struct ChainConfig {
    network_name: &'static str,
    zerocoin_params: Arc<ZerocoinParams>,
    genesis_time: u32,

    /// First height at which mints are accumulated
    pub zerocoin_start_height: u64,

    /// Minimum number of mints folded into a witness before a spend is allowed
    pub required_accumulation: u32,

    /// Confirmations after which a mint is guaranteed to be accumulated
    pub mint_required_confirmations: u64,

    /// Default witness security level
    pub default_security_level: u32,

    /// Minimum depth of an anon output before it can be used as a ring member
    pub min_rct_output_depth: i64,

    /// Width of the recent decoy selection window
    pub anon_recent_group: i64,

    /// Width of the older decoy selection window
    pub anon_old_group: i64,

    /// Extra depth required on top of `min_rct_output_depth` when picking decoys
    pub decoy_extra_depth: i64,

    /// Default ring size of anon spends
    pub default_ring_size: usize,

    /// Amount the blinded outputs of a coinbase commit to, on top of the
    /// fees of the anon spends in its block. Flat across heights.
    pub coinbase_reward: Money,

    /// Heights at which the canonical checkpoint sequence accumulated a
    /// 10 block span twice. Maps the height where the replay is triggered to
    /// the height the walk jumps back to. Each entry is applied once per walk.
    pub double_accumulation_exceptions: HashMap<u64, u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::new("testnet")
    }
}

impl ChainConfig {
    #[must_use]
    pub fn new(network_name: &'static str) -> Self {
        let mut double_accumulation_exceptions = HashMap::new();

        let (mint_required_confirmations, decoy_extra_depth, genesis_time) = match network_name {
            "mainnet" => {
                double_accumulation_exceptions.insert(1_050_010, 1_050_000);
                (20, 2, 1_540_413_000)
            }
            "regtest" => (10, -1, 1_296_688_602),
            _ => (10, 2, 1_541_050_000),
        };

        Self {
            network_name,
            zerocoin_params: ZerocoinParams::for_network(network_name),
            genesis_time,
            zerocoin_start_height: 0,
            required_accumulation: 1,
            mint_required_confirmations,
            default_security_level: 100,
            min_rct_output_depth: 12,
            anon_recent_group: 2400,
            anon_old_group: 24000,
            decoy_extra_depth,
            default_ring_size: 11,
            coinbase_reward: 50 * COIN,
            double_accumulation_exceptions,
        }
    }

    /// Config of the network selected in the settings, with the RingCT
    /// overrides applied.
    #[must_use]
    pub fn from_settings() -> Self {
        let settings = &crate::settings::SETTINGS;
        let network_name: &'static str = match settings.node.network_name.as_str() {
            "mainnet" => "mainnet",
            "regtest" => "regtest",
            _ => "testnet",
        };

        let mut config = Self::new(network_name);
        config.default_ring_size = settings.ringct.default_ring_size as usize;
        config.default_security_level = u32::from(settings.zerocoin.default_security_level);

        // Regtest always keeps its own decoy depth
        if network_name != "regtest" {
            config.decoy_extra_depth = i64::from(settings.ringct.decoy_extra_depth);
        }

        config
    }

    #[must_use]
    pub fn network_name(&self) -> &'static str {
        self.network_name
    }

    #[must_use]
    pub fn zerocoin_params(&self) -> &Arc<ZerocoinParams> {
        &self.zerocoin_params
    }

    /// Genesis block of the network. It carries no transactions and an empty
    /// accumulator checkpoint.
    #[must_use]
    pub fn genesis_block(&self) -> Block {
        Block::new(
            Hash256::zero(),
            self.genesis_time,
            AccumulatorCheckpoint::zero(),
            vec![],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_has_network_specific_parameters() {
        let mainnet = ChainConfig::new("mainnet");
        assert_eq!(mainnet.mint_required_confirmations, 20);
        assert_eq!(mainnet.decoy_extra_depth, 2);
        assert_eq!(
            mainnet.double_accumulation_exceptions.get(&1_050_010),
            Some(&1_050_000)
        );

        let regtest = ChainConfig::new("regtest");
        assert_eq!(regtest.mint_required_confirmations, 10);
        assert_eq!(regtest.decoy_extra_depth, -1);
        assert!(regtest.double_accumulation_exceptions.is_empty());
        assert_eq!(regtest.zerocoin_params().accumulator_modulus.bit_len(), 256);
    }
}
