// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::DBInterface;
use crate::primitives::{
    AccumulatorCheckpoint, BigNum, CoinDenomination, PublicCoin, ZEROCOIN_DENOMINATIONS,
};
use crate::zerocoin::{
    Accumulator, AccumulatorErr, ChecksumStore, ChecksumStoreErr, ZerocoinParams,
};
use static_assertions::const_assert_eq;
use std::collections::HashMap;
use triomphe::Arc;

// Checkpoints pack one 32-bit checksum per denomination in the low half
const_assert_eq!(ZEROCOIN_DENOMINATIONS.len(), 4);

/// One accumulator per denomination
#[derive(Debug, Clone)]
pub struct AccumulatorMap {
    params: Arc<ZerocoinParams>,
    accumulators: Vec<Accumulator>,
}

impl AccumulatorMap {
    #[must_use]
    pub fn new(params: Arc<ZerocoinParams>) -> Self {
        let accumulators = ZEROCOIN_DENOMINATIONS
            .iter()
            .map(|d| Accumulator::new(params.clone(), *d))
            .collect();

        Self {
            params,
            accumulators,
        }
    }

    /// Resets every accumulator to the accumulator base
    pub fn reset(&mut self) {
        *self = Self::new(self.params.clone());
    }

    /// Resets every accumulator under new parameters
    pub fn reset_with(&mut self, params: Arc<ZerocoinParams>) {
        *self = Self::new(params);
    }

    /// Loads the values referenced by a header checkpoint. Zero slots keep
    /// the accumulator base. Fails if any other checksum is unknown.
    pub fn load<B: DBInterface>(
        &mut self,
        checkpoint: &AccumulatorCheckpoint,
        store: &ChecksumStore<B>,
    ) -> Result<(), ChecksumStoreErr> {
        for (denom, checksum) in checkpoint.checksums() {
            if checksum == 0 {
                continue;
            }

            let value = store.get_value(checksum, false)?.ok_or_else(|| {
                log::error!("Cannot find checksum {:08x}", checksum);
                ChecksumStoreErr::MissingChecksum(checksum)
            })?;

            self.set_value(denom, value);
        }

        Ok(())
    }

    /// Loads directly supplied values, e.g. a hard coded checkpoint
    pub fn load_values(&mut self, values: &HashMap<CoinDenomination, BigNum>) {
        for (denom, value) in values {
            self.set_value(*denom, value.clone());
        }
    }

    /// Adds a coin to the accumulator of its denomination. With
    /// `skip_validation` the coin is folded in without range or primality
    /// checks.
    pub fn accumulate(
        &mut self,
        coin: &PublicCoin,
        skip_validation: bool,
    ) -> Result<(), AccumulatorErr> {
        let pos = coin
            .denomination()
            .position()
            .ok_or(AccumulatorErr::WrongDenomination)?;

        if skip_validation {
            self.accumulators[pos].increment(coin.value());
            return Ok(());
        }

        self.accumulators[pos].accumulate(coin)
    }

    /// Current value of the accumulator of `denom`. Zero for the error
    /// denomination.
    #[must_use]
    pub fn get_value(&self, denom: CoinDenomination) -> BigNum {
        match denom.position() {
            Some(pos) => self.accumulators[pos].value().clone(),
            None => BigNum::zero(),
        }
    }

    #[must_use]
    pub fn get_accumulator(&self, denom: CoinDenomination) -> Accumulator {
        Accumulator::with_value(self.params.clone(), denom, self.get_value(denom))
    }

    /// Packs the checksum of every accumulator, in denomination order
    #[must_use]
    pub fn get_checkpoint(&self) -> AccumulatorCheckpoint {
        let checksums: Vec<u32> = self.accumulators.iter().map(Accumulator::checksum).collect();
        AccumulatorCheckpoint::from_checksums(&checksums)
    }

    #[must_use]
    pub fn params(&self) -> &Arc<ZerocoinParams> {
        &self.params
    }

    fn set_value(&mut self, denom: CoinDenomination, value: BigNum) {
        if let Some(pos) = denom.position() {
            self.accumulators[pos].set_value(value);
        }
    }
}
