// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::ZEROCOIN_MINT_PRIME_ROUNDS;
use crate::primitives::{BigNum, CoinDenomination, PublicCoin};
use crate::zerocoin::{is_probable_prime, ZerocoinParams};
use triomphe::Arc;

/// 32-bit fingerprint of an accumulator value, as packed in checkpoints.
#[must_use]
pub fn get_checksum(value: &BigNum) -> u32 {
    value.hash().low_u32()
}

impl PublicCoin {
    /// A coin may enter an accumulator if it has a valid denomination, lies
    /// within the coin value range and is prime.
    #[must_use]
    pub fn validate(&self, params: &ZerocoinParams) -> bool {
        self.denomination().is_valid()
            && params.coin_value_in_range(self.value())
            && is_probable_prime(self.value(), ZEROCOIN_MINT_PRIME_ROUNDS)
    }
}

/// RSA accumulator of a single denomination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    params: Arc<ZerocoinParams>,
    denomination: CoinDenomination,
    value: BigNum,
}

impl Accumulator {
    /// Creates an empty accumulator, i.e. one holding the accumulator base
    #[must_use]
    pub fn new(params: Arc<ZerocoinParams>, denomination: CoinDenomination) -> Self {
        let value = params.accumulator_base.clone();
        Self {
            params,
            denomination,
            value,
        }
    }

    #[must_use]
    pub fn with_value(
        params: Arc<ZerocoinParams>,
        denomination: CoinDenomination,
        value: BigNum,
    ) -> Self {
        Self {
            params,
            denomination,
            value,
        }
    }

    #[must_use]
    pub fn value(&self) -> &BigNum {
        &self.value
    }

    pub fn set_value(&mut self, value: BigNum) {
        self.value = value;
    }

    #[must_use]
    pub fn denomination(&self) -> CoinDenomination {
        self.denomination
    }

    #[must_use]
    pub fn params(&self) -> &Arc<ZerocoinParams> {
        &self.params
    }

    #[must_use]
    pub fn checksum(&self) -> u32 {
        get_checksum(&self.value)
    }

    /// Raw update `value = value ^ coin mod N`. Used when replaying history
    /// that has already been validated.
    pub fn increment(&mut self, coin_value: &BigNum) {
        self.value = self
            .value
            .pow_mod(coin_value, &self.params.accumulator_modulus);
    }

    /// Validates the coin then adds it to the accumulator.
    pub fn accumulate(&mut self, coin: &PublicCoin) -> Result<(), AccumulatorErr> {
        if coin.denomination() != self.denomination {
            return Err(AccumulatorErr::WrongDenomination);
        }

        if !coin.validate(&self.params) {
            return Err(AccumulatorErr::InvalidCoin);
        }

        self.increment(coin.value());
        Ok(())
    }
}

/// Membership witness of a single coin. Holds the accumulation of every
/// other coin so that `witness ^ coin == accumulator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorWitness {
    witness: Accumulator,
    element: PublicCoin,
}

impl AccumulatorWitness {
    #[must_use]
    pub fn new(checkpoint: &Accumulator, element: PublicCoin) -> Self {
        Self {
            witness: checkpoint.clone(),
            element,
        }
    }

    /// Folds in another coin. The witnessed coin itself is skipped.
    pub fn add_element(&mut self, coin: &PublicCoin) -> Result<(), AccumulatorErr> {
        if *coin == self.element {
            return Ok(());
        }

        self.witness.accumulate(coin)
    }

    /// Raw variant of [`AccumulatorWitness::add_element`]
    pub fn add_raw_value(&mut self, value: &BigNum) {
        if value == self.element.value() {
            return;
        }

        self.witness.increment(value);
    }

    pub fn reset_value(&mut self, checkpoint: &Accumulator, element: PublicCoin) {
        self.witness = checkpoint.clone();
        self.element = element;
    }

    #[must_use]
    pub fn value(&self) -> &BigNum {
        self.witness.value()
    }

    #[must_use]
    pub fn element(&self) -> &PublicCoin {
        &self.element
    }

    /// Returns true if the witness proves `coin` is a member of `accumulator`
    #[must_use]
    pub fn verify(&self, accumulator: &Accumulator, coin: &PublicCoin) -> bool {
        if *coin != self.element || accumulator.denomination() != coin.denomination() {
            return false;
        }

        let mut temp = self.witness.clone();
        temp.increment(coin.value());
        temp.value() == accumulator.value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorErr {
    /// Coin denomination does not match the accumulator
    WrongDenomination,

    /// Coin value is out of range or not prime
    InvalidCoin,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::zerocoin::is_probable_prime;
    use rand::prelude::*;

    /// Random prime coin value inside the regtest coin range
    pub(crate) fn random_coin(params: &ZerocoinParams, denom: CoinDenomination) -> PublicCoin {
        let mut rng = rand::thread_rng();
        let mut buf = [0u8; 24];
        rng.fill_bytes(&mut buf);
        let mut candidate = BigNum(BigNum::from_le_bytes(&buf).0 + &params.min_coin_value.0);
        if !candidate.0.bit(0) {
            candidate = BigNum(candidate.0 + ibig::UBig::from(1_u8));
        }

        while !is_probable_prime(&candidate, 20) {
            candidate = BigNum(candidate.0 + ibig::UBig::from(2_u8));
        }

        PublicCoin::new(denom, candidate)
    }

    #[test]
    fn it_accumulates_valid_coins() {
        let params = ZerocoinParams::for_network("regtest");
        let mut acc = Accumulator::new(params.clone(), CoinDenomination::Ten);
        let coin = random_coin(&params, CoinDenomination::Ten);
        acc.accumulate(&coin).unwrap();
        assert_eq!(
            acc.value(),
            &params
                .accumulator_base
                .pow_mod(coin.value(), &params.accumulator_modulus)
        );
    }

    #[test]
    fn it_rejects_wrong_denomination() {
        let params = ZerocoinParams::for_network("regtest");
        let mut acc = Accumulator::new(params.clone(), CoinDenomination::Ten);
        let coin = random_coin(&params, CoinDenomination::OneHundred);
        assert_eq!(acc.accumulate(&coin), Err(AccumulatorErr::WrongDenomination));
    }

    #[test]
    fn it_rejects_invalid_coins() {
        let params = ZerocoinParams::for_network("regtest");
        let mut acc = Accumulator::new(params.clone(), CoinDenomination::Ten);

        // Too small
        let small = PublicCoin::new(CoinDenomination::Ten, BigNum::from_u64(7));
        assert_eq!(acc.accumulate(&small), Err(AccumulatorErr::InvalidCoin));

        // Composite
        let prime = random_coin(&params, CoinDenomination::Ten);
        let composite = PublicCoin::new(
            CoinDenomination::Ten,
            BigNum(prime.value().0.clone() * ibig::UBig::from(3_u8)),
        );
        assert_eq!(acc.accumulate(&composite), Err(AccumulatorErr::InvalidCoin));
        assert_eq!(acc.value(), &params.accumulator_base);
    }

    #[test]
    fn it_verifies_witness() {
        let params = ZerocoinParams::for_network("regtest");
        let denom = CoinDenomination::OneHundred;
        let start = Accumulator::new(params.clone(), denom);
        let mut acc = start.clone();
        let coin = random_coin(&params, denom);
        let mut witness = AccumulatorWitness::new(&start, coin.clone());

        let decoys: Vec<_> = (0..5).map(|_| random_coin(&params, denom)).collect();
        acc.accumulate(&coin).unwrap();
        for decoy in &decoys {
            acc.accumulate(decoy).unwrap();
            witness.add_element(decoy).unwrap();
        }

        // Adding the witnessed coin is a no-op
        witness.add_element(&coin).unwrap();
        assert!(witness.verify(&acc, &coin));

        // Tampering with a decoy breaks the witness
        let mut tampered = AccumulatorWitness::new(&start, coin.clone());
        for (i, decoy) in decoys.iter().enumerate() {
            if i == 2 {
                tampered.add_element(&random_coin(&params, denom)).unwrap();
            } else {
                tampered.add_element(decoy).unwrap();
            }
        }
        assert!(!tampered.verify(&acc, &coin));

        // Wrong coin
        let other = random_coin(&params, denom);
        assert!(!witness.verify(&acc, &other));
    }

    #[test]
    fn it_resets_witness() {
        let params = ZerocoinParams::for_network("regtest");
        let denom = CoinDenomination::Ten;
        let coin = random_coin(&params, denom);
        let mut acc = Accumulator::new(params.clone(), denom);
        let mut witness = AccumulatorWitness::new(&acc, coin.clone());
        witness.add_raw_value(random_coin(&params, denom).value());

        acc.increment(coin.value());
        assert!(!witness.verify(&acc, &coin));

        witness.reset_value(&Accumulator::new(params, denom), coin.clone());
        assert!(witness.verify(&acc, &coin));
    }
}
