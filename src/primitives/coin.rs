// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::primitives::{BigNum, CoinDenomination, Hash256};
use bincode::{Decode, Encode};

/// Public half of a zerocoin mint, as found in a mint output.
#[derive(Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub struct PublicCoin {
    denomination: CoinDenomination,
    value: BigNum,
}

impl PublicCoin {
    #[must_use]
    pub fn new(denomination: CoinDenomination, value: BigNum) -> Self {
        Self {
            denomination,
            value,
        }
    }

    #[must_use]
    pub fn denomination(&self) -> CoinDenomination {
        self.denomination
    }

    #[must_use]
    pub fn value(&self) -> &BigNum {
        &self.value
    }

    /// Key of the coin in the mint index
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        self.value.hash()
    }
}
