// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::{Money, COIN};
use bincode::{Decode, Encode};
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Zerocoin denominations. The declaration order is the order of the
/// checksum slots in an accumulator checkpoint and is consensus critical.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Encode,
    Decode,
    Serialize,
    Deserialize,
    FromPrimitive,
    ToPrimitive,
)]
#[repr(u32)]
pub enum CoinDenomination {
    Error = 0,
    Ten = 10,
    OneHundred = 100,
    OneThousand = 1000,
    TenThousand = 10000,
}

/// Every valid denomination in checkpoint order
pub const ZEROCOIN_DENOMINATIONS: [CoinDenomination; 4] = [
    CoinDenomination::Ten,
    CoinDenomination::OneHundred,
    CoinDenomination::OneThousand,
    CoinDenomination::TenThousand,
];

impl CoinDenomination {
    /// Face value in whole coins
    #[must_use]
    pub fn value(self) -> u32 {
        self as u32
    }

    /// Face value in satoshis
    #[must_use]
    pub fn amount(self) -> Money {
        Money::from(self.value()) * COIN
    }

    /// Maps a whole coin value to a denomination
    #[must_use]
    pub fn from_value(v: u32) -> Self {
        num_traits::FromPrimitive::from_u32(v).unwrap_or(Self::Error)
    }

    /// Maps a satoshi amount to a denomination. Amounts that are not an exact
    /// face value map to [`CoinDenomination::Error`].
    #[must_use]
    pub fn from_amount(amount: Money) -> Self {
        if amount <= 0 || amount % COIN != 0 {
            return Self::Error;
        }

        match u32::try_from(amount / COIN) {
            Ok(v) => Self::from_value(v),
            Err(_) => Self::Error,
        }
    }

    /// Position of the denomination in checkpoint order
    #[must_use]
    pub fn position(self) -> Option<usize> {
        ZEROCOIN_DENOMINATIONS.iter().position(|d| *d == self)
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self != Self::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_maps_amounts() {
        assert_eq!(CoinDenomination::from_amount(10 * COIN), CoinDenomination::Ten);
        assert_eq!(
            CoinDenomination::from_amount(10_000 * COIN),
            CoinDenomination::TenThousand
        );
        assert_eq!(CoinDenomination::from_amount(5 * COIN), CoinDenomination::Error);
        assert_eq!(CoinDenomination::from_amount(10 * COIN + 1), CoinDenomination::Error);
        assert_eq!(CoinDenomination::from_amount(-10 * COIN), CoinDenomination::Error);
    }

    #[test]
    fn it_has_stable_positions() {
        assert_eq!(CoinDenomination::Ten.position(), Some(0));
        assert_eq!(CoinDenomination::TenThousand.position(), Some(3));
        assert_eq!(CoinDenomination::Error.position(), None);
    }

    #[test]
    fn it_maps_values() {
        assert_eq!(CoinDenomination::from_value(100), CoinDenomination::OneHundred);
        assert_eq!(CoinDenomination::from_value(7), CoinDenomination::Error);
        assert_eq!(CoinDenomination::OneThousand.amount(), 1000 * COIN);
    }
}
