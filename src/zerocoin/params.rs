// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::primitives::BigNum;
use lazy_static::*;
use triomphe::Arc;

/// RSA-2048 challenge number
const MAINNET_ACCUMULATOR_MODULUS: &str = "c7970ceedcc3b0754490201a7aa613cd73911081c790f5f1a8726f463550bb5b7ff0db8e1ea1189ec72f93d1650011bd721aeeacc2acde32a04107f0648c2813a31f5b0b7765ff8b44b4b6ffc93384b646eb09c7cf5e8592d40ea33c80039f35b4f14a04b51f7bfd781be4d1673164ba8eb991c2c4d730bbbe35f592bdef524af7e8daefd26c66fc02c479af89d64d373f442709439de66ceb955f3ea37d5159f6135809f85334b5cb1813addc80cd05609f10ac6a95ad65872c909525bdad32bc729592642920f24c61dc5b3c3b7923e56b16a4d9d373d8721f24a3fc0f1b3131f55615172866bccc30f95054c824e733a5eb6817f7bc16399d48c6361cc7e5";
const MAINNET_P: &str = "efe1d2a15c83827c3ed3f0019dca7d9bca0f8e81327e123b57117e12b04441d94963c654cc21b3433c2781f5a566607a7bc508da80a9a95f0dc7447d1e685156e189182faf5d2015ca56a1e615a80af46c07679e0eed8683107f70b0d7e85389305880bd54251d2f73e18f27e7cd52b06cea3436cbbad46827c7693465a0da25";
const MAINNET_Q: &str = "8842bbc861908c7a4fdf942a180435e58e3ed7db7a86599409123b04220cebbb";
const MAINNET_G: &str = "e24353bab19e76a64828b52b5bbe9be57a4268fa14bbba71ac9fbb0820d44ca4a849332ae80bfa9cea6dc4bc527f445a57b680927f6efc7d060232670c488e1bbf58b9e62f9945e46af6462777d4c58f19ffcc80b40c43c0c1f8bd2cad75944512a4454bc2b31497ac5286c974c034137d469ed77867a0e876dd0f0b897324df";
const MAINNET_H: &str = "ca30f56f80eb881c755014760240539b8d2fce15765c30824c6565aa14524b7c84871f1d83f0f085144cf5c39aa4e8337a9b3485def108aac63565ebe0d94700949ce5f73499e0dbac7e400beedf5d80d57654cf95cb841fbf1f1c27c4eb862b886fb2911480f8de82accc8c576a57670735236898dd01a4172a2f855b20df3e";

/// Small group used by regtest so tests run in reasonable time. Not secure.
const REGTEST_ACCUMULATOR_MODULUS: &str =
    "b133736d5c7b0f8bfef5178b2f07532fa17f7cdc4133dbb393dbcb36714ac129";
const REGTEST_P: &str = "894d0519e451d3b1a250880c547d54ed494c7795947e98fac1f019ecbe25fcab";
const REGTEST_Q: &str = "a2fa40770fdd574288adc66c6662674d";
const REGTEST_G: &str = "72db0f5e7990c982820dc14e602e636928513d4453d6989cabcc62a3487f5237";
const REGTEST_H: &str = "19db0a27dc4e9cef55efbbc33cdff96d948d22b7a8d692aed4737d823db0ec6c";

/// Accumulator base shared by every network
pub const ACCUMULATOR_BASE: u64 = 961;

lazy_static! {
    pub static ref MAINNET_PARAMS: Arc<ZerocoinParams> = Arc::new(
        ZerocoinParams::from_hex(
            MAINNET_ACCUMULATOR_MODULUS,
            MAINNET_P,
            MAINNET_Q,
            MAINNET_G,
            MAINNET_H
        )
        .unwrap_or_default()
    );
    pub static ref REGTEST_PARAMS: Arc<ZerocoinParams> = Arc::new(
        ZerocoinParams::from_hex(
            REGTEST_ACCUMULATOR_MODULUS,
            REGTEST_P,
            REGTEST_Q,
            REGTEST_G,
            REGTEST_H
        )
        .unwrap_or_default()
    );
}

/// Prime order subgroup of `Z_p*` in which coin commitments live.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntegerGroupParams {
    /// `p`
    pub modulus: BigNum,

    /// `q`, divides `p - 1`
    pub group_order: BigNum,

    /// Generator of the serial number
    pub g: BigNum,

    /// Generator of the randomness
    pub h: BigNum,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ZerocoinParams {
    pub accumulator_modulus: BigNum,
    pub accumulator_base: BigNum,
    pub coin_commitment_group: IntegerGroupParams,

    /// Smallest coin value accepted into an accumulator
    pub min_coin_value: BigNum,

    /// Largest coin value accepted into an accumulator
    pub max_coin_value: BigNum,
}

impl ZerocoinParams {
    pub fn from_hex(
        accumulator_modulus: &str,
        p: &str,
        q: &str,
        g: &str,
        h: &str,
    ) -> Result<Self, &'static str> {
        let group = IntegerGroupParams {
            modulus: BigNum::from_hex(p)?,
            group_order: BigNum::from_hex(q)?,
            g: BigNum::from_hex(g)?,
            h: BigNum::from_hex(h)?,
        };

        Ok(Self::new(BigNum::from_hex(accumulator_modulus)?, group))
    }

    #[must_use]
    pub fn new(accumulator_modulus: BigNum, group: IntegerGroupParams) -> Self {
        let min_coin_value = BigNum::pow2(group.group_order.bit_len() / 2 + 3);
        let max_coin_value = group.modulus.clone();

        Self {
            accumulator_modulus,
            accumulator_base: BigNum::from_u64(ACCUMULATOR_BASE),
            coin_commitment_group: group,
            min_coin_value,
            max_coin_value,
        }
    }

    /// Parameters of the given network. Testnet shares the mainnet group.
    #[must_use]
    pub fn for_network(network_name: &str) -> Arc<Self> {
        match network_name {
            "regtest" => REGTEST_PARAMS.clone(),
            _ => MAINNET_PARAMS.clone(),
        }
    }

    /// Returns true if `value` is in the accepted coin value range
    #[must_use]
    pub fn coin_value_in_range(&self, value: &BigNum) -> bool {
        *value >= self.min_coin_value && *value <= self.max_coin_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_derives_coin_value_bounds() {
        let regtest = ZerocoinParams::for_network("regtest");
        assert_eq!(regtest.min_coin_value, BigNum::pow2(128 / 2 + 3));
        assert_eq!(regtest.max_coin_value, regtest.coin_commitment_group.modulus);

        let mainnet = ZerocoinParams::for_network("mainnet");
        assert_eq!(mainnet.min_coin_value, BigNum::pow2(256 / 2 + 3));
        assert_eq!(mainnet.accumulator_modulus.bit_len(), 2048);
        assert_eq!(mainnet.accumulator_base, BigNum::from_u64(961));
    }

    #[test]
    fn it_parses_group_parameters() {
        let regtest = ZerocoinParams::for_network("regtest");
        let group = &regtest.coin_commitment_group;
        assert_eq!(group.modulus.bit_len(), 256);
        assert_eq!(group.group_order.bit_len(), 128);

        // g and h generate the order q subgroup
        assert_eq!(group.g.pow_mod(&group.group_order, &group.modulus), BigNum::one());
        assert_eq!(group.h.pow_mod(&group.group_order, &group.modulus), BigNum::one());
    }

    #[test]
    fn it_checks_coin_range() {
        let params = ZerocoinParams::for_network("regtest");
        assert!(!params.coin_value_in_range(&BigNum::from_u64(7)));
        assert!(params.coin_value_in_range(&params.min_coin_value));
        assert!(params.coin_value_in_range(&params.max_coin_value));
    }
}
