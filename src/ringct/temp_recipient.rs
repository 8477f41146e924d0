// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::{Money, POINT_SIZE};
use crate::primitives::TxOut;
use crate::ringct::{commit, prove_range};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientType {
    Standard,
    Ct,
    RingCt,
    Data,
}

/// Output of a transaction under construction
#[derive(Debug, Clone, PartialEq)]
pub struct TempRecipient {
    pub kind: RecipientType,
    pub amount: Money,

    /// Destination script of standard and CT outputs
    pub script: Vec<u8>,

    /// One-time key of RingCT outputs
    pub pk: [u8; POINT_SIZE],

    /// Payload of data outputs
    pub data: Vec<u8>,

    /// Blinding factor, assigned while building
    pub blind: Scalar,

    pub is_change: bool,
}

impl TempRecipient {
    fn new(kind: RecipientType, amount: Money) -> Self {
        Self {
            kind,
            amount,
            script: vec![],
            pk: [0; POINT_SIZE],
            data: vec![],
            blind: Scalar::ZERO,
            is_change: false,
        }
    }

    #[must_use]
    pub fn standard(amount: Money, script: Vec<u8>) -> Self {
        Self {
            script,
            ..Self::new(RecipientType::Standard, amount)
        }
    }

    #[must_use]
    pub fn ct(amount: Money, script: Vec<u8>) -> Self {
        Self {
            script,
            ..Self::new(RecipientType::Ct, amount)
        }
    }

    #[must_use]
    pub fn ringct(amount: Money, pk: [u8; POINT_SIZE]) -> Self {
        Self {
            pk,
            ..Self::new(RecipientType::RingCt, amount)
        }
    }

    #[must_use]
    pub fn data(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::new(RecipientType::Data, 0)
        }
    }

    /// Change output paying to the one-time key `pk`
    #[must_use]
    pub fn change(amount: Money, pk: [u8; POINT_SIZE]) -> Self {
        Self {
            is_change: true,
            ..Self::ringct(amount, pk)
        }
    }

    /// Returns true if the amount is hidden behind a commitment
    #[must_use]
    pub fn is_blinded(&self) -> bool {
        matches!(self.kind, RecipientType::Ct | RecipientType::RingCt)
    }

    /// Builds the output. Blinded amounts must fit in a `u64` and get a
    /// range proof over the current blinding factor.
    pub fn to_txout<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Option<TxOut> {
        let out = match self.kind {
            RecipientType::Standard => TxOut::Standard {
                value: self.amount,
                script: self.script.clone(),
            },
            RecipientType::Data => TxOut::Data {
                data: self.data.clone(),
            },
            RecipientType::Ct => TxOut::Confidential {
                commitment: self.commitment()?,
                script: self.script.clone(),
                range_proof: prove_range(rng, self.value()?, &self.blind),
            },
            RecipientType::RingCt => TxOut::RingCt {
                pk: self.pk,
                commitment: self.commitment()?,
                range_proof: prove_range(rng, self.value()?, &self.blind),
            },
        };

        Some(out)
    }

    fn value(&self) -> Option<u64> {
        u64::try_from(self.amount).ok()
    }

    fn commitment(&self) -> Option<[u8; POINT_SIZE]> {
        Some(commit(self.value()?, &self.blind).compress().to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ringct::verify_range_proof;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn it_builds_outputs() {
        let mut rng = StdRng::seed_from_u64(5);
        let out = TempRecipient::standard(5, vec![1]).to_txout(&mut rng).unwrap();
        assert_eq!(out.value(), Some(5));

        let mut r = TempRecipient::ringct(7, [2; 32]);
        r.blind = Scalar::from(3_u64);
        let out = r.to_txout(&mut rng).unwrap();
        let c = commit(7, &Scalar::from(3_u64));
        assert_eq!(out.commitment(), Some(&c.compress().to_bytes()));
        match out {
            TxOut::RingCt { range_proof, .. } => {
                assert!(verify_range_proof(&c, &range_proof).is_ok());
            }
            _ => panic!("expected a RingCT output"),
        }
        assert!(r.is_blinded());
        assert!(!TempRecipient::data(vec![9]).is_blinded());
        assert!(TempRecipient::ct(-1, vec![]).to_txout(&mut rng).is_none());
        assert!(TempRecipient::change(1, [0; 32]).is_change);
    }
}
