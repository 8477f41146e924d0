// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::{
    money_range, Money, ANON_MARKER, COMMITMENT_SIZE, DO_FEE, OP_ZEROCOINMINT, POINT_SIZE,
};
use crate::primitives::{
    write_compact_size, BigNum, CoinDenomination, Hash256, HashWriter, PublicCoin,
};
use bincode::{Decode, Encode};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash, Encode, Decode, PartialOrd, Ord, Default)]
pub struct OutPoint {
    pub hash: Hash256,
    pub n: u32,
}

impl OutPoint {
    #[must_use]
    pub fn new(hash: Hash256, n: u32) -> Self {
        Self { hash, n }
    }

    #[must_use]
    pub fn null() -> Self {
        Self {
            hash: Hash256::zero(),
            n: u32::MAX,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.n == u32::MAX
    }

    #[must_use]
    pub fn is_anon_input(&self) -> bool {
        self.n == ANON_MARKER
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,

    /// Data stack. Key images of an anon input.
    pub script_data: Vec<Vec<u8>>,

    /// Witness stack. Ring member indices and the MLSAG of an anon input.
    /// Not part of the txid.
    pub script_witness: Vec<Vec<u8>>,
}

impl TxIn {
    #[must_use]
    pub fn new(prevout: OutPoint) -> Self {
        Self {
            prevout,
            script_sig: vec![],
            sequence: u32::MAX,
            script_data: vec![],
            script_witness: vec![],
        }
    }

    /// Creates an anon input signing `n_inputs` real outputs with rings of
    /// `ring_size` members.
    #[must_use]
    pub fn new_anon(n_inputs: u32, ring_size: u32) -> Self {
        let mut input = Self::new(OutPoint::new(Hash256::zero(), ANON_MARKER));
        input.set_anon_info(n_inputs, ring_size);
        input
    }

    #[must_use]
    pub fn is_anon_input(&self) -> bool {
        self.prevout.is_anon_input()
    }

    /// Number of real outputs and ring size packed into the prevout hash
    #[must_use]
    pub fn anon_info(&self) -> (u32, u32) {
        let bytes = self.prevout.hash.as_bytes();
        let mut n = [0; 4];
        let mut r = [0; 4];
        n.copy_from_slice(&bytes[0..4]);
        r.copy_from_slice(&bytes[4..8]);
        (u32::from_le_bytes(n), u32::from_le_bytes(r))
    }

    pub fn set_anon_info(&mut self, n_inputs: u32, ring_size: u32) {
        self.prevout.hash.0[0..4].copy_from_slice(&n_inputs.to_le_bytes());
        self.prevout.hash.0[4..8].copy_from_slice(&ring_size.to_le_bytes());
    }

    fn write_consensus(&self, writer: &mut HashWriter) {
        writer
            .write_bytes(self.prevout.hash.as_bytes())
            .write_u32(self.prevout.n)
            .write_var_bytes(&self.script_sig)
            .write_u32(self.sequence)
            .write_compact_size(self.script_data.len() as u64);

        for item in &self.script_data {
            writer.write_var_bytes(item);
        }
    }
}

/// Transaction output. The variant decides which fields exist.
#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode)]
pub enum TxOut {
    /// Plain value output. Zerocoin mints are plain outputs with a mint script.
    Standard { value: Money, script: Vec<u8> },

    /// Blinded value output with a plain destination
    Confidential {
        commitment: [u8; COMMITMENT_SIZE],
        script: Vec<u8>,
        range_proof: Vec<u8>,
    },

    /// One-time key output spendable by anon inputs
    RingCt {
        pk: [u8; POINT_SIZE],
        commitment: [u8; COMMITMENT_SIZE],
        range_proof: Vec<u8>,
    },

    /// Opaque data. `[DO_FEE, varint(fee)]` carries the fee of a CT transaction.
    Data { data: Vec<u8> },
}

impl TxOut {
    #[must_use]
    pub fn new_fee(fee: Money) -> Self {
        let mut buf = unsigned_varint::encode::u64_buffer();
        let fee = unsigned_varint::encode::u64(fee as u64, &mut buf);
        let mut data = Vec::with_capacity(1 + fee.len());
        data.push(DO_FEE);
        data.extend_from_slice(fee);
        TxOut::Data { data }
    }

    /// Mint output script: `OP_ZEROCOINMINT || compact_size(len) || vch`
    #[must_use]
    pub fn new_zerocoin_mint(coin: &PublicCoin) -> Self {
        let vch = coin.value().getvch();
        let mut script = Vec::with_capacity(vch.len() + 4);
        script.push(OP_ZEROCOINMINT);
        write_compact_size(&mut script, vch.len() as u64);
        script.extend_from_slice(&vch);

        TxOut::Standard {
            value: coin.denomination().amount(),
            script,
        }
    }

    #[must_use]
    pub fn type_byte(&self) -> u8 {
        match self {
            TxOut::Standard { .. } => 1,
            TxOut::Confidential { .. } => 2,
            TxOut::RingCt { .. } => 3,
            TxOut::Data { .. } => 4,
        }
    }

    #[must_use]
    pub fn is_standard(&self) -> bool {
        matches!(self, TxOut::Standard { .. })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, TxOut::Standard { value: 0, script } if script.is_empty())
    }

    #[must_use]
    pub fn value(&self) -> Option<Money> {
        match self {
            TxOut::Standard { value, .. } => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn commitment(&self) -> Option<&[u8; COMMITMENT_SIZE]> {
        match self {
            TxOut::Confidential { commitment, .. } | TxOut::RingCt { commitment, .. } => {
                Some(commitment)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn is_zerocoin_mint(&self) -> bool {
        match self {
            TxOut::Standard { script, .. } => script.first() == Some(&OP_ZEROCOINMINT),
            _ => false,
        }
    }

    /// Extracts the public coin of a mint output
    #[must_use]
    pub fn to_public_coin(&self) -> Option<PublicCoin> {
        let (value, script) = match self {
            TxOut::Standard { value, script } if self.is_zerocoin_mint() => (value, script),
            _ => return None,
        };

        let denomination = CoinDenomination::from_amount(*value);
        if !denomination.is_valid() {
            return None;
        }

        let (len, offset) = read_compact_size(&script[1..])?;
        let start = 1 + offset;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        if end != script.len() {
            return None;
        }

        Some(PublicCoin::new(
            denomination,
            BigNum::setvch(&script[start..end]),
        ))
    }

    /// Returns the fee carried by a fee data output
    #[must_use]
    pub fn ct_fee(&self) -> Option<Money> {
        match self {
            TxOut::Data { data } if data.first() == Some(&DO_FEE) => {
                let (fee, _) = unsigned_varint::decode::u64(&data[1..]).ok()?;
                Money::try_from(fee).ok()
            }
            _ => None,
        }
    }

    fn write_consensus(&self, writer: &mut HashWriter) {
        writer.write_u8(self.type_byte());
        match self {
            TxOut::Standard { value, script } => {
                writer.write_i64(*value).write_var_bytes(script);
            }
            TxOut::Confidential {
                commitment,
                script,
                range_proof,
            } => {
                writer
                    .write_bytes(commitment)
                    .write_var_bytes(script)
                    .write_var_bytes(range_proof);
            }
            TxOut::RingCt {
                pk,
                commitment,
                range_proof,
            } => {
                writer
                    .write_bytes(pk)
                    .write_bytes(commitment)
                    .write_var_bytes(range_proof);
            }
            TxOut::Data { data } => {
                writer.write_var_bytes(data);
            }
        }
    }
}

fn read_compact_size(bytes: &[u8]) -> Option<(u64, usize)> {
    let first = *bytes.first()?;
    match first {
        0..=252 => Some((u64::from(first), 1)),
        253 => {
            let b: [u8; 2] = bytes.get(1..3)?.try_into().ok()?;
            Some((u64::from(u16::from_le_bytes(b)), 3))
        }
        254 => {
            let b: [u8; 4] = bytes.get(1..5)?.try_into().ok()?;
            Some((u64::from(u32::from_le_bytes(b)), 5))
        }
        255 => {
            let b: [u8; 8] = bytes.get(1..9)?.try_into().ok()?;
            Some((u64::from_le_bytes(b), 9))
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Transaction {
    pub version: i32,
    pub ins: Vec<TxIn>,
    pub outs: Vec<TxOut>,
    pub lock_time: u32,
    pub hash: Option<Hash256>,
}

impl Transaction {
    #[must_use]
    pub fn new(ins: Vec<TxIn>, outs: Vec<TxOut>) -> Self {
        Self {
            version: 1,
            ins,
            outs,
            lock_time: 0,
            hash: None,
        }
    }

    /// Computes the txid. The witness stacks are not committed to.
    pub fn compute_hash(&mut self) {
        self.hash = Some(self.txid());
    }

    #[must_use]
    pub fn hash(&self) -> Option<&Hash256> {
        self.hash.as_ref()
    }

    /// Txid, computed on the fly if it is not cached
    #[must_use]
    pub fn txid(&self) -> Hash256 {
        if let Some(hash) = self.hash {
            return hash;
        }

        let mut writer = HashWriter::new();
        writer
            .write_i32(self.version)
            .write_compact_size(self.ins.len() as u64);

        for input in &self.ins {
            input.write_consensus(&mut writer);
        }

        writer.write_compact_size(self.outs.len() as u64);
        for output in &self.outs {
            output.write_consensus(&mut writer);
        }

        writer.write_u32(self.lock_time);
        writer.finalize()
    }

    /// Hash of all outputs. This is the message signed by the MLSAG of
    /// every anon input.
    #[must_use]
    pub fn outputs_hash(&self) -> Hash256 {
        let mut writer = HashWriter::new();
        for output in &self.outs {
            output.write_consensus(&mut writer);
        }
        writer.finalize()
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.ins.len() == 1 && self.ins[0].prevout.is_null()
    }

    #[must_use]
    pub fn is_coinstake(&self) -> bool {
        !self.ins.is_empty()
            && !self.is_coinbase()
            && self.outs.len() >= 2
            && self.outs[0].is_empty()
    }

    #[must_use]
    pub fn has_anon_inputs(&self) -> bool {
        self.ins.iter().any(TxIn::is_anon_input)
    }

    /// Anon spends must not mix anon and transparent inputs
    #[must_use]
    pub fn is_anon_spend(&self) -> bool {
        !self.ins.is_empty() && self.ins.iter().all(TxIn::is_anon_input)
    }

    #[must_use]
    pub fn is_zerocoin_mint(&self) -> bool {
        self.outs.iter().any(TxOut::is_zerocoin_mint)
    }

    /// Sum of all plain output values
    pub fn get_plain_value_out(&self) -> Result<Money, TxValueErr> {
        let mut total: Money = 0;

        for out in &self.outs {
            if let Some(value) = out.value() {
                if !money_range(value) {
                    return Err(TxValueErr::OutOfRange);
                }

                total = total.checked_add(value).ok_or(TxValueErr::Overflow)?;
                if !money_range(total) {
                    return Err(TxValueErr::OutOfRange);
                }
            }
        }

        Ok(total)
    }

    /// Fee carried by the fee data output, if any
    #[must_use]
    pub fn ct_fee(&self) -> Option<Money> {
        self.outs.iter().find_map(TxOut::ct_fee)
    }

    /// Public coins of every mint output
    #[must_use]
    pub fn mints(&self) -> Vec<PublicCoin> {
        self.outs.iter().filter_map(TxOut::to_public_coin).collect()
    }
}

impl Encode for Transaction {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> core::result::Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.version, encoder)?;
        bincode::Encode::encode(&self.ins, encoder)?;
        bincode::Encode::encode(&self.outs, encoder)?;
        bincode::Encode::encode(&self.lock_time, encoder)?;
        Ok(())
    }
}

impl Decode for Transaction {
    fn decode<D: bincode::de::Decoder>(
        decoder: &mut D,
    ) -> core::result::Result<Self, bincode::error::DecodeError> {
        let mut tx = Self {
            version: bincode::Decode::decode(decoder)?,
            ins: bincode::Decode::decode(decoder)?,
            outs: bincode::Decode::decode(decoder)?,
            lock_time: bincode::Decode::decode(decoder)?,
            hash: None,
        };
        tx.compute_hash();
        Ok(tx)
    }
}

bincode::impl_borrow_decode!(Transaction);

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TxValueErr {
    /// A value or the running total is outside the money range
    OutOfRange,

    /// The running total overflowed
    Overflow,
}
