// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Construction of anon spends.
//!
//! Owned outputs are split into signatures of at most `inputs_per_sig`
//! outputs. Each signature becomes one anon input whose ring hides its real
//! outputs among decoys from the output log. With more than one anon input,
//! every input commits to the value it spends in a split commitment and the
//! split commitments are balanced against the outputs.

use crate::chain::backend::{DBInterface, DBInterfaceErr};
use crate::consensus::{
    mlsag_sig_size, money_range, Money, KEY_IMAGE_SIZE, MAX_ANON_INPUTS, MAX_RINGSIZE,
    MIN_RINGSIZE,
};
use crate::primitives::{Hash256, Transaction, TxIn, TxOut};
use crate::ringct::{
    blind_sum, commit, commit_plain, decompress, generate_mlsag, get_key_image, pick_hiding_outputs,
    prepare_mlsag, public_key, random_scalar, verify_mlsag, verify_range_proofs, AnonVerifyErr,
    DecoyContext, DecoyErr, MlsagErr, TempRecipient,
};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, Rng, RngCore};
use std::collections::HashSet;
use std::fmt;
use zeroize::Zeroize;

/// Anon output owned by the wallet
#[derive(Clone)]
pub struct OwnedAnonOutput {
    /// One-time secret key
    pub secret: Scalar,

    /// Blinding factor of the commitment
    pub blind: Scalar,

    pub value: Money,
}

impl OwnedAnonOutput {
    #[must_use]
    pub fn pubkey(&self) -> [u8; 32] {
        public_key(&self.secret).compress().to_bytes()
    }
}

impl Drop for OwnedAnonOutput {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.blind.zeroize();
    }
}

impl fmt::Debug for OwnedAnonOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedAnonOutput")
            .field("pubkey", &hex::encode(self.pubkey()))
            .field("value", &self.value)
            .finish()
    }
}

/// Builds and signs anon spends
pub struct AnonTxBuilder<'a, B: DBInterface> {
    ctx: DecoyContext<'a, B>,
    ring_size: usize,
    inputs_per_sig: usize,
}

/// Ring layout of one anon input
struct SigPlan {
    /// Positions of the spent outputs in the owned list
    coins: Vec<usize>,

    /// `[row][col]` output indices
    mi: Vec<Vec<i64>>,
    secret_column: usize,
}

impl<'a, B: DBInterface> AnonTxBuilder<'a, B> {
    pub fn new(
        ctx: DecoyContext<'a, B>,
        ring_size: usize,
        inputs_per_sig: usize,
    ) -> Result<Self, AnonBuildErr> {
        if !(MIN_RINGSIZE..=MAX_RINGSIZE).contains(&ring_size) {
            return Err(AnonBuildErr::RingSizeOutOfRange);
        }

        if !(1..=MAX_ANON_INPUTS).contains(&inputs_per_sig) {
            return Err(AnonBuildErr::BadInputsPerSig);
        }

        Ok(Self {
            ctx,
            ring_size,
            inputs_per_sig,
        })
    }

    /// Builder using the ring size configured for the chain
    pub fn with_default_ring_size(
        ctx: DecoyContext<'a, B>,
        inputs_per_sig: usize,
    ) -> Result<Self, AnonBuildErr> {
        let ring_size = ctx.config.default_ring_size;
        Self::new(ctx, ring_size, inputs_per_sig)
    }

    /// Spends `coins` to `recipients` paying `fee`. Change goes to
    /// `change_pk`. The returned transaction passes `verify_range_proofs` and
    /// `verify_mlsag`.
    pub fn build<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        coins: &[OwnedAnonOutput],
        mut recipients: Vec<TempRecipient>,
        fee: Money,
        change_pk: Option<[u8; 32]>,
    ) -> Result<Transaction, AnonBuildErr> {
        if coins.is_empty() {
            return Err(AnonBuildErr::NoInputs);
        }

        if recipients.is_empty() {
            return Err(AnonBuildErr::NoRecipients);
        }

        let total_in = sum_amounts(coins.iter().map(|c| c.value))?;
        let total_out = sum_amounts(
            recipients
                .iter()
                .map(|r| r.amount)
                .chain(std::iter::once(fee)),
        )?;

        if total_in < total_out {
            return Err(AnonBuildErr::InsufficientFunds {
                have: total_in,
                need: total_out,
            });
        }

        let change = total_in - total_out;
        if change > 0 {
            let pk = change_pk.ok_or(AnonBuildErr::MissingChangeAddress)?;
            recipients.push(TempRecipient::change(change, pk));
        }

        self.set_blinds(rng, &mut recipients);

        let mut outs = Vec::with_capacity(recipients.len() + 1);
        outs.push(TxOut::new_fee(fee));
        for r in &recipients {
            outs.push(r.to_txout(rng).ok_or(AnonBuildErr::BadAmount)?);
        }

        let n_sigs = (coins.len() + self.inputs_per_sig - 1) / self.inputs_per_sig;
        if n_sigs > MAX_ANON_INPUTS {
            return Err(AnonBuildErr::TooManyInputs);
        }

        let mut plans = self.place_real_outputs(rng, coins)?;
        let ins = self.arrange_blinds(rng, &mut plans, coins)?;

        let mut tx = Transaction::new(ins, outs);
        self.sign(rng, &mut tx, &plans, coins, &recipients, fee)?;
        tx.compute_hash();

        verify_range_proofs(&tx)
            .and_then(|_| verify_mlsag(&tx, self.ctx.db))
            .map_err(|err| {
                log::error!("Built anon transaction fails verification: {}", err);
                AnonBuildErr::Verify(err)
            })?;

        log::debug!(
            "Built anon spend {} with {} inputs and {} outputs",
            tx.txid().to_hex(),
            tx.ins.len(),
            tx.outs.len()
        );

        Ok(tx)
    }

    /// Assigns random blinding factors to every blinded output
    fn set_blinds<R: RngCore + CryptoRng>(&self, rng: &mut R, recipients: &mut [TempRecipient]) {
        for r in recipients.iter_mut().filter(|r| r.is_blinded()) {
            r.blind = random_scalar(rng);
        }
    }

    /// Picks the secret column of every signature and puts the indices of
    /// the spent outputs into it
    fn place_real_outputs<R: Rng>(
        &self,
        rng: &mut R,
        coins: &[OwnedAnonOutput],
    ) -> Result<Vec<SigPlan>, AnonBuildErr> {
        let mut plans = vec![];
        let mut have = HashSet::new();

        let positions: Vec<usize> = (0..coins.len()).collect();
        for chunk in positions.chunks(self.inputs_per_sig) {
            let secret_column = rng.gen_range(0..self.ring_size);
            let mut mi = vec![vec![0; self.ring_size]; chunk.len()];

            for (k, &pos) in chunk.iter().enumerate() {
                let pk = coins[pos].pubkey();
                let index = self
                    .ctx
                    .db
                    .read_anon_output_link(&pk)?
                    .ok_or_else(|| AnonBuildErr::UnknownInput(hex::encode(pk)))?;

                if !have.insert(index) {
                    return Err(AnonBuildErr::DuplicateInput(index));
                }

                mi[k][secret_column] = index;
            }

            plans.push(SigPlan {
                coins: chunk.to_vec(),
                mi,
                secret_column,
            });
        }

        Ok(plans)
    }

    /// Fills the rings with decoys and lays out the input stacks with
    /// the real key images and placeholder signatures
    fn arrange_blinds<R: Rng>(
        &self,
        rng: &mut R,
        plans: &mut [SigPlan],
        coins: &[OwnedAnonOutput],
    ) -> Result<Vec<TxIn>, AnonBuildErr> {
        let split = plans.len() > 1;
        let mut have: HashSet<i64> = plans
            .iter()
            .flat_map(|p| p.mi.iter().map(move |row| row[p.secret_column]))
            .collect();

        let mut ins = Vec::with_capacity(plans.len());
        for plan in plans.iter_mut() {
            pick_hiding_outputs(
                rng,
                &self.ctx,
                &mut plan.mi,
                plan.secret_column,
                self.ring_size,
                &mut have,
            )?;

            let n_inputs = plan.coins.len();
            let mut txin = TxIn::new_anon(n_inputs as u32, self.ring_size as u32);

            let mut indices = vec![];
            let mut buf = unsigned_varint::encode::u64_buffer();
            for row in &plan.mi {
                for index in row {
                    indices.extend_from_slice(unsigned_varint::encode::u64(*index as u64, &mut buf));
                }
            }

            let mut key_images = Vec::with_capacity(n_inputs * KEY_IMAGE_SIZE);
            for &pos in &plan.coins {
                key_images.extend_from_slice(&self.get_key_image(&coins[pos])?);
            }

            txin.script_data = vec![key_images];
            txin.script_witness = vec![
                indices,
                vec![0; mlsag_sig_size(n_inputs, self.ring_size, split)],
            ];
            ins.push(txin);
        }

        Ok(ins)
    }

    /// Key image of an owned output. Fails if it was already spent.
    pub fn get_key_image(
        &self,
        coin: &OwnedAnonOutput,
    ) -> Result<[u8; KEY_IMAGE_SIZE], AnonBuildErr> {
        let pk = public_key(&coin.secret);
        let ki = get_key_image(&pk, &coin.secret);

        if let Some(txid) = self.ctx.db.read_key_image(&ki)? {
            log::warn!(
                "Output {} was already spent in {}",
                hex::encode(pk.compress().as_bytes()),
                txid.to_hex()
            );
            return Err(AnonBuildErr::KeyImageSpent(txid));
        }

        Ok(ki)
    }

    fn sign<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        tx: &mut Transaction,
        plans: &[SigPlan],
        coins: &[OwnedAnonOutput],
        recipients: &[TempRecipient],
        fee: Money,
    ) -> Result<(), AnonBuildErr> {
        let msg = tx.outputs_hash().0;
        let split = plans.len() > 1;

        let plain_value = sum_amounts(
            recipients
                .iter()
                .filter(|r| !r.is_blinded())
                .map(|r| r.amount)
                .chain(std::iter::once(fee)),
        )?;

        let out_blinds: Vec<Scalar> = recipients
            .iter()
            .filter(|r| r.is_blinded())
            .map(|r| r.blind)
            .collect();

        let mut out_commits = vec![];
        if plain_value > 0 {
            out_commits.push(commit_plain(plain_value).ok_or(AnonBuildErr::BadAmount)?);
        }
        for out in &tx.outs {
            if let Some(c) = out.commitment() {
                out_commits.push(decompress(c).ok_or(AnonBuildErr::BadAmount)?);
            }
        }

        // The last split blind balances the blinds of the outputs
        let mut split_blinds: Vec<Scalar> = vec![];
        if split {
            for _ in 0..plans.len() - 1 {
                split_blinds.push(random_scalar(rng));
            }
            split_blinds.push(blind_sum(&out_blinds, &split_blinds));
        }

        for (l, plan) in plans.iter().enumerate() {
            let n_cols = self.ring_size;
            let n_rows = plan.coins.len() + 1;

            let mut m = vec![RistrettoPoint::identity(); n_cols * n_rows];
            let mut in_commits = Vec::with_capacity(n_cols * plan.coins.len());
            for (k, row) in plan.mi.iter().enumerate() {
                for (i, index) in row.iter().enumerate() {
                    let ao = self
                        .ctx
                        .db
                        .read_anon_output(*index)?
                        .ok_or(AnonBuildErr::BadRingMember(*index))?;
                    m[i + k * n_cols] =
                        decompress(&ao.pubkey).ok_or(AnonBuildErr::BadRingMember(*index))?;
                    in_commits.push(
                        decompress(&ao.commitment).ok_or(AnonBuildErr::BadRingMember(*index))?,
                    );
                }
            }

            let in_blinds: Vec<Scalar> = plan.coins.iter().map(|&c| coins[c].blind).collect();

            let (sig_out_commits, last_blind, split_commitment) = if split {
                let value = sum_amounts(plan.coins.iter().map(|&c| coins[c].value))?;
                let value = u64::try_from(value).map_err(|_| AnonBuildErr::BadAmount)?;
                let split_commit = commit(value, &split_blinds[l]);
                (
                    vec![split_commit],
                    blind_sum(&in_blinds, &split_blinds[l..=l]),
                    Some(split_commit),
                )
            } else {
                (out_commits.clone(), blind_sum(&in_blinds, &out_blinds), None)
            };

            prepare_mlsag(&mut m, &in_commits, &sig_out_commits, n_cols, n_rows)?;

            let mut sks: Vec<Scalar> = plan.coins.iter().map(|&c| coins[c].secret).collect();
            sks.push(last_blind);

            let (key_images, sig) =
                generate_mlsag(rng, &msg, n_cols, n_rows, plan.secret_column, &sks, &m)?;
            sks.iter_mut().for_each(Zeroize::zeroize);

            let txin = &mut tx.ins[l];
            if key_images.concat() != txin.script_data[0] {
                return Err(AnonBuildErr::Mlsag(MlsagErr::BadKeyImage));
            }

            let mut sig_bytes = sig.to_bytes();
            if let Some(c) = split_commitment {
                sig_bytes.extend_from_slice(c.compress().as_bytes());
            }
            txin.script_witness[1] = sig_bytes;
        }

        Ok(())
    }
}

fn sum_amounts<I: Iterator<Item = Money>>(amounts: I) -> Result<Money, AnonBuildErr> {
    let mut total: Money = 0;
    for amount in amounts {
        if !money_range(amount) {
            return Err(AnonBuildErr::BadAmount);
        }
        total = total.checked_add(amount).ok_or(AnonBuildErr::BadAmount)?;
    }

    if !money_range(total) {
        return Err(AnonBuildErr::BadAmount);
    }
    Ok(total)
}

#[derive(Debug)]
pub enum AnonBuildErr {
    /// Ring size outside of the consensus bounds
    RingSizeOutOfRange,

    /// Outputs per signature outside of the consensus bounds
    BadInputsPerSig,

    /// More anon inputs than a transaction may carry
    TooManyInputs,

    /// Nothing to spend
    NoInputs,

    /// Nothing to pay
    NoRecipients,

    /// An amount is out of range
    BadAmount,

    /// Inputs do not cover the outputs and fee
    InsufficientFunds { have: Money, need: Money },

    /// Change is due but no change key was given
    MissingChangeAddress,

    /// An owned output is not in the output log
    UnknownInput(String),

    /// The same output is spent twice
    DuplicateInput(i64),

    /// An owned output was already spent in the given transaction
    KeyImageSpent(Hash256),

    /// A ring member could not be loaded
    BadRingMember(i64),

    /// Decoy selection failed
    Decoy(DecoyErr),

    /// Signing failed
    Mlsag(MlsagErr),

    /// The signed transaction did not verify
    Verify(AnonVerifyErr),

    /// Database error
    DB(DBInterfaceErr),
}

impl fmt::Display for AnonBuildErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingSizeOutOfRange => write!(
                f,
                "Ring size out of range [{}, {}]",
                MIN_RINGSIZE, MAX_RINGSIZE
            ),
            Self::BadInputsPerSig => write!(
                f,
                "Number of inputs per signature out of range [1, {}]",
                MAX_ANON_INPUTS
            ),
            Self::TooManyInputs => write!(f, "Too many anon inputs"),
            Self::NoInputs => write!(f, "No inputs to spend"),
            Self::NoRecipients => write!(f, "No recipients"),
            Self::BadAmount => write!(f, "Amount out of range"),
            Self::InsufficientFunds { have, need } => {
                write!(f, "Insufficient funds, have {} need {}", have, need)
            }
            Self::MissingChangeAddress => write!(f, "Change address missing"),
            Self::UnknownInput(pk) => write!(f, "Anon output not found in index: {}", pk),
            Self::DuplicateInput(i) => write!(f, "Duplicate anon input index: {}", i),
            Self::KeyImageSpent(txid) => write!(f, "Output already spent in {}", txid.to_hex()),
            Self::BadRingMember(i) => write!(f, "Bad ring member: {}", i),
            Self::Decoy(err) => write!(f, "{}", err),
            Self::Mlsag(err) => write!(f, "Failed to sign: {}", err),
            Self::Verify(err) => write!(f, "Verify failed: {}", err),
            Self::DB(err) => write!(f, "Database error: {:?}", err),
        }
    }
}

impl From<DecoyErr> for AnonBuildErr {
    fn from(other: DecoyErr) -> Self {
        Self::Decoy(other)
    }
}

impl From<MlsagErr> for AnonBuildErr {
    fn from(other: MlsagErr) -> Self {
        Self::Mlsag(other)
    }
}

impl From<DBInterfaceErr> for AnonBuildErr {
    fn from(other: DBInterfaceErr) -> Self {
        Self::DB(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::backend::MemoryBackend;
    use crate::chain::ChainConfig;
    use crate::consensus::COIN;
    use crate::primitives::OutPoint;
    use crate::ringct::{AnonOutput, RctDb};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Output log of 60 decoys with `values.len()` owned outputs mixed in
    fn setup(rng: &mut StdRng, values: &[Money]) -> (RctDb<MemoryBackend>, Vec<OwnedAnonOutput>) {
        let db = RctDb::new(MemoryBackend::new());
        let mut owned = vec![];
        let mut outputs = vec![];

        for i in 0..60_u32 {
            let secret = random_scalar(rng);
            let blind = random_scalar(rng);
            let value = (i as Money + 1) * COIN;
            outputs.push(AnonOutput {
                pubkey: public_key(&secret).compress().to_bytes(),
                commitment: commit(value as u64, &blind).compress().to_bytes(),
                outpoint: OutPoint::new(Hash256([i as u8; 32]), 0),
                block_height: 1,
            });

            let pos = i as usize / 7;
            if i % 7 == 3 && pos < values.len() {
                let value = values[pos];
                outputs.last_mut().unwrap().commitment =
                    commit(value as u64, &blind).compress().to_bytes();
                owned.push(OwnedAnonOutput {
                    secret,
                    blind,
                    value,
                });
            }
        }

        db.append_anon_outputs(&outputs).unwrap();
        (db, owned)
    }

    fn ctx<'a>(
        db: &'a RctDb<MemoryBackend>,
        config: &'a ChainConfig,
        blacklist: &'a HashSet<OutPoint>,
    ) -> DecoyContext<'a, MemoryBackend> {
        DecoyContext {
            db,
            config,
            best_height: 100,
            last_index: 60,
            blacklist,
        }
    }

    fn recipient(rng: &mut StdRng, amount: Money) -> TempRecipient {
        TempRecipient::ringct(amount, public_key(&random_scalar(rng)).compress().to_bytes())
    }

    #[test]
    fn it_builds_single_input_spends() {
        let mut rng = StdRng::seed_from_u64(21);
        let (db, owned) = setup(&mut rng, &[10 * COIN]);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();
        let builder = AnonTxBuilder::new(ctx(&db, &config, &blacklist), 5, 32).unwrap();

        let change = public_key(&random_scalar(&mut rng)).compress().to_bytes();
        let recipients = vec![
            recipient(&mut rng, 3 * COIN),
            TempRecipient::standard(2 * COIN, vec![0x76]),
        ];
        let tx = builder
            .build(&mut rng, &owned, recipients, 1000, Some(change))
            .unwrap();

        assert_eq!(tx.ins.len(), 1);
        assert_eq!(tx.ins[0].anon_info(), (1, 5));
        assert_eq!(tx.ct_fee(), Some(1000));
        assert_eq!(tx.outs.len(), 4);
        assert!(verify_mlsag(&tx, &db).is_ok());
    }

    #[test]
    fn it_uses_configured_ring_size() {
        let mut rng = StdRng::seed_from_u64(29);
        let (db, owned) = setup(&mut rng, &[10 * COIN]);
        let mut config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();

        let builder = AnonTxBuilder::with_default_ring_size(ctx(&db, &config, &blacklist), 32).unwrap();
        let recipients = vec![recipient(&mut rng, 9 * COIN)];
        let tx = builder
            .build(&mut rng, &owned, recipients, 1000, None)
            .unwrap();
        assert_eq!(tx.ins[0].anon_info(), (1, config.default_ring_size as u32));
        assert!(verify_mlsag(&tx, &db).is_ok());

        config.default_ring_size = MAX_RINGSIZE + 1;
        assert!(matches!(
            AnonTxBuilder::with_default_ring_size(ctx(&db, &config, &blacklist), 32),
            Err(AnonBuildErr::RingSizeOutOfRange)
        ));
    }

    #[test]
    fn it_builds_split_commitment_spends() {
        let mut rng = StdRng::seed_from_u64(22);
        let (db, owned) = setup(&mut rng, &[4 * COIN, 5 * COIN, 6 * COIN]);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();
        let builder = AnonTxBuilder::new(ctx(&db, &config, &blacklist), 3, 1).unwrap();

        let recipients = vec![recipient(&mut rng, 15 * COIN - 500)];
        let tx = builder
            .build(&mut rng, &owned, recipients, 500, None)
            .unwrap();

        assert_eq!(tx.ins.len(), 3);
        assert_eq!(tx.ins[0].script_witness[1].len(), mlsag_sig_size(1, 3, true));
        assert!(verify_mlsag(&tx, &db).is_ok());
    }

    #[test]
    fn it_signs_several_outputs_per_input() {
        let mut rng = StdRng::seed_from_u64(23);
        let (db, owned) = setup(&mut rng, &[4 * COIN, 5 * COIN]);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();
        let builder = AnonTxBuilder::new(ctx(&db, &config, &blacklist), 4, 2).unwrap();

        let recipients = vec![recipient(&mut rng, 9 * COIN - 10)];
        let tx = builder
            .build(&mut rng, &owned, recipients, 10, None)
            .unwrap();

        assert_eq!(tx.ins.len(), 1);
        assert_eq!(tx.ins[0].anon_info(), (2, 4));
        assert!(verify_mlsag(&tx, &db).is_ok());
    }

    #[test]
    fn tampered_spends_fail_verification() {
        let mut rng = StdRng::seed_from_u64(24);
        let (db, owned) = setup(&mut rng, &[10 * COIN]);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();
        let builder = AnonTxBuilder::new(ctx(&db, &config, &blacklist), 5, 32).unwrap();

        let recipients = vec![TempRecipient::standard(10 * COIN - 100, vec![0x76])];
        let tx = builder
            .build(&mut rng, &owned, recipients, 100, None)
            .unwrap();

        let mut inflated = tx.clone();
        inflated.outs[1] = TxOut::Standard {
            value: 10 * COIN,
            script: vec![0x76],
        };
        inflated.hash = None;
        assert_eq!(
            verify_mlsag(&inflated, &db).unwrap_err().reason(),
            "verify-mlsag-failed"
        );
    }

    #[test]
    fn it_rejects_split_inflation() {
        let mut rng = StdRng::seed_from_u64(25);
        let (db, owned) = setup(&mut rng, &[4 * COIN, 5 * COIN]);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();
        let builder = AnonTxBuilder::new(ctx(&db, &config, &blacklist), 3, 1).unwrap();

        let recipients = vec![recipient(&mut rng, 9 * COIN - 1)];
        let tx = builder
            .build(&mut rng, &owned, recipients, 1, None)
            .unwrap();

        let mut dup_ki = tx.clone();
        dup_ki.ins[1].script_data = dup_ki.ins[0].script_data.clone();
        dup_ki.hash = None;
        assert_eq!(
            verify_mlsag(&dup_ki, &db).unwrap_err().reason(),
            "bad-anonin-dup-ki-tx-double"
        );

        let mut bad_split = tx.clone();
        let sig = &mut bad_split.ins[1].script_witness[1];
        let len = sig.len();
        sig[len - 32..].copy_from_slice(commit(1, &Scalar::ONE).compress().as_bytes());
        assert!(verify_mlsag(&bad_split, &db).is_err());
    }

    #[test]
    fn it_rejects_confirmed_key_images() {
        let mut rng = StdRng::seed_from_u64(26);
        let (db, owned) = setup(&mut rng, &[10 * COIN]);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();
        let builder = AnonTxBuilder::new(ctx(&db, &config, &blacklist), 5, 32).unwrap();

        let recipients = vec![recipient(&mut rng, 10 * COIN - 5)];
        let tx = builder
            .build(&mut rng, &owned, recipients, 5, None)
            .unwrap();

        let ki: [u8; 32] = tx.ins[0].script_data[0][..].try_into().unwrap();
        db.write_key_image(&ki, tx.txid()).unwrap();
        assert!(verify_mlsag(&tx, &db).is_ok());

        db.write_key_image(&ki, Hash256([1; 32])).unwrap();
        assert_eq!(
            verify_mlsag(&tx, &db).unwrap_err().reason(),
            "bad-anonin-dup-keyimage"
        );

        let recipients = vec![recipient(&mut rng, 10 * COIN - 5)];
        let err = builder
            .build(&mut rng, &owned, recipients, 5, None)
            .unwrap_err();
        assert!(matches!(err, AnonBuildErr::KeyImageSpent(_)));
    }

    #[test]
    fn it_checks_funds_and_parameters() {
        let mut rng = StdRng::seed_from_u64(27);
        let (db, owned) = setup(&mut rng, &[COIN]);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();

        assert!(matches!(
            AnonTxBuilder::new(ctx(&db, &config, &blacklist), 2, 1),
            Err(AnonBuildErr::RingSizeOutOfRange)
        ));
        assert!(matches!(
            AnonTxBuilder::new(ctx(&db, &config, &blacklist), 3, 0),
            Err(AnonBuildErr::BadInputsPerSig)
        ));

        let builder = AnonTxBuilder::new(ctx(&db, &config, &blacklist), 3, 1).unwrap();
        let recipients = vec![recipient(&mut rng, COIN)];
        assert!(matches!(
            builder.build(&mut rng, &owned, recipients, 1, None),
            Err(AnonBuildErr::InsufficientFunds { .. })
        ));
        let recipients = vec![recipient(&mut rng, 1)];
        assert!(matches!(
            builder.build(&mut rng, &owned, recipients, 1, None),
            Err(AnonBuildErr::MissingChangeAddress)
        ));

        let stranger = OwnedAnonOutput {
            secret: random_scalar(&mut rng),
            blind: random_scalar(&mut rng),
            value: COIN,
        };
        let recipients = vec![recipient(&mut rng, COIN - 1)];
        assert!(matches!(
            builder.build(&mut rng, &[stranger], recipients, 1, None),
            Err(AnonBuildErr::UnknownInput(_))
        ));
    }
}
