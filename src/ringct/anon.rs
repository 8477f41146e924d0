// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Consensus checks of anon inputs and outputs

use crate::chain::backend::{DBBatch, DBInterface, DBInterfaceErr};
use crate::consensus::{
    mlsag_sig_size, Money, KEY_IMAGE_SIZE, MAX_ANON_INPUTS, MAX_RINGSIZE, MIN_RINGSIZE,
};
use crate::primitives::{Hash256, OutPoint, Transaction, TxIn, TxOut};
use crate::ringct::{
    commit_plain, decompress, prepare_mlsag, verify_mlsag_signature, verify_range_proof,
    verify_tally, AnonOutput, MlsagErr, MlsagSignature, RangeProofErr, RctDb,
};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::traits::Identity;
use std::collections::HashSet;
use std::fmt;

/// Borrowed view of the stacks of a well formed anon input
pub struct AnonInputView<'a> {
    pub n_inputs: usize,
    pub ring_size: usize,
    pub key_images: &'a [u8],
    pub indices: &'a [u8],
    pub signature: &'a [u8],
}

impl<'a> AnonInputView<'a> {
    /// Checks the shape of `txin`. Signature length is not checked since it
    /// depends on the rest of the transaction.
    pub fn parse(txin: &'a TxIn) -> Result<Self, AnonVerifyErr> {
        if !txin.is_anon_input() {
            return Err(AnonVerifyErr::BadAnonInput);
        }

        let (n_inputs, ring_size) = txin.anon_info();
        let n_inputs = n_inputs as usize;
        let ring_size = ring_size as usize;

        if !(1..=MAX_ANON_INPUTS).contains(&n_inputs) {
            return Err(AnonVerifyErr::BadNumInputs);
        }

        if !(MIN_RINGSIZE..=MAX_RINGSIZE).contains(&ring_size) {
            return Err(AnonVerifyErr::BadRingSize);
        }

        if txin.script_data.len() != 1 {
            return Err(AnonVerifyErr::BadDataStackSize);
        }

        if txin.script_witness.len() != 2 {
            return Err(AnonVerifyErr::BadWitnessStackSize);
        }

        let key_images = &txin.script_data[0];
        if key_images.len() != n_inputs * KEY_IMAGE_SIZE {
            return Err(AnonVerifyErr::BadKeyImagesSize);
        }

        Ok(Self {
            n_inputs,
            ring_size,
            key_images,
            indices: &txin.script_witness[0],
            signature: &txin.script_witness[1],
        })
    }

    pub fn key_image_iter(&self) -> impl Iterator<Item = [u8; KEY_IMAGE_SIZE]> + 'a {
        self.key_images.chunks_exact(KEY_IMAGE_SIZE).map(|chunk| {
            let mut ki = [0; KEY_IMAGE_SIZE];
            ki.copy_from_slice(chunk);
            ki
        })
    }

    /// Decodes the `n_inputs * ring_size` output indices, row by row
    pub fn decode_indices(&self) -> Result<Vec<i64>, AnonVerifyErr> {
        let mut out = Vec::with_capacity(self.n_inputs * self.ring_size);
        let mut rest = self.indices;

        for _ in 0..self.n_inputs * self.ring_size {
            let (index, tail) =
                unsigned_varint::decode::u64(rest).map_err(|_| AnonVerifyErr::ExtractIndex)?;
            let index = i64::try_from(index).map_err(|_| AnonVerifyErr::ExtractIndex)?;
            out.push(index);
            rest = tail;
        }

        Ok(out)
    }
}

/// Verifies every MLSAG of an anon spend against the confirmed output log.
/// Does not mutate any index.
pub fn verify_mlsag<B: DBInterface>(tx: &Transaction, db: &RctDb<B>) -> Result<(), AnonVerifyErr> {
    let split_commitments = tx.ins.len() > 1;

    let mut plain_value_out = tx
        .get_plain_value_out()
        .map_err(|_| AnonVerifyErr::BadPlainValue)?;

    let fee = match tx.ct_fee() {
        Some(fee) => fee,
        None if tx.is_coinstake() => 0,
        None => {
            log::error!("verify_mlsag: bad-fee-output");
            return Err(AnonVerifyErr::BadFeeOutput);
        }
    };
    plain_value_out = plain_value_out
        .checked_add(fee)
        .ok_or(AnonVerifyErr::BadPlainValue)?;

    let plain_commitment = if plain_value_out > 0 {
        Some(commit_plain(plain_value_out).ok_or(AnonVerifyErr::BadPlainCommitment)?)
    } else {
        None
    };

    let output_commits = || -> Result<Vec<RistrettoPoint>, AnonVerifyErr> {
        let mut commits: Vec<RistrettoPoint> = plain_commitment.into_iter().collect();
        for out in &tx.outs {
            if let Some(c) = out.commitment() {
                commits.push(decompress(c).ok_or(AnonVerifyErr::BadOutputCommitment)?);
            }
        }
        Ok(commits)
    };

    let txid = tx.txid();
    let msg = tx.outputs_hash().0;
    let mut seen_indices = HashSet::new();
    let mut seen_key_images = HashSet::new();
    let mut input_split_commits = Vec::with_capacity(tx.ins.len());

    for txin in &tx.ins {
        let view = AnonInputView::parse(txin)?;
        let n_cols = view.ring_size;
        let n_rows = view.n_inputs + 1;

        let sig_len = mlsag_sig_size(view.n_inputs, view.ring_size, false);
        if view.signature.len() != mlsag_sig_size(view.n_inputs, view.ring_size, split_commitments)
        {
            return Err(AnonVerifyErr::BadSigSize);
        }

        let out_commits = if split_commitments {
            let split = decompress(&view.signature[sig_len..])
                .ok_or(AnonVerifyErr::PrepareMlsagFailed(MlsagErr::BadDimensions))?;
            input_split_commits.push(split);
            vec![split]
        } else {
            output_commits()?
        };

        let mut m = vec![RistrettoPoint::identity(); n_cols * n_rows];
        let mut in_commits = Vec::with_capacity(n_cols * view.n_inputs);

        for (pos, index) in view.decode_indices()?.into_iter().enumerate() {
            if !seen_indices.insert(index) {
                return Err(AnonVerifyErr::DuplicateIndex);
            }

            let output = db
                .read_anon_output(index)?
                .ok_or(AnonVerifyErr::UnknownIndex(index))?;

            m[pos] = decompress(&output.pubkey).ok_or(AnonVerifyErr::UnknownIndex(index))?;
            in_commits
                .push(decompress(&output.commitment).ok_or(AnonVerifyErr::UnknownIndex(index))?);
        }

        for ki in view.key_image_iter() {
            if !seen_key_images.insert(ki) {
                return Err(AnonVerifyErr::DuplicateKeyImageInTx);
            }

            if let Some(spent_in) = db.read_key_image(&ki)? {
                if spent_in != txid {
                    log::info!("verify_mlsag: Key image in tx {}", spent_in.to_hex());
                    return Err(AnonVerifyErr::DuplicateKeyImage(spent_in));
                }
            }
        }

        if out_commits.is_empty() {
            log::error!("verify_mlsag: prepare-mlsag-failed, no output commitments");
            return Err(AnonVerifyErr::PrepareMlsagFailed(MlsagErr::BadDimensions));
        }

        prepare_mlsag(&mut m, &in_commits, &out_commits, n_cols, n_rows).map_err(|err| {
            log::error!("verify_mlsag: prepare-mlsag-failed {}", err);
            AnonVerifyErr::PrepareMlsagFailed(err)
        })?;

        let sig = MlsagSignature::from_bytes(view.signature, n_cols, n_rows)
            .map_err(AnonVerifyErr::VerifyMlsagFailed)?;

        verify_mlsag_signature(&msg, n_cols, n_rows, &m, view.key_images, &sig).map_err(|err| {
            log::error!("verify_mlsag: verify-mlsag-failed {}", err);
            AnonVerifyErr::VerifyMlsagFailed(err)
        })?;
    }

    if split_commitments && !verify_tally(&input_split_commits, &output_commits()?) {
        log::error!("verify_mlsag: verify-commit-tally-failed");
        return Err(AnonVerifyErr::VerifyCommitTallyFailed);
    }

    Ok(())
}

/// Checks the range proof of every blinded output of `tx`. Runs for every
/// transaction, including ones without anon inputs.
pub fn verify_range_proofs(tx: &Transaction) -> Result<(), AnonVerifyErr> {
    for (n, out) in tx.outs.iter().enumerate() {
        let (commitment, range_proof) = match out {
            TxOut::Confidential {
                commitment,
                range_proof,
                ..
            }
            | TxOut::RingCt {
                commitment,
                range_proof,
                ..
            } => (commitment, range_proof),
            _ => continue,
        };

        let c = decompress(commitment).ok_or(AnonVerifyErr::BadOutputCommitment)?;
        verify_range_proof(&c, range_proof).map_err(|err| {
            log::error!("verify_range_proofs: bad-rangeproof on output {}: {}", n, err);
            AnonVerifyErr::BadRangeProof(err)
        })?;
    }

    Ok(())
}

/// Checks that the blinded outputs of a reward transaction commit to exactly
/// `expected_reward`
pub fn verify_coinbase(expected_reward: Money, tx: &Transaction) -> Result<(), AnonVerifyErr> {
    let plain = commit_plain(expected_reward).ok_or_else(|| {
        log::error!("verify_coinbase: Pedersen Commit failed for plain out.");
        AnonVerifyErr::PlainCommitFailed
    })?;

    let mut out_commits = vec![];
    for out in &tx.outs {
        if let Some(c) = out.commitment() {
            out_commits.push(decompress(c).ok_or(AnonVerifyErr::BadOutputCommitment)?);
        }
    }

    if !verify_tally(&[plain], &out_commits) {
        log::error!("verify_coinbase: verify-commit-tally-failed");
        return Err(AnonVerifyErr::VerifyCommitTallyFailed);
    }

    Ok(())
}

/// Key images spent by `txin`. `None` if the input is not a well formed
/// anon input.
#[must_use]
pub fn key_images(txin: &TxIn) -> Option<Vec<[u8; KEY_IMAGE_SIZE]>> {
    let view = AnonInputView::parse(txin).ok()?;
    Some(view.key_image_iter().collect())
}

/// Key images spent by every anon input of `tx`
#[must_use]
pub fn tx_key_images(tx: &Transaction) -> Option<Vec<[u8; KEY_IMAGE_SIZE]>> {
    let mut out = vec![];
    for txin in tx.ins.iter().filter(|i| i.is_anon_input()) {
        out.extend(key_images(txin)?);
    }
    Some(out)
}

/// Anon outputs created by `tx`, ready to be appended to the output log
#[must_use]
pub fn anon_outputs(tx: &Transaction, block_height: u64) -> Vec<AnonOutput> {
    let txid = tx.txid();
    tx.outs
        .iter()
        .enumerate()
        .filter_map(|(n, out)| match out {
            TxOut::RingCt { pk, commitment, .. } => Some(AnonOutput {
                pubkey: *pk,
                commitment: *commitment,
                outpoint: OutPoint::new(txid, n as u32),
                block_height,
            }),
            _ => None,
        })
        .collect()
}

/// Returns `Ok(true)` if no anon output of `tx` is indexed yet and `Ok(false)`
/// if they already are, at the same outpoint. Fails when an output key is
/// reused by another outpoint.
pub fn all_anon_outputs_unknown<B: DBInterface>(
    tx: &Transaction,
    db: &RctDb<B>,
) -> Result<bool, AnonVerifyErr> {
    let txid = tx.txid();

    for (n, out) in tx.outs.iter().enumerate() {
        let pk = match out {
            TxOut::RingCt { pk, .. } => pk,
            _ => continue,
        };

        if let Some(existing) = db.read_anon_output_link(pk)? {
            let outpoint = OutPoint::new(txid, n as u32);
            match db.read_anon_output(existing)? {
                Some(ao) if ao.outpoint == outpoint => return Ok(false),
                ao => {
                    log::error!(
                        "Duplicate anon-output {}, index {} - existing: {:?}",
                        hex::encode(pk),
                        existing,
                        ao.map(|ao| ao.outpoint)
                    );
                    return Err(AnonVerifyErr::DuplicateAnonOutput);
                }
            }
        }
    }

    Ok(true)
}

/// Erases anon outputs past `last_valid` together with the given key images.
/// `expect_erase` is the highest index the caller knows was written.
pub fn rollback_rct_index<B: DBInterface>(
    db: &RctDb<B>,
    last_valid: i64,
    expect_erase: i64,
    key_images: &[[u8; KEY_IMAGE_SIZE]],
) -> Result<(), DBInterfaceErr> {
    let mut batch = DBBatch::new();
    stage_rollback_rct_index(db, &mut batch, last_valid, expect_erase, key_images)?;
    db.write_batch(batch)
}

/// Adds the deletes of `rollback_rct_index` to `batch`
pub fn stage_rollback_rct_index<B: DBInterface>(
    db: &RctDb<B>,
    batch: &mut DBBatch,
    last_valid: i64,
    expect_erase: i64,
    key_images: &[[u8; KEY_IMAGE_SIZE]],
) -> Result<(), DBInterfaceErr> {
    let erased = db.stage_truncate(batch, last_valid, key_images)?;
    if last_valid + erased < expect_erase {
        log::warn!(
            "Rolled back anon outputs to {}, expected to erase up to {}",
            last_valid,
            expect_erase
        );
    }
    Ok(())
}

/// Outpoints of every ring member of `txin`. Unknown or undecodable members
/// are skipped.
pub fn get_ring_ct_inputs<B: DBInterface>(
    txin: &TxIn,
    db: &RctDb<B>,
) -> Result<Vec<OutPoint>, DBInterfaceErr> {
    let view = match AnonInputView::parse(txin) {
        Ok(view) => view,
        Err(_) => return Ok(vec![]),
    };

    let mut out = vec![];
    let mut rest = view.indices;
    for _ in 0..view.n_inputs * view.ring_size {
        let (index, tail) = match unsigned_varint::decode::u64(rest) {
            Ok(decoded) => decoded,
            Err(_) => continue,
        };
        rest = tail;

        let index = match i64::try_from(index) {
            Ok(i) => i,
            Err(_) => continue,
        };

        if let Some(ao) = db.read_anon_output(index)? {
            out.push(ao.outpoint);
        }
    }

    Ok(out)
}

/// Ring member outpoints of every anon input of `tx`
pub fn get_tx_ring_ct_inputs<B: DBInterface>(
    tx: &Transaction,
    db: &RctDb<B>,
) -> Result<Vec<Vec<OutPoint>>, DBInterfaceErr> {
    tx.ins
        .iter()
        .filter(|txin| txin.is_anon_input())
        .map(|txin| get_ring_ct_inputs(txin, db))
        .collect()
}

#[derive(Debug)]
pub enum AnonVerifyErr {
    /// Non coinstake transaction without a fee output
    BadFeeOutput,

    /// Plain outputs are out of range
    BadPlainValue,

    /// Plain value could not be committed to
    BadPlainCommitment,

    /// Expected reward could not be committed to
    PlainCommitFailed,

    /// An output commitment is not a valid point
    BadOutputCommitment,

    /// Input is not an anon input
    BadAnonInput,

    /// Number of signed outputs out of bounds
    BadNumInputs,

    /// Ring size out of bounds
    BadRingSize,

    /// Data stack must hold exactly the key images
    BadDataStackSize,

    /// Witness stack must hold exactly the indices and the signature
    BadWitnessStackSize,

    /// Key image buffer length mismatch
    BadKeyImagesSize,

    /// Signature buffer length mismatch
    BadSigSize,

    /// A ring member index could not be decoded
    ExtractIndex,

    /// A ring member is used twice in the transaction
    DuplicateIndex,

    /// A ring member is not in the output log
    UnknownIndex(i64),

    /// A key image is used twice in the transaction
    DuplicateKeyImageInTx,

    /// A key image was spent by a confirmed transaction
    DuplicateKeyImage(Hash256),

    /// An anon output key is already indexed at another outpoint
    DuplicateAnonOutput,

    /// The key matrix could not be built
    PrepareMlsagFailed(MlsagErr),

    /// The ring signature is invalid
    VerifyMlsagFailed(MlsagErr),

    /// Split commitments do not add up to the outputs
    VerifyCommitTallyFailed,

    /// A blinded output may hide an amount outside `[0, 2^64)`
    BadRangeProof(RangeProofErr),

    /// Database error
    DB(DBInterfaceErr),
}

impl AnonVerifyErr {
    /// Reject reason
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::BadFeeOutput => "bad-fee-output",
            Self::BadPlainValue => "bad-txns-out-of-range",
            Self::BadPlainCommitment => "bad-plain-commitment",
            Self::PlainCommitFailed => "plain-pedersen-commit-failed",
            Self::BadOutputCommitment => "bad-output-commitment",
            Self::BadAnonInput => "bad-anon-input",
            Self::BadNumInputs => "bad-anon-num-inputs",
            Self::BadRingSize => "bad-anon-ringsize",
            Self::BadDataStackSize => "bad-anonin-dstack-size",
            Self::BadWitnessStackSize => "bad-anonin-wstack-size",
            Self::BadKeyImagesSize => "bad-anonin-keyimages-size",
            Self::BadSigSize => "bad-anonin-sig-size",
            Self::ExtractIndex => "bad-anonin-extract-i",
            Self::DuplicateIndex => "bad-anonin-dup-i",
            Self::UnknownIndex(_) => "bad-anonin-unknown-i",
            Self::DuplicateKeyImageInTx => "bad-anonin-dup-ki-tx-double",
            Self::DuplicateKeyImage(_) => "bad-anonin-dup-keyimage",
            Self::DuplicateAnonOutput => "duplicate-anon-output",
            Self::PrepareMlsagFailed(_) => "prepare-mlsag-failed",
            Self::VerifyMlsagFailed(_) => "verify-mlsag-failed",
            Self::VerifyCommitTallyFailed => "verify-commit-tally-failed",
            Self::BadRangeProof(_) => "bad-rangeproof",
            Self::DB(_) => "rct-db-error",
        }
    }
}

impl fmt::Display for AnonVerifyErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIndex(i) => write!(f, "{}: {}", self.reason(), i),
            Self::DuplicateKeyImage(txid) => write!(f, "{}: {}", self.reason(), txid.to_hex()),
            Self::PrepareMlsagFailed(err) | Self::VerifyMlsagFailed(err) => {
                write!(f, "{}: {}", self.reason(), err)
            }
            Self::BadRangeProof(err) => write!(f, "{}: {}", self.reason(), err),
            Self::DB(err) => write!(f, "{}: {:?}", self.reason(), err),
            _ => write!(f, "{}", self.reason()),
        }
    }
}

impl From<DBInterfaceErr> for AnonVerifyErr {
    fn from(other: DBInterfaceErr) -> Self {
        Self::DB(other)
    }
}
