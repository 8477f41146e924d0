// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! # Veil privacy core
//! Zerocoin accumulator checkpoints, accumulator witnesses, deterministic mints
//! and RingCT (MLSAG) construction and verification for the Veil node.
//!
//! ## Layout
//! * **Zerocoin**: one RSA accumulator per denomination, packed into a 256-bit
//!   checkpoint committed in every block header. Checkpoints move every 10 blocks
//!   and lag mints by one window so they can settle before being required.
//! * **Witnesses**: membership proofs for a single mint, built by walking the
//!   active chain forward from the mint's window with a randomized security level.
//! * **RingCT**: one-time outputs indexed in an append-only log. Spends are signed
//!   with MLSAG ring signatures over decoys picked from that log, key images
//!   prevent double spends and Pedersen commitments hide amounts.
//! * **Deterministic mints**: serial, randomness and commitment derived from a
//!   wallet master seed and a counter.

#![allow(clippy::module_inception)]

pub mod chain;
pub mod codec;
pub mod consensus;
pub mod global;
pub mod node;
pub mod primitives;
pub mod ringct;
pub mod settings;
pub mod zerocoin;

#[cfg(feature = "wallet")]
pub mod wallet;
