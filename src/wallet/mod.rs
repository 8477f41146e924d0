// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Wallet side of the privacy layer: the deterministic mint wallet and the
//! witness precompute cache.

mod witness_cache;
mod zwallet;

pub use witness_cache::*;
pub use zwallet::*;
