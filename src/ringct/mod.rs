// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

mod anon;
mod builder;
mod db;
mod decoy;
mod mlsag;
mod pedersen;
mod range_proof;
mod temp_recipient;

pub use anon::*;
pub use builder::*;
pub use db::*;
pub use decoy::*;
pub use mlsag::*;
pub use pedersen::*;
pub use range_proof::*;
pub use temp_recipient::*;

#[cfg(test)]
pub(crate) use anon::tests::inflating_spend;
