// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

mod accumulator;
mod accumulator_map;
mod checkpoint;
mod checksum;
mod db;
mod deterministic;
mod params;
mod primality;
mod witness;

pub use accumulator::*;
pub use accumulator_map::*;
pub use checkpoint::*;
pub use checksum::*;
pub use db::*;
pub use deterministic::*;
pub use params::*;
pub use primality::*;
pub use witness::*;

#[cfg(test)]
pub(crate) use accumulator::tests::random_coin;

#[cfg(test)]
pub(crate) use checkpoint::tests::TestChain;
