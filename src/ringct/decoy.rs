// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::backend::{DBInterface, DBInterfaceErr};
use crate::chain::ChainConfig;
use crate::consensus::{MAX_DECOY_TRIES, MAX_RINGSIZE, MIN_RINGSIZE};
use crate::primitives::OutPoint;
use crate::ringct::RctDb;
use rand::Rng;
use std::collections::HashSet;
use std::fmt;

/// Chain state decoys are picked against
pub struct DecoyContext<'a, B: DBInterface> {
    pub db: &'a RctDb<B>,
    pub config: &'a ChainConfig,

    /// Height of the active tip
    pub best_height: u64,

    /// Index of the last anon output in the active chain
    pub last_index: i64,

    /// Outputs that must never be used as ring members
    pub blacklist: &'a HashSet<OutPoint>,
}

/// Fills every column of `mi` except `secret_column` with decoy indices.
///
/// `have` must already contain the real outputs of every ring of the
/// transaction. Picked decoys are added to it.
pub fn pick_hiding_outputs<R: Rng, B: DBInterface>(
    rng: &mut R,
    ctx: &DecoyContext<'_, B>,
    mi: &mut [Vec<i64>],
    secret_column: usize,
    ring_size: usize,
    have: &mut HashSet<i64>,
) -> Result<(), DecoyErr> {
    if !(MIN_RINGSIZE..=MAX_RINGSIZE).contains(&ring_size) {
        return Err(DecoyErr::RingSizeOutOfRange);
    }

    let n_inputs = mi.len();
    let required = (n_inputs * ring_size) as i64;
    let mut last_index = ctx.last_index;
    if last_index < required {
        log::error!(
            "Not enough anonymous outputs exist, last: {}, required: {}",
            last_index,
            required
        );
        return Err(DecoyErr::NotEnoughOutputs {
            last: last_index,
            required,
        });
    }

    let max_depth_height = ctx.best_height as i64
        - (ctx.config.min_rct_output_depth + ctx.config.decoy_extra_depth);

    for (k, row) in mi.iter_mut().enumerate() {
        if row.len() != ring_size {
            return Err(DecoyErr::RingSizeOutOfRange);
        }

        for (i, slot) in row.iter_mut().enumerate() {
            if i == secret_column {
                continue;
            }

            let min_index = if rng.gen_range(0..100) < 50 {
                (last_index - ctx.config.anon_recent_group).max(1)
            } else if rng.gen_range(0..100) < 70 {
                (last_index - ctx.config.anon_old_group).max(1)
            } else {
                1
            };

            let mut last_depth_check_passed = 0;
            let mut picked = None;

            for _ in 0..MAX_DECOY_TRIES {
                if last_index <= min_index {
                    log::error!(
                        "Not enough anonymous outputs exist, min: {}, last: {}, required: {}",
                        min_index,
                        last_index,
                        required
                    );
                    return Err(DecoyErr::NotEnoughOutputs {
                        last: last_index,
                        required,
                    });
                }

                let decoy = rng.gen_range(min_index..=last_index);
                if have.contains(&decoy) {
                    if decoy == last_index {
                        last_index -= 1;
                    }
                    continue;
                }

                let output = ctx
                    .db
                    .read_anon_output(decoy)?
                    .ok_or(DecoyErr::OutputNotFound(decoy))?;

                if ctx.blacklist.contains(&output.outpoint) {
                    continue;
                }

                if decoy > last_depth_check_passed {
                    if output.block_height as i64 > max_depth_height {
                        if last_index > decoy {
                            last_index = decoy - 1;
                        }
                        continue;
                    }
                    last_depth_check_passed = decoy;
                }

                picked = Some(decoy);
                break;
            }

            let decoy = picked.ok_or_else(|| {
                log::error!(
                    "Exceeded maximum tries for picking hiding outputs ({}, {})",
                    k,
                    i
                );
                DecoyErr::MaxTries { row: k, col: i }
            })?;

            *slot = decoy;
            have.insert(decoy);
        }
    }

    Ok(())
}

#[derive(Debug)]
pub enum DecoyErr {
    /// Ring size outside of the consensus bounds
    RingSizeOutOfRange,

    /// The output log is too small for the requested rings
    NotEnoughOutputs { last: i64, required: i64 },

    /// The output log has a hole
    OutputNotFound(i64),

    /// No acceptable decoy was found for a ring slot
    MaxTries { row: usize, col: usize },

    /// Database error
    DB(DBInterfaceErr),
}

impl fmt::Display for DecoyErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingSizeOutOfRange => write!(
                f,
                "Ring size out of range [{}, {}]",
                MIN_RINGSIZE, MAX_RINGSIZE
            ),
            Self::NotEnoughOutputs { last, required } => write!(
                f,
                "Not enough anonymous outputs exist, last: {}, required: {}",
                last, required
            ),
            Self::OutputNotFound(i) => write!(f, "Anonymous output not found in database: {}", i),
            Self::MaxTries { row, col } => write!(
                f,
                "Exceeded maximum tries for picking hiding outputs ({}, {})",
                row, col
            ),
            Self::DB(err) => write!(f, "Database error: {:?}", err),
        }
    }
}

impl From<DBInterfaceErr> for DecoyErr {
    fn from(other: DBInterfaceErr) -> Self {
        Self::DB(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::backend::MemoryBackend;
    use crate::primitives::Hash256;
    use crate::ringct::AnonOutput;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn outpoint(i: i64) -> OutPoint {
        OutPoint::new(Hash256([(i % 256) as u8; 32]), i as u32)
    }

    /// Output log where outputs `1..=old` are at height 1 and the rest at
    /// `recent_height`
    fn output_log(old: i64, total: i64, recent_height: u64) -> RctDb<MemoryBackend> {
        let db = RctDb::new(MemoryBackend::new());
        let outputs: Vec<AnonOutput> = (1..=total)
            .map(|i| AnonOutput {
                pubkey: [0; 32],
                commitment: [0; 32],
                outpoint: outpoint(i),
                block_height: if i <= old { 1 } else { recent_height },
            })
            .collect();
        db.append_anon_outputs(&outputs).unwrap();
        db
    }

    #[test]
    fn it_picks_distinct_decoys() {
        let db = output_log(200, 200, 1);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();
        let ctx = DecoyContext {
            db: &db,
            config: &config,
            best_height: 100,
            last_index: 200,
            blacklist: &blacklist,
        };

        let mut rng = StdRng::seed_from_u64(1);
        let mut mi = vec![vec![0; 11]; 2];
        mi[0][4] = 17;
        mi[1][4] = 18;
        let mut have: HashSet<i64> = [17, 18].into_iter().collect();

        pick_hiding_outputs(&mut rng, &ctx, &mut mi, 4, 11, &mut have).unwrap();

        let all: Vec<i64> = mi.iter().flatten().copied().collect();
        let unique: HashSet<i64> = all.iter().copied().collect();
        assert_eq!(unique.len(), 22);
        assert!(all.iter().all(|i| (1..=200).contains(i)));
        assert_eq!(mi[0][4], 17);
        assert_eq!(mi[1][4], 18);
        assert_eq!(have.len(), 22);
    }

    #[test]
    fn it_skips_shallow_outputs() {
        // Outputs past 150 are too recent to be ring members
        let db = output_log(150, 200, 95);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();
        let ctx = DecoyContext {
            db: &db,
            config: &config,
            best_height: 100,
            last_index: 200,
            blacklist: &blacklist,
        };

        let mut rng = StdRng::seed_from_u64(2);
        let mut mi = vec![vec![0; 8]; 3];
        let mut have: HashSet<i64> = [1, 2, 3].into_iter().collect();
        for (k, row) in mi.iter_mut().enumerate() {
            row[0] = k as i64 + 1;
        }

        pick_hiding_outputs(&mut rng, &ctx, &mut mi, 0, 8, &mut have).unwrap();
        assert!(mi.iter().flatten().all(|i| *i <= 150));
    }

    #[test]
    fn it_skips_blacklisted_outputs() {
        let db = output_log(100, 100, 1);
        let config = ChainConfig::new("regtest");
        let blacklist: HashSet<OutPoint> = (1..=50).map(outpoint).collect();
        let ctx = DecoyContext {
            db: &db,
            config: &config,
            best_height: 100,
            last_index: 100,
            blacklist: &blacklist,
        };

        let mut rng = StdRng::seed_from_u64(3);
        let mut mi = vec![vec![0; 5]];
        mi[0][2] = 99;
        let mut have: HashSet<i64> = [99].into_iter().collect();

        pick_hiding_outputs(&mut rng, &ctx, &mut mi, 2, 5, &mut have).unwrap();
        assert!(mi[0].iter().all(|i| *i > 50));
    }

    #[test]
    fn it_requires_enough_outputs() {
        let db = output_log(10, 10, 1);
        let config = ChainConfig::new("regtest");
        let blacklist = HashSet::new();
        let ctx = DecoyContext {
            db: &db,
            config: &config,
            best_height: 100,
            last_index: 10,
            blacklist: &blacklist,
        };

        let mut rng = StdRng::seed_from_u64(4);
        let mut mi = vec![vec![0; 11]];
        let mut have = HashSet::new();
        assert!(matches!(
            pick_hiding_outputs(&mut rng, &ctx, &mut mi, 0, 11, &mut have),
            Err(DecoyErr::NotEnoughOutputs {
                last: 10,
                required: 11
            })
        ));

        let mut mi = vec![vec![0; 2]];
        assert!(matches!(
            pick_hiding_outputs(&mut rng, &ctx, &mut mi, 0, 2, &mut have),
            Err(DecoyErr::RingSizeOutOfRange)
        ));
    }
}
