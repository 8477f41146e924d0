// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::primitives::BigNum;
use ibig::modular::ModuloRing;
use ibig::UBig;
use rand::prelude::*;

const SMALL_PRIMES: [u32; 24] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
];

/// Miller-Rabin probable prime test with `rounds` random bases, preceded by
/// trial division by small primes.
#[must_use]
pub fn is_probable_prime(n: &BigNum, rounds: usize) -> bool {
    let n = &n.0;
    let zero = UBig::from(0_u8);
    let one = UBig::from(1_u8);
    let two = UBig::from(2_u8);

    if *n < two {
        return false;
    }

    for p in SMALL_PRIMES {
        let p = UBig::from(p);
        if *n == p {
            return true;
        }

        if n % &p == zero {
            return false;
        }
    }

    let n_minus_one = n - &one;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;
    let ring = ModuloRing::new(n);
    let one_m = ring.from(&one);
    let minus_one_m = ring.from(&n_minus_one);

    // Bases are drawn from [2, n - 2]
    let byte_len = (n.bit_len() + 7) / 8;
    let span = n - UBig::from(3_u8);
    let mut rng = rand::thread_rng();
    let mut buf = vec![0; byte_len + 8];

    'witness: for _ in 0..rounds {
        rng.fill_bytes(&mut buf);
        let a = UBig::from_le_bytes(&buf) % &span + &two;
        let mut x = ring.from(&a).pow(&d);

        if x == one_m || x == minus_one_m {
            continue;
        }

        for _ in 1..s {
            x = &x * &x;

            if x == minus_one_m {
                continue 'witness;
            }

            if x == one_m {
                return false;
            }
        }

        return false;
    }

    true
}
