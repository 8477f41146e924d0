// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use criterion::*;
use veil::chain::backend::Stores;
use veil::chain::{ChainConfig, ChainState};
use veil::primitives::*;
use veil::wallet::ZWallet;
use veil::zerocoin::*;

fn mints(count: usize, denomination: CoinDenomination) -> Vec<PublicCoin> {
    let params = ZerocoinParams::for_network("regtest");
    let mut wallet = ZWallet::new([42; 32], params);
    (0..count)
        .map(|_| {
            wallet
                .generate_deterministic_mint(denomination)
                .unwrap()
                .public_coin()
        })
        .collect()
}

pub fn accumulate_benchmark(c: &mut Criterion) {
    let params = ZerocoinParams::for_network("regtest");
    let coins = mints(100, CoinDenomination::Ten);
    let mut group = c.benchmark_group("accumulate");

    group.bench_function("accumulate 100 mints validated", |b| {
        b.iter(|| {
            let mut map = AccumulatorMap::new(params.clone());
            for coin in &coins {
                map.accumulate(black_box(coin), false).unwrap();
            }
            map.get_checkpoint()
        });
    });

    group.bench_function("accumulate 100 mints unvalidated", |b| {
        b.iter(|| {
            let mut map = AccumulatorMap::new(params.clone());
            for coin in &coins {
                map.accumulate(black_box(coin), true).unwrap();
            }
            map.get_checkpoint()
        });
    });

    group.finish();
}

pub fn witness_benchmark(c: &mut Criterion) {
    let params = ZerocoinParams::for_network("regtest");
    let coins = mints(50, CoinDenomination::OneHundred);
    let target = coins[0].clone();

    let mut accumulator = Accumulator::new(params, CoinDenomination::OneHundred);
    let mut witness = AccumulatorWitness::new(&accumulator, target.clone());
    for coin in &coins {
        accumulator.accumulate(coin).unwrap();
        witness.add_element(coin).unwrap();
    }
    assert!(witness.verify(&accumulator, &target));

    let mut group = c.benchmark_group("witness");

    group.bench_function("verify witness", |b| {
        b.iter(|| assert!(witness.verify(black_box(&accumulator), &target)));
    });

    let empty = Accumulator::new(accumulator.params().clone(), CoinDenomination::OneHundred);
    group.bench_function("fold 50 mints into witness", |b| {
        b.iter(|| {
            let mut w = AccumulatorWitness::new(&empty, target.clone());
            for coin in &coins {
                w.add_raw_value(coin.value());
            }
            w
        });
    });

    group.finish();
}

pub fn deterministic_mint_benchmark(c: &mut Criterion) {
    let params = ZerocoinParams::for_network("regtest");
    let mut group = c.benchmark_group("deterministic");
    group.sample_size(20);

    group.bench_function("derive mint", |b| {
        let mut count = 0;
        b.iter(|| {
            let seed = get_zerocoin_seed(&[7; 32], count);
            count += 1;
            seed_to_zerocoin(&seed, &params).unwrap()
        });
    });

    group.finish();
}

pub fn checkpoint_benchmark(c: &mut Criterion) {
    let config = ChainConfig::new("regtest");
    let genesis = config.genesis_block();
    let state = ChainState::new(Stores::memory(), config, &genesis).unwrap();
    let coins = mints(30, CoinDenomination::Ten);

    // Tip at 39 so the next block carries a new checkpoint
    for height in 1..=39u32 {
        let txs = if height % 3 == 0 && height > 9 {
            let mut tx = Transaction::new(
                vec![TxIn::new(OutPoint::new(Hash256([height as u8; 32]), 0))],
                vec![TxOut::new_zerocoin_mint(&coins[height as usize % coins.len()])],
            );
            tx.compute_hash();
            vec![tx]
        } else {
            vec![]
        };

        let checkpoint = state.next_accumulator_checkpoint().unwrap();
        let block = Block::new(state.tip_hash(), height, checkpoint, txs);
        state.connect_block(&block).unwrap();
    }

    let mut group = c.benchmark_group("checkpoint");
    group.bench_function("calculate checkpoint at height 40", |b| {
        b.iter(|| state.next_accumulator_checkpoint().unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    accumulate_benchmark,
    witness_benchmark,
    deterministic_mint_benchmark,
    checkpoint_benchmark
);
criterion_main!(benches);
