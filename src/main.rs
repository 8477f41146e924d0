// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use log::*;
use std::thread;
use std::time::Duration;
use tracing_subscriber::prelude::*;
use veil::chain::backend::{DBInterface, Stores};
use veil::chain::{ChainConfig, ChainState};
use veil::global::*;
use veil::settings::SETTINGS;

#[cfg(not(windows))]
use signal_hook::consts::TERM_SIGNALS;
#[cfg(not(windows))]
use signal_hook::flag;

fn main() -> anyhow::Result<()> {
    #[cfg(not(windows))]
    for sig in TERM_SIGNALS {
        // A second term signal exits with code 1. This is a no-op until the
        // flag below is armed by the first one.
        flag::register_conditional_shutdown(*sig, 1, EXIT_SIGNAL.clone())?;
        flag::register(*sig, EXIT_SIGNAL.clone())?;
    }

    init_tracing()?;

    let verifier_threads = if SETTINGS.node.verifier_threads == 0 {
        num_cpus::get()
    } else {
        SETTINGS.node.verifier_threads as usize
    };

    // Anon input verification runs on the global rayon pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(verifier_threads)
        .build_global()?;

    let config = ChainConfig::from_settings();

    if SETTINGS.node.memory_only {
        info!(
            "Running Veil v{} on {} in memory only mode",
            env!("CARGO_PKG_VERSION"),
            config.network_name()
        );
        run(Stores::memory(), config)
    } else {
        info!(
            "Running Veil v{} on {}",
            env!("CARGO_PKG_VERSION"),
            config.network_name()
        );
        run_disk(config)
    }
}

#[cfg(feature = "disk")]
fn run_disk(config: ChainConfig) -> anyhow::Result<()> {
    let db = veil::chain::backend::disk::create_rocksdb_backend()
        .map_err(|err| anyhow::anyhow!("could not open database: {:?}", err))?;
    run(Stores::disk(db), config)
}

#[cfg(not(feature = "disk"))]
fn run_disk(_config: ChainConfig) -> anyhow::Result<()> {
    anyhow::bail!("built without disk support, set node.memory_only")
}

fn run<B: DBInterface>(stores: Stores<B>, config: ChainConfig) -> anyhow::Result<()> {
    let genesis = config.genesis_block();
    let state = match ChainState::open(stores, config, &genesis) {
        Ok(state) => state,
        Err(err) if shutdown_requested() => {
            info!("Shutdown requested while loading chain: {}", err);
            return Ok(());
        }
        Err(err) => anyhow::bail!("could not load chain: {}", err),
    };

    info!(
        "Active chain at height {} with tip {}",
        state.height(),
        state.tip_hash().to_hex()
    );

    // Blocks until the exit signal is received
    loop {
        if shutdown_requested() {
            break;
        }
        thread::sleep(Duration::from_millis(200));
    }

    info!(
        "Veil v{} shutting down with {} transactions in mempool",
        env!("CARGO_PKG_VERSION"),
        state.mempool.read().len()
    );
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
