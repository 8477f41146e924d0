// Copyright (c) 2022 Octavian Oncescu
// Copyright (c) 2022-2023 The Purplecoin Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use lazy_static::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

lazy_static! {
    /// Set when the process received a termination signal. Long running chain
    /// walks poll this on every iteration.
    pub static ref EXIT_SIGNAL: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// Returns true if a shutdown has been requested
#[inline]
pub fn shutdown_requested() -> bool {
    EXIT_SIGNAL.load(Ordering::Relaxed)
}

/// Request a shutdown of the node
pub fn request_shutdown() {
    EXIT_SIGNAL.store(true, Ordering::Relaxed);
}

/// Clears the shutdown flag. Only used when restarting subsystems in tests.
pub fn reset_shutdown() {
    EXIT_SIGNAL.store(false, Ordering::Relaxed);
}
