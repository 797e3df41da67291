//! The scheduler's cancellation flag.
//!
//! `Send`/`Sync`-capable because the `bt2` binary installs a `ctrlc` signal
//! handler that sets this flag from a thread distinct from the single
//! cooperative driver thread — the core itself spawns no other threads, so
//! this is the one place two threads legitimately touch shared state, and
//! it is a single relaxed atomic flag, nothing else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Interrupter(Arc<AtomicBool>);

impl Interrupter {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
