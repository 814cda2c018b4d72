use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Cancellation for the in-flight mining attempt.
///
/// The miner registers the height it is working on; the ledger writer raises
/// the flag once that height is filled by someone else.
#[derive(Debug, Default)]
pub struct MiningSignal {
    current: Mutex<Option<(u64, Arc<AtomicBool>)>>,
}

impl MiningSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an attempt at `height` and return its cancel flag.
    pub fn begin(&self, height: u64) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        *self.current.lock() = Some((height, Arc::clone(&flag)));
        flag
    }

    pub fn finish(&self) {
        self.current.lock().take();
    }

    /// Cancel the attempt if its height is at or below `height`.
    pub fn cancel_through(&self, height: u64) -> bool {
        match &*self.current.lock() {
            Some((target, flag)) if *target <= height => {
                flag.store(true, Ordering::Relaxed);
                debug!(target_height = target, filled_height = height, "Cancelling mining attempt");
                true
            }
            _ => false,
        }
    }

    /// Cancel whatever is running.
    pub fn cancel_all(&self) {
        if let Some((_, flag)) = &*self.current.lock() {
            flag.store(true, Ordering::Relaxed);
        }
    }
}
