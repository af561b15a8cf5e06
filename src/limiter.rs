use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_CONCURRENCY: usize = 30;

/// Caps how many detail-page fetches are in flight at once.
/// Waiters are served in FIFO order.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    slots: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

/// A held slot. Dropping it hands the slot back.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits (non-blocking) until a slot is free. Fails only if the
    /// underlying semaphore was closed.
    pub async fn acquire(&self) -> Result<LimiterPermit, AcquireError> {
        let permit = Arc::clone(&self.slots).acquire_owned().await?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(LimiterPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl LimiterPermit {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
