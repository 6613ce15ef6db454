//! RAII in-flight-request guard (spec §4.3): holding one keeps the
//! supervisor from being idle-TTL-reaped while a forward is in progress,
//! and releases its concurrency slot and activity counter on drop so every
//! exit path -- including cancellation and panics -- is accounted for.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

pub struct ReadyHandle {
    in_flight: Arc<AtomicU32>,
    // Held for the lifetime of the handle when the entry has a concurrency
    // limit; `None` for unlimited entries.
    _permit: Option<OwnedSemaphorePermit>,
}

impl ReadyHandle {
    pub(crate) fn new(in_flight: Arc<AtomicU32>, permit: Option<OwnedSemaphorePermit>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            in_flight,
            _permit: permit,
        }
    }
}

impl Drop for ReadyHandle {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_the_handle_decrements_in_flight() {
        let counter = Arc::new(AtomicU32::new(0));
        {
            let _handle = ReadyHandle::new(counter.clone(), None);
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
