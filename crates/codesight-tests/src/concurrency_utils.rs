//! Concurrency instrumentation for codesight tests
//!
//! Used to prove that mutating cache operations never overlap: every service
//! call enters the meter, and the peak number of simultaneous entries must stay
//! at one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Tracks how many sections are active at once and the peak seen
#[derive(Debug, Clone, Default)]
pub struct InFlightMeter {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    entered: Arc<AtomicUsize>,
}

impl InFlightMeter {
    /// Create a meter with nothing in flight
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a section; it is left when the returned guard drops
    pub fn enter(&self) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.entered.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            current: Arc::clone(&self.current),
        }
    }

    /// Sections active right now
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously active sections
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total sections entered
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

/// Leaves its section on drop
#[derive(Debug)]
pub struct InFlightGuard {
    current: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}
