//! Clock Abstraction
//!
//! Every time read in the sink goes through `SinkClock`, so flush timing
//! and object naming can be driven by virtual time in tests.

use chrono::{DateTime, Local, NaiveDate, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Timestamp in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Calendar date of this instant in UTC
    pub fn utc_date(&self) -> NaiveDate {
        let ms = i64::try_from(self.0).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp_millis(ms)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .date_naive()
    }
}

/// Clock trait for time operations
///
/// Implementations:
/// - `ProductionClock`: wall time, process-local calendar date
/// - `SimulatedClock`: virtual time, UTC calendar date
pub trait SinkClock: Send + Sync + Clone + 'static {
    /// Get current time
    fn now(&self) -> Timestamp;

    /// Date used to name objects flushed now
    fn today(&self) -> NaiveDate {
        self.now().utc_date()
    }
}

/// Production clock using real system time
#[derive(Clone)]
pub struct ProductionClock {
    start: Instant,
    start_millis: u64,
}

impl Default for ProductionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionClock {
    pub fn new() -> Self {
        ProductionClock {
            start: Instant::now(),
            start_millis: Utc::now().timestamp_millis().max(0) as u64,
        }
    }
}

impl SinkClock for ProductionClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.start.elapsed().as_millis() as u64;
        Timestamp(self.start_millis + elapsed)
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Simulated clock for deterministic testing
///
/// Time only advances when explicitly told to via `advance_ms()`.
/// Clones share the same virtual time.
#[derive(Clone)]
pub struct SimulatedClock {
    time_ms: Arc<AtomicU64>,
}

impl SimulatedClock {
    pub fn new(start_ms: u64) -> Self {
        SimulatedClock {
            time_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.time_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl SinkClock for SimulatedClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.time_ms.load(Ordering::SeqCst))
    }
}
