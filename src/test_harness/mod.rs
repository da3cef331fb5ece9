//! Test support: a controllable clock and fixture builders.
//!
//! Not part of the service surface: the module only exists under the
//! `test-harness` feature (the integration suites enable it through the
//! dev-dependency on this crate) and in the crate's own test builds, so
//! production consumers can never swap the process clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::time::{TimeSource, TimeSourceGuard, set_time_source_for_tests};
use crate::core::{Order, Shelf, Temperature};

/// A wall clock that only moves when told to.
#[derive(Clone)]
pub struct TestClock {
    now: Arc<AtomicU64>,
}

impl TestClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Create a clock and install it as the process time source. Time stands
    /// still until advanced; the guard restores the real clock on drop.
    pub fn install(start_ms: u64) -> (TestClock, TimeSourceGuard) {
        let clock = TestClock::new(start_ms);
        let guard = set_time_source_for_tests(Arc::new(clock.clone()));
        (clock, guard)
    }

    pub fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl TimeSource for TestClock {
    fn now_ms(&self) -> u64 {
        self.now_ms()
    }
}

/// One shelf per regular temperature plus overflow, with uniform regular
/// capacity and factor.
pub fn shelf_set(
    regular_capacity: usize,
    overflow_capacity: usize,
    regular_factor: f64,
    overflow_factor: f64,
) -> Vec<Shelf> {
    let mut shelves: Vec<Shelf> = Temperature::REGULAR
        .iter()
        .map(|&temperature| {
            Shelf::new(
                format!("{temperature}-shelf"),
                regular_capacity,
                temperature,
                regular_factor,
            )
        })
        .collect();
    shelves.push(Shelf::new(
        "overflow-shelf",
        overflow_capacity,
        Temperature::Overflow,
        overflow_factor,
    ));
    shelves
}

pub fn order(
    id: &str,
    temperature: Temperature,
    shelf_life_secs: u32,
    decay_rate: f64,
) -> Arc<Order> {
    Arc::new(Order::new(id, "fixture", temperature, shelf_life_secs, decay_rate))
}
