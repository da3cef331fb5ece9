//! Wall-clock access for order value math.
//!
//! Every time-derived quantity on an order (remaining value, expiry
//! timestamp) reads the process clock through [`now_ms`], which consults a
//! swappable [`TimeSource`]. Tests install a controllable source so decay
//! scenarios are deterministic.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

fn time_source() -> &'static RwLock<Arc<dyn TimeSource>> {
    static SOURCE: OnceLock<RwLock<Arc<dyn TimeSource>>> = OnceLock::new();
    SOURCE.get_or_init(|| RwLock::new(Arc::new(SystemTimeSource)))
}

/// Current wall time in milliseconds from the installed source.
pub fn now_ms() -> u64 {
    let source = time_source().read().unwrap_or_else(|err| err.into_inner());
    source.now_ms()
}

#[cfg(any(test, feature = "test-harness"))]
static OVERRIDE_LOCK: OnceLock<std::sync::Mutex<()>> = OnceLock::new();

/// Restores the previous source when dropped.
///
/// Holds a process-wide lock so overriding tests are serialized against each
/// other; real-time tests belong in a separate test binary.
#[cfg(any(test, feature = "test-harness"))]
pub struct TimeSourceGuard {
    prev: Arc<dyn TimeSource>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

#[cfg(any(test, feature = "test-harness"))]
impl Drop for TimeSourceGuard {
    fn drop(&mut self) {
        let mut guard = time_source()
            .write()
            .unwrap_or_else(|err| err.into_inner());
        *guard = self.prev.clone();
    }
}

/// Install a replacement time source for the lifetime of the returned guard.
/// Only exists for test builds; a production build of the library keeps the
/// system clock.
#[cfg(any(test, feature = "test-harness"))]
pub fn set_time_source_for_tests(source: Arc<dyn TimeSource>) -> TimeSourceGuard {
    let lock = OVERRIDE_LOCK
        .get_or_init(|| std::sync::Mutex::new(()))
        .lock()
        .unwrap_or_else(|err| err.into_inner());
    let mut guard = time_source()
        .write()
        .unwrap_or_else(|err| err.into_inner());
    let prev = guard.clone();
    *guard = source;
    TimeSourceGuard { prev, _lock: lock }
}
