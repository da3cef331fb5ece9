//! Observer registration and fan-out.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use crate::core::Order;

use super::AddResult;

/// Listens to pod events. Called synchronously on the adding thread after a
/// successful add; implementations must not block and should offload real
/// work to their own executor.
pub trait ShelfPodObserver: Send + Sync {
    fn post_add_order(&self, order: &Order, result: &AddResult);
}

/// Registry with weakly consistent iteration: notification walks a snapshot,
/// so concurrent add/remove never aborts a fan-out and a just-removed
/// observer may still see one in-flight event.
pub(crate) struct ObserverRegistry {
    observers: RwLock<Vec<Arc<dyn ShelfPodObserver>>>,
}

impl ObserverRegistry {
    pub(crate) fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, observer: Arc<dyn ShelfPodObserver>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|err| err.into_inner());
        observers.push(observer);
        true
    }

    /// Remove by registration identity. Returns false when the observer was
    /// not registered.
    pub(crate) fn remove(&self, observer: &Arc<dyn ShelfPodObserver>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|err| err.into_inner());
        let before = observers.len();
        observers.retain(|registered| !Arc::ptr_eq(registered, observer));
        observers.len() != before
    }

    pub(crate) fn notify_add(&self, order: &Order, result: &AddResult) {
        let snapshot: Vec<_> = {
            let observers = self.observers.read().unwrap_or_else(|err| err.into_inner());
            observers.clone()
        };
        for observer in snapshot {
            // A panicking observer must not poison the add path or starve the
            // remaining observers.
            let outcome =
                catch_unwind(AssertUnwindSafe(|| observer.post_add_order(order, result)));
            if outcome.is_err() {
                tracing::warn!(order_id = %order.id(), "observer panicked in add notification");
            }
        }
    }
}
