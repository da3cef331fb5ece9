//! The shared expiry-ordered queue and its comparator.
//!
//! The queue is lock-striped: every shelf owns one expiry-ordered stripe, so
//! producers and consumers working different shelves never contend on a
//! common lock, and no operation ever holds more than one stripe lock at a
//! time. A pop merges the stripe heads to find the pod-wide soonest expiry.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{Order, OrderState, Shelf, Temperature};

const STRIPE_COUNT: usize = 4;

fn stripe_index(temperature: Temperature) -> usize {
    match temperature {
        Temperature::Hot => 0,
        Temperature::Cold => 1,
        Temperature::Frozen => 2,
        Temperature::Overflow => 3,
    }
}

/// Decay-rate factors per temperature, captured from the pod's immutable
/// shelf set so ordering never consults live shelf state.
#[derive(Clone, Debug)]
pub(crate) struct DecayFactors {
    factors: [f64; STRIPE_COUNT],
}

impl DecayFactors {
    pub(crate) fn from_shelves(shelves: &[Shelf]) -> Self {
        let mut factors = [1.0; STRIPE_COUNT];
        for shelf in shelves {
            factors[stripe_index(shelf.temperature())] = shelf.decay_rate_factor();
        }
        Self { factors }
    }

    pub(crate) fn for_temperature(&self, temperature: Temperature) -> f64 {
        self.factors[stripe_index(temperature)]
    }

    /// The factor of the shelf currently holding `order`: overflow while the
    /// state says so, the native shelf otherwise.
    pub(crate) fn current(&self, order: &Order) -> f64 {
        if order.state() == OrderState::StoredInOverflow {
            self.for_temperature(Temperature::Overflow)
        } else {
            self.for_temperature(order.temperature())
        }
    }
}

/// Pop priority: soonest expiry first, ties broken by id so the order is
/// total and stable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ExpiryKey {
    pub(crate) expiry_at_ms: i64,
    pub(crate) id: String,
}

impl ExpiryKey {
    /// Capture the key by value at a point in time; entries keep the key they
    /// were inserted with rather than re-querying the clock.
    pub(crate) fn capture(order: &Order, decay_rate_factor: f64) -> Self {
        Self {
            expiry_at_ms: order.expiry_at_ms(decay_rate_factor),
            id: order.id().to_string(),
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    key: ExpiryKey,
    order: Arc<Order>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

struct Stripe {
    entries: Mutex<BTreeSet<Entry>>,
}

impl Stripe {
    fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeSet::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<Entry>> {
        self.entries.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// All currently-shelved orders, one stripe per shelf. The logical structure
/// is still a single priority queue: a pop always yields the minimum key
/// across every stripe.
pub(crate) struct SharedQueue {
    stripes: [Stripe; STRIPE_COUNT],
}

impl SharedQueue {
    pub(crate) fn new() -> Self {
        Self {
            stripes: std::array::from_fn(|_| Stripe::new()),
        }
    }

    /// Insert on behalf of `shelf`; the caller holds that shelf's permit.
    pub(crate) fn insert(&self, order: Arc<Order>, shelf: Temperature, decay_rate_factor: f64) {
        let key = ExpiryKey::capture(&order, decay_rate_factor);
        let mut entries = self.stripes[stripe_index(shelf)].lock();
        entries.insert(Entry { key, order });
    }

    /// The soonest-to-expire order across every stripe, removed from its
    /// stripe. Scans the heads one stripe lock at a time, then re-takes the
    /// winning stripe; if its head moved in between, the scan restarts.
    pub(crate) fn pop_first(&self) -> Option<Arc<Order>> {
        loop {
            let mut best: Option<(usize, ExpiryKey)> = None;
            for (index, stripe) in self.stripes.iter().enumerate() {
                let entries = stripe.lock();
                if let Some(entry) = entries.first() {
                    let beats = match &best {
                        Some((_, key)) => entry.key < *key,
                        None => true,
                    };
                    if beats {
                        best = Some((index, entry.key.clone()));
                    }
                }
            }
            let (index, key) = best?;

            let mut entries = self.stripes[index].lock();
            let head_matches = entries.first().is_some_and(|entry| entry.key == key);
            if head_matches {
                if let Some(entry) = entries.pop_first() {
                    return Some(entry.order);
                }
            }
            // Lost the head to another popper or remover; rescan.
        }
    }

    /// Remove by order equality. The state names the home stripe while the
    /// order is shelved; a transition mid-flight can leave it elsewhere, so a
    /// miss falls back to sweeping the remaining stripes.
    pub(crate) fn remove(&self, order: &Order) -> Option<Arc<Order>> {
        let hinted = stripe_hint(order);
        if let Some(removed) = self.remove_from(hinted, order) {
            return Some(removed);
        }
        for index in 0..STRIPE_COUNT {
            if index == hinted {
                continue;
            }
            if let Some(removed) = self.remove_from(index, order) {
                return Some(removed);
            }
        }
        None
    }

    fn remove_from(&self, index: usize, order: &Order) -> Option<Arc<Order>> {
        let mut entries = self.stripes[index].lock();
        let found = entries
            .iter()
            .find(|entry| entry.order.as_ref() == order)
            .cloned()?;
        entries.remove(&found);
        Some(found.order)
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Order>> {
        let mut orders = Vec::new();
        for stripe in &self.stripes {
            let entries = stripe.lock();
            orders.extend(entries.iter().map(|entry| Arc::clone(&entry.order)));
        }
        orders
    }

    pub(crate) fn len(&self) -> usize {
        self.stripes.iter().map(|stripe| stripe.lock().len()).sum()
    }
}

fn stripe_hint(order: &Order) -> usize {
    if order.state() == OrderState::StoredInOverflow {
        stripe_index(Temperature::Overflow)
    } else {
        stripe_index(order.temperature())
    }
}
