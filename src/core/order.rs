//! Orders and their lifecycle state machine.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use super::Temperature;
use super::time;

/// Lifecycle of an order while the pod is responsible for it.
///
/// Legal transitions:
///
/// ```text
/// Created -> CameExpired
/// Created -> ExpiredOnNoSpace
/// Created -> StoredInRegular  -> {ExpiredInRegular, PickedUpForDelivery}
/// Created -> StoredInOverflow -> {ExpiredInOverflow, PickedUpForDelivery,
///                                 StoredInRegular -> ...}
/// ```
///
/// The stored-to-stored promotion and every contended transition go through
/// [`Order::compare_and_set`]; that is what keeps the mover, the expirer and
/// concurrent pollers from delivering or expiring the same order twice.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderState {
    Created = 0,
    StoredInRegular = 1,
    StoredInOverflow = 2,
    ExpiredInRegular = 3,
    ExpiredInOverflow = 4,
    ExpiredOnNoSpace = 5,
    CameExpired = 6,
    PickedUpForDelivery = 7,
}

impl OrderState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => OrderState::Created,
            1 => OrderState::StoredInRegular,
            2 => OrderState::StoredInOverflow,
            3 => OrderState::ExpiredInRegular,
            4 => OrderState::ExpiredInOverflow,
            5 => OrderState::ExpiredOnNoSpace,
            6 => OrderState::CameExpired,
            7 => OrderState::PickedUpForDelivery,
            _ => unreachable!("invalid order state tag {raw}"),
        }
    }

    /// Terminal states permit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::ExpiredInRegular
                | OrderState::ExpiredInOverflow
                | OrderState::ExpiredOnNoSpace
                | OrderState::CameExpired
                | OrderState::PickedUpForDelivery
        )
    }

    /// Whether the order currently occupies a shelf slot.
    pub fn is_shelved(self) -> bool {
        matches!(
            self,
            OrderState::StoredInRegular | OrderState::StoredInOverflow
        )
    }
}

/// A prepared-food order with a finite, shelf-dependent lifetime.
///
/// The descriptive attributes are immutable; the state cell and the
/// overflow-time counter are the only mutable fields and both are atomic.
/// All value math takes the decay-rate factor of the shelf the caller has in
/// mind as a parameter: the order never knows which shelf holds it.
#[derive(Debug)]
pub struct Order {
    id: String,
    name: String,
    temperature: Temperature,
    shelf_life_secs: u32,
    decay_rate: f64,
    created_at_ms: u64,
    state: AtomicU8,
    time_spent_on_overflow_ms: AtomicU64,
}

impl Order {
    /// A fresh order in the `Created` state, stamped with the current wall
    /// time. `temperature` must be a regular category.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        temperature: Temperature,
        shelf_life_secs: u32,
        decay_rate: f64,
    ) -> Self {
        debug_assert!(
            temperature.is_regular(),
            "orders never belong to the overflow category"
        );
        Self {
            id: id.into(),
            name: name.into(),
            temperature,
            shelf_life_secs,
            decay_rate,
            created_at_ms: time::now_ms(),
            state: AtomicU8::new(OrderState::Created as u8),
            time_spent_on_overflow_ms: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temperature(&self) -> Temperature {
        self.temperature
    }

    pub fn shelf_life_secs(&self) -> u32 {
        self.shelf_life_secs
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn state(&self) -> OrderState {
        OrderState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: OrderState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Transition `old -> new` iff the cell still holds `old`.
    pub fn compare_and_set(&self, old: OrderState, new: OrderState) -> bool {
        self.state
            .compare_exchange(old as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn time_spent_on_overflow_ms(&self) -> u64 {
        self.time_spent_on_overflow_ms.load(Ordering::Acquire)
    }

    /// Written once, by the successful promotion out of overflow.
    pub fn set_time_spent_on_overflow_ms(&self, spent_ms: u64) {
        self.time_spent_on_overflow_ms
            .store(spent_ms, Ordering::Release);
    }

    fn age_ms(&self) -> u64 {
        time::now_ms().saturating_sub(self.created_at_ms)
    }

    /// Remaining value in milliseconds on a shelf with the given decay-rate
    /// factor. Non-positive means the order is waste.
    pub fn current_value_ms(&self, decay_rate_factor: f64) -> i64 {
        let age = self.age_ms() as f64;
        let value =
            (self.shelf_life_secs as f64 * 1000.0 - age) - self.decay_rate * decay_rate_factor * age;
        value as i64
    }

    pub fn has_expired(&self, decay_rate_factor: f64) -> bool {
        self.current_value_ms(decay_rate_factor) <= 0
    }

    /// Remaining value as a fraction of the intrinsic shelf life.
    pub fn normalized_value(&self, decay_rate_factor: f64) -> f64 {
        self.current_value_ms(decay_rate_factor) as f64 / (self.shelf_life_secs as f64 * 1000.0)
    }

    /// Wall-clock expiry under the given factor. Time already burned in
    /// overflow is subtracted so a promotion never refreshes elapsed decay.
    pub fn expiry_at_ms(&self, decay_rate_factor: f64) -> i64 {
        self.created_at_ms as i64 + self.current_value_ms(decay_rate_factor)
            - self.time_spent_on_overflow_ms() as i64
    }

    /// Detached snapshot, including the state at the moment of copying.
    /// Mutating the copy has no effect on the live order.
    pub fn deep_copy(&self) -> Order {
        Order {
            id: self.id.clone(),
            name: self.name.clone(),
            temperature: self.temperature,
            shelf_life_secs: self.shelf_life_secs,
            decay_rate: self.decay_rate,
            created_at_ms: self.created_at_ms,
            state: AtomicU8::new(self.state.load(Ordering::Acquire)),
            time_spent_on_overflow_ms: AtomicU64::new(self.time_spent_on_overflow_ms()),
        }
    }
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.temperature == other.temperature
            && self.shelf_life_secs == other.shelf_life_secs
    }
}

impl Eq for Order {}

impl Hash for Order {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.name.hash(state);
        self.temperature.hash(state);
        self.shelf_life_secs.hash(state);
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.id, self.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::TestClock;

    #[test]
    fn order_attributes() {
        let order = Order::new("o-1", "banana split", Temperature::Frozen, 300, 0.45);
        assert_eq!(order.id(), "o-1");
        assert_eq!(order.name(), "banana split");
        assert_eq!(order.temperature(), Temperature::Frozen);
        assert_eq!(order.shelf_life_secs(), 300);
        assert_eq!(order.decay_rate(), 0.45);
        assert_eq!(order.state(), OrderState::Created);
        assert_eq!(order.time_spent_on_overflow_ms(), 0);
    }

    #[test]
    fn value_decays_with_age_and_factor() {
        let (clock, _guard) = TestClock::install(1_000_000);
        let order = Order::new("o-1", "ramen", Temperature::Hot, 300, 0.45);

        assert_eq!(order.current_value_ms(1.0), 300_000);

        clock.advance_ms(1_000);
        // 300_000 - 1_000 - 0.45 * 1 * 1_000
        assert_eq!(order.current_value_ms(1.0), 298_550);
        // 300_000 - 1_000 - 0.45 * 2 * 1_000
        assert_eq!(order.current_value_ms(2.0), 298_100);
        assert!(order.normalized_value(1.0) > 0.99);
    }

    #[test]
    fn zero_shelf_life_is_expired_at_creation() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let order = Order::new("o-1", "ice", Temperature::Cold, 0, 0.45);
        assert!(order.has_expired(1.0));
    }

    #[test]
    fn expiry_subtracts_time_spent_on_overflow() {
        let (clock, _guard) = TestClock::install(1_000_000);
        let order = Order::new("o-1", "pad thai", Temperature::Hot, 10, 0.45);

        clock.advance_ms(2_000);
        let expiry_in_overflow = order.expiry_at_ms(2.0);

        // Promotion back to the native shelf must not push expiry later than
        // it was in overflow.
        order.set_time_spent_on_overflow_ms(2_000);
        let expiry_in_regular = order.expiry_at_ms(1.0);
        assert!(expiry_in_regular <= expiry_in_overflow);
    }

    #[test]
    fn compare_and_set_gates_transitions() {
        let order = Order::new("o-1", "curry", Temperature::Hot, 300, 0.45);
        assert!(order.compare_and_set(OrderState::Created, OrderState::StoredInOverflow));
        assert!(!order.compare_and_set(OrderState::Created, OrderState::StoredInRegular));
        assert!(order.compare_and_set(
            OrderState::StoredInOverflow,
            OrderState::PickedUpForDelivery
        ));
        assert!(order.state().is_terminal());
        // Terminal states are sticky: the stored-state CAS can never fire again.
        assert!(!order.compare_and_set(
            OrderState::StoredInOverflow,
            OrderState::StoredInRegular
        ));
        assert_eq!(order.state(), OrderState::PickedUpForDelivery);
    }

    #[test]
    fn deep_copy_detaches_state() {
        let order = Order::new("o-1", "pho", Temperature::Hot, 300, 0.45);
        order.set_state(OrderState::StoredInRegular);
        let copy = order.deep_copy();
        assert_eq!(copy.state(), OrderState::StoredInRegular);
        assert_eq!(copy.created_at_ms(), order.created_at_ms());

        order.set_state(OrderState::PickedUpForDelivery);
        assert_eq!(copy.state(), OrderState::StoredInRegular);
    }

    #[test]
    fn equality_covers_identity_fields_only() {
        let a = Order::new("o-1", "pho", Temperature::Hot, 300, 0.45);
        let b = Order::new("o-1", "pho", Temperature::Hot, 300, 0.99);
        let c = Order::new("o-2", "pho", Temperature::Hot, 300, 0.45);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
