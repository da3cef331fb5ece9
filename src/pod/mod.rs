//! The shelf pod: a concurrent bounded priority container over a fixed set
//! of temperature-controlled shelves.
//!
//! One expiry-ordered queue is shared by every shelf so the soonest-to-expire
//! order across the whole pod is always the head; per-shelf token pools bound
//! how much of the queue each shelf may occupy. Background workers promote
//! overflow orders home, retire expired ones and keep the watch sets current,
//! fed by a serialized update log.

mod expirer;
mod mover;
mod observer;
mod queue;
mod slots;
mod updates;

pub use observer::ShelfPodObserver;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, unbounded};
use thiserror::Error;

use crate::core::{Order, OrderState, Shelf, Temperature, time};

use expirer::run_expirer_loop;
use mover::run_mover_loop;
use queue::{DecayFactors, ExpiryKey, SharedQueue};
use slots::Slots;
use updates::{ShelfOp, UpdateEvent, UpdateRouter, run_updates_loop};

/// A shelf set must carry exactly one shelf per temperature, overflow
/// included, each with room for at least one order.
#[derive(Debug, Error)]
pub enum ShelfSetError {
    #[error("no shelf configured for the {0} temperature")]
    MissingShelf(Temperature),
    #[error("more than one shelf configured for the {0} temperature")]
    DuplicateShelf(Temperature),
    #[error("shelf {id} has zero capacity")]
    ZeroCapacity { id: String },
}

/// Outcome of an add: whether the order landed, its state when the call
/// returned, and the shelf that stored it (or last tried to).
#[derive(Clone, Debug, PartialEq)]
pub struct AddResult {
    pub added: bool,
    pub state: OrderState,
    pub shelf: Shelf,
}

enum StoreOutcome {
    Stored,
    CameExpired,
    NoSpace,
    /// The Created-to-stored CAS lost to a concurrent submitter.
    Raced,
}

/// Everything the pod's fast paths and workers share.
pub(crate) struct PodShared {
    shelves: Vec<Shelf>,
    by_temp: HashMap<Temperature, Shelf>,
    factors: DecayFactors,
    queue: SharedQueue,
    slots: HashMap<Temperature, Slots>,
    updates_tx: Sender<UpdateEvent>,
    observers: observer::ObserverRegistry,
}

impl PodShared {
    pub(crate) fn factors(&self) -> &DecayFactors {
        &self.factors
    }

    fn shelf(&self, temperature: Temperature) -> &Shelf {
        &self.by_temp[&temperature]
    }

    fn slots(&self, temperature: Temperature) -> &Slots {
        &self.slots[&temperature]
    }

    /// The shelf currently charged for this order. Asking about an order
    /// that is not shelved is a caller bug.
    fn shelf_temperature_of(&self, order: &Order) -> Temperature {
        match order.state() {
            OrderState::StoredInRegular => order.temperature(),
            OrderState::StoredInOverflow => Temperature::Overflow,
            state => panic!(
                "order {} is not on any shelf (state {state:?})",
                order.id()
            ),
        }
    }

    fn push_update(&self, order: Arc<Order>, op: ShelfOp) {
        // The receiver lives as long as the pod; a failed send only means
        // the pod is already being torn down.
        let _ = self.updates_tx.send(UpdateEvent { order, op });
    }

    fn add_result(&self, added: bool, order: &Order, attempted: Temperature) -> AddResult {
        AddResult {
            added,
            state: order.state(),
            shelf: self.shelf(attempted).clone(),
        }
    }

    fn try_store(&self, order: &Arc<Order>, target: Temperature) -> StoreOutcome {
        let factor = self.factors.for_temperature(target);
        if order.has_expired(factor) {
            return StoreOutcome::CameExpired;
        }
        let slots = self.slots(target);
        if !slots.try_acquire() {
            return StoreOutcome::NoSpace;
        }
        let stored = if target == Temperature::Overflow {
            OrderState::StoredInOverflow
        } else {
            OrderState::StoredInRegular
        };
        if order.compare_and_set(OrderState::Created, stored) {
            self.queue.insert(Arc::clone(order), target, factor);
            StoreOutcome::Stored
        } else {
            slots.release();
            StoreOutcome::Raced
        }
    }

    fn add_order(&self, order: Arc<Order>) -> AddResult {
        let native = order.temperature();
        let result = match self.try_store(&order, native) {
            StoreOutcome::Stored => self.add_result(true, &order, native),
            StoreOutcome::CameExpired => {
                order.set_state(OrderState::CameExpired);
                self.add_result(false, &order, native)
            }
            StoreOutcome::NoSpace | StoreOutcome::Raced => {
                match self.try_store(&order, Temperature::Overflow) {
                    StoreOutcome::Stored => self.add_result(true, &order, Temperature::Overflow),
                    StoreOutcome::CameExpired => {
                        order.set_state(OrderState::CameExpired);
                        self.add_result(false, &order, Temperature::Overflow)
                    }
                    StoreOutcome::NoSpace => {
                        order.set_state(OrderState::ExpiredOnNoSpace);
                        self.add_result(false, &order, Temperature::Overflow)
                    }
                    StoreOutcome::Raced => self.add_result(false, &order, Temperature::Overflow),
                }
            }
        };
        tracing::info!(
            order_id = %order.id(),
            added = result.added,
            state = ?result.state,
            shelf = %result.shelf.id(),
            "add order"
        );
        if result.added {
            self.push_update(Arc::clone(&order), ShelfOp::Add);
            self.observers.notify_add(&order, &result);
        }
        result
    }

    /// Promote an overflow-resident order to its native shelf. Blocks on the
    /// native shelf's slot pool until space frees or `stop` interrupts; an
    /// interrupted acquire holds nothing.
    pub(crate) fn move_order(&self, order: &Arc<Order>, stop: &Receiver<()>) -> bool {
        let native = order.temperature();
        let native_slots = self.slots(native);
        if !native_slots.acquire(stop) {
            return false;
        }
        // Dropping the order from the queue releases its overflow slot.
        if !self.remove_order(order) {
            native_slots.release();
            return false;
        }
        if order.compare_and_set(OrderState::StoredInOverflow, OrderState::StoredInRegular) {
            // Recorded only after the move committed, so native-shelf expiry
            // accounts for the decay already burned in overflow.
            let spent = time::now_ms().saturating_sub(order.created_at_ms());
            order.set_time_spent_on_overflow_ms(spent);
            self.queue
                .insert(Arc::clone(order), native, self.factors.for_temperature(native));
            self.push_update(Arc::clone(order), ShelfOp::Move);
            true
        } else {
            // Polled or expired by another thread in the window.
            native_slots.release();
            false
        }
    }

    fn remove_order(&self, order: &Order) -> bool {
        let Some(stored) = self.queue.remove(order) else {
            return false;
        };
        let shelf_temp = self.shelf_temperature_of(&stored);
        self.slots(shelf_temp).release();
        self.push_update(stored, ShelfOp::Remove);
        true
    }

    pub(crate) fn expire_order(&self, order: &Order) -> bool {
        let Some(stored) = self.queue.remove(order) else {
            return false;
        };
        let shelf_temp = self.shelf_temperature_of(&stored);
        stored.set_state(if shelf_temp == Temperature::Overflow {
            OrderState::ExpiredInOverflow
        } else {
            OrderState::ExpiredInRegular
        });
        self.slots(shelf_temp).release();
        self.push_update(stored, ShelfOp::Expire);
        true
    }

    fn poll_order(&self) -> Option<Arc<Order>> {
        loop {
            let order = self.queue.pop_first()?;
            let shelf_temp = self.shelf_temperature_of(&order);
            self.slots(shelf_temp).release();
            // Time passed between enqueue and this pop; never hand out waste.
            if order.has_expired(self.factors.for_temperature(shelf_temp)) {
                order.set_state(if shelf_temp == Temperature::Overflow {
                    OrderState::ExpiredInOverflow
                } else {
                    OrderState::ExpiredInRegular
                });
                self.push_update(order, ShelfOp::Expire);
                continue;
            }
            order.set_state(OrderState::PickedUpForDelivery);
            tracing::info!(order_id = %order.id(), "order polled for delivery");
            self.push_update(Arc::clone(&order), ShelfOp::Poll);
            return Some(order);
        }
    }

    fn list_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .queue
            .snapshot()
            .iter()
            .map(|order| order.deep_copy())
            .filter(|copy| copy.state().is_shelved())
            .collect();
        orders.sort_by_key(|copy| ExpiryKey::capture(copy, self.factors.current(copy)));
        orders
    }
}

struct WorkerSet {
    stop_tx: Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

/// The public handle. Construction starts no threads; workers launch in
/// [`ShelfPod::start_background_activities`] so they can never observe a
/// partially built pod.
pub struct ShelfPod {
    shared: Arc<PodShared>,
    updates_rx: Receiver<UpdateEvent>,
    workers: Mutex<Option<WorkerSet>>,
}

impl ShelfPod {
    pub fn new(shelves: Vec<Shelf>) -> Result<Self, ShelfSetError> {
        let mut by_temp: HashMap<Temperature, Shelf> = HashMap::new();
        for shelf in &shelves {
            if shelf.capacity() == 0 {
                return Err(ShelfSetError::ZeroCapacity {
                    id: shelf.id().to_string(),
                });
            }
            if by_temp.insert(shelf.temperature(), shelf.clone()).is_some() {
                return Err(ShelfSetError::DuplicateShelf(shelf.temperature()));
            }
        }
        for temperature in Temperature::ALL {
            if !by_temp.contains_key(&temperature) {
                return Err(ShelfSetError::MissingShelf(temperature));
            }
        }

        let factors = DecayFactors::from_shelves(&shelves);
        let slots = shelves
            .iter()
            .map(|shelf| (shelf.temperature(), Slots::new(shelf.capacity())))
            .collect();
        let (updates_tx, updates_rx) = unbounded();

        Ok(Self {
            shared: Arc::new(PodShared {
                shelves,
                by_temp,
                factors,
                queue: SharedQueue::new(),
                slots,
                updates_tx,
                observers: observer::ObserverRegistry::new(),
            }),
            updates_rx,
            workers: Mutex::new(None),
        })
    }

    pub fn get_shelves(&self) -> &[Shelf] {
        &self.shared.shelves
    }

    /// Place an order: native shelf first, overflow as fallback. Non-blocking;
    /// a full pod answers through the result, never by waiting or erroring.
    /// The order must be freshly created.
    pub fn add_order(&self, order: Arc<Order>) -> AddResult {
        self.shared.add_order(order)
    }

    /// Hand out the soonest-to-expire still-valid order, or `None` when the
    /// pod holds nothing deliverable.
    pub fn poll_order(&self) -> Option<Arc<Order>> {
        self.shared.poll_order()
    }

    /// Drop an order from the pod, freeing its slot. Utility hook; the
    /// promotion path uses it internally.
    pub fn remove_order(&self, order: &Order) -> bool {
        self.shared.remove_order(order)
    }

    /// Detached, expiry-ordered snapshot of everything currently shelved.
    pub fn list_orders(&self) -> Vec<Order> {
        self.shared.list_orders()
    }

    pub fn add_observer(&self, observer: Arc<dyn ShelfPodObserver>) -> bool {
        self.shared.observers.add(observer)
    }

    pub fn remove_observer(&self, observer: &Arc<dyn ShelfPodObserver>) -> bool {
        self.shared.observers.remove(observer)
    }

    /// Launch the movers (one per regular temperature), the expirer and the
    /// update dispatcher. Idempotent while running.
    pub fn start_background_activities(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(|err| err.into_inner());
        if workers.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = unbounded::<()>();
        let (expirer_tx, expirer_rx) = unbounded();
        let mut mover_txs = HashMap::new();
        let mut handles = Vec::new();

        for temperature in Temperature::REGULAR {
            let (mover_tx, mover_rx) = unbounded();
            mover_txs.insert(temperature, mover_tx);
            let shared = Arc::clone(&self.shared);
            let stop = stop_rx.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("shelfpod-mover-{temperature}"))
                    .spawn(move || run_mover_loop(shared, temperature, mover_rx, stop))
                    .expect("spawn mover worker"),
            );
        }

        {
            let shared = Arc::clone(&self.shared);
            let stop = stop_rx.clone();
            handles.push(
                std::thread::Builder::new()
                    .name("shelfpod-expirer".to_string())
                    .spawn(move || run_expirer_loop(shared, expirer_rx, stop))
                    .expect("spawn expirer worker"),
            );
        }

        {
            let router = UpdateRouter::new(self.shared.factors.clone(), expirer_tx, mover_txs);
            let events = self.updates_rx.clone();
            let stop = stop_rx.clone();
            handles.push(
                std::thread::Builder::new()
                    .name("shelfpod-updates".to_string())
                    .spawn(move || run_updates_loop(events, stop, router))
                    .expect("spawn update dispatcher"),
            );
        }

        *workers = Some(WorkerSet { stop_tx, handles });
    }

    /// Interrupt and join every worker. Orders left on the shelves simply
    /// stop being served; there is no flush.
    pub fn stop_background_activities(&self) {
        let set = {
            let mut workers = self.workers.lock().unwrap_or_else(|err| err.into_inner());
            workers.take()
        };
        let Some(WorkerSet { stop_tx, handles }) = set else {
            return;
        };
        drop(stop_tx);
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("pod worker panicked during shutdown");
            }
        }
    }
}

impl Drop for ShelfPod {
    fn drop(&mut self) {
        self.stop_background_activities();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::{TestClock, order, shelf_set};

    #[test]
    fn rejects_incomplete_shelf_sets() {
        let only_hot = vec![Shelf::new("hot", 1, Temperature::Hot, 1.0)];
        assert!(matches!(
            ShelfPod::new(only_hot),
            Err(ShelfSetError::MissingShelf(_))
        ));

        let mut doubled = shelf_set(1, 1, 1.0, 2.0);
        doubled.push(Shelf::new("hot-2", 1, Temperature::Hot, 1.0));
        assert!(matches!(
            ShelfPod::new(doubled),
            Err(ShelfSetError::DuplicateShelf(Temperature::Hot))
        ));

        let mut empty = shelf_set(1, 1, 1.0, 2.0);
        empty[0] = Shelf::new("hot", 0, Temperature::Hot, 1.0);
        assert!(matches!(
            ShelfPod::new(empty),
            Err(ShelfSetError::ZeroCapacity { .. })
        ));
    }

    #[test]
    fn add_stores_in_native_shelf_first() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(1, 1, 1.0, 2.0)).unwrap();

        let hot = order("o-1", Temperature::Hot, 300, 0.45);
        let result = pod.add_order(Arc::clone(&hot));
        assert!(result.added);
        assert_eq!(result.state, OrderState::StoredInRegular);
        assert_eq!(result.shelf.temperature(), Temperature::Hot);
    }

    #[test]
    fn full_native_shelf_spills_to_overflow() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(1, 1, 1.0, 2.0)).unwrap();

        pod.add_order(order("o-1", Temperature::Hot, 300, 0.45));
        let result = pod.add_order(order("o-2", Temperature::Hot, 300, 0.45));
        assert!(result.added);
        assert_eq!(result.state, OrderState::StoredInOverflow);
        assert_eq!(result.shelf.temperature(), Temperature::Overflow);
    }

    #[test]
    fn exhausted_pod_expires_on_no_space() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(1, 1, 1.0, 2.0)).unwrap();

        pod.add_order(order("o-1", Temperature::Hot, 300, 0.45));
        pod.add_order(order("o-2", Temperature::Hot, 300, 0.45));
        let rejected = order("o-3", Temperature::Hot, 300, 0.45);
        let result = pod.add_order(Arc::clone(&rejected));
        assert!(!result.added);
        assert_eq!(result.state, OrderState::ExpiredOnNoSpace);
        assert_eq!(rejected.state(), OrderState::ExpiredOnNoSpace);
    }

    #[test]
    fn dead_on_arrival_orders_come_expired() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(1, 1, 1.0, 2.0)).unwrap();

        let stale = order("o-1", Temperature::Hot, 0, 0.45);
        let result = pod.add_order(Arc::clone(&stale));
        assert!(!result.added);
        assert_eq!(result.state, OrderState::CameExpired);
        assert_eq!(result.shelf.temperature(), Temperature::Hot);
    }

    #[test]
    fn poll_returns_soonest_expiry_and_frees_the_slot() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(2, 1, 1.0, 2.0)).unwrap();

        pod.add_order(order("b", Temperature::Hot, 300, 0.45));
        pod.add_order(order("a", Temperature::Hot, 200, 0.45));

        let first = pod.poll_order().unwrap();
        assert_eq!(first.id(), "a");
        assert_eq!(first.state(), OrderState::PickedUpForDelivery);
        let second = pod.poll_order().unwrap();
        assert_eq!(second.id(), "b");
        assert!(pod.poll_order().is_none());

        // Freed slots admit new orders again.
        let refill = pod.add_order(order("c", Temperature::Hot, 300, 0.45));
        assert_eq!(refill.state, OrderState::StoredInRegular);
    }

    #[test]
    fn poll_retires_orders_that_expired_on_the_shelf() {
        let (clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(2, 1, 1.0, 2.0)).unwrap();

        let short = order("a", Temperature::Hot, 1, 0.0);
        pod.add_order(Arc::clone(&short));
        pod.add_order(order("b", Temperature::Hot, 300, 0.0));

        clock.advance_ms(2_000);
        let delivered = pod.poll_order().unwrap();
        assert_eq!(delivered.id(), "b");
        assert_eq!(short.state(), OrderState::ExpiredInRegular);
    }

    #[test]
    fn expire_order_frees_the_right_slot() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(1, 1, 1.0, 2.0)).unwrap();

        let native = order("o-1", Temperature::Hot, 300, 0.45);
        let spilled = order("o-2", Temperature::Hot, 300, 0.45);
        pod.add_order(Arc::clone(&native));
        pod.add_order(Arc::clone(&spilled));

        assert!(pod.shared.expire_order(&spilled));
        assert_eq!(spilled.state(), OrderState::ExpiredInOverflow);
        assert!(!pod.shared.expire_order(&spilled));

        // The overflow slot opened up again.
        let refill = pod.add_order(order("o-3", Temperature::Hot, 300, 0.45));
        assert_eq!(refill.state, OrderState::StoredInOverflow);
    }

    #[test]
    fn move_order_promotes_and_accounts_overflow_time() {
        let (clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(1, 1, 1.0, 2.0)).unwrap();

        let first = order("o-1", Temperature::Hot, 300, 0.45);
        let second = order("o-2", Temperature::Hot, 300, 0.45);
        pod.add_order(Arc::clone(&first));
        pod.add_order(Arc::clone(&second));
        assert_eq!(second.state(), OrderState::StoredInOverflow);

        clock.advance_ms(1_500);
        assert!(pod.poll_order().is_some());

        let (_stop_tx, stop_rx) = unbounded::<()>();
        assert!(pod.shared.move_order(&second, &stop_rx));
        assert_eq!(second.state(), OrderState::StoredInRegular);
        assert_eq!(second.time_spent_on_overflow_ms(), 1_500);

        let promoted = pod.poll_order().unwrap();
        assert_eq!(promoted.id(), "o-2");
        assert_eq!(promoted.state(), OrderState::PickedUpForDelivery);
    }

    #[test]
    fn move_order_backs_off_when_the_order_is_gone() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(1, 1, 1.0, 2.0)).unwrap();

        let first = order("o-1", Temperature::Hot, 300, 0.45);
        let second = order("o-2", Temperature::Hot, 300, 0.45);
        pod.add_order(Arc::clone(&first));
        pod.add_order(Arc::clone(&second));

        // Deliver both; the overflow entry is gone before the mover acts.
        pod.poll_order().unwrap();
        pod.poll_order().unwrap();

        let (_stop_tx, stop_rx) = unbounded::<()>();
        assert!(!pod.shared.move_order(&second, &stop_rx));
        // The aborted move returned the native slot it had acquired.
        let refill = pod.add_order(order("o-3", Temperature::Hot, 300, 0.45));
        assert_eq!(refill.state, OrderState::StoredInRegular);
    }

    #[test]
    fn list_orders_snapshots_in_expiry_order() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(2, 2, 1.0, 2.0)).unwrap();

        pod.add_order(order("b", Temperature::Hot, 300, 0.45));
        pod.add_order(order("a", Temperature::Cold, 200, 0.45));

        let listed = pod.list_orders();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id(), "a");
        assert_eq!(listed[1].id(), "b");

        // Mutating the copies does not touch the pod.
        listed[0].set_state(OrderState::PickedUpForDelivery);
        assert_eq!(pod.list_orders().len(), 2);
    }

    #[test]
    fn capacity_invariant_holds_between_operations() {
        let (_clock, _guard) = TestClock::install(1_000_000);
        let pod = ShelfPod::new(shelf_set(2, 2, 1.0, 2.0)).unwrap();

        for i in 0..6 {
            pod.add_order(order(&format!("o-{i}"), Temperature::Hot, 300, 0.45));
        }
        for temperature in [Temperature::Hot, Temperature::Overflow] {
            let shelved = pod
                .list_orders()
                .iter()
                .filter(|o| {
                    pod.shared.shelf_temperature_of(o) == temperature
                })
                .count();
            let slots = pod.shared.slots(temperature);
            assert_eq!(slots.capacity() - slots.available(), shelved);
        }
    }
}
