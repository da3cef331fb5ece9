//! The update log and its single-consumer dispatcher.
//!
//! Every mutation of the shared queue appends an `(order, op)` event here.
//! One worker serializes the post-mutation bookkeeping that keeps the
//! expirer's delay set and the movers' watch sets current, so those sets
//! never need transactional coupling with the queue itself.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};

use crate::core::{Order, OrderState, Temperature};

use super::expirer::ExpirerCmd;
use super::mover::MoverCmd;
use super::queue::DecayFactors;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ShelfOp {
    Add,
    Move,
    Remove,
    Poll,
    Expire,
}

pub(crate) struct UpdateEvent {
    pub(crate) order: Arc<Order>,
    pub(crate) op: ShelfOp,
}

pub(crate) struct UpdateRouter {
    factors: DecayFactors,
    expirer_tx: Sender<ExpirerCmd>,
    mover_txs: HashMap<Temperature, Sender<MoverCmd>>,
}

impl UpdateRouter {
    pub(crate) fn new(
        factors: DecayFactors,
        expirer_tx: Sender<ExpirerCmd>,
        mover_txs: HashMap<Temperature, Sender<MoverCmd>>,
    ) -> Self {
        Self {
            factors,
            expirer_tx,
            mover_txs,
        }
    }

    pub(crate) fn route(&self, event: UpdateEvent) {
        self.maintain_expirer(&event);
        self.maintain_movers(&event);
    }

    fn maintain_expirer(&self, event: &UpdateEvent) {
        match event.op {
            ShelfOp::Add | ShelfOp::Move => {
                let factor = self.factors.current(&event.order);
                let expiry_at_ms = event.order.expiry_at_ms(factor);
                let _ = self.expirer_tx.send(ExpirerCmd::Watch {
                    order: Arc::clone(&event.order),
                    expiry_at_ms,
                });
            }
            ShelfOp::Remove | ShelfOp::Poll => {
                let _ = self
                    .expirer_tx
                    .send(ExpirerCmd::Unwatch(Arc::clone(&event.order)));
            }
            // The stale entry drains from the delay set and is dropped as
            // terminal there.
            ShelfOp::Expire => {}
        }
    }

    fn maintain_movers(&self, event: &UpdateEvent) {
        match event.op {
            ShelfOp::Add => {
                if event.order.state() == OrderState::StoredInOverflow
                    && let Some(tx) = self.mover_txs.get(&event.order.temperature())
                {
                    let _ = tx.send(MoverCmd::Watch(Arc::clone(&event.order)));
                }
            }
            ShelfOp::Expire | ShelfOp::Poll => {
                let state = event.order.state();
                if matches!(
                    state,
                    OrderState::ExpiredInOverflow | OrderState::PickedUpForDelivery
                ) && let Some(tx) = self.mover_txs.get(&event.order.temperature())
                {
                    let _ = tx.send(MoverCmd::Unwatch(Arc::clone(&event.order)));
                }
            }
            // The mover maintains its own set across move/remove.
            ShelfOp::Move | ShelfOp::Remove => {}
        }
    }
}

pub(crate) fn run_updates_loop(
    events: Receiver<UpdateEvent>,
    stop: Receiver<()>,
    router: UpdateRouter,
) {
    tracing::info!("update dispatcher started");
    loop {
        crossbeam::select! {
            recv(events) -> event => match event {
                Ok(event) => router.route(event),
                Err(_) => return,
            },
            recv(stop) -> _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Shelf;
    use crossbeam::channel::unbounded;

    fn router() -> (
        UpdateRouter,
        Receiver<ExpirerCmd>,
        Receiver<MoverCmd>,
    ) {
        let shelves = vec![
            Shelf::new("hot", 1, Temperature::Hot, 1.0),
            Shelf::new("cold", 1, Temperature::Cold, 1.0),
            Shelf::new("frozen", 1, Temperature::Frozen, 1.0),
            Shelf::new("overflow", 1, Temperature::Overflow, 2.0),
        ];
        let factors = DecayFactors::from_shelves(&shelves);
        let (expirer_tx, expirer_rx) = unbounded();
        let (hot_tx, hot_rx) = unbounded();
        let mut mover_txs = HashMap::new();
        mover_txs.insert(Temperature::Hot, hot_tx);
        (
            UpdateRouter::new(factors, expirer_tx, mover_txs),
            expirer_rx,
            hot_rx,
        )
    }

    fn overflow_order() -> Arc<Order> {
        let order = Arc::new(Order::new("o-1", "soup", Temperature::Hot, 300, 0.45));
        order.set_state(OrderState::StoredInOverflow);
        order
    }

    #[test]
    fn add_in_overflow_feeds_both_watch_sets() {
        let (router, expirer_rx, mover_rx) = router();
        router.route(UpdateEvent {
            order: overflow_order(),
            op: ShelfOp::Add,
        });

        assert!(matches!(
            expirer_rx.try_recv().unwrap(),
            ExpirerCmd::Watch { .. }
        ));
        assert!(matches!(mover_rx.try_recv().unwrap(), MoverCmd::Watch(_)));
    }

    #[test]
    fn add_in_regular_skips_the_mover() {
        let (router, expirer_rx, mover_rx) = router();
        let order = Arc::new(Order::new("o-1", "soup", Temperature::Hot, 300, 0.45));
        order.set_state(OrderState::StoredInRegular);
        router.route(UpdateEvent {
            order,
            op: ShelfOp::Add,
        });

        assert!(matches!(
            expirer_rx.try_recv().unwrap(),
            ExpirerCmd::Watch { .. }
        ));
        assert!(mover_rx.try_recv().is_err());
    }

    #[test]
    fn poll_unwatches_everywhere() {
        let (router, expirer_rx, mover_rx) = router();
        let order = overflow_order();
        order.set_state(OrderState::PickedUpForDelivery);
        router.route(UpdateEvent {
            order,
            op: ShelfOp::Poll,
        });

        assert!(matches!(
            expirer_rx.try_recv().unwrap(),
            ExpirerCmd::Unwatch(_)
        ));
        assert!(matches!(mover_rx.try_recv().unwrap(), MoverCmd::Unwatch(_)));
    }

    #[test]
    fn expire_leaves_delay_set_to_drain() {
        let (router, expirer_rx, mover_rx) = router();
        let order = overflow_order();
        order.set_state(OrderState::ExpiredInOverflow);
        router.route(UpdateEvent {
            order,
            op: ShelfOp::Expire,
        });

        assert!(expirer_rx.try_recv().is_err());
        assert!(matches!(mover_rx.try_recv().unwrap(), MoverCmd::Unwatch(_)));
    }

    #[test]
    fn move_and_remove_leave_mover_sets_alone() {
        let (router, expirer_rx, mover_rx) = router();
        let order = overflow_order();
        order.set_state(OrderState::StoredInRegular);
        router.route(UpdateEvent {
            order: Arc::clone(&order),
            op: ShelfOp::Move,
        });
        router.route(UpdateEvent {
            order,
            op: ShelfOp::Remove,
        });

        assert!(matches!(
            expirer_rx.try_recv().unwrap(),
            ExpirerCmd::Watch { .. }
        ));
        assert!(matches!(
            expirer_rx.try_recv().unwrap(),
            ExpirerCmd::Unwatch(_)
        ));
        assert!(mover_rx.try_recv().is_err());
    }
}
