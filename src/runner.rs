//! End-to-end fulfillment run: config in, terminal census out.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::core::{Order, OrderState};
use crate::kitchen;
use crate::pickup::Dispatcher;
use crate::pod::ShelfPod;

/// Where every submitted order ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FulfillmentReport {
    pub submitted: usize,
    pub delivered: usize,
    pub expired_in_regular: usize,
    pub expired_in_overflow: usize,
    pub expired_on_no_space: usize,
    pub came_expired: usize,
    pub still_shelved: usize,
}

/// Drive the whole service against an orders file: pod plus background
/// workers, couriers attached, kitchen feeding at the configured Poisson
/// rate, then a drain window of the worst-case courier delay before an
/// orderly stop.
pub fn run(config: &Config, orders_path: &Path) -> crate::Result<FulfillmentReport> {
    config.validate()?;

    let shelves = config.build_shelves();
    for shelf in &shelves {
        tracing::info!(%shelf, "shelf available");
    }

    let pod = Arc::new(ShelfPod::new(shelves)?);
    pod.start_background_activities();
    let dispatcher = Dispatcher::start(Arc::clone(&pod), config.pickup);
    let observer = dispatcher.observer();
    pod.add_observer(Arc::clone(&observer));

    let inputs = kitchen::load_orders(orders_path)?;
    tracing::info!(orders = inputs.len(), "orders file loaded");
    let submitted =
        kitchen::submit_at_poisson_rate(&pod, inputs, config.intake.poisson_mean_per_second)?;

    // The last batch's couriers may arrive up to max_delay later.
    std::thread::sleep(Duration::from_secs(config.pickup.max_delay_secs + 2));

    pod.remove_observer(&observer);
    dispatcher.stop();
    pod.stop_background_activities();

    for order in &submitted {
        tracing::info!(order_id = %order.id(), state = ?order.state(), "order settled");
    }
    let report = tally(&submitted);
    tracing::info!(
        submitted = report.submitted,
        delivered = report.delivered,
        expired_in_regular = report.expired_in_regular,
        expired_in_overflow = report.expired_in_overflow,
        expired_on_no_space = report.expired_on_no_space,
        came_expired = report.came_expired,
        still_shelved = report.still_shelved,
        "fulfillment run complete"
    );
    Ok(report)
}

fn tally(orders: &[Arc<Order>]) -> FulfillmentReport {
    let mut report = FulfillmentReport {
        submitted: orders.len(),
        ..FulfillmentReport::default()
    };
    for order in orders {
        match order.state() {
            OrderState::PickedUpForDelivery => report.delivered += 1,
            OrderState::ExpiredInRegular => report.expired_in_regular += 1,
            OrderState::ExpiredInOverflow => report.expired_in_overflow += 1,
            OrderState::ExpiredOnNoSpace => report.expired_on_no_space += 1,
            OrderState::CameExpired => report.came_expired += 1,
            OrderState::Created | OrderState::StoredInRegular | OrderState::StoredInOverflow => {
                report.still_shelved += 1;
            }
        }
    }
    report
}
