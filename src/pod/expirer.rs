//! The delay-driven expirer worker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::core::{Order, time};

use super::PodShared;
use super::queue::ExpiryKey;

pub(crate) enum ExpirerCmd {
    /// Start watching an order. The deadline was computed by the update
    /// dispatcher with the decay factor of the shelf current at enqueue time.
    Watch {
        order: Arc<Order>,
        expiry_at_ms: i64,
    },
    Unwatch(Arc<Order>),
}

/// One worker covers every shelf: it sleeps until the earliest watched
/// deadline, retires whatever has fallen due, and folds in watch-set changes
/// as they arrive.
pub(crate) fn run_expirer_loop(
    pod: Arc<PodShared>,
    commands: Receiver<ExpirerCmd>,
    stop: Receiver<()>,
) {
    tracing::info!("expirer worker started");
    let mut watched: BTreeMap<ExpiryKey, Arc<Order>> = BTreeMap::new();

    loop {
        let now = time::now_ms() as i64;
        while watched
            .first_key_value()
            .is_some_and(|(key, _)| key.expiry_at_ms <= now)
        {
            let Some((_, order)) = watched.pop_first() else {
                break;
            };
            // Delivered or already-retired entries drain without effect.
            if order.state().is_terminal() {
                continue;
            }
            if pod.expire_order(&order) {
                tracing::info!(order_id = %order.id(), "expired order off the shelf");
            }
        }

        let tick = match watched.first_key_value().map(|(key, _)| key.expiry_at_ms) {
            Some(due_at_ms) => {
                let remaining = due_at_ms.saturating_sub(time::now_ms() as i64).max(0);
                crossbeam::channel::after(Duration::from_millis(remaining as u64))
            }
            None => crossbeam::channel::never(),
        };
        crossbeam::select! {
            recv(commands) -> cmd => match cmd {
                Ok(cmd) => apply(&mut watched, cmd),
                Err(_) => return,
            },
            recv(stop) -> _ => return,
            recv(tick) -> _ => {}
        }
    }
}

fn apply(watched: &mut BTreeMap<ExpiryKey, Arc<Order>>, cmd: ExpirerCmd) {
    match cmd {
        ExpirerCmd::Watch {
            order,
            expiry_at_ms,
        } => {
            let key = ExpiryKey {
                expiry_at_ms,
                id: order.id().to_string(),
            };
            watched.insert(key, order);
        }
        ExpirerCmd::Unwatch(order) => {
            let key = watched.iter().find_map(|(key, watched_order)| {
                (watched_order.as_ref() == order.as_ref()).then(|| key.clone())
            });
            if let Some(key) = key {
                watched.remove(&key);
            }
        }
    }
}
