//! Overflow-to-regular promotion workers, one per regular temperature.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam::channel::{Receiver, TryRecvError};

use crate::core::{Order, Temperature};

use super::PodShared;
use super::queue::ExpiryKey;

pub(crate) enum MoverCmd {
    Watch(Arc<Order>),
    Unwatch(Arc<Order>),
}

/// Watches the overflow-resident orders of one regular temperature, ordered
/// by expiry, and promotes the soonest-to-expire whenever the regular shelf
/// has a slot. The promotion path is the only blocking path into the pod, and
/// it runs here, on a dedicated thread.
pub(crate) fn run_mover_loop(
    pod: Arc<PodShared>,
    temperature: Temperature,
    commands: Receiver<MoverCmd>,
    stop: Receiver<()>,
) {
    tracing::info!(%temperature, "mover worker started");
    let overflow_factor = pod.factors().for_temperature(Temperature::Overflow);
    let mut watched: BTreeMap<ExpiryKey, Arc<Order>> = BTreeMap::new();

    loop {
        // Fold in whatever the update dispatcher sent since the last pass.
        loop {
            match commands.try_recv() {
                Ok(cmd) => apply(&mut watched, cmd, overflow_factor),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
        if matches!(stop.try_recv(), Err(TryRecvError::Disconnected)) {
            return;
        }

        match watched.pop_first() {
            Some((_, order)) => {
                // Entries can be stale; the move re-checks via CAS anyway.
                if order.state().is_terminal() {
                    continue;
                }
                if pod.move_order(&order, &stop) {
                    tracing::info!(
                        order_id = %order.id(),
                        %temperature,
                        "promoted order out of overflow"
                    );
                }
            }
            None => {
                crossbeam::select! {
                    recv(commands) -> cmd => match cmd {
                        Ok(cmd) => apply(&mut watched, cmd, overflow_factor),
                        Err(_) => return,
                    },
                    recv(stop) -> _ => return,
                }
            }
        }
    }
}

fn apply(watched: &mut BTreeMap<ExpiryKey, Arc<Order>>, cmd: MoverCmd, overflow_factor: f64) {
    match cmd {
        MoverCmd::Watch(order) => {
            let key = ExpiryKey::capture(&order, overflow_factor);
            watched.insert(key, order);
        }
        MoverCmd::Unwatch(order) => {
            let key = watched.iter().find_map(|(key, watched_order)| {
                (watched_order.as_ref() == order.as_ref()).then(|| key.clone())
            });
            if let Some(key) = key {
                watched.remove(&key);
            }
        }
    }
}
