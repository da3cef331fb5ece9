//! Courier dispatch: listens for successful adds and polls the pod after a
//! random pickup delay, standing in for a real courier integration.

use std::collections::BinaryHeap;
use std::cmp::Reverse;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, unbounded};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::PickupConfig;
use crate::core::time;
use crate::pod::{AddResult, ShelfPod, ShelfPodObserver};

/// Owns the courier worker thread. Register [`Dispatcher::observer`] on the
/// pod to connect it; `stop` disconnects and joins.
pub struct Dispatcher {
    observer: Arc<CourierObserver>,
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    pub fn start(pod: Arc<ShelfPod>, delays: PickupConfig) -> Dispatcher {
        let (schedule_tx, schedule_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded::<()>();
        let handle = std::thread::Builder::new()
            .name("shelfpod-courier".to_string())
            .spawn(move || run_pickup_loop(pod, schedule_rx, stop_rx))
            .expect("spawn courier worker");
        Dispatcher {
            observer: Arc::new(CourierObserver {
                schedule_tx,
                delays,
                rng: Mutex::new(StdRng::from_entropy()),
            }),
            stop_tx,
            handle,
        }
    }

    /// The pod-facing half: a non-blocking observer that only enqueues a
    /// pickup deadline.
    pub fn observer(&self) -> Arc<dyn ShelfPodObserver> {
        Arc::clone(&self.observer) as Arc<dyn ShelfPodObserver>
    }

    pub fn stop(self) {
        drop(self.stop_tx);
        if self.handle.join().is_err() {
            tracing::warn!("courier worker panicked during shutdown");
        }
    }
}

struct CourierObserver {
    schedule_tx: Sender<u64>,
    delays: PickupConfig,
    rng: Mutex<StdRng>,
}

impl CourierObserver {
    fn draw_delay_secs(&self) -> u64 {
        let mut rng = self.rng.lock().unwrap_or_else(|err| err.into_inner());
        rng.gen_range(self.delays.min_delay_secs..=self.delays.max_delay_secs)
    }
}

impl ShelfPodObserver for CourierObserver {
    fn post_add_order(&self, order: &crate::core::Order, result: &AddResult) {
        if !result.added {
            return;
        }
        let delay_secs = self.draw_delay_secs();
        let due_at_ms = time::now_ms() + delay_secs * 1000;
        let _ = self.schedule_tx.send(due_at_ms);
        tracing::debug!(order_id = %order.id(), delay_secs, "courier dispatched");
    }
}

fn run_pickup_loop(pod: Arc<ShelfPod>, schedule: Receiver<u64>, stop: Receiver<()>) {
    tracing::info!("courier worker started");
    let mut due_times: BinaryHeap<Reverse<u64>> = BinaryHeap::new();
    loop {
        let now = time::now_ms();
        while due_times.peek().is_some_and(|Reverse(at)| *at <= now) {
            due_times.pop();
            match pod.poll_order() {
                Some(order) => {
                    tracing::info!(order_id = %order.id(), "courier picked up order");
                }
                None => tracing::debug!("courier arrived to an empty pod"),
            }
        }

        let tick = match due_times.peek() {
            Some(Reverse(at)) => {
                let wait = Duration::from_millis(at.saturating_sub(time::now_ms()));
                crossbeam::channel::after(wait)
            }
            None => crossbeam::channel::never(),
        };
        crossbeam::select! {
            recv(schedule) -> at => match at {
                Ok(at) => due_times.push(Reverse(at)),
                Err(_) => return,
            },
            recv(stop) -> _ => return,
            recv(tick) -> _ => {}
        }
    }
}
