//! Per-shelf admission control.
//!
//! Each shelf's capacity is a pool of tokens in a pre-filled bounded
//! crossbeam channel. Holding a token is the sole right to insert into the
//! shared queue on behalf of that shelf. Blocked acquirers are queued by the
//! channel, and a token only sits in the channel while no receiver waits, so
//! a `try_acquire` can never overtake a blocked `acquire`: handoff is FIFO.

use crossbeam::channel::{Receiver, Sender, bounded};

pub(crate) struct Slots {
    token_tx: Sender<()>,
    token_rx: Receiver<()>,
    capacity: usize,
}

impl Slots {
    pub(crate) fn new(capacity: usize) -> Self {
        let (token_tx, token_rx) = bounded(capacity);
        for _ in 0..capacity {
            token_tx.send(()).expect("fill slot tokens");
        }
        Self {
            token_tx,
            token_rx,
            capacity,
        }
    }

    /// Take a token without waiting. Returns false when the shelf is full.
    pub(crate) fn try_acquire(&self) -> bool {
        self.token_rx.try_recv().is_ok()
    }

    /// Wait for a token indefinitely, or until `stop` fires or disconnects.
    /// Returns false without holding a token when interrupted.
    pub(crate) fn acquire(&self, stop: &Receiver<()>) -> bool {
        crossbeam::select! {
            recv(self.token_rx) -> token => token.is_ok(),
            recv(stop) -> _ => false,
        }
    }

    /// Return a token. Must pair with a successful acquire.
    pub(crate) fn release(&self) {
        let returned = self.token_tx.try_send(());
        debug_assert!(returned.is_ok(), "slot release without matching acquire");
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn available(&self) -> usize {
        self.token_rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::time::Duration;

    #[test]
    fn capacity_bounds_acquires() {
        let slots = Slots::new(2);
        assert_eq!(slots.capacity(), 2);
        assert!(slots.try_acquire());
        assert!(slots.try_acquire());
        assert!(!slots.try_acquire());
        assert_eq!(slots.available(), 0);

        slots.release();
        assert_eq!(slots.available(), 1);
        assert!(slots.try_acquire());
    }

    #[test]
    fn blocking_acquire_wakes_on_release() {
        let slots = std::sync::Arc::new(Slots::new(1));
        assert!(slots.try_acquire());

        let (_stop_tx, stop_rx) = unbounded::<()>();
        let waiter = {
            let slots = std::sync::Arc::clone(&slots);
            std::thread::spawn(move || slots.acquire(&stop_rx))
        };

        std::thread::sleep(Duration::from_millis(20));
        slots.release();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn blocking_acquire_aborts_on_stop() {
        let slots = std::sync::Arc::new(Slots::new(1));
        assert!(slots.try_acquire());

        let (stop_tx, stop_rx) = unbounded::<()>();
        let waiter = {
            let slots = std::sync::Arc::clone(&slots);
            std::thread::spawn(move || slots.acquire(&stop_rx))
        };

        drop(stop_tx);
        assert!(!waiter.join().unwrap());
        // The interrupted acquire holds nothing.
        assert_eq!(slots.available(), 0);
    }
}
