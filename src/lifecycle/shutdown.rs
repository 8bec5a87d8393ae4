//! Shutdown coordination.

use tokio::sync::broadcast;

/// Broadcasts a single stop request to every subscriber.
///
/// The serving loop polls its receiver once per iteration, so a trigger
/// takes effect within one accept poll interval.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Ask every subscriber to stop. Harmless with no subscribers.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// True once a stop request has been sent or the sender is gone.
pub fn requested(rx: &mut broadcast::Receiver<()>) -> bool {
    use broadcast::error::TryRecvError;
    match rx.try_recv() {
        Ok(()) | Err(TryRecvError::Closed) | Err(TryRecvError::Lagged(_)) => true,
        Err(TryRecvError::Empty) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert!(!requested(&mut a));

        shutdown.trigger();
        assert!(requested(&mut a));
        assert!(requested(&mut b));
    }

    #[test]
    fn dropped_sender_counts_as_stop() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        drop(shutdown);
        assert!(requested(&mut rx));
    }
}
