//! Network availability signal
//!
//! Whatever decides that a usable network exists (interface discovery, a
//! user toggle, a test) publishes through [`NetworkSignal`]; the service
//! watches it and enables or disables multiplayer mode accordingly.

use tokio::sync::watch;

/// Publisher side of the availability signal
#[derive(Debug, Clone)]
pub struct NetworkSignal {
    tx: watch::Sender<bool>,
}

impl NetworkSignal {
    pub fn new(available: bool) -> Self {
        let (tx, _) = watch::channel(available);
        Self { tx }
    }

    /// Publish a change. Repeating the current value notifies nobody.
    pub fn set(&self, available: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != available;
            *current = available;
            changed
        });
    }

    pub fn is_available(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkSignal {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_change_notifies_subscriber() {
        let signal = NetworkSignal::default();
        let mut rx = signal.subscribe();
        assert!(!*rx.borrow_and_update());

        signal.set(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(signal.is_available());
    }

    #[test]
    fn test_repeat_value_is_not_a_change() {
        let signal = NetworkSignal::new(true);
        let mut rx = signal.subscribe();
        rx.borrow_and_update();

        signal.set(true);
        assert!(!rx.has_changed().unwrap());
    }
}
