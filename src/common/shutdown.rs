//! # Shutdown Signal
//!
//! Every accept loop and periodic loop in the daemons selects on a [`Shutdown`]
//! so a single trigger stops the whole process cleanly.

use tokio::sync::watch;

/// Cloneable handle to a process-wide termination flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Flip the flag; every waiter in [`Shutdown::wait`] returns.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Resolve once the flag is set. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
