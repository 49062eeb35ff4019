//! The orchestrator's single authoritative cancel signal (§4.5, §4.8):
//! "each hook polls the context at entry; the orchestrator's cancel is
//! the single authoritative signal."

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownHandle(watch::Sender<bool>);

#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

/// Builds a fresh, not-yet-fired shutdown signal pair.
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle(tx), ShutdownSignal(rx))
}

impl ShutdownHandle {
    /// Fires the signal exactly once; idempotent on repeated calls.
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

impl ShutdownSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the signal fires; used by long-running loops to
    /// wait without busy-polling.
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.0.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_starts_uncancelled_and_propagates() {
        let (handle, signal) = shutdown_channel();
        assert!(!signal.is_cancelled());
        handle.shutdown();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_shutdown() {
        let (handle, mut signal) = shutdown_channel();
        let mut signal2 = signal.clone();
        let task = tokio::spawn(async move {
            signal2.cancelled().await;
        });
        handle.shutdown();
        task.await.unwrap();
        assert!(signal.is_cancelled());
    }
}
