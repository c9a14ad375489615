use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Coordinates a delayed, server-wide shutdown.
///
/// The shutdown command acknowledges first and then schedules cancellation
/// of the token after a grace delay; the server, every WebSocket loop and
/// `main` all watch the same token.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
    scheduled: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once shutdown has begun.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Cancel the token after `grace`. Returns `false` if a shutdown was
    /// already scheduled.
    pub fn schedule(&self, grace: Duration) -> bool {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already scheduled");
            return false;
        }

        info!("Shutting down in {:?}", grace);
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            token.cancel();
        });
        true
    }

    /// Begin shutdown immediately.
    pub fn trigger(&self) {
        self.scheduled.store(true, Ordering::SeqCst);
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cancels_after_grace_delay() {
        let handle = ShutdownHandle::new();
        assert!(handle.schedule(Duration::from_millis(500)));
        assert!(!handle.schedule(Duration::from_millis(10)));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!handle.is_cancelled());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn trigger_is_immediate() {
        let handle = ShutdownHandle::new();
        let watcher = handle.clone();
        handle.trigger();
        watcher.cancelled().await;
        assert!(watcher.is_scheduled());
    }
}
