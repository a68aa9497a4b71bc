//! Stop signal for the drainer and sweeper loops.
//!
//! The flag lives in a `tokio::sync::watch` channel, so a loop that
//! subscribes after the stop was requested still sees it on its first poll.

use tokio::sync::watch;

pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// One loop's view of the stop flag.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once a stop has been requested, immediately if it already was.
    pub async fn requested(&mut self) {
        // A closed channel means the controller is gone; treat that as a stop.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request a stop. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if !self.tx.send_replace(true) {
            tracing::debug!(loops = self.tx.receiver_count(), "stop requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Park until SIGINT or SIGTERM arrives, then request a stop.
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        let name = os_signal().await?;
        tracing::info!(signal = name, "stopping on signal");
        self.shutdown();
        Ok(())
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn os_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_the_stop() {
        let controller = ShutdownController::new();
        let mut first = controller.subscribe();
        let mut second = first.clone();
        assert!(!first.is_requested());

        controller.shutdown();
        first.requested().await;
        second.requested().await;
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn late_subscriber_does_not_miss_the_stop() {
        let controller = ShutdownController::new();
        controller.shutdown();
        controller.shutdown();

        let mut late = controller.subscribe();
        assert!(late.is_requested());
        late.requested().await;
    }

    #[tokio::test]
    async fn dropped_controller_releases_waiters() {
        let controller = ShutdownController::new();
        let mut signal = controller.subscribe();
        drop(controller);
        signal.requested().await;
    }
}
