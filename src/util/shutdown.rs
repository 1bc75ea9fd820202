//! Graceful shutdown handling.

use tokio::sync::broadcast;

/// Broadcasts a single shutdown notification to every long-running task.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Subscribe to shutdown notifications.
    ///
    /// Subscribers created after `shutdown` was called are not notified.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Notify all current subscribers.
    ///
    /// # Returns
    ///
    /// The number of tasks that were listening.
    pub fn shutdown(&self) -> usize {
        // No receivers simply means nothing is running.
        self.sender.send(()).unwrap_or(0)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
