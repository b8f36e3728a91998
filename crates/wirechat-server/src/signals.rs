//! Shutdown signalling.
//!
//! [`SignalHandler`] turns SIGTERM/SIGINT (Ctrl+C elsewhere) into a shutdown
//! notification. [`ShutdownHandle`] is the same one-shot latch on its own and
//! is also used to tell a single connection task to stop.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::ServerResult;

/// Signal handler that manages process signal processing.
pub struct SignalHandler {
    handle: ShutdownHandle,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    /// Creates a new signal handler.
    pub fn new() -> Self {
        Self {
            handle: ShutdownHandle::new(),
        }
    }

    /// Installs the signal listeners and spawns the task that waits on them.
    ///
    /// Call once at server startup.
    #[cfg(unix)]
    pub fn spawn_listener(&self) -> ServerResult<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let handle = self.handle.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating shutdown");
                }
            }
            handle.trigger();
            debug!("Signal listener stopped");
        });

        Ok(())
    }

    /// Non-Unix implementation: Ctrl+C only.
    #[cfg(not(unix))]
    pub fn spawn_listener(&self) -> ServerResult<()> {
        let handle = self.handle.clone();

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received Ctrl+C, initiating shutdown");
                handle.trigger();
            }
        });

        Ok(())
    }

    /// Returns a future that completes when a shutdown signal is received.
    pub fn shutdown(&self) -> ShutdownSignal {
        self.handle.wait()
    }

    /// Returns true if shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        self.handle.is_shutdown()
    }

    /// Programmatically triggers a shutdown.
    pub fn trigger_shutdown(&self) {
        self.handle.trigger();
    }

    /// Creates a shutdown handle that can be passed to other components.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }
}

/// A signal that completes when shutdown is signaled.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal.
    ///
    /// Also returns if every sender is gone, since nothing can trigger it then.
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

/// A handle for triggering or checking shutdown status.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    /// Creates an untriggered handle.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Triggers a shutdown. Later calls are no-ops.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns a future that completes when shutdown is triggered.
    pub fn wait(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }
}
