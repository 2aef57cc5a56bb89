//! Unix signal handling for the daemon.
//!
//! - SIGTERM/SIGINT: graceful shutdown
//! - SIGHUP: reload settings and resync

use std::io;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

/// Listens for process signals and fans them out over watch channels.
pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<bool>>,
    reload_tx: Arc<watch::Sender<u64>>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    /// Creates a new signal handler.
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (reload_tx, _) = watch::channel(0);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            reload_tx: Arc::new(reload_tx),
        }
    }

    /// Installs the signal handlers and spawns the listener task.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn spawn_listener(&self) -> io::Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let shutdown_tx = self.shutdown_tx.clone();
        let reload_tx = self.reload_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, initiating shutdown");
                        shutdown_tx.send_replace(true);
                        break;
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT, initiating shutdown");
                        shutdown_tx.send_replace(true);
                        break;
                    }
                    _ = sighup.recv() => {
                        info!("Received SIGHUP, triggering reload");
                        reload_tx.send_modify(|n| *n += 1);
                    }
                }
            }
            debug!("Signal listener stopped");
        });
        Ok(())
    }

    /// Non-Unix: only Ctrl+C is handled.
    #[cfg(not(unix))]
    pub fn spawn_listener(&self) -> io::Result<()> {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received Ctrl+C, initiating shutdown");
                shutdown_tx.send_replace(true);
            }
        });
        Ok(())
    }

    /// Programmatically triggers a shutdown.
    pub fn trigger_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Programmatically triggers a reload.
    pub fn trigger_reload(&self) {
        self.reload_tx.send_modify(|n| *n += 1);
    }

    /// Creates a shutdown handle that can be passed to other components.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
            rx: self.shutdown_tx.subscribe(),
        }
    }

    /// Returns a stream of reload requests.
    pub fn reloads(&self) -> ReloadSignal {
        ReloadSignal {
            rx: self.reload_tx.subscribe(),
        }
    }
}

/// Receives reload requests. Requests arriving while one is being handled
/// collapse into a single reload.
pub struct ReloadSignal {
    rx: watch::Receiver<u64>,
}

impl ReloadSignal {
    /// Waits for the next reload request. Returns false once the signal
    /// handler is gone.
    pub async fn recv(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// A handle for triggering or awaiting shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Triggers a shutdown.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once shutdown is triggered.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // Err means every sender is gone; nothing can trigger us anymore.
        let _ = rx.wait_for(|shutdown| *shutdown).await;
    }
}
