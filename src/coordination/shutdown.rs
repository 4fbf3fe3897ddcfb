//! Graceful shutdown signalling
//!
//! A `ShutdownController` owns the shutdown flag; `CancelToken`s are cheap
//! clones handed to the supervisor and into every collaborator call so that
//! in-flight work observes cancellation at its suspension points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

/// Owns the shutdown flag; one per process
pub struct ShutdownController {
    tx: watch::Sender<bool>,
    requested: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            requested: AtomicBool::new(false),
        }
    }

    /// Request shutdown. Duplicate requests are ignored.
    pub fn request(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            warn!("shutdown already requested, ignoring duplicate signal");
            return;
        }
        info!("shutdown requested");
        let _ = self.tx.send(true);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// A token observing this controller
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation token passed into collaborator calls
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    /// Keeps a detached token's channel open; always `None` for tokens
    /// minted by a controller
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. A dropped controller counts
    /// as cancellation so orphaned work never hangs.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Race a future against cancellation
    pub async fn guard<F, T>(&self, fut: F) -> crate::error::Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(crate::error::HelmsmanError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// A token that never fires, for constructing components outside a
    /// supervisor (tests, one-shot tooling)
    pub fn detached() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }
}

/// Install OS signal handlers that request shutdown on the controller
pub fn install_signal_handlers(controller: Arc<ShutdownController>) {
    let ctrl_c = controller.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            return;
        }
        info!("received SIGINT");
        ctrl_c.request();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = controller;
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    sigterm.request();
                }
                Err(e) => error!("failed to install SIGTERM handler: {}", e),
            }
        });
    }
}
