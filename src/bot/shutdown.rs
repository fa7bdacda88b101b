// src/bot/shutdown.rs - Shutdown flag shared by the event core, scheduler and poller

use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;

/// Broadcast shutdown request: a sticky flag plus a wake signal.
///
/// Cloning is cheap; every clone observes the same request.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter
    pub fn trigger(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            info!(target: "core", "Shutdown requested");
        }
        self.wake.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        loop {
            let notified = self.wake.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration`, returning early (with `true`) if shutdown is requested
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_triggered(),
            _ = self.wait() => true,
        }
    }

    /// Trigger this signal on Ctrl+C or SIGTERM
    pub fn install_signal_handlers(&self) {
        let on_ctrl_c = self.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!(target: "core", "Received Ctrl+C signal, initiating graceful shutdown...");
                    on_ctrl_c.trigger();
                }
                Err(err) => {
                    error!(target: "core", "Failed to listen for Ctrl+C signal: {}", err);
                }
            }
        });

        #[cfg(unix)]
        {
            let on_sigterm = self.clone();
            tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        info!(target: "core", "Received SIGTERM signal, initiating graceful shutdown...");
                        on_sigterm.trigger();
                    }
                    Err(err) => {
                        error!(target: "core", "Failed to register SIGTERM handler: {}", err);
                    }
                }
            });
        }
    }
}
