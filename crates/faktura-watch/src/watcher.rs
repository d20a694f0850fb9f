//! Single-invoice status watcher.
//!
//! Combines two delivery paths into one deduplicated update stream:
//! push notifications from the [`EventBus`] and a low-frequency polling
//! fallback that covers missed broadcasts (lagged receivers, events emitted
//! by another process). Updates are edge-triggered against the last observed
//! status, so a consumer never sees the same status twice in a row no matter
//! which path noticed it first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use faktura_core::defaults::{WATCH_CHANNEL_CAPACITY, WATCH_POLL_INTERVAL_SECS};
use faktura_core::{EventBus, Invoice, InvoiceStatus};

use crate::source::InvoiceSource;

/// A status change observed on a watched invoice.
#[derive(Debug, Clone)]
pub struct InvoiceUpdate {
    /// The invoice as fetched after the change.
    pub invoice: Invoice,
    /// The status the watcher last saw, if it had a baseline yet.
    pub previous_status: Option<InvoiceStatus>,
}

/// Watcher for a single invoice's lifecycle.
pub struct InvoiceWatcher {
    invoice_id: Uuid,
    source: Arc<dyn InvoiceSource>,
    poll_interval: Duration,
}

impl InvoiceWatcher {
    pub fn new(invoice_id: Uuid, source: Arc<dyn InvoiceSource>) -> Self {
        Self {
            invoice_id,
            source,
            poll_interval: Duration::from_secs(WATCH_POLL_INTERVAL_SECS),
        }
    }

    /// Override the polling fallback interval (default 3s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start watching. The returned handle yields updates and stops the
    /// background task when dropped or explicitly stopped.
    ///
    /// The current status is fetched once as a baseline; only subsequent
    /// changes are delivered.
    pub fn start(self, bus: &EventBus) -> WatchHandle {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let mut events = bus.subscribe();

        let invoice_id = self.invoice_id;
        let source = self.source;
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut last_status: Option<InvoiceStatus> = match source.fetch_invoice(invoice_id).await
            {
                Ok(invoice) => Some(invoice.status),
                Err(e) => {
                    debug!(
                        subsystem = "watch",
                        component = "watcher",
                        invoice_id = %invoice_id,
                        error = %e,
                        "No baseline yet for watched invoice"
                    );
                    None
                }
            };

            let mut ticker = tokio::time::interval(poll_interval);
            // the first tick fires immediately; the baseline already covers it
            ticker.tick().await;

            loop {
                let triggered = tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = events.recv() => match event {
                        Ok(envelope) => {
                            envelope.entity_id.as_deref() == Some(invoice_id.to_string().as_str())
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            // poll will catch anything we missed
                            warn!(
                                subsystem = "watch",
                                component = "watcher",
                                invoice_id = %invoice_id,
                                skipped,
                                "Watcher lagged behind event bus"
                            );
                            true
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = ticker.tick() => {
                        trace!(
                            subsystem = "watch",
                            component = "watcher",
                            invoice_id = %invoice_id,
                            "Poll tick"
                        );
                        true
                    }
                };

                if !triggered {
                    continue;
                }

                let invoice = match source.fetch_invoice(invoice_id).await {
                    Ok(invoice) => invoice,
                    Err(e) => {
                        debug!(
                            subsystem = "watch",
                            component = "watcher",
                            invoice_id = %invoice_id,
                            error = %e,
                            "Watched invoice fetch failed"
                        );
                        continue;
                    }
                };

                if last_status == Some(invoice.status) {
                    continue;
                }

                let update = InvoiceUpdate {
                    previous_status: last_status,
                    invoice,
                };
                last_status = Some(update.invoice.status);

                if tx.send(update).await.is_err() {
                    break;
                }
            }
        });

        WatchHandle {
            updates: rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running [`InvoiceWatcher`].
pub struct WatchHandle {
    updates: mpsc::Receiver<InvoiceUpdate>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Receive the next status change. Returns `None` once the watcher has
    /// stopped.
    pub async fn recv(&mut self) -> Option<InvoiceUpdate> {
        self.updates.recv().await
    }

    /// Stop the watcher and wait for its task to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
