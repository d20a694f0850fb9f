//! Organization-scoped event watcher.
//!
//! Push-only: forwards every enveloped event belonging to one organization.
//! Unlike [`InvoiceWatcher`](crate::InvoiceWatcher) there is no polling
//! fallback; list views refresh on any event and tolerate an occasional
//! missed one.

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use faktura_core::defaults::WATCH_CHANNEL_CAPACITY;
use faktura_core::{EventBus, EventEnvelope};

/// Watcher for all events of a single organization.
pub struct OrganizationWatcher {
    organization_id: Uuid,
}

impl OrganizationWatcher {
    pub fn new(organization_id: Uuid) -> Self {
        Self { organization_id }
    }

    /// Start forwarding this organization's events.
    pub fn start(self, bus: &EventBus) -> OrganizationWatchHandle {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let mut events = bus.subscribe();
        let organization_id = self.organization_id;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = events.recv() => match event {
                        Ok(envelope) => {
                            if envelope.organization_id != Some(organization_id) {
                                continue;
                            }
                            if tx.send(envelope).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(
                                subsystem = "watch",
                                component = "org_watcher",
                                organization_id = %organization_id,
                                skipped,
                                "Organization watcher lagged behind event bus"
                            );
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        OrganizationWatchHandle {
            events: rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running [`OrganizationWatcher`].
pub struct OrganizationWatchHandle {
    events: mpsc::Receiver<EventEnvelope>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl OrganizationWatchHandle {
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.events.recv().await
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for OrganizationWatchHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
