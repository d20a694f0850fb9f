//! Server event types, envelope schema, and event bus for real-time notifications.
//!
//! Invoice lifecycle changes and report completions are broadcast on a single
//! channel; downstream consumers (SSE streams, watchers, telemetry) subscribe
//! independently and filter by organization.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::InvoiceStatus;

// ============================================================================
// Event Envelope
// ============================================================================

/// Actor metadata for event attribution.
///
/// Identifies who or what caused an event: background processing or an
/// authenticated user.
#[derive(Debug, Clone, Serialize)]
pub struct EventActor {
    /// Actor type: `"system"` or `"user"`.
    pub kind: String,
    /// Optional actor identifier (user ID).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl EventActor {
    /// System actor (extraction callbacks, internal processes).
    pub fn system() -> Self {
        Self {
            kind: "system".to_string(),
            id: None,
        }
    }

    /// Authenticated user actor.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: "user".to_string(),
            id: Some(id.into()),
        }
    }
}

/// Optional emission context for events that carry additional metadata.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    /// Who or what caused this event. Defaults to system actor.
    pub actor: Option<EventActor>,
    /// Correlation ID for tracing related events across operations.
    pub correlation_id: Option<Uuid>,
    /// ID of the event that directly caused this event.
    pub causation_id: Option<Uuid>,
}

/// Versioned server event envelope.
///
/// All SSE emissions use this envelope. The `event_type` field uses
/// dot-namespaced names (e.g., `"invoice.processed"`), and `organization_id`
/// carries the tenant scope that SSE streams filter on.
///
/// ## Schema Evolution
///
/// - `payload_version` starts at `1` and increments on breaking payload changes.
/// - New optional fields may be added to the envelope without version bump.
/// - Consumers should ignore unknown fields.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type (e.g., `"invoice.processed"`).
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Organization (tenant) the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    /// Who/what caused this event.
    pub actor: EventActor,
    /// Type of entity this event relates to (e.g., `"invoice"`, `"report"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// ID of the entity this event relates to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Correlation ID for tracing related events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// ID of the event that caused this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
    /// Payload schema version.
    pub payload_version: u32,
    /// Domain-specific event data.
    pub payload: ServerEvent,
}

impl EventEnvelope {
    /// Create an envelope from a ServerEvent with default (system) context.
    pub fn new(event: ServerEvent) -> Self {
        Self::with_context(event, EventContext::default())
    }

    /// Create an envelope with explicit context.
    pub fn with_context(event: ServerEvent, ctx: EventContext) -> Self {
        let event_type = event.namespaced_event_type().to_string();
        let entity_type = event.entity_type().map(String::from);
        let entity_id = event.entity_id().map(|id| id.to_string());
        let organization_id = event.organization_id();

        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type,
            occurred_at: Utc::now(),
            organization_id,
            actor: ctx.actor.unwrap_or_else(EventActor::system),
            entity_type,
            entity_id,
            correlation_id: ctx.correlation_id,
            causation_id: ctx.causation_id,
            payload_version: 1,
            payload: event,
        }
    }
}

// ============================================================================
// Server Event (domain payloads)
// ============================================================================

/// Unified server event type for the invoice pipeline.
///
/// Serialized as JSON with a `type` tag field, e.g.:
/// `{"type":"InvoiceProcessed","invoice_id":"...","organization_id":"..."}`
///
/// When wrapped in an [`EventEnvelope`], these become the `payload` field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// An invoice file was received and dispatched for extraction.
    InvoiceUploaded {
        invoice_id: Uuid,
        organization_id: Uuid,
        invoice_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        original_filename: Option<String>,
    },
    /// An invoice moved to a new status.
    InvoiceStatusChanged {
        invoice_id: Uuid,
        organization_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_status: Option<InvoiceStatus>,
        status: InvoiceStatus,
    },
    /// Extraction finished and the invoice is ready for review.
    InvoiceProcessed {
        invoice_id: Uuid,
        organization_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        vendor_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_amount: Option<f64>,
        requires_confirmation: bool,
    },
    /// Extraction or dispatch failed.
    InvoiceFailed {
        invoice_id: Uuid,
        organization_id: Uuid,
        error: String,
    },
    /// A user confirmed the extracted data.
    InvoiceConfirmed {
        invoice_id: Uuid,
        organization_id: Uuid,
        confirmed_by: Uuid,
    },
    /// A confirmed invoice was handed off to the accountant.
    InvoiceSent {
        invoice_id: Uuid,
        organization_id: Uuid,
    },
    /// A report finished generating (or failed).
    ReportGenerated {
        report_id: Uuid,
        organization_id: Uuid,
        format: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
        success: bool,
    },
}

impl ServerEvent {
    /// Returns the event type name (used for webhook-style filtering).
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::InvoiceUploaded { .. } => "InvoiceUploaded",
            ServerEvent::InvoiceStatusChanged { .. } => "InvoiceStatusChanged",
            ServerEvent::InvoiceProcessed { .. } => "InvoiceProcessed",
            ServerEvent::InvoiceFailed { .. } => "InvoiceFailed",
            ServerEvent::InvoiceConfirmed { .. } => "InvoiceConfirmed",
            ServerEvent::InvoiceSent { .. } => "InvoiceSent",
            ServerEvent::ReportGenerated { .. } => "ReportGenerated",
        }
    }

    /// Returns the namespaced event type for the envelope (e.g., `"invoice.processed"`).
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            ServerEvent::InvoiceUploaded { .. } => "invoice.uploaded",
            ServerEvent::InvoiceStatusChanged { .. } => "invoice.status_changed",
            ServerEvent::InvoiceProcessed { .. } => "invoice.processed",
            ServerEvent::InvoiceFailed { .. } => "invoice.failed",
            ServerEvent::InvoiceConfirmed { .. } => "invoice.confirmed",
            ServerEvent::InvoiceSent { .. } => "invoice.sent",
            ServerEvent::ReportGenerated { .. } => "report.generated",
        }
    }

    /// Returns the entity type this event relates to.
    pub fn entity_type(&self) -> Option<&'static str> {
        match self {
            ServerEvent::InvoiceUploaded { .. }
            | ServerEvent::InvoiceStatusChanged { .. }
            | ServerEvent::InvoiceProcessed { .. }
            | ServerEvent::InvoiceFailed { .. }
            | ServerEvent::InvoiceConfirmed { .. }
            | ServerEvent::InvoiceSent { .. } => Some("invoice"),
            ServerEvent::ReportGenerated { .. } => Some("report"),
        }
    }

    /// Returns the primary entity ID this event relates to.
    pub fn entity_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::InvoiceUploaded { invoice_id, .. }
            | ServerEvent::InvoiceStatusChanged { invoice_id, .. }
            | ServerEvent::InvoiceProcessed { invoice_id, .. }
            | ServerEvent::InvoiceFailed { invoice_id, .. }
            | ServerEvent::InvoiceConfirmed { invoice_id, .. }
            | ServerEvent::InvoiceSent { invoice_id, .. } => Some(*invoice_id),
            ServerEvent::ReportGenerated { report_id, .. } => Some(*report_id),
        }
    }

    /// Returns the organization the event is scoped to.
    pub fn organization_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::InvoiceUploaded {
                organization_id, ..
            }
            | ServerEvent::InvoiceStatusChanged {
                organization_id, ..
            }
            | ServerEvent::InvoiceProcessed {
                organization_id, ..
            }
            | ServerEvent::InvoiceFailed {
                organization_id, ..
            }
            | ServerEvent::InvoiceConfirmed {
                organization_id, ..
            }
            | ServerEvent::InvoiceSent {
                organization_id, ..
            }
            | ServerEvent::ReportGenerated {
                organization_id, ..
            } => Some(*organization_id),
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus for distributing server events to multiple consumers.
///
/// Uses `tokio::sync::broadcast` with a configurable buffer size. Events are
/// wrapped in [`EventEnvelope`] with metadata before broadcast. Slow receivers
/// that fall behind receive a `Lagged` error and miss events; watchers cover
/// that gap with their polling fallback.
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers (system actor).
    ///
    /// The event is automatically wrapped in an [`EventEnvelope`] with a
    /// system actor and UUIDv7 event ID. If there are no active subscribers,
    /// the event is silently dropped.
    pub fn emit(&self, event: ServerEvent) {
        let envelope = EventEnvelope::new(event);
        let subscriber_count = self.tx.receiver_count();
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count,
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Emit an event with explicit context (actor, correlation).
    ///
    /// Use this from authenticated API handlers where the acting user is known.
    pub fn emit_with_context(&self, event: ServerEvent, ctx: EventContext) {
        let envelope = EventEnvelope::with_context(event, ctx);
        let subscriber_count = self.tx.receiver_count();
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count,
            "EventBus emit (with context)"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive enveloped events. Each subscriber gets its own
    /// independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> Uuid {
        Uuid::parse_str("01234567-89ab-cdef-0123-456789abcdef").unwrap()
    }

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(ServerEvent::InvoiceProcessed {
            invoice_id: Uuid::nil(),
            organization_id: org(),
            vendor_name: Some("Acme d.o.o.".to_string()),
            total_amount: Some(121.0),
            requires_confirmation: true,
        });

        let envelope = rx.recv().await.unwrap();
        assert!(matches!(
            envelope.payload,
            ServerEvent::InvoiceProcessed { .. }
        ));
        assert_eq!(envelope.event_type, "invoice.processed");
        assert_eq!(envelope.payload_version, 1);
        assert_eq!(envelope.actor.kind, "system");
        assert_eq!(envelope.organization_id, Some(org()));
        assert_eq!(envelope.entity_type.as_deref(), Some("invoice"));
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(ServerEvent::InvoiceFailed {
            invoice_id: Uuid::nil(),
            organization_id: org(),
            error: "extraction timed out".to_string(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert!(matches!(e1.payload, ServerEvent::InvoiceFailed { .. }));
        assert!(matches!(e2.payload, ServerEvent::InvoiceFailed { .. }));
        assert_eq!(e1.event_type, "invoice.failed");
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers_ok() {
        let bus = EventBus::new(32);
        // Should not panic even with no subscribers
        bus.emit(ServerEvent::InvoiceSent {
            invoice_id: Uuid::nil(),
            organization_id: org(),
        });
    }

    #[tokio::test]
    async fn test_event_bus_subscriber_count() {
        let bus = EventBus::new(32);
        assert_eq!(bus.subscriber_count(), 0);

        let _rx1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(_rx1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_server_event_json_serialization() {
        let event = ServerEvent::InvoiceStatusChanged {
            invoice_id: Uuid::nil(),
            organization_id: org(),
            previous_status: None,
            status: InvoiceStatus::Processing,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"InvoiceStatusChanged"#));
        assert!(json.contains(r#""status":"processing"#));
        // previous_status should be skipped when None
        assert!(!json.contains("previous_status"));
    }

    #[test]
    fn test_server_event_type_names() {
        let event = ServerEvent::InvoiceUploaded {
            invoice_id: Uuid::nil(),
            organization_id: org(),
            invoice_type: "incoming".to_string(),
            original_filename: Some("racun-042.pdf".to_string()),
        };
        assert_eq!(event.event_type(), "InvoiceUploaded");
        assert_eq!(event.namespaced_event_type(), "invoice.uploaded");
        assert_eq!(event.entity_type(), Some("invoice"));
        assert_eq!(event.entity_id(), Some(Uuid::nil()));
        assert_eq!(event.organization_id(), Some(org()));

        let report = ServerEvent::ReportGenerated {
            report_id: Uuid::nil(),
            organization_id: org(),
            format: "csv".to_string(),
            file_url: Some("/files/report.csv".to_string()),
            success: true,
        };
        assert_eq!(report.namespaced_event_type(), "report.generated");
        assert_eq!(report.entity_type(), Some("report"));
    }

    #[test]
    fn test_envelope_new_defaults() {
        let event = ServerEvent::InvoiceConfirmed {
            invoice_id: Uuid::nil(),
            organization_id: org(),
            confirmed_by: Uuid::nil(),
        };
        let envelope = EventEnvelope::new(event);

        assert_eq!(envelope.event_type, "invoice.confirmed");
        assert_eq!(envelope.payload_version, 1);
        assert_eq!(envelope.actor.kind, "system");
        assert_eq!(envelope.entity_type.as_deref(), Some("invoice"));
        assert_eq!(
            envelope.entity_id.as_deref(),
            Some(Uuid::nil().to_string().as_str())
        );
        assert_eq!(envelope.organization_id, Some(org()));
        assert!(envelope.correlation_id.is_none());
        assert!(envelope.causation_id.is_none());
        // event_id should be a valid UUIDv7
        assert!(crate::uuid_utils::is_v7(&envelope.event_id));
    }

    #[test]
    fn test_envelope_with_context() {
        let ctx = EventContext {
            actor: Some(EventActor::user("user-123")),
            correlation_id: Some(Uuid::nil()),
            causation_id: None,
        };
        let event = ServerEvent::InvoiceConfirmed {
            invoice_id: Uuid::nil(),
            organization_id: org(),
            confirmed_by: Uuid::nil(),
        };
        let envelope = EventEnvelope::with_context(event, ctx);

        assert_eq!(envelope.actor.kind, "user");
        assert_eq!(envelope.actor.id.as_deref(), Some("user-123"));
        assert_eq!(envelope.correlation_id, Some(Uuid::nil()));
        assert!(envelope.causation_id.is_none());
    }

    #[test]
    fn test_envelope_json_serialization() {
        let event = ServerEvent::InvoiceProcessed {
            invoice_id: Uuid::nil(),
            organization_id: org(),
            vendor_name: None,
            total_amount: None,
            requires_confirmation: true,
        };
        let envelope = EventEnvelope::new(event);
        let json = serde_json::to_string(&envelope).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["event_type"], "invoice.processed");
        assert_eq!(parsed["payload_version"], 1);
        assert_eq!(parsed["actor"]["kind"], "system");
        assert_eq!(parsed["payload"]["type"], "InvoiceProcessed");
        assert_eq!(parsed["payload"]["requires_confirmation"], true);
        assert!(parsed["event_id"].is_string());
        assert!(parsed["occurred_at"].is_string());
        // Optional fields absent when None
        assert!(parsed["payload"].get("vendor_name").is_none());
    }

    #[tokio::test]
    async fn test_event_bus_lagged_receiver() {
        // Tiny buffer to exercise lagged behavior
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for _ in 0..5 {
            bus.emit(ServerEvent::InvoiceSent {
                invoice_id: Uuid::nil(),
                organization_id: org(),
            });
        }

        let result = rx.recv().await;
        assert!(result.is_ok() || matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
