//! Wire-contract tests for the extraction workflow handshake.
//!
//! The workflow POSTs JSON back to the callback endpoint. These tests pin
//! the payload shapes the server must accept:
//! - a success payload with extracted fields and string dates
//! - a success payload carrying its own confidence map
//! - a failure payload with only `invoice_id` and `error`

use faktura_core::{score_extraction, ExtractionCallback, LineItems};
use faktura_extract::{DispatchRequest, ExtractionBackend, MockExtractionBackend};
use uuid::Uuid;

#[test]
fn success_callback_deserializes_with_string_dates() {
    let payload = serde_json::json!({
        "invoice_id": "01890a5d-ac96-774b-bcce-b302099a8057",
        "invoice_number": "RN-2025-042",
        "invoice_date": "2025-03-10",
        "due_date": "10.04.2025",
        "vendor_name": "Acme d.o.o.",
        "vendor_tax_id": "4200000000005",
        "subtotal": 100.0,
        "tax_rate": 17.0,
        "tax_amount": 17.0,
        "total_amount": 117.0,
        "currency": "BAM",
        "line_items": "[{\"description\":\"Consulting\",\"quantity\":1}]"
    });

    let callback: ExtractionCallback = serde_json::from_value(payload).unwrap();
    assert!(callback.invoice_id.is_some());
    assert!(callback.error.is_none());
    // dates arrive as strings in whatever format the workflow produced
    assert_eq!(callback.invoice_date.as_deref(), Some("2025-03-10"));
    assert!(callback.parsed_invoice_date().is_some());
    assert!(callback.parsed_due_date().is_some());
    // raw line items parse lazily
    let items = callback
        .line_items
        .as_ref()
        .map(LineItems::items)
        .unwrap_or_default();
    assert_eq!(items.len(), 1);
}

#[test]
fn callback_without_confidence_gets_a_derived_map() {
    let callback: ExtractionCallback = serde_json::from_value(serde_json::json!({
        "invoice_id": Uuid::now_v7(),
        "invoice_number": "RN-2025-042",
        "vendor_name": "Acme d.o.o.",
        "total_amount": 117.0
    }))
    .unwrap();

    // the handler derives confidence only when the workflow omitted it
    let confidence = callback
        .extraction_confidence
        .clone()
        .unwrap_or_else(|| score_extraction(&callback));

    assert_eq!(confidence.len(), 8);
    assert_eq!(confidence["invoice_number"], 0.9);
    assert_eq!(confidence["vendor_name"], 0.85);
    assert_eq!(confidence["total_amount"], 0.9);
    // absent fields are scored zero, not skipped
    assert_eq!(confidence["due_date"], 0.0);
}

#[test]
fn callback_with_supplied_confidence_is_trusted() {
    let callback: ExtractionCallback = serde_json::from_value(serde_json::json!({
        "invoice_id": Uuid::now_v7(),
        "invoice_number": "RN",
        "extraction_confidence": { "invoice_number": 0.42 }
    }))
    .unwrap();

    let confidence = callback
        .extraction_confidence
        .clone()
        .unwrap_or_else(|| score_extraction(&callback));

    assert_eq!(confidence.len(), 1);
    assert_eq!(confidence["invoice_number"], 0.42);
}

#[test]
fn failure_callback_deserializes_with_error_only() {
    let callback: ExtractionCallback = serde_json::from_value(serde_json::json!({
        "invoice_id": Uuid::now_v7(),
        "error": "OCR timed out"
    }))
    .unwrap();

    assert_eq!(callback.error.as_deref(), Some("OCR timed out"));
    assert!(callback.invoice_number.is_none());
}

#[tokio::test]
async fn mock_backend_records_dispatch_metadata() {
    let backend = MockExtractionBackend::new();
    let invoice_id = Uuid::now_v7();

    backend
        .dispatch(DispatchRequest {
            invoice_id,
            organization_id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            user_email: Some("owner@example.com".to_string()),
            invoice_type: "incoming".to_string(),
            file_url: None,
            file_type: Some("pdf".to_string()),
            original_filename: Some("scan.pdf".to_string()),
            file_bytes: vec![0x25, 0x50, 0x44, 0x46],
        })
        .await
        .unwrap();

    let dispatched = backend.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].invoice_id, invoice_id);
    assert_eq!(dispatched[0].invoice_type, "incoming");
    assert_eq!(dispatched[0].file_bytes.len(), 4);

    backend.fail_with("workflow unreachable");
    let err = backend
        .dispatch(DispatchRequest {
            invoice_id: Uuid::now_v7(),
            organization_id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            user_email: None,
            invoice_type: "outgoing".to_string(),
            file_url: None,
            file_type: None,
            original_filename: None,
            file_bytes: vec![],
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("workflow unreachable"));
}
