//! Integration tests for the invoice lifecycle repository.
//!
//! This test suite validates:
//! - Upload pre-creation in `uploading` status
//! - Extraction results moving an invoice to `processed`
//! - Confirmation with user edits and status precondition
//! - Send-to-accountant handoff
//! - Error marking and listing filters
//!
//! **IMPORTANT**: These tests require a PostgreSQL database; migrations are
//! applied automatically on first connection.

use faktura_db::test_fixtures::TestDatabase;
use faktura_db::{
    ConfirmInvoiceRequest, CreateInvoiceRequest, Error, ExtractionCallback, InvoiceRepository,
    InvoiceStatus, InvoiceType, LineItems, ListInvoicesRequest,
};
use uuid::Uuid;

fn upload_request(test_db: &TestDatabase) -> CreateInvoiceRequest {
    CreateInvoiceRequest {
        organization_id: test_db.organization_id,
        user_id: test_db.user_id,
        project_id: None,
        is_general_expense: false,
        invoice_type: InvoiceType::Incoming,
        file_url: Some("https://storage.test/racun-042.pdf".to_string()),
        file_type: Some("application/pdf".to_string()),
        original_filename: Some("racun-042.pdf".to_string()),
    }
}

fn extraction_payload(invoice_id: Uuid) -> ExtractionCallback {
    ExtractionCallback {
        invoice_id: Some(invoice_id),
        invoice_number: Some("INV-2025-0042".to_string()),
        invoice_date: Some("2025-03-10".to_string()),
        due_date: Some("2025-04-10".to_string()),
        vendor_name: Some("Acme d.o.o.".to_string()),
        vendor_tax_id: Some("HR-12345678901".to_string()),
        subtotal: Some(100.0),
        tax_rate: Some(25.0),
        tax_amount: Some(25.0),
        total_amount: Some(125.0),
        line_items: Some(LineItems::Raw(
            r#"[{"description":"Konsalting","amount":100}]"#.to_string(),
        )),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_upload_to_sent_lifecycle() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.invoices;

    // upload pre-creates the row
    let invoice = repo
        .insert(upload_request(&test_db))
        .await
        .expect("Failed to insert invoice");
    assert_eq!(invoice.status, InvoiceStatus::Uploading);
    assert_eq!(invoice.currency, "EUR");
    // awaiting review from the moment the row exists
    assert!(invoice.requires_confirmation);
    assert!(invoice.invoice_number.is_none());

    // dispatch accepted
    repo.set_status(invoice.id, InvoiceStatus::Processing)
        .await
        .expect("Failed to set status");

    // extraction callback
    let payload = extraction_payload(invoice.id);
    let confidence = faktura_db::score_extraction(&payload);
    let processed = repo
        .apply_extraction(invoice.id, &payload, &confidence)
        .await
        .expect("Failed to apply extraction");

    assert_eq!(processed.status, InvoiceStatus::Processed);
    assert!(processed.requires_confirmation);
    assert_eq!(processed.invoice_number.as_deref(), Some("INV-2025-0042"));
    assert_eq!(processed.vendor_name.as_deref(), Some("Acme d.o.o."));
    assert_eq!(processed.total_amount, Some(125.0));
    assert_eq!(
        processed.invoice_date.map(|d| d.to_string()).as_deref(),
        Some("2025-03-10")
    );
    // raw-string line items are parsed on read
    assert_eq!(processed.line_items.items().len(), 1);
    assert_eq!(
        processed.extraction_confidence.get("invoice_number"),
        Some(&0.9)
    );

    // user confirms with an edited total
    let confirmed = repo
        .confirm(
            invoice.id,
            test_db.user_id,
            &ConfirmInvoiceRequest {
                total_amount: Some(126.0),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to confirm invoice");

    assert_eq!(confirmed.status, InvoiceStatus::Confirmed);
    assert!(!confirmed.requires_confirmation);
    assert_eq!(confirmed.confirmed_by, Some(test_db.user_id));
    assert!(confirmed.confirmed_at.is_some());
    // edited field overrides, untouched field survives
    assert_eq!(confirmed.total_amount, Some(126.0));
    assert_eq!(confirmed.vendor_name.as_deref(), Some("Acme d.o.o."));

    // handoff
    let sent = repo.mark_sent(invoice.id).await.expect("Failed to send");
    assert_eq!(sent.status, InvoiceStatus::SentToAccountant);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_confirm_requires_processed_status() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.invoices;

    let invoice = repo
        .insert(upload_request(&test_db))
        .await
        .expect("Failed to insert invoice");

    // still uploading: confirmation must be rejected
    let err = repo
        .confirm(invoice.id, test_db.user_id, &ConfirmInvoiceRequest::default())
        .await
        .expect_err("Confirm should fail before processing");
    match err {
        Error::InvalidStatus { expected, found } => {
            assert_eq!(expected, "processed");
            assert_eq!(found, "uploading");
        }
        other => panic!("Expected InvalidStatus, got {other:?}"),
    }

    // unchanged
    let current = repo.fetch(invoice.id).await.expect("Failed to fetch");
    assert_eq!(current.status, InvoiceStatus::Uploading);
    assert!(current.confirmed_at.is_none());

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_mark_sent_requires_confirmed_status() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.invoices;

    let invoice = repo
        .insert(upload_request(&test_db))
        .await
        .expect("Failed to insert invoice");

    let err = repo
        .mark_sent(invoice.id)
        .await
        .expect_err("Send should fail before confirmation");
    assert!(matches!(err, Error::InvalidStatus { .. }));

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_mark_error_records_message() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.invoices;

    let invoice = repo
        .insert(upload_request(&test_db))
        .await
        .expect("Failed to insert invoice");

    repo.mark_error(invoice.id, "Failed to send to processing service")
        .await
        .expect("Failed to mark error");

    let failed = repo.fetch(invoice.id).await.expect("Failed to fetch");
    assert_eq!(failed.status, InvoiceStatus::Error);
    assert_eq!(
        failed.notes.as_deref(),
        Some("Failed to send to processing service")
    );
    // the error path touches only status and notes
    assert!(failed.requires_confirmation);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_fetch_missing_invoice() {
    let test_db = TestDatabase::new().await;

    let missing = Uuid::new_v4();
    let err = test_db
        .db
        .invoices
        .fetch(missing)
        .await
        .expect_err("Fetch of missing invoice should fail");
    assert!(matches!(err, Error::InvoiceNotFound(id) if id == missing));

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_list_scoping_and_filters() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.invoices;

    let incoming = repo
        .insert(upload_request(&test_db))
        .await
        .expect("Failed to insert");
    let outgoing = repo
        .insert(CreateInvoiceRequest {
            invoice_type: InvoiceType::Outgoing,
            ..upload_request(&test_db)
        })
        .await
        .expect("Failed to insert");
    repo.set_status(outgoing.id, InvoiceStatus::Processing)
        .await
        .expect("Failed to set status");

    let all = repo
        .list(test_db.organization_id, ListInvoicesRequest::default())
        .await
        .expect("Failed to list");
    assert_eq!(all.total, 2);
    // newest first
    assert_eq!(all.invoices[0].id, outgoing.id);
    assert_eq!(all.invoices[1].id, incoming.id);

    let filtered = repo
        .list(
            test_db.organization_id,
            ListInvoicesRequest {
                status: Some(InvoiceStatus::Processing),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list filtered");
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.invoices[0].id, outgoing.id);

    let by_type = repo
        .list(
            test_db.organization_id,
            ListInvoicesRequest {
                invoice_type: Some(InvoiceType::Incoming),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list by type");
    assert_eq!(by_type.total, 1);
    assert_eq!(by_type.invoices[0].id, incoming.id);

    // a different organization sees nothing
    let other_org = repo
        .list(Uuid::new_v4(), ListInvoicesRequest::default())
        .await
        .expect("Failed to list other org");
    assert_eq!(other_org.total, 0);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_list_clamps_out_of_range_pagination() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.invoices;

    repo.insert(upload_request(&test_db))
        .await
        .expect("Failed to insert");

    // negative values are clamped instead of reaching Postgres as-is
    let listed = repo
        .list(
            test_db.organization_id,
            ListInvoicesRequest {
                limit: Some(-5),
                offset: Some(-10),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list with negative pagination");
    assert_eq!(listed.total, 1);
    assert!(listed.invoices.is_empty());

    test_db.cleanup().await;
}
