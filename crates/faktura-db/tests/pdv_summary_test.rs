//! Integration tests for VAT (PDV) aggregation and report invoice selection.

use chrono::NaiveDate;
use faktura_db::test_fixtures::TestDatabase;
use faktura_db::{
    CreateInvoiceRequest, ExtractionCallback, InvoiceRepository, InvoiceType, ReportFilter,
};
use uuid::Uuid;

async fn seed_invoice(
    test_db: &TestDatabase,
    invoice_type: InvoiceType,
    invoice_date: Option<&str>,
    subtotal: f64,
    tax: f64,
) -> Uuid {
    let repo = &test_db.db.invoices;
    let invoice = repo
        .insert(CreateInvoiceRequest {
            organization_id: test_db.organization_id,
            user_id: test_db.user_id,
            project_id: None,
            is_general_expense: false,
            invoice_type,
            file_url: None,
            file_type: None,
            original_filename: None,
        })
        .await
        .expect("Failed to insert invoice");

    let payload = ExtractionCallback {
        invoice_id: Some(invoice.id),
        invoice_date: invoice_date.map(String::from),
        subtotal: Some(subtotal),
        tax_amount: Some(tax),
        total_amount: Some(subtotal + tax),
        ..Default::default()
    };
    let confidence = faktura_db::score_extraction(&payload);
    repo.apply_extraction(invoice.id, &payload, &confidence)
        .await
        .expect("Failed to apply extraction");
    invoice.id
}

#[tokio::test]
async fn test_pdv_summary_directions_and_net() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.invoices;

    seed_invoice(&test_db, InvoiceType::Incoming, Some("2025-05-05"), 100.0, 25.0).await;
    seed_invoice(&test_db, InvoiceType::Incoming, Some("2025-05-20"), 40.0, 10.0).await;
    seed_invoice(&test_db, InvoiceType::Outgoing, Some("2025-05-12"), 200.0, 50.0).await;

    // outside the window
    seed_invoice(&test_db, InvoiceType::Outgoing, Some("2025-06-02"), 999.0, 99.0).await;

    // failed invoices are excluded
    let failed = seed_invoice(&test_db, InvoiceType::Incoming, Some("2025-05-15"), 77.0, 7.0).await;
    repo.mark_error(failed, "unreadable scan")
        .await
        .expect("Failed to mark error");

    let from = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
    let to = NaiveDate::from_ymd_opt(2025, 5, 31).unwrap();
    let summary = repo
        .pdv_summary(test_db.organization_id, from, to)
        .await
        .expect("Failed to aggregate");

    assert_eq!(summary.incoming.count, 2);
    assert!((summary.incoming.subtotal - 140.0).abs() < 1e-9);
    assert!((summary.incoming.tax_amount - 35.0).abs() < 1e-9);
    assert_eq!(summary.outgoing.count, 1);
    assert!((summary.outgoing.tax_amount - 50.0).abs() < 1e-9);
    // owed = outgoing tax - incoming tax
    assert!((summary.net_tax() - 15.0).abs() < 1e-9);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_pdv_summary_falls_back_to_upload_date() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.invoices;

    // no extracted invoice_date: the window matches on created_at instead
    seed_invoice(&test_db, InvoiceType::Incoming, None, 60.0, 15.0).await;

    let today = chrono::Utc::now().date_naive();
    let summary = repo
        .pdv_summary(test_db.organization_id, today, today)
        .await
        .expect("Failed to aggregate");
    assert_eq!(summary.incoming.count, 1);
    assert!((summary.incoming.tax_amount - 15.0).abs() < 1e-9);

    // a window in the past does not match it
    let past_from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let past_to = NaiveDate::from_ymd_opt(2020, 12, 31).unwrap();
    let empty = repo
        .pdv_summary(test_db.organization_id, past_from, past_to)
        .await
        .expect("Failed to aggregate");
    assert_eq!(empty.incoming.count, 0);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_list_for_report_window_and_order() {
    let test_db = TestDatabase::new().await;
    let repo = &test_db.db.invoices;

    let later = seed_invoice(&test_db, InvoiceType::Incoming, Some("2025-05-20"), 10.0, 2.5).await;
    let earlier = seed_invoice(&test_db, InvoiceType::Incoming, Some("2025-05-03"), 20.0, 5.0).await;
    seed_invoice(&test_db, InvoiceType::Incoming, Some("2025-07-01"), 30.0, 7.5).await;

    let rows = repo
        .list_for_report(
            test_db.organization_id,
            &ReportFilter {
                date_from: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
                date_to: NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
                project_id: None,
                status: None,
            },
        )
        .await
        .expect("Failed to list for report");

    assert_eq!(rows.len(), 2);
    // oldest invoice date first
    assert_eq!(rows[0].id, earlier);
    assert_eq!(rows[1].id, later);

    test_db.cleanup().await;
}
