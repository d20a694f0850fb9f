//! Report artifact rendering: CSV and HTML tables over a window of invoices.

use std::collections::HashMap;

use chrono::NaiveDate;
use faktura_core::{Invoice, InvoiceType, Project};
use uuid::Uuid;

/// Column headers shared by both output formats.
const CSV_HEADERS: [&str; 11] = [
    "Type",
    "Invoice number",
    "Date",
    "Partner",
    "Tax ID",
    "Project",
    "Subtotal",
    "Tax",
    "Total",
    "Currency",
    "Status",
];

/// The partner on an invoice depends on its direction: vendors for
/// incoming invoices, buyers for outgoing ones.
fn partner(invoice: &Invoice) -> (Option<&str>, Option<&str>) {
    match invoice.invoice_type {
        InvoiceType::Incoming => (
            invoice.vendor_name.as_deref(),
            invoice.vendor_tax_id.as_deref(),
        ),
        InvoiceType::Outgoing => (
            invoice.buyer_name.as_deref(),
            invoice.buyer_tax_id.as_deref(),
        ),
    }
}

fn display_date(invoice: &Invoice) -> String {
    invoice
        .invoice_date
        .unwrap_or_else(|| invoice.created_at.date_naive())
        .format("%d.%m.%Y")
        .to_string()
}

fn project_label(invoice: &Invoice, projects: &HashMap<Uuid, Project>) -> String {
    match invoice.project_id.and_then(|id| projects.get(&id)) {
        Some(p) => match &p.code {
            Some(code) => format!("[{}] {}", code, p.name),
            None => p.name.clone(),
        },
        None => "General expense".to_string(),
    }
}

/// Quote a CSV value when it contains a comma, quote, or newline.
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn row_values(invoice: &Invoice, projects: &HashMap<Uuid, Project>) -> Vec<String> {
    let (partner_name, partner_tax_id) = partner(invoice);
    vec![
        match invoice.invoice_type {
            InvoiceType::Incoming => "Incoming".to_string(),
            InvoiceType::Outgoing => "Outgoing".to_string(),
        },
        invoice.invoice_number.clone().unwrap_or_default(),
        display_date(invoice),
        partner_name.unwrap_or_default().to_string(),
        partner_tax_id.unwrap_or_default().to_string(),
        project_label(invoice, projects),
        format!("{:.2}", invoice.subtotal.unwrap_or(0.0)),
        format!("{:.2}", invoice.tax_amount.unwrap_or(0.0)),
        format!("{:.2}", invoice.total_amount.unwrap_or(0.0)),
        invoice.currency.clone(),
        invoice.status.as_str().to_string(),
    ]
}

/// Render invoices as CSV. A UTF-8 BOM prefixes the output so Excel
/// detects the encoding.
pub fn render_csv(invoices: &[Invoice], projects: &HashMap<Uuid, Project>) -> String {
    let mut lines = Vec::with_capacity(invoices.len() + 1);
    lines.push(CSV_HEADERS.join(","));
    for invoice in invoices {
        let row: Vec<String> = row_values(invoice, projects)
            .iter()
            .map(|v| escape_csv(v))
            .collect();
        lines.push(row.join(","));
    }
    format!("\u{feff}{}", lines.join("\n"))
}

/// Render invoices as a standalone HTML table with a totals row.
pub fn render_html(
    report_name: &str,
    date_from: NaiveDate,
    date_to: NaiveDate,
    invoices: &[Invoice],
    projects: &HashMap<Uuid, Project>,
) -> String {
    let mut total_subtotal = 0.0;
    let mut total_tax = 0.0;
    let mut total_amount = 0.0;

    let mut body_rows = String::new();
    for invoice in invoices {
        total_subtotal += invoice.subtotal.unwrap_or(0.0);
        total_tax += invoice.tax_amount.unwrap_or(0.0);
        total_amount += invoice.total_amount.unwrap_or(0.0);

        let values = row_values(invoice, projects);
        body_rows.push_str("      <tr>\n");
        for (i, value) in values.iter().enumerate() {
            let class = if (6..=8).contains(&i) {
                " class=\"number\""
            } else {
                ""
            };
            let cell = if value.is_empty() { "-" } else { value };
            body_rows.push_str(&format!(
                "        <td{}>{}</td>\n",
                class,
                escape_html(cell)
            ));
        }
        body_rows.push_str("      </tr>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <style>
    body {{ font-family: Arial, sans-serif; padding: 40px; }}
    h1 {{ color: #4F46E5; margin-bottom: 10px; }}
    .meta {{ color: #666; margin-bottom: 30px; }}
    table {{ width: 100%; border-collapse: collapse; margin-top: 20px; }}
    th {{ background: #4F46E5; color: white; padding: 10px; text-align: left; }}
    td {{ padding: 10px; border-bottom: 1px solid #ddd; }}
    tr:nth-child(even) {{ background: #f9f9f9; }}
    .total-row {{ font-weight: bold; background: #f0f0f0 !important; }}
    .number {{ text-align: right; }}
  </style>
</head>
<body>
  <h1>{name}</h1>
  <div class="meta">
    <p>Period: {from} - {to}</p>
    <p>Generated: {generated}</p>
  </div>

  <table>
    <thead>
      <tr>
{header_cells}      </tr>
    </thead>
    <tbody>
{body_rows}      <tr class="total-row">
        <td colspan="8">TOTAL</td>
        <td class="number">{total_subtotal:.2}</td>
        <td class="number">{total_tax:.2}</td>
        <td class="number">{total_amount:.2}</td>
      </tr>
    </tbody>
  </table>
</body>
</html>
"#,
        name = escape_html(report_name),
        from = date_from.format("%d.%m.%Y"),
        to = date_to.format("%d.%m.%Y"),
        generated = chrono::Utc::now().format("%d.%m.%Y %H:%M"),
        header_cells = CSV_HEADERS
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let class = if (6..=8).contains(&i) {
                    " class=\"number\""
                } else {
                    ""
                };
                format!("        <th{}>{}</th>\n", class, h)
            })
            .collect::<String>(),
        body_rows = body_rows,
        total_subtotal = total_subtotal,
        total_tax = total_tax,
        total_amount = total_amount,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use faktura_core::{InvoiceStatus, LineItems};
    use std::collections::BTreeMap;

    fn invoice(invoice_type: InvoiceType) -> Invoice {
        Invoice {
            id: Uuid::now_v7(),
            organization_id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            project_id: None,
            is_general_expense: true,
            invoice_type,
            file_url: None,
            file_type: None,
            original_filename: None,
            invoice_number: Some("RN-2025-001".to_string()),
            invoice_date: Some(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()),
            due_date: None,
            vendor_name: Some("Acme d.o.o.".to_string()),
            vendor_address: None,
            vendor_tax_id: Some("4200000000005".to_string()),
            vendor_pdv: None,
            buyer_name: Some("Kupac d.o.o.".to_string()),
            buyer_address: None,
            buyer_tax_id: Some("4300000000001".to_string()),
            subtotal: Some(100.0),
            tax_rate: Some(17.0),
            tax_amount: Some(17.0),
            total_amount: Some(117.0),
            currency: "EUR".to_string(),
            line_items: LineItems::Parsed(vec![]),
            status: InvoiceStatus::Confirmed,
            requires_confirmation: false,
            confirmed_at: None,
            confirmed_by: None,
            extraction_confidence: BTreeMap::new(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_escape_csv_plain_value_untouched() {
        assert_eq!(escape_csv("Acme doo"), "Acme doo");
    }

    #[test]
    fn test_escape_csv_quotes_commas_and_newlines() {
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_csv_starts_with_bom_and_header() {
        let csv = render_csv(&[], &HashMap::new());
        assert!(csv.starts_with('\u{feff}'));
        assert!(csv.contains("Type,Invoice number,Date"));
    }

    #[test]
    fn test_csv_incoming_uses_vendor_outgoing_uses_buyer() {
        let csv = render_csv(
            &[invoice(InvoiceType::Incoming), invoice(InvoiceType::Outgoing)],
            &HashMap::new(),
        );
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[1].contains("Acme d.o.o."));
        assert!(lines[1].contains("10.03.2025"));
        assert!(lines[2].contains("Kupac d.o.o."));
    }

    #[test]
    fn test_csv_comma_in_vendor_is_quoted() {
        let mut inv = invoice(InvoiceType::Incoming);
        inv.vendor_name = Some("Acme, Inc.".to_string());
        let csv = render_csv(&[inv], &HashMap::new());
        assert!(csv.contains("\"Acme, Inc.\""));
    }

    #[test]
    fn test_csv_date_falls_back_to_created_at() {
        let mut inv = invoice(InvoiceType::Incoming);
        inv.invoice_date = None;
        let expected = inv.created_at.date_naive().format("%d.%m.%Y").to_string();
        let csv = render_csv(&[inv], &HashMap::new());
        assert!(csv.contains(&expected));
    }

    #[test]
    fn test_csv_project_label() {
        let mut projects = HashMap::new();
        let project_id = Uuid::now_v7();
        projects.insert(
            project_id,
            Project {
                id: project_id,
                organization_id: Uuid::now_v7(),
                created_by: Uuid::now_v7(),
                name: "Website".to_string(),
                code: Some("WEB".to_string()),
                description: None,
                color: "#6366f1".to_string(),
                is_active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        let mut inv = invoice(InvoiceType::Incoming);
        inv.project_id = Some(project_id);
        let csv = render_csv(&[inv], &projects);
        assert!(csv.contains("[WEB] Website"));

        let detached = invoice(InvoiceType::Incoming);
        let csv = render_csv(&[detached], &projects);
        assert!(csv.contains("General expense"));
    }

    #[test]
    fn test_html_totals_and_escaping() {
        let mut a = invoice(InvoiceType::Incoming);
        a.vendor_name = Some("<script>alert(1)</script>".to_string());
        let b = invoice(InvoiceType::Outgoing);
        let html = render_html(
            "March report",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            &[a, b],
            &HashMap::new(),
        );
        assert!(html.contains("March report"));
        assert!(html.contains("01.03.2025 - 31.03.2025"));
        // two invoices at 117.00 each
        assert!(html.contains("234.00"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
