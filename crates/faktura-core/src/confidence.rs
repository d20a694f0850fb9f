//! Heuristic confidence scoring for extracted invoice fields.
//!
//! Used when the extraction workflow reports field values without its own
//! per-field confidence map. Scores are keyed by field name and range 0.0
//! (absent) to 0.95; a field below ~0.8 is worth flagging in review UIs.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{parse_extracted_date, ExtractionCallback};

/// Tax IDs in the region are 8-15 alphanumerics once separators are removed.
const TAX_ID_PATTERN: &str = r"^[A-Z0-9]{8,15}$";

fn tax_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TAX_ID_PATTERN).unwrap())
}

/// Whether a vendor tax id looks well-formed after stripping spaces and
/// dashes.
pub fn is_valid_tax_id(raw: &str) -> bool {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect::<String>()
        .to_uppercase();
    tax_id_regex().is_match(&cleaned)
}

/// Score the extracted fields of a callback payload.
///
/// Every scored field always gets an entry, with 0.0 meaning the field was
/// absent. Presence checks treat empty strings as absent.
pub fn score_extraction(payload: &ExtractionCallback) -> BTreeMap<String, f64> {
    let mut confidence = BTreeMap::new();

    let present = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.is_empty());

    confidence.insert(
        "invoice_number".to_string(),
        match payload.invoice_number.as_deref() {
            Some(n) if !n.is_empty() => {
                if n.len() > 3 {
                    0.9
                } else {
                    0.7
                }
            }
            _ => 0.0,
        },
    );

    for (key, value) in [
        ("invoice_date", &payload.invoice_date),
        ("due_date", &payload.due_date),
    ] {
        confidence.insert(
            key.to_string(),
            match value.as_deref() {
                Some(d) if !d.is_empty() => {
                    if parse_extracted_date(d).is_some() {
                        0.95
                    } else {
                        0.6
                    }
                }
                _ => 0.0,
            },
        );
    }

    confidence.insert(
        "vendor_name".to_string(),
        match payload.vendor_name.as_deref() {
            Some(n) if !n.is_empty() => {
                if n.len() > 2 {
                    0.85
                } else {
                    0.5
                }
            }
            _ => 0.0,
        },
    );

    confidence.insert(
        "vendor_tax_id".to_string(),
        if present(&payload.vendor_tax_id) {
            if is_valid_tax_id(payload.vendor_tax_id.as_deref().unwrap_or_default()) {
                0.95
            } else {
                0.7
            }
        } else {
            0.0
        },
    );

    confidence.insert(
        "total_amount".to_string(),
        match payload.total_amount {
            Some(v) if v > 0.0 => 0.9,
            _ => 0.0,
        },
    );

    confidence.insert(
        "subtotal".to_string(),
        match payload.subtotal {
            Some(v) if v > 0.0 => 0.85,
            _ => 0.0,
        },
    );

    confidence.insert(
        "tax_amount".to_string(),
        match payload.tax_amount {
            Some(v) if v >= 0.0 => 0.85,
            _ => 0.0,
        },
    );

    confidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(map: &BTreeMap<String, f64>, key: &str) -> f64 {
        *map.get(key).unwrap()
    }

    #[test]
    fn test_empty_payload_scores_all_zero() {
        let scores = score_extraction(&ExtractionCallback::default());
        assert_eq!(scores.len(), 8);
        assert!(scores.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_invoice_number_length_thresholds() {
        let mut payload = ExtractionCallback::default();
        payload.invoice_number = Some("INV-2025-0042".to_string());
        assert_eq!(get(&score_extraction(&payload), "invoice_number"), 0.9);

        payload.invoice_number = Some("42".to_string());
        assert_eq!(get(&score_extraction(&payload), "invoice_number"), 0.7);
    }

    #[test]
    fn test_date_validity_scoring() {
        let mut payload = ExtractionCallback::default();
        payload.invoice_date = Some("2025-06-01".to_string());
        payload.due_date = Some("soonish".to_string());
        let scores = score_extraction(&payload);
        assert_eq!(get(&scores, "invoice_date"), 0.95);
        assert_eq!(get(&scores, "due_date"), 0.6);
    }

    #[test]
    fn test_vendor_name_scoring() {
        let mut payload = ExtractionCallback::default();
        payload.vendor_name = Some("Acme d.o.o.".to_string());
        assert_eq!(get(&score_extraction(&payload), "vendor_name"), 0.85);

        payload.vendor_name = Some("XY".to_string());
        assert_eq!(get(&score_extraction(&payload), "vendor_name"), 0.5);
    }

    #[test]
    fn test_tax_id_normalization() {
        assert!(is_valid_tax_id("HR-12345678901"));
        assert!(is_valid_tax_id("hr 12345678901"));
        assert!(!is_valid_tax_id("1234567"));
        assert!(!is_valid_tax_id("HR_12345678901"));

        let mut payload = ExtractionCallback::default();
        payload.vendor_tax_id = Some("12 345 678 901".to_string());
        assert_eq!(get(&score_extraction(&payload), "vendor_tax_id"), 0.95);

        payload.vendor_tax_id = Some("12#45".to_string());
        assert_eq!(get(&score_extraction(&payload), "vendor_tax_id"), 0.7);
    }

    #[test]
    fn test_amount_scoring() {
        let mut payload = ExtractionCallback::default();
        payload.total_amount = Some(125.5);
        payload.subtotal = Some(100.0);
        payload.tax_amount = Some(0.0);
        let scores = score_extraction(&payload);
        assert_eq!(get(&scores, "total_amount"), 0.9);
        assert_eq!(get(&scores, "subtotal"), 0.85);
        // zero tax is a real value, not a missing one
        assert_eq!(get(&scores, "tax_amount"), 0.85);

        payload.total_amount = Some(0.0);
        payload.subtotal = Some(-5.0);
        payload.tax_amount = Some(-1.0);
        let scores = score_extraction(&payload);
        assert_eq!(get(&scores, "total_amount"), 0.0);
        assert_eq!(get(&scores, "subtotal"), 0.0);
        assert_eq!(get(&scores, "tax_amount"), 0.0);
    }

    #[test]
    fn test_partial_extraction_scenario() {
        let mut payload = ExtractionCallback::default();
        payload.vendor_name = Some("Acme d.o.o.".to_string());
        payload.total_amount = Some(242.0);
        payload.tax_amount = Some(42.0);
        let scores = score_extraction(&payload);
        assert_eq!(get(&scores, "vendor_name"), 0.85);
        assert_eq!(get(&scores, "total_amount"), 0.9);
        assert_eq!(get(&scores, "tax_amount"), 0.85);
        assert_eq!(get(&scores, "invoice_number"), 0.0);
        assert_eq!(get(&scores, "subtotal"), 0.0);
    }
}
