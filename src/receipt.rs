//! Receipt data model and deterministic normalisation.
//!
//! The VLM is asked for strings everywhere, but real replies mix in numbers,
//! `null`s and missing keys. Deserialisation is therefore lenient: anything
//! scalar becomes a string, anything absent becomes `""`.
//!
//! After parsing, [`Receipt::normalise`] re-applies the rules the prompt
//! states (money format, per-patient totals, grant eligibility) so the
//! response does not depend on the model doing arithmetic correctly.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Structured fields extracted from one receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Receipt {
    #[serde(default, deserialize_with = "null_as_default")]
    pub client: ClientInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub patients: Vec<Patient>,
}

/// Client-level block of the receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub standardized_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub zip_code: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub grant_eligibility: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub invoice_date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub invoice_number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub receipt_date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub receipt_number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_paid: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment: String,
    /// Keys the model added beyond the requested ones, passed through as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Services for one patient, grouped by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Patient {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub provider: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub patient_total: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<LineItem>,
}

/// One row of the service table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub quantity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub total: String,
}

impl Receipt {
    /// Parse a model-produced JSON object into a receipt.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Apply the deterministic rules the prompt asks the model to follow.
    pub fn normalise(mut self) -> Self {
        let c = &mut self.client;
        for field in [
            &mut c.first_name,
            &mut c.last_name,
            &mut c.standardized_name,
            &mut c.zip_code,
            &mut c.grant_eligibility,
            &mut c.invoice_date,
            &mut c.invoice_number,
            &mut c.receipt_date,
            &mut c.receipt_number,
            &mut c.amount_paid,
            &mut c.payment,
        ] {
            trim_in_place(field);
        }
        normalise_money(&mut c.amount_paid);
        if let Some(eligibility) = grant_eligibility_for_zip(&c.zip_code) {
            c.grant_eligibility = eligibility.to_string();
        }

        for patient in &mut self.patients {
            trim_in_place(&mut patient.name);
            trim_in_place(&mut patient.provider);
            trim_in_place(&mut patient.patient_total);

            let mut sum: Option<i64> = Some(0);
            for item in &mut patient.items {
                trim_in_place(&mut item.description);
                trim_in_place(&mut item.date);
                trim_in_place(&mut item.quantity);
                trim_in_place(&mut item.total);
                normalise_money(&mut item.total);
                sum = sum
                    .zip(parse_cents(&item.total))
                    .and_then(|(a, b)| a.checked_add(b));
            }

            match sum {
                Some(cents) if !patient.items.is_empty() => {
                    patient.patient_total = format_cents(cents);
                }
                _ => normalise_money(&mut patient.patient_total),
            }
        }

        self
    }
}

// ── Grant eligibility ────────────────────────────────────────────────────────

static RE_ZIP5: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{5})(?:-\d{4})?\b").unwrap());

/// Map a client ZIP code to its grant programme.
///
/// Returns `None` when `zip` contains no 5-digit ZIP, so the caller can keep
/// whatever the model reported.
pub fn grant_eligibility_for_zip(zip: &str) -> Option<&'static str> {
    let caps = RE_ZIP5.captures(zip)?;
    Some(match &caps[1] {
        "14211" | "14215" => "PFL",
        "14208" => "Incubator",
        _ => "Ineligible",
    })
}

// ── Money ────────────────────────────────────────────────────────────────────

static RE_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}(?:,\d{3})+|\d+)?(?:\.(\d{1,2}))?$").unwrap());

/// Parse a monetary string into integer cents.
///
/// Accepts `$12.50`, `12.5`, `1,020.00`, `-$3.00`, `$-3.00` and the
/// accounting form `($3.00)`. Returns `None` for anything else, including
/// the empty string.
pub fn parse_cents(input: &str) -> Option<i64> {
    let mut s = input.trim();
    let mut negative = false;

    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.trim_start();
    }
    s = s.strip_prefix('$').unwrap_or(s).trim_start();
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest;
    }

    let caps = RE_AMOUNT.captures(s)?;
    let whole = caps.get(1).map(|m| m.as_str());
    let frac = caps.get(2).map(|m| m.as_str());
    if whole.is_none() && frac.is_none() {
        return None;
    }

    let dollars: i64 = match whole {
        Some(w) => w.replace(',', "").parse().ok()?,
        None => 0,
    };
    let cents: i64 = match frac {
        Some(f) if f.len() == 1 => f.parse::<i64>().ok()? * 10,
        Some(f) => f.parse::<i64>().ok()?,
        None => 0,
    };

    let total = dollars.checked_mul(100)?.checked_add(cents)?;
    Some(if negative { -total } else { total })
}

/// Format integer cents as `$D.CC` (or `-$D.CC`).
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

fn normalise_money(field: &mut String) {
    if let Some(cents) = parse_cents(field) {
        *field = format_cents(cents);
    }
}

fn trim_in_place(field: &mut String) {
    let trimmed = field.trim();
    if trimmed.len() != field.len() {
        *field = trimmed.to_string();
    }
}

// ── Lenient deserialisers ────────────────────────────────────────────────────

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eligibility_mapping() {
        assert_eq!(grant_eligibility_for_zip("14211"), Some("PFL"));
        assert_eq!(grant_eligibility_for_zip("14215-1234"), Some("PFL"));
        assert_eq!(grant_eligibility_for_zip(" 14208 "), Some("Incubator"));
        assert_eq!(grant_eligibility_for_zip("14201"), Some("Ineligible"));
        assert_eq!(grant_eligibility_for_zip("Buffalo NY 14211"), Some("PFL"));
        assert_eq!(grant_eligibility_for_zip(""), None);
        assert_eq!(grant_eligibility_for_zip("142"), None);
    }

    #[test]
    fn parse_cents_forms() {
        assert_eq!(parse_cents("$12.50"), Some(1250));
        assert_eq!(parse_cents("12.5"), Some(1250));
        assert_eq!(parse_cents("12"), Some(1200));
        assert_eq!(parse_cents("$.99"), Some(99));
        assert_eq!(parse_cents("$1,020.00"), Some(102_000));
        assert_eq!(parse_cents("-$3.00"), Some(-300));
        assert_eq!(parse_cents("$-3.00"), Some(-300));
        assert_eq!(parse_cents("($4.00)"), Some(-400));
        assert_eq!(parse_cents(""), None);
        assert_eq!(parse_cents("$"), None);
        assert_eq!(parse_cents("N/A"), None);
        assert_eq!(parse_cents("12.345"), None);
        assert_eq!(parse_cents("1,02"), None);
    }

    #[test]
    fn format_cents_forms() {
        assert_eq!(format_cents(0), "$0.00");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(102_000), "$1020.00");
        assert_eq!(format_cents(-400), "-$4.00");
    }

    #[test]
    fn lenient_fields_accept_numbers_and_nulls() {
        let receipt = Receipt::from_value(json!({
            "Client": { "FirstName": "ann", "ZipCode": 14208, "AmountPaid": null },
            "Patients": [
                { "Name": "Rex", "Items": [ { "Quantity": 2, "Total": 45.5 } ] }
            ]
        }))
        .unwrap();
        assert_eq!(receipt.client.zip_code, "14208");
        assert_eq!(receipt.client.amount_paid, "");
        assert_eq!(receipt.client.last_name, "");
        assert_eq!(receipt.patients[0].items[0].quantity, "2");
        assert_eq!(receipt.patients[0].items[0].total, "45.5");
    }

    #[test]
    fn null_collections_become_empty() {
        let receipt = Receipt::from_value(json!({ "Client": null, "Patients": null })).unwrap();
        assert_eq!(receipt, Receipt::default());
    }

    #[test]
    fn extra_client_keys_survive_round_trip() {
        let receipt = Receipt::from_value(json!({
            "Client": { "FirstName": "Ann", "Address": "1 Main St" }
        }))
        .unwrap();
        assert_eq!(receipt.client.extra.get("Address"), Some(&json!("1 Main St")));
        let out = serde_json::to_value(&receipt).unwrap();
        assert_eq!(out["Client"]["Address"], "1 Main St");
        assert_eq!(out["Client"]["FirstName"], "Ann");
    }

    #[test]
    fn normalise_recomputes_patient_total() {
        let receipt = Receipt::from_value(json!({
            "Client": { "ZipCode": "14215", "GrantEligibility": "Ineligible", "AmountPaid": "100" },
            "Patients": [
                {
                    "Name": " Rex ",
                    "PatientTotal": "$999.00",
                    "Items": [
                        { "Description": "Exam", "Total": "45" },
                        { "Description": "Rabies", "Total": "$22.5" }
                    ]
                }
            ]
        }))
        .unwrap()
        .normalise();

        assert_eq!(receipt.client.grant_eligibility, "PFL");
        assert_eq!(receipt.client.amount_paid, "$100.00");
        let rex = &receipt.patients[0];
        assert_eq!(rex.name, "Rex");
        assert_eq!(rex.items[0].total, "$45.00");
        assert_eq!(rex.items[1].total, "$22.50");
        assert_eq!(rex.patient_total, "$67.50");
    }

    #[test]
    fn normalise_keeps_model_total_when_an_item_is_illegible() {
        let receipt = Receipt::from_value(json!({
            "Patients": [
                {
                    "Name": "Tom",
                    "PatientTotal": "80",
                    "Items": [ { "Total": "$40.00" }, { "Total": "" } ]
                }
            ]
        }))
        .unwrap()
        .normalise();
        assert_eq!(receipt.patients[0].patient_total, "$80.00");
        assert_eq!(receipt.patients[0].items[1].total, "");
    }

    #[test]
    fn normalise_keeps_model_total_when_sum_overflows() {
        let receipt = Receipt::from_value(json!({
            "Patients": [
                {
                    "Name": "Max",
                    "PatientTotal": "$12.00",
                    "Items": [
                        { "Total": "$90000000000000000.00" },
                        { "Total": "$90000000000000000.00" }
                    ]
                }
            ]
        }))
        .unwrap()
        .normalise();
        let max = &receipt.patients[0];
        assert_eq!(max.patient_total, "$12.00");
        assert_eq!(max.items[0].total, "$90000000000000000.00");
    }

    #[test]
    fn normalise_keeps_eligibility_without_zip() {
        let receipt = Receipt::from_value(json!({
            "Client": { "ZipCode": "", "GrantEligibility": "Ineligible" }
        }))
        .unwrap()
        .normalise();
        assert_eq!(receipt.client.grant_eligibility, "Ineligible");
    }
}
