//! Prompts for VLM-based receipt field extraction.
//!
//! All prompt text lives here so it can be inspected in tests and changed
//! without touching the retry or parsing logic in [`crate::pipeline::llm`].
//! Callers can override either prompt via
//! [`crate::config::ServiceConfig::system_prompt`] and
//! [`crate::config::ServiceConfig::user_prompt`].

/// Default system prompt describing the receipt layout and output rules.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a document extraction AI that parses veterinary clinic receipts and returns strict JSON output.

Each receipt PDF includes three logical sections:
1. A client information block (name, address, ZIP).
2. A header block (invoice and receipt details, payment summary).
3. A service table with columns: Patient, Provider, Description, Date, Quantity, Subtotal, Tax, and Total.

Your task:
- Identify and extract the client-level data.
- Parse only valid service table rows (ignore header rows, 'Subtotal' or 'Tax' lines, and totals at the very bottom).
- Group services by Patient name.
- For each patient, calculate the numeric sum of their 'Total' column and include it as PatientTotal.
- Return clean JSON only. No commentary, no markdown.

All dates should remain as text exactly as shown (e.g. '10/6/2025').
All monetary amounts should include a leading '$' and two decimals."#;

/// Default user prompt: the field list, grouping rules and output skeleton.
///
/// Sent as the text part of the user message, followed by one image per
/// rendered page.
pub const DEFAULT_USER_PROMPT: &str = r#"Extract the following structured information from this veterinary clinic receipt PDF.

For the client-level fields, include:
- FirstName
- LastName
- StandardizedName (proper case full name)
- ZipCode
- GrantEligibility (based on ZIP: 14211 or 14215 = 'PFL'; 14208 = 'Incubator'; all others = 'Ineligible')
- InvoiceDate
- InvoiceNumber
- ReceiptDate
- ReceiptNumber
- AmountPaid
- Payment

Then, from the 'Payment History' or similar service table, capture rows that contain:
- Patient
- Provider
- Description
- Date
- Quantity
- Total (ignore Subtotal and Tax columns entirely)

Group rows by Patient name and include, for each patient:
- Name
- Provider (use the main provider if repeated)
- Items[] (list of their services)
- PatientTotal (sum of all 'Total' values for that patient)

Return one valid JSON object in the exact structure below:
{
  "Client": { ...fields... },
  "Patients": [
    {
      "Name": "",
      "Provider": "",
      "PatientTotal": "",
      "Items": [ { "Description": "", "Date": "", "Quantity": "", "Total": "" } ]
    }
  ]
}

If information is missing or illegible, use an empty string for that field."#;
