//! CSV export of extraction results.
//!
//! The export row shape mirrors the per-image API response, so the web
//! frontend can post its accumulated results straight back for download and
//! the CLI can serialize its own batch output through the same path.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::extract::CardRecord;

pub const CSV_HEADERS: &[&str] = &[
    "Name",
    "Title",
    "Company",
    "Email",
    "Phone",
    "Website",
    "Address",
    "Tokens Used",
    "Model",
    "Filename",
];

/// One per-image result as exposed by the API and accepted back for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<CardRecord>,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub filename: String,
}

/// Write rows as CSV. Failed extractions still get a row so the model/tag
/// column records what went wrong for which file.
pub fn write_csv<W: Write>(writer: W, rows: &[ExportRow]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADERS)?;

    for row in rows {
        let empty = String::new();
        let (name, title, company, email, phone, website, address, tokens) = match &row.data {
            Some(data) => (
                data.name.clone().unwrap_or_default(),
                data.title.clone().unwrap_or_default(),
                data.company.clone().unwrap_or_default(),
                data.email.clone().unwrap_or_default(),
                data.phone_numbers.join("; "),
                data.website.clone().unwrap_or_default(),
                data.address.clone().unwrap_or_default(),
                data.tokens.map(|t| t.to_string()).unwrap_or_default(),
            ),
            None => (
                empty.clone(),
                empty.clone(),
                empty.clone(),
                empty.clone(),
                empty.clone(),
                empty.clone(),
                empty.clone(),
                empty,
            ),
        };

        csv.write_record([
            name.as_str(),
            title.as_str(),
            company.as_str(),
            email.as_str(),
            phone.as_str(),
            website.as_str(),
            address.as_str(),
            tokens.as_str(),
            row.model_used.as_str(),
            row.filename.as_str(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

/// Render rows to an in-memory CSV string.
pub fn to_csv_string(rows: &[ExportRow]) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, rows)?;
    Ok(String::from_utf8(buf)?)
}

/// Dated attachment name for downloads.
pub fn download_filename() -> String {
    format!("business_cards_{}.csv", chrono::Local::now().format("%Y-%m-%d"))
}
