//! Bulk CSV export and import.
//!
//! Export flattens each contact to one row: phones and emails joined by `;`,
//! anything else joined as `type: value` pairs. Import is the inverse shape,
//! tolerant of per-row failures.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Contact, ContactMethod};

/// Delimiter joining multiple values inside one exported cell.
pub const VALUE_DELIMITER: char = ';';

/// One flattened contact as it appears in the exported file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub id: i64,
    pub name: String,
    pub is_favorite: u8,
    pub phones: String,
    pub emails: String,
    pub other_methods: String,
}

/// One row of an import file. Only `name` is required; the other columns
/// may be absent entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRecord {
    pub name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub is_favorite: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub phones: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub emails: Option<String>,
}

/// Deserialize empty strings as None.
fn empty_string_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.trim().is_empty()))
}

/// Aggregate outcome of a bulk import. Per-row failures are collected here
/// with their file line numbers; they never abort the batch.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportReport {
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn record_error(&mut self, line: usize, message: impl Into<String>) {
        self.error_count += 1;
        self.errors.push(
            Error::ImportRow {
                line,
                message: message.into(),
            }
            .to_string(),
        );
    }
}

impl Database {
    /// Flatten every contact into one export row, ordered by id.
    pub fn export_rows(&self) -> Result<Vec<ExportRow>> {
        let fetched: Result<(Vec<Contact>, Vec<ContactMethod>)> = (|| {
            Ok((self.all_contacts_by_id()?, self.all_methods()?))
        })();
        let (contacts, methods) = fetched.map_err(|e| Error::Export(e.to_string()))?;

        let mut by_contact: HashMap<i64, Vec<ContactMethod>> = HashMap::new();
        for method in methods {
            by_contact.entry(method.contact_id).or_default().push(method);
        }

        Ok(contacts
            .into_iter()
            .map(|contact| {
                let methods = by_contact.remove(&contact.id).unwrap_or_default();
                flatten_contact(contact, &methods)
            })
            .collect())
    }

    /// Read CSV from `reader` and insert one contact per row.
    ///
    /// Rows with a blank name are skipped entirely (neither a success nor an
    /// error); rows that fail are recorded in the report and the batch
    /// continues. A file without a `name` column is rejected up front.
    pub fn import_csv<R: std::io::Read>(&self, reader: R) -> Result<ImportReport> {
        let mut csv_reader = csv::Reader::from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| Error::Validation(format!("unreadable header row: {}", e)))?;
        if !headers.iter().any(|h| h == "name") {
            return Err(Error::Validation("missing required column: name".into()));
        }

        let mut report = ImportReport::default();
        for (idx, result) in csv_reader.deserialize::<ImportRecord>().enumerate() {
            let line = idx + 2; // 1-indexed, after the header row

            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    report.record_error(line, e.to_string());
                    continue;
                }
            };

            let name = record.name.trim();
            if name.is_empty() {
                continue;
            }

            match self.import_one(name, &record) {
                Ok(()) => report.success_count += 1,
                Err(e) => report.record_error(line, e.to_string()),
            }
        }

        Ok(report)
    }

    fn import_one(&self, name: &str, record: &ImportRecord) -> Result<()> {
        let is_favorite = record
            .is_favorite
            .as_deref()
            .map(parse_flag)
            .unwrap_or(false);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO contacts (name, is_favorite, created_time) VALUES (?, ?, ?)",
            params![name, is_favorite as i32, Utc::now().to_rfc3339()],
        )?;
        let contact_id = tx.last_insert_rowid();

        for (cell, method_type) in [(&record.phones, "phone"), (&record.emails, "email")] {
            if let Some(cell) = cell {
                for value in split_values(cell) {
                    tx.execute(
                        "INSERT INTO contact_methods (contact_id, method_type, method_value) VALUES (?, ?, ?)",
                        params![contact_id, method_type, value],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

/// Write export rows as CSV with a header row.
pub fn write_csv<W: std::io::Write>(rows: &[ExportRow], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer
            .serialize(row)
            .map_err(|e| Error::Export(e.to_string()))?;
    }
    csv_writer
        .flush()
        .map_err(|e| Error::Export(e.to_string()))?;
    Ok(())
}

fn flatten_contact(contact: Contact, methods: &[ContactMethod]) -> ExportRow {
    let mut phones = Vec::new();
    let mut emails = Vec::new();
    let mut others = Vec::new();

    for method in methods {
        match method.method_type.as_str() {
            "phone" => phones.push(normalize_segment(&method.method_value)),
            "email" => emails.push(normalize_segment(&method.method_value)),
            other => others.push(format!(
                "{}: {}",
                normalize_segment(other),
                normalize_segment(&method.method_value)
            )),
        }
    }

    let delimiter = VALUE_DELIMITER.to_string();
    ExportRow {
        id: contact.id,
        name: contact.name,
        is_favorite: contact.is_favorite as u8,
        phones: phones.join(&delimiter),
        emails: emails.join(&delimiter),
        other_methods: others.join(&delimiter),
    }
}

/// A value containing the join delimiter would corrupt the flattened cell;
/// swap it for a comma before joining.
fn normalize_segment(value: &str) -> String {
    value.replace(VALUE_DELIMITER, ",")
}

/// Split a delimiter-joined cell into non-empty trimmed segments.
fn split_values(cell: &str) -> Vec<&str> {
    cell.split(VALUE_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Truthy favorite cell values. Anything else (including junk) reads false.
fn parse_flag(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MethodInput;

    fn method(method_type: &str, value: &str) -> MethodInput {
        MethodInput {
            method_type: Some(method_type.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_flatten_groups_by_method_type() {
        let db = Database::open_memory().unwrap();
        db.add_contact(
            "Li Si",
            true,
            &[
                method("phone", "111"),
                method("phone", "222"),
                method("email", "li@x.com"),
                method("address", "Haidian, Beijing"),
            ],
        )
        .unwrap();

        let rows = db.export_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Li Si");
        assert_eq!(rows[0].is_favorite, 1);
        assert_eq!(rows[0].phones, "111;222");
        assert_eq!(rows[0].emails, "li@x.com");
        assert_eq!(rows[0].other_methods, "address: Haidian, Beijing");
    }

    #[test]
    fn test_flatten_normalizes_delimiter_collisions() {
        let db = Database::open_memory().unwrap();
        db.add_contact("odd", false, &[method("phone", "555;ext 12")])
            .unwrap();

        let rows = db.export_rows().unwrap();
        assert_eq!(rows[0].phones, "555,ext 12");
    }

    #[test]
    fn test_import_creates_contacts_and_methods() {
        let db = Database::open_memory().unwrap();
        let csv_data = "\
name,is_favorite,phones,emails
Zhang San,1,13800138000;13900139000,zs@x.com
Li Si,,555-1234,
";
        let report = db.import_csv(csv_data.as_bytes()).unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(report.error_count, 0);

        let contacts = db.list_contacts().unwrap();
        assert_eq!(contacts.len(), 2);

        let zhang = contacts.iter().find(|c| c.name == "Zhang San").unwrap();
        assert!(zhang.is_favorite);
        assert_eq!(zhang.methods.len(), 3);

        let li = contacts.iter().find(|c| c.name == "Li Si").unwrap();
        assert!(!li.is_favorite);
        assert_eq!(li.methods.len(), 1);
    }

    #[test]
    fn test_import_skips_blank_names_without_aborting() {
        let db = Database::open_memory().unwrap();
        let csv_data = "\
name,phones
first,111
   ,222
last,333
";
        let report = db.import_csv(csv_data.as_bytes()).unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(report.error_count, 0);
        assert_eq!(db.stats().unwrap().total_contacts, 2);
    }

    #[test]
    fn test_import_requires_name_column() {
        let db = Database::open_memory().unwrap();
        let csv_data = "phones,emails\n111,a@b.com\n";
        let err = db.import_csv(csv_data.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(db.stats().unwrap().total_contacts, 0);
    }

    #[test]
    fn test_import_records_row_errors_with_line_numbers() {
        let db = Database::open_memory().unwrap();
        // A ragged row (too many fields) fails to deserialize but must not
        // stop the following rows.
        let csv_data = "\
name,phones
good,111
bad,222,extra,fields
also good,333
";
        let report = db.import_csv(csv_data.as_bytes()).unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("row 3:"), "{}", report.errors[0]);
    }

    #[test]
    fn test_export_import_round_trip_preserves_contacts() {
        let db = Database::open_memory().unwrap();
        db.add_contact(
            "Zhang San",
            true,
            &[method("phone", "138"), method("email", "zs@x.com")],
        )
        .unwrap();
        db.add_contact("Li Si", false, &[method("phone", "139")])
            .unwrap();

        let rows = db.export_rows().unwrap();
        let mut buffer = Vec::new();
        write_csv(&rows, &mut buffer).unwrap();

        let restored = Database::open_memory().unwrap();
        let report = restored.import_csv(&buffer[..]).unwrap();
        assert_eq!(report.success_count, 2);

        // Ids may differ; name, favorite flag, and method sets must survive.
        let mut original = db.export_rows().unwrap();
        let mut reimported = restored.export_rows().unwrap();
        for row in original.iter_mut().chain(reimported.iter_mut()) {
            row.id = 0;
        }
        original.sort_by(|a, b| a.name.cmp(&b.name));
        reimported.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(original, reimported);
    }

    #[test]
    fn test_parse_flag_variants() {
        assert!(parse_flag("1"));
        assert!(parse_flag("true"));
        assert!(parse_flag(" Yes "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("banana"));
    }

    #[test]
    fn test_split_values_drops_empty_segments() {
        assert_eq!(split_values("111; 222 ;;  "), vec!["111", "222"]);
        assert_eq!(split_values(""), Vec::<&str>::new());
    }
}
