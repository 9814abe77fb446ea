use std::collections::HashMap;
use std::io::Read;

use serde::{Deserialize, Deserializer, Serialize};

use super::{format_display, validate, SvnrError};

/// Result of validating every SVNR in an employee export.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub rows: Vec<AuditRow>,
}

impl AuditReport {
    pub fn total(&self) -> usize {
        self.rows.len()
    }

    pub fn valid_count(&self) -> usize {
        self.rows.iter().filter(|row| row.reason.is_none()).count()
    }

    pub fn invalid(&self) -> impl Iterator<Item = &AuditRow> {
        self.rows.iter().filter(|row| row.reason.is_some())
    }

    pub fn is_clean(&self) -> bool {
        self.valid_count() == self.total()
    }
}

/// One audited line; `line` is the 1-based data row (header excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRow {
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub raw: String,
    pub display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SvnrError>,
}

#[derive(Debug, Deserialize)]
struct ExportRow {
    #[serde(alias = "SVNR", alias = "Svnr")]
    svnr: String,
    #[serde(
        alias = "Name",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    name: Option<String>,
}

/// Validate the `svnr` column of a CSV export.
///
/// Numbers that pass the checksum but already appeared on an earlier row are
/// reported as `DuplicateNumber`, naming that earlier row.
pub fn audit_reader<R: Read>(reader: R) -> Result<AuditReport, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut rows = Vec::new();

    for (index, record) in csv_reader.deserialize::<ExportRow>().enumerate() {
        let row = record?;
        let line = index + 1;
        let mut result = validate(&row.svnr);

        if result.valid {
            if let Some(previous) = first_seen.get(&result.normalized) {
                result = result.into_duplicate(format!("line {previous}"));
            } else {
                first_seen.insert(result.normalized.clone(), line);
            }
        }

        rows.push(AuditRow {
            line,
            name: row.name,
            display: format_display(&result.normalized),
            raw: row.svnr,
            reason: result.reason,
        });
    }

    Ok(AuditReport { rows })
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
