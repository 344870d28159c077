//! Spreadsheet import
//!
//! Finds the header row by its content instead of its position, then turns every
//! following row into an [`ImportEntry`] built from the number column (A) and the
//! contact column (K).

use crate::models::sanitize_text;
use crate::tracker::ImportEntry;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, warn};

/// Largest accepted upload, in bytes
pub const MAX_FILE_SIZE: usize = 2 * 1024 * 1024;

/// Only this many leading rows are searched for the header
const HEADER_SCAN_ROWS: usize = 10;

const NUMBER_COLUMN: usize = 0;
const CONTACT_COLUMN: usize = 10;

const NUMBER_KEYWORDS: &[&str] = &["number", "номер"];
const CONTACT_KEYWORDS: &[&str] = &["contact", "контакт"];

const PREVIEW_ROWS: usize = 5;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Only Excel files (.xlsx, .xls) can be imported, got '{filename}'")]
    UnsupportedFileType { filename: String },

    #[error("File is too large: {size} bytes (maximum is {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },

    #[error("File does not look like an Excel workbook: {0}")]
    NotASpreadsheet(String),

    #[error("Workbook has no worksheets")]
    NoWorksheet,

    #[error("Worksheet has {rows} row(s); expected a header row followed by data")]
    NoDataRows { rows: usize },

    #[error(
        "No header row with \"Number\" in column A and \"Contact\" in column K within the first {} rows. First rows: {}",
        HEADER_SCAN_ROWS,
        format_preview(.preview)
    )]
    HeaderNotFound { preview: Vec<Vec<String>> },
}

fn format_preview(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| serde_json::to_string(row).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("; ")
}

/// One worksheet row, indexed by absolute column; `None` marks an absent cell
pub type Row = Vec<Option<String>>;

/// Parsed spreadsheet entries plus what the diagnostics need
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSheet {
    pub entries: Vec<ImportEntry>,
    pub skipped: usize,
    pub sample_row: Option<Vec<String>>,
}

/// Outcome of a spreadsheet import
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub added: usize,
    pub skipped: usize,
    /// First data row seen, so an import that adds nothing can be diagnosed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_row: Option<Vec<String>>,
}

/// Lower-case and drop whitespace (including non-breaking spaces) and quote characters
pub fn normalize_header(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '"' | '\'' | '`'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn matches_keyword(cell: Option<&String>, keywords: &[&str]) -> bool {
    cell.map(|value| normalize_header(value))
        .is_some_and(|normalized| keywords.iter().any(|k| normalized.contains(k)))
}

fn cell(row: &Row, column: usize) -> Option<&String> {
    row.get(column).and_then(Option::as_ref)
}

/// Validate an upload's name and size before touching its contents
pub fn check_upload(filename: &str, size: usize) -> Result<(), ImportError> {
    let lower = filename.trim().to_lowercase();
    if !(lower.ends_with(".xlsx") || lower.ends_with(".xls")) {
        return Err(ImportError::UnsupportedFileType {
            filename: filename.to_string(),
        });
    }
    if size > MAX_FILE_SIZE {
        return Err(ImportError::FileTooLarge {
            size,
            limit: MAX_FILE_SIZE,
        });
    }
    Ok(())
}

fn render_cell(value: &Data) -> Option<String> {
    let text = match value {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Read the first worksheet into rows addressed by absolute column index
pub fn read_rows(bytes: &[u8]) -> Result<Vec<Row>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ImportError::NotASpreadsheet(e.to_string()))?;

    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ImportError::NoWorksheet)?;
    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| ImportError::NotASpreadsheet(e.to_string()))?;

    let column_offset = range.start().map_or(0, |(_, col)| col as usize);
    let rows: Vec<Row> = range
        .rows()
        .map(|cells| {
            std::iter::repeat(None)
                .take(column_offset)
                .chain(cells.iter().map(render_cell))
                .collect()
        })
        .collect();

    debug!("Read {} rows from worksheet '{}'", rows.len(), first_sheet);
    Ok(rows)
}

/// Index of the header row among the first rows, if any
pub fn find_header_row(rows: &[Row]) -> Option<usize> {
    rows.iter().take(HEADER_SCAN_ROWS).position(|row| {
        matches_keyword(cell(row, NUMBER_COLUMN), NUMBER_KEYWORDS)
            && matches_keyword(cell(row, CONTACT_COLUMN), CONTACT_KEYWORDS)
    })
}

/// Turn worksheet rows into import entries
pub fn extract_entries(rows: &[Row]) -> Result<ParsedSheet, ImportError> {
    if rows.len() < 2 {
        return Err(ImportError::NoDataRows { rows: rows.len() });
    }

    let header = find_header_row(rows).ok_or_else(|| {
        let preview = rows
            .iter()
            .take(PREVIEW_ROWS)
            .map(|row| row.iter().map(|c| c.clone().unwrap_or_default()).collect())
            .collect();
        ImportError::HeaderNotFound { preview }
    })?;

    let mut parsed = ParsedSheet {
        entries: Vec::new(),
        skipped: 0,
        sample_row: None,
    };

    for row in &rows[header + 1..] {
        let number = cell(row, NUMBER_COLUMN);
        let contact = cell(row, CONTACT_COLUMN);
        if number.is_none() && contact.is_none() {
            continue;
        }
        if parsed.sample_row.is_none() {
            parsed.sample_row = Some(row.iter().map(|c| c.clone().unwrap_or_default()).collect());
        }

        let (Some(number), Some(contact)) = (number, contact) else {
            parsed.skipped += 1;
            continue;
        };
        let contact = match contact.rfind('/') {
            Some(idx) => &contact[idx + 1..],
            None => contact.as_str(),
        };
        let number = sanitize_text(number);
        let contact = sanitize_text(contact);
        if number.is_empty() || contact.is_empty() {
            parsed.skipped += 1;
            continue;
        }
        parsed.entries.push(ImportEntry { number, contact });
    }

    Ok(parsed)
}

/// Validate and parse an uploaded workbook
pub fn parse_upload(filename: &str, bytes: &[u8]) -> Result<ParsedSheet, ImportError> {
    check_upload(filename, bytes.len())?;
    let rows = read_rows(bytes)?;
    let parsed = extract_entries(&rows).inspect_err(|e| warn!("Spreadsheet '{}' rejected: {}", filename, e))?;
    debug!(
        "Spreadsheet '{}': {} entries, {} skipped rows",
        filename,
        parsed.entries.len(),
        parsed.skipped
    );
    Ok(parsed)
}
