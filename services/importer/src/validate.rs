//! Shape checks run before any row of a subject is imported.
//!
//! Any failure here is fatal for the subject and is not retried.

use tracing::warn;
use uuid::Uuid;

use crate::csv_line::{split_line, CsvTable, HeaderIndex};
use crate::error::{ImportError, ImportResult};
use crate::meta::SubjectMeta;
use crate::model::{Labelled, MetaColumn};
use crate::resolve::location::LOCATION_COLUMNS;
use crate::resolve::school::SCHOOL_COLUMNS;

/// Columns every observation file must have.
pub const MANDATORY_OBSERVATION_COLUMNS: &[&str] =
    &["geographic_level", "time_identifier", "time_period"];

const QUOTE: char = '"';

/// The metadata header must name every `MetaColumn` and carry no quotes.
pub fn validate_meta_header(subject_id: Uuid, header_line: &str) -> ImportResult<()> {
    if header_line.contains(QUOTE) {
        return Err(ImportError::InvalidMetaHeader { subject_id });
    }
    let header = HeaderIndex::new(split_line(header_line));
    if MetaColumn::ALL
        .iter()
        .any(|column| !header.contains(column.label()))
    {
        return Err(ImportError::InvalidMetaHeader { subject_id });
    }
    Ok(())
}

/// A metadata row must carry no quotes and exactly `expected_columns`
/// fields.
pub fn validate_meta_row(
    subject_id: Uuid,
    line_number: usize,
    line: &str,
    expected_columns: usize,
) -> ImportResult<()> {
    if line.contains(QUOTE) || split_line(line).len() != expected_columns {
        return Err(ImportError::InvalidMetaRow {
            subject_id,
            row: line_number,
        });
    }
    Ok(())
}

/// Header then every row of a metadata file.
pub fn validate_meta(subject_id: Uuid, content: &str) -> ImportResult<()> {
    let table = CsvTable::new(content);
    let header_line = table
        .header_line()
        .ok_or(ImportError::InvalidMetaHeader { subject_id })?;
    validate_meta_header(subject_id, header_line)?;

    let expected = split_line(header_line).len();
    for (line_number, line) in table.data_lines() {
        validate_meta_row(subject_id, line_number, line, expected)?;
    }
    Ok(())
}

/// The observation header must carry the mandatory columns and every
/// column the metadata declares. Columns nobody recognises are logged.
pub fn validate_observation_header(
    subject_id: Uuid,
    header: &HeaderIndex,
    meta: &SubjectMeta,
) -> ImportResult<()> {
    let declared = meta.declared_columns();
    for column in MANDATORY_OBSERVATION_COLUMNS.iter().chain(declared.iter()) {
        if !header.contains(column) {
            return Err(ImportError::InvalidObservationHeader {
                subject_id,
                column: column.to_string(),
            });
        }
    }

    let unknown: Vec<&str> = header
        .names()
        .iter()
        .map(String::as_str)
        .filter(|name| {
            !MANDATORY_OBSERVATION_COLUMNS.contains(name)
                && !LOCATION_COLUMNS.contains(name)
                && !SCHOOL_COLUMNS.contains(name)
                && !declared.contains(name)
        })
        .collect();
    if !unknown.is_empty() {
        warn!(
            subject_id = %subject_id,
            columns = ?unknown,
            "observation columns not declared in metadata will be ignored"
        );
    }
    Ok(())
}
