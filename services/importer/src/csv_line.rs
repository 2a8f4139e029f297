//! Comma splitting and header-indexed column access.
//!
//! Fields are split on every comma. Quotes are not interpreted, so a
//! quoted field containing a comma is split like any other; the
//! validator rejects quote characters in metadata before we get here.

use std::collections::HashMap;

use csv::StringRecord;

use crate::error::{ImportError, ImportResult};

fn reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .from_reader(content.as_bytes())
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

/// Split a single raw line into its columns.
pub fn split_line(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return vec![String::new()];
    }
    match reader(line).records().next() {
        Some(Ok(record)) => record.iter().map(str::to_string).collect(),
        _ => line.split(',').map(str::to_string).collect(),
    }
}

/// `None` when the value is missing or only whitespace.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Maps column names to their position in the header row.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .collect();
        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            // first occurrence wins on duplicate headers
            positions.entry(name.clone()).or_insert(idx);
        }
        Self { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn require(&self, column: &str) -> ImportResult<usize> {
        self.position(column)
            .ok_or_else(|| ImportError::MissingColumn(column.to_string()))
    }

    /// Raw value of `column` in `row`, if both exist.
    pub fn value<'r>(&self, row: &'r StringRecord, column: &str) -> Option<&'r str> {
        self.position(column).and_then(|idx| row.get(idx))
    }

    /// Trimmed value of `column`, `None` when absent or blank.
    pub fn non_blank<'r>(&self, row: &'r StringRecord, column: &str) -> Option<&'r str> {
        non_blank(self.value(row, column))
    }
}

/// One data row with its 1-based line number in the source file.
#[derive(Debug, Clone)]
pub struct DataRow {
    pub line: usize,
    pub record: StringRecord,
}

/// A CSV document held as text; rows are re-read on every pass.
#[derive(Debug, Clone, Copy)]
pub struct CsvTable<'a> {
    content: &'a str,
}

impl<'a> CsvTable<'a> {
    pub fn new(content: &'a str) -> Self {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        Self { content }
    }

    /// Header row as raw text, used by validation before splitting.
    pub fn header_line(&self) -> Option<&'a str> {
        self.content
            .lines()
            .find(|l| !l.split(',').all(|field| field.trim().is_empty()))
            .map(|l| l.trim_end_matches('\r'))
    }

    /// Data lines (header removed) as raw text. Lines whose fields are
    /// all blank are skipped.
    pub fn data_lines(&self) -> impl Iterator<Item = (usize, &'a str)> {
        self.content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.split(',').all(|field| field.trim().is_empty()))
            .skip(1)
            .map(|(idx, l)| (idx + 1, l.trim_end_matches('\r')))
    }

    pub fn header(&self) -> ImportResult<HeaderIndex> {
        let mut reader = reader(self.content);
        for record in reader.records() {
            let record = record?;
            if !is_blank(&record) {
                return Ok(HeaderIndex::new(record.iter()));
            }
        }
        Ok(HeaderIndex::new(Vec::<String>::new()))
    }

    /// Iterate data rows, skipping the header and, as `data_lines`
    /// does, records whose fields are all blank.
    pub fn rows(&self) -> impl Iterator<Item = ImportResult<DataRow>> + 'a {
        reader(self.content)
            .into_records()
            .enumerate()
            .filter(|(_, result)| !matches!(result, Ok(record) if is_blank(record)))
            .skip(1)
            .map(|(idx, result)| {
                let record = result?;
                let line = record
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(idx + 1);
                Ok(DataRow { line, record })
            })
    }

    pub fn row_count(&self) -> usize {
        self.data_lines().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_line_plain_commas() {
        assert_eq!(split_line("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_line_keeps_blank_fields() {
        assert_eq!(split_line("E92000001,,"), vec!["E92000001", "", ""]);
    }

    #[test]
    fn test_split_line_does_not_interpret_quotes() {
        assert_eq!(split_line("\"a,b\",c"), vec!["\"a", "b\"", "c"]);
    }

    #[test]
    fn test_split_line_strips_line_ending() {
        assert_eq!(split_line("x,y\r\n"), vec!["x", "y"]);
    }

    #[test]
    fn test_header_index_lookup() {
        let header = HeaderIndex::new(["country_code", " region_code ", "la_name"]);
        assert_eq!(header.position("region_code"), Some(1));
        assert!(header.contains("la_name"));
        assert!(header.position("ward_code").is_none());
        assert!(matches!(
            header.require("ward_code"),
            Err(ImportError::MissingColumn(c)) if c == "ward_code"
        ));
    }

    #[test]
    fn test_non_blank_value() {
        let header = HeaderIndex::new(["a", "b", "c"]);
        let row = StringRecord::from(vec!["x", "  ", ""]);
        assert_eq!(header.non_blank(&row, "a"), Some("x"));
        assert_eq!(header.non_blank(&row, "b"), None);
        assert_eq!(header.non_blank(&row, "c"), None);
        assert_eq!(header.non_blank(&row, "missing"), None);
    }

    #[test]
    fn test_table_rows_skip_header_and_number_lines() {
        let table = CsvTable::new("h1,h2\n1,2\n3,4\n");
        let header = table.header().unwrap();
        assert_eq!(header.names(), ["h1", "h2"]);

        let rows: Vec<DataRow> = table.rows().collect::<ImportResult<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].line, 3);
        assert_eq!(header.value(&rows[1].record, "h2"), Some("4"));
    }

    #[test]
    fn test_table_strips_bom() {
        let table = CsvTable::new("\u{feff}col_name,col_type\nx,Filter\n");
        assert!(table.header().unwrap().contains("col_name"));
        assert_eq!(table.header_line(), Some("col_name,col_type"));
    }

    #[test]
    fn test_data_lines_numbered_from_two() {
        let table = CsvTable::new("a,b\r\n1,2\r\n\r\n3,4\r\n");
        let lines: Vec<(usize, &str)> = table.data_lines().collect();
        assert_eq!(lines, vec![(2, "1,2"), (4, "3,4")]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_rows_skip_whitespace_only_lines() {
        let table = CsvTable::new("  \na,b\n1,2\n   \n \t, \n3,4\n   ");
        assert_eq!(table.header().unwrap().names(), ["a", "b"]);

        let rows: Vec<DataRow> = table.rows().collect::<ImportResult<_>>().unwrap();
        let lines: Vec<usize> = rows.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![3, 6]);
        assert_eq!(rows.len(), table.row_count());
    }

    #[test]
    fn test_empty_table() {
        let table = CsvTable::new("");
        assert!(table.header().unwrap().is_empty());
        assert_eq!(table.rows().count(), 0);
    }
}
