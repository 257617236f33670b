//! Tabular file reading.
//!
//! Turns a staged file plus its declared format into row records: ordered
//! header -> raw value mappings, one per data row, in file order. CSV input
//! treats the first line as the header and skips empty lines; spreadsheet
//! input reads only the first sheet, with the sheet's first row as header.

use calamine::{Data, Reader};
use std::fmt;
use std::path::Path;

use crate::errors::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// Parse a declared extension like ".csv" or "XLSX".
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            _ => None,
        }
    }

    pub fn as_extension(&self) -> &'static str {
        match self {
            Self::Csv => ".csv",
            Self::Xlsx => ".xlsx",
            Self::Xls => ".xls",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_extension())
    }
}

/// One normalized record from the source file.
///
/// Preserves column order as it appeared in the file; lookups are by the
/// exact header text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecord {
    columns: Vec<(String, String)>,
}

impl RowRecord {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == header)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed value, or None when the column is missing or blank.
    pub fn non_blank(&self, header: &str) -> Option<&str> {
        self.get(header)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    fn is_blank(&self) -> bool {
        self.columns
            .iter()
            .all(|(_, value)| value.trim().is_empty())
    }
}

/// Read the whole file into row records, single pass, file order.
pub fn read_rows(path: &Path, format: FileFormat) -> Result<Vec<RowRecord>, IngestError> {
    match format {
        FileFormat::Csv => read_csv(path),
        FileFormat::Xlsx | FileFormat::Xls => read_excel(path),
    }
}

fn read_csv(path: &Path) -> Result<Vec<RowRecord>, IngestError> {
    let file_read = |message: String| IngestError::file_read(path.display().to_string(), message);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| file_read(e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| file_read(e.to_string()))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.into_records() {
        let record = record.map_err(|e| file_read(e.to_string()))?;
        let row = RowRecord::from_pairs(
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header, record.get(i).unwrap_or_default())),
        );
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }

    Ok(rows)
}

fn read_excel(path: &Path) -> Result<Vec<RowRecord>, IngestError> {
    let file_read = |message: String| IngestError::file_read(path.display().to_string(), message);

    let mut workbook =
        calamine::open_workbook_auto(path).map_err(|e| file_read(e.to_string()))?;

    // Only the first sheet is read
    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| file_read("workbook contains no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| file_read(e.to_string()))?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header_row) => header_row.iter().map(cell_to_string).collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for sheet_row in sheet_rows {
        let row = RowRecord::from_pairs(headers.iter().enumerate().map(|(i, header)| {
            (
                header.clone(),
                sheet_row.get(i).map(cell_to_string).unwrap_or_default(),
            )
        }));
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }

    Ok(rows)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|naive| naive.date().format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{:?}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn format_parses_declared_extensions() {
        assert_eq!(FileFormat::from_extension(".csv"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_extension("XLSX"), Some(FileFormat::Xlsx));
        assert_eq!(FileFormat::from_extension(".xls"), Some(FileFormat::Xls));
        assert_eq!(FileFormat::from_extension(".pdf"), None);
    }

    #[test]
    fn csv_rows_preserve_column_order_and_skip_empty_lines() {
        let file = write_temp("First Name,Email,Agent\nJo,jo@x.com,Smith\n\nAl,al@x.com,\n");
        let rows = read_rows(file.path(), FileFormat::Csv).unwrap();

        assert_eq!(rows.len(), 2);
        let headers: Vec<&str> = rows[0].headers().collect();
        assert_eq!(headers, vec!["First Name", "Email", "Agent"]);
        assert_eq!(rows[0].get("Email"), Some("jo@x.com"));
        assert_eq!(rows[1].non_blank("Agent"), None);
    }

    #[test]
    fn non_blank_trims_surrounding_whitespace() {
        let row = RowRecord::from_pairs([("Agent", "  Smith  "), ("Carrier", "   ")]);
        assert_eq!(row.non_blank("Agent"), Some("Smith"));
        assert_eq!(row.non_blank("Carrier"), None);
        assert_eq!(row.non_blank("Missing"), None);
        // Raw access still returns the untrimmed value
        assert_eq!(row.get("Agent"), Some("  Smith  "));
    }

    #[test]
    fn missing_file_is_a_file_read_error() {
        let err = read_rows(Path::new("/nonexistent/data.csv"), FileFormat::Csv).unwrap_err();
        assert!(matches!(err, IngestError::FileRead { .. }));
    }

    #[test]
    fn corrupt_workbook_is_a_file_read_error() {
        let file = write_temp("this is not a zip archive");
        let err = read_rows(file.path(), FileFormat::Xlsx).unwrap_err();
        assert!(matches!(err, IngestError::FileRead { .. }));
    }

    #[test]
    fn short_csv_rows_fill_missing_cells_with_blanks() {
        let file = write_temp("A,B,C\n1,2\n");
        let rows = read_rows(file.path(), FileFormat::Csv).unwrap();
        assert_eq!(rows[0].get("C"), Some(""));
    }
}
