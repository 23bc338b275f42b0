//! Tabular input: xlsx (first worksheet) or csv, read into header-keyed rows.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("unsupported spreadsheet format; upload .xlsx or .csv")]
    UnsupportedFormat,
    #[error("spreadsheet has no header row")]
    Empty,
    #[error("missing column `{0}`")]
    MissingColumn(String),
    #[error("failed to read spreadsheet: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Xlsx,
}

impl SheetFormat {
    pub fn detect(file_name: Option<&str>, content_type: Option<&str>) -> Option<Self> {
        let extension = file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("xlsx") => return Some(SheetFormat::Xlsx),
            Some("csv") => return Some(SheetFormat::Csv),
            _ => {}
        }
        match content_type {
            Some("text/csv") => Some(SheetFormat::Csv),
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet") => {
                Some(SheetFormat::Xlsx)
            }
            _ => None,
        }
    }
}

/// Header lookup key: lowercase alphanumerics only, so "Roll No", "roll_no" and "RollNo"
/// name the same column.
pub fn column_key(header: &str) -> String {
    header
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
pub struct SheetRow {
    /// 1-based line in the source, header included.
    pub line: usize,
    cells: HashMap<String, String>,
}

impl SheetRow {
    pub fn new(line: usize, cells: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            line,
            cells: cells
                .into_iter()
                .map(|(header, value)| (column_key(&header), value))
                .collect(),
        }
    }

    /// Trimmed cell value; blank cells read as absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .get(&column_key(column))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

impl Sheet {
    pub fn from_records(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        let rows = records
            .into_iter()
            .enumerate()
            .filter(|(_, record)| record.iter().any(|cell| !cell.trim().is_empty()))
            .map(|(idx, record)| {
                SheetRow::new(idx + 2, headers.iter().cloned().zip(record))
            })
            .collect();
        Self { headers, rows }
    }

    /// Rejects the whole sheet when a required header is absent.
    pub fn require_columns(&self, columns: &[&str]) -> Result<(), SheetError> {
        let present: Vec<String> = self.headers.iter().map(|header| column_key(header)).collect();
        match columns
            .iter()
            .find(|column| !present.contains(&column_key(column)))
        {
            Some(missing) => Err(SheetError::MissingColumn((*missing).to_string())),
            None => Ok(()),
        }
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => format!("#ERROR: {:?}", e),
        Data::DateTime(dt) => format!("{}", dt),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

fn parse_xlsx(bytes: &[u8]) -> Result<Sheet, SheetError> {
    let mut workbook = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|err| SheetError::Parse(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SheetError::Empty)?
        .map_err(|err| SheetError::Parse(err.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or(SheetError::Empty)?
        .iter()
        .map(|cell| cell_to_string(cell).trim().to_string())
        .collect();
    let records = rows
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();
    Ok(Sheet::from_records(headers, records))
}

fn parse_csv(bytes: &[u8]) -> Result<Sheet, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| SheetError::Parse(err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(|header| header.is_empty()) {
        return Err(SheetError::Empty);
    }

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| SheetError::Parse(err.to_string()))?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(Sheet::from_records(headers, records))
}

pub fn parse_sheet(bytes: &[u8], format: SheetFormat) -> Result<Sheet, SheetError> {
    match format {
        SheetFormat::Csv => parse_csv(bytes),
        SheetFormat::Xlsx => parse_xlsx(bytes),
    }
}
