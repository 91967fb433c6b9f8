//! Raw table readers for XLSX, CSV and JSON snapshot exports.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;

/// A cell as it came out of the source file, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
}

impl RawCell {
    pub fn from_text(s: &str) -> Self {
        if s.trim().is_empty() {
            RawCell::Empty
        } else {
            RawCell::Text(s.to_string())
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RawCell::Empty,
            Value::Number(n) => n.as_f64().map(RawCell::Number).unwrap_or(RawCell::Empty),
            Value::String(s) => RawCell::from_text(s),
            Value::Bool(b) => RawCell::Text(b.to_string()),
            other => RawCell::Text(other.to_string()),
        }
    }

    fn from_sheet(cell: &Data) -> Self {
        match cell {
            Data::Empty => RawCell::Empty,
            Data::Float(f) => RawCell::Number(*f),
            // text keeps ids and metrics beyond 2^53 exact
            Data::Int(i) => RawCell::Text(i.to_string()),
            Data::String(s) => RawCell::from_text(s),
            other => RawCell::from_text(&other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RawCell::Empty)
    }
}

/// Header row plus records, all cells untyped.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<RawCell>>,
}

impl RawTable {
    pub fn cell(&self, record: usize, column: usize) -> &RawCell {
        self.records
            .get(record)
            .and_then(|r| r.get(column))
            .unwrap_or(&RawCell::Empty)
    }
}

/// Supported on-disk formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xlsx,
    Csv,
    Json,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" => Some(SourceFormat::Xlsx),
            "csv" => Some(SourceFormat::Csv),
            "json" => Some(SourceFormat::Json),
            _ => None,
        }
    }
}

/// Read a table from disk. The error string is a human-readable reason.
pub fn read_table(path: &Path) -> Result<RawTable, String> {
    match SourceFormat::from_path(path) {
        Some(SourceFormat::Xlsx) => read_workbook(path),
        Some(SourceFormat::Csv) => read_csv(path),
        Some(SourceFormat::Json) => read_json(path),
        None => Err(format!(
            "unsupported snapshot format (expected .xlsx, .csv or .json): {}",
            path.display()
        )),
    }
}

fn clean_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_string()
}

/// First worksheet only; its first row is the header.
fn read_workbook(path: &Path) -> Result<RawTable, String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| e.to_string())?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no worksheets".to_string())?
        .map_err(|e| e.to_string())?;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(row) => row.iter().map(|c| clean_header(&c.to_string())).collect(),
        None => Vec::new(),
    };

    let records = rows
        .map(|row| row.iter().map(RawCell::from_sheet).collect::<Vec<_>>())
        .filter(|cells| !cells.iter().all(RawCell::is_empty))
        .collect();

    Ok(RawTable { headers, records })
}

fn read_csv(path: &Path) -> Result<RawTable, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    let headers = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(clean_header)
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| e.to_string())?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        records.push(record.iter().map(RawCell::from_text).collect());
    }

    Ok(RawTable { headers, records })
}

/// JSON sources are an array of objects keyed by column header. Columns keep
/// the order keys first appear in the file.
fn read_json(path: &Path) -> Result<RawTable, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let value: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| e.to_string())?;

    let Value::Array(rows) = value else {
        return Err("expected a JSON array of row objects".to_string());
    };

    let mut headers: Vec<String> = Vec::new();
    for row in &rows {
        let Value::Object(map) = row else {
            return Err("expected every JSON row to be an object".to_string());
        };
        for key in map.keys() {
            let key = key.trim();
            if !headers.iter().any(|h| h == key) {
                headers.push(key.to_string());
            }
        }
    }

    let records = rows
        .iter()
        .filter_map(|row| row.as_object())
        .map(|map| {
            let mut cells = vec![RawCell::Empty; headers.len()];
            for (key, value) in map {
                if let Some(idx) = headers.iter().position(|h| h == key.trim()) {
                    cells[idx] = RawCell::from_json(value);
                }
            }
            cells
        })
        .filter(|cells: &Vec<RawCell>| !cells.iter().all(RawCell::is_empty))
        .collect();

    Ok(RawTable { headers, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshots::coerce::{coerce_metric, normalize_id, CoercionMode};
    use crate::snapshots::columns::{Column, ColumnMap};
    use rust_xlsxwriter::Workbook;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_read_csv_trims_headers_and_skips_blank_lines() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, " Governor ID ,Power").unwrap();
        writeln!(file, "101,5000").unwrap();
        writeln!(file, ",").unwrap();
        writeln!(file, "102,").unwrap();

        let table = read_table(file.path()).unwrap();
        assert_eq!(table.headers, vec!["Governor ID", "Power"]);
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.cell(0, 1), &RawCell::Text("5000".into()));
        assert_eq!(table.cell(1, 1), &RawCell::Empty);
    }

    #[test]
    fn test_read_json_rows() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"[{{"Governor ID": 101, "Power": 5000.0}}, {{"Governor ID": "102", "Power": null, "Extra": true}}]"#
        )
        .unwrap();

        let table = read_table(file.path()).unwrap();
        assert_eq!(table.headers, vec!["Governor ID", "Power", "Extra"]);
        assert_eq!(table.cell(0, 0), &RawCell::Number(101.0));
        assert_eq!(table.cell(1, 0), &RawCell::Text("102".into()));
        assert_eq!(table.cell(1, 1), &RawCell::Empty);
        assert_eq!(table.cell(0, 2), &RawCell::Empty);
    }

    #[test]
    fn test_json_columns_keep_file_order() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"Power": 1, "Deaths": 7, "Governor ID": 5, "Deads": 9}}]"#).unwrap();

        let table = read_table(file.path()).unwrap();
        assert_eq!(table.headers, vec!["Power", "Deaths", "Governor ID", "Deads"]);

        let columns = ColumnMap::from_headers(&table.headers);
        assert_eq!(columns.position(Column::Deaths), Some(1));
    }

    #[test]
    fn test_read_xlsx_first_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kvk_start_power.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, " Governor ID ").unwrap();
        sheet.write_string(0, 1, "Power").unwrap();
        sheet.write_number(1, 0, 101).unwrap();
        sheet.write_string(1, 1, "5,000").unwrap();
        sheet.write_string(3, 0, "102").unwrap();
        sheet.write_number(3, 1, 2500.0).unwrap();
        workbook.save(&path).unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["Governor ID", "Power"]);
        // the blank row 2 is skipped
        assert_eq!(table.records.len(), 2);
        assert_eq!(normalize_id(table.cell(0, 0)).as_deref(), Some("101"));
        assert_eq!(coerce_metric(table.cell(0, 1), CoercionMode::Strict), Ok(5_000));
        assert_eq!(normalize_id(table.cell(1, 0)).as_deref(), Some("102"));
        assert_eq!(coerce_metric(table.cell(1, 1), CoercionMode::Strict), Ok(2_500));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = Builder::new().suffix(".txt").tempfile().unwrap();
        assert!(read_table(file.path()).is_err());
    }
}
