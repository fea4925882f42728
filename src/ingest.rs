//! CSV decoding into [`RawDataset`]s.

use std::fs;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use thiserror::Error;
use tracing::info;

use crate::record::{RawDataset, RawRecord, RawValue};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset has a header row but no data rows")]
    EmptyDataset,
}

pub fn load_csv_dataset(path: &Path) -> Result<RawDataset, IngestError> {
    let file = fs::File::open(path)?;
    let dataset = read_csv_dataset(file)?;
    info!(
        component = "ingest",
        event = "ingest.file.loaded",
        path = %path.display(),
        rows = dataset.records.len(),
        columns = dataset.columns.len()
    );
    Ok(dataset)
}

/// First record is the header row. Rows may be shorter or longer than it.
pub fn read_csv_dataset<R: Read>(reader: R) -> Result<RawDataset, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        if is_blank(&record) {
            continue;
        }
        records.push(to_raw_record(&columns, &record));
    }

    if records.is_empty() {
        return Err(IngestError::EmptyDataset);
    }

    Ok(RawDataset::new(columns, records))
}

/// Blank → empty, finite number → number, anything else → trimmed text.
pub fn type_cell(raw: &str) -> RawValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return RawValue::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => RawValue::Number(value),
        _ => RawValue::Text(trimmed.to_string()),
    }
}

fn to_raw_record(columns: &[String], record: &StringRecord) -> RawRecord {
    let mut out = RawRecord::new();
    for (column, cell) in columns.iter().zip(record.iter()) {
        out.insert(column.clone(), type_cell(cell));
    }
    out
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_typed_dynamically() {
        assert_eq!(type_cell(""), RawValue::Empty);
        assert_eq!(type_cell("  "), RawValue::Empty);
        assert_eq!(type_cell(" 42 "), RawValue::Number(42.0));
        assert_eq!(type_cell("1e3"), RawValue::Number(1000.0));
        assert_eq!(type_cell("NaN"), RawValue::Text("NaN".to_string()));
        assert_eq!(
            type_cell(" B0ABC123 "),
            RawValue::Text("B0ABC123".to_string())
        );
    }

    #[test]
    fn reads_headers_and_rows_in_order() {
        let csv = "\u{feff}Datetime , ASIN,Sales Rank\n2024-01-01 10:00:00,B01,120\n\n2024-01-01 11:00:00,B02\n";
        let dataset = read_csv_dataset(csv.as_bytes()).expect("csv parses");

        assert_eq!(dataset.columns, vec!["Datetime", "ASIN", "Sales Rank"]);
        assert_eq!(dataset.records.len(), 2);
        assert_eq!(
            dataset.records[0].get("Sales Rank"),
            Some(&RawValue::Number(120.0))
        );
        assert_eq!(dataset.records[1].get("Sales Rank"), None);
    }

    #[test]
    fn header_only_input_is_empty() {
        let err = read_csv_dataset("date,asin,rank\n".as_bytes()).expect_err("no rows");
        assert!(matches!(err, IngestError::EmptyDataset));
    }
}
