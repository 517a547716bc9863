//! Raw batch intake.
//!
//! A [`BatchSource`] yields raw rows as ordered attribute maps; the shipped
//! [`FileBatch`] reads `.csv`, `.json` (array of objects) and `.ndjson`.
//! [`records_from_rows`] turns rows into [`AddressRecord`]s using the
//! configured [`ColumnMap`]. Any malformed row aborts the run before a write.

use std::path::{Path, PathBuf};

use serde_json::Value;

use geosync_core::{
    types::value_text, AddressRecord, Attributes, ColumnMap, IncidentId, Locality,
    StreetComponents,
};

use crate::error::{io_err, SyncError};

/// Supplier of the raw batch for one run.
pub trait BatchSource {
    /// Where the rows come from; ingestion errors point here.
    fn path(&self) -> &Path;

    /// Human-readable origin, used in logs.
    fn describe(&self) -> String {
        self.path().display().to_string()
    }

    /// All rows, in source order.
    fn read_rows(&self) -> Result<Vec<Attributes>, SyncError>;
}

/// Batch file on disk; format chosen by extension.
#[derive(Debug, Clone)]
pub struct FileBatch {
    path: PathBuf,
}

impl FileBatch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BatchSource for FileBatch {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<Attributes>, SyncError> {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => read_csv(&self.path),
            "json" => read_json_array(&self.path),
            "ndjson" | "jsonl" => read_ndjson(&self.path),
            other => Err(ingestion(
                &self.path,
                format!("unsupported batch format '.{other}' (expected .csv, .json or .ndjson)"),
            )),
        }
    }
}

fn ingestion(path: &Path, detail: impl Into<String>) -> SyncError {
    SyncError::Ingestion {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

/// Read a headed CSV file. Empty cells become `null`.
pub fn read_csv(path: &Path) -> Result<Vec<Attributes>, SyncError> {
    let csv_err = |source| SyncError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let mut row = Attributes::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            row.insert(header.to_string(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Read a JSON array of flat objects.
pub fn read_json_array(path: &Path) -> Result<Vec<Attributes>, SyncError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| ingestion(path, format!("invalid JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(ingestion(path, "expected a JSON array of objects"));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(ingestion(path, format!("row {}: not an object", i + 1))),
        })
        .collect()
}

/// Read newline-delimited JSON objects; blank lines are skipped.
pub fn read_ndjson(path: &Path) -> Result<Vec<Attributes>, SyncError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => rows.push(map),
            Ok(_) => return Err(ingestion(path, format!("line {}: not an object", i + 1))),
            Err(e) => return Err(ingestion(path, format!("line {}: {e}", i + 1))),
        }
    }
    Ok(rows)
}

/// Build address records from raw rows.
///
/// Every row must carry a non-blank id under `columns.incident_id`; address
/// columns may be missing or null.
pub fn records_from_rows(
    source: &Path,
    rows: Vec<Attributes>,
    columns: &ColumnMap,
) -> Result<Vec<AddressRecord>, SyncError> {
    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        let line = i + 1;
        let raw_id = row.get(&columns.incident_id).ok_or_else(|| {
            ingestion(
                source,
                format!("row {line}: missing id column '{}'", columns.incident_id),
            )
        })?;
        let incident_id = IncidentId::from_value(raw_id).ok_or_else(|| {
            ingestion(
                source,
                format!("row {line}: unusable id {raw_id} in '{}'", columns.incident_id),
            )
        })?;

        let text = |column: &str| row.get(column).and_then(value_text);
        let street = StreetComponents {
            number: text(&columns.street_number),
            direction: text(&columns.street_direction),
            name: text(&columns.street_name),
            street_type: text(&columns.street_type),
        };
        let locality = Locality {
            city: text(&columns.city),
            county: text(&columns.county),
            state: text(&columns.state),
            zip: text(&columns.zip),
            country: text(&columns.country),
        };

        records.push(AddressRecord {
            incident_id,
            street,
            locality,
            full_address: None,
            attributes: row,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn row(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn csv_empty_cells_become_null() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.csv");
        std::fs::write(
            &path,
            "Incidentid,Locationstreetnumber,Locationstreetdir\n17, 200 ,\n",
        )
        .unwrap();
        let rows = FileBatch::new(&path).read_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Locationstreetnumber"], json!("200"));
        assert_eq!(rows[0]["Locationstreetdir"], Value::Null);
    }

    #[test]
    fn csv_preserves_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.csv");
        std::fs::write(&path, "Zeta,Incidentid,Alpha\n1,2,3\n").unwrap();
        let rows = read_csv(&path).unwrap();
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, ["Zeta", "Incidentid", "Alpha"]);
    }

    #[test]
    fn json_array_batch_reads_objects_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[{"Incidentid": 12.0, "Locationstreetname": "Main"}, {"Incidentid": "13"}]"#,
        )
        .unwrap();
        let rows = FileBatch::new(&path).read_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Locationstreetname"], json!("Main"));
        let records = records_from_rows(&path, rows, &ColumnMap::default()).unwrap();
        assert_eq!(records[0].incident_id.as_str(), "12");
        assert_eq!(records[1].incident_id.as_str(), "13");
    }

    #[test]
    fn json_array_with_non_object_element_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(&path, r#"[{"Incidentid": 1}, "oops"]"#).unwrap();
        let err = read_json_array(&path).unwrap_err();
        assert!(matches!(err, SyncError::Ingestion { .. }));
        assert!(err.to_string().contains("row 2: not an object"), "got: {err}");

        std::fs::write(&path, r#"{"Incidentid": 1}"#).unwrap();
        let err = read_json_array(&path).unwrap_err();
        assert!(err.to_string().contains("expected a JSON array"), "got: {err}");
    }

    #[test]
    fn ndjson_skips_blank_lines_and_reports_line_numbers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.ndjson");
        std::fs::write(&path, "{\"Incidentid\": 1}\n\n[1,2]\n").unwrap();
        let err = read_ndjson(&path).unwrap_err();
        assert!(err.to_string().contains("line 3"), "got: {err}");
    }

    #[test]
    fn unknown_extension_is_ingestion_error() {
        let err = FileBatch::new("/tmp/batch.xlsx").read_rows().unwrap_err();
        assert!(matches!(err, SyncError::Ingestion { .. }));
    }

    #[test]
    fn records_pick_up_mapped_columns() {
        let rows = vec![row(json!({
            "Incidentid": 12.0,
            "Locationstreetnumber": 123,
            "Locationstreetdir": null,
            "Locationstreetname": "Main",
            "Locationstreettype": "St",
            "Locationcity": "Fort Pierce",
            "Locationpostal": "34950",
            "Complaint": "Loose dog"
        }))];
        let records = records_from_rows(Path::new("b.json"), rows, &ColumnMap::default()).unwrap();
        let r = &records[0];
        assert_eq!(r.incident_id.as_str(), "12");
        assert_eq!(r.street.number.as_deref(), Some("123"));
        assert_eq!(r.street.direction, None);
        assert_eq!(r.locality.zip.as_deref(), Some("34950"));
        assert_eq!(r.locality.county, None);
        assert_eq!(r.attributes["Complaint"], json!("Loose dog"));
    }

    #[test]
    fn missing_or_blank_id_aborts() {
        let missing = vec![row(json!({"Locationstreetname": "Main"}))];
        let err = records_from_rows(Path::new("b.json"), missing, &ColumnMap::default())
            .unwrap_err();
        assert!(err.to_string().contains("row 1: missing id column 'Incidentid'"), "got: {err}");

        let blank = vec![row(json!({"Incidentid": 1})), row(json!({"Incidentid": "  "}))];
        let err =
            records_from_rows(Path::new("b.json"), blank, &ColumnMap::default()).unwrap_err();
        assert!(err.to_string().contains("row 2"), "got: {err}");
    }
}
