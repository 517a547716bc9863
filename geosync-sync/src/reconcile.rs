//! Schema reconciler: fit locator output to the destination schema.
//!
//! The plan is computed once per batch from the union of field names, so
//! every output row has the same attribute keys.
//!
//! Rules, per field:
//!
//! | field appears in        | required | result                                   |
//! |-------------------------|----------|------------------------------------------|
//! | source only             | –        | kept as is                               |
//! | engine only             | yes      | kept as is                               |
//! | engine only             | no       | dropped                                  |
//! | source and engine       | yes      | source → `<prefix>name`, engine → `name` |
//! | source and engine       | no       | source → `<prefix>name`, engine → `name<suffix>` |
//! | the working field       | –        | dropped from both sides                  |
//!
//! Required fields nobody supplies become `null` columns. A rename that
//! lands on an existing name aborts the run.

use std::collections::HashSet;

use serde_json::Value;

use geosync_core::{AddressRecord, Attributes, GeocodeResult, OutputRow, SchemaConfig};

use crate::error::SyncError;

/// Engine field carrying the match status code.
pub const STATUS_FIELD: &str = "Status";
/// Engine field carrying the match score.
pub const SCORE_FIELD: &str = "Score";

/// Where an output column takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// The raw record's field of this name.
    Source(String),
    /// The locator's field of this name.
    Engine(String),
    /// Required by the destination but supplied by neither side.
    Missing,
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub from: ColumnSource,
}

/// Column layout for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub columns: Vec<Column>,
    /// Engine fields left out of the destination.
    pub dropped: Vec<String>,
    /// `(from, to)` renames applied to colliding fields.
    pub renamed: Vec<(String, String)>,
}

impl ReconcilePlan {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Union of keys in first-seen order, minus the working field.
fn ordered_union<'a>(maps: impl Iterator<Item = &'a Attributes>, working: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for map in maps {
        for key in map.keys() {
            if key != working && seen.insert(key.as_str()) {
                names.push(key.clone());
            }
        }
    }
    names
}

/// Field names the locator produced for this batch.
pub fn engine_fields(results: &[GeocodeResult], working: &str) -> Vec<String> {
    let mut names = vec![STATUS_FIELD.to_string(), SCORE_FIELD.to_string()];
    for extra in ordered_union(results.iter().map(|r| &r.extra), working) {
        if !names.contains(&extra) {
            names.push(extra);
        }
    }
    names
}

/// Compute the column layout from the two field lists.
pub fn plan(
    source_fields: &[String],
    engine_fields: &[String],
    schema: &SchemaConfig,
) -> Result<ReconcilePlan, SyncError> {
    let working = schema.working_field.as_str();
    let source: Vec<&str> = source_fields
        .iter()
        .map(String::as_str)
        .filter(|f| *f != working)
        .collect();
    let engine: Vec<&str> = engine_fields
        .iter()
        .map(String::as_str)
        .filter(|f| *f != working)
        .collect();
    let required = |f: &str| schema.required_fields.iter().any(|r| r == f);

    let mut out = ReconcilePlan::default();
    for &field in &source {
        if engine.contains(&field) {
            let renamed = format!("{}{field}", schema.source_prefix);
            out.renamed.push((field.to_string(), renamed.clone()));
            out.columns.push(Column {
                name: renamed,
                from: ColumnSource::Source(field.to_string()),
            });
        } else {
            out.columns.push(Column {
                name: field.to_string(),
                from: ColumnSource::Source(field.to_string()),
            });
        }
    }

    for &field in &engine {
        let collides = source.contains(&field);
        let name = match (collides, required(field)) {
            (_, true) => field.to_string(),
            (true, false) => {
                let renamed = format!("{field}{}", schema.engine_suffix);
                out.renamed.push((field.to_string(), renamed.clone()));
                renamed
            }
            (false, false) => {
                out.dropped.push(field.to_string());
                continue;
            }
        };
        out.columns.push(Column {
            name,
            from: ColumnSource::Engine(field.to_string()),
        });
    }

    for field in &schema.required_fields {
        if field == working {
            continue;
        }
        if !out.columns.iter().any(|c| &c.name == field) {
            tracing::warn!("required field '{field}' is supplied by neither the batch nor the locator");
            out.columns.push(Column {
                name: field.clone(),
                from: ColumnSource::Missing,
            });
        }
    }

    check_unique(&out)?;
    Ok(out)
}

fn check_unique(plan: &ReconcilePlan) -> Result<(), SyncError> {
    let mut seen = HashSet::new();
    for column in &plan.columns {
        if !seen.insert(column.name.as_str()) {
            let field = match &column.from {
                ColumnSource::Source(f) | ColumnSource::Engine(f) => f.clone(),
                ColumnSource::Missing => column.name.clone(),
            };
            return Err(SyncError::SchemaCollision {
                field,
                candidate: column.name.clone(),
            });
        }
    }
    Ok(())
}

fn engine_value(result: &GeocodeResult, field: &str) -> Value {
    match field {
        STATUS_FIELD => Value::String(result.status.code().to_string()),
        SCORE_FIELD => serde_json::Number::from_f64(result.score)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        other => result.extra.get(other).cloned().unwrap_or(Value::Null),
    }
}

/// Reconcile a geocoded batch into output rows.
///
/// `records` and `results` must be the same length and in the same order.
pub fn reconcile(
    records: &[AddressRecord],
    results: &[GeocodeResult],
    schema: &SchemaConfig,
) -> Result<(ReconcilePlan, Vec<OutputRow>), SyncError> {
    if records.len() != results.len() {
        return Err(SyncError::geocode_engine(format!(
            "cannot reconcile {} result(s) against {} record(s)",
            results.len(),
            records.len()
        )));
    }

    let source_fields = ordered_union(records.iter().map(|r| &r.attributes), &schema.working_field);
    let engine_fields = engine_fields(results, &schema.working_field);
    let plan = plan(&source_fields, &engine_fields, schema)?;
    if !plan.renamed.is_empty() {
        let shown: Vec<String> = plan
            .renamed
            .iter()
            .map(|(from, to)| format!("{from} -> {to}"))
            .collect();
        tracing::info!("Renamed colliding field(s): {}", shown.join(", "));
    }
    if !plan.dropped.is_empty() {
        tracing::debug!("Dropped engine field(s): {}", plan.dropped.join(", "));
    }

    let rows = records
        .iter()
        .zip(results)
        .map(|(record, result)| {
            let mut attributes = Attributes::new();
            for column in &plan.columns {
                let value = match &column.from {
                    ColumnSource::Source(f) => {
                        record.attributes.get(f).cloned().unwrap_or(Value::Null)
                    }
                    ColumnSource::Engine(f) => engine_value(result, f),
                    ColumnSource::Missing => Value::Null,
                };
                attributes.insert(column.name.clone(), value);
            }
            OutputRow {
                incident_id: record.incident_id.clone(),
                geometry: result.location,
                attributes,
            }
        })
        .collect();
    Ok((plan, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosync_core::{IncidentId, Locality, MatchStatus, Point, StreetComponents};
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn record(id: u64, attributes: Value) -> AddressRecord {
        AddressRecord {
            incident_id: IncidentId::from(id),
            street: StreetComponents::default(),
            locality: Locality::default(),
            full_address: Some("1 Main St".to_string()),
            attributes: attrs(attributes),
        }
    }

    fn matched(x: f64, y: f64, extra: Value) -> GeocodeResult {
        GeocodeResult {
            location: Some(Point { x, y }),
            status: MatchStatus::Matched,
            score: 100.0,
            extra: attrs(extra),
        }
    }

    #[test]
    fn non_required_engine_fields_are_dropped() {
        let plan = plan(
            &names(&["Incidentid", "City"]),
            &names(&["Status", "Score", "Match_addr"]),
            &SchemaConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.column_names(), ["Incidentid", "City", "Status", "Score"]);
        assert_eq!(plan.dropped, ["Match_addr"]);
    }

    #[test]
    fn required_collision_keeps_engine_name_and_prefixes_source() {
        let plan = plan(
            &names(&["Incidentid", "Status"]),
            &names(&["Status", "Score"]),
            &SchemaConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.column_names(), ["Incidentid", "USER_Status", "Status", "Score"]);
        assert_eq!(plan.columns[1].from, ColumnSource::Source("Status".into()));
        assert_eq!(plan.columns[2].from, ColumnSource::Engine("Status".into()));
    }

    #[test]
    fn optional_collision_suffixes_engine_field() {
        let plan = plan(
            &names(&["Incidentid", "Match_addr"]),
            &names(&["Status", "Score", "Match_addr"]),
            &SchemaConfig::default(),
        )
        .unwrap();
        assert_eq!(
            plan.column_names(),
            ["Incidentid", "USER_Match_addr", "Status", "Score", "Match_addr_1"]
        );
        assert_eq!(plan.renamed.len(), 2);
    }

    #[test]
    fn rename_onto_existing_field_is_unresolved() {
        let err = plan(
            &names(&["Status", "USER_Status"]),
            &names(&["Status", "Score"]),
            &SchemaConfig::default(),
        )
        .unwrap_err();
        match err {
            SyncError::SchemaCollision { field, candidate } => {
                assert_eq!(field, "Status");
                assert_eq!(candidate, "USER_Status");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn working_field_never_reaches_output() {
        let plan = plan(
            &names(&["Incidentid", "full_add_temp"]),
            &names(&["Status", "Score", "full_add_temp"]),
            &SchemaConfig {
                required_fields: names(&["Status", "full_add_temp"]),
                ..SchemaConfig::default()
            },
        )
        .unwrap();
        assert!(!plan.column_names().contains(&"full_add_temp"));
    }

    #[test]
    fn absent_required_field_becomes_null_column() {
        let schema = SchemaConfig {
            required_fields: names(&["Status", "Loc_name"]),
            ..SchemaConfig::default()
        };
        let (plan, rows) = reconcile(
            &[record(1, json!({"Incidentid": "1"}))],
            &[GeocodeResult::unmatched()],
            &schema,
        )
        .unwrap();
        assert!(plan.column_names().contains(&"Loc_name"));
        assert_eq!(rows[0].attributes["Loc_name"], Value::Null);
    }

    #[test]
    fn rows_share_one_key_set_and_keep_geometry() {
        let records = [
            record(1, json!({"Incidentid": "1", "Status": "Open"})),
            record(2, json!({"Incidentid": "2"})),
            record(3, json!({"Incidentid": "3", "Status": "Closed"})),
        ];
        let results = [
            matched(1.0, 2.0, json!({"Match_addr": "1 MAIN ST"})),
            GeocodeResult::unmatched(),
            matched(3.0, 4.0, json!({})),
        ];
        let (_, rows) = reconcile(&records, &results, &SchemaConfig::default()).unwrap();
        assert_eq!(rows.len(), 3);

        let keys: Vec<Vec<&String>> = rows.iter().map(|r| r.attributes.keys().collect()).collect();
        assert!(keys.windows(2).all(|w| w[0] == w[1]));

        assert_eq!(rows[0].attributes["USER_Status"], "Open");
        assert_eq!(rows[0].attributes["Status"], "M");
        assert_eq!(rows[1].attributes["Status"], "U");
        assert_eq!(rows[1].attributes["USER_Status"], Value::Null);
        assert_eq!(rows[1].geometry, None);
        assert_eq!(rows[2].geometry, Some(Point { x: 3.0, y: 4.0 }));
        assert_eq!(rows[2].attributes["Score"], json!(100.0));
        assert!(!rows[0].attributes.contains_key("Match_addr"));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = reconcile(
            &[record(1, json!({}))],
            &[],
            &SchemaConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::GeocodeEngine(_)));
    }
}
