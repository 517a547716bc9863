use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

pub const BATCH: &str = "\
Incidentid,Locationstreetnumber,Locationstreetdir,Locationstreetname,Locationstreettype,Locationcity,Locationpostal,Status
101,123,,Main,St,Fort Pierce,34950,Open
102,500,N,Orange,Ave,Fort Pierce,34950,Closed
103,9,,Nowhere,Ln,Fort Pierce,34950,Open
";

pub const POINTS: &str = "\
address,zip,x,y
123 Main St,34950,-80.33,27.44
500 N Orange Ave,34950,-80.32,27.45
";

pub const CONFIG: &str = "\
input: batch.csv
store: data/geocoded.json
replica:
  kind: file
  path: data/replica.json
geocoder:
  kind: reference
  points: points.csv
logging:
  file: logs/geosync.log
";

/// A job directory with a batch, a point table and `geosync.yaml`.
pub struct Job {
    pub dir: TempDir,
}

impl Job {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("batch.csv"), BATCH).expect("batch");
        fs::write(dir.path().join("points.csv"), POINTS).expect("points");
        fs::write(dir.path().join("geosync.yaml"), CONFIG).expect("config");
        Self { dir }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn config(&self) -> PathBuf {
        self.path("geosync.yaml")
    }

    /// `geosync` run from inside the job directory, colors off.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("geosync"));
        cmd.current_dir(self.dir.path())
            .env_remove("GEOSYNC_CONFIG")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }

    /// Rows of a store document, or none if it was never written.
    pub fn rows(&self, rel: &str) -> Vec<Value> {
        let path = self.path(rel);
        if !path.exists() {
            return Vec::new();
        }
        let doc: Value = serde_json::from_str(&fs::read_to_string(path).expect("read store"))
            .expect("store json");
        doc["rows"].as_array().cloned().unwrap_or_default()
    }

    /// Seed a store document with bare rows for `ids`.
    pub fn seed(&self, rel: &str, ids: &[&str]) {
        let rows: Vec<Value> = ids
            .iter()
            .map(|id| serde_json::json!({"incident_id": id, "geometry": null, "attributes": {}}))
            .collect();
        let doc = serde_json::json!({"updated_at": "2026-01-01T00:00:00Z", "rows": rows});
        write_json(&self.path(rel), &doc);
    }
}

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, serde_json::to_string_pretty(value).expect("json")).expect("write");
}
