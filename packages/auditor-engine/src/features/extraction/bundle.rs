//! JS extractor bundle subprocess client.
//!
//! When a pre-built CommonJS bundle is configured, JS/TS files are
//! extracted by `node <bundle> <in_file> <out_file>` running on a worker
//! thread. The bundle writes `{<path>: {success, extracted_data,
//! error?}}` to `out_file`; on a fatal crash the last line of stderr must
//! be `{"type":"FATAL_CRASH","error":...,"stack":...}` - the Death
//! Rattle - so the orchestrator can attribute the failure instead of
//! guessing from an empty output.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use auditor_storage::RecordBatches;

use crate::errors::{AuditError, Result};

/// The bundle's fatal-crash report, emitted as the last stderr line.
#[derive(Debug, Clone, Deserialize)]
pub struct DeathRattle {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: String,
    #[serde(default)]
    pub stack: Option<String>,
}

/// Parse the Death Rattle from captured stderr, if present.
pub fn parse_death_rattle(stderr: &str) -> Option<DeathRattle> {
    let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty())?;
    let rattle: DeathRattle = serde_json::from_str(last_line.trim()).ok()?;
    if rattle.kind == "FATAL_CRASH" {
        Some(rattle)
    } else {
        None
    }
}

/// Per-file result parsed from the bundle's output JSON.
#[derive(Debug, Deserialize)]
struct BundleFileResult {
    success: bool,
    #[serde(default)]
    extracted_data: serde_json::Map<String, Value>,
    #[serde(default)]
    error: Option<String>,
}

pub struct BundleExtractor {
    bundle: PathBuf,
}

impl BundleExtractor {
    pub fn new(bundle: impl Into<PathBuf>) -> Self {
        Self {
            bundle: bundle.into(),
        }
    }

    /// Run the bundle on one file and convert its `extracted_data` into
    /// record batches keyed by table name.
    pub fn extract(&self, in_file: &Path, rel_path: &str) -> Result<RecordBatches> {
        let out_file = std::env::temp_dir().join(format!("auditor-bundle-{}.json", Uuid::new_v4()));

        let output = Command::new("node")
            .arg(&self.bundle)
            .arg(in_file)
            .arg(&out_file)
            .output()
            .map_err(|e| {
                AuditError::extraction(rel_path, format!("failed to spawn node: {}", e))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let _ = std::fs::remove_file(&out_file);
            if let Some(rattle) = parse_death_rattle(&stderr) {
                warn!(file = rel_path, error = %rattle.error, "bundle fatal crash");
                return Err(AuditError::extraction(
                    rel_path,
                    format!("bundle crashed: {}", rattle.error),
                ));
            }
            return Err(AuditError::extraction(
                rel_path,
                format!("bundle exited with {}", output.status),
            ));
        }

        let raw = std::fs::read_to_string(&out_file)
            .map_err(|e| AuditError::extraction(rel_path, format!("no bundle output: {}", e)))?;
        let _ = std::fs::remove_file(&out_file);

        let results: serde_json::Map<String, Value> = serde_json::from_str(&raw)?;
        let (_, file_value) = results
            .into_iter()
            .next()
            .ok_or_else(|| AuditError::extraction(rel_path, "bundle output is empty"))?;
        let result: BundleFileResult = serde_json::from_value(file_value)?;

        if !result.success {
            return Err(AuditError::extraction(
                rel_path,
                result
                    .error
                    .unwrap_or_else(|| "bundle reported failure".to_string()),
            ));
        }

        let mut batches = RecordBatches::new();
        for (table, rows) in result.extracted_data {
            let Value::Array(rows) = rows else { continue };
            let records = rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect::<Vec<_>>();
            if !records.is_empty() {
                batches.insert(table, records);
            }
        }
        debug!(file = rel_path, tables = batches.len(), "bundle extraction");
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_death_rattle_parsing() {
        let stderr = "some log noise\nmore noise\n{\"type\":\"FATAL_CRASH\",\"error\":\"heap OOM\",\"stack\":\"at parse (...)\"}\n";
        let rattle = parse_death_rattle(stderr).expect("rattle");
        assert_eq!(rattle.error, "heap OOM");
        assert!(rattle.stack.as_deref().unwrap_or("").contains("parse"));
    }

    #[test]
    fn test_non_rattle_stderr_is_ignored() {
        assert!(parse_death_rattle("plain panic text\n").is_none());
        assert!(parse_death_rattle("{\"type\":\"WARNING\",\"error\":\"x\"}\n").is_none());
        assert!(parse_death_rattle("").is_none());
    }

    /// End-to-end subprocess check; enabled by `AUDITOR_TEST_NODE` so CI
    /// without a Node toolchain still passes.
    #[test]
    fn test_bundle_round_trip_with_node() {
        if std::env::var("AUDITOR_TEST_NODE").is_err() {
            return;
        }
        let dir = std::env::temp_dir().join(format!("auditor-node-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let bundle = dir.join("bundle.cjs");
        std::fs::write(
            &bundle,
            r#"const fs = require('fs');
const [input, output] = process.argv.slice(2);
const result = {};
result[input] = { success: true, extracted_data: { symbols: [{ path: input, name: 'x', kind: 'variable', line: 1 }] } };
fs.writeFileSync(output, JSON.stringify(result));
"#,
        )
        .expect("write bundle");
        let source = dir.join("a.js");
        std::fs::write(&source, "const x = 1;\n").expect("write source");

        let extractor = BundleExtractor::new(&bundle);
        let batches = extractor.extract(&source, "a.js").expect("bundle run");
        assert_eq!(batches["symbols"].len(), 1);
    }
}
