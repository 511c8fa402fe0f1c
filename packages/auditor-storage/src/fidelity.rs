//! Data fidelity handshake.
//!
//! Every file's extraction yields a manifest (what was extracted); the
//! writer answers with a receipt (what was persisted). Reconciliation turns
//! the "Silent Omission" failure mode - an extractor that appears to succeed
//! while its rows are dropped before persistence - into a loud failure.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::record::RecordBatches;

/// Extraction manifest: per-table row counts plus the transaction token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub tx_id: String,
    pub counts: BTreeMap<String, i64>,
}

impl Manifest {
    /// Build a manifest for a batch set, minting a fresh transaction token.
    pub fn for_batches(batches: &RecordBatches) -> Self {
        let counts = batches
            .iter()
            .map(|(table, rows)| (table.clone(), rows.len() as i64))
            .collect();
        Self {
            tx_id: Uuid::new_v4().to_string(),
            counts,
        }
    }

    /// An empty manifest (used for files that failed to parse).
    pub fn empty() -> Self {
        Self {
            tx_id: Uuid::new_v4().to_string(),
            counts: BTreeMap::new(),
        }
    }

    pub fn total(&self) -> i64 {
        self.counts.values().sum()
    }

    /// Wire form: `{table: count, ..., "_tx_id": uuid}`. Extra keys with a
    /// leading underscore are metadata and ignored by reconciliation.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (table, count) in &self.counts {
            map.insert(table.clone(), Value::from(*count));
        }
        map.insert("_tx_id".to_string(), Value::from(self.tx_id.clone()));
        Value::Object(map)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| StorageError::serialization("manifest must be a JSON object"))?;
        let tx_id = obj
            .get("_tx_id")
            .and_then(Value::as_str)
            .ok_or_else(|| StorageError::serialization("manifest missing _tx_id"))?
            .to_string();
        let mut counts = BTreeMap::new();
        for (key, val) in obj {
            if key.starts_with('_') {
                continue;
            }
            counts.insert(key.clone(), val.as_i64().unwrap_or(0));
        }
        Ok(Self { tx_id, counts })
    }
}

/// Storage receipt: what the writer actually persisted, echoing the
/// manifest's transaction token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_id: String,
    pub counts: BTreeMap<String, i64>,
}

impl Receipt {
    /// All-zero receipt for a rolled-back file.
    pub fn zeros(manifest: &Manifest) -> Self {
        Self {
            tx_id: manifest.tx_id.clone(),
            counts: manifest.counts.keys().map(|t| (t.clone(), 0)).collect(),
        }
    }

    pub fn total(&self) -> i64 {
        self.counts.values().sum()
    }
}

/// Reconciliation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FidelityStatus {
    Ok,
    Warning,
    Failed,
}

impl FidelityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FidelityStatus::Ok => "OK",
            FidelityStatus::Warning => "WARNING",
            FidelityStatus::Failed => "FAILED",
        }
    }
}

/// Structured reconciliation result, persisted alongside warnings.
#[derive(Debug, Clone)]
pub struct FidelityReport {
    pub status: FidelityStatus,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Compare extraction manifest (what was found) vs storage receipt (what was
/// saved).
///
/// - `extracted > 0 && stored == 0` is a 100% loss: `StorageError` with kind
///   `Fidelity` in strict mode, log-and-continue otherwise.
/// - Unequal non-zero counts are a warning with the delta.
/// - A transaction-token mismatch indicates a serialization bug and is
///   always fatal.
pub fn reconcile_fidelity(
    manifest: &Manifest,
    receipt: &Receipt,
    file_path: &str,
    strict: bool,
) -> Result<FidelityReport> {
    if manifest.tx_id != receipt.tx_id {
        return Err(StorageError::fidelity(format!(
            "transaction token mismatch for {}: manifest {} vs receipt {}",
            file_path, manifest.tx_id, receipt.tx_id
        )));
    }

    let mut tables: Vec<&String> = manifest.counts.keys().collect();
    for table in receipt.counts.keys() {
        if !manifest.counts.contains_key(table) {
            tables.push(table);
        }
    }
    tables.sort();

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for table in tables {
        let extracted = manifest.counts.get(table).copied().unwrap_or(0);
        let stored = receipt.counts.get(table).copied().unwrap_or(0);

        if extracted > 0 && stored == 0 {
            errors.push(format!(
                "{}: extracted {} -> stored 0 (100% LOSS)",
                table, extracted
            ));
        } else if extracted != stored {
            let delta = extracted - stored;
            warnings.push(format!(
                "{}: extracted {} -> stored {} (delta: {})",
                table, extracted, stored, delta
            ));
        }
    }

    let status = if !errors.is_empty() {
        FidelityStatus::Failed
    } else if !warnings.is_empty() {
        FidelityStatus::Warning
    } else {
        FidelityStatus::Ok
    };

    let report = FidelityReport {
        status,
        errors: errors.clone(),
        warnings: warnings.clone(),
    };

    if !errors.is_empty() {
        let mut message = format!(
            "Fidelity check FAILED for {}. Zero-fallback violation.\n{}",
            file_path,
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
        if !warnings.is_empty() {
            message.push_str(&format!(
                "\nAdditional warnings:\n{}",
                warnings
                    .iter()
                    .map(|w| format!("  - {}", w))
                    .collect::<Vec<_>>()
                    .join("\n")
            ));
        }
        if strict {
            error!("{}", message);
            return Err(StorageError::fidelity(message));
        }
        error!("[non-strict] {}", message);
    } else if !warnings.is_empty() {
        warn!(
            "Fidelity warnings for {}:\n{}",
            file_path,
            warnings
                .iter()
                .map(|w| format!("  - {}", w))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with(counts: &[(&str, i64)]) -> Manifest {
        Manifest {
            tx_id: "tx-1".to_string(),
            counts: counts
                .iter()
                .map(|(t, c)| (t.to_string(), *c))
                .collect(),
        }
    }

    fn receipt_with(counts: &[(&str, i64)]) -> Receipt {
        Receipt {
            tx_id: "tx-1".to_string(),
            counts: counts
                .iter()
                .map(|(t, c)| (t.to_string(), *c))
                .collect(),
        }
    }

    #[test]
    fn test_ok_when_counts_match() {
        let report = reconcile_fidelity(
            &manifest_with(&[("symbols", 4), ("refs", 2)]),
            &receipt_with(&[("symbols", 4), ("refs", 2)]),
            "a.py",
            true,
        )
        .expect("ok");
        assert_eq!(report.status, FidelityStatus::Ok);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_total_loss_is_error_in_strict_mode() {
        let err = reconcile_fidelity(
            &manifest_with(&[("symbols", 4)]),
            &receipt_with(&[("symbols", 0)]),
            "a.py",
            true,
        )
        .unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Fidelity);
        assert!(err.message.contains("100% LOSS"));
    }

    #[test]
    fn test_total_loss_continues_in_non_strict_mode() {
        let report = reconcile_fidelity(
            &manifest_with(&[("symbols", 4)]),
            &receipt_with(&[("symbols", 0)]),
            "a.py",
            false,
        )
        .expect("non-strict continues");
        assert_eq!(report.status, FidelityStatus::Failed);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_partial_delta_is_warning() {
        let report = reconcile_fidelity(
            &manifest_with(&[("symbols", 4)]),
            &receipt_with(&[("symbols", 3)]),
            "a.py",
            true,
        )
        .expect("warning, not error");
        assert_eq!(report.status, FidelityStatus::Warning);
        assert_eq!(report.warnings, vec!["symbols: extracted 4 -> stored 3 (delta: 1)"]);
    }

    #[test]
    fn test_tx_id_mismatch_is_fatal() {
        let manifest = manifest_with(&[("symbols", 1)]);
        let mut receipt = receipt_with(&[("symbols", 1)]);
        receipt.tx_id = "tx-2".to_string();
        let err = reconcile_fidelity(&manifest, &receipt, "a.py", false).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Fidelity);
        assert!(err.message.contains("token mismatch"));
    }

    #[test]
    fn test_json_round_trip_ignores_underscore_keys() {
        let manifest = manifest_with(&[("symbols", 2)]);
        let mut json = manifest.to_json();
        json.as_object_mut()
            .expect("object")
            .insert("_elapsed_ms".to_string(), serde_json::Value::from(12));
        let parsed = Manifest::from_json(&json).expect("parse");
        assert_eq!(parsed.counts, manifest.counts);
        assert_eq!(parsed.tx_id, "tx-1");
    }
}
