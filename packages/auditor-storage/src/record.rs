//! Record batches - the unit of exchange between extractors and the writer.
//!
//! Extractors are language-specific and live in another crate; they talk to
//! the writer in string-keyed JSON records so that adding a table to the
//! schema registry never requires touching this boundary.

use std::collections::BTreeMap;

use serde_json::Value;

/// One row destined for a table. Keys must match registry column names;
/// keys with a leading underscore (`_parent_index`) are writer metadata.
pub type Record = serde_json::Map<String, Value>;

/// Per-file extraction output, keyed by table name. BTreeMap keeps the
/// manifest and the writer's iteration deterministic.
pub type RecordBatches = BTreeMap<String, Vec<Record>>;

/// Metadata key linking a child record to the index of its parent record in
/// the same file's batch for the parent table. The writer substitutes the
/// real rowid during insertion.
pub const PARENT_INDEX_KEY: &str = "_parent_index";

/// Convert a JSON value into an owned SQLite value.
///
/// Arrays and objects are persisted as JSON text (the `controls`,
/// `metadata` and `details` columns).
pub fn json_to_sql(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

/// Total row count across all batches (underscore keys excluded by type:
/// batches only hold table names).
pub fn total_rows(batches: &RecordBatches) -> i64 {
    batches.values().map(|rows| rows.len() as i64).sum()
}
