//! Schema-driven writer for `repo_index.db`.
//!
//! Protocol, per file:
//!
//! 1. `BEGIN IMMEDIATE` transaction.
//! 2. Insert in registry order (parents before children) with prepared
//!    statements; child rows resolve `_parent_index` to the parent rowid.
//! 3. On any failure: `ROLLBACK`, append to `extraction_errors`, return an
//!    all-zero receipt. No partial persistence.
//! 4. On success: `COMMIT`, return the true counts.
//!
//! Path columns are forward-slash normalized at this boundary; extractors
//! may produce backslashes on Windows. A post-run integrity audit counts
//! backslash occurrences and fails the run on any hit.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StorageError};
use crate::fidelity::{Manifest, Receipt};
use crate::record::{json_to_sql, Record, RecordBatches, PARENT_INDEX_KEY};
use crate::schema::{registry, ColumnDef, ColumnType, SchemaRegistry, TableDef};

/// Owns the single write connection to `repo_index.db`.
#[derive(Debug)]
pub struct IndexWriter {
    conn: Connection,
    registry: &'static SchemaRegistry,
}

impl IndexWriter {
    /// Open (or create) the database at `path`, apply the registry DDL and
    /// verify the live schema. Refuses to write on mismatch.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        Self::init(conn)
    }

    /// In-memory writer (tests).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let reg = registry();
        for stmt in reg.generate_sql() {
            conn.execute_batch(&stmt)?;
        }
        reg.verify(&conn)?;
        Ok(Self {
            conn,
            registry: reg,
        })
    }

    /// Persist one file's batches atomically and return the receipt.
    ///
    /// Insert failures are a recoverable per-file condition: the
    /// transaction is rolled back, the failure lands in
    /// `extraction_errors`, and the receipt is all zeros. Only schema-level
    /// corruption is returned as `Err`.
    pub fn write_file(
        &mut self,
        file_path: &str,
        manifest: &Manifest,
        batches: &RecordBatches,
    ) -> Result<Receipt> {
        for table in batches.keys() {
            if self.registry.table(table).is_none() {
                return Err(StorageError::schema(format!(
                    "batch references unknown table: {}",
                    table
                )));
            }
        }

        match self.insert_all(batches) {
            Ok(mut counts) => {
                for table in manifest.counts.keys() {
                    counts.entry(table.clone()).or_insert(0);
                }
                debug!(file = file_path, rows = manifest.total(), "committed");
                Ok(Receipt {
                    tx_id: manifest.tx_id.clone(),
                    counts,
                })
            }
            Err(err) => {
                warn!(file = file_path, error = %err, "rolled back");
                self.record_error(file_path, "storage", &err.to_string())?;
                Ok(Receipt::zeros(manifest))
            }
        }
    }

    fn insert_all(&mut self, batches: &RecordBatches) -> Result<BTreeMap<String, i64>> {
        let registry = self.registry;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        let mut parent_rowids: HashMap<&'static str, Vec<i64>> = HashMap::new();

        for table in registry.tables() {
            let Some(rows) = batches.get(table.name) else {
                continue;
            };
            let inserted = insert_batch(&tx, registry, table, rows, &mut parent_rowids)?;
            counts.insert(table.name.to_string(), inserted);
        }

        tx.commit()?;
        Ok(counts)
    }

    /// Append a structured error record outside any file transaction.
    pub fn record_error(&self, file_path: &str, error_type: &str, message: &str) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.conn.execute(
            "INSERT INTO extraction_errors (file, error_type, message, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![normalize_slashes(file_path), error_type, message, now],
        )?;
        Ok(())
    }

    /// Count backslash occurrences across every path-flagged column; any
    /// non-zero count fails the run (fatal integrity violation).
    pub fn integrity_audit(&self) -> Result<()> {
        let mut violations = Vec::new();
        for (table, column) in self.registry.all_path_columns() {
            let count: i64 = self.conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE {} LIKE '%\\%'",
                    table, column
                ),
                [],
                |row| row.get(0),
            )?;
            if count > 0 {
                violations.push(format!("{}.{}: {} rows", table, column, count));
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(StorageError::integrity(format!(
                "backslash paths persisted: {}",
                violations.join(", ")
            )))
        }
    }

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        self.registry
            .table(table)
            .ok_or_else(|| StorageError::schema(format!("unknown table: {}", table)))?;
        Ok(self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?)
    }

    /// Read access for in-process consumers (tests, audits). The analysis
    /// stages open their own read connections.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn insert_batch(
    tx: &Transaction<'_>,
    registry: &SchemaRegistry,
    table: &TableDef,
    rows: &[Record],
    parent_rowids: &mut HashMap<&'static str, Vec<i64>>,
) -> Result<i64> {
    if rows.is_empty() {
        return Ok(0);
    }
    let sql = table.insert_sql();
    let mut stmt = tx.prepare(&sql)?;
    let capture_rowids = registry.has_children(table.name);
    let mut rowids = Vec::new();
    let mut inserted = 0i64;

    for record in rows {
        let values = bind_values(table, record, parent_rowids)?;
        stmt.execute(params_from_iter(values))?;
        if capture_rowids {
            rowids.push(tx.last_insert_rowid());
        }
        inserted += 1;
    }
    drop(stmt);

    if capture_rowids {
        parent_rowids.insert(table.name, rowids);
    }
    Ok(inserted)
}

/// Build the bound values for one record, in column declaration order.
///
/// Unknown keys are a schema-conformance error; missing keys fall back to
/// the declared default, then NULL. Path columns are normalized here.
fn bind_values(
    table: &TableDef,
    record: &Record,
    parent_rowids: &HashMap<&'static str, Vec<i64>>,
) -> Result<Vec<rusqlite::types::Value>> {
    for key in record.keys() {
        if key.starts_with('_') {
            continue;
        }
        if table.column(key).is_none() {
            return Err(StorageError::schema(format!(
                "record key not in registry: {}.{}",
                table.name, key
            )));
        }
    }

    let mut values = Vec::with_capacity(table.columns.len());
    for col in table.insert_columns() {
        if let Some(link) = &table.parent_link {
            if link.column == col.name {
                values.push(resolve_parent_rowid(table, record, parent_rowids)?);
                continue;
            }
        }
        let value = match record.get(col.name) {
            Some(Value::String(s)) if col.is_path => {
                rusqlite::types::Value::Text(normalize_slashes(s))
            }
            Some(v) => json_to_sql(v),
            None => default_value(col),
        };
        values.push(value);
    }
    Ok(values)
}

fn resolve_parent_rowid(
    table: &TableDef,
    record: &Record,
    parent_rowids: &HashMap<&'static str, Vec<i64>>,
) -> Result<rusqlite::types::Value> {
    let link = table
        .parent_link
        .as_ref()
        .ok_or_else(|| StorageError::schema(format!("{} has no parent link", table.name)))?;
    let index = record
        .get(PARENT_INDEX_KEY)
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            StorageError::database(format!(
                "{} record missing {} for {}",
                table.name, PARENT_INDEX_KEY, link.parent_table
            ))
        })?;
    let rowid = parent_rowids
        .get(link.parent_table)
        .and_then(|ids| ids.get(index as usize))
        .copied()
        .ok_or_else(|| {
            StorageError::database(format!(
                "{}: parent index {} out of range for {}",
                table.name, index, link.parent_table
            ))
        })?;
    Ok(rusqlite::types::Value::Integer(rowid))
}

fn default_value(col: &ColumnDef) -> rusqlite::types::Value {
    match col.default {
        Some(expr) => {
            let trimmed = expr.trim_matches('\'');
            match col.ty {
                ColumnType::Integer => rusqlite::types::Value::Integer(
                    trimmed.parse::<i64>().unwrap_or(0),
                ),
                ColumnType::Real => {
                    rusqlite::types::Value::Real(trimmed.parse::<f64>().unwrap_or(0.0))
                }
                ColumnType::Text => rusqlite::types::Value::Text(trimmed.to_string()),
            }
        }
        None => rusqlite::types::Value::Null,
    }
}

pub(crate) fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().expect("object record").clone()
    }

    fn file_batch(path: &str) -> RecordBatches {
        let mut batches = RecordBatches::new();
        batches.insert(
            "files".to_string(),
            vec![record(json!({
                "path": path,
                "language": "python",
                "size_bytes": 10,
                "sha256": "aa",
                "mtime": 1,
            }))],
        );
        batches
    }

    #[test]
    fn test_write_and_receipt() {
        let mut writer = IndexWriter::in_memory().expect("open");
        let mut batches = file_batch("app/a.py");
        batches.insert(
            "symbols".to_string(),
            vec![record(json!({
                "path": "app/a.py",
                "name": "handler",
                "kind": "function",
                "line": 3,
            }))],
        );
        let manifest = Manifest::for_batches(&batches);
        let receipt = writer.write_file("app/a.py", &manifest, &batches).expect("write");
        assert_eq!(receipt.tx_id, manifest.tx_id);
        assert_eq!(receipt.counts["files"], 1);
        assert_eq!(receipt.counts["symbols"], 1);
        assert_eq!(writer.count_rows("symbols").expect("count"), 1);
    }

    #[test]
    fn test_backslashes_normalized_at_boundary() {
        let mut writer = IndexWriter::in_memory().expect("open");
        let batches = file_batch("app\\win\\module.py");
        let manifest = Manifest::for_batches(&batches);
        writer
            .write_file("app\\win\\module.py", &manifest, &batches)
            .expect("write");
        let path: String = writer
            .connection()
            .query_row("SELECT path FROM files", [], |row| row.get(0))
            .expect("row");
        assert_eq!(path, "app/win/module.py");
        writer.integrity_audit().expect("no backslashes persisted");
    }

    #[test]
    fn test_parent_index_resolution() {
        let mut writer = IndexWriter::in_memory().expect("open");
        let mut batches = file_batch("app/a.py");
        batches.insert(
            "assignments".to_string(),
            vec![record(json!({
                "file": "app/a.py",
                "line": 7,
                "target_var": "query",
                "source_expr": "base + suffix",
                "scope": "build",
            }))],
        );
        batches.insert(
            "assignment_sources".to_string(),
            vec![
                record(json!({"_parent_index": 0, "source_var": "base"})),
                record(json!({"_parent_index": 0, "source_var": "suffix"})),
            ],
        );
        let manifest = Manifest::for_batches(&batches);
        let receipt = writer.write_file("app/a.py", &manifest, &batches).expect("write");
        assert_eq!(receipt.counts["assignment_sources"], 2);

        let linked: i64 = writer
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM assignment_sources s
                 JOIN assignments a ON a.id = s.assignment_id
                 WHERE a.target_var = 'query'",
                [],
                |row| row.get(0),
            )
            .expect("join");
        assert_eq!(linked, 2);
    }

    #[test]
    fn test_rollback_returns_zero_receipt() {
        let mut writer = IndexWriter::in_memory().expect("open");
        let mut batches = file_batch("app/a.py");
        // Second symbols row violates NOT NULL on kind -> whole file rolls back.
        batches.insert(
            "symbols".to_string(),
            vec![
                record(json!({"path": "app/a.py", "name": "ok", "kind": "function", "line": 1})),
                record(json!({"path": "app/a.py", "name": "bad", "kind": null, "line": 2})),
            ],
        );
        let manifest = Manifest::for_batches(&batches);
        let receipt = writer.write_file("app/a.py", &manifest, &batches).expect("recoverable");
        assert_eq!(receipt.total(), 0);
        assert_eq!(writer.count_rows("files").expect("count"), 0);
        assert_eq!(writer.count_rows("symbols").expect("count"), 0);
        assert_eq!(writer.count_rows("extraction_errors").expect("count"), 1);
    }

    #[test]
    fn test_unknown_table_fails_loud() {
        let mut writer = IndexWriter::in_memory().expect("open");
        let mut batches = file_batch("app/a.py");
        batches.insert("not_a_table".to_string(), vec![Record::new()]);
        let manifest = Manifest::for_batches(&batches);
        let err = writer.write_file("app/a.py", &manifest, &batches).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Schema);
    }

    #[test]
    fn test_unknown_column_fails_loud() {
        let mut writer = IndexWriter::in_memory().expect("open");
        let mut batches = file_batch("app/a.py");
        batches.insert(
            "refs".to_string(),
            vec![record(json!({
                "src_path": "app/a.py",
                "kind": "import",
                "value": "os",
                "line": 1,
                "not_a_column": true,
            }))],
        );
        let manifest = Manifest::for_batches(&batches);
        let receipt = writer.write_file("app/a.py", &manifest, &batches).expect("recoverable");
        // Rolled back with a structured error, zero receipt.
        assert_eq!(receipt.total(), 0);
        let message: String = writer
            .connection()
            .query_row(
                "SELECT message FROM extraction_errors LIMIT 1",
                [],
                |row| row.get(0),
            )
            .expect("error row");
        assert!(message.contains("not_a_column"));
    }
}
