//! Extractor framework.
//!
//! Each language has one top-level dispatcher receiving `(file_info,
//! content, context)` and returning record batches keyed by table name.
//! Extractors are pure: no I/O, no global state, deterministic on
//! `(content, context)`. Parsing failures are handled upstream (a file
//! that reaches a dispatcher parsed cleanly).

pub mod bundle;
mod common;
pub mod javascript;
pub mod python;

use auditor_storage::{Record, RecordBatches};
use serde_json::Value;

use crate::features::file_context::FileContext;
use crate::shared::models::{FileInfo, Language};

/// Dispatch to the language extractor. Every batch set includes the
/// file's own `files` row so the writer commits it in the same
/// transaction as its children.
pub fn extract_file(info: &FileInfo, ctx: &FileContext) -> RecordBatches {
    let mut batches = RecordBatches::new();
    push(&mut batches, "files", Value::Object(info.to_record()));

    match info.language {
        Language::Python => python::extract(ctx, &mut batches),
        Language::TypeScript | Language::JavaScript => javascript::extract(ctx, &mut batches),
    }
    batches
}

/// Append one JSON-object record to a table batch.
pub(crate) fn push(batches: &mut RecordBatches, table: &str, value: Value) {
    if let Value::Object(record) = value {
        batches.entry(table.to_string()).or_default().push(record);
    } else {
        debug_assert!(false, "records must be JSON objects");
    }
}

/// Append a child record carrying `_parent_index` into `parent_index`.
pub(crate) fn push_child(
    batches: &mut RecordBatches,
    table: &str,
    parent_index: usize,
    mut value: Value,
) {
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            auditor_storage::record::PARENT_INDEX_KEY.to_string(),
            Value::from(parent_index as u64),
        );
    }
    push(batches, table, value);
}

/// Rows already queued for `table` (used to compute `_parent_index`).
pub(crate) fn batch_len(batches: &RecordBatches, table: &str) -> usize {
    batches.get(table).map(Vec::len).unwrap_or(0)
}

#[allow(unused_imports)]
pub(crate) use common::{
    extract_jwt_patterns, extract_sql_strings, string_literal_value, JwtCallees,
};

#[allow(unused_imports)]
pub(crate) type ExtractionRecord = Record;
