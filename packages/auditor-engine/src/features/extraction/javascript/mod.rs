//! JS/TS extractor dispatcher (in-process tree-sitter path).
//!
//! When a pre-built extractor bundle is configured, the indexing
//! orchestrator routes JS files through the `bundle` subprocess client
//! instead of this dispatcher.

mod dataflow;
mod react;
mod routes;
mod symbols;

use auditor_storage::RecordBatches;

use crate::features::file_context::FileContext;

use super::common;

pub fn extract(ctx: &FileContext, batches: &mut RecordBatches) {
    symbols::extract(ctx, batches);
    dataflow::extract(ctx, batches);
    routes::extract(ctx, batches);
    react::extract(ctx, batches);
    common::extract_sql_strings(ctx, batches);
    common::extract_jwt_patterns(ctx, &common::JS_JWT, batches);
}
