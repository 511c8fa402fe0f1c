//! Python extractor dispatcher.
//!
//! Delegates to topic-specific extractors; each reads the pre-built
//! `NodeIndex` and appends record batches. Order is irrelevant except that
//! parent tables must be appended before their `_parent_index` children
//! within one topic.

mod cfg;
mod dataflow;
mod orm;
mod routes;
mod symbols;

use auditor_storage::RecordBatches;

use crate::features::file_context::FileContext;

use super::common;

pub fn extract(ctx: &FileContext, batches: &mut RecordBatches) {
    symbols::extract(ctx, batches);
    dataflow::extract(ctx, batches);
    routes::extract(ctx, batches);
    orm::extract(ctx, batches);
    cfg::extract(ctx, batches);
    common::extract_sql_strings(ctx, batches);
    common::extract_jwt_patterns(ctx, &common::PYTHON_JWT, batches);
}
