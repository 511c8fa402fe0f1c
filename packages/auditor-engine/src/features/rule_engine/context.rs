//! Rule execution context.

use rusqlite::Connection;

use auditor_storage::{registry, SchemaRegistry};

use crate::config::AuditConfig;
use crate::errors::Result;
use crate::features::file_context::FileContext;
use crate::shared::models::FileInfo;

/// Current file for `execution_scope = file` rules.
pub struct FileScope<'a> {
    pub info: &'a FileInfo,
    pub context: &'a FileContext,
}

/// What a rule gets to see: a read connection to `repo_index.db`, the
/// schema registry's query builder, the run configuration, and (for file
/// rules) the parsed file.
pub struct RuleContext<'a> {
    pub conn: &'a Connection,
    pub config: &'a AuditConfig,
    pub file: Option<FileScope<'a>>,
}

impl<'a> RuleContext<'a> {
    pub fn database(conn: &'a Connection, config: &'a AuditConfig) -> Self {
        Self {
            conn,
            config,
            file: None,
        }
    }

    pub fn for_file(
        conn: &'a Connection,
        config: &'a AuditConfig,
        info: &'a FileInfo,
        context: &'a FileContext,
    ) -> Self {
        Self {
            conn,
            config,
            file: Some(FileScope { info, context }),
        }
    }

    pub fn schema(&self) -> &'static SchemaRegistry {
        registry()
    }

    /// Registry-checked query builder; drift against the schema fails
    /// loudly here instead of silently mis-reading columns.
    pub fn build_query(
        &self,
        table: &str,
        columns: &[&str],
        where_clause: Option<&str>,
        order_by: Option<&str>,
    ) -> Result<String> {
        Ok(self
            .schema()
            .build_query(table, columns, where_clause, order_by)?)
    }
}
