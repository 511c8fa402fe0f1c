//! Schema registry - declarative table/column/index definitions.
//!
//! The registry is the single source of truth for both databases' DDL.
//! Adding a table means editing `tables.rs`; the writer, the query builder
//! and the integrity audit all pick it up from here. The writer verifies
//! the live database against the registry at startup and refuses to write
//! if a column is missing.

mod tables;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rusqlite::Connection;

use crate::error::{Result, StorageError};

/// SQLite column affinity used in generated DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn ddl(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// A single column declaration.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<&'static str>,
    /// Path-typed columns are forward-slash normalized at the writer
    /// boundary and audited after every run.
    pub is_path: bool,
}

impl ColumnDef {
    pub fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            default: None,
            is_path: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    pub fn path(mut self) -> Self {
        self.is_path = true;
        self
    }
}

/// Shorthand constructors used by `tables.rs`.
pub fn text(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Text)
}

pub fn integer(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Integer)
}

pub fn real(name: &'static str) -> ColumnDef {
    ColumnDef::new(name, ColumnType::Real)
}

/// Primary key flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    /// `<col> INTEGER PRIMARY KEY AUTOINCREMENT`; the column is synthesized
    /// by the registry and skipped by the writer's INSERT.
    RowId(&'static str),
    /// Natural single-column key.
    Column(&'static str),
    /// No declared primary key.
    None,
}

/// Foreign key declaration.
#[derive(Debug, Clone)]
pub struct ForeignKeyDef {
    pub column: &'static str,
    pub parent_table: &'static str,
    pub parent_column: &'static str,
    pub cascade: bool,
}

/// Secondary index declaration.
#[derive(Debug, Clone)]
pub struct IndexDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub unique: bool,
}

/// A table declaration.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: &'static str,
    pub primary_key: PrimaryKey,
    pub columns: Vec<ColumnDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub indexes: Vec<IndexDef>,
    pub unique: Option<&'static [&'static str]>,
    /// When set, records in this table carry `_parent_index` linking them to
    /// a record in `parent_table` of the same batch; the writer substitutes
    /// the parent rowid into `column`.
    pub parent_link: Option<ForeignKeyDef>,
}

impl TableDef {
    pub fn new(name: &'static str, primary_key: PrimaryKey, columns: Vec<ColumnDef>) -> Self {
        Self {
            name,
            primary_key,
            columns,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            unique: None,
            parent_link: None,
        }
    }

    pub fn foreign_key(
        mut self,
        column: &'static str,
        parent_table: &'static str,
        parent_column: &'static str,
        cascade: bool,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyDef {
            column,
            parent_table,
            parent_column,
            cascade,
        });
        self
    }

    /// Declare a cascade FK whose value is resolved from `_parent_index`
    /// at insert time.
    pub fn parent(mut self, column: &'static str, parent_table: &'static str) -> Self {
        let fk = ForeignKeyDef {
            column,
            parent_table,
            parent_column: "id",
            cascade: true,
        };
        self.foreign_keys.push(fk.clone());
        self.parent_link = Some(fk);
        self
    }

    pub fn index(mut self, name: &'static str, columns: &'static [&'static str]) -> Self {
        self.indexes.push(IndexDef {
            name,
            columns,
            unique: false,
        });
        self
    }

    pub fn unique_on(mut self, columns: &'static [&'static str]) -> Self {
        self.unique = Some(columns);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns the writer binds on INSERT (everything except a rowid PK).
    pub fn insert_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter()
    }

    pub fn path_columns(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| c.is_path)
            .map(|c| c.name)
            .collect()
    }

    fn create_sql(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let PrimaryKey::RowId(col) = self.primary_key {
            parts.push(format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", col));
        }
        for col in &self.columns {
            let mut decl = format!("{} {}", col.name, col.ty.ddl());
            if let PrimaryKey::Column(pk) = self.primary_key {
                if pk == col.name {
                    decl.push_str(" PRIMARY KEY");
                }
            }
            if !col.nullable {
                decl.push_str(" NOT NULL");
            }
            if let Some(default) = col.default {
                decl.push_str(&format!(" DEFAULT {}", default));
            }
            parts.push(decl);
        }
        if let Some(unique) = self.unique {
            parts.push(format!("UNIQUE({})", unique.join(", ")));
        }
        for fk in &self.foreign_keys {
            let mut decl = format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                fk.column, fk.parent_table, fk.parent_column
            );
            if fk.cascade {
                decl.push_str(" ON DELETE CASCADE");
            }
            parts.push(decl);
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            parts.join(",\n    ")
        )
    }

    /// Prepared-statement INSERT for this table, in declaration order.
    pub fn insert_sql(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            names.join(", "),
            placeholders.join(", ")
        )
    }
}

/// The full schema for `repo_index.db`, in FK-safe declaration order.
#[derive(Debug)]
pub struct SchemaRegistry {
    tables: Vec<TableDef>,
    by_name: HashMap<&'static str, usize>,
}

impl SchemaRegistry {
    fn new() -> Self {
        let tables = tables::all_tables();
        let by_name = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name, i))
            .collect();
        Self { tables, by_name }
    }

    /// Tables in FK-safe insertion order (parents before children).
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    /// Deterministic CREATE TABLE / CREATE INDEX statements.
    pub fn generate_sql(&self) -> Vec<String> {
        let mut stmts = Vec::new();
        for table in &self.tables {
            stmts.push(table.create_sql());
        }
        for table in &self.tables {
            for idx in &table.indexes {
                let unique = if idx.unique { "UNIQUE " } else { "" };
                stmts.push(format!(
                    "CREATE {}INDEX IF NOT EXISTS {} ON {}({})",
                    unique,
                    idx.name,
                    table.name,
                    idx.columns.join(", ")
                ));
            }
        }
        stmts
    }

    /// Typed query builder used by the rule engine: rejects unknown tables
    /// and columns so schema drift fails loudly instead of silently
    /// returning wrong shapes.
    pub fn build_query(
        &self,
        table: &str,
        columns: &[&str],
        where_clause: Option<&str>,
        order_by: Option<&str>,
    ) -> Result<String> {
        let def = self
            .table(table)
            .ok_or_else(|| StorageError::schema(format!("unknown table: {}", table)))?;
        for col in columns {
            let is_rowid_pk = matches!(def.primary_key, PrimaryKey::RowId(pk) if pk == *col);
            if !is_rowid_pk && def.column(col).is_none() {
                return Err(StorageError::schema(format!(
                    "unknown column: {}.{}",
                    table, col
                )));
            }
        }
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);
        if let Some(cond) = where_clause {
            sql.push_str(&format!(" WHERE {}", cond));
        }
        if let Some(order) = order_by {
            sql.push_str(&format!(" ORDER BY {}", order));
        }
        Ok(sql)
    }

    /// Verify the live database against the registry. Missing tables or
    /// columns are a fatal schema error; extra columns are tolerated
    /// (forward-compatible reads).
    pub fn verify(&self, conn: &Connection) -> Result<()> {
        for table in &self.tables {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table.name))?;
            let live: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<_>>()?;
            if live.is_empty() {
                return Err(StorageError::schema(format!(
                    "table missing from live database: {}",
                    table.name
                )));
            }
            for col in &table.columns {
                if !live.iter().any(|name| name == col.name) {
                    return Err(StorageError::schema(format!(
                        "column missing from live database: {}.{}",
                        table.name, col.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether any registered table resolves its `_parent_index` against
    /// this table's rowids (writer must capture them during insert).
    pub fn has_children(&self, table: &str) -> bool {
        self.tables
            .iter()
            .filter_map(|t| t.parent_link.as_ref())
            .any(|link| link.parent_table == table)
    }

    /// `(table, column)` pairs flagged as paths, for the integrity audit.
    pub fn all_path_columns(&self) -> Vec<(&'static str, &'static str)> {
        let mut out = Vec::new();
        for table in &self.tables {
            for col in table.path_columns() {
                out.push((table.name, col));
            }
        }
        out
    }
}

static REGISTRY: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::new);

/// The process-wide schema registry for `repo_index.db`.
pub fn registry() -> &'static SchemaRegistry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_core_tables() {
        let reg = registry();
        for name in [
            "files",
            "symbols",
            "refs",
            "assignments",
            "assignment_sources",
            "function_call_args",
            "function_return_sources",
            "api_endpoints",
            "api_endpoint_controls",
            "sql_queries",
            "sql_query_tables",
            "jwt_patterns",
            "cfg_blocks",
            "cfg_edges",
            "findings_consolidated",
            "extraction_errors",
            "taint_paths",
            "taint_path_steps",
        ] {
            assert!(reg.table(name).is_some(), "missing table {}", name);
        }
    }

    #[test]
    fn test_parents_declared_before_children() {
        let reg = registry();
        let position = |name: &str| reg.tables().iter().position(|t| t.name == name);
        for table in reg.tables() {
            for fk in &table.foreign_keys {
                let parent = position(fk.parent_table).expect("parent table registered");
                let child = position(table.name).expect("child table registered");
                assert!(
                    parent < child,
                    "{} must be declared before {}",
                    fk.parent_table,
                    table.name
                );
            }
        }
    }

    #[test]
    fn test_generate_sql_is_deterministic() {
        let a = registry().generate_sql();
        let b = registry().generate_sql();
        assert_eq!(a, b);
        assert!(a[0].contains("CREATE TABLE IF NOT EXISTS files"));
    }

    #[test]
    fn test_generated_sql_is_accepted_by_sqlite() {
        let conn = Connection::open_in_memory().expect("open");
        for stmt in registry().generate_sql() {
            conn.execute_batch(&stmt).expect("valid DDL");
        }
        registry().verify(&conn).expect("fresh database verifies");
    }

    #[test]
    fn test_build_query_rejects_drift() {
        let reg = registry();
        let sql = reg
            .build_query(
                "assignments",
                &["file", "line", "target_var", "source_expr"],
                Some("source_expr IS NOT NULL"),
                Some("file, line"),
            )
            .expect("valid query");
        assert_eq!(
            sql,
            "SELECT file, line, target_var, source_expr FROM assignments \
             WHERE source_expr IS NOT NULL ORDER BY file, line"
        );

        assert!(reg.build_query("assignments", &["no_such_col"], None, None).is_err());
        assert!(reg.build_query("no_such_table", &["x"], None, None).is_err());
    }

    #[test]
    fn test_verify_detects_missing_column() {
        let conn = Connection::open_in_memory().expect("open");
        for stmt in registry().generate_sql() {
            conn.execute_batch(&stmt).expect("valid DDL");
        }
        // Simulate drift: rebuild symbols without the scope column.
        conn.execute_batch(
            "DROP TABLE symbols;
             CREATE TABLE symbols (path TEXT, name TEXT, kind TEXT, line INTEGER)",
        )
        .expect("drift");
        let err = registry().verify(&conn).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Schema);
        assert!(err.message.contains("symbols"));
    }
}
