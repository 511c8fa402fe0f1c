//! Schema memory cache.
//!
//! A read-only in-memory projection of the `repo_index.db` tables the
//! analyzer touches, indexed by the access patterns that matter. Loaded
//! once, shared read-only across workers; a compatibility adapter lets
//! rule-style consumers reuse the same cache.

use std::collections::HashSet;

use rusqlite::Connection;
use rustc_hash::FxHashMap;

use auditor_storage::registry;

use crate::errors::Result;
use crate::features::graph_builder::{load_model, IndexModel};

#[derive(Debug, Clone)]
pub struct CfgBlockRow {
    pub block_id: i64,
    pub kind: String,
    pub start_line: i64,
    pub end_line: i64,
}

#[derive(Debug, Clone)]
pub struct CfgEdgeRow {
    pub src_block: i64,
    pub dst_block: i64,
    pub kind: String,
}

/// Read-only projection of the indexed model plus CFGs.
pub struct SchemaCache {
    pub model: IndexModel,
    /// Indexes into `model.assignments` by file.
    pub assignments_by_file: FxHashMap<String, Vec<usize>>,
    /// Indexes into `model.call_args` by file.
    pub call_args_by_file: FxHashMap<String, Vec<usize>>,
    pub cfg_blocks_by_function: FxHashMap<(String, String), Vec<CfgBlockRow>>,
    pub cfg_edges_by_function: FxHashMap<(String, String), Vec<CfgEdgeRow>>,
    /// Files that define API endpoints (controller files).
    pub controller_files: HashSet<String>,
    pub file_mtimes: FxHashMap<String, i64>,
}

impl SchemaCache {
    pub fn load(conn: &Connection) -> Result<Self> {
        let reg = registry();
        let model = load_model(conn)?;

        let mut assignments_by_file: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (index, assignment) in model.assignments.iter().enumerate() {
            assignments_by_file
                .entry(assignment.file.clone())
                .or_default()
                .push(index);
        }

        let mut call_args_by_file: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (index, call) in model.call_args.iter().enumerate() {
            call_args_by_file
                .entry(call.file.clone())
                .or_default()
                .push(index);
        }

        let sql = reg.build_query(
            "cfg_blocks",
            &["file", "function_name", "block_id", "kind", "start_line", "end_line"],
            None,
            Some("file, function_name, block_id"),
        )?;
        let mut stmt = conn.prepare(&sql)?;
        let mut cfg_blocks_by_function: FxHashMap<(String, String), Vec<CfgBlockRow>> =
            FxHashMap::default();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                CfgBlockRow {
                    block_id: row.get(2)?,
                    kind: row.get(3)?,
                    start_line: row.get(4)?,
                    end_line: row.get(5)?,
                },
            ))
        })?;
        for row in rows {
            let (file, function, block) = row?;
            cfg_blocks_by_function
                .entry((file, function))
                .or_default()
                .push(block);
        }

        let sql = reg.build_query(
            "cfg_edges",
            &["file", "function_name", "src_block", "dst_block", "kind"],
            None,
            Some("file, function_name, src_block"),
        )?;
        let mut stmt = conn.prepare(&sql)?;
        let mut cfg_edges_by_function: FxHashMap<(String, String), Vec<CfgEdgeRow>> =
            FxHashMap::default();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                CfgEdgeRow {
                    src_block: row.get(2)?,
                    dst_block: row.get(3)?,
                    kind: row.get(4)?,
                },
            ))
        })?;
        for row in rows {
            let (file, function, edge) = row?;
            cfg_edges_by_function
                .entry((file, function))
                .or_default()
                .push(edge);
        }

        let sql = reg.build_query("api_endpoints", &["file"], None, None)?;
        let mut stmt = conn.prepare(&sql)?;
        let controller_files: HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<_>>()?;

        let sql = reg.build_query("files", &["path", "mtime"], None, None)?;
        let mut stmt = conn.prepare(&sql)?;
        let file_mtimes: FxHashMap<String, i64> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        Ok(Self {
            model,
            assignments_by_file,
            call_args_by_file,
            cfg_blocks_by_function,
            cfg_edges_by_function,
            controller_files,
            file_mtimes,
        })
    }

    /// CFG lookup; `None` means the caller must treat the function as a
    /// single linear block.
    pub fn cfg_for(&self, file: &str, function: &str) -> Option<&[CfgBlockRow]> {
        self.cfg_blocks_by_function
            .get(&(file.to_string(), function.to_string()))
            .map(Vec::as_slice)
    }

    pub fn cfg_edges_for(&self, file: &str, function: &str) -> Option<&[CfgEdgeRow]> {
        self.cfg_edges_by_function
            .get(&(file.to_string(), function.to_string()))
            .map(Vec::as_slice)
    }

    pub fn is_controller_file(&self, file: &str) -> bool {
        self.controller_files.contains(file)
    }

    pub fn mtime_of(&self, file: &str) -> i64 {
        self.file_mtimes.get(file).copied().unwrap_or(0)
    }

    /// Parameter names of a function, in declaration order with the
    /// implicit receiver dropped.
    pub fn params_of(&self, file: &str, function: &str) -> Vec<&str> {
        let mut params: Vec<&str> = self
            .model
            .parameters
            .iter()
            .filter(|p| p.path == file && p.scope == function)
            .map(|p| p.name.as_str())
            .collect();
        if params.first().is_some_and(|p| *p == "self" || *p == "cls") {
            params.remove(0);
        }
        params
    }
}
