//! Store for `graphs.db` - the typed code graph.
//!
//! Two tables. Node ids are content-addressed `file::scope::identifier`
//! triples. For every forward `data_flow` edge a `<type>_reverse` mirror
//! with swapped endpoints must exist; the store verifies that invariant
//! before a build is allowed to complete.

use std::path::Path;

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::{Result, StorageError};

/// Row shape for `nodes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub id: String,
    pub kind: String,
    pub file: String,
    pub line: i64,
    pub metadata: Option<String>,
}

/// Row shape for `edges`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRow {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: String,
    pub graph_type: String,
    pub metadata: Option<String>,
}

impl EdgeRow {
    /// The backward-slicing mirror: endpoints swapped, type suffixed
    /// `_reverse`, metadata identical.
    pub fn reversed(&self) -> EdgeRow {
        EdgeRow {
            source_id: self.target_id.clone(),
            target_id: self.source_id.clone(),
            edge_type: format!("{}_reverse", self.edge_type),
            graph_type: self.graph_type.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Accepted ratio band for |forward| / |reverse| in the data_flow graph.
const BIDIRECTIONAL_RATIO_MIN: f64 = 0.95;
const BIDIRECTIONAL_RATIO_MAX: f64 = 1.05;

pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                file TEXT NOT NULL,
                line INTEGER NOT NULL,
                metadata TEXT
            );
            CREATE TABLE IF NOT EXISTS edges (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                type TEXT NOT NULL,
                graph_type TEXT NOT NULL,
                metadata TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(file);
            CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);
            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            CREATE INDEX IF NOT EXISTS idx_edges_graph_type ON edges(graph_type);",
        )?;
        Ok(Self { conn })
    }

    /// Graphs are regenerated from scratch per analysis.
    pub fn clear(&mut self) -> Result<()> {
        self.conn.execute_batch("DELETE FROM edges; DELETE FROM nodes;")?;
        Ok(())
    }

    pub fn insert_nodes(&mut self, nodes: &[NodeRow]) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0i64;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO nodes (id, kind, file, line, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for node in nodes {
                inserted += stmt.execute(params![
                    node.id,
                    node.kind,
                    node.file,
                    node.line,
                    node.metadata
                ])? as i64;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn insert_edges(&mut self, edges: &[EdgeRow]) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0i64;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO edges (source_id, target_id, type, graph_type, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for edge in edges {
                inserted += stmt.execute(params![
                    edge.source_id,
                    edge.target_id,
                    edge.edge_type,
                    edge.graph_type,
                    edge.metadata
                ])? as i64;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Forward/reverse counts for the data_flow graph.
    pub fn data_flow_edge_counts(&self) -> Result<(i64, i64)> {
        let forward: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM edges
             WHERE graph_type = 'data_flow' AND type NOT LIKE '%_reverse'",
            [],
            |row| row.get(0),
        )?;
        let reverse: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM edges
             WHERE graph_type = 'data_flow' AND type LIKE '%_reverse'",
            [],
            |row| row.get(0),
        )?;
        Ok((forward, reverse))
    }

    /// Verify the bidirectionality invariant. Without reverse edges,
    /// backward slicing (sink -> source) is impossible, so a violation is
    /// fatal for the build.
    pub fn verify_bidirectional(&self) -> Result<f64> {
        let (forward, reverse) = self.data_flow_edge_counts()?;
        if forward == 0 && reverse == 0 {
            return Ok(1.0);
        }
        if reverse == 0 {
            return Err(StorageError::integrity(
                "data_flow graph is unidirectional: no reverse edges",
            ));
        }
        let ratio = forward as f64 / reverse as f64;
        if !(BIDIRECTIONAL_RATIO_MIN..=BIDIRECTIONAL_RATIO_MAX).contains(&ratio) {
            return Err(StorageError::integrity(format!(
                "data_flow forward/reverse ratio {:.3} outside [{}, {}] ({} forward, {} reverse)",
                ratio, BIDIRECTIONAL_RATIO_MIN, BIDIRECTIONAL_RATIO_MAX, forward, reverse
            )));
        }
        info!(forward, reverse, ratio, "data_flow bidirectionality verified");
        Ok(ratio)
    }

    /// Every edge endpoint must exist in `nodes`.
    pub fn verify_endpoints(&self) -> Result<()> {
        let dangling: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM edges e
             WHERE NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.source_id)
                OR NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.target_id)",
            [],
            |row| row.get(0),
        )?;
        if dangling > 0 {
            return Err(StorageError::integrity(format!(
                "{} edges reference missing nodes",
                dangling
            )));
        }
        Ok(())
    }

    pub fn load_nodes(&self) -> Result<Vec<NodeRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, kind, file, line, metadata FROM nodes")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(NodeRow {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    file: row.get(2)?,
                    line: row.get(3)?,
                    metadata: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Load edges, optionally restricted to one graph type.
    pub fn load_edges(&self, graph_type: Option<&str>) -> Result<Vec<EdgeRow>> {
        let (sql, filter) = match graph_type {
            Some(gt) => (
                "SELECT source_id, target_id, type, graph_type, metadata FROM edges
                 WHERE graph_type = ?1",
                Some(gt),
            ),
            None => (
                "SELECT source_id, target_id, type, graph_type, metadata FROM edges",
                None,
            ),
        };
        let mut stmt = self.conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(EdgeRow {
                source_id: row.get(0)?,
                target_id: row.get(1)?,
                edge_type: row.get(2)?,
                graph_type: row.get(3)?,
                metadata: row.get(4)?,
            })
        };
        let rows = match filter {
            Some(gt) => stmt
                .query_map(params![gt], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
    }

    pub fn node_metadata(&self, node_id: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        Ok(self
            .conn
            .query_row(
                "SELECT metadata FROM nodes WHERE id = ?1",
                params![node_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeRow {
        NodeRow {
            id: id.to_string(),
            kind: "variable".to_string(),
            file: "a.py".to_string(),
            line: 1,
            metadata: None,
        }
    }

    fn edge(source: &str, target: &str, edge_type: &str, graph_type: &str) -> EdgeRow {
        EdgeRow {
            source_id: source.to_string(),
            target_id: target.to_string(),
            edge_type: edge_type.to_string(),
            graph_type: graph_type.to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_reverse_pairing() {
        let forward = edge("a.py::f::x", "a.py::f::y", "assignment", "data_flow");
        let reverse = forward.reversed();
        assert_eq!(reverse.source_id, "a.py::f::y");
        assert_eq!(reverse.target_id, "a.py::f::x");
        assert_eq!(reverse.edge_type, "assignment_reverse");
        assert_eq!(reverse.metadata, forward.metadata);
    }

    #[test]
    fn test_bidirectional_verification_passes_on_mirrored_graph() {
        let mut store = GraphStore::in_memory().expect("open");
        store
            .insert_nodes(&[node("a.py::f::x"), node("a.py::f::y")])
            .expect("nodes");
        let forward = edge("a.py::f::x", "a.py::f::y", "assignment", "data_flow");
        let reverse = forward.reversed();
        store.insert_edges(&[forward, reverse]).expect("edges");
        let ratio = store.verify_bidirectional().expect("verified");
        assert!((ratio - 1.0).abs() < f64::EPSILON);
        store.verify_endpoints().expect("no dangling edges");
    }

    #[test]
    fn test_unidirectional_graph_is_fatal() {
        let mut store = GraphStore::in_memory().expect("open");
        store
            .insert_nodes(&[node("a.py::f::x"), node("a.py::f::y")])
            .expect("nodes");
        store
            .insert_edges(&[edge("a.py::f::x", "a.py::f::y", "assignment", "data_flow")])
            .expect("edges");
        let err = store.verify_bidirectional().unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Integrity);
    }

    #[test]
    fn test_dangling_edge_detected() {
        let mut store = GraphStore::in_memory().expect("open");
        store.insert_nodes(&[node("a.py::f::x")]).expect("nodes");
        store
            .insert_edges(&[edge("a.py::f::x", "a.py::f::missing", "call", "call_graph")])
            .expect("edges");
        assert!(store.verify_endpoints().is_err());
    }
}
