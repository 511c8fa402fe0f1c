//! Graph build pass: load the indexed model, run the strategies, mirror
//! the data-flow edges, verify invariants, persist `graphs.db`.

use rusqlite::Connection;
use tracing::info;

use auditor_storage::{registry, GraphStore};

use crate::errors::{AuditError, Result};

use super::domain::{
    AssignmentRow, CallArgRow, FunctionSymbolRow, GraphEdge, GraphType, ImportRow, IndexModel,
    ParameterRow, ReturnSourceRow,
};
use super::strategies::{
    assignment_edges, call_edges, import_edges, parameter_binding_edges, return_flow_edges,
    NodeMap,
};

/// Graph build result.
#[derive(Debug, Clone)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub data_flow_forward: i64,
    pub data_flow_reverse: i64,
    pub ratio: f64,
}

/// Build `graphs.db` from `repo_index.db`. Fails (fatal, exit 2) when
/// the bidirectionality invariant does not hold.
pub fn build_graph(
    repo_index_path: &std::path::Path,
    graphs_path: &std::path::Path,
) -> Result<GraphStats> {
    let conn = Connection::open(repo_index_path)?;
    let model = load_model(&conn)?;

    let mut nodes = NodeMap::new();
    let mut edges: Vec<GraphEdge> = Vec::new();
    assignment_edges(&model, &mut nodes, &mut edges);
    call_edges(&model, &mut nodes, &mut edges);
    parameter_binding_edges(&model, &mut nodes, &mut edges);
    return_flow_edges(&model, &mut nodes, &mut edges);
    import_edges(&model, &mut nodes, &mut edges);

    // Mirror every data-flow edge; backward slicing depends on it.
    let mut mirrored: Vec<GraphEdge> = Vec::with_capacity(edges.len() * 2);
    for edge in edges {
        let reverse = (edge.graph_type == GraphType::DataFlow).then(|| GraphEdge {
            source_id: edge.target_id.clone(),
            target_id: edge.source_id.clone(),
            edge_type: format!("{}_reverse", edge.edge_type),
            graph_type: edge.graph_type,
            metadata: edge.metadata.clone(),
        });
        mirrored.push(edge);
        if let Some(reverse) = reverse {
            mirrored.push(reverse);
        }
    }

    let mut store = GraphStore::open(graphs_path)?;
    store.clear()?;
    let node_rows: Vec<_> = {
        let mut sorted: Vec<_> = nodes.values().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        sorted.iter().map(|n| n.to_row()).collect()
    };
    let edge_rows: Vec<_> = mirrored.iter().map(|e| e.to_row()).collect();
    store.insert_nodes(&node_rows)?;
    store.insert_edges(&edge_rows)?;

    let ratio = store
        .verify_bidirectional()
        .map_err(|e| AuditError::Graph(e.to_string()))?;
    store
        .verify_endpoints()
        .map_err(|e| AuditError::Graph(e.to_string()))?;

    let (forward, reverse) = store.data_flow_edge_counts()?;
    let stats = GraphStats {
        nodes: node_rows.len(),
        edges: edge_rows.len(),
        data_flow_forward: forward,
        data_flow_reverse: reverse,
        ratio,
    };
    info!(
        nodes = stats.nodes,
        edges = stats.edges,
        forward,
        reverse,
        "graph build complete"
    );
    Ok(stats)
}

pub(crate) fn load_model(conn: &Connection) -> Result<IndexModel> {
    let reg = registry();
    let mut model = IndexModel::default();

    let sql = reg.build_query("files", &["path"], None, Some("path"))?;
    let mut stmt = conn.prepare(&sql)?;
    model.files = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<_>>()?;

    let sql = reg.build_query(
        "assignments",
        &["id", "file", "line", "target_var", "source_expr", "scope"],
        None,
        Some("file, line"),
    )?;
    let mut stmt = conn.prepare(&sql)?;
    model.assignments = stmt
        .query_map([], |row| {
            Ok(AssignmentRow {
                id: row.get(0)?,
                file: row.get(1)?,
                line: row.get(2)?,
                target_var: row.get(3)?,
                source_expr: row.get(4)?,
                scope: row.get::<_, Option<String>>(5)?.unwrap_or_else(|| "module".to_string()),
                sources: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let sql = reg.build_query(
        "assignment_sources",
        &["assignment_id", "source_var"],
        None,
        Some("assignment_id"),
    )?;
    let mut stmt = conn.prepare(&sql)?;
    let sources: Vec<(i64, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
    for (assignment_id, source_var) in sources {
        if let Some(assignment) = model.assignments.iter_mut().find(|a| a.id == assignment_id) {
            assignment.sources.push(source_var);
        }
    }

    let sql = reg.build_query(
        "function_call_args",
        &[
            "file",
            "line",
            "caller_scope",
            "callee_function",
            "argument_index",
            "argument_expr",
            "callee_file_path",
        ],
        None,
        Some("file, line, argument_index"),
    )?;
    let mut stmt = conn.prepare(&sql)?;
    model.call_args = stmt
        .query_map([], |row| {
            Ok(CallArgRow {
                file: row.get(0)?,
                line: row.get(1)?,
                caller_scope: row
                    .get::<_, Option<String>>(2)?
                    .unwrap_or_else(|| "module".to_string()),
                callee_function: row.get(3)?,
                argument_index: row.get(4)?,
                argument_expr: row.get(5)?,
                callee_file_path: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let sql = reg.build_query(
        "symbols",
        &["path", "name", "kind", "line", "scope"],
        Some("kind IN ('function', 'method')"),
        Some("path, line"),
    )?;
    let mut stmt = conn.prepare(&sql)?;
    model.functions = stmt
        .query_map([], |row| {
            Ok(FunctionSymbolRow {
                path: row.get(0)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                line: row.get(3)?,
                scope: row
                    .get::<_, Option<String>>(4)?
                    .unwrap_or_else(|| "module".to_string()),
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let sql = reg.build_query(
        "symbols",
        &["path", "name", "line", "scope"],
        Some("kind = 'parameter'"),
        Some("rowid"),
    )?;
    let mut stmt = conn.prepare(&sql)?;
    model.parameters = stmt
        .query_map([], |row| {
            Ok(ParameterRow {
                path: row.get(0)?,
                name: row.get(1)?,
                line: row.get(2)?,
                scope: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let sql = reg.build_query(
        "function_return_sources",
        &["file", "function_name", "return_var", "line"],
        None,
        Some("file, line"),
    )?;
    let mut stmt = conn.prepare(&sql)?;
    model.return_sources = stmt
        .query_map([], |row| {
            Ok(ReturnSourceRow {
                file: row.get(0)?,
                function_name: row.get(1)?,
                return_var: row.get(2)?,
                line: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let sql = reg.build_query(
        "refs",
        &["src_path", "value", "line"],
        Some("kind = 'import'"),
        Some("src_path, line"),
    )?;
    let mut stmt = conn.prepare(&sql)?;
    model.imports = stmt
        .query_map([], |row| {
            Ok(ImportRow {
                src_path: row.get(0)?,
                value: row.get(1)?,
                line: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let sql = reg.build_query("orm_models", &["model_name"], None, Some("model_name"))?;
    let mut stmt = conn.prepare(&sql)?;
    model.orm_models = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<_>>()?;

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::features::indexing::index_repository;
    use crate::shared::cancel::CancellationToken;

    fn build_fixture(files: &[(&str, &str)]) -> (GraphStats, GraphStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        for (rel, content) in files {
            let path = dir.path().join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(path, content).expect("write");
        }
        let config = AuditConfig::for_root(dir.path());
        let (_stats, writer) =
            index_repository(&config, &CancellationToken::new()).expect("index");
        drop(writer);
        let pf = config.pf();
        let stats = build_graph(&pf.repo_index_db(), &pf.graphs_db()).expect("graph");
        let store = GraphStore::open(pf.graphs_db()).expect("reopen");
        (stats, store, dir)
    }

    #[test]
    fn test_bidirectional_smoke() {
        let (stats, store, _dir) = build_fixture(&[(
            "app/a.py",
            "def f(x):\n    y = x\n    z = y\n    return z\n",
        )]);
        assert!(stats.data_flow_forward > 0);
        assert_eq!(stats.data_flow_forward, stats.data_flow_reverse);
        assert!((stats.ratio - 1.0).abs() < 0.05);
        store.verify_endpoints().expect("endpoints resolve");
    }

    #[test]
    fn test_reverse_edges_pair_with_forward() {
        let (_stats, store, _dir) = build_fixture(&[(
            "app/a.py",
            "def f(x):\n    y = x\n    return y\n",
        )]);
        let edges = store.load_edges(Some("data_flow")).expect("edges");
        for edge in edges.iter().filter(|e| !e.edge_type.ends_with("_reverse")) {
            let mirror = edges
                .iter()
                .find(|m| {
                    m.edge_type == format!("{}_reverse", edge.edge_type)
                        && m.source_id == edge.target_id
                        && m.target_id == edge.source_id
                })
                .expect("reverse edge exists");
            assert_eq!(mirror.metadata, edge.metadata);
        }
    }

    #[test]
    fn test_cross_file_data_flow_chain() {
        let (_stats, store, _dir) = build_fixture(&[
            (
                "app/controller.py",
                "from app.service import search\n\ndef handler(request):\n    q = request.args\n    result = search(q)\n    return result\n",
            ),
            (
                "app/service.py",
                "def search(q):\n    data = q\n    return data\n",
            ),
        ]);
        let edges = store.load_edges(None).expect("edges");
        assert!(edges.iter().any(|e| e.edge_type == "call"
            && e.source_id.contains("controller.py")
            && e.target_id == "app/service.py::module::search"));
        assert!(edges.iter().any(|e| e.edge_type == "parameter_binding"
            && e.source_id == "app/controller.py::handler::q"
            && e.target_id == "app/service.py::search::q"));
        assert!(edges.iter().any(|e| e.edge_type == "return_flow"
            && e.source_id == "app/service.py::search::data"
            && e.target_id == "app/controller.py::handler::result"));
        assert!(edges
            .iter()
            .any(|e| e.edge_type == "import" && e.target_id == "app/service.py::module::<module>"));
    }
}
