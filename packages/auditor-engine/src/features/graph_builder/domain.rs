//! Graph domain models and the in-memory projection of the indexed
//! tables the strategies read.

use serde_json::Value;

use auditor_storage::{EdgeRow, NodeRow};

/// Identifier used for a file's top-level pseudo-function.
pub const MODULE_IDENT: &str = "<module>";

/// Content-addressed node id: `file::scope::identifier`.
pub fn node_id(file: &str, scope: &str, ident: &str) -> String {
    format!("{}::{}::{}", file, scope, ident)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphType {
    CallGraph,
    DataFlow,
    ImportGraph,
}

impl GraphType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphType::CallGraph => "call_graph",
            GraphType::DataFlow => "data_flow",
            GraphType::ImportGraph => "import_graph",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub kind: String,
    pub file: String,
    pub line: i64,
    pub metadata: Option<Value>,
}

impl GraphNode {
    pub fn to_row(&self) -> NodeRow {
        NodeRow {
            id: self.id.clone(),
            kind: self.kind.clone(),
            file: self.file.clone(),
            line: self.line,
            metadata: self.metadata.as_ref().map(|m| m.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: String,
    pub graph_type: GraphType,
    pub metadata: Option<Value>,
}

impl GraphEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: impl Into<String>,
        graph_type: GraphType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type: edge_type.into(),
            graph_type,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn to_row(&self) -> EdgeRow {
        EdgeRow {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            edge_type: self.edge_type.clone(),
            graph_type: self.graph_type.as_str().to_string(),
            metadata: self.metadata.as_ref().map(|m| m.to_string()),
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Indexed-table projections read by the strategies
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AssignmentRow {
    pub id: i64,
    pub file: String,
    pub line: i64,
    pub target_var: String,
    pub source_expr: Option<String>,
    pub scope: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CallArgRow {
    pub file: String,
    pub line: i64,
    pub caller_scope: String,
    pub callee_function: String,
    pub argument_index: i64,
    pub argument_expr: Option<String>,
    pub callee_file_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FunctionSymbolRow {
    pub path: String,
    pub name: String,
    pub kind: String,
    pub line: i64,
    pub scope: String,
}

#[derive(Debug, Clone)]
pub struct ParameterRow {
    pub path: String,
    pub name: String,
    pub line: i64,
    /// Owning function name.
    pub scope: String,
}

#[derive(Debug, Clone)]
pub struct ReturnSourceRow {
    pub file: String,
    pub function_name: String,
    pub return_var: String,
    pub line: i64,
}

#[derive(Debug, Clone)]
pub struct ImportRow {
    pub src_path: String,
    pub value: String,
    pub line: i64,
}

/// Everything the builder loads from `repo_index.db`.
#[derive(Debug, Default)]
pub struct IndexModel {
    pub files: Vec<String>,
    pub assignments: Vec<AssignmentRow>,
    pub call_args: Vec<CallArgRow>,
    pub functions: Vec<FunctionSymbolRow>,
    pub parameters: Vec<ParameterRow>,
    pub return_sources: Vec<ReturnSourceRow>,
    pub imports: Vec<ImportRow>,
    /// ORM model names, for node metadata.
    pub orm_models: Vec<String>,
}
