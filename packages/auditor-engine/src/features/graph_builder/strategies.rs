//! Edge strategies: assignment, call, parameter binding, return flow,
//! import. Each strategy reads the `IndexModel` projection and appends
//! typed nodes and edges; the builder mirrors `data_flow` edges
//! afterwards.

use ahash::AHashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::domain::{
    node_id, CallArgRow, FunctionSymbolRow, GraphEdge, GraphNode, GraphType, IndexModel,
    MODULE_IDENT,
};
use super::path_resolver::resolve_import;

pub type NodeMap = AHashMap<String, GraphNode>;

static IDENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap_or_else(|e| panic!("static regex: {}", e))
});

const EXPR_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "return", "not", "and", "or", "in", "is", "None", "True",
    "False", "new", "await", "async", "lambda", "self", "this",
];

/// Base identifiers of an expression: tokens not preceded by a dot, so
/// `req.query.q + base` yields `req` and `base`.
pub(crate) fn expr_identifiers(expr: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in IDENT_RE.find_iter(expr) {
        if m.start() > 0 && expr.as_bytes()[m.start() - 1] == b'.' {
            continue;
        }
        let token = m.as_str();
        if EXPR_KEYWORDS.contains(&token) {
            continue;
        }
        if !out.iter().any(|t| t == token) {
            out.push(token.to_string());
        }
    }
    out
}

fn ensure_node(nodes: &mut NodeMap, node: GraphNode) {
    match nodes.get_mut(&node.id) {
        Some(existing) => {
            if existing.metadata.is_none() && node.metadata.is_some() {
                existing.metadata = node.metadata;
            }
        }
        None => {
            nodes.insert(node.id.clone(), node);
        }
    }
}

fn variable_node(file: &str, scope: &str, name: &str, line: i64) -> GraphNode {
    GraphNode {
        id: node_id(file, scope, name),
        kind: "variable".to_string(),
        file: file.to_string(),
        line,
        metadata: None,
    }
}

fn module_node(file: &str) -> GraphNode {
    GraphNode {
        id: node_id(file, "module", MODULE_IDENT),
        kind: "module".to_string(),
        file: file.to_string(),
        line: 0,
        metadata: None,
    }
}

fn function_node(symbol: &FunctionSymbolRow) -> GraphNode {
    GraphNode {
        id: node_id(&symbol.path, &symbol.scope, &symbol.name),
        kind: "function".to_string(),
        file: symbol.path.clone(),
        line: symbol.line,
        metadata: None,
    }
}

/// ORM model referenced by an expression, if any (`User(...)`,
/// `User.query...`, `User.objects...`).
fn model_in_expr(model_names: &[String], expr: &str) -> Option<String> {
    for name in model_names {
        if expr.contains(&format!("{}(", name)) || expr.contains(&format!("{}.", name)) {
            return Some(name.clone());
        }
    }
    None
}

/// `target_var <- source_var` edges from assignments.
pub fn assignment_edges(model: &IndexModel, nodes: &mut NodeMap, edges: &mut Vec<GraphEdge>) {
    for assignment in &model.assignments {
        let target_id = node_id(&assignment.file, &assignment.scope, &assignment.target_var);
        let mut target =
            variable_node(&assignment.file, &assignment.scope, &assignment.target_var, assignment.line);
        if let Some(expr) = &assignment.source_expr {
            if let Some(model_name) = model_in_expr(&model.orm_models, expr) {
                target.metadata = Some(json!({ "model": model_name }));
            }
        }
        ensure_node(nodes, target);

        for source in &assignment.sources {
            let source_id = node_id(&assignment.file, &assignment.scope, source);
            ensure_node(
                nodes,
                variable_node(&assignment.file, &assignment.scope, source, assignment.line),
            );
            edges.push(
                GraphEdge::new(&source_id, &target_id, "assignment", GraphType::DataFlow)
                    .with_metadata(json!({ "line": assignment.line })),
            );
        }
    }
}

/// Find the function symbol a call resolves to: path hint first, then
/// same-file, then a unique global candidate.
pub fn resolve_callee<'a>(
    model: &'a IndexModel,
    call: &CallArgRow,
) -> Option<&'a FunctionSymbolRow> {
    let tail = call
        .callee_function
        .rsplit('.')
        .next()
        .unwrap_or(&call.callee_function);
    let candidates: Vec<&FunctionSymbolRow> = model
        .functions
        .iter()
        .filter(|f| f.name == tail)
        .collect();
    if candidates.is_empty() {
        return None;
    }

    if let Some(hint) = &call.callee_file_path {
        let paths: Vec<&str> = candidates.iter().map(|c| c.path.as_str()).collect();
        if let Some(resolved) = resolve_import(hint, paths) {
            return candidates.into_iter().find(|c| c.path == resolved);
        }
    }
    if let Some(same_file) = candidates.iter().find(|c| c.path == call.file) {
        return Some(same_file);
    }
    if candidates.len() == 1 {
        return candidates.into_iter().next();
    }
    None
}

fn caller_node_id(model: &IndexModel, call: &CallArgRow, nodes: &mut NodeMap) -> String {
    if call.caller_scope != "module" {
        if let Some(symbol) = model
            .functions
            .iter()
            .find(|f| f.path == call.file && f.name == call.caller_scope)
        {
            let node = function_node(symbol);
            let id = node.id.clone();
            ensure_node(nodes, node);
            return id;
        }
    }
    let node = module_node(&call.file);
    let id = node.id.clone();
    ensure_node(nodes, node);
    id
}

/// Caller scope -> callee symbol edges.
pub fn call_edges(model: &IndexModel, nodes: &mut NodeMap, edges: &mut Vec<GraphEdge>) {
    let mut seen = std::collections::HashSet::new();
    for call in &model.call_args {
        if !seen.insert((call.file.clone(), call.line, call.callee_function.clone())) {
            continue;
        }
        let Some(callee) = resolve_callee(model, call) else {
            continue;
        };
        let callee_node = function_node(callee);
        let callee_id = callee_node.id.clone();
        ensure_node(nodes, callee_node);
        let caller_id = caller_node_id(model, call, nodes);
        edges.push(
            GraphEdge::new(&caller_id, &callee_id, "call", GraphType::CallGraph).with_metadata(
                json!({ "line": call.line, "callee_function": call.callee_function }),
            ),
        );
    }
}

/// Call-site argument -> callee parameter edges.
pub fn parameter_binding_edges(
    model: &IndexModel,
    nodes: &mut NodeMap,
    edges: &mut Vec<GraphEdge>,
) {
    for call in &model.call_args {
        let Some(callee) = resolve_callee(model, call) else {
            continue;
        };
        let mut params: Vec<_> = model
            .parameters
            .iter()
            .filter(|p| p.path == callee.path && p.scope == callee.name)
            .collect();
        // Methods bind their receiver implicitly.
        if params
            .first()
            .is_some_and(|p| p.name == "self" || p.name == "cls")
        {
            params.remove(0);
        }
        let Some(param) = params.get(call.argument_index as usize) else {
            continue;
        };
        let param_id = node_id(&param.path, &param.scope, &param.name);
        ensure_node(
            nodes,
            GraphNode {
                id: param_id.clone(),
                kind: "parameter".to_string(),
                file: param.path.clone(),
                line: param.line,
                metadata: None,
            },
        );

        let Some(expr) = &call.argument_expr else { continue };
        for ident in expr_identifiers(expr) {
            let arg_id = node_id(&call.file, &call.caller_scope, &ident);
            ensure_node(
                nodes,
                variable_node(&call.file, &call.caller_scope, &ident, call.line),
            );
            edges.push(
                GraphEdge::new(&arg_id, &param_id, "parameter_binding", GraphType::DataFlow)
                    .with_metadata(json!({
                        "callee_function": call.callee_function,
                        "argument_index": call.argument_index,
                    })),
            );
        }
    }
}

/// Callee return variable -> caller assignment target edges.
pub fn return_flow_edges(model: &IndexModel, nodes: &mut NodeMap, edges: &mut Vec<GraphEdge>) {
    for assignment in &model.assignments {
        // Calls on the assignment's line tell us which callees feed it.
        let calls: Vec<&CallArgRow> = model
            .call_args
            .iter()
            .filter(|c| c.file == assignment.file && c.line == assignment.line)
            .collect();
        for call in calls {
            let Some(callee) = resolve_callee(model, call) else {
                continue;
            };
            for ret in model
                .return_sources
                .iter()
                .filter(|r| r.file == callee.path && r.function_name == callee.name)
            {
                let ret_id = node_id(&ret.file, &ret.function_name, &ret.return_var);
                ensure_node(
                    nodes,
                    variable_node(&ret.file, &ret.function_name, &ret.return_var, ret.line),
                );
                let target_id =
                    node_id(&assignment.file, &assignment.scope, &assignment.target_var);
                ensure_node(
                    nodes,
                    variable_node(
                        &assignment.file,
                        &assignment.scope,
                        &assignment.target_var,
                        assignment.line,
                    ),
                );
                edges.push(
                    GraphEdge::new(&ret_id, &target_id, "return_flow", GraphType::DataFlow)
                        .with_metadata(json!({ "callee_function": call.callee_function })),
                );
            }
        }
    }
}

/// Import edges between module pseudo-nodes, alias-aware.
pub fn import_edges(model: &IndexModel, nodes: &mut NodeMap, edges: &mut Vec<GraphEdge>) {
    for import in &model.imports {
        let Some(target_file) =
            resolve_import(&import.value, model.files.iter().map(String::as_str))
        else {
            continue;
        };
        if target_file == import.src_path {
            continue;
        }
        let source = module_node(&import.src_path);
        let target = module_node(&target_file);
        let (source_id, target_id) = (source.id.clone(), target.id.clone());
        ensure_node(nodes, source);
        ensure_node(nodes, target);
        edges.push(
            GraphEdge::new(&source_id, &target_id, "import", GraphType::ImportGraph)
                .with_metadata(json!({ "line": import.line, "value": import.value })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::graph_builder::domain::{AssignmentRow, ImportRow, ParameterRow};

    fn sample_model() -> IndexModel {
        IndexModel {
            files: vec!["app/controller.py".to_string(), "app/service.py".to_string()],
            assignments: vec![AssignmentRow {
                id: 1,
                file: "app/controller.py".to_string(),
                line: 3,
                target_var: "q".to_string(),
                source_expr: Some("request.args.get('q')".to_string()),
                scope: "handler".to_string(),
                sources: vec!["request".to_string()],
            }],
            call_args: vec![CallArgRow {
                file: "app/controller.py".to_string(),
                line: 4,
                caller_scope: "handler".to_string(),
                callee_function: "search".to_string(),
                argument_index: 0,
                argument_expr: Some("q".to_string()),
                callee_file_path: Some("app/service".to_string()),
            }],
            functions: vec![
                FunctionSymbolRow {
                    path: "app/controller.py".to_string(),
                    name: "handler".to_string(),
                    kind: "function".to_string(),
                    line: 2,
                    scope: "module".to_string(),
                },
                FunctionSymbolRow {
                    path: "app/service.py".to_string(),
                    name: "search".to_string(),
                    kind: "function".to_string(),
                    line: 1,
                    scope: "module".to_string(),
                },
            ],
            parameters: vec![ParameterRow {
                path: "app/service.py".to_string(),
                name: "q".to_string(),
                line: 1,
                scope: "search".to_string(),
            }],
            return_sources: vec![],
            imports: vec![ImportRow {
                src_path: "app/controller.py".to_string(),
                value: "app/service".to_string(),
                line: 1,
            }],
            orm_models: vec![],
        }
    }

    #[test]
    fn test_expr_identifiers_take_bases() {
        assert_eq!(expr_identifiers("req.query.q + base"), vec!["req", "base"]);
        assert_eq!(expr_identifiers("self.db.run(x)"), vec!["x"]);
        assert_eq!(expr_identifiers("q"), vec!["q"]);
    }

    #[test]
    fn test_assignment_strategy() {
        let model = sample_model();
        let mut nodes = NodeMap::new();
        let mut edges = Vec::new();
        assignment_edges(&model, &mut nodes, &mut edges);
        assert!(nodes.contains_key("app/controller.py::handler::q"));
        assert!(nodes.contains_key("app/controller.py::handler::request"));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, "assignment");
        assert_eq!(edges[0].graph_type, GraphType::DataFlow);
    }

    #[test]
    fn test_cross_file_call_and_parameter_binding() {
        let model = sample_model();
        let mut nodes = NodeMap::new();
        let mut edges = Vec::new();
        call_edges(&model, &mut nodes, &mut edges);
        parameter_binding_edges(&model, &mut nodes, &mut edges);

        assert!(edges.iter().any(|e| e.edge_type == "call"
            && e.source_id == "app/controller.py::module::handler"
            && e.target_id == "app/service.py::module::search"));
        assert!(edges.iter().any(|e| e.edge_type == "parameter_binding"
            && e.source_id == "app/controller.py::handler::q"
            && e.target_id == "app/service.py::search::q"));
    }

    #[test]
    fn test_import_strategy() {
        let model = sample_model();
        let mut nodes = NodeMap::new();
        let mut edges = Vec::new();
        import_edges(&model, &mut nodes, &mut edges);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, "import");
        assert_eq!(edges[0].source_id, "app/controller.py::module::<module>");
        assert_eq!(edges[0].target_id, "app/service.py::module::<module>");
    }
}
