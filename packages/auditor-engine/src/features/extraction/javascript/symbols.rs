//! JS/TS symbols and refs.

use serde_json::json;

use auditor_storage::RecordBatches;

use crate::features::extraction::push;
use crate::features::file_context::{FileContext, NodeKind};

pub fn extract(ctx: &FileContext, batches: &mut RecordBatches) {
    for range in &ctx.function_ranges {
        let parent_class = ctx.enclosing_class_name(range.node);
        let kind = if parent_class.is_some() {
            "method"
        } else {
            "function"
        };
        push(
            batches,
            "symbols",
            json!({
                "path": ctx.path,
                "name": range.name,
                "kind": kind,
                "line": range.start_line,
                "end_line": range.end_line,
                "parent_class": parent_class,
                "scope": range.scope,
            }),
        );

        if let Some(params) = ctx.child_by_field(range.node, "parameters") {
            for &child in ctx.children(params) {
                let node = ctx.node(child);
                let name_id = match node.kind {
                    NodeKind::Identifier => Some(child),
                    NodeKind::Parameter => ctx
                        .descendants_of_kind(child, &NodeKind::Identifier)
                        .first()
                        .copied(),
                    _ => None,
                };
                let Some(name_id) = name_id else { continue };
                push(
                    batches,
                    "symbols",
                    json!({
                        "path": ctx.path,
                        "name": ctx.text(name_id),
                        "kind": "parameter",
                        "line": ctx.line_of(name_id),
                        "end_line": ctx.line_of(name_id),
                        "parent_class": serde_json::Value::Null,
                        "scope": range.name,
                    }),
                );
            }
        }
    }

    for &class in ctx.find_nodes(&NodeKind::ClassDef) {
        let Some(name_id) = ctx.child_by_field(class, "name") else {
            continue;
        };
        push(
            batches,
            "symbols",
            json!({
                "path": ctx.path,
                "name": ctx.text(name_id),
                "kind": "class",
                "line": ctx.line_of(class),
                "end_line": ctx.node(class).span.end_line,
                "parent_class": serde_json::Value::Null,
                "scope": ctx.scope_name_for(class),
            }),
        );
    }

    // Top-level declarations: `const service = ...` outside any function.
    for &declarator in ctx.find_nodes(&NodeKind::VariableDeclarator) {
        if ctx
            .ancestor_of_kind(declarator, &NodeKind::FunctionDef)
            .is_some()
        {
            continue;
        }
        let Some(name) = ctx.child_by_field(declarator, "name") else {
            continue;
        };
        if ctx.node(name).kind != NodeKind::Identifier {
            continue;
        }
        // Function values are already covered by function_ranges.
        if ctx
            .child_by_field(declarator, "value")
            .map(|v| ctx.node(v).kind == NodeKind::FunctionDef)
            .unwrap_or(false)
        {
            continue;
        }
        push(
            batches,
            "symbols",
            json!({
                "path": ctx.path,
                "name": ctx.text(name),
                "kind": "variable",
                "line": ctx.line_of(declarator),
                "end_line": ctx.line_of(declarator),
                "parent_class": serde_json::Value::Null,
                "scope": "module",
            }),
        );
    }

    if let Some(rows) = batches.get_mut("symbols") {
        let mut seen = std::collections::HashSet::new();
        rows.retain(|r| {
            seen.insert((
                r["name"].as_str().unwrap_or("").to_string(),
                r["line"].as_i64().unwrap_or(0),
            ))
        });
    }

    for binding in ctx.imports() {
        push(
            batches,
            "refs",
            json!({
                "src_path": ctx.path,
                "kind": "import",
                "value": binding.module.replace('\\', "/"),
                "line": binding.line,
            }),
        );
    }

    for &call in ctx.find_nodes(&NodeKind::Call) {
        if let Some(callee) = ctx.callee_text(call) {
            push(
                batches,
                "refs",
                json!({
                    "src_path": ctx.path,
                    "kind": "call",
                    "value": callee,
                    "line": ctx.line_of(call),
                }),
            );
        }
    }
}
