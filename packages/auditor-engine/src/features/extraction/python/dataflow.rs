//! Python data-flow records: assignments with enumerated sources, call
//! arguments with cross-file callee hints, return sources, variable and
//! env-var usage.

use serde_json::{json, Value};

use auditor_storage::RecordBatches;

use crate::features::extraction::common::positional_args;
use crate::features::extraction::{batch_len, push, push_child};
use crate::features::file_context::{FileContext, NodeId, NodeKind};

pub fn extract(ctx: &FileContext, batches: &mut RecordBatches) {
    extract_assignments(ctx, batches);
    extract_call_args(ctx, batches);
    extract_return_sources(ctx, batches);
    extract_env_usage(ctx, batches);
}

/// Nesting depth of a node: 0 at module scope, +1 per enclosing function.
fn scope_level(ctx: &FileContext, id: NodeId) -> i64 {
    let mut level = 0;
    let mut current = ctx.parent(id);
    while let Some(p) = current {
        if ctx.node(p).kind == NodeKind::FunctionDef {
            level += 1;
        }
        current = ctx.parent(p);
    }
    level
}

fn push_assignment(
    ctx: &FileContext,
    batches: &mut RecordBatches,
    line: u32,
    target: &str,
    source_expr: &str,
    sources: &[String],
    level: i64,
) {
    let scope = ctx.scope_at_line(line);
    let index = batch_len(batches, "assignments");
    push(
        batches,
        "assignments",
        json!({
            "file": ctx.path,
            "line": line,
            "target_var": target,
            "source_expr": source_expr,
            "scope": scope,
        }),
    );
    for source in sources {
        push_child(
            batches,
            "assignment_sources",
            index,
            json!({ "source_var": source }),
        );
    }
    push(
        batches,
        "variable_usage",
        json!({
            "file": ctx.path,
            "line": line,
            "variable_name": target,
            "access": "write",
            "scope": scope,
            "scope_level": level,
        }),
    );
    for source in sources {
        push(
            batches,
            "variable_usage",
            json!({
                "file": ctx.path,
                "line": line,
                "variable_name": source,
                "access": "read",
                "scope": scope,
                "scope_level": level,
            }),
        );
    }
}

fn extract_assignments(ctx: &FileContext, batches: &mut RecordBatches) {
    for kind in [NodeKind::Assignment, NodeKind::AugmentedAssignment] {
        for &assign in ctx.find_nodes(&kind) {
            let Some(left) = ctx.child_by_field(assign, "left") else {
                continue;
            };
            let Some(right) = ctx.child_by_field(assign, "right") else {
                continue;
            };
            let line = ctx.line_of(assign);
            let level = scope_level(ctx, assign);
            let source_expr = ctx.text(right);
            let mut sources = ctx.identifier_names(right);
            if kind == NodeKind::AugmentedAssignment {
                // `x += y` reads x as well.
                let target_name = ctx.text(left).to_string();
                if !sources.contains(&target_name) {
                    sources.insert(0, target_name);
                }
            }

            let left_node = ctx.node(left);
            let is_unpacking = matches!(left_node.kind, NodeKind::ArrayLit)
                || matches!(left_node.raw, "pattern_list" | "tuple_pattern" | "list_pattern");
            if is_unpacking {
                // Tuple unpacking: one row per target, same source set.
                for target in ctx.descendants_of_kind(left, &NodeKind::Identifier) {
                    push_assignment(
                        ctx,
                        batches,
                        line,
                        ctx.text(target),
                        source_expr,
                        &sources,
                        level,
                    );
                }
            } else if matches!(
                left_node.kind,
                NodeKind::Identifier | NodeKind::Attribute | NodeKind::Subscript
            ) {
                push_assignment(ctx, batches, line, ctx.text(left), source_expr, &sources, level);
            }
        }
    }
}

fn extract_call_args(ctx: &FileContext, batches: &mut RecordBatches) {
    for &call in ctx.find_nodes(&NodeKind::Call) {
        let Some(callee) = ctx.callee_text(call) else {
            continue;
        };
        let line = ctx.line_of(call);
        let caller_scope = ctx.scope_at_line(line);

        // Cross-file resolution hint: resolve the callee's base name
        // against this file's imports.
        let base = callee.split('.').next().unwrap_or(callee);
        let callee_file_path = ctx
            .resolve_symbol(base, line)
            .and_then(|s| s.module)
            .map(|module| module.replace('.', "/"));

        for (index, &arg) in positional_args(ctx, call).iter().enumerate() {
            push(
                batches,
                "function_call_args",
                json!({
                    "file": ctx.path,
                    "line": line,
                    "caller_scope": caller_scope,
                    "callee_function": callee,
                    "argument_index": index,
                    "argument_expr": ctx.text(arg),
                    "callee_file_path": callee_file_path.as_deref().map(Value::from).unwrap_or(Value::Null),
                }),
            );
        }
    }
}

fn extract_return_sources(ctx: &FileContext, batches: &mut RecordBatches) {
    for &ret in ctx.find_nodes(&NodeKind::ReturnStmt) {
        let line = ctx.line_of(ret);
        let Some(range) = ctx.enclosing_function(line) else {
            continue;
        };
        for var in ctx.identifier_names(ret) {
            push(
                batches,
                "function_return_sources",
                json!({
                    "file": ctx.path,
                    "function_name": range.name,
                    "return_var": var,
                    "line": line,
                }),
            );
        }
    }
}

fn extract_env_usage(ctx: &FileContext, batches: &mut RecordBatches) {
    // os.getenv('NAME') / os.environ.get('NAME')
    for &call in ctx.find_nodes(&NodeKind::Call) {
        let Some(callee) = ctx.callee_text(call) else {
            continue;
        };
        if callee != "os.getenv" && callee != "os.environ.get" {
            continue;
        }
        let Some(&name_arg) = positional_args(ctx, call).first() else {
            continue;
        };
        let name = super::super::common::string_literal_value(ctx, name_arg);
        push(
            batches,
            "env_var_usage",
            json!({
                "file": ctx.path,
                "line": ctx.line_of(call),
                "name": name,
                "access": "read",
                "scope": ctx.scope_at_line(ctx.line_of(call)),
            }),
        );
    }

    // os.environ['NAME'] reads and writes.
    for &subscript in ctx.find_nodes(&NodeKind::Subscript) {
        let Some(value) = ctx.child_by_field(subscript, "value") else {
            continue;
        };
        if ctx.text(value) != "os.environ" {
            continue;
        }
        let Some(key) = ctx.child_by_field(subscript, "subscript") else {
            continue;
        };
        let access = if is_assignment_target(ctx, subscript) {
            "write"
        } else {
            "read"
        };
        push(
            batches,
            "env_var_usage",
            json!({
                "file": ctx.path,
                "line": ctx.line_of(subscript),
                "name": super::super::common::string_literal_value(ctx, key),
                "access": access,
                "scope": ctx.scope_at_line(ctx.line_of(subscript)),
            }),
        );
    }
}

/// Whether a node sits on the left side of an assignment.
fn is_assignment_target(ctx: &FileContext, id: NodeId) -> bool {
    let mut current = Some(id);
    while let Some(node_id) = current {
        if ctx.node(node_id).field == Some("left") {
            return true;
        }
        current = ctx.parent(node_id);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Language;

    fn extract_from(content: &str) -> RecordBatches {
        let ctx = FileContext::parse("app/d.py", Language::Python, content).expect("parse");
        let mut batches = RecordBatches::new();
        extract(&ctx, &mut batches);
        batches
    }

    #[test]
    fn test_multi_source_assignment_enumerated() {
        let batches = extract_from("def f(a, b):\n    total = a + b\n    return total\n");
        let assignments = &batches["assignments"];
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0]["target_var"], "total");
        assert_eq!(assignments[0]["scope"], "f");

        let sources: Vec<&str> = batches["assignment_sources"]
            .iter()
            .map(|r| r["source_var"].as_str().unwrap_or(""))
            .collect();
        assert_eq!(sources, vec!["a", "b"]);
    }

    #[test]
    fn test_call_args_carry_import_hint() {
        let batches = extract_from(
            "from app.services import search\n\ndef handler(q):\n    return search(q)\n",
        );
        let args = &batches["function_call_args"];
        let row = args
            .iter()
            .find(|r| r["callee_function"] == "search")
            .expect("call arg row");
        assert_eq!(row["argument_index"], 0);
        assert_eq!(row["argument_expr"], "q");
        assert_eq!(row["caller_scope"], "handler");
        assert_eq!(row["callee_file_path"], "app/services");
    }

    #[test]
    fn test_return_sources() {
        let batches = extract_from("def get_q(request):\n    q = request.args\n    return q\n");
        let rows = &batches["function_return_sources"];
        assert!(rows
            .iter()
            .any(|r| r["function_name"] == "get_q" && r["return_var"] == "q"));
    }

    #[test]
    fn test_env_var_usage() {
        let batches = extract_from(
            "import os\n\nKEY = os.getenv('API_KEY')\nos.environ['MODE'] = 'prod'\n",
        );
        let rows = &batches["env_var_usage"];
        assert!(rows.iter().any(|r| r["name"] == "API_KEY" && r["access"] == "read"));
        assert!(rows.iter().any(|r| r["name"] == "MODE" && r["access"] == "write"));
    }

    #[test]
    fn test_variable_usage_scope_level() {
        let batches = extract_from("GLOBAL_CACHE = {}\n\ndef f():\n    local = GLOBAL_CACHE\n");
        let rows = &batches["variable_usage"];
        let global_write = rows
            .iter()
            .find(|r| r["variable_name"] == "GLOBAL_CACHE" && r["access"] == "write")
            .expect("module-level write");
        assert_eq!(global_write["scope_level"], 0);
        let inner_read = rows
            .iter()
            .find(|r| r["variable_name"] == "GLOBAL_CACHE" && r["access"] == "read")
            .expect("inner read");
        assert_eq!(inner_read["scope_level"], 1);
    }
}
