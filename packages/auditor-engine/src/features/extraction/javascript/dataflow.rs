//! JS/TS data-flow records: declarators and assignments, call arguments,
//! return sources, `process.env` usage.

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
    // `const x = expr` / `let x = expr`
    for &declarator in ctx.find_nodes(&NodeKind::VariableDeclarator) {
        let Some(name) = ctx.child_by_field(declarator, "name") else {
            continue;
        };
        let Some(value) = ctx.child_by_field(declarator, "value") else {
            continue;
        };
        if ctx.node(value).kind == NodeKind::FunctionDef {
            continue;
        }
        push_assignment(
            ctx,
            batches,
            ctx.line_of(declarator),
            ctx.text(name),
            ctx.text(value),
            &ctx.identifier_names(value),
            scope_level(ctx, declarator),
        );
    }

    // `x = expr`, `x += expr`, `el.innerHTML = expr`
    for kind in [NodeKind::Assignment, NodeKind::AugmentedAssignment] {
        for &assign in ctx.find_nodes(&kind) {
            let Some(left) = ctx.child_by_field(assign, "left") else {
                continue;
            };
            let Some(right) = ctx.child_by_field(assign, "right") else {
                continue;
            };
            if ctx.node(right).kind == NodeKind::FunctionDef {
                continue;
            }
            let mut sources = ctx.identifier_names(right);
            if kind == NodeKind::AugmentedAssignment {
                let target_name = ctx.text(left).to_string();
                if !sources.contains(&target_name) {
                    sources.insert(0, target_name);
                }
            }
            push_assignment(
                ctx,
                batches,
                ctx.line_of(assign),
                ctx.text(left),
                ctx.text(right),
                &sources,
                scope_level(ctx, assign),
            );
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
        let base = callee.split('.').next().unwrap_or(callee);
        let callee_file_path = ctx
            .resolve_symbol(base, line)
            .and_then(|s| s.module);

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
    for &attr in ctx.find_nodes(&NodeKind::Attribute) {
        let Some(object) = ctx.child_by_field(attr, "object") else {
            continue;
        };
        if ctx.text(object) != "process.env" {
            continue;
        }
        let Some(property) = ctx.child_by_field(attr, "property") else {
            continue;
        };
        let access = if is_assignment_target(ctx, attr) {
            "write"
        } else {
            "read"
        };
        push(
            batches,
            "env_var_usage",
            json!({
                "file": ctx.path,
                "line": ctx.line_of(attr),
                "name": ctx.text(property),
                "access": access,
                "scope": ctx.scope_at_line(ctx.line_of(attr)),
            }),
        );
    }
}

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
        let ctx =
            FileContext::parse("src/d.js", Language::JavaScript, content).expect("parse");
        let mut batches = RecordBatches::new();
        extract(&ctx, &mut batches);
        batches
    }

    #[test]
    fn test_declarator_assignment_with_sources() {
        let batches = extract_from(
            "function f(req) {\n  const q = req.query.q;\n  const sql = base + q;\n  return sql;\n}\n",
        );
        let assignments = &batches["assignments"];
        assert!(assignments
            .iter()
            .any(|a| a["target_var"] == "q" && a["scope"] == "f"));
        let sql = assignments
            .iter()
            .position(|a| a["target_var"] == "sql")
            .expect("sql assignment");
        let sources: Vec<&str> = batches["assignment_sources"]
            .iter()
            .filter(|s| s["_parent_index"].as_u64() == Some(sql as u64))
            .map(|s| s["source_var"].as_str().unwrap_or(""))
            .collect();
        assert_eq!(sources, vec!["base", "q"]);
    }

    #[test]
    fn test_member_assignment_target() {
        let batches = extract_from("el.innerHTML = userInput;\n");
        let assignments = &batches["assignments"];
        assert_eq!(assignments[0]["target_var"], "el.innerHTML");
        assert_eq!(
            batches["assignment_sources"][0]["source_var"],
            "userInput"
        );
    }

    #[test]
    fn test_process_env_usage() {
        let batches = extract_from("const key = process.env.API_KEY;\n");
        let rows = &batches["env_var_usage"];
        assert_eq!(rows[0]["name"], "API_KEY");
        assert_eq!(rows[0]["access"], "read");
    }

    #[test]
    fn test_call_args_with_import_hint() {
        let batches = extract_from(
            "import { search } from './services/search';\n\nfunction handler(req, res) {\n  return search(req.query.q);\n}\n",
        );
        let row = batches["function_call_args"]
            .iter()
            .find(|r| r["callee_function"] == "search")
            .expect("call row");
        assert_eq!(row["callee_file_path"], "./services/search");
    }
}
