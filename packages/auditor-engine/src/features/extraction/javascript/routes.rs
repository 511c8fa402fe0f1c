//! Express and NestJS route extraction with middleware controls.

use serde_json::json;

use auditor_storage::RecordBatches;

use crate::features::extraction::common::{positional_args, string_literal_value};
use crate::features::extraction::{batch_len, push, push_child};
use crate::features::file_context::{FileContext, NodeId, NodeKind};

const EXPRESS_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "all"];
const NEST_METHODS: &[&str] = &["Get", "Post", "Put", "Delete", "Patch", "Head", "Options"];

pub fn extract(ctx: &FileContext, batches: &mut RecordBatches) {
    extract_express(ctx, batches);
    extract_nest(ctx, batches);
}

fn emit_endpoint(
    ctx: &FileContext,
    batches: &mut RecordBatches,
    line: u32,
    method: &str,
    pattern: &str,
    controls: &[String],
) {
    let index = batch_len(batches, "api_endpoints");
    push(
        batches,
        "api_endpoints",
        json!({
            "file": ctx.path,
            "line": line,
            "method": method,
            "pattern": pattern,
            "controls": json!(controls).to_string(),
        }),
    );
    for control in controls {
        push_child(
            batches,
            "api_endpoint_controls",
            index,
            json!({ "control_name": control }),
        );
    }
}

/// `app.post('/admin/users', requireAuth, handler)` - middleware between
/// the pattern and the final handler are the endpoint's controls.
fn extract_express(ctx: &FileContext, batches: &mut RecordBatches) {
    for &call in ctx.find_nodes(&NodeKind::Call) {
        let Some(callee) = ctx.callee_text(call) else {
            continue;
        };
        let Some((receiver, method)) = callee.rsplit_once('.') else {
            continue;
        };
        if !EXPRESS_METHODS.contains(&method) || receiver.contains('.') {
            continue;
        }
        let args = positional_args(ctx, call);
        if args.len() < 2 || ctx.node(args[0]).kind != NodeKind::StringLit {
            continue;
        }
        let pattern = string_literal_value(ctx, args[0]);
        if !pattern.starts_with('/') {
            continue;
        }

        let controls: Vec<String> = args[1..args.len() - 1]
            .iter()
            .filter_map(|&arg| middleware_name(ctx, arg))
            .collect();
        emit_endpoint(
            ctx,
            batches,
            ctx.line_of(call),
            &method.to_uppercase(),
            &pattern,
            &controls,
        );
    }
}

fn middleware_name(ctx: &FileContext, arg: NodeId) -> Option<String> {
    let node = ctx.node(arg);
    match node.kind {
        NodeKind::Identifier | NodeKind::Attribute => Some(ctx.text(arg).to_string()),
        NodeKind::Call => ctx.callee_text(arg).map(str::to_string),
        _ => None,
    }
}

/// NestJS: `@Post('users')` on a method, with `@UseGuards(AuthGuard)` and
/// friends as controls. In the grammar, a member's decorators are its
/// preceding siblings inside the class body, so consecutive decorators
/// are grouped with the member that follows them.
fn extract_nest(ctx: &FileContext, batches: &mut RecordBatches) {
    use std::collections::BTreeSet;

    let parents: BTreeSet<NodeId> = ctx
        .find_nodes(&NodeKind::Decorator)
        .iter()
        .filter_map(|&d| ctx.parent(d))
        .collect();

    let mut groups: Vec<Vec<NodeId>> = Vec::new();
    for parent in parents {
        let mut pending: Vec<NodeId> = Vec::new();
        for &child in ctx.children(parent) {
            let node = ctx.node(child);
            if node.kind == NodeKind::Decorator {
                pending.push(child);
            } else if node.is_named && !pending.is_empty() {
                groups.push(std::mem::take(&mut pending));
            }
        }
        if !pending.is_empty() {
            groups.push(pending);
        }
    }

    for decorators in groups {
        let mut route: Option<(String, String, u32)> = None;
        let mut controls: Vec<String> = Vec::new();

        for &decorator in &decorators {
            let Some(call) = ctx.first_child_of_kind(decorator, &NodeKind::Call) else {
                // Bare decorator like @Public - still a control.
                let name = ctx.text(decorator).trim_start_matches('@').trim().to_string();
                if !name.is_empty() {
                    controls.push(name);
                }
                continue;
            };
            let Some(callee) = ctx.callee_text(call) else {
                continue;
            };
            if NEST_METHODS.contains(&callee) {
                let pattern = positional_args(ctx, call)
                    .first()
                    .map(|&arg| string_literal_value(ctx, arg))
                    .unwrap_or_default();
                route = Some((
                    callee.to_uppercase(),
                    format!("/{}", pattern.trim_start_matches('/')),
                    ctx.line_of(decorator),
                ));
            } else if callee == "UseGuards" || callee == "UseInterceptors" {
                for &arg in &positional_args(ctx, call) {
                    controls.push(ctx.text(arg).to_string());
                }
            } else {
                controls.push(callee.to_string());
            }
        }

        if let Some((method, pattern, line)) = route {
            emit_endpoint(ctx, batches, line, &method, &pattern, &controls);
        }
    }
}
