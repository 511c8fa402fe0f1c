//! Python route extraction: Flask/FastAPI decorators and Django URL
//! patterns, with decorator controls normalized into
//! `api_endpoint_controls`.

use serde_json::json;

use auditor_storage::RecordBatches;

use crate::features::extraction::common::{keyword_arg, positional_args, string_literal_value};
use crate::features::extraction::{batch_len, push, push_child};
use crate::features::file_context::{FileContext, NodeId, NodeKind};

const HTTP_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "head", "options"];

pub fn extract(ctx: &FileContext, batches: &mut RecordBatches) {
    for &decorated in ctx.find_nodes(&NodeKind::DecoratedDef) {
        let decorators = ctx.children_of_kind(decorated, &NodeKind::Decorator);
        if decorators.is_empty() {
            continue;
        }

        let mut routes: Vec<(Vec<String>, String, u32)> = Vec::new();
        let mut controls: Vec<String> = Vec::new();

        for &decorator in &decorators {
            match route_decorator(ctx, decorator) {
                Some((methods, pattern)) => {
                    routes.push((methods, pattern, ctx.line_of(decorator)));
                }
                None => {
                    controls.push(decorator_name(ctx, decorator));
                }
            }
        }

        for (methods, pattern, line) in routes {
            for method in methods {
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
                for control in &controls {
                    push_child(
                        batches,
                        "api_endpoint_controls",
                        index,
                        json!({ "control_name": control }),
                    );
                }
            }
        }
    }

    extract_django_urls(ctx, batches);
}

/// `(methods, pattern)` when the decorator declares a route.
fn route_decorator(ctx: &FileContext, decorator: NodeId) -> Option<(Vec<String>, String)> {
    let call = ctx.first_child_of_kind(decorator, &NodeKind::Call)?;
    let callee = ctx.callee_text(call)?;
    let attribute = callee.rsplit('.').next().unwrap_or(callee);

    let pattern_arg = positional_args(ctx, call).first().copied()?;
    if ctx.node(pattern_arg).kind != NodeKind::StringLit {
        return None;
    }
    let pattern = string_literal_value(ctx, pattern_arg);

    if attribute == "route" {
        // Flask: methods kwarg, GET by default.
        let methods = keyword_arg(ctx, call, "methods")
            .map(|value| {
                ctx.descendants_of_kind(value, &NodeKind::StringLit)
                    .into_iter()
                    .map(|s| string_literal_value(ctx, s).to_uppercase())
                    .collect::<Vec<_>>()
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| vec!["GET".to_string()]);
        return Some((methods, pattern));
    }
    if HTTP_METHODS.contains(&attribute) && callee.contains('.') {
        // FastAPI / Flask-MethodView style: @app.get("/x")
        return Some((vec![attribute.to_uppercase()], pattern));
    }
    None
}

/// Decorator name without `@` and call arguments: `@login_required`,
/// `@limiter.limit("5/min")` -> `limiter.limit`.
fn decorator_name(ctx: &FileContext, decorator: NodeId) -> String {
    if let Some(call) = ctx.first_child_of_kind(decorator, &NodeKind::Call) {
        if let Some(callee) = ctx.callee_text(call) {
            return callee.to_string();
        }
    }
    ctx.text(decorator).trim_start_matches('@').trim().to_string()
}

/// Django: `path('admin/', view)` / `re_path(...)` entries. Method is not
/// declared at the URL layer, so the row records `ANY`.
fn extract_django_urls(ctx: &FileContext, batches: &mut RecordBatches) {
    for &call in ctx.find_nodes(&NodeKind::Call) {
        let Some(callee) = ctx.callee_text(call) else {
            continue;
        };
        if callee != "path" && callee != "re_path" {
            continue;
        }
        let args = positional_args(ctx, call);
        if args.len() < 2 {
            continue;
        }
        if ctx.node(args[0]).kind != NodeKind::StringLit {
            continue;
        }
        push(
            batches,
            "api_endpoints",
            json!({
                "file": ctx.path,
                "line": ctx.line_of(call),
                "method": "ANY",
                "pattern": string_literal_value(ctx, args[0]),
                "controls": "[]",
            }),
        );
    }
}
