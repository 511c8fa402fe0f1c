//! Language-generic extractors.
//!
//! SQL-in-strings and JWT patterns read the same arena kinds in both
//! grammars (string/f-string/template-string, call/argument-list), so they
//! are written once against `FileContext` and parameterized by the callee
//! sets that differ per ecosystem.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use auditor_storage::RecordBatches;

use crate::features::file_context::{FileContext, NodeId, NodeKind};

use super::{batch_len, push, push_child};

// ───────────────────────────────────────────────────────────────────
// String helpers
// ───────────────────────────────────────────────────────────────────

/// Literal value of a string-ish node: prefix letters (`f`, `rb`) and the
/// surrounding quotes/backticks removed.
pub fn string_literal_value(ctx: &FileContext, id: NodeId) -> String {
    let text = ctx.text(id);
    let stripped = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if stripped.starts_with(quote) {
            return stripped
                .strip_prefix(quote)
                .and_then(|s| s.strip_suffix(quote))
                .unwrap_or(stripped)
                .to_string();
        }
    }
    stripped.to_string()
}

// ───────────────────────────────────────────────────────────────────
// SQL-in-strings
// ───────────────────────────────────────────────────────────────────

static SQL_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:from|join|into|update)\s+([A-Za-z_][A-Za-z0-9_.]*)")
        .unwrap_or_else(|e| panic!("static regex: {}", e))
});

const SQL_COMMANDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "EXEC",
];

/// SQL command of a string, if it reads like a query.
fn sql_command(value: &str) -> Option<&'static str> {
    let upper = value.trim_start().to_uppercase();
    for command in SQL_COMMANDS {
        if upper.starts_with(command) {
            return Some(command);
        }
    }
    // Embedded queries ("...; SELECT x FROM y") still count when both a
    // verb and a FROM clause are present.
    if upper.contains("SELECT ") && upper.contains(" FROM ") {
        return Some("SELECT");
    }
    None
}

fn sql_tables(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    for capture in SQL_TABLE_RE.captures_iter(value) {
        if let Some(name) = capture.get(1) {
            let name = name.as_str().trim_matches('.').to_string();
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

/// Whether a string node is built dynamically: interpolation, `%`/`+`
/// concatenation, or a `.format(...)` receiver.
fn is_dynamic_string(ctx: &FileContext, id: NodeId) -> bool {
    let node = ctx.node(id);
    if matches!(node.kind, NodeKind::FString | NodeKind::TemplateString)
        && !ctx.descendants_of_kind(id, &NodeKind::Interpolation).is_empty()
    {
        return true;
    }
    if let Some(parent) = node.parent {
        match &ctx.node(parent).kind {
            NodeKind::BinaryOp => return true,
            NodeKind::Attribute => {
                if let Some(grand) = ctx.node(parent).parent {
                    if ctx.node(grand).kind == NodeKind::Call
                        && ctx.callee_text(grand).is_some_and(|c| c.ends_with(".format"))
                    {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }
    false
}

/// SQL-in-strings detection, including template/f-strings.
pub fn extract_sql_strings(ctx: &FileContext, batches: &mut RecordBatches) {
    for kind in [NodeKind::StringLit, NodeKind::FString, NodeKind::TemplateString] {
        for &id in ctx.find_nodes(&kind) {
            let value = string_literal_value(ctx, id);
            let Some(command) = sql_command(&value) else {
                continue;
            };
            let parent_index = batch_len(batches, "sql_queries");
            let is_dynamic = is_dynamic_string(ctx, id);
            push(
                batches,
                "sql_queries",
                json!({
                    "file": ctx.path,
                    "line": ctx.line_of(id),
                    "query_text": value,
                    "command": command,
                    "is_dynamic": is_dynamic,
                }),
            );
            for table in sql_tables(&value) {
                push_child(
                    batches,
                    "sql_query_tables",
                    parent_index,
                    json!({ "table_name": table }),
                );
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// JWT patterns
// ───────────────────────────────────────────────────────────────────

/// Callee sets distinguishing JWT operations per ecosystem.
pub struct JwtCallees {
    pub encode: &'static [&'static str],
    pub decode: &'static [&'static str],
    pub verify: &'static [&'static str],
}

pub const PYTHON_JWT: JwtCallees = JwtCallees {
    encode: &["jwt.encode", "jose.jwt.encode"],
    decode: &["jwt.decode", "jose.jwt.decode"],
    verify: &["jwt.verify"],
};

pub const JS_JWT: JwtCallees = JwtCallees {
    encode: &["jwt.sign", "jsonwebtoken.sign"],
    decode: &["jwt.decode", "jsonwebtoken.decode"],
    verify: &["jwt.verify", "jsonwebtoken.verify"],
};

static SENSITIVE_FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)password|passwd|secret|ssn|credit|card|token|api_key|apikey")
        .unwrap_or_else(|e| panic!("static regex: {}", e))
});

fn pattern_type_for(callees: &JwtCallees, callee: &str) -> Option<&'static str> {
    if callees.encode.contains(&callee) {
        Some("encode")
    } else if callees.decode.contains(&callee) {
        Some("decode")
    } else if callees.verify.contains(&callee) {
        Some("verify")
    } else {
        None
    }
}

/// Positional (non-keyword) arguments of a call.
pub(crate) fn positional_args(ctx: &FileContext, call: NodeId) -> Vec<NodeId> {
    let Some(args) = ctx.first_child_of_kind(call, &NodeKind::ArgumentList) else {
        return Vec::new();
    };
    ctx.children(args)
        .iter()
        .copied()
        .filter(|&a| {
            let node = ctx.node(a);
            node.is_named && node.kind != NodeKind::KeywordArgument
        })
        .collect()
}

pub(crate) fn keyword_arg(ctx: &FileContext, call: NodeId, name: &str) -> Option<NodeId> {
    let args = ctx.first_child_of_kind(call, &NodeKind::ArgumentList)?;
    for kw in ctx.children_of_kind(args, &NodeKind::KeywordArgument) {
        let kw_name = ctx.child_by_field(kw, "name").map(|n| ctx.text(n));
        if kw_name == Some(name) {
            return ctx.child_by_field(kw, "value");
        }
    }
    None
}

fn classify_secret(ctx: &FileContext, arg: NodeId) -> &'static str {
    let node = ctx.node(arg);
    match node.kind {
        NodeKind::StringLit => "hardcoded",
        NodeKind::TemplateString
            if ctx.descendants_of_kind(arg, &NodeKind::Interpolation).is_empty() =>
        {
            "hardcoded"
        }
        _ => {
            let text = ctx.text(arg);
            if text.contains("os.environ")
                || text.contains("os.getenv")
                || text.contains("process.env")
            {
                "env"
            } else {
                "var"
            }
        }
    }
}

/// String literal values anywhere under `id`.
fn string_values_in(ctx: &FileContext, id: NodeId) -> Vec<String> {
    ctx.descendants_of_kind(id, &NodeKind::StringLit)
        .into_iter()
        .map(|s| string_literal_value(ctx, s))
        .collect()
}

fn algorithms_for(ctx: &FileContext, call: NodeId) -> Vec<String> {
    // Python: algorithm=/algorithms= kwargs. JS: an options object with an
    // algorithm(s) key. Both reduce to string literals under the value.
    for kw in ["algorithm", "algorithms"] {
        if let Some(value) = keyword_arg(ctx, call, kw) {
            return string_values_in(ctx, value);
        }
    }
    // Third positional arg as a bare algorithm string (pyjwt style), or an
    // options object in either trailing position (jsonwebtoken style).
    let args = positional_args(ctx, call);
    if let Some(&third) = args.get(2) {
        if ctx.node(third).kind == NodeKind::StringLit {
            return vec![string_literal_value(ctx, third)];
        }
        if ctx.node(third).kind == NodeKind::ObjectLit {
            return object_algorithms(ctx, third);
        }
    }
    if let Some(&second) = args.get(1) {
        if ctx.node(second).kind == NodeKind::ObjectLit {
            return object_algorithms(ctx, second);
        }
    }
    Vec::new()
}

fn object_algorithms(ctx: &FileContext, object: NodeId) -> Vec<String> {
    for pair in ctx.children_of_kind(object, &NodeKind::Pair) {
        let key = ctx
            .child_by_field(pair, "key")
            .map(|k| string_literal_value(ctx, k));
        if matches!(key.as_deref(), Some("algorithm") | Some("algorithms")) {
            if let Some(value) = ctx.child_by_field(pair, "value") {
                let mut values = string_values_in(ctx, value);
                if values.is_empty() && ctx.node(value).kind == NodeKind::StringLit {
                    values.push(string_literal_value(ctx, value));
                }
                return values;
            }
        }
    }
    Vec::new()
}

fn sensitive_fields_in(ctx: &FileContext, payload: NodeId) -> Vec<String> {
    let mut out = Vec::new();
    for pair in ctx.descendants_of_kind(payload, &NodeKind::Pair) {
        if let Some(key) = ctx.child_by_field(pair, "key") {
            let name = string_literal_value(ctx, key);
            if SENSITIVE_FIELD_RE.is_match(&name) && !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

/// JWT encode/decode/verify callsites with their auth-relevant attributes.
pub fn extract_jwt_patterns(
    ctx: &FileContext,
    callees: &JwtCallees,
    batches: &mut RecordBatches,
) {
    for &call in ctx.find_nodes(&NodeKind::Call) {
        let Some(callee) = ctx.callee_text(call) else {
            continue;
        };
        let Some(pattern_type) = pattern_type_for(callees, callee) else {
            continue;
        };

        let args = positional_args(ctx, call);
        let secret_source = args
            .get(1)
            .map(|&secret| classify_secret(ctx, secret))
            .unwrap_or("var");
        let algorithms = algorithms_for(ctx, call);
        let allows_none = algorithms.iter().any(|a| a.eq_ignore_ascii_case("none"));
        let has_confusion = algorithms.iter().any(|a| a.starts_with("HS"))
            && algorithms
                .iter()
                .any(|a| a.starts_with("RS") || a.starts_with("ES"));
        let sensitive_fields = if pattern_type == "encode" {
            args.first()
                .map(|&payload| sensitive_fields_in(ctx, payload))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        push(
            batches,
            "jwt_patterns",
            json!({
                "file": ctx.path,
                "line": ctx.line_of(call),
                "pattern_type": pattern_type,
                "secret_source": secret_source,
                "algorithms": if algorithms.is_empty() { serde_json::Value::Null } else { json!(algorithms.join(",")) },
                "allows_none": allows_none,
                "has_confusion": has_confusion,
                "sensitive_fields": if sensitive_fields.is_empty() { serde_json::Value::Null } else { json!(json!(sensitive_fields).to_string()) },
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Language;

    fn python_ctx(content: &str) -> FileContext {
        FileContext::parse("app/a.py", Language::Python, content).expect("parse")
    }

    #[test]
    fn test_sql_fstring_is_dynamic() {
        let ctx = python_ctx(
            "def search(q):\n    sql = f\"SELECT * FROM users WHERE name = '{q}'\"\n    return sql\n",
        );
        let mut batches = RecordBatches::new();
        extract_sql_strings(&ctx, &mut batches);
        let queries = &batches["sql_queries"];
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0]["command"], "SELECT");
        assert_eq!(queries[0]["is_dynamic"], true);
        let tables = &batches["sql_query_tables"];
        assert_eq!(tables[0]["table_name"], "users");
    }

    #[test]
    fn test_sql_multi_table_enumerated() {
        let ctx = python_ctx(
            "QUERY = \"SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id\"\n",
        );
        let mut batches = RecordBatches::new();
        extract_sql_strings(&ctx, &mut batches);
        assert_eq!(batches["sql_queries"].len(), 1);
        assert_eq!(batches["sql_queries"][0]["is_dynamic"], false);
        let tables: Vec<&str> = batches["sql_query_tables"]
            .iter()
            .map(|r| r["table_name"].as_str().unwrap_or(""))
            .collect();
        assert_eq!(tables, vec!["users", "orders"]);
    }

    #[test]
    fn test_plain_string_is_not_sql() {
        let ctx = python_ctx("greeting = \"hello there\"\n");
        let mut batches = RecordBatches::new();
        extract_sql_strings(&ctx, &mut batches);
        assert!(batches.get("sql_queries").is_none());
    }

    #[test]
    fn test_jwt_hardcoded_secret() {
        let ctx = python_ctx(
            "import jwt\n\ndef make_token(payload):\n    return jwt.encode(payload, \"super-secret\", \"HS256\")\n",
        );
        let mut batches = RecordBatches::new();
        extract_jwt_patterns(&ctx, &PYTHON_JWT, &mut batches);
        let rows = &batches["jwt_patterns"];
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["pattern_type"], "encode");
        assert_eq!(rows[0]["secret_source"], "hardcoded");
        assert_eq!(rows[0]["algorithms"], "HS256");
        assert_eq!(rows[0]["allows_none"], false);
    }

    #[test]
    fn test_jwt_env_secret_and_none_algorithm() {
        let ctx = python_ctx(
            "import os, jwt\n\ndef decode(token):\n    return jwt.decode(token, os.environ['JWT_KEY'], algorithms=[\"HS256\", \"none\"])\n",
        );
        let mut batches = RecordBatches::new();
        extract_jwt_patterns(&ctx, &PYTHON_JWT, &mut batches);
        let rows = &batches["jwt_patterns"];
        assert_eq!(rows[0]["pattern_type"], "decode");
        assert_eq!(rows[0]["secret_source"], "env");
        assert_eq!(rows[0]["allows_none"], true);
    }

    #[test]
    fn test_jwt_sensitive_payload_fields() {
        let ctx = python_ctx(
            "import jwt\n\ndef t(user):\n    return jwt.encode({\"sub\": user.id, \"password\": user.password}, key, \"HS256\")\n",
        );
        let mut batches = RecordBatches::new();
        extract_jwt_patterns(&ctx, &PYTHON_JWT, &mut batches);
        let fields = batches["jwt_patterns"][0]["sensitive_fields"]
            .as_str()
            .expect("json array string");
        assert!(fields.contains("password"));
    }
}
