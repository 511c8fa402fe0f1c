//! Risky global mutable state in Python modules: module-level mutable
//! literals written from inner scopes.

use serde_json::Value;

use crate::errors::Result;
use crate::features::rule_engine::context::RuleContext;
use crate::features::rule_engine::domain::{ExecutionScope, Rule, RuleMetadata};
use crate::shared::models::{Confidence, Finding, Severity};

const METADATA: RuleMetadata = RuleMetadata {
    name: "python_globals",
    category: "concurrency",
    target_extensions: &[".py"],
    exclude_patterns: &[
        "frontend/",
        "client/",
        "node_modules/",
        "test/",
        "__tests__/",
        "migrations/",
    ],
    execution_scope: ExecutionScope::Database,
};

const MUTABLE_LITERALS: &[&str] = &["{}", "[]", "dict(", "list(", "set("];
const IMMUTABLE_OK: &[&str] = &["logging.getLogger"];

pub struct PythonGlobalsRule;

impl Rule for PythonGlobalsRule {
    fn metadata(&self) -> &RuleMetadata {
        &METADATA
    }

    fn analyze(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>> {
        let sql = ctx.build_query(
            "assignments",
            &["file", "line", "target_var", "source_expr"],
            Some("source_expr IS NOT NULL AND scope = 'module'"),
            Some("file, line"),
        )?;
        let mut stmt = ctx.conn.prepare(&sql)?;
        let candidates = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut findings = Vec::new();
        for (file, line, var, expr) in candidates {
            if !METADATA.applies_to(&file) {
                continue;
            }
            if !MUTABLE_LITERALS.iter().any(|literal| expr.contains(literal)) {
                continue;
            }
            if ctx.config.exclude_underscore_prefixed && var.starts_with('_') {
                continue;
            }
            // ALL_CAPS names are treated as constants.
            if var
                .chars()
                .filter(|c| c.is_ascii_alphabetic())
                .all(|c| c.is_ascii_uppercase())
                && var.chars().any(|c| c.is_ascii_alphabetic())
            {
                continue;
            }
            if IMMUTABLE_OK.iter().any(|allowed| expr.contains(allowed)) {
                continue;
            }

            // Only flag globals actually written from inner scopes.
            let writes: i64 = ctx.conn.query_row(
                "SELECT COUNT(*)
                 FROM variable_usage
                 WHERE file = ?1
                   AND variable_name = ?2
                   AND scope_level IS NOT NULL
                   AND scope_level > 0",
                rusqlite::params![file, var],
                |row| row.get(0),
            )?;
            if writes == 0 {
                continue;
            }

            findings.push(
                Finding::new(
                    "GLOBAL_MUTABLE_STATE",
                    file,
                    line as u32,
                    Severity::Medium,
                    "concurrency",
                    format!(
                        "Module-level mutable '{}' is accessed from inner scopes",
                        var
                    ),
                )
                .with_confidence(Confidence::Medium)
                .with_snippet(format!("{} = {}", var, expr))
                .with_cwe("CWE-362")
                .with_detail("variable", Value::from(var))
                .with_detail("inner_scope_uses", Value::from(writes)),
            );
        }
        Ok(findings)
    }
}
