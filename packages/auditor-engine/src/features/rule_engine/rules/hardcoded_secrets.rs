//! Secret-named variables assigned literal values.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::errors::Result;
use crate::features::rule_engine::context::RuleContext;
use crate::features::rule_engine::domain::{ExecutionScope, Rule, RuleMetadata};
use crate::shared::models::{Confidence, Finding, Severity};

const METADATA: RuleMetadata = RuleMetadata {
    name: "hardcoded_secrets",
    category: "security",
    target_extensions: &[],
    exclude_patterns: &["test/", "__tests__/", "fixtures/", "example"],
    execution_scope: ExecutionScope::Database,
};

static SECRET_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(secret|password|passwd|api_?key|auth_?token|private_?key|client_secret)")
        .unwrap_or_else(|e| panic!("static regex: {}", e))
});

/// Quoted literal of non-trivial length.
static LITERAL_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^["'][^"']{8,}["']$"#).unwrap_or_else(|e| panic!("static regex: {}", e))
});

pub struct HardcodedSecretsRule;

impl Rule for HardcodedSecretsRule {
    fn metadata(&self) -> &RuleMetadata {
        &METADATA
    }

    fn analyze(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>> {
        let sql = ctx.build_query(
            "assignments",
            &["file", "line", "target_var", "source_expr"],
            Some("source_expr IS NOT NULL"),
            Some("file, line"),
        )?;
        let mut stmt = ctx.conn.prepare(&sql)?;
        let rows = stmt
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
        for (file, line, target_var, source_expr) in rows {
            if !SECRET_NAME_RE.is_match(&target_var) {
                continue;
            }
            let expr = source_expr.trim();
            if !LITERAL_VALUE_RE.is_match(expr) {
                continue;
            }
            if expr.contains("environ") || expr.contains("process.env") || expr.contains("getenv")
            {
                continue;
            }
            findings.push(
                Finding::new(
                    "HARDCODED_SECRET",
                    file,
                    line as u32,
                    Severity::High,
                    "security",
                    format!("Credential-named variable '{}' assigned a literal value", target_var),
                )
                .with_confidence(Confidence::Medium)
                .with_snippet(format!("{} = \"...\"", target_var))
                .with_cwe("CWE-798")
                .with_detail("variable", Value::from(target_var)),
            );
        }
        Ok(findings)
    }
}
