//! Dynamic SQL construction (f-strings, template literals, `.format`,
//! concatenation).

use serde_json::Value;

use crate::errors::Result;
use crate::features::rule_engine::context::RuleContext;
use crate::features::rule_engine::domain::{ExecutionScope, Rule, RuleMetadata};
use crate::shared::models::{Confidence, Finding, Severity};

const METADATA: RuleMetadata = RuleMetadata {
    name: "sql_injection_dynamic_query",
    category: "security",
    target_extensions: &[],
    exclude_patterns: &["test/", "__tests__/", "migrations/"],
    execution_scope: ExecutionScope::Database,
};

pub struct SqlInjectionRule;

impl Rule for SqlInjectionRule {
    fn metadata(&self) -> &RuleMetadata {
        &METADATA
    }

    fn analyze(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>> {
        let sql = ctx.build_query(
            "sql_queries",
            &["file", "line", "query_text", "command"],
            Some("is_dynamic = 1"),
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
        for (file, line, query_text, command) in rows {
            findings.push(
                Finding::new(
                    "SQL_INJECTION_DYNAMIC_QUERY",
                    file,
                    line as u32,
                    Severity::Critical,
                    "security",
                    format!(
                        "{} query built with string interpolation; use parameterized queries",
                        command
                    ),
                )
                .with_confidence(Confidence::High)
                .with_snippet(query_text)
                .with_cwe("CWE-89")
                .with_detail("command", Value::from(command)),
            );
        }
        Ok(findings)
    }
}
