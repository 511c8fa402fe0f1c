//! Weak JWT usage: hardcoded secrets, `none` algorithm, algorithm
//! confusion, sensitive payload fields.

use serde_json::Value;

use crate::errors::Result;
use crate::features::rule_engine::context::RuleContext;
use crate::features::rule_engine::domain::{ExecutionScope, Rule, RuleMetadata};
use crate::shared::models::{Confidence, Finding, Severity};

const METADATA: RuleMetadata = RuleMetadata {
    name: "jwt_weak_patterns",
    category: "security",
    target_extensions: &[],
    exclude_patterns: &["test/", "__tests__/"],
    execution_scope: ExecutionScope::Database,
};

pub struct JwtPatternsRule;

impl Rule for JwtPatternsRule {
    fn metadata(&self) -> &RuleMetadata {
        &METADATA
    }

    fn analyze(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>> {
        let sql = ctx.build_query(
            "jwt_patterns",
            &[
                "file",
                "line",
                "pattern_type",
                "secret_source",
                "algorithms",
                "allows_none",
                "has_confusion",
                "sensitive_fields",
            ],
            None,
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
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut findings = Vec::new();
        for (file, line, pattern_type, secret_source, algorithms, allows_none, has_confusion, sensitive_fields) in
            rows
        {
            let line = line as u32;
            if secret_source == "hardcoded" {
                findings.push(
                    Finding::new(
                        "JWT_HARDCODED_SECRET",
                        file.clone(),
                        line,
                        Severity::Critical,
                        "security",
                        format!("JWT {} uses a hardcoded secret", pattern_type),
                    )
                    .with_confidence(Confidence::High)
                    .with_cwe("CWE-798")
                    .with_detail("pattern_type", Value::from(pattern_type.clone())),
                );
            }
            if allows_none != 0 {
                findings.push(
                    Finding::new(
                        "JWT_NONE_ALGORITHM",
                        file.clone(),
                        line,
                        Severity::Critical,
                        "security",
                        "JWT accepts the 'none' algorithm (signature bypass)",
                    )
                    .with_confidence(Confidence::High)
                    .with_cwe("CWE-347")
                    .with_detail("algorithms", Value::from(algorithms.clone().unwrap_or_default())),
                );
            }
            if has_confusion != 0 {
                findings.push(
                    Finding::new(
                        "JWT_ALGORITHM_CONFUSION",
                        file.clone(),
                        line,
                        Severity::High,
                        "security",
                        "JWT mixes HMAC and asymmetric algorithms (key confusion)",
                    )
                    .with_confidence(Confidence::Medium)
                    .with_cwe("CWE-347"),
                );
            }
            if pattern_type == "encode" {
                if let Some(fields) = sensitive_fields.filter(|f| !f.is_empty()) {
                    findings.push(
                        Finding::new(
                            "JWT_SENSITIVE_PAYLOAD",
                            file,
                            line,
                            Severity::Medium,
                            "security",
                            "JWT payload carries sensitive fields (tokens are only encoded, not encrypted)",
                        )
                        .with_confidence(Confidence::High)
                        .with_cwe("CWE-200")
                        .with_detail("fields", Value::from(fields)),
                    );
                }
            }
        }
        Ok(findings)
    }
}
