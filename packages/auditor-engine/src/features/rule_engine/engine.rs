//! Rule engine: explicit registry, per-rule isolation, findings
//! persistence.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rusqlite::{params, Connection};
use tracing::{error, info};

use auditor_storage::registry;

use crate::config::AuditConfig;
use crate::errors::{AuditError, Result};
use crate::features::file_context::FileContext;
use crate::shared::models::{FileInfo, Finding, Language};

use super::context::RuleContext;
use super::domain::{ExecutionScope, Rule};
use super::rules::{
    ApiAuthRule, HardcodedSecretsRule, JwtPatternsRule, PathTraversalRule, PythonGlobalsRule,
    SqlInjectionRule,
};

/// The explicit rule registry. Adding a rule means adding a line here.
pub fn build_rule_registry() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ApiAuthRule),
        Box::new(JwtPatternsRule),
        Box::new(SqlInjectionRule),
        Box::new(HardcodedSecretsRule),
        Box::new(PythonGlobalsRule),
        Box::new(PathTraversalRule),
    ]
}

#[derive(Debug, Default)]
pub struct RuleRunResult {
    pub findings: Vec<Finding>,
    /// `(rule_name, error)` for rules that failed; the run continues.
    pub rule_errors: Vec<(String, String)>,
}

pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            rules: build_rule_registry(),
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Run every registered rule. Database rules run once; file rules run
    /// once per matching file with a `FileContext` parsed here (rules
    /// themselves never re-parse). A failing rule is logged, contributes
    /// no findings, and does not stop the others.
    pub fn run(&self, conn: &Connection, config: &AuditConfig) -> Result<RuleRunResult> {
        let mut result = RuleRunResult::default();

        // Database-scope rules.
        for rule in self
            .rules
            .iter()
            .filter(|r| r.metadata().execution_scope == ExecutionScope::Database)
        {
            let ctx = RuleContext::database(conn, config);
            self.run_one(rule.as_ref(), &ctx, &mut result);
        }

        // File-scope rules, one parse per file shared by all of them.
        let file_rules: Vec<&dyn Rule> = self
            .rules
            .iter()
            .filter(|r| r.metadata().execution_scope == ExecutionScope::File)
            .map(|r| r.as_ref())
            .collect();
        if !file_rules.is_empty() {
            for info in load_files(conn)? {
                let applicable: Vec<&dyn Rule> = file_rules
                    .iter()
                    .copied()
                    .filter(|r| r.metadata().applies_to(&info.path))
                    .collect();
                if applicable.is_empty() {
                    continue;
                }
                let abs = config.root.join(&info.path);
                let Ok(content) = std::fs::read_to_string(&abs) else {
                    continue;
                };
                // Files that failed to parse were flagged at index time.
                let Ok(file_ctx) = FileContext::parse(&info.path, info.language, &content) else {
                    continue;
                };
                for rule in applicable {
                    let ctx = RuleContext::for_file(conn, config, &info, &file_ctx);
                    self.run_one(rule, &ctx, &mut result);
                }
            }
        }

        info!(
            findings = result.findings.len(),
            failed_rules = result.rule_errors.len(),
            "rule engine complete"
        );
        Ok(result)
    }

    fn run_one(&self, rule: &dyn Rule, ctx: &RuleContext<'_>, result: &mut RuleRunResult) {
        let name = rule.metadata().name;
        // A panicking rule must not take the run down with it.
        let outcome = catch_unwind(AssertUnwindSafe(|| rule.analyze(ctx)));
        match outcome {
            Ok(Ok(mut findings)) => result.findings.append(&mut findings),
            Ok(Err(err)) => {
                error!(rule = name, error = %err, "rule failed");
                result.rule_errors.push((name.to_string(), err.to_string()));
            }
            Err(_) => {
                error!(rule = name, "rule panicked");
                result
                    .rule_errors
                    .push((name.to_string(), "rule panicked".to_string()));
            }
        }
    }
}

fn load_files(conn: &Connection) -> Result<Vec<FileInfo>> {
    let sql = registry().build_query(
        "files",
        &["path", "language", "size_bytes", "sha256", "mtime"],
        None,
        Some("path"),
    )?;
    let mut stmt = conn.prepare(&sql)?;
    let files = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(files
        .into_iter()
        .filter_map(|(path, language, size_bytes, sha256, mtime)| {
            let language = match language.as_str() {
                "python" => Language::Python,
                "typescript" => Language::TypeScript,
                "javascript" => Language::JavaScript,
                _ => return None,
            };
            Some(FileInfo {
                path,
                language,
                size_bytes: size_bytes as u64,
                sha256,
                mtime,
            })
        })
        .collect())
}

/// Mirror findings into `findings_consolidated` (post-barrier,
/// single-threaded).
pub fn persist_findings(conn: &Connection, findings: &[Finding]) -> Result<()> {
    conn.execute("DELETE FROM findings_consolidated", [])
        .map_err(AuditError::from)?;
    let mut stmt = conn.prepare(
        "INSERT INTO findings_consolidated
         (rule_name, file, line, column_number, severity, confidence, category,
          message, snippet, cwe, details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for finding in findings {
        let details = finding
            .details
            .as_ref()
            .map(|d| serde_json::json!(d).to_string());
        stmt.execute(params![
            finding.rule_name,
            finding.file,
            finding.line,
            finding.column,
            finding.severity.as_str(),
            finding.confidence.as_str(),
            finding.category,
            finding.message,
            finding.snippet,
            finding.cwe,
            details,
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::rule_engine::domain::RuleMetadata;

    struct FailingRule;

    const FAILING_METADATA: RuleMetadata = RuleMetadata {
        name: "always_fails",
        category: "test",
        target_extensions: &[],
        exclude_patterns: &[],
        execution_scope: ExecutionScope::Database,
    };

    impl Rule for FailingRule {
        fn metadata(&self) -> &RuleMetadata {
            &FAILING_METADATA
        }

        fn analyze(&self, _ctx: &RuleContext<'_>) -> Result<Vec<Finding>> {
            Err(AuditError::rule("always_fails", "boom"))
        }
    }

    #[test]
    fn test_failing_rule_does_not_stop_the_run() {
        let writer = auditor_storage::IndexWriter::in_memory().expect("open");
        let config = AuditConfig::default();
        let engine = RuleEngine::with_rules(vec![Box::new(FailingRule), Box::new(ApiAuthRule)]);
        let result = engine.run(writer.connection(), &config).expect("run");
        assert_eq!(result.rule_errors.len(), 1);
        assert_eq!(result.rule_errors[0].0, "always_fails");
        // ApiAuthRule ran against the empty database without error.
        assert!(result.findings.is_empty());
    }
}
