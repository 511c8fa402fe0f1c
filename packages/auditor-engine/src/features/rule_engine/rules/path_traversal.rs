//! File sinks fed by naive path concatenation. File-scope: walks the
//! pre-built node index of the current file.

use serde_json::Value;

use crate::errors::Result;
use crate::features::file_context::NodeKind;
use crate::features::rule_engine::context::RuleContext;
use crate::features::rule_engine::domain::{ExecutionScope, Rule, RuleMetadata};
use crate::shared::models::{Confidence, Finding, Severity};
use crate::shared::utils::snippet::line_snippet;

const METADATA: RuleMetadata = RuleMetadata {
    name: "path_traversal_unsafe_join",
    category: "security",
    target_extensions: &[".py", ".js", ".ts", ".tsx", ".jsx"],
    exclude_patterns: &["test/", "__tests__/"],
    execution_scope: ExecutionScope::File,
};

const FILE_SINKS: &[&str] = &["open", "send_file", "fs.readFile", "fs.createReadStream"];

/// Joins that concatenate without a containment check.
const UNSAFE_JOINS: &[&str] = &["build_path(", "os.path.join(", "path.join("];

/// Resolved-ancestor joins neutralize the sink.
const SAFE_JOINS: &[&str] = &["safe_join(", "secure_filename("];

pub struct PathTraversalRule;

impl Rule for PathTraversalRule {
    fn metadata(&self) -> &RuleMetadata {
        &METADATA
    }

    fn analyze(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>> {
        let Some(scope) = &ctx.file else {
            return Ok(Vec::new());
        };
        let file_ctx = scope.context;

        let mut findings = Vec::new();
        for &call in file_ctx.find_nodes(&NodeKind::Call) {
            let Some(callee) = file_ctx.callee_text(call) else {
                continue;
            };
            if !FILE_SINKS.contains(&callee) {
                continue;
            }
            let Some(args) = file_ctx.first_child_of_kind(call, &NodeKind::ArgumentList) else {
                continue;
            };
            let args_text = file_ctx.text(args);
            if SAFE_JOINS.iter().any(|join| args_text.contains(join)) {
                continue;
            }
            let unsafe_join = UNSAFE_JOINS
                .iter()
                .find(|join| args_text.contains(*join))
                .copied();
            let concatenated = args_text.contains(" + ");
            if unsafe_join.is_none() && !concatenated {
                continue;
            }

            let line = file_ctx.line_of(call);
            findings.push(
                Finding::new(
                    "PATH_TRAVERSAL_UNSAFE_JOIN",
                    file_ctx.path.clone(),
                    line,
                    Severity::High,
                    "security",
                    format!(
                        "{} receives a concatenated path; use a resolved-ancestor join",
                        callee
                    ),
                )
                .with_confidence(Confidence::Medium)
                .with_snippet(line_snippet(&file_ctx.content, line))
                .with_cwe("CWE-22")
                .with_detail(
                    "join",
                    Value::from(unsafe_join.unwrap_or("string concatenation")),
                ),
            );
        }
        Ok(findings)
    }
}
