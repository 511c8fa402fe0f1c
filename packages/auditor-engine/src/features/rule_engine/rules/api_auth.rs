//! Missing authentication on state-changing endpoints.

use serde_json::Value;

use crate::errors::Result;
use crate::features::rule_engine::context::RuleContext;
use crate::features::rule_engine::domain::{ExecutionScope, Rule, RuleMetadata};
use crate::shared::models::{Confidence, Finding, Severity};

const METADATA: RuleMetadata = RuleMetadata {
    name: "missing_api_authentication",
    category: "security",
    target_extensions: &[],
    exclude_patterns: &["test/", "__tests__/", "spec/"],
    execution_scope: ExecutionScope::Database,
};

/// Middleware/decorator names that count as authentication controls.
const AUTH_KEYWORDS: &[&str] = &[
    "auth",
    "authenticate",
    "authenticated",
    "authorization",
    "authorize",
    "requireauth",
    "isauthenticated",
    "ensureauthenticated",
    "protect",
    "protected",
    "secure",
    "secured",
    "jwt",
    "verifytoken",
    "validatetoken",
    "checktoken",
    "verifyjwt",
    "session",
    "checksession",
    "validatesession",
    "requiresession",
    "login_required",
    "permission_required",
    "requires_auth",
    "passport",
    "ensureloggedin",
    "requireuser",
    "currentuser",
    "role",
    "checkrole",
    "hasrole",
    "requirerole",
    "permission",
    "checkpermission",
    "haspermission",
    "admin",
    "requireadmin",
    "isadmin",
    "rbac",
    "acl",
    "hasaccess",
    "apikey",
    "api_key",
    "checkapikey",
    "oauth",
    "guard",
    "middleware",
];

pub struct ApiAuthRule;

impl Rule for ApiAuthRule {
    fn metadata(&self) -> &RuleMetadata {
        &METADATA
    }

    fn analyze(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>> {
        let sql = ctx.build_query(
            "api_endpoints",
            &["file", "method", "pattern", "controls", "line"],
            None,
            Some("file, pattern"),
        )?;
        let mut stmt = ctx.conn.prepare(&sql)?;
        let endpoints = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut findings = Vec::new();
        for (file, method, pattern, controls_json, line) in endpoints {
            if !matches!(method.as_str(), "POST" | "PUT" | "PATCH" | "DELETE") {
                continue;
            }
            let controls: Vec<String> = controls_json
                .as_deref()
                .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
                .unwrap_or_default();
            let has_auth = controls.iter().any(|control| {
                let control = control.to_lowercase();
                AUTH_KEYWORDS.iter().any(|keyword| control.contains(keyword))
            });
            if has_auth {
                continue;
            }
            findings.push(
                Finding::new(
                    "MISSING_API_AUTHENTICATION",
                    file,
                    line as u32,
                    Severity::High,
                    "security",
                    format!(
                        "State-changing endpoint lacks authentication: {} {}",
                        method, pattern
                    ),
                )
                .with_confidence(Confidence::Medium)
                .with_snippet(format!("{} {} - No auth middleware detected", method, pattern))
                .with_cwe("CWE-306")
                .with_detail("method", Value::from(method))
                .with_detail("pattern", Value::from(pattern))
                .with_detail("controls", Value::from(controls))
                .with_detail(
                    "recommendation",
                    Value::from(
                        "Add authentication middleware or decorator to protect this endpoint",
                    ),
                ),
            );
        }
        Ok(findings)
    }
}
