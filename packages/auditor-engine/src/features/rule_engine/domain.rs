//! Rule trait and metadata.

use crate::errors::Result;
use crate::shared::models::Finding;

use super::context::RuleContext;

/// Where a rule runs: once per matching file with its AST, or once per
/// run against the indexed database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionScope {
    File,
    Database,
}

/// Static description of a rule.
#[derive(Debug, Clone)]
pub struct RuleMetadata {
    pub name: &'static str,
    pub category: &'static str,
    pub target_extensions: &'static [&'static str],
    pub exclude_patterns: &'static [&'static str],
    pub execution_scope: ExecutionScope,
}

impl RuleMetadata {
    pub fn applies_to(&self, path: &str) -> bool {
        if self
            .exclude_patterns
            .iter()
            .any(|pattern| path.contains(pattern))
        {
            return false;
        }
        if self.target_extensions.is_empty() {
            return true;
        }
        self.target_extensions
            .iter()
            .any(|ext| path.ends_with(ext))
    }
}

/// A detector. Implementations must not re-parse files nor call external
/// tools; everything they need is in the context.
pub trait Rule: Send + Sync {
    fn metadata(&self) -> &RuleMetadata;
    fn analyze(&self, ctx: &RuleContext<'_>) -> Result<Vec<Finding>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: RuleMetadata = RuleMetadata {
        name: "test_rule",
        category: "security",
        target_extensions: &[".py"],
        exclude_patterns: &["migrations/", "test/"],
        execution_scope: ExecutionScope::File,
    };

    #[test]
    fn test_applies_to() {
        assert!(METADATA.applies_to("app/views.py"));
        assert!(!METADATA.applies_to("app/views.ts"));
        assert!(!METADATA.applies_to("app/migrations/0001_init.py"));
        assert!(!METADATA.applies_to("test/test_views.py"));
    }
}
