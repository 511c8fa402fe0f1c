//! Taint domain models.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::shared::models::Severity;

/// Vulnerability classes the analyzer tracks. Sanitizers are
/// kind-specific: `html.escape` neutralizes XSS but not SQL injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaintKind {
    SqlInjection,
    Xss,
    CommandInjection,
    PathTraversal,
    Ssrf,
    CodeInjection,
}

impl TaintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaintKind::SqlInjection => "sql_injection",
            TaintKind::Xss => "xss",
            TaintKind::CommandInjection => "command_injection",
            TaintKind::PathTraversal => "path_traversal",
            TaintKind::Ssrf => "ssrf",
            TaintKind::CodeInjection => "code_injection",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            TaintKind::SqlInjection | TaintKind::CommandInjection | TaintKind::CodeInjection => {
                Severity::Critical
            }
            TaintKind::Xss | TaintKind::PathTraversal | TaintKind::Ssrf => Severity::High,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            TaintKind::SqlInjection
            | TaintKind::CommandInjection
            | TaintKind::CodeInjection
            | TaintKind::Xss => "injection",
            TaintKind::PathTraversal => "path_traversal",
            TaintKind::Ssrf => "ssrf",
        }
    }

    pub fn cwe(&self) -> &'static str {
        match self {
            TaintKind::SqlInjection => "CWE-89",
            TaintKind::Xss => "CWE-79",
            TaintKind::CommandInjection => "CWE-78",
            TaintKind::PathTraversal => "CWE-22",
            TaintKind::Ssrf => "CWE-918",
            TaintKind::CodeInjection => "CWE-94",
        }
    }
}

/// One hop of a reported path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaintStep {
    pub node_id: String,
    pub file: String,
    pub line: i64,
    /// Edge kind taken into this step; `source` for the first step.
    pub edge_kind: String,
}

/// A source-to-sink path with its ordered steps. Steps correspond 1:1 to
/// edges in `graphs.db`; the sink callsite location rides separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintPath {
    pub source_node: String,
    pub sink_node: String,
    pub vulnerability: TaintKind,
    pub sink_callee: String,
    pub sink_file: String,
    pub sink_line: i64,
    pub steps: Vec<TaintStep>,
}

impl TaintPath {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Per-function input->output taint summary, cached by
/// `(file:function, entry_state_hash, mtime)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionSummary {
    /// `file_path:function_name`
    pub function_id: String,
    /// Parameter indexes whose taint reaches a return path.
    pub tainted_params: BTreeSet<usize>,
    /// Return value tainted regardless of parameters (e.g. reads a source
    /// inside the body).
    pub returns_source: bool,
    /// Taint kinds this function sanitizes on its return paths.
    pub sanitizes: Vec<TaintKind>,
    /// Every return path exits before any sink (guard functions).
    pub has_early_exit: bool,
}

impl FunctionSummary {
    pub fn new(function_id: impl Into<String>) -> Self {
        Self {
            function_id: function_id.into(),
            ..Self::default()
        }
    }

    /// Conservative over-approximation used when no summary is
    /// available: every parameter propagates to the return value.
    pub fn identity(function_id: impl Into<String>, param_count: usize) -> Self {
        Self {
            function_id: function_id.into(),
            tainted_params: (0..param_count).collect(),
            returns_source: false,
            sanitizes: Vec::new(),
            has_early_exit: false,
        }
    }

    pub fn propagates_param(&self, index: usize) -> bool {
        self.tainted_params.contains(&index)
    }

    pub fn sanitizes_kind(&self, kind: TaintKind) -> bool {
        self.sanitizes.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_attributes() {
        assert_eq!(TaintKind::SqlInjection.severity(), Severity::Critical);
        assert_eq!(TaintKind::SqlInjection.category(), "injection");
        assert_eq!(TaintKind::PathTraversal.cwe(), "CWE-22");
    }

    #[test]
    fn test_identity_summary_propagates_everything() {
        let summary = FunctionSummary::identity("a.py:f", 3);
        assert!(summary.propagates_param(0));
        assert!(summary.propagates_param(2));
        assert!(!summary.propagates_param(3));
        assert!(!summary.sanitizes_kind(TaintKind::Xss));
    }

    #[test]
    fn test_summary_serialization_round_trip() {
        let mut summary = FunctionSummary::new("a.py:clean");
        summary.sanitizes.push(TaintKind::Xss);
        summary.tainted_params.insert(0);
        let json = serde_json::to_string(&summary).expect("serialize");
        let back: FunctionSummary = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.function_id, "a.py:clean");
        assert!(back.sanitizes_kind(TaintKind::Xss));
        assert!(back.propagates_param(0));
    }
}
