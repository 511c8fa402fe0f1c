//! Shared domain models: spans, languages, findings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Source code span (1-based lines, 0-based columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// Languages the core extracts first-class. Extension points for other
/// ecosystems hang off the indexing dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    TypeScript,
    JavaScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
        }
    }

    /// Detect a supported language from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyi" => Some(Language::Python),
            "ts" => Some(Language::TypeScript),
            "tsx" | "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            _ => None,
        }
    }
}

/// Walker output for one source file; the `files` table row shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Forward-slash relative path.
    pub path: String,
    pub language: Language,
    pub size_bytes: u64,
    pub sha256: String,
    pub mtime: i64,
}

impl FileInfo {
    pub fn to_record(&self) -> serde_json::Map<String, Value> {
        json!({
            "path": self.path,
            "language": self.language.as_str(),
            "size_bytes": self.size_bytes,
            "sha256": self.sha256,
            "mtime": self.mtime,
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }
}

/// Finding severity, ordered for exit-code computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Severity::Info),
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Finding confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// Snippets in findings are capped for the JSON mirror.
pub const MAX_SNIPPET_LEN: usize = 200;

/// A security finding with stable fields; mirrored between
/// `findings_consolidated` and `raw/findings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule_name: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub confidence: Confidence,
    pub category: String,
    pub message: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Value>>,
}

impl Finding {
    pub fn new(
        rule_name: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            file: file.into(),
            line,
            column: 0,
            severity,
            confidence: Confidence::Medium,
            category: category.into(),
            message: message.into(),
            snippet: String::new(),
            cwe: None,
            details: None,
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        let mut snippet: String = snippet.into();
        if snippet.len() > MAX_SNIPPET_LEN {
            snippet = snippet.chars().take(MAX_SNIPPET_LEN).collect();
        }
        self.snippet = snippet;
        self
    }

    pub fn with_cwe(mut self, cwe: impl Into<String>) -> Self {
        self.cwe = Some(cwe.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    /// Record shape for the `findings_consolidated` table.
    pub fn to_record(&self) -> serde_json::Map<String, Value> {
        let details = self
            .details
            .as_ref()
            .map(|d| Value::String(json!(d).to_string()))
            .unwrap_or(Value::Null);
        json!({
            "rule_name": self.rule_name,
            "file": self.file,
            "line": self.line,
            "column_number": self.column,
            "severity": self.severity.as_str(),
            "confidence": self.confidence.as_str(),
            "category": self.category,
            "message": self.message,
            "snippet": self.snippet,
            "cwe": self.cwe,
            "details": details,
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }
}
