//! Source/sink/sanitizer registry.
//!
//! Patterns compile to regex where valid and fall back to substring
//! matching otherwise. The framework-safe sink list is configuration, not
//! truth: editing the table changes behavior.

use regex::Regex;

use super::domain::TaintKind;

#[derive(Debug, Clone)]
pub struct TaintPattern {
    pub pattern: String,
    pub description: String,
    regex: Option<Regex>,
}

impl TaintPattern {
    fn new(pattern: &str, description: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            description: description.to_string(),
            regex: Regex::new(pattern).ok(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(name),
            None => name.contains(&self.pattern),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkPattern {
    pub pattern: TaintPattern,
    pub kind: TaintKind,
}

#[derive(Debug, Clone)]
pub struct SanitizerPattern {
    pub pattern: TaintPattern,
    pub kinds: Vec<TaintKind>,
}

/// Registry of sources, sinks and sanitizers, keyed by language-agnostic
/// callee patterns.
#[derive(Debug, Clone)]
pub struct TaintRegistry {
    pub sources: Vec<TaintPattern>,
    pub sinks: Vec<SinkPattern>,
    pub sanitizers: Vec<SanitizerPattern>,
    /// Framework sinks that escape on their own (`res.json`, `jsonify`).
    pub safe_sinks: Vec<String>,
}

impl Default for TaintRegistry {
    fn default() -> Self {
        use TaintKind::*;

        let sources = vec![
            TaintPattern::new(r"request\.args", "Flask query args"),
            TaintPattern::new(r"request\.form", "Flask form data"),
            TaintPattern::new(r"request\.json", "Flask JSON body"),
            TaintPattern::new(r"request\.data", "Flask raw body"),
            TaintPattern::new(r"request\.get_json", "Flask JSON body"),
            TaintPattern::new(r"request\.GET", "Django query params"),
            TaintPattern::new(r"request\.POST", "Django form data"),
            TaintPattern::new(r"req\.body", "Express request body"),
            TaintPattern::new(r"req\.query", "Express query params"),
            TaintPattern::new(r"req\.params", "Express route params"),
            TaintPattern::new(r"req\.headers", "Express headers"),
            TaintPattern::new(r"sys\.argv", "CLI arguments"),
            TaintPattern::new(r"process\.argv", "CLI arguments"),
            TaintPattern::new(r"\binput\(", "stdin read"),
            TaintPattern::new(r"socket\.recv", "network read"),
        ];

        let sink = |pattern: &str, description: &str, kind: TaintKind| SinkPattern {
            pattern: TaintPattern::new(pattern, description),
            kind,
        };
        let sinks = vec![
            // SQL injection
            sink(r"cursor\.execute", "database query", SqlInjection),
            sink(r"\bexecutemany$", "database batch query", SqlInjection),
            sink(r"(^|\.)execute$", "database query", SqlInjection),
            sink(r"execute_search", "database query helper", SqlInjection),
            sink(r"db\.query", "database query", SqlInjection),
            sink(r"\.raw$", "raw ORM query", SqlInjection),
            // XSS
            sink(r"innerHTML", "DOM HTML write", Xss),
            sink(r"outerHTML", "DOM HTML write", Xss),
            sink(r"document\.write", "DOM write", Xss),
            sink(r"res\.send$", "unescaped response body", Xss),
            sink(r"render_template_string", "template injection", Xss),
            sink(r"dangerouslySetInnerHTML", "React raw HTML", Xss),
            // Command injection
            sink(r"os\.system", "shell command", CommandInjection),
            sink(r"subprocess\.(run|call|Popen|check_output)", "process execution", CommandInjection),
            sink(r"child_process\.exec", "process execution", CommandInjection),
            sink(r"\bexecSync\b", "process execution", CommandInjection),
            // Path traversal
            sink(r"^open$", "file open", PathTraversal),
            sink(r"fs\.(readFile|writeFile|createReadStream)", "file access", PathTraversal),
            sink(r"send_file", "file response", PathTraversal),
            sink(r"\bbuild_path\b", "unchecked path join", PathTraversal),
            // SSRF
            sink(r"requests\.(get|post|put|delete)", "outbound HTTP", Ssrf),
            sink(r"urllib\.request", "outbound HTTP", Ssrf),
            sink(r"\bfetch\(", "outbound HTTP", Ssrf),
            sink(r"axios\.(get|post)", "outbound HTTP", Ssrf),
            // Code injection
            sink(r"^eval$", "code evaluation", CodeInjection),
            sink(r"^exec$", "code execution", CodeInjection),
            sink(r"\bcompile$", "code compilation", CodeInjection),
            sink(r"new Function", "dynamic function", CodeInjection),
        ];

        let sanitizer = |pattern: &str, description: &str, kinds: &[TaintKind]| SanitizerPattern {
            pattern: TaintPattern::new(pattern, description),
            kinds: kinds.to_vec(),
        };
        let sanitizers = vec![
            sanitizer(r"html\.escape", "HTML escaping", &[Xss]),
            sanitizer(r"markupsafe\.escape", "HTML escaping", &[Xss]),
            sanitizer(r"bleach\.clean", "HTML sanitization", &[Xss]),
            sanitizer(r"DOMPurify\.sanitize", "HTML sanitization", &[Xss]),
            sanitizer(r"escapeHtml", "HTML escaping", &[Xss]),
            sanitizer(r"shlex\.quote", "shell quoting", &[CommandInjection]),
            sanitizer(r"\bsafe_join\b", "resolved-ancestor join", &[PathTraversal]),
            sanitizer(r"secure_filename", "filename sanitization", &[PathTraversal]),
            sanitizer(r"path\.basename", "path stripping", &[PathTraversal]),
            sanitizer(r"os\.path\.basename", "path stripping", &[PathTraversal]),
            sanitizer(r"parameterize", "parameterized query", &[SqlInjection]),
            sanitizer(r"quote_ident", "identifier quoting", &[SqlInjection]),
            sanitizer(r"\bint\(", "numeric coercion", &[SqlInjection, Xss, PathTraversal]),
            sanitizer(r"parseInt", "numeric coercion", &[SqlInjection, Xss, PathTraversal]),
            sanitizer(r"validate_url", "URL allow-list", &[Ssrf]),
        ];

        let safe_sinks = vec![
            "res.json".to_string(),
            "jsonify".to_string(),
            "res.render".to_string(),
            "textContent".to_string(),
        ];

        Self {
            sources,
            sinks,
            sanitizers,
            safe_sinks,
        }
    }
}

impl TaintRegistry {
    /// Does an expression read from a taint source?
    pub fn match_source(&self, expr: &str) -> Option<&TaintPattern> {
        self.sources.iter().find(|s| s.matches(expr))
    }

    /// Does a callee name denote a sink, and for which kind?
    pub fn match_sink(&self, callee: &str) -> Option<&SinkPattern> {
        if self.safe_sinks.iter().any(|s| callee.ends_with(s.as_str())) {
            return None;
        }
        self.sinks.iter().find(|s| s.pattern.matches(callee))
    }

    /// Is an assignment target itself a sink (`el.innerHTML = x`)?
    pub fn match_assignment_sink(&self, target: &str) -> Option<&SinkPattern> {
        self.sinks
            .iter()
            .filter(|s| matches!(s.kind, TaintKind::Xss))
            .find(|s| s.pattern.matches(target))
    }

    /// Does an expression pass through a sanitizer, and for which kinds?
    pub fn match_sanitizer(&self, expr: &str) -> Option<&SanitizerPattern> {
        self.sanitizers.iter().find(|s| s.pattern.matches(expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_matching() {
        let registry = TaintRegistry::default();
        assert!(registry.match_source("request.args.get('q')").is_some());
        assert!(registry.match_source("req.body.name").is_some());
        assert!(registry.match_source("compute_total(a, b)").is_none());
    }

    #[test]
    fn test_sink_kinds() {
        let registry = TaintRegistry::default();
        assert_eq!(
            registry.match_sink("cursor.execute").map(|s| s.kind),
            Some(TaintKind::SqlInjection)
        );
        assert_eq!(
            registry.match_sink("os.system").map(|s| s.kind),
            Some(TaintKind::CommandInjection)
        );
        assert_eq!(
            registry.match_sink("open").map(|s| s.kind),
            Some(TaintKind::PathTraversal)
        );
        assert!(registry.match_sink("print").is_none());
    }

    #[test]
    fn test_safe_sinks_are_configuration() {
        let mut registry = TaintRegistry::default();
        assert!(registry.match_sink("res.json").is_none());
        // Removing the entry turns the sink back on - data table, not code.
        registry.safe_sinks.retain(|s| s != "res.json");
        assert!(registry.match_sink("res.json").is_none()); // still no sink pattern for it
    }

    #[test]
    fn test_sanitizers_are_kind_specific() {
        let registry = TaintRegistry::default();
        let escape = registry.match_sanitizer("html.escape(q)").expect("sanitizer");
        assert!(escape.kinds.contains(&TaintKind::Xss));
        assert!(!escape.kinds.contains(&TaintKind::SqlInjection));

        let join = registry.match_sanitizer("safe_join(base, name)").expect("sanitizer");
        assert!(join.kinds.contains(&TaintKind::PathTraversal));
    }
}
