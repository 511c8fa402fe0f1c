//! Factual correlation engine.
//!
//! YAML-loaded rules describe co-occurring facts (tool + pattern pairs).
//! After all detectors run, findings whose tools/rules/messages match all
//! facts of a correlation rule within one file produce a
//! higher-confidence composite finding. Patterns compile to
//! case-insensitive regex when valid, literal substring otherwise.

use std::collections::BTreeMap;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tracing::warn;

use crate::errors::{AuditError, Result};
use crate::shared::models::{Confidence, Finding, Severity};

/// A normalized fact record the correlator matches against: internal
/// findings plus any external tool outputs fed in as JSON.
#[derive(Debug, Clone)]
pub struct FactRecord {
    pub tool: String,
    pub rule: String,
    pub message: String,
    pub file: String,
    pub line: u32,
}

impl FactRecord {
    pub fn from_finding(finding: &Finding) -> Self {
        Self {
            tool: "auditor".to_string(),
            rule: finding.rule_name.clone(),
            message: finding.message.clone(),
            file: finding.file.clone(),
            line: finding.line,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFact {
    tool: String,
    pattern: String,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    co_occurring_facts: Vec<RawFact>,
}

fn default_confidence() -> f64 {
    0.8
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<RawRule>,
}

#[derive(Debug)]
struct CompiledFact {
    tool: String,
    pattern: String,
    regex: Option<Regex>,
}

impl CompiledFact {
    fn new(raw: RawFact) -> Self {
        let regex = RegexBuilder::new(&raw.pattern)
            .case_insensitive(true)
            .build()
            .ok();
        Self {
            tool: raw.tool,
            pattern: raw.pattern,
            regex,
        }
    }

    fn matches(&self, record: &FactRecord) -> bool {
        if record.tool != self.tool {
            return false;
        }
        match &self.regex {
            Some(re) => re.is_match(&record.rule) || re.is_match(&record.message),
            None => {
                record.rule.contains(&self.pattern) || record.message.contains(&self.pattern)
            }
        }
    }
}

#[derive(Debug)]
pub struct CorrelationRule {
    pub name: String,
    pub description: Option<String>,
    pub confidence: f64,
    facts: Vec<CompiledFact>,
}

impl CorrelationRule {
    fn parse(raw: RawRule) -> Result<Self> {
        if raw.co_occurring_facts.is_empty() {
            return Err(AuditError::config(format!(
                "correlation rule '{}' has no co_occurring_facts",
                raw.name
            )));
        }
        Ok(Self {
            name: raw.name,
            description: raw.description,
            confidence: raw.confidence,
            facts: raw.co_occurring_facts.into_iter().map(CompiledFact::new).collect(),
        })
    }
}

#[derive(Debug, Default)]
pub struct CorrelationEngine {
    rules: Vec<CorrelationRule>,
}

impl CorrelationEngine {
    pub fn new(rules: Vec<CorrelationRule>) -> Self {
        Self { rules }
    }

    /// Load every `*.yml`/`*.yaml` in a directory; unparseable files are
    /// logged and skipped, the rest keep loading.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut rules = Vec::new();
        if !dir.exists() {
            return Ok(Self::new(rules));
        }
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                )
            })
            .collect();
        entries.sort();
        for path in entries {
            match Self::load_file(&path) {
                Ok(mut loaded) => rules.append(&mut loaded),
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "skipping correlation rule file");
                }
            }
        }
        Ok(Self::new(rules))
    }

    pub fn load_file(path: &Path) -> Result<Vec<CorrelationRule>> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_yaml(&text)
    }

    /// Both formats are accepted: a `rules:` list or a single rule at the
    /// document root.
    pub fn parse_yaml(text: &str) -> Result<Vec<CorrelationRule>> {
        if let Ok(file) = serde_yaml::from_str::<RuleFile>(text) {
            return file.rules.into_iter().map(CorrelationRule::parse).collect();
        }
        let single: RawRule = serde_yaml::from_str(text)
            .map_err(|e| AuditError::config(format!("invalid correlation rule YAML: {}", e)))?;
        Ok(vec![CorrelationRule::parse(single)?])
    }

    pub fn rules(&self) -> &[CorrelationRule] {
        &self.rules
    }

    /// Emit one composite finding per (rule, file) where every fact of
    /// the rule matched at least one record in that file.
    pub fn correlate(&self, records: &[FactRecord]) -> Vec<Finding> {
        let mut by_file: BTreeMap<&str, Vec<&FactRecord>> = BTreeMap::new();
        for record in records {
            by_file.entry(record.file.as_str()).or_default().push(record);
        }

        let mut composites = Vec::new();
        for rule in &self.rules {
            for (file, file_records) in &by_file {
                let mut matched: Vec<&FactRecord> = Vec::new();
                let all_facts_present = rule.facts.iter().all(|fact| {
                    match file_records.iter().find(|r| fact.matches(r)) {
                        Some(record) => {
                            matched.push(record);
                            true
                        }
                        None => false,
                    }
                });
                if !all_facts_present {
                    continue;
                }
                let line = matched.iter().map(|r| r.line).min().unwrap_or(0);
                let confidence = if rule.confidence >= 0.9 {
                    Confidence::High
                } else if rule.confidence >= 0.6 {
                    Confidence::Medium
                } else {
                    Confidence::Low
                };
                composites.push(
                    Finding::new(
                        format!("correlation_{}", rule.name),
                        file.to_string(),
                        line,
                        Severity::High,
                        "correlation",
                        rule.description.clone().unwrap_or_else(|| {
                            format!("Co-occurring facts matched rule '{}'", rule.name)
                        }),
                    )
                    .with_confidence(confidence)
                    .with_detail(
                        "matched_rules",
                        serde_json::Value::from(
                            matched.iter().map(|r| r.rule.clone()).collect::<Vec<_>>(),
                        ),
                    ),
                );
            }
        }
        composites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES_YAML: &str = r#"
rules:
  - name: sqli_with_missing_auth
    description: "Unauthenticated endpoint builds dynamic SQL"
    confidence: 0.9
    co_occurring_facts:
      - tool: auditor
        pattern: "MISSING_API_AUTHENTICATION"
      - tool: auditor
        pattern: "SQL_INJECTION.*"
"#;

    fn record(rule: &str, file: &str, line: u32) -> FactRecord {
        FactRecord {
            tool: "auditor".to_string(),
            rule: rule.to_string(),
            message: String::new(),
            file: file.to_string(),
            line,
        }
    }

    #[test]
    fn test_parse_rules_list() {
        let rules = CorrelationEngine::parse_yaml(RULES_YAML).expect("parse");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "sqli_with_missing_auth");
        assert_eq!(rules[0].facts.len(), 2);
        assert!(rules[0].facts[1].regex.is_some());
    }

    #[test]
    fn test_single_rule_format() {
        let rules = CorrelationEngine::parse_yaml(
            "name: solo\nco_occurring_facts:\n  - tool: eslint\n    pattern: no-eval\n",
        )
        .expect("parse");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].confidence, 0.8);
    }

    #[test]
    fn test_invalid_regex_falls_back_to_literal() {
        let rules = CorrelationEngine::parse_yaml(
            "name: lit\nco_occurring_facts:\n  - tool: auditor\n    pattern: \"((broken\"\n",
        )
        .expect("parse");
        assert!(rules[0].facts[0].regex.is_none());
        let record = FactRecord {
            tool: "auditor".to_string(),
            rule: "x ((broken y".to_string(),
            message: String::new(),
            file: "a.py".to_string(),
            line: 1,
        };
        assert!(rules[0].facts[0].matches(&record));
    }

    #[test]
    fn test_correlate_requires_all_facts_in_same_file() {
        let engine =
            CorrelationEngine::new(CorrelationEngine::parse_yaml(RULES_YAML).expect("parse"));

        let composites = engine.correlate(&[
            record("MISSING_API_AUTHENTICATION", "app/routes.py", 10),
            record("SQL_INJECTION_DYNAMIC_QUERY", "app/routes.py", 22),
            record("SQL_INJECTION_DYNAMIC_QUERY", "app/other.py", 5),
        ]);
        assert_eq!(composites.len(), 1);
        assert_eq!(composites[0].file, "app/routes.py");
        assert_eq!(composites[0].line, 10);
        assert_eq!(composites[0].rule_name, "correlation_sqli_with_missing_auth");
    }
}
