//! Pipeline orchestration.
//!
//! Strict stage barriers: extraction fully drains before the graph
//! builds; the graph is complete and verified before detectors and the
//! taint analyzer run. Fatal errors abort with exit 2; everything else is
//! recorded and the run continues.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::AuditConfig;
use crate::errors::Result;
use crate::features::graph_builder::{build_graph, GraphStats};
use crate::features::indexing::{index_repository, IndexStats};
use crate::features::rule_engine::{
    persist_findings, CorrelationEngine, FactRecord, RuleEngine, RuleRunResult,
};
use crate::features::taint_analysis::{analyze_taint, TaintReport};
use crate::shared::models::{Finding, Severity};

pub use crate::shared::cancel::CancellationToken;

/// Process exit semantics: 0 success, 1 warnings present, 2 fatal
/// corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Warnings,
    Fatal,
}

impl ExitCode {
    pub fn code(&self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Warnings => 1,
            ExitCode::Fatal => 2,
        }
    }
}

/// End-of-run report.
#[derive(Debug)]
pub struct RunSummary {
    pub findings: Vec<Finding>,
    pub severity_counts: BTreeMap<String, usize>,
    pub warnings: Vec<String>,
    pub exit: ExitCode,
    pub summary_line: String,
}

pub struct Pipeline {
    config: AuditConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stage 1: run extractors and the storage writer.
    pub fn index(&self) -> Result<IndexStats> {
        let (stats, writer) = index_repository(&self.config, &self.cancel)?;
        drop(writer);
        Ok(stats)
    }

    /// Stage 2: build `graphs.db` from the index.
    pub fn build_graph(&self) -> Result<GraphStats> {
        let pf = self.config.pf();
        build_graph(&pf.repo_index_db(), &pf.graphs_db())
    }

    /// Stage 3: run the rule engine plus the correlation pass.
    pub fn detect_patterns(&self) -> Result<(RuleRunResult, Vec<Finding>)> {
        let pf = self.config.pf();
        let conn = Connection::open(pf.repo_index_db())?;
        let engine = RuleEngine::new();
        let result = engine.run(&conn, &self.config)?;

        let composites = match &self.config.correlation_rules_dir {
            Some(dir) => {
                let correlator = CorrelationEngine::load_dir(dir)?;
                let records: Vec<FactRecord> =
                    result.findings.iter().map(FactRecord::from_finding).collect();
                correlator.correlate(&records)
            }
            None => Vec::new(),
        };
        Ok((result, composites))
    }

    /// Stage 4: taint analysis.
    pub fn taint_analyze(&self) -> Result<TaintReport> {
        analyze_taint(&self.config, &self.cancel)
    }

    /// index -> build-graph -> detect-patterns -> taint-analyze -> report.
    pub fn full(&self) -> Result<RunSummary> {
        let index_stats = self.index()?;
        let graph_stats = self.build_graph()?;
        info!(
            files = index_stats.files_indexed,
            nodes = graph_stats.nodes,
            "barriers passed"
        );

        let (rule_result, composites) = self.detect_patterns()?;
        let taint_report = self.taint_analyze()?;

        let mut findings = rule_result.findings;
        findings.extend(composites);
        findings.extend(taint_report.findings.clone());
        findings.sort_by(|a, b| {
            (&a.file, a.line, &a.rule_name).cmp(&(&b.file, b.line, &b.rule_name))
        });

        let mut warnings: Vec<String> = Vec::new();
        if index_stats.fidelity_warnings > 0 {
            warnings.push(format!(
                "{} fidelity deltas during indexing",
                index_stats.fidelity_warnings
            ));
        }
        if index_stats.files_failed > 0 {
            warnings.push(format!(
                "{} files failed extraction (see extraction_errors)",
                index_stats.files_failed
            ));
        }
        for (rule, error) in &rule_result.rule_errors {
            warnings.push(format!("rule {} failed: {}", rule, error));
        }
        warnings.extend(taint_report.warnings.clone());
        if taint_report.partial {
            warnings.push("taint analysis returned partial results".to_string());
        }

        self.persist_outputs(&findings)?;
        self.snapshot_history("full")?;

        let severity_counts = count_by_severity(&findings);
        let exit = if !warnings.is_empty() || !findings.is_empty() {
            ExitCode::Warnings
        } else {
            ExitCode::Success
        };
        let summary_line = summary_line(&severity_counts, &warnings, &self.config);
        info!("{}", summary_line);

        Ok(RunSummary {
            findings,
            severity_counts,
            warnings,
            exit,
            summary_line,
        })
    }

    /// Mirror findings into `findings_consolidated` and
    /// `raw/findings.json`.
    fn persist_outputs(&self, findings: &[Finding]) -> Result<()> {
        let pf = self.config.pf();
        let conn = Connection::open(pf.repo_index_db())?;
        persist_findings(&conn, findings)?;

        let json = serde_json::to_string_pretty(findings)?;
        std::fs::write(pf.findings_json(), json)?;
        Ok(())
    }

    /// Immutable snapshot of the run's artifacts under
    /// `.pf/history/<run-type>/<timestamp>/`. Old databases are never
    /// mutated; each analysis regenerates from scratch.
    fn snapshot_history(&self, run_type: &str) -> Result<()> {
        let pf = self.config.pf();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = pf.history_dir(run_type, &timestamp);
        std::fs::create_dir_all(&dir)?;
        for artifact in [
            pf.repo_index_db(),
            pf.graphs_db(),
            pf.findings_json(),
        ] {
            if artifact.exists() {
                if let Some(name) = artifact.file_name() {
                    if let Err(err) = std::fs::copy(&artifact, dir.join(name)) {
                        warn!(artifact = %artifact.display(), error = %err, "snapshot copy failed");
                    }
                }
            }
        }
        Ok(())
    }
}

fn count_by_severity(findings: &[Finding]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for severity in [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ] {
        counts.insert(severity.as_str().to_string(), 0);
    }
    for finding in findings {
        *counts
            .entry(finding.severity.as_str().to_string())
            .or_insert(0) += 1;
    }
    counts
}

fn summary_line(
    counts: &BTreeMap<String, usize>,
    warnings: &[String],
    config: &AuditConfig,
) -> String {
    let total: usize = counts.values().sum();
    format!(
        "audit complete: {} findings (critical={} high={} medium={} low={} info={}); {} warnings; error tables at {}",
        total,
        counts.get("critical").copied().unwrap_or(0),
        counts.get("high").copied().unwrap_or(0),
        counts.get("medium").copied().unwrap_or(0),
        counts.get("low").copied().unwrap_or(0),
        counts.get("info").copied().unwrap_or(0),
        warnings.len(),
        config.pf().repo_index_db().display(),
    )
}
