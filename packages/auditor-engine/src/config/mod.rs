//! Run configuration.
//!
//! `AuditConfig` is deserialized from YAML (every field optional, falling
//! back to defaults) and passed explicitly through the pipeline; there are
//! no process-wide singletons in the core. Environment variables recognized
//! elsewhere: `THEAUDITOR_LOG_FILE` (binary log sink),
//! `THEAUDITOR_CACHE_DEBUG` (summary-cache tracing), `AUDITOR_TEST_NODE`
//! (Node sandbox tests).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{AuditError, Result};

/// Default worker-pool bound: `min(#cores, 8)`.
pub fn default_workers() -> usize {
    num_cpus::get().min(8)
}

/// Taint analyzer budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaintBudgets {
    /// Per-analysis wall-clock budget in seconds.
    pub wall_clock_secs: u64,
    /// Per-function CPU budget in seconds.
    pub per_function_secs: u64,
    /// Hard cap on fixed-point iterations within one SCC.
    pub max_iterations: u32,
}

impl Default for TaintBudgets {
    fn default() -> Self {
        Self {
            wall_clock_secs: 120,
            per_function_secs: 2,
            max_iterations: 32,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Repository root under analysis.
    pub root: PathBuf,
    /// Worker-pool size; 0 means auto (`min(#cores, 8)`).
    pub workers: usize,
    /// Strict fidelity: a 100%-loss reconciliation aborts the run.
    pub strict_fidelity: bool,
    /// Path substrings excluded from the walk.
    pub exclude_patterns: Vec<String>,
    /// Disable dependency CVE fetching (no network use in the core either
    /// way; the flag is forwarded to external collaborators).
    pub offline: bool,
    /// Skip `_`-prefixed names in the global-mutable-state rule.
    pub exclude_underscore_prefixed: bool,
    /// Pre-built CommonJS extractor bundle; when set, JS/TS extraction goes
    /// through the `node` subprocess instead of the in-process parser.
    pub js_bundle: Option<PathBuf>,
    /// Directory of correlation rule YAML files.
    pub correlation_rules_dir: Option<PathBuf>,
    pub taint: TaintBudgets,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            workers: 0,
            strict_fidelity: true,
            exclude_patterns: vec![
                "node_modules/".to_string(),
                ".git/".to_string(),
                ".pf/".to_string(),
                "__pycache__/".to_string(),
                "dist/".to_string(),
                "build/".to_string(),
                ".venv/".to_string(),
            ],
            offline: false,
            exclude_underscore_prefixed: true,
            js_bundle: None,
            correlation_rules_dir: None,
            taint: TaintBudgets::default(),
        }
    }
}

impl AuditConfig {
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| AuditError::config(format!("invalid YAML: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            default_workers()
        } else {
            self.workers
        }
    }

    pub fn pf(&self) -> PfPaths {
        PfPaths::new(&self.root)
    }
}

/// The `.pf/` persisted-state layout.
#[derive(Debug, Clone)]
pub struct PfPaths {
    pub pf_dir: PathBuf,
}

impl PfPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            pf_dir: root.join(".pf"),
        }
    }

    pub fn repo_index_db(&self) -> PathBuf {
        self.pf_dir.join("repo_index.db")
    }

    pub fn graphs_db(&self) -> PathBuf {
        self.pf_dir.join("graphs.db")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.pf_dir.join(".cache")
    }

    pub fn summary_cache_db(&self) -> PathBuf {
        self.cache_dir().join("cfg_analysis_cache.db")
    }

    pub fn findings_json(&self) -> PathBuf {
        self.pf_dir.join("raw").join("findings.json")
    }

    pub fn readthis_dir(&self) -> PathBuf {
        self.pf_dir.join("readthis")
    }

    pub fn history_dir(&self, run_type: &str, timestamp: &str) -> PathBuf {
        self.pf_dir.join("history").join(run_type).join(timestamp)
    }

    /// Create the directories a run writes into.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.pf_dir)?;
        std::fs::create_dir_all(self.cache_dir())?;
        std::fs::create_dir_all(self.pf_dir.join("raw"))?;
        std::fs::create_dir_all(self.readthis_dir())?;
        Ok(())
    }
}
