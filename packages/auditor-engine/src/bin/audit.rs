//! Thin driver binary for the audit pipeline.
//!
//! The product CLI lives elsewhere; this binary defines the exit-code
//! semantics and drives the stages for local runs and fixtures.

use std::path::PathBuf;
use std::process::ExitCode as ProcessExit;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use auditor_engine::{AuditConfig, Pipeline};

#[derive(Parser)]
#[command(name = "audit", about = "Static analysis and security audit core")]
struct Cli {
    /// Repository root to analyze.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Optional YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run extractors and the storage writer; build repo_index.db.
    Index,
    /// Build graphs.db from the index.
    BuildGraph,
    /// Run the taint analyzer.
    TaintAnalyze,
    /// Run the rule engine.
    DetectPatterns,
    /// index -> build-graph -> detect-patterns -> taint-analyze -> report.
    Full {
        /// Disable dependency CVE fetching (forwarded to collaborators).
        #[arg(long)]
        offline: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match std::env::var("THEAUDITOR_LOG_FILE") {
        Ok(path) => {
            match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(file)
                        .with_ansi(false)
                        .init();
                }
                Err(err) => {
                    eprintln!("cannot open THEAUDITOR_LOG_FILE {}: {}", path, err);
                    tracing_subscriber::fmt().with_env_filter(filter).init();
                }
            }
        }
        Err(_) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn main() -> ProcessExit {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match AuditConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("configuration error: {}", err);
                return ProcessExit::from(2);
            }
        },
        None => AuditConfig::default(),
    };
    config.root = cli.root.clone();

    let pipeline = Pipeline::new(config);
    let outcome: Result<i32, auditor_engine::AuditError> = match cli.command {
        Command::Index => pipeline.index().map(|stats| {
            println!(
                "indexed {} files ({} failed, {} rows)",
                stats.files_indexed, stats.files_failed, stats.rows_written
            );
            i32::from(stats.files_failed > 0 || stats.fidelity_warnings > 0)
        }),
        Command::BuildGraph => pipeline.build_graph().map(|stats| {
            println!(
                "graph: {} nodes, {} edges (data_flow {}/{}, ratio {:.3})",
                stats.nodes,
                stats.edges,
                stats.data_flow_forward,
                stats.data_flow_reverse,
                stats.ratio
            );
            0
        }),
        Command::TaintAnalyze => pipeline.taint_analyze().map(|report| {
            println!(
                "taint: {} paths ({} cache hits, {} misses)",
                report.paths.len(),
                report.cache_hits,
                report.cache_misses
            );
            i32::from(report.partial || !report.paths.is_empty())
        }),
        Command::DetectPatterns => pipeline.detect_patterns().map(|(result, composites)| {
            println!(
                "rules: {} findings, {} composites, {} rule errors",
                result.findings.len(),
                composites.len(),
                result.rule_errors.len()
            );
            i32::from(!result.findings.is_empty() || !result.rule_errors.is_empty())
        }),
        Command::Full { offline } => {
            let mut config = pipeline.config().clone();
            config.offline = offline;
            let pipeline = Pipeline::new(config);
            pipeline.full().map(|summary| {
                println!("{}", summary.summary_line);
                summary.exit.code()
            })
        }
    };

    match outcome {
        Ok(code) => ProcessExit::from(code as u8),
        Err(err) => {
            eprintln!("fatal: {}", err);
            ProcessExit::from(2)
        }
    }
}
