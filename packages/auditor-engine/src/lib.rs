/*
 * auditor-engine - Polyglot static analysis and security auditing core
 *
 * Feature-first layout:
 * - shared/      : Common models (Span, Finding, Language) and path utils
 * - features/    : Vertical slices (file_context -> extraction -> indexing
 *                  -> graph_builder -> taint_analysis -> rule_engine)
 * - pipeline/    : Stage orchestration, .pf layout, exit codes
 * - config/      : Run configuration (YAML + env)
 *
 * The pipeline is stage-barriered: extraction fully drains into
 * repo_index.db before the graph builds; graphs.db is complete before the
 * taint analyzer and rule engine run.
 */

#![allow(dead_code)] // Registry tables and summaries carry fields for rule consumers

/// Shared models and utilities
pub mod shared;

/// Feature modules
pub mod features;

/// Pipeline orchestration
pub mod pipeline;

/// Configuration system
pub mod config;

/// Error types
pub mod errors;

pub use config::{AuditConfig, PfPaths};
pub use errors::{AuditError, Result};
pub use pipeline::{CancellationToken, ExitCode, Pipeline, RunSummary};
pub use shared::models::{Confidence, Finding, Language, Severity, Span};
