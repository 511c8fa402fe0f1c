//! Database-backed rule engine.
//!
//! Rules are declarative units registered explicitly (no reflection):
//! metadata plus an `analyze` function. Database rules issue SQL built
//! through the schema registry; file rules receive a `FileContext`. A
//! failing rule is caught at the engine boundary and leaves the other
//! rules running.

mod context;
mod correlation;
mod domain;
mod engine;
pub mod rules;

pub use context::{FileScope, RuleContext};
pub use correlation::{CorrelationEngine, CorrelationRule, FactRecord};
pub use domain::{ExecutionScope, Rule, RuleMetadata};
pub use engine::{build_rule_registry, persist_findings, RuleEngine, RuleRunResult};
