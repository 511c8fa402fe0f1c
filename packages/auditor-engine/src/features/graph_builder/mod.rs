//! Graph builder: reads `repo_index.db`, produces `graphs.db`.
//!
//! Single-threaded, after indexing fully drains. Every `data_flow` edge
//! gets a `_reverse` mirror in the same pass; the build refuses to
//! complete when the bidirectionality invariant is violated.

mod builder;
mod domain;
mod path_resolver;
mod strategies;

pub use builder::{build_graph, GraphStats};
pub use domain::{node_id, GraphEdge, GraphNode, GraphType, IndexModel, MODULE_IDENT};
pub use path_resolver::{path_matches, resolve_import};

pub(crate) use builder::load_model;
pub(crate) use strategies::{expr_identifiers, resolve_callee};
