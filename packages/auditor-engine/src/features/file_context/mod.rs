//! Per-file AST cache.
//!
//! One pre-order traversal converts the tree-sitter tree into an arena of
//! `SyntaxNode`s and buckets node ids by kind into the `NodeIndex`.
//! Downstream extractors never re-walk the AST: they query the index. This
//! replaces N×M walks with one walk plus lookups and is the central
//! performance contract of the extractor framework.

mod context;
mod syntax;

pub use context::{FileContext, FunctionRange, ImportBinding, NodeIndex, ResolvedSymbol};
pub use syntax::{NodeId, NodeKind, SyntaxNode};
