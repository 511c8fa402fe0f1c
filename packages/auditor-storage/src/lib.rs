//! auditor-storage - Relational storage layer for the audit engine
//!
//! Owns the two durable artifacts of an analysis run:
//!
//! - `repo_index.db` - the indexed code model (~30 tables, schema-driven)
//! - `graphs.db` - the typed code graph (nodes + edges)
//!
//! ## Core Principles
//!
//! 1. **Schema registry is the single source of truth**: every table, column,
//!    index and foreign key is declared once; DDL and queries are generated
//!    from it, and the writer refuses to touch a database that drifted.
//! 2. **Fidelity handshake**: extraction hands the writer a manifest of row
//!    counts; the writer answers with a receipt of what was persisted.
//!    `reconcile_fidelity` turns any silent loss into a loud failure.
//! 3. **One writer, many readers**: a single thread owns the write lock;
//!    workers enqueue record batches over a bounded channel.

pub mod error;
pub mod fidelity;
pub mod graph_store;
pub mod record;
pub mod schema;
pub mod service;
pub mod writer;

pub use error::{ErrorKind, Result, StorageError};
pub use fidelity::{reconcile_fidelity, FidelityReport, FidelityStatus, Manifest, Receipt};
pub use graph_store::{EdgeRow, GraphStore, NodeRow};
pub use record::{Record, RecordBatches};
pub use schema::{registry, SchemaRegistry, TableDef};
pub use service::{WriterHandle, WriterService};
pub use writer::IndexWriter;
