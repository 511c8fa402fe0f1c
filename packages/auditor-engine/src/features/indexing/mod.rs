//! Indexing orchestrator: repository walk, parallel extraction, fidelity
//! handshake, single-writer persistence.

mod orchestrator;
mod walker;

pub use orchestrator::{index_repository, IndexStats};
pub use walker::{walk_repository, WalkedFile};
