//! Feature modules (pipeline order)

pub mod file_context;

pub mod extraction;

pub mod indexing;

pub mod graph_builder;

pub mod taint_analysis;

pub mod rule_engine;
