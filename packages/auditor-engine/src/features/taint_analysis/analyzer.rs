//! The taint analysis engine.
//!
//! Summary-based interprocedural analysis over the merged `call_graph` +
//! `data_flow` edges. Call-graph SCCs are processed bottom-up with a
//! fixed-point iteration cap; per-function summaries come from the cache
//! when fresh. Discovery and propagation run against the schema memory
//! cache; no database access happens inside the hot loops.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use rusqlite::{params, Connection};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use auditor_storage::{EdgeRow, GraphStore, NodeRow};

use crate::config::{AuditConfig, TaintBudgets};
use crate::errors::Result;
use crate::features::graph_builder::{expr_identifiers, node_id, resolve_callee};
use crate::shared::cancel::CancellationToken;
use crate::shared::models::{Confidence, Finding};

use super::domain::{FunctionSummary, TaintKind, TaintPath, TaintStep};
use super::memory_cache::SchemaCache;
use super::registry::TaintRegistry;
use super::summary_cache::{hash_entry_state, SummaryCache};
use super::type_resolver::TypeResolver;

/// Visited-node bound per source; keeps a pathological graph from eating
/// the wall-clock budget on one source.
const MAX_VISITED_PER_SOURCE: usize = 50_000;

/// ORM alias groups larger than this are ignored (too ambiguous).
const MAX_ALIAS_GROUP: usize = 8;

#[derive(Debug, Default)]
pub struct TaintReport {
    pub paths: Vec<TaintPath>,
    pub findings: Vec<Finding>,
    pub partial: bool,
    pub warnings: Vec<String>,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

struct SinkEntry {
    kind: TaintKind,
    callee: String,
    file: String,
    line: i64,
}

pub struct TaintAnalyzer<'a> {
    cache: &'a SchemaCache,
    registry: TaintRegistry,
    budgets: TaintBudgets,
}

impl<'a> TaintAnalyzer<'a> {
    pub fn new(cache: &'a SchemaCache, registry: TaintRegistry, budgets: TaintBudgets) -> Self {
        Self {
            cache,
            registry,
            budgets,
        }
    }

    pub fn run(
        &self,
        nodes: &[NodeRow],
        edges: &[EdgeRow],
        summary_cache: &SummaryCache,
        resolver: &TypeResolver,
        cancel: &CancellationToken,
    ) -> Result<TaintReport> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.budgets.wall_clock_secs);
        let mut report = TaintReport::default();

        // ORM aliasing: same model + same identifier across files, with a
        // controller file on at least one side. Built first so the
        // adjacency map can borrow from it.
        let alias_edges = self.alias_edges(nodes, resolver);

        // Node locations for step reconstruction.
        let mut node_info: FxHashMap<&str, (&str, i64)> = FxHashMap::default();
        for node in nodes {
            node_info.insert(node.id.as_str(), (node.file.as_str(), node.line));
        }

        // Forward adjacency over call + data-flow edges.
        let mut adjacency: FxHashMap<&str, Vec<(&str, &str)>> = FxHashMap::default();
        for edge in edges {
            if edge.edge_type.ends_with("_reverse") {
                continue;
            }
            adjacency
                .entry(edge.source_id.as_str())
                .or_default()
                .push((edge.target_id.as_str(), edge.edge_type.as_str()));
        }
        for (source, target) in &alias_edges {
            adjacency
                .entry(source.as_str())
                .or_default()
                .push((target.as_str(), "orm_alias"));
        }

        // Discovery.
        let sources = self.discover_sources();
        let (sinks, sanitized_nodes) = self.discover_sinks_and_sanitizers();
        debug!(
            sources = sources.len(),
            sinks = sinks.len(),
            "taint discovery"
        );

        // Per-function summaries, callees first.
        let summaries = self.compute_summaries(summary_cache, cancel, &mut report)?;

        // Propagation.
        for (source_node, source_label) in &sources {
            if cancel.is_cancelled() {
                report.partial = true;
                report.warnings.push("cancelled mid-propagation".to_string());
                break;
            }
            if Instant::now() > deadline {
                report.partial = true;
                report
                    .warnings
                    .push("wall-clock budget exceeded; partial results".to_string());
                warn!("taint wall-clock budget exceeded");
                break;
            }
            self.propagate(
                source_node,
                source_label,
                &adjacency,
                &node_info,
                &sinks,
                &sanitized_nodes,
                &summaries,
                &mut report,
            );
        }

        dedupe_shortest(&mut report.paths);
        report.findings = self.findings_for(&report.paths);

        let stats = summary_cache.stats()?;
        report.cache_hits = stats.hits;
        report.cache_misses = stats.misses;
        info!(
            paths = report.paths.len(),
            cache_hits = report.cache_hits,
            cache_misses = report.cache_misses,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "taint analysis complete"
        );
        Ok(report)
    }

    // ───────────────────────────────────────────────────────────────
    // Discovery
    // ───────────────────────────────────────────────────────────────

    fn discover_sources(&self) -> Vec<(String, String)> {
        let mut sources = Vec::new();
        for assignment in &self.cache.model.assignments {
            let Some(expr) = &assignment.source_expr else {
                continue;
            };
            if let Some(pattern) = self.registry.match_source(expr) {
                sources.push((
                    node_id(&assignment.file, &assignment.scope, &assignment.target_var),
                    pattern.description.clone(),
                ));
            }
        }
        sources
    }

    fn discover_sinks_and_sanitizers(
        &self,
    ) -> (
        FxHashMap<String, Vec<SinkEntry>>,
        FxHashMap<String, Vec<TaintKind>>,
    ) {
        let mut sinks: FxHashMap<String, Vec<SinkEntry>> = FxHashMap::default();
        let mut sanitized: FxHashMap<String, Vec<TaintKind>> = FxHashMap::default();

        // Call-argument sinks: the tainted position is each base
        // identifier in the argument expression.
        for call in &self.cache.model.call_args {
            let Some(sink) = self.registry.match_sink(&call.callee_function) else {
                continue;
            };
            let Some(expr) = &call.argument_expr else {
                continue;
            };
            for ident in expr_identifiers(expr) {
                sinks
                    .entry(node_id(&call.file, &call.caller_scope, &ident))
                    .or_default()
                    .push(SinkEntry {
                        kind: sink.kind,
                        callee: call.callee_function.clone(),
                        file: call.file.clone(),
                        line: call.line,
                    });
            }
        }

        for assignment in &self.cache.model.assignments {
            // Assignment sinks: `el.innerHTML = x`.
            if let Some(sink) = self.registry.match_assignment_sink(&assignment.target_var) {
                sinks
                    .entry(node_id(
                        &assignment.file,
                        &assignment.scope,
                        &assignment.target_var,
                    ))
                    .or_default()
                    .push(SinkEntry {
                        kind: sink.kind,
                        callee: assignment.target_var.clone(),
                        file: assignment.file.clone(),
                        line: assignment.line,
                    });
            }
            // Sanitized assignment targets: `clean = html.escape(q)`.
            if let Some(expr) = &assignment.source_expr {
                if let Some(sanitizer) = self.registry.match_sanitizer(expr) {
                    sanitized
                        .entry(node_id(
                            &assignment.file,
                            &assignment.scope,
                            &assignment.target_var,
                        ))
                        .or_default()
                        .extend(sanitizer.kinds.iter().copied());
                }
            }
        }

        (sinks, sanitized)
    }

    fn alias_edges(&self, nodes: &[NodeRow], resolver: &TypeResolver) -> Vec<(String, String)> {
        let mut groups: FxHashMap<(String, String), Vec<&NodeRow>> = FxHashMap::default();
        for node in nodes {
            let Some(model) = resolver.get_model_for_node(&node.id) else {
                continue;
            };
            let ident = node.id.rsplit("::").next().unwrap_or("").to_string();
            groups.entry((model, ident)).or_default().push(node);
        }

        let mut edges = Vec::new();
        for (_, group) in groups {
            if group.len() < 2 || group.len() > MAX_ALIAS_GROUP {
                continue;
            }
            for a in &group {
                for b in &group {
                    if a.id == b.id || a.file == b.file {
                        continue;
                    }
                    if resolver.is_controller_file(&a.file) || resolver.is_controller_file(&b.file)
                    {
                        edges.push((a.id.clone(), b.id.clone()));
                    }
                }
            }
        }
        edges
    }

    // ───────────────────────────────────────────────────────────────
    // Summaries
    // ───────────────────────────────────────────────────────────────

    fn compute_summaries(
        &self,
        summary_cache: &SummaryCache,
        cancel: &CancellationToken,
        report: &mut TaintReport,
    ) -> Result<DashMap<String, FunctionSummary>> {
        let summaries: DashMap<String, FunctionSummary> = DashMap::new();

        // Call graph over functions, caller -> callee.
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut indices: FxHashMap<String, petgraph::graph::NodeIndex> = FxHashMap::default();
        for function in &self.cache.model.functions {
            let key = format!("{}:{}", function.path, function.name);
            if !indices.contains_key(&key) {
                let index = graph.add_node(key.clone());
                indices.insert(key, index);
            }
        }
        for call in &self.cache.model.call_args {
            let Some(callee) = resolve_callee(&self.cache.model, call) else {
                continue;
            };
            let caller_key = format!("{}:{}", call.file, call.caller_scope);
            let callee_key = format!("{}:{}", callee.path, callee.name);
            if let (Some(&caller), Some(&callee)) =
                (indices.get(&caller_key), indices.get(&callee_key))
            {
                if caller != callee {
                    graph.update_edge(caller, callee, ());
                }
            }
        }

        // tarjan_scc returns SCCs in reverse topological order: with
        // caller->callee edges, callees come first (bottom-up). Members of
        // one SCC are summarized in parallel; iteration repeats until the
        // summaries stabilize or the cap trips.
        use rayon::prelude::*;
        let sccs = tarjan_scc(&graph);
        for scc in sccs {
            if cancel.is_cancelled() {
                report.partial = true;
                break;
            }
            let mut iterations = 0u32;
            loop {
                let outcomes: Result<Vec<(String, FunctionSummary, Vec<String>)>> = scc
                    .par_iter()
                    .filter_map(|&index| {
                        let key = graph[index].clone();
                        let (file, function) = key.split_once(':')?;
                        Some(
                            self.summarize_function(file, function, summary_cache, &summaries)
                                .map(|(summary, warnings)| (key.clone(), summary, warnings)),
                        )
                    })
                    .collect();

                let mut changed = false;
                for (key, summary, warnings) in outcomes? {
                    report.warnings.extend(warnings);
                    let previous = summaries.insert(key, summary.clone());
                    if previous.map(|p| summary_fingerprint(&p))
                        != Some(summary_fingerprint(&summary))
                    {
                        changed = true;
                    }
                }
                iterations += 1;
                if !changed {
                    break;
                }
                if iterations >= self.budgets.max_iterations {
                    report.warnings.push(format!(
                        "fixed-point iteration cap ({}) hit in call-graph cycle",
                        self.budgets.max_iterations
                    ));
                    warn!("summary fixed point did not stabilize; capped");
                    break;
                }
            }
        }
        Ok(summaries)
    }

    fn summarize_function(
        &self,
        file: &str,
        function: &str,
        summary_cache: &SummaryCache,
        summaries: &DashMap<String, FunctionSummary>,
    ) -> Result<(FunctionSummary, Vec<String>)> {
        let params = self.cache.params_of(file, function);
        let entry_hash = hash_entry_state(&params);
        let mtime = self.cache.mtime_of(file);
        let mut warnings = Vec::new();

        if let Some(cached) = summary_cache.get(file, function, &entry_hash, mtime)? {
            return Ok((cached, warnings));
        }

        let started = Instant::now();
        let function_budget = Duration::from_secs(self.budgets.per_function_secs);
        let function_id = format!("{}:{}", file, function);
        let mut summary = FunctionSummary::new(&function_id);

        // Per-variable taint state inside the function body.
        #[derive(Default, Clone)]
        struct VarState {
            origins: std::collections::BTreeSet<usize>,
            from_source: bool,
            sanitized: Vec<TaintKind>,
        }
        let mut states: FxHashMap<String, VarState> = FxHashMap::default();
        for (index, param) in params.iter().enumerate() {
            states.insert(
                param.to_string(),
                VarState {
                    origins: std::iter::once(index).collect(),
                    ..VarState::default()
                },
            );
        }

        // Assignments in this function, in line order. A missing CFG means
        // the function is treated as a single linear block, which is what
        // a line-ordered pass gives us; with a CFG present, early-exit
        // structure feeds `has_early_exit`.
        let assignment_indexes = self
            .cache
            .assignments_by_file
            .get(file)
            .cloned()
            .unwrap_or_default();
        let mut iterations = 0u32;
        loop {
            if started.elapsed() > function_budget {
                warnings.push(format!(
                    "per-function budget exceeded in {}; identity summary used",
                    function_id
                ));
                let identity = FunctionSummary::identity(&function_id, params.len());
                summary_cache.put(file, function, &entry_hash, mtime, &identity)?;
                return Ok((identity, warnings));
            }
            let mut changed = false;
            for &index in &assignment_indexes {
                let assignment = &self.cache.model.assignments[index];
                if assignment.scope != function {
                    continue;
                }
                let Some(expr) = &assignment.source_expr else {
                    continue;
                };

                let mut next = VarState::default();
                for source in &assignment.sources {
                    if let Some(state) = states.get(source) {
                        next.origins.extend(state.origins.iter().copied());
                        next.from_source |= state.from_source;
                        for kind in &state.sanitized {
                            if !next.sanitized.contains(kind) {
                                next.sanitized.push(*kind);
                            }
                        }
                    }
                }
                if self.registry.match_source(expr).is_some() {
                    next.from_source = true;
                }
                if let Some(sanitizer) = self.registry.match_sanitizer(expr) {
                    for kind in &sanitizer.kinds {
                        if !next.sanitized.contains(kind) {
                            next.sanitized.push(*kind);
                        }
                    }
                }
                // Apply callee summaries for calls feeding this assignment.
                for &call_index in self
                    .cache
                    .call_args_by_file
                    .get(file)
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
                {
                    let call = &self.cache.model.call_args[call_index];
                    if call.line != assignment.line || call.caller_scope != function {
                        continue;
                    }
                    if let Some(callee) = resolve_callee(&self.cache.model, call) {
                        let callee_key = format!("{}:{}", callee.path, callee.name);
                        if let Some(callee_summary) = summaries.get(&callee_key) {
                            if callee_summary.returns_source {
                                next.from_source = true;
                            }
                            for kind in &callee_summary.sanitizes {
                                if !next.sanitized.contains(kind) {
                                    next.sanitized.push(*kind);
                                }
                            }
                        }
                    }
                }

                let slot = states.entry(assignment.target_var.clone()).or_default();
                let fingerprint = (
                    slot.origins.len(),
                    slot.from_source,
                    slot.sanitized.len(),
                );
                slot.origins.extend(next.origins.iter().copied());
                slot.from_source |= next.from_source;
                for kind in next.sanitized {
                    if !slot.sanitized.contains(&kind) {
                        slot.sanitized.push(kind);
                    }
                }
                if fingerprint
                    != (
                        slot.origins.len(),
                        slot.from_source,
                        slot.sanitized.len(),
                    )
                {
                    changed = true;
                }
            }
            iterations += 1;
            if !changed || iterations >= self.budgets.max_iterations {
                break;
            }
        }

        // Merge return-path states.
        let returns: Vec<&str> = self
            .cache
            .model
            .return_sources
            .iter()
            .filter(|r| r.file == file && r.function_name == function)
            .map(|r| r.return_var.as_str())
            .collect();
        let mut sanitized_on_all: Option<Vec<TaintKind>> = None;
        for return_var in &returns {
            if let Some(state) = states.get(*return_var) {
                summary.tainted_params.extend(state.origins.iter().copied());
                summary.returns_source |= state.from_source;
                sanitized_on_all = Some(match sanitized_on_all {
                    None => state.sanitized.clone(),
                    Some(existing) => existing
                        .into_iter()
                        .filter(|k| state.sanitized.contains(k))
                        .collect(),
                });
            } else {
                sanitized_on_all = Some(Vec::new());
            }
        }
        summary.sanitizes = sanitized_on_all.unwrap_or_default();

        // Guard shape: a CFG whose branches raise before falling through.
        summary.has_early_exit = self
            .cache
            .cfg_edges_for(file, function)
            .is_some_and(|edges| edges.iter().any(|e| e.kind == "raise"));

        summary_cache.put(file, function, &entry_hash, mtime, &summary)?;
        Ok((summary, warnings))
    }

    // ───────────────────────────────────────────────────────────────
    // Propagation
    // ───────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn propagate(
        &self,
        source_node: &str,
        source_label: &str,
        adjacency: &FxHashMap<&str, Vec<(&str, &str)>>,
        node_info: &FxHashMap<&str, (&str, i64)>,
        sinks: &FxHashMap<String, Vec<SinkEntry>>,
        sanitized_nodes: &FxHashMap<String, Vec<TaintKind>>,
        summaries: &DashMap<String, FunctionSummary>,
        report: &mut TaintReport,
    ) {
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut parents: FxHashMap<&str, (&str, &str)> = FxHashMap::default();
        let mut queue: VecDeque<&str> = VecDeque::new();

        let Some((&source_key, _)) = node_info.get_key_value(source_node) else {
            // Malformed or unmaterialized node: skip, log, do not crash.
            debug!(node = source_node, "source node missing from graph");
            return;
        };
        queue.push_back(source_key);
        visited.insert(source_key);

        while let Some(current) = queue.pop_front() {
            if visited.len() > MAX_VISITED_PER_SOURCE {
                report
                    .warnings
                    .push(format!("visited-node cap hit from {}", source_node));
                break;
            }

            if let Some(entries) = sinks.get(current) {
                for entry in entries {
                    let steps = reconstruct_steps(source_key, current, &parents, node_info);
                    if self.path_is_sanitized(&steps, entry.kind, sanitized_nodes, summaries) {
                        continue;
                    }
                    report.paths.push(TaintPath {
                        source_node: source_key.to_string(),
                        sink_node: current.to_string(),
                        vulnerability: entry.kind,
                        sink_callee: entry.callee.clone(),
                        sink_file: entry.file.clone(),
                        sink_line: entry.line,
                        steps,
                    });
                }
            }

            let Some(neighbors) = adjacency.get(current) else {
                continue;
            };
            for &(target, edge_type) in neighbors {
                if visited.contains(target) {
                    continue;
                }
                // Return-flow pruning: if the function we are leaving has a
                // summary that neither propagates parameters nor reads a
                // source, taint cannot come back out of it.
                if edge_type == "return_flow" {
                    if let Some(function_key) = function_key_of_node(current) {
                        if let Some(summary) = summaries.get(&function_key) {
                            if summary.tainted_params.is_empty() && !summary.returns_source {
                                continue;
                            }
                        }
                    }
                }
                visited.insert(target);
                parents.insert(target, (current, edge_type));
                queue.push_back(target);
            }
        }

        let _ = source_label;
    }

    fn path_is_sanitized(
        &self,
        steps: &[TaintStep],
        kind: TaintKind,
        sanitized_nodes: &FxHashMap<String, Vec<TaintKind>>,
        summaries: &DashMap<String, FunctionSummary>,
    ) -> bool {
        for step in steps {
            if sanitized_nodes
                .get(&step.node_id)
                .is_some_and(|kinds| kinds.contains(&kind))
            {
                return true;
            }
        }
        // A return-flow hop out of a function that sanitizes this kind on
        // all return paths is safe.
        for window in steps.windows(2) {
            if window[1].edge_kind == "return_flow" {
                if let Some(function_key) = function_key_of_node(&window[0].node_id) {
                    if let Some(summary) = summaries.get(&function_key) {
                        if summary.sanitizes_kind(kind) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn findings_for(&self, paths: &[TaintPath]) -> Vec<Finding> {
        paths
            .iter()
            .map(|path| {
                let kind = path.vulnerability;
                Finding::new(
                    format!("taint_{}", kind.as_str()),
                    path.sink_file.clone(),
                    path.sink_line as u32,
                    kind.severity(),
                    kind.category(),
                    format!(
                        "Tainted data reaches {}: {} -> {}",
                        path.sink_callee, path.source_node, path.sink_node
                    ),
                )
                .with_confidence(Confidence::High)
                .with_cwe(kind.cwe())
                .with_detail("source", serde_json::Value::from(path.source_node.clone()))
                .with_detail("sink", serde_json::Value::from(path.sink_node.clone()))
                .with_detail("path_length", serde_json::Value::from(path.steps.len() as u64))
            })
            .collect()
    }
}

/// `file::scope::var` -> `file:scope` (the owning function key).
fn function_key_of_node(node_id: &str) -> Option<String> {
    let mut parts = node_id.split("::");
    let file = parts.next()?;
    let scope = parts.next()?;
    if scope == "module" {
        return None;
    }
    Some(format!("{}:{}", file, scope))
}

fn reconstruct_steps(
    source: &str,
    sink: &str,
    parents: &FxHashMap<&str, (&str, &str)>,
    node_info: &FxHashMap<&str, (&str, i64)>,
) -> Vec<TaintStep> {
    let mut reversed = Vec::new();
    let mut current = sink;
    let mut edge_kind = "sink";
    loop {
        let (file, line) = node_info.get(current).copied().unwrap_or(("", 0));
        reversed.push(TaintStep {
            node_id: current.to_string(),
            file: file.to_string(),
            line,
            edge_kind: edge_kind.to_string(),
        });
        if current == source {
            break;
        }
        match parents.get(current) {
            Some(&(parent, kind)) => {
                edge_kind = kind;
                current = parent;
            }
            None => break,
        }
    }
    reversed.reverse();
    // During the walk each step was labeled with the edge kind into its
    // successor; shift by one so step N carries the edge taken from N-1
    // to N, with `source` on the first step.
    let kinds: Vec<String> = reversed.iter().map(|s| s.edge_kind.clone()).collect();
    for (index, step) in reversed.iter_mut().enumerate() {
        step.edge_kind = if index == 0 {
            "source".to_string()
        } else {
            kinds[index - 1].clone()
        };
    }
    reversed
}

/// De-duplicate by source/sink pair, keeping the shortest path.
fn dedupe_shortest(paths: &mut Vec<TaintPath>) {
    use std::collections::HashMap;
    let mut best: HashMap<(String, String, TaintKind), TaintPath> = HashMap::new();
    for path in paths.drain(..) {
        let key = (
            path.source_node.clone(),
            path.sink_node.clone(),
            path.vulnerability,
        );
        match best.get(&key) {
            Some(existing) if existing.steps.len() <= path.steps.len() => {}
            _ => {
                best.insert(key, path);
            }
        }
    }
    let mut result: Vec<TaintPath> = best.into_values().collect();
    result.sort_by(|a, b| {
        (&a.source_node, &a.sink_node, a.vulnerability.as_str()).cmp(&(
            &b.source_node,
            &b.sink_node,
            b.vulnerability.as_str(),
        ))
    });
    *paths = result;
}

// ───────────────────────────────────────────────────────────────────
// Entry point
// ───────────────────────────────────────────────────────────────────

/// Run the analyzer against the persisted databases and write the
/// discovered paths back into `taint_paths`/`taint_path_steps`.
pub fn analyze_taint(config: &AuditConfig, cancel: &CancellationToken) -> Result<TaintReport> {
    let pf = config.pf();
    let conn = Connection::open(pf.repo_index_db())?;
    let cache = SchemaCache::load(&conn)?;

    let store = GraphStore::open(pf.graphs_db())?;
    let nodes = store.load_nodes()?;
    let edges = store.load_edges(None)?;

    let mut node_metadata = FxHashMap::default();
    for node in &nodes {
        if let Some(metadata) = &node.metadata {
            node_metadata.insert(node.id.clone(), metadata.clone());
        }
    }
    let resolver = TypeResolver::new(node_metadata, cache.controller_files.clone());

    let summary_cache = SummaryCache::open(pf.summary_cache_db())?;

    let analyzer = TaintAnalyzer::new(&cache, TaintRegistry::default(), config.taint.clone());
    let report = analyzer.run(&nodes, &edges, &summary_cache, &resolver, cancel)?;

    persist_paths(&conn, &report.paths)?;
    Ok(report)
}

/// Persist paths and their ordered steps (single-threaded, post-barrier).
pub fn persist_paths(conn: &Connection, paths: &[TaintPath]) -> Result<()> {
    conn.execute("DELETE FROM taint_path_steps", [])?;
    conn.execute("DELETE FROM taint_paths", [])?;
    for path in paths {
        conn.execute(
            "INSERT INTO taint_paths (source_node, sink_node, vulnerability, severity, path_length)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                path.source_node,
                path.sink_node,
                path.vulnerability.as_str(),
                path.vulnerability.severity().as_str(),
                path.steps.len() as i64,
            ],
        )?;
        let path_id = conn.last_insert_rowid();
        for (index, step) in path.steps.iter().enumerate() {
            conn.execute(
                "INSERT INTO taint_path_steps (path_id, step_index, node_id, file, line, edge_kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    path_id,
                    index as i64,
                    step.node_id,
                    step.file,
                    step.line,
                    step.edge_kind,
                ],
            )?;
        }
    }
    Ok(())
}

fn summary_fingerprint(summary: &FunctionSummary) -> (usize, bool, usize, bool) {
    (
        summary.tainted_params.len(),
        summary.returns_source,
        summary.sanitizes.len(),
        summary.has_early_exit,
    )
}
