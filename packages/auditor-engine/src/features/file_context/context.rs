//! `FileContext` construction: one tree-sitter parse, one walk.

use rustc_hash::FxHashMap;
use tree_sitter::{Node, Parser};

use crate::errors::{AuditError, Result};
use crate::shared::models::{Language, Span};

use super::syntax::{NodeId, NodeKind, SyntaxNode};

/// O(1) lookup of node ids by kind, built during the single arena walk.
#[derive(Debug, Default)]
pub struct NodeIndex {
    buckets: FxHashMap<NodeKind, Vec<NodeId>>,
}

impl NodeIndex {
    fn insert(&mut self, kind: &NodeKind, id: NodeId) {
        self.buckets.entry(kind.clone()).or_default().push(id);
    }

    /// All nodes of `kind`, in document order.
    pub fn of_kind(&self, kind: &NodeKind) -> &[NodeId] {
        self.buckets.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, kind: &NodeKind) -> usize {
        self.of_kind(kind).len()
    }
}

/// One function's extent, used for scope attribution and CFG anchoring.
#[derive(Debug, Clone)]
pub struct FunctionRange {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Enclosing class or function name, `module` at the top level.
    pub scope: String,
    pub node: NodeId,
}

/// A name bound by an import statement.
#[derive(Debug, Clone)]
pub struct ImportBinding {
    pub local: String,
    pub module: String,
    pub line: u32,
}

/// Result of `resolve_symbol`.
#[derive(Debug, Clone)]
pub struct ResolvedSymbol {
    pub name: String,
    pub kind: String,
    pub line: u32,
    /// Set when the symbol resolves to an import.
    pub module: Option<String>,
}

/// Per-file single-walk AST cache. Owned exclusively by the worker
/// processing the file; never shared across threads.
#[derive(Debug)]
pub struct FileContext {
    pub path: String,
    pub language: Language,
    pub content: String,
    arena: Vec<SyntaxNode>,
    index: NodeIndex,
    pub function_ranges: Vec<FunctionRange>,
    imports: Vec<ImportBinding>,
    definitions: Vec<ResolvedSymbol>,
}

impl FileContext {
    /// Parse `content` and build the arena + index in one pre-order walk.
    ///
    /// A tree with parse errors is a hard fail for the file; the caller
    /// records it in `extraction_errors` and continues the run.
    pub fn parse(path: &str, language: Language, content: &str) -> Result<Self> {
        let mut parser = Parser::new();
        let grammar = match language {
            Language::Python => tree_sitter_python::language(),
            Language::TypeScript => tree_sitter_typescript::language_typescript(),
            Language::JavaScript => tree_sitter_typescript::language_tsx(),
        };
        parser
            .set_language(&grammar)
            .map_err(|e| AuditError::parse(path, format!("failed to set language: {}", e)))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| AuditError::parse(path, "parser returned no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            let position = first_error_position(&root)
                .map(|(line, col)| format!("line {}, col {}", line, col))
                .unwrap_or_else(|| "unknown position".to_string());
            return Err(AuditError::parse(path, format!("syntax error at {}", position)));
        }

        let mut ctx = Self {
            path: path.to_string(),
            language,
            content: content.to_string(),
            arena: Vec::with_capacity(256),
            index: NodeIndex::default(),
            function_ranges: Vec::new(),
            imports: Vec::new(),
            definitions: Vec::new(),
        };
        ctx.convert(&root, None, None);
        ctx.collect_function_ranges();
        ctx.collect_imports();
        Ok(ctx)
    }

    fn convert(&mut self, node: &Node, parent: Option<NodeId>, field: Option<&'static str>) -> NodeId {
        let raw = node.kind();
        let kind = match self.language {
            Language::Python => {
                let is_fstring = raw == "string" && self.python_string_is_fstring(node);
                NodeKind::from_python(raw, is_fstring)
            }
            Language::TypeScript | Language::JavaScript => NodeKind::from_typescript(raw),
        };

        let id = self.arena.len() as NodeId;
        self.arena.push(SyntaxNode {
            kind: kind.clone(),
            raw,
            field,
            span: Span::new(
                node.start_position().row as u32 + 1,
                node.start_position().column as u32,
                node.end_position().row as u32 + 1,
                node.end_position().column as u32,
            ),
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            parent,
            children: Vec::new(),
            is_named: node.is_named(),
        });
        self.index.insert(&kind, id);

        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else { continue };
            if child.is_extra() {
                continue;
            }
            let child_field = node.field_name_for_child(i as u32);
            let child_id = self.convert(&child, Some(id), child_field);
            self.arena[id as usize].children.push(child_id);
        }
        id
    }

    fn python_string_is_fstring(&self, node: &Node) -> bool {
        let start = node.start_byte();
        let end = node.end_byte().min(start + 3);
        self.content
            .get(start..end)
            .map(|prefix| {
                prefix
                    .chars()
                    .take_while(|c| *c != '"' && *c != '\'')
                    .any(|c| c == 'f' || c == 'F')
            })
            .unwrap_or(false)
    }

    // ───────────────────────────────────────────────────────────────
    // Arena access
    // ───────────────────────────────────────────────────────────────

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.arena[id as usize]
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn text(&self, id: NodeId) -> &str {
        let node = self.node(id);
        self.content.get(node.byte_start..node.byte_end).unwrap_or("")
    }

    pub fn line_of(&self, id: NodeId) -> u32 {
        self.node(id).span.start_line
    }

    /// O(1) lookup against the pre-built index.
    pub fn find_nodes(&self, kind: &NodeKind) -> &[NodeId] {
        self.index.of_kind(kind)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn child_by_field(&self, id: NodeId, field: &str) -> Option<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).field == Some(field))
    }

    pub fn first_child_of_kind(&self, id: NodeId, kind: &NodeKind) -> Option<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .find(|&c| &self.node(c).kind == kind)
    }

    pub fn children_of_kind(&self, id: NodeId, kind: &NodeKind) -> Vec<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(|&c| &self.node(c).kind == kind)
            .collect()
    }

    /// Pre-order subtree ids, including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for &child in self.node(current).children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    pub fn descendants_of_kind(&self, id: NodeId, kind: &NodeKind) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| &self.node(n).kind == kind)
            .collect()
    }

    /// Nearest ancestor of `kind`, excluding the node itself.
    pub fn ancestor_of_kind(&self, id: NodeId, kind: &NodeKind) -> Option<NodeId> {
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            if &self.node(p).kind == kind {
                return Some(p);
            }
            current = self.node(p).parent;
        }
        None
    }

    /// Leaf identifier names in a subtree, document order, deduplicated.
    /// Attribute/property names are skipped: in `db.execute(query)` this
    /// yields `db` and `query`.
    pub fn identifier_names(&self, id: NodeId) -> Vec<String> {
        let mut seen = Vec::new();
        for node_id in self.descendants(id) {
            let node = self.node(node_id);
            if node.kind != NodeKind::Identifier {
                continue;
            }
            if matches!(
                node.field,
                Some("attribute") | Some("property") | Some("function")
            ) {
                continue;
            }
            let name = self.text(node_id).to_string();
            if !name.is_empty() && !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Callee text of a call node (`function` field in both grammars).
    pub fn callee_text(&self, call_id: NodeId) -> Option<&str> {
        self.child_by_field(call_id, "function").map(|f| self.text(f))
    }

    // ───────────────────────────────────────────────────────────────
    // Scope model
    // ───────────────────────────────────────────────────────────────

    fn collect_function_ranges(&mut self) {
        let mut ranges = Vec::new();
        let mut definitions = Vec::new();

        for &id in self.index.of_kind(&NodeKind::FunctionDef) {
            let Some(name) = self.function_name(id) else {
                continue;
            };
            let node = self.node(id);
            let scope = self.scope_name_for(id);
            ranges.push(FunctionRange {
                name: name.clone(),
                start_line: node.span.start_line,
                end_line: node.span.end_line,
                scope,
                node: id,
            });
            definitions.push(ResolvedSymbol {
                name,
                kind: "function".to_string(),
                line: node.span.start_line,
                module: None,
            });
        }
        for &id in self.index.of_kind(&NodeKind::ClassDef) {
            if let Some(name_id) = self.child_by_field(id, "name") {
                definitions.push(ResolvedSymbol {
                    name: self.text(name_id).to_string(),
                    kind: "class".to_string(),
                    line: self.line_of(id),
                    module: None,
                });
            }
        }

        ranges.sort_by_key(|r| (r.start_line, r.end_line));
        self.function_ranges = ranges;
        self.definitions = definitions;
    }

    /// Function name, looking through declarators for anonymous functions
    /// (`const handler = async (req, res) => ...`).
    pub fn function_name(&self, id: NodeId) -> Option<String> {
        if let Some(name_id) = self.child_by_field(id, "name") {
            return Some(self.text(name_id).to_string());
        }
        let parent = self.node(id).parent?;
        let parent_node = self.node(parent);
        match parent_node.kind {
            NodeKind::VariableDeclarator => self
                .child_by_field(parent, "name")
                .map(|n| self.text(n).to_string()),
            NodeKind::Assignment => self
                .child_by_field(parent, "left")
                .map(|n| self.text(n).to_string()),
            NodeKind::Pair => self
                .child_by_field(parent, "key")
                .map(|n| self.text(n).to_string()),
            _ => None,
        }
    }

    /// Name of the nearest enclosing named function or class, `module` at
    /// the top level.
    pub fn scope_name_for(&self, id: NodeId) -> String {
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            let node = self.node(p);
            match node.kind {
                NodeKind::FunctionDef => {
                    if let Some(name) = self.function_name(p) {
                        return name;
                    }
                }
                NodeKind::ClassDef => {
                    if let Some(name_id) = self.child_by_field(p, "name") {
                        return self.text(name_id).to_string();
                    }
                }
                _ => {}
            }
            current = node.parent;
        }
        "module".to_string()
    }

    /// Innermost function range containing `line`.
    pub fn enclosing_function(&self, line: u32) -> Option<&FunctionRange> {
        self.function_ranges
            .iter()
            .filter(|r| line >= r.start_line && line <= r.end_line)
            .min_by_key(|r| r.end_line - r.start_line)
    }

    /// Scope label for a line: enclosing function name or `module`.
    pub fn scope_at_line(&self, line: u32) -> String {
        self.enclosing_function(line)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| "module".to_string())
    }

    /// Nearest enclosing class name for a node, if any.
    pub fn enclosing_class_name(&self, id: NodeId) -> Option<String> {
        let class_id = self.ancestor_of_kind(id, &NodeKind::ClassDef)?;
        self.child_by_field(class_id, "name")
            .map(|n| self.text(n).to_string())
    }

    // ───────────────────────────────────────────────────────────────
    // Imports and symbol resolution
    // ───────────────────────────────────────────────────────────────

    fn collect_imports(&mut self) {
        let import_ids: Vec<NodeId> = self.index.of_kind(&NodeKind::ImportDecl).to_vec();
        let mut imports = Vec::new();
        for id in import_ids {
            match self.language {
                Language::Python => self.collect_python_import(id, &mut imports),
                Language::TypeScript | Language::JavaScript => {
                    self.collect_js_import(id, &mut imports)
                }
            }
        }
        self.imports = imports;
    }

    fn collect_python_import(&self, id: NodeId, out: &mut Vec<ImportBinding>) {
        let line = self.line_of(id);
        let node = self.node(id);
        let is_from = node.raw == "import_from_statement";
        let module_name = self
            .child_by_field(id, "module_name")
            .map(|n| self.text(n).to_string());

        for &child in &node.children {
            let child_node = self.node(child);
            match child_node.raw {
                "dotted_name" => {
                    // `import os.path` binds `os`; `from x import name`
                    // binds `name`.
                    if Some(child) == self.child_by_field(id, "module_name") {
                        continue;
                    }
                    let text = self.text(child);
                    let local = if is_from {
                        text.to_string()
                    } else {
                        text.split('.').next().unwrap_or(text).to_string()
                    };
                    let module = match (&module_name, is_from) {
                        (Some(module), true) => module.clone(),
                        _ => text.to_string(),
                    };
                    out.push(ImportBinding { local, module, line });
                }
                "aliased_import" => {
                    let name = self
                        .child_by_field(child, "name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let alias = self
                        .child_by_field(child, "alias")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_else(|| name.clone());
                    let module = match (&module_name, is_from) {
                        (Some(module), true) => module.clone(),
                        _ => name.clone(),
                    };
                    out.push(ImportBinding {
                        local: alias,
                        module,
                        line,
                    });
                }
                _ => {}
            }
        }
    }

    fn collect_js_import(&self, id: NodeId, out: &mut Vec<ImportBinding>) {
        let line = self.line_of(id);
        let Some(source_id) = self.child_by_field(id, "source") else {
            return;
        };
        let module = self.text(source_id).trim_matches(['"', '\'', '`']).to_string();

        let mut locals = Vec::new();
        for desc in self.descendants(id) {
            let node = self.node(desc);
            match node.raw {
                "import_specifier" => {
                    let name = self
                        .child_by_field(desc, "alias")
                        .or_else(|| self.child_by_field(desc, "name"))
                        .map(|n| self.text(n).to_string());
                    if let Some(name) = name {
                        locals.push(name);
                    }
                }
                "namespace_import" => {
                    if let Some(&ident) = self.node(desc).children.iter().find(|&&c| {
                        self.node(c).kind == NodeKind::Identifier
                    }) {
                        locals.push(self.text(ident).to_string());
                    }
                }
                "import_clause" => {
                    // Default import: a bare identifier directly under the clause.
                    for &c in &node.children {
                        if self.node(c).kind == NodeKind::Identifier {
                            locals.push(self.text(c).to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        if locals.is_empty() {
            // Side-effect import keeps the module edge for the graph.
            locals.push(module.clone());
        }
        for local in locals {
            out.push(ImportBinding {
                local,
                module: module.clone(),
                line,
            });
        }
    }

    pub fn imports(&self) -> &[ImportBinding] {
        &self.imports
    }

    /// Resolve a name at a line: local definitions first (lexical scope),
    /// then imports.
    pub fn resolve_symbol(&self, name: &str, at_line: u32) -> Option<ResolvedSymbol> {
        let locals: Vec<&ResolvedSymbol> =
            self.definitions.iter().filter(|d| d.name == name).collect();
        if !locals.is_empty() {
            // Prefer the closest definition at or above the use site.
            let best = locals
                .iter()
                .filter(|d| d.line <= at_line)
                .max_by_key(|d| d.line)
                .or_else(|| locals.first());
            return best.map(|d| (*d).clone());
        }
        self.imports
            .iter()
            .filter(|i| i.local == name && i.line <= at_line)
            .next_back()
            .map(|i| ResolvedSymbol {
                name: i.local.clone(),
                kind: "import".to_string(),
                line: i.line,
                module: Some(i.module.clone()),
            })
    }
}

fn first_error_position(node: &Node) -> Option<(usize, usize)> {
    if node.is_error() || node.is_missing() {
        return Some((node.start_position().row + 1, node.start_position().column));
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if let Some(found) = first_error_position(&child) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_context(content: &str) -> FileContext {
        FileContext::parse("app/test.py", Language::Python, content).expect("parse")
    }

    fn js_context(content: &str) -> FileContext {
        FileContext::parse("src/test.js", Language::JavaScript, content).expect("parse")
    }

    #[test]
    fn test_single_walk_index_lookup() {
        let ctx = python_context(
            "import os\n\ndef handler(q):\n    data = os.getenv('HOME')\n    return data\n",
        );
        assert_eq!(ctx.find_nodes(&NodeKind::FunctionDef).len(), 1);
        assert_eq!(ctx.find_nodes(&NodeKind::ImportDecl).len(), 1);
        assert_eq!(ctx.find_nodes(&NodeKind::Assignment).len(), 1);
        assert_eq!(ctx.find_nodes(&NodeKind::Call).len(), 1);
        assert!(ctx.find_nodes(&NodeKind::ClassDef).is_empty());
    }

    #[test]
    fn test_syntax_error_is_hard_fail() {
        let err = FileContext::parse("bad.py", Language::Python, "def broken(:\n  pass\n")
            .unwrap_err();
        assert!(matches!(err, AuditError::Parse { .. }));
    }

    #[test]
    fn test_function_ranges_and_scope() {
        let ctx = python_context(
            "class UserService:\n    def find(self, q):\n        return q\n\ndef top():\n    pass\n",
        );
        assert_eq!(ctx.function_ranges.len(), 2);
        let find = &ctx.function_ranges[0];
        assert_eq!(find.name, "find");
        assert_eq!(find.scope, "UserService");
        let top = &ctx.function_ranges[1];
        assert_eq!(top.name, "top");
        assert_eq!(top.scope, "module");

        assert_eq!(ctx.scope_at_line(3), "find");
        assert_eq!(ctx.scope_at_line(6), "top");
    }

    #[test]
    fn test_fstring_kind() {
        let ctx = python_context("q = f\"SELECT * FROM users WHERE id = {uid}\"\nplain = \"x\"\n");
        assert_eq!(ctx.find_nodes(&NodeKind::FString).len(), 1);
        assert_eq!(ctx.find_nodes(&NodeKind::StringLit).len(), 1);
    }

    #[test]
    fn test_python_import_bindings() {
        let ctx = python_context(
            "import os.path\nimport numpy as np\nfrom app.services import search\n",
        );
        let imports = ctx.imports();
        assert!(imports.iter().any(|i| i.local == "os" && i.module == "os.path"));
        assert!(imports.iter().any(|i| i.local == "np" && i.module == "numpy"));
        assert!(imports
            .iter()
            .any(|i| i.local == "search" && i.module == "app.services"));
    }

    #[test]
    fn test_js_import_bindings_and_arrow_names() {
        let ctx = js_context(
            "import express from 'express';\nimport { sanitize as clean } from './lib/html';\nconst handler = (req, res) => { res.send('ok'); };\n",
        );
        assert!(ctx
            .imports()
            .iter()
            .any(|i| i.local == "express" && i.module == "express"));
        assert!(ctx
            .imports()
            .iter()
            .any(|i| i.local == "clean" && i.module == "./lib/html"));
        assert!(ctx.function_ranges.iter().any(|r| r.name == "handler"));
    }

    #[test]
    fn test_resolve_symbol_prefers_local_then_import() {
        let ctx = python_context(
            "from app.db import search\n\ndef search_local(q):\n    return q\n",
        );
        let imported = ctx.resolve_symbol("search", 10).expect("import resolves");
        assert_eq!(imported.module.as_deref(), Some("app.db"));
        let local = ctx.resolve_symbol("search_local", 10).expect("local resolves");
        assert_eq!(local.kind, "function");
        assert!(ctx.resolve_symbol("missing", 10).is_none());
    }

    #[test]
    fn test_identifier_names_skip_properties() {
        let ctx = python_context("def f(query):\n    db.execute(query)\n");
        let calls = ctx.find_nodes(&NodeKind::Call);
        assert_eq!(calls.len(), 1);
        let names = ctx.identifier_names(calls[0]);
        assert_eq!(names, vec!["db".to_string(), "query".to_string()]);
    }
}
