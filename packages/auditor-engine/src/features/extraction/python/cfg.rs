//! Per-function control-flow graphs.
//!
//! Block kinds: entry, exit, body, branch, loop, try, except. Edge kinds
//! carry the branch sense (`true`/`false`), loop structure
//! (`loop_back`/`loop_exit`), exception routing and early exits
//! (`return`/`raise`). The taint analyzer prunes paths whose blocks
//! return or raise before reaching a sink.

use serde_json::json;

use auditor_storage::RecordBatches;

use crate::features::extraction::push;
use crate::features::file_context::{FileContext, FunctionRange, NodeId, NodeKind};

pub fn extract(ctx: &FileContext, batches: &mut RecordBatches) {
    for range in &ctx.function_ranges {
        let mut builder = Builder::new(ctx, range);
        builder.build();
        builder.emit(batches);
    }
}

struct BlockRec {
    kind: &'static str,
    start: u32,
    end: u32,
}

/// Pending predecessor: `(block_id, edge_kind)` to connect when the next
/// block materializes.
type Preds = Vec<(u32, &'static str)>;

struct Builder<'a> {
    ctx: &'a FileContext,
    range: &'a FunctionRange,
    blocks: Vec<BlockRec>,
    edges: Vec<(u32, u32, &'static str)>,
    exit_id: u32,
}

impl<'a> Builder<'a> {
    fn new(ctx: &'a FileContext, range: &'a FunctionRange) -> Self {
        let mut builder = Self {
            ctx,
            range,
            blocks: Vec::new(),
            edges: Vec::new(),
            exit_id: 0,
        };
        builder.new_block("entry", range.start_line);
        builder.exit_id = builder.new_block("exit", range.end_line);
        builder
    }

    fn new_block(&mut self, kind: &'static str, line: u32) -> u32 {
        let id = self.blocks.len() as u32;
        self.blocks.push(BlockRec {
            kind,
            start: line,
            end: line,
        });
        id
    }

    fn extend(&mut self, id: u32, line: u32) {
        let block = &mut self.blocks[id as usize];
        block.end = block.end.max(line);
    }

    fn edge(&mut self, src: u32, dst: u32, kind: &'static str) {
        self.edges.push((src, dst, kind));
    }

    fn connect(&mut self, preds: &Preds, target: u32) {
        for &(pred, kind) in preds {
            self.edge(pred, target, kind);
        }
    }

    fn build(&mut self) {
        let body = self.ctx.child_by_field(self.range.node, "body");
        let entry_preds: Preds = vec![(0, "seq")];
        let final_preds = match body {
            Some(body) => self.process_block(body, entry_preds),
            None => entry_preds,
        };
        let exit_id = self.exit_id;
        self.connect(&final_preds, exit_id);
    }

    /// Process a statement list; returns the open predecessors falling
    /// through its end. An empty result means all paths already exited.
    fn process_block(&mut self, block: NodeId, mut preds: Preds) -> Preds {
        let mut current: Option<u32> = None;
        let statements: Vec<NodeId> = self
            .ctx
            .children(block)
            .iter()
            .copied()
            .filter(|&s| self.ctx.node(s).is_named)
            .collect();

        for stmt in statements {
            let node = self.ctx.node(stmt);
            let line = node.span.start_line;
            let end_line = node.span.end_line;
            match node.kind {
                NodeKind::IfStmt => {
                    current = None;
                    let branch = self.new_block("branch", line);
                    self.connect(&preds, branch);

                    let mut joined: Preds = Vec::new();
                    if let Some(consequence) = self.ctx.child_by_field(stmt, "consequence") {
                        let exits = self.process_block(consequence, vec![(branch, "true")]);
                        joined.extend(exits);
                    } else {
                        joined.push((branch, "true"));
                    }

                    let mut has_else = false;
                    for &alt in self.ctx.children(stmt) {
                        match self.ctx.node(alt).raw {
                            "else_clause" => {
                                has_else = true;
                                if let Some(body) = self.ctx.child_by_field(alt, "body") {
                                    let exits =
                                        self.process_block(body, vec![(branch, "false")]);
                                    joined.extend(exits);
                                }
                            }
                            "elif_clause" => {
                                has_else = true;
                                if let Some(consequence) =
                                    self.ctx.child_by_field(alt, "consequence")
                                {
                                    let exits =
                                        self.process_block(consequence, vec![(branch, "false")]);
                                    joined.extend(exits);
                                }
                            }
                            _ => {}
                        }
                    }
                    if !has_else {
                        joined.push((branch, "false"));
                    }
                    preds = joined;
                }
                NodeKind::ForStmt | NodeKind::WhileStmt => {
                    current = None;
                    let loop_block = self.new_block("loop", line);
                    self.connect(&preds, loop_block);
                    if let Some(body) = self.ctx.child_by_field(stmt, "body") {
                        let body_exits = self.process_block(body, vec![(loop_block, "true")]);
                        for (block, _) in body_exits {
                            self.edge(block, loop_block, "loop_back");
                        }
                    }
                    preds = vec![(loop_block, "loop_exit")];
                }
                NodeKind::TryStmt => {
                    current = None;
                    let try_block = self.new_block("try", line);
                    self.connect(&preds, try_block);

                    let mut all_exits: Preds = Vec::new();
                    if let Some(body) = self.ctx.child_by_field(stmt, "body") {
                        all_exits.extend(self.process_block(body, vec![(try_block, "seq")]));
                    }
                    let mut finally_body: Option<NodeId> = None;
                    for &clause in self.ctx.children(stmt) {
                        match self.ctx.node(clause).raw {
                            "except_clause" => {
                                let except_block =
                                    self.new_block("except", self.ctx.line_of(clause));
                                self.edge(try_block, except_block, "exception");
                                if let Some(&handler) = self
                                    .ctx
                                    .children_of_kind(clause, &NodeKind::Block)
                                    .first()
                                {
                                    all_exits.extend(
                                        self.process_block(handler, vec![(except_block, "seq")]),
                                    );
                                } else {
                                    all_exits.push((except_block, "seq"));
                                }
                            }
                            "finally_clause" => {
                                finally_body = self
                                    .ctx
                                    .children_of_kind(clause, &NodeKind::Block)
                                    .first()
                                    .copied();
                            }
                            _ => {}
                        }
                    }
                    preds = match finally_body {
                        Some(body) => self.process_block(body, all_exits),
                        None => all_exits,
                    };
                }
                NodeKind::ReturnStmt | NodeKind::RaiseStmt => {
                    let block = match current {
                        Some(block) => block,
                        None => {
                            let block = self.new_block("body", line);
                            self.connect(&preds, block);
                            block
                        }
                    };
                    self.extend(block, end_line);
                    let exit_kind = if node.kind == NodeKind::ReturnStmt {
                        "return"
                    } else {
                        "raise"
                    };
                    let exit_id = self.exit_id;
                    self.edge(block, exit_id, exit_kind);
                    // Statements after an unconditional exit are dead.
                    preds = Vec::new();
                    current = None;
                }
                _ => {
                    match current {
                        Some(block) => self.extend(block, end_line),
                        None => {
                            let block = self.new_block("body", line);
                            self.extend(block, end_line);
                            self.connect(&preds, block);
                            preds = vec![(block, "seq")];
                            current = Some(block);
                        }
                    }
                }
            }
        }
        preds
    }

    fn emit(&self, batches: &mut RecordBatches) {
        for (id, block) in self.blocks.iter().enumerate() {
            push(
                batches,
                "cfg_blocks",
                json!({
                    "file": self.ctx.path,
                    "function_name": self.range.name,
                    "block_id": id,
                    "kind": block.kind,
                    "start_line": block.start,
                    "end_line": block.end,
                }),
            );
        }
        for &(src, dst, kind) in &self.edges {
            push(
                batches,
                "cfg_edges",
                json!({
                    "file": self.ctx.path,
                    "function_name": self.range.name,
                    "src_block": src,
                    "dst_block": dst,
                    "kind": kind,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Language;

    fn extract_from(content: &str) -> RecordBatches {
        let ctx = FileContext::parse("app/c.py", Language::Python, content).expect("parse");
        let mut batches = RecordBatches::new();
        extract(&ctx, &mut batches);
        batches
    }

    fn blocks_of<'a>(
        batches: &'a RecordBatches,
        function: &str,
    ) -> Vec<&'a auditor_storage::Record> {
        batches["cfg_blocks"]
            .iter()
            .filter(|b| b["function_name"] == function)
            .collect()
    }

    #[test]
    fn test_linear_function() {
        let batches = extract_from("def f(x):\n    y = x + 1\n    return y\n");
        let blocks = blocks_of(&batches, "f");
        let kinds: Vec<&str> = blocks
            .iter()
            .map(|b| b["kind"].as_str().unwrap_or(""))
            .collect();
        assert!(kinds.contains(&"entry"));
        assert!(kinds.contains(&"exit"));
        assert!(kinds.contains(&"body"));
        // return edge into exit
        assert!(batches["cfg_edges"]
            .iter()
            .any(|e| e["function_name"] == "f" && e["kind"] == "return"));
    }

    #[test]
    fn test_branching_function() {
        let batches = extract_from(
            "def g(x):\n    if x:\n        a = 1\n    else:\n        a = 2\n    return a\n",
        );
        let blocks = blocks_of(&batches, "g");
        let branch_count = blocks.iter().filter(|b| b["kind"] == "branch").count();
        assert_eq!(branch_count, 1);
        let edges: Vec<_> = batches["cfg_edges"]
            .iter()
            .filter(|e| e["function_name"] == "g")
            .collect();
        assert!(edges.iter().any(|e| e["kind"] == "true"));
        assert!(edges.iter().any(|e| e["kind"] == "false"));
    }

    #[test]
    fn test_loop_has_back_edge() {
        let batches = extract_from("def h(items):\n    for i in items:\n        use(i)\n    return 1\n");
        let edges: Vec<_> = batches["cfg_edges"]
            .iter()
            .filter(|e| e["function_name"] == "h")
            .collect();
        assert!(edges.iter().any(|e| e["kind"] == "loop_back"));
        assert!(edges.iter().any(|e| e["kind"] == "loop_exit"));
    }

    #[test]
    fn test_try_except_blocks() {
        let batches = extract_from(
            "def t():\n    try:\n        risky()\n    except ValueError:\n        handle()\n",
        );
        let blocks = blocks_of(&batches, "t");
        assert!(blocks.iter().any(|b| b["kind"] == "try"));
        assert!(blocks.iter().any(|b| b["kind"] == "except"));
        assert!(batches["cfg_edges"]
            .iter()
            .any(|e| e["function_name"] == "t" && e["kind"] == "exception"));
    }

    #[test]
    fn test_early_return_prunes_fallthrough() {
        let batches = extract_from(
            "def e(x):\n    if x:\n        return 1\n    return 2\n",
        );
        // Both paths exit via return; no dangling seq edge into exit.
        let edges: Vec<_> = batches["cfg_edges"]
            .iter()
            .filter(|e| e["function_name"] == "e")
            .collect();
        let returns = edges.iter().filter(|e| e["kind"] == "return").count();
        assert_eq!(returns, 2);
    }
}
