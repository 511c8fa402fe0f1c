//! React components, hooks and hook dependency arrays.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use auditor_storage::RecordBatches;

use crate::features::extraction::common::positional_args;
use crate::features::extraction::{batch_len, push, push_child};
use crate::features::file_context::{FileContext, NodeKind};

static HOOK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^use[A-Z]").unwrap_or_else(|e| panic!("static regex: {}", e)));

/// Hooks whose second argument is a dependency array.
const DEP_ARRAY_HOOKS: &[&str] = &["useEffect", "useMemo", "useCallback", "useLayoutEffect"];

pub fn extract(ctx: &FileContext, batches: &mut RecordBatches) {
    let mut component_names = Vec::new();

    // Function components: capitalized name + JSX in the body.
    for range in &ctx.function_ranges {
        if !range.name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            continue;
        }
        if ctx
            .descendants_of_kind(range.node, &NodeKind::JsxElement)
            .is_empty()
        {
            continue;
        }
        let kind = if ctx.node(range.node).raw == "arrow_function" {
            "arrow"
        } else {
            "function"
        };
        push(
            batches,
            "react_components",
            json!({
                "file": ctx.path,
                "line": range.start_line,
                "name": range.name,
                "kind": kind,
            }),
        );
        component_names.push(range.name.clone());
    }

    // Class components.
    for &class in ctx.find_nodes(&NodeKind::ClassDef) {
        let Some(name_id) = ctx.child_by_field(class, "name") else {
            continue;
        };
        let extends_component = ctx
            .children(class)
            .iter()
            .any(|&c| ctx.text(c).contains("Component"));
        if !extends_component {
            continue;
        }
        push(
            batches,
            "react_components",
            json!({
                "file": ctx.path,
                "line": ctx.line_of(class),
                "name": ctx.text(name_id),
                "kind": "class",
            }),
        );
        component_names.push(ctx.text(name_id).to_string());
    }

    // Hooks, attributed to their enclosing component.
    for &call in ctx.find_nodes(&NodeKind::Call) {
        let Some(callee) = ctx.callee_text(call) else {
            continue;
        };
        let hook_name = callee.rsplit('.').next().unwrap_or(callee);
        if !HOOK_RE.is_match(hook_name) {
            continue;
        }
        let line = ctx.line_of(call);
        let component = ctx
            .enclosing_function(line)
            .map(|r| r.name.clone())
            .filter(|name| component_names.contains(name));

        let index = batch_len(batches, "react_hooks");
        push(
            batches,
            "react_hooks",
            json!({
                "file": ctx.path,
                "line": line,
                "component": component,
                "hook_name": hook_name,
            }),
        );

        if DEP_ARRAY_HOOKS.contains(&hook_name) {
            if let Some(&deps) = positional_args(ctx, call).get(1) {
                if ctx.node(deps).kind == NodeKind::ArrayLit {
                    for dep in ctx.identifier_names(deps) {
                        push_child(
                            batches,
                            "react_hook_dependencies",
                            index,
                            json!({ "dependency": dep }),
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Language;

    fn extract_from(content: &str) -> RecordBatches {
        let ctx =
            FileContext::parse("src/App.jsx", Language::JavaScript, content).expect("parse");
        let mut batches = RecordBatches::new();
        extract(&ctx, &mut batches);
        batches
    }

    #[test]
    fn test_function_component_with_hooks() {
        let batches = extract_from(
            "function UserList({ userId }) {\n  const [users, setUsers] = useState([]);\n  useEffect(() => {\n    fetchUsers(userId).then(setUsers);\n  }, [userId]);\n  return <ul>{users.length}</ul>;\n}\n",
        );
        let components = &batches["react_components"];
        assert_eq!(components[0]["name"], "UserList");
        assert_eq!(components[0]["kind"], "function");

        let hooks = &batches["react_hooks"];
        assert!(hooks
            .iter()
            .any(|h| h["hook_name"] == "useState" && h["component"] == "UserList"));
        let effect = hooks
            .iter()
            .position(|h| h["hook_name"] == "useEffect")
            .expect("useEffect row");
        let deps: Vec<&str> = batches["react_hook_dependencies"]
            .iter()
            .filter(|d| d["_parent_index"].as_u64() == Some(effect as u64))
            .map(|d| d["dependency"].as_str().unwrap_or(""))
            .collect();
        assert_eq!(deps, vec!["userId"]);
    }

    #[test]
    fn test_helper_function_is_not_a_component() {
        let batches = extract_from("function formatName(user) {\n  return user.name;\n}\n");
        assert!(batches.get("react_components").is_none());
    }
}
