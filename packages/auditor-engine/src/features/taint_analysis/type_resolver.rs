//! Polyglot type identity: "do these two variables represent the same
//! data model?" Used for ORM aliasing when no direct graph edge exists.

use std::collections::HashSet;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// Resolves ORM model identity from graph node metadata and detects
/// controller files via the indexed endpoints.
pub struct TypeResolver {
    /// `node_id -> metadata JSON` snapshot from `graphs.db`.
    node_metadata: FxHashMap<String, String>,
    controller_files: HashSet<String>,
    model_cache: Mutex<FxHashMap<String, Option<String>>>,
}

impl TypeResolver {
    pub fn new(
        node_metadata: FxHashMap<String, String>,
        controller_files: HashSet<String>,
    ) -> Self {
        Self {
            node_metadata,
            controller_files,
            model_cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Model name for a node, from its metadata: direct `model` key, then
    /// the `query_type` prefix (`User.findAll` -> `User`), then
    /// `target_model`. Results (including misses) are cached.
    pub fn get_model_for_node(&self, node_id: &str) -> Option<String> {
        if let Some(cached) = self.model_cache.lock().get(node_id) {
            return cached.clone();
        }
        let model = self
            .node_metadata
            .get(node_id)
            .and_then(|raw| extract_model_from_metadata(raw));
        self.model_cache
            .lock()
            .insert(node_id.to_string(), model.clone());
        model
    }

    /// Both nodes carry the same non-null model name.
    pub fn is_same_type(&self, node_a: &str, node_b: &str) -> bool {
        match (self.get_model_for_node(node_a), self.get_model_for_node(node_b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Controller files are the alias boundary: endpoint-bearing files
    /// first, a name heuristic when the index has no endpoints table data.
    pub fn is_controller_file(&self, file_path: &str) -> bool {
        if !self.controller_files.is_empty() {
            return self.controller_files.contains(file_path);
        }
        let lower = file_path.to_lowercase();
        ["controller", "routes", "handlers", "views", "endpoints"]
            .iter()
            .any(|pattern| lower.contains(pattern))
    }

    pub fn clear_cache(&self) {
        self.model_cache.lock().clear();
    }
}

fn extract_model_from_metadata(raw: &str) -> Option<String> {
    let metadata: Value = serde_json::from_str(raw).ok()?;
    if let Some(model) = metadata.get("model").and_then(Value::as_str) {
        return Some(model.to_string());
    }
    if let Some(query_type) = metadata.get("query_type").and_then(Value::as_str) {
        if let Some((model, _)) = query_type.split_once('.') {
            return Some(model.to_string());
        }
    }
    metadata
        .get("target_model")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TypeResolver {
        let mut metadata = FxHashMap::default();
        metadata.insert(
            "a.py::f::user".to_string(),
            "{\"model\": \"User\"}".to_string(),
        );
        metadata.insert(
            "b.py::g::user".to_string(),
            "{\"query_type\": \"User.findAll\"}".to_string(),
        );
        metadata.insert(
            "c.py::h::report".to_string(),
            "{\"target_model\": \"Report\"}".to_string(),
        );
        let mut controllers = HashSet::new();
        controllers.insert("a.py".to_string());
        TypeResolver::new(metadata, controllers)
    }

    #[test]
    fn test_model_extraction_precedence() {
        let resolver = resolver();
        assert_eq!(resolver.get_model_for_node("a.py::f::user").as_deref(), Some("User"));
        assert_eq!(resolver.get_model_for_node("b.py::g::user").as_deref(), Some("User"));
        assert_eq!(
            resolver.get_model_for_node("c.py::h::report").as_deref(),
            Some("Report")
        );
        assert_eq!(resolver.get_model_for_node("missing"), None);
    }

    #[test]
    fn test_same_type_aliasing() {
        let resolver = resolver();
        assert!(resolver.is_same_type("a.py::f::user", "b.py::g::user"));
        assert!(!resolver.is_same_type("a.py::f::user", "c.py::h::report"));
        assert!(!resolver.is_same_type("a.py::f::user", "missing"));
    }

    #[test]
    fn test_controller_detection_with_fallback() {
        let resolver = resolver();
        assert!(resolver.is_controller_file("a.py"));
        assert!(!resolver.is_controller_file("b.py"));

        let empty = TypeResolver::new(FxHashMap::default(), HashSet::new());
        assert!(empty.is_controller_file("src/users/controller.py"));
        assert!(!empty.is_controller_file("src/users/model.py"));
    }

    #[test]
    fn test_malformed_metadata_is_skipped() {
        let mut metadata = FxHashMap::default();
        metadata.insert("x".to_string(), "not json".to_string());
        let resolver = TypeResolver::new(metadata, HashSet::new());
        assert_eq!(resolver.get_model_for_node("x"), None);
    }
}
