//! The table catalogue for `repo_index.db`.
//!
//! Declaration order is insertion order: parents before children. Every
//! content table carries a forward-slash relative path column (flagged with
//! `.path()`) and a line anchor; `line = 0` is the file-scope sentinel.

use super::{integer, text, PrimaryKey, TableDef};

pub(super) fn all_tables() -> Vec<TableDef> {
    vec![
        TableDef::new(
            "files",
            PrimaryKey::Column("path"),
            vec![
                text("path").not_null().path(),
                text("language").not_null(),
                integer("size_bytes").not_null(),
                text("sha256").not_null(),
                integer("mtime").not_null(),
            ],
        ),
        TableDef::new(
            "extraction_errors",
            PrimaryKey::RowId("id"),
            vec![
                text("file").not_null().path(),
                text("error_type").not_null(),
                text("message").not_null(),
                integer("created_at").not_null().default("0"),
            ],
        )
        .index("idx_extraction_errors_file", &["file"]),
        TableDef::new(
            "symbols",
            PrimaryKey::None,
            vec![
                text("path").not_null().path(),
                text("name").not_null(),
                text("kind").not_null(),
                integer("line").not_null(),
                integer("end_line"),
                text("parent_class"),
                text("scope"),
            ],
        )
        .unique_on(&["path", "name", "line"])
        .index("idx_symbols_path", &["path"])
        .index("idx_symbols_name", &["name"]),
        TableDef::new(
            "refs",
            PrimaryKey::None,
            vec![
                text("src_path").not_null().path(),
                text("kind").not_null(),
                text("value").not_null(),
                integer("line").not_null(),
            ],
        )
        .index("idx_refs_src", &["src_path"])
        .index("idx_refs_kind", &["kind"]),
        TableDef::new(
            "assignments",
            PrimaryKey::RowId("id"),
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("target_var").not_null(),
                text("source_expr"),
                text("scope"),
            ],
        )
        .index("idx_assignments_file", &["file"])
        .index("idx_assignments_target", &["file", "target_var"]),
        TableDef::new(
            "assignment_sources",
            PrimaryKey::None,
            vec![integer("assignment_id").not_null(), text("source_var").not_null()],
        )
        .parent("assignment_id", "assignments")
        .index("idx_assignment_sources_id", &["assignment_id"]),
        TableDef::new(
            "function_call_args",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("caller_scope"),
                text("callee_function").not_null(),
                integer("argument_index").not_null(),
                text("argument_expr"),
                text("callee_file_path").path(),
            ],
        )
        .index("idx_call_args_file", &["file"])
        .index("idx_call_args_callee", &["callee_function"]),
        TableDef::new(
            "function_return_sources",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                text("function_name").not_null(),
                text("return_var").not_null(),
                integer("line").not_null(),
            ],
        )
        .index("idx_return_sources_file", &["file", "function_name"]),
        TableDef::new(
            "api_endpoints",
            PrimaryKey::RowId("id"),
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("method").not_null(),
                text("pattern").not_null(),
                text("controls"),
            ],
        )
        .index("idx_api_endpoints_file", &["file"]),
        TableDef::new(
            "api_endpoint_controls",
            PrimaryKey::None,
            vec![integer("endpoint_id").not_null(), text("control_name").not_null()],
        )
        .parent("endpoint_id", "api_endpoints")
        .index("idx_endpoint_controls_id", &["endpoint_id"]),
        TableDef::new(
            "sql_queries",
            PrimaryKey::RowId("id"),
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("query_text").not_null(),
                text("command").not_null(),
                integer("is_dynamic").not_null().default("0"),
            ],
        )
        .index("idx_sql_queries_file", &["file"]),
        TableDef::new(
            "sql_query_tables",
            PrimaryKey::None,
            vec![integer("query_id").not_null(), text("table_name").not_null()],
        )
        .parent("query_id", "sql_queries")
        .index("idx_sql_query_tables_id", &["query_id"]),
        TableDef::new(
            "jwt_patterns",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("pattern_type").not_null(),
                text("secret_source").not_null(),
                text("algorithms"),
                integer("allows_none").not_null().default("0"),
                integer("has_confusion").not_null().default("0"),
                text("sensitive_fields"),
            ],
        )
        .index("idx_jwt_patterns_file", &["file"]),
        TableDef::new(
            "orm_models",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("model_name").not_null(),
                text("framework").not_null(),
                text("table_name"),
            ],
        )
        .index("idx_orm_models_file", &["file"])
        .index("idx_orm_models_name", &["model_name"]),
        TableDef::new(
            "orm_fields",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("model_name").not_null(),
                text("field_name").not_null(),
                text("field_type"),
                integer("is_nullable").not_null().default("1"),
                integer("is_unique").not_null().default("0"),
            ],
        )
        .index("idx_orm_fields_model", &["model_name"]),
        TableDef::new(
            "orm_relationships",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("source_model").not_null(),
                text("target_model").not_null(),
                text("kind"),
                text("cascade"),
                text("back_populates"),
            ],
        )
        .index("idx_orm_relationships_source", &["source_model"]),
        TableDef::new(
            "react_components",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("name").not_null(),
                text("kind").not_null(),
            ],
        )
        .index("idx_react_components_file", &["file"]),
        TableDef::new(
            "react_hooks",
            PrimaryKey::RowId("id"),
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("component"),
                text("hook_name").not_null(),
            ],
        )
        .index("idx_react_hooks_file", &["file"]),
        TableDef::new(
            "react_hook_dependencies",
            PrimaryKey::None,
            vec![integer("hook_id").not_null(), text("dependency").not_null()],
        )
        .parent("hook_id", "react_hooks")
        .index("idx_react_hook_deps_id", &["hook_id"]),
        TableDef::new(
            "cfg_blocks",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                text("function_name").not_null(),
                integer("block_id").not_null(),
                text("kind").not_null(),
                integer("start_line").not_null(),
                integer("end_line").not_null(),
            ],
        )
        .index("idx_cfg_blocks_function", &["file", "function_name"]),
        TableDef::new(
            "cfg_edges",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                text("function_name").not_null(),
                integer("src_block").not_null(),
                integer("dst_block").not_null(),
                text("kind").not_null(),
            ],
        )
        .index("idx_cfg_edges_function", &["file", "function_name"]),
        TableDef::new(
            "env_var_usage",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("name").not_null(),
                text("access").not_null(),
                text("scope"),
            ],
        )
        .index("idx_env_var_usage_file", &["file"]),
        TableDef::new(
            "variable_usage",
            PrimaryKey::None,
            vec![
                text("file").not_null().path(),
                integer("line").not_null(),
                text("variable_name").not_null(),
                text("access").not_null(),
                text("scope"),
                integer("scope_level"),
            ],
        )
        .index("idx_variable_usage_file", &["file", "variable_name"]),
        TableDef::new(
            "taint_paths",
            PrimaryKey::RowId("id"),
            vec![
                text("source_node").not_null(),
                text("sink_node").not_null(),
                text("vulnerability").not_null(),
                text("severity").not_null(),
                integer("path_length").not_null(),
            ],
        ),
        TableDef::new(
            "taint_path_steps",
            PrimaryKey::None,
            vec![
                integer("path_id").not_null(),
                integer("step_index").not_null(),
                text("node_id").not_null(),
                text("file").not_null().path(),
                integer("line").not_null(),
                text("edge_kind"),
            ],
        )
        .parent("path_id", "taint_paths")
        .index("idx_taint_path_steps_id", &["path_id"]),
        TableDef::new(
            "findings_consolidated",
            PrimaryKey::RowId("id"),
            vec![
                text("rule_name").not_null(),
                text("file").not_null().path(),
                integer("line").not_null(),
                integer("column_number").not_null().default("0"),
                text("severity").not_null(),
                text("confidence").not_null().default("'medium'"),
                text("category").not_null(),
                text("message").not_null(),
                text("snippet"),
                text("cwe"),
                text("details"),
            ],
        )
        .index("idx_findings_file", &["file"])
        .index("idx_findings_rule", &["rule_name"]),
    ]
}
