//! Python ORM extraction: SQLAlchemy and Django model classes, fields and
//! relationships.

use serde_json::{json, Value};

use auditor_storage::RecordBatches;

use crate::features::extraction::common::{keyword_arg, positional_args, string_literal_value};
use crate::features::extraction::push;
use crate::features::file_context::{FileContext, NodeId, NodeKind};

pub fn extract(ctx: &FileContext, batches: &mut RecordBatches) {
    for &class in ctx.find_nodes(&NodeKind::ClassDef) {
        let Some(name_id) = ctx.child_by_field(class, "name") else {
            continue;
        };
        let model_name = ctx.text(name_id).to_string();
        let Some(framework) = model_framework(ctx, class) else {
            continue;
        };

        let mut table_name: Option<String> = None;
        let mut fields = Vec::new();
        let mut relationships = Vec::new();

        for assign in ctx.descendants_of_kind(class, &NodeKind::Assignment) {
            // Only class-level attributes, not assignments inside methods.
            if ctx.ancestor_of_kind(assign, &NodeKind::FunctionDef).is_some() {
                continue;
            }
            let Some(left) = ctx.child_by_field(assign, "left") else {
                continue;
            };
            let Some(right) = ctx.child_by_field(assign, "right") else {
                continue;
            };
            let attr_name = ctx.text(left).to_string();

            if attr_name == "__tablename__" {
                if ctx.node(right).kind == NodeKind::StringLit {
                    table_name = Some(string_literal_value(ctx, right));
                }
                continue;
            }
            if ctx.node(right).kind != NodeKind::Call {
                continue;
            }
            let Some(callee) = ctx.callee_text(right) else {
                continue;
            };

            if is_relationship_call(callee) {
                relationships.push((attr_name, right, ctx.line_of(assign)));
            } else if is_field_call(framework, callee) {
                fields.push((attr_name, right, ctx.line_of(assign)));
            }
        }

        push(
            batches,
            "orm_models",
            json!({
                "file": ctx.path,
                "line": ctx.line_of(class),
                "model_name": model_name,
                "framework": framework,
                "table_name": table_name.as_deref().map(Value::from).unwrap_or(Value::Null),
            }),
        );

        for (field_name, call, line) in fields {
            let field_type = positional_args(ctx, call)
                .first()
                .map(|&arg| ctx.text(arg).to_string())
                .unwrap_or_else(|| ctx.callee_text(call).unwrap_or("").to_string());
            let is_nullable = !kwarg_is_false(ctx, call, "nullable")
                && !kwarg_is_true(ctx, call, "primary_key")
                && !kwarg_is_false(ctx, call, "null");
            push(
                batches,
                "orm_fields",
                json!({
                    "file": ctx.path,
                    "line": line,
                    "model_name": model_name,
                    "field_name": field_name,
                    "field_type": field_type,
                    "is_nullable": is_nullable,
                    "is_unique": kwarg_is_true(ctx, call, "unique"),
                }),
            );
        }

        for (_attr_name, call, line) in relationships {
            let target = positional_args(ctx, call)
                .first()
                .map(|&arg| match ctx.node(arg).kind {
                    NodeKind::StringLit => string_literal_value(ctx, arg),
                    _ => ctx.text(arg).to_string(),
                })
                .unwrap_or_default();
            let kind = ctx
                .callee_text(call)
                .unwrap_or("")
                .rsplit('.')
                .next()
                .unwrap_or("")
                .to_string();
            push(
                batches,
                "orm_relationships",
                json!({
                    "file": ctx.path,
                    "line": line,
                    "source_model": model_name,
                    "target_model": target,
                    "kind": kind,
                    "cascade": kwarg_string(ctx, call, "cascade"),
                    "back_populates": kwarg_string(ctx, call, "back_populates"),
                }),
            );
        }
    }
}

/// Which ORM a class belongs to, judged by its superclasses.
fn model_framework(ctx: &FileContext, class: NodeId) -> Option<&'static str> {
    let superclasses = ctx.child_by_field(class, "superclasses")?;
    let text = ctx.text(superclasses);
    if text.contains("models.Model") {
        Some("django")
    } else if text.contains("db.Model") || text.contains("Base") || text.contains("DeclarativeBase")
    {
        Some("sqlalchemy")
    } else {
        None
    }
}

fn is_field_call(framework: &str, callee: &str) -> bool {
    match framework {
        "django" => callee.starts_with("models.") && callee.ends_with("Field"),
        _ => callee == "Column" || callee.ends_with(".Column") || callee == "mapped_column",
    }
}

fn is_relationship_call(callee: &str) -> bool {
    let tail = callee.rsplit('.').next().unwrap_or(callee);
    matches!(
        tail,
        "relationship" | "ForeignKey" | "ManyToManyField" | "OneToOneField"
    )
}

fn kwarg_is_true(ctx: &FileContext, call: NodeId, name: &str) -> bool {
    keyword_arg(ctx, call, name)
        .map(|v| ctx.text(v) == "True")
        .unwrap_or(false)
}

fn kwarg_is_false(ctx: &FileContext, call: NodeId, name: &str) -> bool {
    keyword_arg(ctx, call, name)
        .map(|v| ctx.text(v) == "False")
        .unwrap_or(false)
}

fn kwarg_string(ctx: &FileContext, call: NodeId, name: &str) -> Value {
    keyword_arg(ctx, call, name)
        .map(|v| Value::from(string_literal_value(ctx, v)))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Language;

    fn extract_from(content: &str) -> RecordBatches {
        let ctx = FileContext::parse("app/models.py", Language::Python, content).expect("parse");
        let mut batches = RecordBatches::new();
        extract(&ctx, &mut batches);
        batches
    }

    #[test]
    fn test_sqlalchemy_model_fields_and_relationship() {
        let batches = extract_from(
            "class User(db.Model):\n    __tablename__ = \"users\"\n    id = db.Column(db.Integer, primary_key=True)\n    email = db.Column(db.String, nullable=False, unique=True)\n    posts = relationship(\"Post\", back_populates=\"author\", cascade=\"all, delete\")\n",
        );
        let models = &batches["orm_models"];
        assert_eq!(models[0]["model_name"], "User");
        assert_eq!(models[0]["framework"], "sqlalchemy");
        assert_eq!(models[0]["table_name"], "users");

        let fields = &batches["orm_fields"];
        let email = fields
            .iter()
            .find(|f| f["field_name"] == "email")
            .expect("email field");
        assert_eq!(email["is_nullable"], false);
        assert_eq!(email["is_unique"], true);

        let rels = &batches["orm_relationships"];
        assert_eq!(rels[0]["source_model"], "User");
        assert_eq!(rels[0]["target_model"], "Post");
        assert_eq!(rels[0]["back_populates"], "author");
        assert_eq!(rels[0]["cascade"], "all, delete");
    }

    #[test]
    fn test_django_model() {
        let batches = extract_from(
            "class Report(models.Model):\n    title = models.CharField(max_length=80)\n    owner = models.ForeignKey(\"User\", on_delete=models.CASCADE)\n",
        );
        assert_eq!(batches["orm_models"][0]["framework"], "django");
        assert!(batches["orm_fields"]
            .iter()
            .any(|f| f["field_name"] == "title"));
        assert!(batches["orm_relationships"]
            .iter()
            .any(|r| r["kind"] == "ForeignKey" && r["target_model"] == "User"));
    }

    #[test]
    fn test_plain_class_is_not_a_model() {
        let batches = extract_from("class Helper:\n    value = compute()\n");
        assert!(batches.get("orm_models").is_none());
    }
}
