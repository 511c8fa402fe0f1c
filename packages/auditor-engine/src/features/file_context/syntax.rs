//! Arena node model.
//!
//! Raw grammar kinds are folded into a shared `NodeKind` enum so extractors
//! can be written once per concern instead of once per grammar. The raw
//! kind string is kept for fine distinctions.

use crate::shared::models::Span;

/// Index into the per-file arena.
pub type NodeId = u32;

/// Tagged node kind shared across grammars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Module,
    FunctionDef,
    ClassDef,
    Lambda,
    DecoratedDef,
    Decorator,
    ParameterList,
    Parameter,
    Assignment,
    AugmentedAssignment,
    VariableDeclarator,
    Call,
    ArgumentList,
    KeywordArgument,
    Identifier,
    Attribute,
    Subscript,
    StringLit,
    FString,
    TemplateString,
    Interpolation,
    Number,
    ImportDecl,
    ReturnStmt,
    IfStmt,
    ForStmt,
    WhileStmt,
    TryStmt,
    ExceptClause,
    FinallyClause,
    RaiseStmt,
    WithStmt,
    BinaryOp,
    Comparison,
    Block,
    ExpressionStmt,
    Pair,
    ObjectLit,
    ArrayLit,
    JsxElement,
    Other(String),
}

impl NodeKind {
    /// Fold a Python grammar kind. F-string detection needs the source and
    /// is handled by the arena builder, which passes `is_fstring`.
    pub fn from_python(raw: &str, is_fstring: bool) -> Self {
        match raw {
            "module" => NodeKind::Module,
            "function_definition" => NodeKind::FunctionDef,
            "class_definition" => NodeKind::ClassDef,
            "lambda" => NodeKind::Lambda,
            "decorated_definition" => NodeKind::DecoratedDef,
            "decorator" => NodeKind::Decorator,
            "parameters" | "lambda_parameters" => NodeKind::ParameterList,
            "typed_parameter" | "default_parameter" | "typed_default_parameter" => {
                NodeKind::Parameter
            }
            "assignment" => NodeKind::Assignment,
            "augmented_assignment" => NodeKind::AugmentedAssignment,
            "call" => NodeKind::Call,
            "argument_list" => NodeKind::ArgumentList,
            "keyword_argument" => NodeKind::KeywordArgument,
            "identifier" => NodeKind::Identifier,
            "attribute" => NodeKind::Attribute,
            "subscript" => NodeKind::Subscript,
            "string" if is_fstring => NodeKind::FString,
            "string" | "concatenated_string" => NodeKind::StringLit,
            "interpolation" => NodeKind::Interpolation,
            "integer" | "float" => NodeKind::Number,
            "import_statement" | "import_from_statement" => NodeKind::ImportDecl,
            "return_statement" => NodeKind::ReturnStmt,
            "if_statement" => NodeKind::IfStmt,
            "for_statement" => NodeKind::ForStmt,
            "while_statement" => NodeKind::WhileStmt,
            "try_statement" => NodeKind::TryStmt,
            "except_clause" => NodeKind::ExceptClause,
            "finally_clause" => NodeKind::FinallyClause,
            "raise_statement" => NodeKind::RaiseStmt,
            "with_statement" => NodeKind::WithStmt,
            "binary_operator" | "boolean_operator" => NodeKind::BinaryOp,
            "comparison_operator" => NodeKind::Comparison,
            "block" => NodeKind::Block,
            "expression_statement" => NodeKind::ExpressionStmt,
            "pair" => NodeKind::Pair,
            "dictionary" => NodeKind::ObjectLit,
            "list" | "tuple" => NodeKind::ArrayLit,
            other => NodeKind::Other(other.to_string()),
        }
    }

    /// Fold a TypeScript/TSX grammar kind.
    pub fn from_typescript(raw: &str) -> Self {
        match raw {
            "program" => NodeKind::Module,
            "function_declaration"
            | "function_expression"
            | "generator_function_declaration"
            | "method_definition" => NodeKind::FunctionDef,
            "arrow_function" => NodeKind::FunctionDef,
            "class_declaration" | "class" => NodeKind::ClassDef,
            "decorator" => NodeKind::Decorator,
            "formal_parameters" => NodeKind::ParameterList,
            "required_parameter" | "optional_parameter" => NodeKind::Parameter,
            "assignment_expression" => NodeKind::Assignment,
            "augmented_assignment_expression" => NodeKind::AugmentedAssignment,
            "variable_declarator" => NodeKind::VariableDeclarator,
            "call_expression" | "new_expression" => NodeKind::Call,
            "arguments" => NodeKind::ArgumentList,
            "identifier" | "property_identifier" | "shorthand_property_identifier" => {
                NodeKind::Identifier
            }
            "member_expression" => NodeKind::Attribute,
            "subscript_expression" => NodeKind::Subscript,
            "string" => NodeKind::StringLit,
            "template_string" => NodeKind::TemplateString,
            "template_substitution" => NodeKind::Interpolation,
            "number" => NodeKind::Number,
            "import_statement" => NodeKind::ImportDecl,
            "return_statement" => NodeKind::ReturnStmt,
            "if_statement" => NodeKind::IfStmt,
            "for_statement" | "for_in_statement" => NodeKind::ForStmt,
            "while_statement" | "do_statement" => NodeKind::WhileStmt,
            "try_statement" => NodeKind::TryStmt,
            "catch_clause" => NodeKind::ExceptClause,
            "finally_clause" => NodeKind::FinallyClause,
            "throw_statement" => NodeKind::RaiseStmt,
            "binary_expression" => NodeKind::BinaryOp,
            "statement_block" => NodeKind::Block,
            "expression_statement" => NodeKind::ExpressionStmt,
            "pair" => NodeKind::Pair,
            "object" => NodeKind::ObjectLit,
            "array" => NodeKind::ArrayLit,
            "jsx_element" | "jsx_self_closing_element" | "jsx_fragment" => NodeKind::JsxElement,
            other => NodeKind::Other(other.to_string()),
        }
    }
}

/// One arena node. Text is not stored; slices come from the owning
/// `FileContext`'s content via the byte range.
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// Raw grammar kind.
    pub raw: &'static str,
    /// Grammar field name relative to the parent (`name`, `left`, ...).
    pub field: Option<&'static str>,
    pub span: Span,
    pub byte_start: usize,
    pub byte_end: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub is_named: bool,
}
