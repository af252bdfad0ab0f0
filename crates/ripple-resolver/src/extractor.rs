//! Import specifier extraction using tree-sitter

use std::path::Path;
use tree_sitter::{Language, Node, Parser};

/// Source dialects the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    JavaScript,
    TypeScript,
    Tsx,
}

impl SourceKind {
    /// Determine source kind from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "js" | "jsx" | "mjs" | "cjs" => Some(SourceKind::JavaScript),
            "ts" | "mts" | "cts" => Some(SourceKind::TypeScript),
            "tsx" => Some(SourceKind::Tsx),
            _ => None,
        }
    }

    /// Get the tree-sitter language for this source kind
    pub fn language(&self) -> Language {
        match self {
            SourceKind::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            SourceKind::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            SourceKind::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to set language: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("source could not be parsed")]
    Parse,
}

/// Every literal module specifier in `source`, in source order.
///
/// Covers `import ... from`, `export ... from`, side-effect imports,
/// `import()`, `require()` and TypeScript `import x = require()`.
pub fn extract_specifiers(kind: SourceKind, source: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut parser = Parser::new();
    parser.set_language(&kind.language())?;
    let tree = parser.parse(source, None).ok_or(ExtractError::Parse)?;

    let mut specifiers = Vec::new();
    visit(tree.root_node(), source, &mut specifiers);
    Ok(specifiers)
}

fn visit(node: Node, source: &[u8], specifiers: &mut Vec<String>) {
    match node.kind() {
        "import_statement" | "export_statement" => {
            if let Some(literal) = node
                .child_by_field_name("source")
                .and_then(|n| string_literal(n, source))
            {
                specifiers.push(literal);
            }
        }
        "import_require_clause" => {
            let mut cursor = node.walk();
            let literal = node
                .named_children(&mut cursor)
                .find(|child| child.kind() == "string")
                .and_then(|n| string_literal(n, source));
            if let Some(literal) = literal {
                specifiers.push(literal);
            }
        }
        "call_expression" => {
            if let Some(literal) = required_specifier(node, source) {
                specifiers.push(literal);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        visit(child, source, specifiers);
    }
}

fn required_specifier(call: Node, source: &[u8]) -> Option<String> {
    let function = call.child_by_field_name("function")?;
    let is_loader = match function.kind() {
        "import" => true,
        "identifier" => function.utf8_text(source).ok()? == "require",
        _ => false,
    };
    if !is_loader {
        return None;
    }
    let argument = call.child_by_field_name("arguments")?.named_child(0)?;
    string_literal(argument, source)
}

fn string_literal(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "string" => {
            let text = node.utf8_text(source).ok()?;
            Some(text.trim_matches(|c| c == '"' || c == '\'').to_string())
        }
        // Template literals only count without substitutions
        "template_string" => {
            let mut cursor = node.walk();
            if node
                .named_children(&mut cursor)
                .any(|child| child.kind() == "template_substitution")
            {
                return None;
            }
            let text = node.utf8_text(source).ok()?;
            Some(text.trim_matches('`').to_string())
        }
        _ => None,
    }
}
