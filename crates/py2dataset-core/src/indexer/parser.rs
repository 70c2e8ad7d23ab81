//! Language parsing wrapper used by extraction passes.
//!
//! Source is parsed with the native tree-sitter Python grammar. A tree that
//! contains error or missing nodes is rejected with the position of the first
//! problem; callers never see a partially recovered tree.

use tree_sitter::{Node, Parser, Tree};

use crate::errors::ParseError;

pub fn new_python_parser() -> Result<Parser, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| format!("Failed to set language: {e}"))?;
    Ok(parser)
}

/// Parse `source` into a syntax tree, failing on any syntax error.
pub fn parse_python(file_id: &str, source: &str) -> Result<Tree, ParseError> {
    let mut parser = new_python_parser().map_err(|e| ParseError::new(file_id, e))?;
    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| ParseError::new(file_id, "parser returned no tree"))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(match first_error(root) {
            Some(node) => {
                let position = node.start_position();
                ParseError::at(
                    file_id,
                    describe_error(node),
                    position.row + 1,
                    position.column + 1,
                )
            }
            None => ParseError::new(file_id, "invalid syntax"),
        });
    }
    Ok(tree)
}

/// Depth-first search for the first error or missing node, following only
/// subtrees that contain one.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error() || child.is_missing())
        .find_map(first_error)
}

/// UTF-8 text of `node`; empty when the range is not valid UTF-8.
pub fn node_text<'s>(node: Node<'_>, source: &'s [u8]) -> &'s str {
    node.utf8_text(source).unwrap_or("")
}

/// Expression text with all whitespace removed, e.g. `self . helper` -> `self.helper`.
pub fn compact(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

fn describe_error(node: Node<'_>) -> String {
    if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        "invalid syntax".to_string()
    }
}
