//! Import statement extraction and syntactic module-name resolution.
//!
//! Relative imports are resolved against the importing file's package path;
//! nothing is looked up on disk.

use tree_sitter::Node;

use crate::indexer::parser::{compact, node_text as text};
use crate::models::{Import, ImportedName, ObjectId};

/// Build the [`Import`]s of an `import_statement`, `import_from_statement` or
/// `future_import_statement` node. `import a, b` yields one import per module
/// so each is a dependency of its own. Any other node yields nothing.
pub fn imports_from_node(
    node: Node<'_>,
    source: &[u8],
    scope: ObjectId,
    conditional: bool,
) -> Vec<Import> {
    let line = node.start_position().row + 1;
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            node.children_by_field_name("name", &mut cursor)
                .filter_map(|child| dotted_with_alias(child, source))
                .map(|(module, alias)| Import {
                    module,
                    names: Vec::new(),
                    alias,
                    level: 0,
                    line,
                    conditional,
                    scope,
                })
                .collect()
        }
        "import_from_statement" | "future_import_statement" => {
            let module = if node.kind() == "future_import_statement" {
                "__future__".to_string()
            } else {
                node.child_by_field_name("module_name")
                    .map(|m| compact(text(m, source)))
                    .unwrap_or_default()
            };
            let mut names: Vec<ImportedName> = Vec::new();
            let mut cursor = node.walk();
            for child in node.children_by_field_name("name", &mut cursor) {
                if let Some((name, alias)) = dotted_with_alias(child, source) {
                    names.push(ImportedName { name, alias });
                }
            }
            let mut cursor = node.walk();
            let has_wildcard = node
                .named_children(&mut cursor)
                .any(|child| child.kind() == "wildcard_import");
            if has_wildcard {
                names.push(ImportedName {
                    name: "*".to_string(),
                    alias: None,
                });
            }
            vec![Import {
                level: module.chars().take_while(|&c| c == '.').count(),
                module,
                names,
                alias: None,
                line,
                conditional,
                scope,
            }]
        }
        _ => Vec::new(),
    }
}

fn dotted_with_alias(node: Node<'_>, source: &[u8]) -> Option<(String, Option<String>)> {
    match node.kind() {
        "dotted_name" => Some((compact(text(node, source)), None)),
        "aliased_import" => {
            let name = node.child_by_field_name("name")?;
            let alias = node
                .child_by_field_name("alias")
                .map(|a| text(a, source).to_string());
            Some((compact(text(name, source)), alias))
        }
        _ => None,
    }
}

/// Turn a possibly relative dotted name into an absolute one, using the
/// importing file's path. `from ..util import x` in `pkg/sub/mod.py` gives
/// `pkg.util.x`. Absolute names are returned unchanged; a relative name that
/// climbs above the root keeps its leading dots.
pub fn absolute_name(file_id: &str, dotted: &str) -> String {
    let levels = dotted.chars().take_while(|&c| c == '.').count();
    if levels == 0 {
        return dotted.to_string();
    }
    let suffix = &dotted[levels..];
    let normalized = file_id.replace('\\', "/");
    let mut package: Vec<&str> = normalized
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    // Drop the file itself; a package's `__init__.py` is its own package.
    package.pop();
    for _ in 0..levels.saturating_sub(1) {
        if package.pop().is_none() {
            return dotted.to_string();
        }
    }
    let mut parts: Vec<&str> = package;
    if !suffix.is_empty() {
        parts.push(suffix);
    }
    if parts.is_empty() {
        return dotted.to_string();
    }
    parts.join(".")
}
