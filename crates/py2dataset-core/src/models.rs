//! Shared typed models used across extraction, graph building, answering and
//! dataset assembly.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Qualified name of the module object every [`CodeModel`] starts with.
pub const MODULE_QUALIFIED_NAME: &str = "<module>";

// ---------------------------------------------------------------------------
// Input port
// ---------------------------------------------------------------------------

/// One discovered source file: a stable identifier plus its raw text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub id: String,
    pub source: String,
}

impl SourceFile {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Code objects
// ---------------------------------------------------------------------------

/// Index of a [`CodeObject`] inside its model's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Module,
    Class,
    Function,
    Method,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Module => "module",
            ObjectKind::Class => "class",
            ObjectKind::Function => "function",
            ObjectKind::Method => "method",
        }
    }

    pub fn is_callable(self) -> bool {
        matches!(self, ObjectKind::Function | ObjectKind::Method)
    }
}

/// Source location; lines are 1-based and inclusive, bytes are a half-open range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub default: Option<String>,
    pub annotation: Option<String>,
    pub kind: ParamKind,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            default: None,
            annotation: None,
            kind,
        }
    }

    /// Name as it is spelled in a signature: `*args`, `**kwargs` or `x`.
    pub fn display_name(&self) -> String {
        match self.kind {
            ParamKind::VarPositional => format!("*{}", self.name),
            ParamKind::VarKeyword => format!("**{}", self.name),
            _ => self.name.clone(),
        }
    }
}

/// A call expression found in an object's body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Callee expression text with whitespace removed, e.g. `self.helper`.
    pub callee: String,
    pub arg_count: usize,
    pub line: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameAccess {
    Read,
    Write,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
    pub access: NameAccess,
}

/// Shape of the assignment target a variable was bound through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// `x = 1`
    Simple,
    /// `a, b = pair`
    Unpacked,
    /// `a = b = 0`
    Chained,
    /// `first, *rest = items`
    Starred,
    /// `x: int = 1` or a bare `x: int`
    Annotated,
    /// `x += 1`
    Augmented,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: Option<String>,
    pub annotation: Option<String>,
    pub target: TargetKind,
    pub line: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassData {
    /// Base expressions in declaration order.
    pub bases: Vec<String>,
    /// Keyword arguments of the class statement, e.g. `metaclass=ABCMeta`.
    pub keywords: Vec<String>,
    /// Assignments made directly in the class body.
    pub attributes: Vec<Variable>,
    /// Names assigned through `self.<name>` inside methods.
    pub instance_attributes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionData {
    pub is_async: bool,
    /// Text of every `return <expr>` in declaration order.
    pub returns: Vec<String>,
    pub variables: Vec<Variable>,
}

/// Kind-specific payload of a [`CodeObject`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectPayload {
    Module,
    Class(ClassData),
    Function(FunctionData),
    Method(FunctionData),
}

/// A named unit of source structure. Children are owned through the arena;
/// `parent` is a lookup key, never a pointer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeObject {
    pub name: String,
    pub qualified_name: String,
    pub docstring: Option<String>,
    pub span: Span,
    pub decorators: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub return_annotation: Option<String>,
    pub calls: Vec<CallSite>,
    pub references: Vec<NameRef>,
    pub children: Vec<ObjectId>,
    pub parent: Option<ObjectId>,
    pub depth: usize,
    pub payload: ObjectPayload,
}

impl CodeObject {
    pub fn kind(&self) -> ObjectKind {
        match self.payload {
            ObjectPayload::Module => ObjectKind::Module,
            ObjectPayload::Class(_) => ObjectKind::Class,
            ObjectPayload::Function(_) => ObjectKind::Function,
            ObjectPayload::Method(_) => ObjectKind::Method,
        }
    }

    pub fn as_class(&self) -> Option<&ClassData> {
        match &self.payload {
            ObjectPayload::Class(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.payload {
            ObjectPayload::Function(data) | ObjectPayload::Method(data) => Some(data),
            _ => None,
        }
    }

    pub fn reads(&self) -> impl Iterator<Item = &str> {
        self.names_with(NameAccess::Read)
    }

    pub fn writes(&self) -> impl Iterator<Item = &str> {
        self.names_with(NameAccess::Write)
    }

    fn names_with(&self, access: NameAccess) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .filter(move |r| r.access == access)
            .map(|r| r.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Imports and statements
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

/// One `import` / `from ... import` statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Module text as written, including leading dots for relative imports.
    pub module: String,
    /// Names of a `from` import; empty for a plain `import module`.
    pub names: Vec<ImportedName>,
    pub alias: Option<String>,
    /// Number of leading dots of a relative import.
    pub level: usize,
    pub line: usize,
    /// True when the statement sits inside a function, class or compound statement.
    pub conditional: bool,
    pub scope: ObjectId,
}

impl Import {
    pub fn is_from(&self) -> bool {
        !self.names.is_empty()
    }

    /// Dotted names this statement binds, as written: `os.path` or `pkg.mod.name`.
    pub fn targets(&self) -> Vec<String> {
        if self.names.is_empty() {
            return vec![self.module.clone()];
        }
        self.names
            .iter()
            .map(|imported| {
                if self.module.ends_with('.') {
                    format!("{}{}", self.module, imported.name)
                } else {
                    format!("{}.{}", self.module, imported.name)
                }
            })
            .collect()
    }
}

/// A top-level statement of the module, kept for ordering and spans.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: String,
    pub span: Span,
}

// ---------------------------------------------------------------------------
// CodeModel
// ---------------------------------------------------------------------------

/// Normalized structural representation of one source file.
///
/// The module object is always at index 0; the remaining objects follow in
/// source (pre-)order, so a parent always precedes its children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeModel {
    pub file_id: String,
    pub source: String,
    pub statements: Vec<Statement>,
    pub objects: IndexMap<String, CodeObject>,
    pub variables: Vec<Variable>,
    pub imports: Vec<Import>,
    pub docstring: Option<String>,
}

impl CodeModel {
    pub fn module_id(&self) -> ObjectId {
        ObjectId(0)
    }

    pub fn module(&self) -> &CodeObject {
        &self.objects[0]
    }

    pub fn get(&self, id: ObjectId) -> Option<&CodeObject> {
        self.objects.get_index(id.0).map(|(_, object)| object)
    }

    pub fn id_of(&self, qualified_name: &str) -> Option<ObjectId> {
        self.objects.get_index_of(qualified_name).map(ObjectId)
    }

    pub fn by_name(&self, qualified_name: &str) -> Option<&CodeObject> {
        self.objects.get(qualified_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &CodeObject)> {
        self.objects
            .values()
            .enumerate()
            .map(|(index, object)| (ObjectId(index), object))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn parent_of(&self, id: ObjectId) -> Option<&CodeObject> {
        self.get(id)?.parent.and_then(|parent| self.get(parent))
    }

    pub fn children_of(&self, id: ObjectId) -> impl Iterator<Item = &CodeObject> {
        self.get(id)
            .map(|object| object.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|child| self.get(*child))
    }

    /// Every object nested under `id` at any depth, in source order.
    pub fn descendants_of(&self, id: ObjectId) -> Vec<&CodeObject> {
        let mut found = Vec::new();
        let mut pending: Vec<&CodeObject> = self.children_of(id).collect();
        pending.reverse();
        while let Some(object) = pending.pop() {
            found.push(object);
            let mut children: Vec<&CodeObject> = object
                .children
                .iter()
                .filter_map(|child| self.get(*child))
                .collect();
            children.reverse();
            pending.extend(children);
        }
        found
    }

    /// Nearest enclosing class of `id`, the object itself included.
    pub fn enclosing_class(&self, id: ObjectId) -> Option<ObjectId> {
        let mut current = Some(id);
        while let Some(cursor) = current {
            let object = self.get(cursor)?;
            if object.kind() == ObjectKind::Class {
                return Some(cursor);
            }
            current = object.parent;
        }
        None
    }

    /// Source text covered by the object's span.
    pub fn source_of(&self, object: &CodeObject) -> &str {
        self.source
            .get(object.span.start_byte..object.span.end_byte)
            .unwrap_or("")
    }

    /// Direct children of the module with the given kind, in source order.
    pub fn top_level(&self, kind: ObjectKind) -> impl Iterator<Item = &CodeObject> {
        self.children_of(self.module_id())
            .filter(move |object| object.kind() == kind)
    }

    /// Module-level names spelled in upper case.
    pub fn constants(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|variable| is_constant_name(&variable.name))
    }

    /// Imported module names in declaration order, without duplicates.
    pub fn dependencies(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for import in &self.imports {
            if !seen.contains(&import.module) {
                seen.push(import.module.clone());
            }
        }
        seen
    }
}

/// `MAX_SIZE`, `_DEFAULT_TIMEOUT`: at least one letter and no lower case.
pub fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Order-preserving dedup used by list answers and extraction.
pub fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(module: &str, names: &[&str]) -> Import {
        Import {
            module: module.to_string(),
            names: names
                .iter()
                .map(|n| ImportedName {
                    name: n.to_string(),
                    alias: None,
                })
                .collect(),
            alias: None,
            level: module.chars().take_while(|&c| c == '.').count(),
            line: 1,
            conditional: false,
            scope: ObjectId(0),
        }
    }

    #[test]
    fn test_import_targets_plain() {
        assert_eq!(import("os.path", &[]).targets(), vec!["os.path"]);
    }

    #[test]
    fn test_import_targets_from() {
        assert_eq!(
            import("typing", &["Dict", "List"]).targets(),
            vec!["typing.Dict", "typing.List"]
        );
    }

    #[test]
    fn test_import_targets_relative_package() {
        assert_eq!(import(".", &["sibling"]).targets(), vec![".sibling"]);
        assert_eq!(import("..pkg", &["name"]).targets(), vec!["..pkg.name"]);
    }

    #[test]
    fn test_is_constant_name() {
        assert!(is_constant_name("MAX_SIZE"));
        assert!(is_constant_name("_PRIVATE_2"));
        assert!(!is_constant_name("max_size"));
        assert!(!is_constant_name("__"));
        assert!(!is_constant_name("Mixed"));
    }

    #[test]
    fn test_parameter_display_name() {
        assert_eq!(Parameter::new("args", ParamKind::VarPositional).display_name(), "*args");
        assert_eq!(Parameter::new("kw", ParamKind::VarKeyword).display_name(), "**kw");
        assert_eq!(Parameter::new("x", ParamKind::KeywordOnly).display_name(), "x");
    }

    #[test]
    fn test_push_unique_preserves_order() {
        let mut list = Vec::new();
        for value in ["b", "a", "b", "c", "a"] {
            push_unique(&mut list, value);
        }
        assert_eq!(list, vec!["b", "a", "c"]);
    }
}
