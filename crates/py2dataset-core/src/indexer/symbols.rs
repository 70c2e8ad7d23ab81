//! Structural extraction: Python source text to a [`CodeModel`].
//!
//! The syntax tree is walked once. Every `def` and `class` becomes a
//! [`CodeObject`] inserted in pre-order, so a parent always precedes its
//! children in the arena. Facts found in a body (calls, name references,
//! assignments, returns) belong to the innermost enclosing definition; the
//! bodies of nested definitions are not part of their parent, but their
//! decorators, parameter defaults and base classes are, since those are
//! evaluated where the definition statement runs.

use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use tree_sitter::Node;

use crate::errors::ParseError;
use crate::indexer::imports::imports_from_node;
use crate::indexer::parser::{compact, node_text, parse_python};
use crate::models::{
    push_unique, CallSite, ClassData, CodeModel, CodeObject, FunctionData, Import, NameAccess,
    NameRef, ObjectId, ObjectKind, ObjectPayload, ParamKind, Parameter, Span, Statement,
    TargetKind, Variable, MODULE_QUALIFIED_NAME,
};

/// Statements whose bodies only run on some paths.
const COMPOUND_STATEMENTS: &[&str] = &[
    "if_statement",
    "for_statement",
    "while_statement",
    "try_statement",
    "with_statement",
    "match_statement",
];

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Convert a file path to a dotted module name.
///
/// Strips the file extension and joins path components with dots,
/// skipping any leading `/` or `.` segments.
pub fn to_module_name(path: &str) -> String {
    let p = Path::new(path);
    let without_ext = p.with_extension("");
    let parts: Vec<&str> = without_ext
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    parts.join(".")
}

fn span_of(node: Node<'_>) -> Span {
    Span {
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
    }
}

fn argument_count(arguments: Node<'_>) -> usize {
    if arguments.kind() == "generator_expression" {
        return 1;
    }
    let mut cursor = arguments.walk();
    arguments
        .named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .count()
}

/// Contents of a string literal without its prefix and quotes. Escapes are
/// left as written.
fn string_value(raw: &str) -> String {
    let body = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return body[quote.len()..body.len() - quote.len()].to_string();
        }
    }
    body.to_string()
}

/// Normalize docstring indentation: the first line is stripped, the common
/// indentation of the remaining lines is removed and blank lines at either
/// end are dropped.
pub fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            if index == 0 {
                line.trim_start()
            } else {
                strip_columns(line, indent)
            }
        })
        .collect();
    while cleaned.last().is_some_and(|line| line.trim().is_empty()) {
        cleaned.pop();
    }
    let first = cleaned
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(cleaned.len());
    cleaned[first..].join("\n")
}

/// `line` without its first `columns` characters, stopping at the first
/// non-whitespace one.
fn strip_columns(line: &str, columns: usize) -> &str {
    let start = line
        .char_indices()
        .take(columns)
        .find(|(_, c)| !c.is_whitespace())
        .map(|(index, _)| index)
        .unwrap_or_else(|| {
            line.char_indices()
                .nth(columns)
                .map_or(line.len(), |(index, _)| index)
        });
    &line[start..]
}

/// Docstring of a module root or a definition body: a string literal that is
/// the first statement.
fn docstring_of(block: Node<'_>, source: &[u8]) -> Option<String> {
    let mut cursor = block.walk();
    let first = block
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expression = first.named_child(0)?;
    let raw = match expression.kind() {
        "string" => string_value(node_text(expression, source)),
        "concatenated_string" => {
            let mut cursor = expression.walk();
            expression
                .named_children(&mut cursor)
                .filter(|part| part.kind() == "string")
                .map(|part| string_value(node_text(part, source)))
                .collect::<String>()
        }
        _ => return None,
    };
    let cleaned = clean_docstring(&raw);
    (!cleaned.is_empty()).then_some(cleaned)
}

// ---------------------------------------------------------------------------
// Walk state
// ---------------------------------------------------------------------------

/// Everything collected from one definition's own body.
#[derive(Default)]
struct Facts {
    calls: Vec<CallSite>,
    references: IndexSet<NameRef>,
    variables: Vec<Variable>,
    returns: Vec<String>,
    instance_attributes: Vec<String>,
}

impl Facts {
    fn reference(&mut self, name: &str, access: NameAccess) {
        self.references.insert(NameRef {
            name: name.to_string(),
            access,
        });
    }
}

/// Where the walk currently is.
#[derive(Clone)]
struct Scope {
    id: ObjectId,
    /// Inside a nested definition or a compound statement.
    conditional: bool,
    /// Name bound to the instance in a method (`self` by convention).
    self_name: Option<String>,
}

impl Scope {
    fn module() -> Self {
        Self {
            id: ObjectId(0),
            conditional: false,
            self_name: None,
        }
    }

    fn branch(&self) -> Self {
        Self {
            conditional: true,
            ..self.clone()
        }
    }
}

/// How an assignment binds its targets.
#[derive(Clone, Copy)]
struct Binding<'a> {
    value: Option<&'a str>,
    annotation: Option<&'a str>,
    chained: bool,
    line: usize,
}

struct ModelBuilder<'s> {
    bytes: &'s [u8],
    objects: IndexMap<String, CodeObject>,
    imports: Vec<Import>,
}

impl<'s> ModelBuilder<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        node_text(node, self.bytes)
    }

    fn unique_name(&self, base: String) -> String {
        if !self.objects.contains_key(&base) {
            return base;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}#{suffix}");
            if !self.objects.contains_key(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    fn visit_children(&mut self, node: Node<'_>, facts: &mut Facts, scope: &Scope) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child, facts, scope);
        }
    }

    fn visit(&mut self, node: Node<'_>, facts: &mut Facts, scope: &Scope) {
        match node.kind() {
            "comment" | "global_statement" | "nonlocal_statement" => {}
            "function_definition" | "class_definition" => {
                self.define(node, Vec::new(), facts, scope);
            }
            "decorated_definition" => {
                let mut decorators = Vec::new();
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if child.kind() != "decorator" {
                        continue;
                    }
                    let mut inner = child.walk();
                    let expression = child
                        .named_children(&mut inner)
                        .find(|part| part.kind() != "comment");
                    if let Some(expression) = expression {
                        decorators.push(self.text(expression).trim().to_string());
                        self.visit(expression, facts, scope);
                    }
                }
                if let Some(definition) = node.child_by_field_name("definition") {
                    self.define(definition, decorators, facts, scope);
                }
            }
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                let imports = imports_from_node(node, self.bytes, scope.id, scope.conditional);
                self.imports.extend(imports);
            }
            "call" => {
                if let Some(function) = node.child_by_field_name("function") {
                    facts.calls.push(CallSite {
                        callee: compact(self.text(function)),
                        arg_count: node
                            .child_by_field_name("arguments")
                            .map(argument_count)
                            .unwrap_or(0),
                        line: node.start_position().row + 1,
                    });
                }
                self.visit_children(node, facts, scope);
            }
            "identifier" => facts.reference(self.text(node), NameAccess::Read),
            "attribute" => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.visit(object, facts, scope);
                }
            }
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value, facts, scope);
                }
            }
            "lambda" => {
                if let Some(body) = node.child_by_field_name("body") {
                    self.visit(body, facts, scope);
                }
            }
            "named_expression" => {
                if let Some(name) = node.child_by_field_name("name") {
                    facts.reference(self.text(name), NameAccess::Write);
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value, facts, scope);
                }
            }
            "as_pattern" => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if child.kind() == "as_pattern_target" {
                        self.bind_names(child, facts, scope);
                    } else {
                        self.visit(child, facts, scope);
                    }
                }
            }
            "assignment" => self.assignment(node, facts, scope),
            "augmented_assignment" => self.augmented_assignment(node, facts, scope),
            "return_statement" => {
                let mut cursor = node.walk();
                if let Some(value) = node
                    .named_children(&mut cursor)
                    .find(|child| child.kind() != "comment")
                {
                    facts.returns.push(self.text(value).to_string());
                }
                self.visit_children(node, facts, scope);
            }
            "for_statement" | "for_in_clause" => {
                let inner = if node.kind() == "for_statement" {
                    scope.branch()
                } else {
                    scope.clone()
                };
                if let Some(left) = node.child_by_field_name("left") {
                    self.bind_names(left, facts, &inner);
                }
                let mut cursor = node.walk();
                let rights: Vec<Node<'_>> = node.children_by_field_name("right", &mut cursor).collect();
                for right in rights {
                    self.visit(right, facts, &inner);
                }
                for field in ["body", "alternative"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        self.visit(child, facts, &inner);
                    }
                }
            }
            kind if COMPOUND_STATEMENTS.contains(&kind) => {
                let inner = scope.branch();
                self.visit_children(node, facts, &inner);
            }
            _ => self.visit_children(node, facts, scope),
        }
    }

    /// Record the names bound by a loop or `as` target as writes.
    fn bind_names(&mut self, target: Node<'_>, facts: &mut Facts, scope: &Scope) {
        match target.kind() {
            "identifier" => facts.reference(self.text(target), NameAccess::Write),
            "as_pattern_target" if target.named_child_count() == 0 => {
                facts.reference(self.text(target), NameAccess::Write)
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern"
            | "as_pattern_target" | "tuple" | "list" | "parenthesized_expression" => {
                let mut cursor = target.walk();
                for child in target.named_children(&mut cursor) {
                    self.bind_names(child, facts, scope);
                }
            }
            _ => self.visit(target, facts, scope),
        }
    }

    fn assignment(&mut self, node: Node<'_>, facts: &mut Facts, scope: &Scope) {
        let annotation = node.child_by_field_name("type").map(|t| self.text(t));
        let mut targets = Vec::new();
        let mut current = node;
        let value = loop {
            if let Some(left) = current.child_by_field_name("left") {
                targets.push(left);
            }
            match current.child_by_field_name("right") {
                Some(right) if right.kind() == "assignment" => current = right,
                other => break other,
            }
        };

        if let Some(value) = value {
            self.visit(value, facts, scope);
        }
        let binding = Binding {
            value: value.map(|v| self.text(v)),
            annotation,
            chained: targets.len() > 1,
            line: node.start_position().row + 1,
        };
        for target in targets {
            let kind = if binding.chained {
                TargetKind::Chained
            } else if binding.annotation.is_some() {
                TargetKind::Annotated
            } else {
                TargetKind::Simple
            };
            self.bind_target(target, kind, binding, facts, scope);
        }
    }

    fn augmented_assignment(&mut self, node: Node<'_>, facts: &mut Facts, scope: &Scope) {
        let value = node.child_by_field_name("right");
        if let Some(value) = value {
            self.visit(value, facts, scope);
        }
        if let Some(left) = node.child_by_field_name("left") {
            if left.kind() == "identifier" {
                facts.reference(self.text(left), NameAccess::Read);
            }
            let binding = Binding {
                value: value.map(|v| self.text(v)),
                annotation: None,
                chained: false,
                line: node.start_position().row + 1,
            };
            self.bind_target(left, TargetKind::Augmented, binding, facts, scope);
        }
    }

    fn bind_target(
        &mut self,
        target: Node<'_>,
        kind: TargetKind,
        binding: Binding<'_>,
        facts: &mut Facts,
        scope: &Scope,
    ) {
        match target.kind() {
            "identifier" => {
                let name = self.text(target);
                facts.reference(name, NameAccess::Write);
                facts.variables.push(Variable {
                    name: name.to_string(),
                    value: binding.value.map(str::to_string),
                    annotation: binding.annotation.map(str::to_string),
                    target: kind,
                    line: binding.line,
                });
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "parenthesized_expression" => {
                let element_kind = if binding.chained {
                    TargetKind::Chained
                } else {
                    TargetKind::Unpacked
                };
                let mut cursor = target.walk();
                for child in target.named_children(&mut cursor) {
                    self.bind_target(child, element_kind, binding, facts, scope);
                }
            }
            "list_splat_pattern" | "list_splat" => {
                let mut cursor = target.walk();
                for child in target.named_children(&mut cursor) {
                    self.bind_target(child, TargetKind::Starred, binding, facts, scope);
                }
            }
            "attribute" => {
                let object = target.child_by_field_name("object");
                let attribute = target.child_by_field_name("attribute");
                if let (Some(object), Some(attribute), Some(self_name)) =
                    (object, attribute, scope.self_name.as_deref())
                {
                    if object.kind() == "identifier" && self.text(object) == self_name {
                        push_unique(&mut facts.instance_attributes, self.text(attribute));
                    }
                }
                self.visit(target, facts, scope);
            }
            _ => self.visit(target, facts, scope),
        }
    }

    fn parameters(&self, node: Option<Node<'_>>) -> Vec<Parameter> {
        let Some(node) = node else {
            return Vec::new();
        };
        let mut parameters: Vec<Parameter> = Vec::new();
        let mut keyword_only = false;
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "comment" => {}
                "positional_separator" => {
                    for parameter in parameters.iter_mut() {
                        if parameter.kind == ParamKind::PositionalOrKeyword {
                            parameter.kind = ParamKind::PositionalOnly;
                        }
                    }
                }
                "keyword_separator" => keyword_only = true,
                _ => {
                    if let Some(parameter) = self.parameter(child, keyword_only) {
                        if parameter.kind == ParamKind::VarPositional {
                            keyword_only = true;
                        }
                        parameters.push(parameter);
                    }
                }
            }
        }
        parameters
    }

    fn parameter(&self, node: Node<'_>, keyword_only: bool) -> Option<Parameter> {
        let plain = if keyword_only {
            ParamKind::KeywordOnly
        } else {
            ParamKind::PositionalOrKeyword
        };
        let field = |name: &str| node.child_by_field_name(name).map(|n| self.text(n).to_string());
        let splat_name = |splat: Node<'_>| splat.named_child(0).map(|n| self.text(n).to_string());

        let parameter = match node.kind() {
            "identifier" => Parameter::new(self.text(node), plain),
            "list_splat_pattern" => Parameter::new(splat_name(node)?, ParamKind::VarPositional),
            "dictionary_splat_pattern" => Parameter::new(splat_name(node)?, ParamKind::VarKeyword),
            "default_parameter" => Parameter {
                default: field("value"),
                ..Parameter::new(field("name")?, plain)
            },
            "typed_default_parameter" => Parameter {
                default: field("value"),
                annotation: field("type"),
                ..Parameter::new(field("name")?, plain)
            },
            "typed_parameter" => {
                let inner = node.named_child(0)?;
                let base = match inner.kind() {
                    "list_splat_pattern" => {
                        Parameter::new(splat_name(inner)?, ParamKind::VarPositional)
                    }
                    "dictionary_splat_pattern" => {
                        Parameter::new(splat_name(inner)?, ParamKind::VarKeyword)
                    }
                    _ => Parameter::new(self.text(inner), plain),
                };
                Parameter {
                    annotation: field("type"),
                    ..base
                }
            }
            _ => return None,
        };
        Some(parameter)
    }

    /// Parameter defaults run in the scope that executes the `def`.
    fn visit_defaults(&mut self, parameters: Node<'_>, facts: &mut Facts, scope: &Scope) {
        let mut cursor = parameters.walk();
        for child in parameters.named_children(&mut cursor) {
            if matches!(child.kind(), "default_parameter" | "typed_default_parameter") {
                if let Some(value) = child.child_by_field_name("value") {
                    self.visit(value, facts, scope);
                }
            }
        }
    }

    fn define(
        &mut self,
        node: Node<'_>,
        decorators: Vec<String>,
        enclosing: &mut Facts,
        scope: &Scope,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let Some((parent_name, parent_kind, parent_depth)) = self
            .objects
            .get_index(scope.id.0)
            .map(|(_, parent)| (parent.qualified_name.clone(), parent.kind(), parent.depth))
        else {
            return;
        };
        let is_class = node.kind() == "class_definition";

        let parameter_node = node.child_by_field_name("parameters");
        let parameters = self.parameters(parameter_node);
        if let Some(parameter_node) = parameter_node {
            self.visit_defaults(parameter_node, enclosing, scope);
        }

        let mut class_data = ClassData::default();
        if let Some(arguments) = node.child_by_field_name("superclasses") {
            let mut cursor = arguments.walk();
            for argument in arguments.named_children(&mut cursor) {
                match argument.kind() {
                    "comment" => {}
                    "keyword_argument" => class_data.keywords.push(compact(self.text(argument))),
                    _ => class_data.bases.push(compact(self.text(argument))),
                }
            }
            self.visit(arguments, enclosing, scope);
        }

        let self_name = if !is_class
            && parent_kind == ObjectKind::Class
            && !decorators
                .iter()
                .any(|d| d == "staticmethod" || d == "classmethod")
        {
            parameters
                .first()
                .filter(|p| matches!(p.kind, ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword))
                .map(|p| p.name.clone())
        } else {
            None
        };

        let payload = if is_class {
            ObjectPayload::Class(class_data)
        } else {
            let data = FunctionData {
                is_async: node.child(0).is_some_and(|first| first.kind() == "async"),
                ..FunctionData::default()
            };
            if parent_kind == ObjectKind::Class {
                ObjectPayload::Method(data)
            } else {
                ObjectPayload::Function(data)
            }
        };

        let qualified_name = self.unique_name(if parent_kind == ObjectKind::Module {
            name.clone()
        } else {
            format!("{parent_name}.{name}")
        });
        let body = node.child_by_field_name("body");
        let object = CodeObject {
            name,
            qualified_name: qualified_name.clone(),
            docstring: body.and_then(|b| docstring_of(b, self.bytes)),
            span: span_of(node),
            decorators,
            parameters,
            return_annotation: node
                .child_by_field_name("return_type")
                .map(|r| self.text(r).to_string()),
            calls: Vec::new(),
            references: Vec::new(),
            children: Vec::new(),
            parent: Some(scope.id),
            depth: parent_depth + 1,
            payload,
        };
        let (index, _) = self.objects.insert_full(qualified_name, object);
        let id = ObjectId(index);
        if let Some((_, parent)) = self.objects.get_index_mut(scope.id.0) {
            parent.children.push(id);
        }

        let inner = Scope {
            id,
            conditional: true,
            self_name,
        };
        let mut facts = Facts::default();
        if let Some(body) = body {
            self.visit_children(body, &mut facts, &inner);
        }

        let Facts {
            calls,
            references,
            variables,
            returns,
            instance_attributes,
        } = facts;
        if let Some((_, object)) = self.objects.get_index_mut(index) {
            object.calls = calls;
            object.references = references.into_iter().collect();
            match &mut object.payload {
                ObjectPayload::Class(data) => data.attributes = variables,
                ObjectPayload::Function(data) | ObjectPayload::Method(data) => {
                    data.variables = variables;
                    data.returns = returns;
                }
                ObjectPayload::Module => {}
            }
        }
        if !instance_attributes.is_empty() {
            if let Some((_, owner)) = self.objects.get_index_mut(scope.id.0) {
                if let ObjectPayload::Class(data) = &mut owner.payload {
                    for attribute in &instance_attributes {
                        push_unique(&mut data.instance_attributes, attribute);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Extract the [`CodeModel`] of one file. Fails with the position of the
/// first syntax error; a partial model is never returned.
pub fn extract(file_id: &str, source: &str) -> Result<CodeModel, ParseError> {
    let tree = parse_python(file_id, source)?;
    let root = tree.root_node();
    let bytes = source.as_bytes();

    let docstring = docstring_of(root, bytes);
    let mut builder = ModelBuilder {
        bytes,
        objects: IndexMap::new(),
        imports: Vec::new(),
    };
    builder.objects.insert(
        MODULE_QUALIFIED_NAME.to_string(),
        CodeObject {
            name: to_module_name(file_id),
            qualified_name: MODULE_QUALIFIED_NAME.to_string(),
            docstring: docstring.clone(),
            span: Span {
                start_line: 1,
                end_line: source.lines().count().max(1),
                start_byte: 0,
                end_byte: source.len(),
            },
            decorators: Vec::new(),
            parameters: Vec::new(),
            return_annotation: None,
            calls: Vec::new(),
            references: Vec::new(),
            children: Vec::new(),
            parent: None,
            depth: 0,
            payload: ObjectPayload::Module,
        },
    );

    let scope = Scope::module();
    let mut facts = Facts::default();
    let mut statements = Vec::new();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() == "comment" {
            continue;
        }
        statements.push(Statement {
            kind: child.kind().to_string(),
            span: span_of(child),
        });
        builder.visit(child, &mut facts, &scope);
    }

    let ModelBuilder {
        mut objects,
        imports,
        ..
    } = builder;
    if let Some((_, module)) = objects.get_index_mut(0) {
        module.calls = facts.calls;
        module.references = facts.references.into_iter().collect();
    }

    Ok(CodeModel {
        file_id: file_id.to_string(),
        source: source.to_string(),
        statements,
        objects,
        variables: facts.variables,
        imports,
        docstring,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn object<'m>(model: &'m CodeModel, qualified_name: &str) -> &'m CodeObject {
        model
            .by_name(qualified_name)
            .unwrap_or_else(|| panic!("missing {qualified_name}"))
    }

    fn callees(object: &CodeObject) -> Vec<&str> {
        object.calls.iter().map(|c| c.callee.as_str()).collect()
    }

    // -- Helper tests -------------------------------------------------------

    #[test]
    fn test_to_module_name_simple() {
        assert_eq!(to_module_name("src/pkg/indexer/symbols.py"), "src.pkg.indexer.symbols");
    }

    #[test]
    fn test_to_module_name_no_extension() {
        assert_eq!(to_module_name("foo/bar/baz"), "foo.bar.baz");
    }

    #[test]
    fn test_clean_docstring_dedents() {
        let raw = "Summary line.\n\n    Details here.\n    ";
        assert_eq!(clean_docstring(raw), "Summary line.\n\nDetails here.");
    }

    #[test]
    fn test_clean_docstring_counts_indent_in_characters() {
        let raw = "Summary\n    a\n\u{3000}\u{3000}b\n";
        assert_eq!(clean_docstring(raw), "Summary\n  a\nb");
    }

    #[test]
    fn test_string_value_strips_prefix_and_quotes() {
        assert_eq!(string_value("r'''raw'''"), "raw");
        assert_eq!(string_value("\"plain\""), "plain");
    }

    // -- Extraction tests ---------------------------------------------------

    #[test]
    fn test_extract_empty_file() {
        let model = extract("empty.py", "").unwrap();
        assert_eq!(model.len(), 1);
        assert_eq!(model.module().qualified_name, MODULE_QUALIFIED_NAME);
        assert_eq!(model.module().name, "empty");
        assert!(model.imports.is_empty());
        assert!(model.statements.is_empty());
        assert!(model.docstring.is_none());
    }

    #[test]
    fn test_extract_rejects_syntax_error() {
        let err = extract("bad.py", "def ok():\n    pass\n\nclass (:\n").unwrap_err();
        assert_eq!(err.file, "bad.py");
        assert!(err.line.is_some());
    }

    #[test]
    fn test_extract_nesting_and_kinds() {
        let source = "\
class Shape:
    def area(self):
        def helper():
            return 1
        return helper()

def main():
    pass
";
        let model = extract("shapes.py", source).unwrap();
        let names: Vec<&str> = model.objects.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["<module>", "Shape", "Shape.area", "Shape.area.helper", "main"]
        );
        assert_eq!(object(&model, "Shape").kind(), ObjectKind::Class);
        assert_eq!(object(&model, "Shape.area").kind(), ObjectKind::Method);
        assert_eq!(object(&model, "Shape.area.helper").kind(), ObjectKind::Function);
        assert_eq!(object(&model, "Shape.area.helper").depth, 3);

        let area_id = model.id_of("Shape.area").unwrap();
        let helper = object(&model, "Shape.area.helper");
        assert_eq!(helper.parent, Some(area_id));
        assert_eq!(object(&model, "Shape.area").children.len(), 1);
        assert_eq!(object(&model, "Shape.area").span.start_line, 2);
    }

    #[test]
    fn test_extract_parameter_kinds() {
        let source = "def f(a, b=1, /, c: int = 2, *args, d, e=3, **kw) -> str:\n    pass\n";
        let model = extract("params.py", source).unwrap();
        let f = object(&model, "f");
        let kinds: Vec<(&str, ParamKind)> =
            f.parameters.iter().map(|p| (p.name.as_str(), p.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a", ParamKind::PositionalOnly),
                ("b", ParamKind::PositionalOnly),
                ("c", ParamKind::PositionalOrKeyword),
                ("args", ParamKind::VarPositional),
                ("d", ParamKind::KeywordOnly),
                ("e", ParamKind::KeywordOnly),
                ("kw", ParamKind::VarKeyword),
            ]
        );
        assert_eq!(f.parameters[1].default.as_deref(), Some("1"));
        assert_eq!(f.parameters[2].annotation.as_deref(), Some("int"));
        assert_eq!(f.parameters[2].default.as_deref(), Some("2"));
        assert_eq!(f.return_annotation.as_deref(), Some("str"));
    }

    #[test]
    fn test_extract_bare_star_makes_keyword_only() {
        let model = extract("kw.py", "def g(a, *, b, **rest):\n    pass\n").unwrap();
        let g = object(&model, "g");
        assert_eq!(g.parameters.len(), 3);
        assert_eq!(g.parameters[0].kind, ParamKind::PositionalOrKeyword);
        assert_eq!(g.parameters[1].kind, ParamKind::KeywordOnly);
        assert_eq!(g.parameters[2].display_name(), "**rest");
    }

    #[test]
    fn test_extract_decorators_belong_to_enclosing_scope() {
        let source = "\
@app.route(\"/x\")
@cached
def view():
    return render()
";
        let model = extract("views.py", source).unwrap();
        let view = object(&model, "view");
        assert_eq!(view.decorators, vec!["app.route(\"/x\")", "cached"]);
        assert_eq!(callees(view), vec!["render"]);
        assert_eq!(callees(model.module()), vec!["app.route"]);
    }

    #[test]
    fn test_extract_calls_exclude_nested_bodies() {
        let source = "\
def outer(items):
    helper()
    def inner():
        other()
    return [g(x) for x in items if h(x)]
";
        let model = extract("calls.py", source).unwrap();
        assert_eq!(callees(object(&model, "outer")), vec!["helper", "g", "h"]);
        assert_eq!(callees(object(&model, "outer.inner")), vec!["other"]);
    }

    #[test]
    fn test_extract_calls_in_handlers_loops_and_lambdas() {
        let source = "\
def run(jobs):
    try:
        start(len(jobs))
    except ValueError as err:
        report(err)
    while pending():
        key = lambda j: priority(j)
    with open_session() as session:
        session.flush()
";
        let model = extract("run.py", source).unwrap();
        let run = object(&model, "run");
        assert_eq!(
            callees(run),
            vec!["start", "len", "report", "pending", "priority", "open_session", "session.flush"]
        );
        assert_eq!(run.calls[0].arg_count, 1);
        assert_eq!(run.calls[0].line, 3);
        assert!(run.writes().any(|name| name == "session"));
        assert!(run.reads().any(|name| name == "jobs"));
    }

    #[test]
    fn test_extract_assignment_target_kinds() {
        let source = "\
def f(pair, items):
    a = b = 0
    x, y = pair
    first, *rest = items
    z: int = 1
    a += 2
";
        let model = extract("assign.py", source).unwrap();
        let data = object(&model, "f").as_function().unwrap();
        let kinds: Vec<(&str, TargetKind)> = data
            .variables
            .iter()
            .map(|v| (v.name.as_str(), v.target))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a", TargetKind::Chained),
                ("b", TargetKind::Chained),
                ("x", TargetKind::Unpacked),
                ("y", TargetKind::Unpacked),
                ("first", TargetKind::Unpacked),
                ("rest", TargetKind::Starred),
                ("z", TargetKind::Annotated),
                ("a", TargetKind::Augmented),
            ]
        );
        assert_eq!(data.variables[0].value.as_deref(), Some("0"));
        assert_eq!(data.variables[6].annotation.as_deref(), Some("int"));
    }

    #[test]
    fn test_extract_class_payload() {
        let source = "\
class Child(Base, mixins.Mixin, metaclass=ABCMeta):
    kind = \"child\"

    def __init__(self, size):
        self.size = size
        self.count = 0

    def grow(self):
        self.count += 1
        self.extra = helper(self.size)

    @staticmethod
    def make(other):
        other.ignored = 1
";
        let model = extract("child.py", source).unwrap();
        let data = object(&model, "Child").as_class().unwrap();
        assert_eq!(data.bases, vec!["Base", "mixins.Mixin"]);
        assert_eq!(data.keywords, vec!["metaclass=ABCMeta"]);
        assert_eq!(data.attributes.len(), 1);
        assert_eq!(data.attributes[0].name, "kind");
        assert_eq!(data.instance_attributes, vec!["size", "count", "extra"]);
        assert_eq!(object(&model, "Child.make").kind(), ObjectKind::Method);
    }

    #[test]
    fn test_extract_conditional_imports() {
        let source = "\
import os
try:
    import ujson as json
except ImportError:
    import json

def load():
    from .codec import decode
    return decode()
";
        let model = extract("pkg/io.py", source).unwrap();
        let flags: Vec<(&str, bool)> = model
            .imports
            .iter()
            .map(|i| (i.module.as_str(), i.conditional))
            .collect();
        assert_eq!(
            flags,
            vec![("os", false), ("ujson", true), ("json", true), (".codec", true)]
        );
        assert_eq!(model.imports[3].scope, model.id_of("load").unwrap());
        assert_eq!(model.dependencies(), vec!["os", "ujson", "json", ".codec"]);
    }

    #[test]
    fn test_extract_definitions_in_blocks_and_duplicates() {
        let source = "\
import sys
if sys.version_info >= (3, 8):
    def compat():
        return 1
else:
    def compat():
        return 2
";
        let model = extract("compat.py", source).unwrap();
        assert!(model.by_name("compat").is_some());
        assert!(model.by_name("compat#2").is_some());
        assert_eq!(model.top_level(ObjectKind::Function).count(), 2);
        assert_eq!(object(&model, "compat#2").name, "compat");
    }

    #[test]
    fn test_extract_docstrings_and_async() {
        let source = "\
\"\"\"Module docs.\"\"\"

async def fetch(url):
    '''Fetch a URL.

    Returns the body.
    '''
    return await get(url)
";
        let model = extract("net.py", source).unwrap();
        assert_eq!(model.docstring.as_deref(), Some("Module docs."));
        let fetch = object(&model, "fetch");
        assert_eq!(
            fetch.docstring.as_deref(),
            Some("Fetch a URL.\n\nReturns the body.")
        );
        let data = fetch.as_function().unwrap();
        assert!(data.is_async);
        assert_eq!(data.returns, vec!["await get(url)"]);
    }

    #[test]
    fn test_extract_module_variables_and_statements() {
        let source = "MAX_SIZE = 10\nname = 'x'\nprint(name)\n";
        let model = extract("config.py", source).unwrap();
        let constants: Vec<&str> = model.constants().map(|v| v.name.as_str()).collect();
        assert_eq!(constants, vec!["MAX_SIZE"]);
        assert_eq!(model.variables.len(), 2);
        assert_eq!(model.statements.len(), 3);
        assert_eq!(callees(model.module()), vec!["print"]);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let source = "class A:\n    def m(self):\n        return b()\n\ndef b():\n    return A()\n";
        assert_eq!(extract("d.py", source).unwrap(), extract("d.py", source).unwrap());
    }
}
