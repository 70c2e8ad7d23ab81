//! Relationship graph construction from a single [`CodeModel`].
//!
//! Nodes are the model's qualified names plus synthetic external nodes for
//! anything that does not resolve inside the file. Edges are typed
//! (calls, inherits, imports, instantiates), carry a resolved flag and count
//! repeated occurrences instead of duplicating. Resolution is cascading:
//! lexical scope chain > owning class for `self`/`cls` receivers > exact
//! qualified name > import alias (external).

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;

use crate::indexer::imports::absolute_name;
use crate::models::{CodeModel, ObjectId, ObjectKind, MODULE_QUALIFIED_NAME};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Inherits,
    Imports,
    Instantiates,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Calls => "calls",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Imports => "imports",
            EdgeKind::Instantiates => "instantiates",
        }
    }

    /// Calls and instantiations are both call expressions.
    pub fn is_call(self) -> bool {
        matches!(self, EdgeKind::Calls | EdgeKind::Instantiates)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Class,
    Function,
    Method,
    /// A name that does not resolve to an object of this file.
    External,
}

impl From<ObjectKind> for NodeKind {
    fn from(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Module => NodeKind::Module,
            ObjectKind::Class => NodeKind::Class,
            ObjectKind::Function => NodeKind::Function,
            ObjectKind::Method => NodeKind::Method,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub name: String,
    pub kind: NodeKind,
}

/// One typed edge; `count` is the number of occurrences and `line` the first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub resolved: bool,
    pub count: usize,
    pub line: usize,
}

/// Sorted, serializable view of a graph.
#[derive(Debug, Serialize)]
pub struct GraphRendering<'g> {
    pub nodes: Vec<&'g GraphNode>,
    pub edges: Vec<&'g GraphEdge>,
}

/// Directed multigraph of one file's relationships.
#[derive(Clone, Debug, Default)]
pub struct RelationshipGraph {
    nodes: IndexMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    edge_index: HashMap<(String, String, EdgeKind), usize>,
}

impl RelationshipGraph {
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.get(name)
    }

    pub fn edge(&self, source: &str, target: &str, kind: EdgeKind) -> Option<&GraphEdge> {
        self.edge_index
            .get(&(source.to_string(), target.to_string(), kind))
            .map(|&index| &self.edges[index])
    }

    /// Add a node; an existing node keeps its kind.
    pub fn add_node(&mut self, name: &str, kind: NodeKind) {
        self.nodes.entry(name.to_string()).or_insert_with(|| GraphNode {
            name: name.to_string(),
            kind,
        });
    }

    /// Add one occurrence of an edge. Missing endpoints become external nodes
    /// so no edge ever dangles.
    pub fn add_edge(&mut self, source: &str, target: &str, kind: EdgeKind, resolved: bool, line: usize) {
        self.add_node(source, NodeKind::External);
        self.add_node(target, NodeKind::External);
        let key = (source.to_string(), target.to_string(), kind);
        if let Some(&index) = self.edge_index.get(&key) {
            self.edges[index].count += 1;
            return;
        }
        self.edge_index.insert(key, self.edges.len());
        self.edges.push(GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind,
            resolved,
            count: 1,
            line,
        });
    }

    fn related<F>(&self, select: F) -> Vec<String>
    where
        F: Fn(&GraphEdge) -> Option<&str>,
    {
        let mut names: Vec<String> = self
            .edges
            .iter()
            .filter_map(|edge| select(edge).map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Everything `name` calls or instantiates, sorted.
    pub fn callees(&self, name: &str) -> Vec<String> {
        self.related(|e| (e.kind.is_call() && e.source == name).then_some(e.target.as_str()))
    }

    /// Everything that calls or instantiates `name`, sorted.
    pub fn callers(&self, name: &str) -> Vec<String> {
        self.related(|e| (e.kind.is_call() && e.target == name).then_some(e.source.as_str()))
    }

    pub fn bases(&self, name: &str) -> Vec<String> {
        self.related(|e| {
            (e.kind == EdgeKind::Inherits && e.source == name).then_some(e.target.as_str())
        })
    }

    pub fn subclasses(&self, name: &str) -> Vec<String> {
        self.related(|e| {
            (e.kind == EdgeKind::Inherits && e.target == name).then_some(e.source.as_str())
        })
    }

    /// Objects that instantiate the class `name`, sorted.
    pub fn instantiators(&self, name: &str) -> Vec<String> {
        self.related(|e| {
            (e.kind == EdgeKind::Instantiates && e.target == name).then_some(e.source.as_str())
        })
    }

    /// Classes that `name` instantiates, sorted.
    pub fn instantiations(&self, name: &str) -> Vec<String> {
        self.related(|e| {
            (e.kind == EdgeKind::Instantiates && e.source == name).then_some(e.target.as_str())
        })
    }

    /// Edges whose endpoints are not nodes. Always empty for graphs built
    /// through [`RelationshipGraph::add_edge`].
    #[cfg(test)]
    pub(crate) fn dangling_edges(&self) -> Vec<&GraphEdge> {
        self.edges
            .iter()
            .filter(|e| !self.nodes.contains_key(&e.source) || !self.nodes.contains_key(&e.target))
            .collect()
    }

    /// Nodes by name, edges by (source, target, kind).
    pub fn render(&self) -> GraphRendering<'_> {
        let mut nodes: Vec<&GraphNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        let mut edges: Vec<&GraphEdge> = self.edges.iter().collect();
        edges.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then(a.target.cmp(&b.target))
                .then(a.kind.cmp(&b.kind))
        });
        GraphRendering { nodes, edges }
    }

    pub fn render_json(&self) -> serde_json::Value {
        serde_json::to_value(self.render()).unwrap_or(serde_json::Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Name resolution
// ---------------------------------------------------------------------------

/// Outcome of resolving one referenced name.
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    /// An object of the model; `all_classes` is true when every visible
    /// definition of the name is a class.
    Object { id: ObjectId, all_classes: bool },
    External(String),
}

struct Resolver<'m> {
    model: &'m CodeModel,
    /// Local binding introduced by an import -> absolute dotted name.
    aliases: HashMap<String, String>,
}

impl<'m> Resolver<'m> {
    fn new(model: &'m CodeModel) -> Self {
        let mut aliases: HashMap<String, String> = HashMap::new();
        for import in &model.imports {
            if import.is_from() {
                for (imported, target) in import.names.iter().zip(import.targets()) {
                    if imported.name == "*" {
                        continue;
                    }
                    let binding = imported.alias.clone().unwrap_or_else(|| imported.name.clone());
                    aliases
                        .entry(binding)
                        .or_insert_with(|| absolute_name(&model.file_id, &target));
                }
            } else if let Some(alias) = &import.alias {
                aliases
                    .entry(alias.clone())
                    .or_insert_with(|| import.module.clone());
            }
        }
        Self { model, aliases }
    }

    fn kind_of(&self, id: ObjectId) -> Option<ObjectKind> {
        self.model.get(id).map(|object| object.kind())
    }

    /// The object itself, then its enclosing non-class scopes out to the
    /// module. Class bodies are not visible to the functions nested in them.
    fn scope_chain(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut chain = vec![id];
        let mut current = self.model.get(id).and_then(|object| object.parent);
        while let Some(scope) = current {
            let Some(object) = self.model.get(scope) else {
                break;
            };
            if object.kind() != ObjectKind::Class {
                chain.push(scope);
            }
            current = object.parent;
        }
        chain
    }

    /// Definitions named `name` directly inside `scope`, `#n` variants included.
    fn members(&self, scope: ObjectId, name: &str) -> Vec<ObjectId> {
        self.model
            .get(scope)
            .map(|object| {
                object
                    .children
                    .iter()
                    .copied()
                    .filter(|child| self.model.get(*child).is_some_and(|c| c.name == name))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn all_classes(&self, ids: &[ObjectId]) -> bool {
        ids.iter()
            .all(|id| self.kind_of(*id) == Some(ObjectKind::Class))
    }

    /// Innermost visible definition of a simple name. Every definition of the
    /// name along the chain counts towards `all_classes`.
    fn lookup(&self, chain: &[ObjectId], name: &str) -> Option<(ObjectId, bool)> {
        let mut found = None;
        let mut all_classes = true;
        for scope in chain {
            let members = self.members(*scope, name);
            let Some(first) = members.first() else {
                continue;
            };
            found.get_or_insert(*first);
            all_classes &= self.all_classes(&members);
        }
        found.map(|id| (id, all_classes))
    }

    /// Walk a dotted path whose head is looked up along `chain`.
    fn resolve_path(&self, chain: &[ObjectId], path: &str) -> Option<(ObjectId, bool)> {
        let mut segments = path.split('.');
        let head = segments.next()?;
        let (mut current, mut all_classes) = self.lookup(chain, head)?;
        for segment in segments {
            let members = self.members(current, segment);
            current = *members.first()?;
            all_classes = self.all_classes(&members);
        }
        Some((current, all_classes))
    }

    /// Resolve a path inside a class body, then inside its in-file bases.
    fn resolve_member(
        &self,
        class: ObjectId,
        path: &str,
        visited: &mut HashSet<ObjectId>,
    ) -> Option<(ObjectId, bool)> {
        if !visited.insert(class) {
            return None;
        }
        if let Some(found) = self.resolve_path(&[class], path) {
            return Some(found);
        }
        let object = self.model.get(class)?;
        let data = object.as_class()?;
        let scope = object.parent.unwrap_or(self.model.module_id());
        data.bases.iter().find_map(|base| {
            let (base_id, _) = self.resolve_path(&self.scope_chain(scope), strip_subscript(base))?;
            if self.kind_of(base_id) != Some(ObjectKind::Class) {
                return None;
            }
            self.resolve_member(base_id, path, visited)
        })
    }

    /// Resolve a name referenced from inside `scope`.
    fn resolve(&self, scope: ObjectId, name: &str) -> Resolution {
        let found = match name
            .strip_prefix("self.")
            .or_else(|| name.strip_prefix("cls."))
        {
            Some(rest) => self
                .model
                .enclosing_class(scope)
                .and_then(|class| self.resolve_member(class, rest, &mut HashSet::new())),
            None => self.resolve_path(&self.scope_chain(scope), name),
        };
        let found = found.or_else(|| {
            self.model
                .id_of(name)
                .filter(|id| *id != self.model.module_id())
                .map(|id| (id, self.kind_of(id) == Some(ObjectKind::Class)))
        });
        match found {
            Some((id, all_classes)) => Resolution::Object { id, all_classes },
            None => Resolution::External(self.external_name(name)),
        }
    }

    /// External node name: the head is rewritten through import aliases,
    /// `np.array` -> `numpy.array`.
    fn external_name(&self, name: &str) -> String {
        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };
        match (self.aliases.get(head), rest) {
            (Some(target), Some(rest)) => format!("{target}.{rest}"),
            (Some(target), None) => target.clone(),
            (None, _) => name.to_string(),
        }
    }
}

/// `Generic[T]` -> `Generic`.
fn strip_subscript(base: &str) -> &str {
    base.split('[').next().unwrap_or(base)
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Build the relationship graph of one model.
///
/// * every call expression of an object becomes a `calls` edge, or an
///   `instantiates` edge when the callee resolves to a class and no
///   non-class definition of that name is visible;
/// * every base of a class becomes an `inherits` edge, resolved from the
///   scope the class statement runs in;
/// * every import becomes an `imports` edge from the module node to the
///   absolute imported name.
pub fn build_relationship_graph(model: &CodeModel) -> RelationshipGraph {
    let resolver = Resolver::new(model);
    let mut graph = RelationshipGraph::default();
    for (_, object) in model.iter() {
        graph.add_node(&object.qualified_name, object.kind().into());
    }

    for (id, object) in model.iter() {
        for call in &object.calls {
            match resolver.resolve(id, &call.callee) {
                Resolution::Object { id: target, all_classes } => {
                    let Some(target_object) = model.get(target) else {
                        continue;
                    };
                    let kind = if all_classes && target_object.kind() == ObjectKind::Class {
                        EdgeKind::Instantiates
                    } else {
                        EdgeKind::Calls
                    };
                    graph.add_edge(&object.qualified_name, &target_object.qualified_name, kind, true, call.line);
                }
                Resolution::External(name) => {
                    graph.add_edge(&object.qualified_name, &name, EdgeKind::Calls, false, call.line);
                }
            }
        }

        if let Some(class) = object.as_class() {
            let scope = object.parent.unwrap_or(model.module_id());
            for base in &class.bases {
                let base_name = strip_subscript(base);
                let target = match resolver.resolve(scope, base_name) {
                    Resolution::Object { id: base_id, .. }
                        if resolver.kind_of(base_id) == Some(ObjectKind::Class) =>
                    {
                        model.get(base_id).map(|b| (b.qualified_name.clone(), true))
                    }
                    Resolution::Object { .. } => Some((base_name.to_string(), false)),
                    Resolution::External(name) => Some((name, false)),
                };
                if let Some((target, resolved)) = target {
                    graph.add_edge(
                        &object.qualified_name,
                        &target,
                        EdgeKind::Inherits,
                        resolved,
                        object.span.start_line,
                    );
                }
            }
        }
    }

    for import in &model.imports {
        for target in import.targets() {
            let name = absolute_name(&model.file_id, &target);
            graph.add_edge(MODULE_QUALIFIED_NAME, &name, EdgeKind::Imports, false, import.line);
        }
    }

    graph
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
