//! Deterministic answer engine.
//!
//! Answers come straight from the [`CodeModel`] and the relationship graph;
//! nothing here calls out to a service. Purpose questions always answer with
//! the placeholder; replacing it is the augmenter's job.

use crate::indexer::callgraph::RelationshipGraph;
use crate::models::{push_unique, CodeModel, CodeObject, ObjectId, ObjectKind};
use crate::query::questions::{Attribute, Question, QuestionScope};

/// Output of a purpose question that was not augmented.
pub const PURPOSE_PLACEHOLDER: &str = "no augmentation requested";

/// Why a question produced no record for an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inapplicable {
    ScopeMismatch {
        scope: QuestionScope,
        kind: ObjectKind,
    },
    AttributeMismatch {
        attribute: Attribute,
        kind: ObjectKind,
    },
    UnknownQuestion(String),
    MissingObject(ObjectId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    Purpose { placeholder: String },
    Inapplicable(Inapplicable),
}

impl Answer {
    /// Record output, `None` when the answer yields no record.
    pub fn output(&self) -> Option<&str> {
        match self {
            Answer::Text(text) => Some(text.as_str()),
            Answer::Purpose { placeholder } => Some(placeholder.as_str()),
            Answer::Inapplicable(_) => None,
        }
    }

    pub fn is_applicable(&self) -> bool {
        !matches!(self, Answer::Inapplicable(_))
    }
}

fn join(items: &[String]) -> String {
    items.join(", ")
}

fn unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut list = Vec::new();
    for value in values {
        push_unique(&mut list, value);
    }
    list
}

/// Answers questions about one file.
pub struct AnswerEngine<'a> {
    model: &'a CodeModel,
    graph: &'a RelationshipGraph,
}

impl<'a> AnswerEngine<'a> {
    pub fn new(model: &'a CodeModel, graph: &'a RelationshipGraph) -> Self {
        Self { model, graph }
    }

    pub fn model(&self) -> &'a CodeModel {
        self.model
    }

    /// Objects a question of `scope` is asked about, in source order.
    pub fn targets(&self, scope: QuestionScope) -> Vec<ObjectId> {
        self.model
            .iter()
            .filter(|(_, object)| scope.matches(object.kind()))
            .map(|(id, _)| id)
            .collect()
    }

    /// Record input: the object's qualified name, empty for the module.
    pub fn input_for(&self, target: ObjectId) -> String {
        match self.model.get(target) {
            Some(object) if object.kind() != ObjectKind::Module => object.qualified_name.clone(),
            _ => String::new(),
        }
    }

    pub fn instruction_for(&self, question: &Question, target: ObjectId) -> String {
        self.model
            .get(target)
            .map(|object| question.render(self.model, object))
            .unwrap_or_else(|| question.text.clone())
    }

    pub fn answer(&self, question: &Question, target: ObjectId) -> Answer {
        let Some(object) = self.model.get(target) else {
            return Answer::Inapplicable(Inapplicable::MissingObject(target));
        };
        let kind = object.kind();
        if !question.scope.matches(kind) {
            return Answer::Inapplicable(Inapplicable::ScopeMismatch {
                scope: question.scope,
                kind,
            });
        }
        if question.is_purpose() {
            return Answer::Purpose {
                placeholder: PURPOSE_PLACEHOLDER.to_string(),
            };
        }
        let Some(attribute) = question.attribute() else {
            return Answer::Inapplicable(Inapplicable::UnknownQuestion(question.id.clone()));
        };
        let text = match kind {
            ObjectKind::Module => self.file_answer(attribute),
            ObjectKind::Class => self.class_answer(object, attribute),
            ObjectKind::Function | ObjectKind::Method => self.function_answer(object, attribute),
        };
        match text {
            Some(text) => Answer::Text(text),
            None => Answer::Inapplicable(Inapplicable::AttributeMismatch { attribute, kind }),
        }
    }

    fn file_answer(&self, attribute: Attribute) -> Option<String> {
        let model = self.model;
        let names = |kind: ObjectKind| -> Vec<String> {
            unique(model.top_level(kind).map(|o| o.name.as_str()))
        };
        let text = match attribute {
            Attribute::Dependencies => join(&model.dependencies()),
            Attribute::CodeGraph => self.graph.render_json().to_string(),
            Attribute::Functions => join(&names(ObjectKind::Function)),
            Attribute::Classes => join(&names(ObjectKind::Class)),
            Attribute::Constants => join(&unique(model.constants().map(|v| v.name.as_str()))),
            Attribute::Variables => join(&unique(model.variables.iter().map(|v| v.name.as_str()))),
            Attribute::Docstring => model.docstring.clone().unwrap_or_default(),
            Attribute::Calls => join(&self.graph.callees(&model.module().qualified_name)),
            Attribute::Summary => self.file_summary(),
            _ => return None,
        };
        Some(text)
    }

    /// `dependencies: ..; functions: ..; classes: ..`, empty parts omitted.
    pub fn file_summary(&self) -> String {
        let sections = [
            ("dependencies", self.file_answer(Attribute::Dependencies)),
            ("functions", self.file_answer(Attribute::Functions)),
            ("classes", self.file_answer(Attribute::Classes)),
        ];
        sections
            .iter()
            .filter_map(|(label, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{label}: {v}"))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn common_answer(&self, object: &CodeObject, attribute: Attribute) -> Option<String> {
        let text = match attribute {
            Attribute::Docstring => object.docstring.clone().unwrap_or_default(),
            Attribute::Decorators => join(&object.decorators),
            Attribute::Calls => join(&self.graph.callees(&object.qualified_name)),
            Attribute::NestedDefinitions => join(&unique(
                self.model
                    .children_of(self.id_of(object)?)
                    .map(|child| child.name.as_str()),
            )),
            _ => return None,
        };
        Some(text)
    }

    fn id_of(&self, object: &CodeObject) -> Option<ObjectId> {
        self.model.id_of(&object.qualified_name)
    }

    fn class_answer(&self, object: &CodeObject, attribute: Attribute) -> Option<String> {
        let data = object.as_class()?;
        let id = self.id_of(object)?;
        let methods = || -> Vec<String> {
            unique(
                self.model
                    .children_of(id)
                    .filter(|child| child.kind() == ObjectKind::Method)
                    .map(|child| child.name.as_str()),
            )
        };
        let text = match attribute {
            Attribute::Methods => join(&methods()),
            Attribute::MethodCount => methods().len().to_string(),
            Attribute::Attributes => join(&data.instance_attributes),
            Attribute::Variables => join(&unique(data.attributes.iter().map(|v| v.name.as_str()))),
            Attribute::Inheritance => join(&data.bases),
            Attribute::Subclasses => join(&self.graph.subclasses(&object.qualified_name)),
            Attribute::Instantiations => join(&self.graph.instantiators(&object.qualified_name)),
            _ => return self.common_answer(object, attribute),
        };
        Some(text)
    }

    fn function_answer(&self, object: &CodeObject, attribute: Attribute) -> Option<String> {
        let data = object.as_function()?;
        let text = match attribute {
            Attribute::Inputs => {
                let names: Vec<String> = object.parameters.iter().map(|p| p.display_name()).collect();
                join(&names)
            }
            Attribute::ParameterCount => object.parameters.len().to_string(),
            Attribute::Callers => join(&self.graph.callers(&object.qualified_name)),
            Attribute::Returns => join(&unique(data.returns.iter().map(String::as_str))),
            Attribute::ReturnAnnotation => object.return_annotation.clone().unwrap_or_default(),
            Attribute::Variables => join(&unique(data.variables.iter().map(|v| v.name.as_str()))),
            Attribute::Instantiations => join(&self.graph.instantiations(&object.qualified_name)),
            _ => return self.common_answer(object, attribute),
        };
        Some(text)
    }
}
