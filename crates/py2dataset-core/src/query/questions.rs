//! Question bank: the ordered catalog of question templates.
//!
//! A bank is either the built-in default or a JSON array of questions. The
//! attribute a question asks about is derived from its id suffix, so
//! `method_calls` and `function_calls` both ask for calls.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{DatasetError, DatasetResult};
use crate::models::{CodeModel, CodeObject, ObjectKind};
use crate::query::guards::{MAX_QUESTIONS, MAX_QUESTION_LENGTH};

// ---------------------------------------------------------------------------
// Question model
// ---------------------------------------------------------------------------

/// Which code objects a question is asked about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionScope {
    /// Asked once per file, about the module.
    File,
    Class,
    /// Any function, methods included.
    Function,
    /// Functions that are not methods.
    Standalone,
    Method,
}

impl QuestionScope {
    pub fn matches(self, kind: ObjectKind) -> bool {
        match self {
            QuestionScope::File => kind == ObjectKind::Module,
            QuestionScope::Class => kind == ObjectKind::Class,
            QuestionScope::Function => kind.is_callable(),
            QuestionScope::Standalone => kind == ObjectKind::Function,
            QuestionScope::Method => kind == ObjectKind::Method,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Structural,
    Count,
    List,
    Purpose,
    FreeText,
}

/// The model field a question asks about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    Dependencies,
    CodeGraph,
    Functions,
    Classes,
    Constants,
    Variables,
    Docstring,
    Summary,
    Inputs,
    ParameterCount,
    Calls,
    Callers,
    Returns,
    ReturnAnnotation,
    Decorators,
    NestedDefinitions,
    Methods,
    MethodCount,
    Attributes,
    Inheritance,
    Subclasses,
    Instantiations,
    Purpose,
}

const ID_PREFIXES: &[&str] = &[
    "file_",
    "entire_",
    "function_",
    "standalone_",
    "class_",
    "method_",
];

impl Attribute {
    /// Attribute named by a question id: `class_inheritance` -> `Inheritance`.
    pub fn from_question_id(id: &str) -> Option<Self> {
        let suffix = ID_PREFIXES
            .iter()
            .find_map(|prefix| id.strip_prefix(prefix))
            .unwrap_or(id);
        let attribute = match suffix {
            "dependencies" => Attribute::Dependencies,
            "code_graph" => Attribute::CodeGraph,
            "functions" => Attribute::Functions,
            "classes" => Attribute::Classes,
            "constants" => Attribute::Constants,
            "variables" => Attribute::Variables,
            "docstring" => Attribute::Docstring,
            "summary" => Attribute::Summary,
            "inputs" => Attribute::Inputs,
            "parameter_count" => Attribute::ParameterCount,
            "calls" => Attribute::Calls,
            "callers" => Attribute::Callers,
            "returns" => Attribute::Returns,
            "return_annotation" => Attribute::ReturnAnnotation,
            "decorators" => Attribute::Decorators,
            "nested_definitions" => Attribute::NestedDefinitions,
            "methods" => Attribute::Methods,
            "method_count" => Attribute::MethodCount,
            "attributes" => Attribute::Attributes,
            "inheritance" => Attribute::Inheritance,
            "subclasses" => Attribute::Subclasses,
            "instantiations" => Attribute::Instantiations,
            "purpose" => Attribute::Purpose,
            _ => return None,
        };
        Some(attribute)
    }
}

fn default_augment() -> bool {
    true
}

/// One immutable question template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub scope: QuestionScope,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Purpose questions only: whether the augmentation path may answer it.
    #[serde(default = "default_augment")]
    pub augment: bool,
}

impl Question {
    pub fn new(id: &str, text: &str, scope: QuestionScope, question_type: QuestionType) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            scope,
            question_type,
            augment: true,
        }
    }

    pub fn attribute(&self) -> Option<Attribute> {
        Attribute::from_question_id(&self.id)
    }

    pub fn is_purpose(&self) -> bool {
        self.question_type == QuestionType::Purpose
    }

    /// Purpose answers derived from code graphs and docstrings would only
    /// echo the prompt context, so those never feed later prompts.
    pub fn feeds_prompt_context(&self) -> bool {
        !matches!(
            self.attribute(),
            Some(Attribute::CodeGraph | Attribute::Docstring)
        )
    }

    /// Fill the template for `object` of `model`. Unknown placeholders are
    /// left as written.
    pub fn render(&self, model: &CodeModel, object: &CodeObject) -> String {
        let class_name = match object.kind() {
            ObjectKind::Class => object.qualified_name.clone(),
            ObjectKind::Method => object
                .parent
                .and_then(|parent| model.get(parent))
                .map(|class| class.qualified_name.clone())
                .unwrap_or_default(),
            _ => String::new(),
        };
        let method_name = if object.kind() == ObjectKind::Method {
            object.name.as_str()
        } else {
            ""
        };
        let function_name = if object.kind().is_callable() {
            object.qualified_name.as_str()
        } else {
            ""
        };
        self.text
            .replace("{filename}", &model.file_id)
            .replace("{qualified_name}", &object.qualified_name)
            .replace("{function_name}", function_name)
            .replace("{class_name}", &class_name)
            .replace("{method_name}", method_name)
            .replace("{name}", &object.name)
    }
}

// ---------------------------------------------------------------------------
// QuestionBank
// ---------------------------------------------------------------------------

/// Validated, ordered catalog of questions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

const DEFAULT_QUESTIONS: &[(&str, &str, QuestionScope, QuestionType)] = &[
    ("file_dependencies", "Dependencies in Python file: `{filename}`?", QuestionScope::File, QuestionType::List),
    ("entire_code_graph", "Call code graph in Python file: `{filename}`?", QuestionScope::File, QuestionType::Structural),
    ("file_functions", "Functions defined in Python file: `{filename}`?", QuestionScope::File, QuestionType::List),
    ("file_classes", "Classes defined in Python file: `{filename}`?", QuestionScope::File, QuestionType::List),
    ("file_constants", "Constants defined in Python file: `{filename}`?", QuestionScope::File, QuestionType::List),
    ("file_docstring", "Docstring of Python file: `{filename}`?", QuestionScope::File, QuestionType::FreeText),
    ("file_summary", "Summary of Python file: `{filename}`?", QuestionScope::File, QuestionType::FreeText),
    ("file_purpose", "Purpose of Python file: `{filename}`?", QuestionScope::File, QuestionType::Purpose),
    ("function_inputs", "Inputs to function: `{function_name}` in Python file: `{filename}`?", QuestionScope::Standalone, QuestionType::List),
    ("function_parameter_count", "Number of parameters of function: `{function_name}` in Python file: `{filename}`?", QuestionScope::Standalone, QuestionType::Count),
    ("function_docstring", "Docstring of function: `{function_name}` in Python file: `{filename}`?", QuestionScope::Standalone, QuestionType::FreeText),
    ("function_calls", "Calls made in function: `{function_name}` in Python file: `{filename}`?", QuestionScope::Standalone, QuestionType::List),
    ("function_callers", "Callers of function: `{function_name}` in Python file: `{filename}`?", QuestionScope::Standalone, QuestionType::List),
    ("function_variables", "Variables in function: `{function_name}` in Python file: `{filename}`?", QuestionScope::Standalone, QuestionType::List),
    ("function_returns", "Returns from function: `{function_name}` in Python file: `{filename}`?", QuestionScope::Standalone, QuestionType::List),
    ("function_purpose", "Purpose of function: `{function_name}` in Python file: `{filename}`?", QuestionScope::Standalone, QuestionType::Purpose),
    ("class_methods", "Methods defined in class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Class, QuestionType::List),
    ("class_method_count", "Number of methods in class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Class, QuestionType::Count),
    ("class_docstring", "Docstring of class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Class, QuestionType::FreeText),
    ("class_attributes", "Attributes of class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Class, QuestionType::List),
    ("class_variables", "Variables defined in class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Class, QuestionType::List),
    ("class_inheritance", "Inheritance of class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Class, QuestionType::Structural),
    ("class_subclasses", "Subclasses of class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Class, QuestionType::List),
    ("class_instantiations", "Objects instantiating class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Class, QuestionType::List),
    ("class_purpose", "Purpose of class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Class, QuestionType::Purpose),
    ("method_inputs", "Inputs to method: `{method_name}` in class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Method, QuestionType::List),
    ("method_docstring", "Docstring of method: `{method_name}` in class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Method, QuestionType::FreeText),
    ("method_calls", "Calls made in method: `{method_name}` in class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Method, QuestionType::List),
    ("method_returns", "Returns from method: `{method_name}` in class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Method, QuestionType::List),
    ("method_decorators", "Decorators of method: `{method_name}` in class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Method, QuestionType::List),
    ("method_purpose", "Purpose of method: `{method_name}` in class: `{class_name}` in Python file: `{filename}`?", QuestionScope::Method, QuestionType::Purpose),
];

impl QuestionBank {
    /// Build a bank, rejecting empty banks, blank or duplicate ids and blank
    /// or oversized texts.
    pub fn new(questions: Vec<Question>) -> DatasetResult<Self> {
        if questions.is_empty() {
            return Err(DatasetError::Config("question bank is empty".to_string()));
        }
        if questions.len() > MAX_QUESTIONS {
            return Err(DatasetError::Config(format!(
                "question bank has {} questions, at most {MAX_QUESTIONS} are allowed",
                questions.len()
            )));
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for question in &questions {
            if question.id.trim().is_empty() {
                return Err(DatasetError::Config("question with an empty id".to_string()));
            }
            if !seen.insert(question.id.as_str()) {
                return Err(DatasetError::Config(format!(
                    "duplicate question id `{}`",
                    question.id
                )));
            }
            if question.text.trim().is_empty() || question.text.len() > MAX_QUESTION_LENGTH {
                return Err(DatasetError::Config(format!(
                    "question `{}` has an empty or oversized text",
                    question.id
                )));
            }
        }
        Ok(Self { questions })
    }

    pub fn default_bank() -> Self {
        let questions = DEFAULT_QUESTIONS
            .iter()
            .map(|(id, text, scope, question_type)| Question::new(id, text, *scope, *question_type))
            .collect();
        Self { questions }
    }

    pub fn from_json_str(json: &str) -> DatasetResult<Self> {
        let questions: Vec<Question> = serde_json::from_str(json)?;
        Self::new(questions)
    }

    pub fn from_file(path: &Path) -> DatasetResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DatasetError::Config(format!("cannot read question bank {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// True when any purpose question may be augmented.
    pub fn has_augmentable(&self) -> bool {
        self.questions.iter().any(|q| q.is_purpose() && q.augment)
    }
}
