//! Prompt construction and response cleanup for purpose augmentation.
//!
//! The prompt context is the richest code context that fits the window,
//! followed by the answers already produced for the same file:
//!
//! ```text
//! <code context>
//! CODE Q and A:
//! Q: <instruction>
//! A: <output>
//! ```

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::errors::GenerationFailure;
use crate::query::guards::context_budget;
use crate::query::tokenizer::estimate_tokens;
use crate::store::dataset::InstructionRecord;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(context|query)\}").unwrap());

static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Code material a prompt can be built from, richest first.
#[derive(Clone, Copy, Debug)]
pub struct PromptContext<'a> {
    /// Source text of the object the question is about.
    pub object_source: &'a str,
    /// The file without comments and blank lines.
    pub simplified_source: &'a str,
    pub file_summary: &'a str,
    /// Earlier answers of the same file, see [`code_qa`].
    pub code_qa: &'a str,
}

/// Drop comment-only and blank lines.
pub fn simplify_source(source: &str) -> String {
    source
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `Q: .. \nA: ..` lines for the given records.
pub fn code_qa<'r>(records: impl Iterator<Item = &'r InstructionRecord>) -> String {
    records
        .map(|record| format!("Q: {} \nA: {}", record.instruction, record.output))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Substitute `{context}` and `{query}` in one pass, so braces inside the
/// substituted text are never expanded.
pub fn fill_template(template: &str, context: &str, query: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "context" => context.to_string(),
            _ => query.to_string(),
        })
        .into_owned()
}

/// Build the prompt from the first context strategy whose estimated size fits
/// the fill ratio of `context_length`: object source, simplified file source,
/// file summary, nothing.
pub fn build_prompt(
    template: &str,
    query: &str,
    context: &PromptContext<'_>,
    context_length: usize,
) -> Result<String, GenerationFailure> {
    let available = context_budget(context_length);
    let strategies = [
        format!("```python\n{}\n```", context.object_source),
        format!("```python\n{}\n```", context.simplified_source),
        context.file_summary.to_string(),
        String::new(),
    ];
    let mut required = 0;
    for code in strategies {
        let full_context = format!("{code}\nCODE Q and A:\n{}", context.code_qa);
        let prompt = fill_template(template, &full_context, query);
        required = estimate_tokens(&prompt);
        if required <= available {
            return Ok(prompt);
        }
    }
    Err(GenerationFailure::ContextOverflow {
        required,
        available,
    })
}

/// Collapse runs of blank lines and trim. An empty response is malformed.
pub fn clean_response(raw: &str) -> Result<String, GenerationFailure> {
    let collapsed = BLANK_RUN_RE.replace_all(raw, "\n\n");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        return Err(GenerationFailure::MalformedOutput(
            "empty response".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "Context:\n{context}\nQuery: {query}\nResponse:";

    fn context<'a>(object_source: &'a str, simplified: &'a str) -> PromptContext<'a> {
        PromptContext {
            object_source,
            simplified_source: simplified,
            file_summary: "functions: f",
            code_qa: "Q: Functions? \nA: f",
        }
    }

    #[test]
    fn test_fill_template_single_pass() {
        let filled = fill_template(TEMPLATE, "x = '{query}'", "Why?");
        assert_eq!(filled, "Context:\nx = '{query}'\nQuery: Why?\nResponse:");
    }

    #[test]
    fn test_build_prompt_prefers_object_source() {
        let prompt = build_prompt(TEMPLATE, "Purpose?", &context("def f(): pass", "def f(): pass"), 4096).unwrap();
        assert!(prompt.contains("```python\ndef f(): pass\n```\nCODE Q and A:\nQ: Functions? \nA: f"));
        assert!(prompt.ends_with("Query: Purpose?\nResponse:"));
    }

    #[test]
    fn test_build_prompt_falls_back_to_summary() {
        let big = "x = 1\n".repeat(500);
        let prompt = build_prompt(TEMPLATE, "Purpose?", &context(&big, &big), 256).unwrap();
        assert!(!prompt.contains("```python"));
        assert!(prompt.contains("functions: f\nCODE Q and A:"));
    }

    #[test]
    fn test_build_prompt_overflow() {
        let err = build_prompt(TEMPLATE, &"why ".repeat(500), &context("", ""), 256).unwrap_err();
        match err {
            GenerationFailure::ContextOverflow { required, available } => {
                assert_eq!(available, 179);
                assert!(required > available);
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[test]
    fn test_clean_response_collapses_blank_runs() {
        let cleaned = clean_response("First.\n\n   \n\nSecond.\n").unwrap();
        assert_eq!(cleaned, "First.\n\nSecond.");
    }

    #[test]
    fn test_clean_response_rejects_empty() {
        assert!(matches!(
            clean_response(" \n\n "),
            Err(GenerationFailure::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_simplify_source_and_code_qa() {
        let source = "# header\n\nimport os\n    # indented comment\nx = 1  # trailing\n";
        assert_eq!(simplify_source(source), "import os\nx = 1  # trailing");

        let records = [InstructionRecord::new("Classes?", "", "A, B")];
        assert_eq!(code_qa(records.iter()), "Q: Classes? \nA: A, B");
    }
}
