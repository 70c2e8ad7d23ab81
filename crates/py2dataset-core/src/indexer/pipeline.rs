//! Dataset pipeline orchestration with Rayon-based parallelism.
//!
//! Every file is an independent unit: extract, build the relationship graph,
//! answer the question bank, optionally augment purpose answers, persist.
//! Outcomes are sorted back into discovery order before the corpus is merged.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::augment::prompt::{code_qa, simplify_source, PromptContext};
use crate::augment::{PurposeAugmenter, PurposeRequest};
use crate::errors::{DatasetResult, ParseError};
use crate::indexer::callgraph::build_relationship_graph;
use crate::indexer::symbols::extract;
use crate::models::{CodeModel, ObjectId, SourceFile};
use crate::query::answers::{Answer, AnswerEngine};
use crate::query::guards::MAX_DETAILED_CHILDREN;
use crate::query::questions::{Question, QuestionBank};
use crate::store::cache::{content_fingerprint, CacheValidity};
use crate::store::dataset::{merge_corpus, CorpusDataset, DatasetAssembler, InstructionRecord};
use crate::store::{DatasetStore, FileArtifact};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    pub workers: usize,
    pub skip_regeneration: bool,
    /// Explain nested objects as part of each purpose answer.
    pub detailed: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            skip_regeneration: false,
            detailed: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileStatus {
    Generated,
    Reused,
    Skipped(ParseError),
}

#[derive(Clone, Debug)]
pub struct FileOutcome {
    pub index: usize,
    pub file_id: String,
    pub status: FileStatus,
    pub records: Vec<InstructionRecord>,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub files_generated: usize,
    pub files_reused: usize,
    pub files_skipped: usize,
    pub generation_failures: usize,
    pub elapsed_ms: u128,
    pub corpus: CorpusDataset,
}

/// Source of `id`; the whole file for the module.
fn object_source(model: &CodeModel, id: ObjectId) -> &str {
    match model.get(id) {
        Some(object) if id != model.module_id() => model.source_of(object),
        _ => model.source.as_str(),
    }
}

/// Code material shared by every purpose prompt of one file.
struct FileContext {
    simplified_source: String,
    file_summary: String,
}

pub struct Pipeline<'a> {
    bank: &'a QuestionBank,
    store: &'a dyn DatasetStore,
    validity: &'a dyn CacheValidity,
    augmenter: Option<&'a PurposeAugmenter>,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        bank: &'a QuestionBank,
        store: &'a dyn DatasetStore,
        validity: &'a dyn CacheValidity,
        augmenter: Option<&'a PurposeAugmenter>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            bank,
            store,
            validity,
            augmenter,
            options,
        }
    }

    /// Process `files` in order and persist the corpus.
    pub fn run(&self, files: &[SourceFile]) -> DatasetResult<RunReport> {
        let started = Instant::now();
        let failures_before = self.augmenter.map_or(0, |a| a.failures());
        info!(
            "Processing {} files with {} workers",
            files.len(),
            self.options.workers
        );

        let mut outcomes = self.process_all(files);
        outcomes.sort_by_key(|outcome| outcome.index);

        let corpus = merge_corpus(
            outcomes.iter().map(|o| o.records.as_slice()),
            self.augmenter.is_some(),
        );
        self.store.save_corpus(&corpus)?;

        let count = |wanted: fn(&FileStatus) -> bool| {
            outcomes.iter().filter(|o| wanted(&o.status)).count()
        };
        let report = RunReport {
            files_generated: count(|s| matches!(s, FileStatus::Generated)),
            files_reused: count(|s| matches!(s, FileStatus::Reused)),
            files_skipped: count(|s| matches!(s, FileStatus::Skipped(_))),
            generation_failures: self.augmenter.map_or(0, |a| a.failures()) - failures_before,
            elapsed_ms: started.elapsed().as_millis(),
            corpus,
        };
        info!(
            "Run finished: {} generated, {} reused, {} skipped, {} generation failures, {} records in {}ms",
            report.files_generated,
            report.files_reused,
            report.files_skipped,
            report.generation_failures,
            report.corpus.instruct.len(),
            report.elapsed_ms
        );
        Ok(report)
    }

    fn process_all(&self, files: &[SourceFile]) -> Vec<FileOutcome> {
        if files.is_empty() {
            return vec![];
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .thread_name(|i| format!("py2dataset-worker-{i}"))
            .build();

        match pool {
            Ok(pool) => pool.install(|| {
                files
                    .par_iter()
                    .enumerate()
                    .map(|(index, file)| self.process_file(index, file))
                    .collect()
            }),
            Err(e) => {
                warn!("Falling back to sequential processing: {}", e);
                files
                    .iter()
                    .enumerate()
                    .map(|(index, file)| self.process_file(index, file))
                    .collect()
            }
        }
    }

    pub fn process_file(&self, index: usize, file: &SourceFile) -> FileOutcome {
        let outcome = |status, records| FileOutcome {
            index,
            file_id: file.id.clone(),
            status,
            records,
        };

        if self.options.skip_regeneration && self.validity.is_valid(self.store, file) {
            match self.store.load(&file.id) {
                Ok(records) => {
                    debug!("Reusing {} records for {}", records.len(), file.id);
                    return outcome(FileStatus::Reused, records);
                }
                Err(e) => warn!("Regenerating {}: {}", file.id, e),
            }
        }

        let model = match extract(&file.id, &file.source) {
            Ok(model) => model,
            Err(e) => {
                warn!("Skipping {}", e);
                return outcome(FileStatus::Skipped(e), Vec::new());
            }
        };
        let graph = build_relationship_graph(&model);
        let engine = AnswerEngine::new(&model, &graph);
        let shared = FileContext {
            simplified_source: simplify_source(&model.source),
            file_summary: engine.file_summary(),
        };

        let mut assembler = DatasetAssembler::new();
        for question in self.bank.iter() {
            for target in engine.targets(question.scope) {
                let instruction = engine.instruction_for(question, target);
                let mut answer = engine.answer(question, target);
                let augmenter = self
                    .augmenter
                    .filter(|_| question.augment && matches!(answer, Answer::Purpose { .. }));
                if let Some(augmenter) = augmenter {
                    let generated = self.explain(
                        augmenter,
                        &model,
                        question,
                        target,
                        &instruction,
                        &shared,
                        &assembler,
                    );
                    if let Some(text) = generated {
                        answer = Answer::Text(text);
                    }
                }
                assembler.record(
                    &instruction,
                    &engine.input_for(target),
                    &answer,
                    question.feeds_prompt_context(),
                );
            }
        }
        let records = assembler.finish();
        debug!("Generated {} records for {}", records.len(), file.id);

        let artifact = FileArtifact {
            file_id: file.id.clone(),
            records,
            graph: graph.render_json(),
            fingerprint: content_fingerprint(&file.source),
        };
        if let Err(e) = self.store.save(&artifact) {
            warn!("Failed to save dataset for {}: {}", file.id, e);
        }
        outcome(FileStatus::Generated, artifact.records)
    }

    /// Generated purpose answer for `target`, `None` when generation failed.
    /// In detailed mode the explanations of direct children follow the
    /// target's own.
    #[allow(clippy::too_many_arguments)]
    fn explain(
        &self,
        augmenter: &PurposeAugmenter,
        model: &CodeModel,
        question: &Question,
        target: ObjectId,
        instruction: &str,
        shared: &FileContext,
        assembler: &DatasetAssembler,
    ) -> Option<String> {
        let qa = code_qa(assembler.context_records());
        let mut text = augmenter
            .explain(&PurposeRequest {
                query: instruction,
                context: PromptContext {
                    object_source: object_source(model, target),
                    simplified_source: &shared.simplified_source,
                    file_summary: &shared.file_summary,
                    code_qa: &qa,
                },
                detailed: self.options.detailed,
            })
            .ok()?;

        if self.options.detailed {
            let descendants = model.descendants_of(target);
            if descendants.len() > MAX_DETAILED_CHILDREN {
                warn!(
                    "Detailed purpose for {} covers {} of {} nested objects",
                    model.get(target).map_or("?", |object| object.qualified_name.as_str()),
                    MAX_DETAILED_CHILDREN,
                    descendants.len()
                );
            }
            for child in descendants.into_iter().take(MAX_DETAILED_CHILDREN) {
                let query = question.render(model, child);
                let explained = augmenter.explain(&PurposeRequest {
                    query: &query,
                    context: PromptContext {
                        object_source: model.source_of(child),
                        simplified_source: &shared.simplified_source,
                        file_summary: &shared.file_summary,
                        code_qa: &qa,
                    },
                    detailed: true,
                });
                if let Ok(child_text) = explained {
                    text.push_str(&format!("\n\n{}: {}", child.qualified_name, child_text));
                }
            }
        }
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::augment::tests::{settings, FailingGenerator, StubGenerator};
    use crate::query::answers::PURPOSE_PLACEHOLDER;
    use crate::query::questions::{QuestionScope, QuestionType};
    use crate::store::cache::ExistenceValidity;
    use crate::store::memory::MemoryDatasetStore;

    const FOO_SOURCE: &str = "class Bar:\n    pass\n\nclass Foo(Bar):\n    pass\n\ndef baz(x, y=1):\n    return Foo()\n";

    fn files() -> Vec<SourceFile> {
        vec![
            SourceFile::new("a.py", FOO_SOURCE),
            SourceFile::new("b.py", "def helper():\n    \"\"\"Help.\"\"\"\n    return 1\n"),
        ]
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            workers: 2,
            ..PipelineOptions::default()
        }
    }

    fn run(
        bank: &QuestionBank,
        store: &MemoryDatasetStore,
        augmenter: Option<&PurposeAugmenter>,
        options: PipelineOptions,
        files: &[SourceFile],
    ) -> RunReport {
        Pipeline::new(bank, store, &ExistenceValidity, augmenter, options)
            .run(files)
            .unwrap()
    }

    #[test]
    fn test_records_follow_discovery_order() {
        let bank = QuestionBank::default_bank();
        let store = MemoryDatasetStore::new();
        let report = run(&bank, &store, None, options(), &files());
        assert_eq!(report.files_generated, 2);

        let instruct = &report.corpus.instruct;
        let last_a = instruct
            .iter()
            .rposition(|r| r.instruction.contains("`a.py`"))
            .unwrap();
        let first_b = instruct
            .iter()
            .position(|r| r.instruction.contains("`b.py`"))
            .unwrap();
        assert!(last_a < first_b);
        assert!(report.corpus.train.is_none());
        assert_eq!(store.corpus().unwrap(), report.corpus);
        assert!(store.graph("a.py").is_some());
    }

    #[test]
    fn test_purpose_placeholder_without_augmentation() {
        let bank = QuestionBank::default_bank();
        let store = MemoryDatasetStore::new();
        let report = run(&bank, &store, None, options(), &files()[..1]);
        let purpose = report
            .corpus
            .instruct
            .iter()
            .find(|r| r.instruction == "Purpose of function: `baz` in Python file: `a.py`?")
            .unwrap();
        assert_eq!(purpose.output, PURPOSE_PLACEHOLDER);
        assert_eq!(purpose.input, "baz");
    }

    #[test]
    fn test_provider_failure_keeps_placeholder() {
        let bank = QuestionBank::default_bank();
        let store = MemoryDatasetStore::new();
        let augmenter = PurposeAugmenter::new(Arc::new(FailingGenerator), settings());
        let report = run(&bank, &store, Some(&augmenter), options(), &files());

        let purposes: Vec<&InstructionRecord> = report
            .corpus
            .instruct
            .iter()
            .filter(|r| r.instruction.starts_with("Purpose of"))
            .collect();
        assert!(!purposes.is_empty());
        assert!(purposes.iter().all(|r| r.output == PURPOSE_PLACEHOLDER));
        assert!(report.generation_failures > 0);
        // Later questions and files still answer.
        assert!(report
            .corpus
            .instruct
            .iter()
            .any(|r| r.instruction.starts_with("Docstring of function: `helper`") && r.output == "Help."));
    }

    #[test]
    fn test_augmented_run_produces_train() {
        let bank = QuestionBank::default_bank();
        let store = MemoryDatasetStore::new();
        let augmenter = PurposeAugmenter::new(Arc::new(StubGenerator("It builds Foo.")), settings());
        let report = run(&bank, &store, Some(&augmenter), options(), &files()[..1]);
        let purpose = report
            .corpus
            .instruct
            .iter()
            .find(|r| r.instruction.starts_with("Purpose of function: `baz`"))
            .unwrap();
        assert_eq!(purpose.output, "It builds Foo.");
        let train = report.corpus.train.unwrap();
        assert!(train.iter().all(|r| !r.instruction.is_empty()));
        assert_eq!(report.generation_failures, 0);
    }

    #[test]
    fn test_detailed_mode_appends_children() {
        let bank = QuestionBank::new(vec![Question::new(
            "file_purpose",
            "Purpose of `{filename}`?",
            QuestionScope::File,
            QuestionType::Purpose,
        )])
        .unwrap();
        let store = MemoryDatasetStore::new();
        let augmenter = PurposeAugmenter::new(Arc::new(StubGenerator("Explained.")), settings());
        let options = PipelineOptions {
            detailed: true,
            ..options()
        };
        let report = run(&bank, &store, Some(&augmenter), options, &files()[..1]);
        assert_eq!(
            report.corpus.instruct[0].output,
            "Explained.\n\nBar: Explained.\n\nFoo: Explained.\n\nbaz: Explained."
        );
    }

    #[test]
    fn test_detailed_mode_covers_nested_objects() {
        let bank = QuestionBank::new(vec![Question::new(
            "class_purpose",
            "Purpose of `{class_name}`?",
            QuestionScope::Class,
            QuestionType::Purpose,
        )])
        .unwrap();
        let store = MemoryDatasetStore::new();
        let augmenter = PurposeAugmenter::new(Arc::new(StubGenerator("E")), settings());
        let options = PipelineOptions {
            detailed: true,
            ..options()
        };
        let source = "class A:\n    def m(self):\n        def inner():\n            pass\n        return inner\n\n    def n(self):\n        pass\n";
        let files = vec![SourceFile::new("nested.py", source)];
        let report = run(&bank, &store, Some(&augmenter), options, &files);
        assert_eq!(
            report.corpus.instruct[0].output,
            "E\n\nA.m: E\n\nA.m.inner: E\n\nA.n: E"
        );
    }

    #[test]
    fn test_detailed_mode_caps_nested_objects() {
        let bank = QuestionBank::new(vec![Question::new(
            "file_purpose",
            "Purpose of `{filename}`?",
            QuestionScope::File,
            QuestionType::Purpose,
        )])
        .unwrap();
        let store = MemoryDatasetStore::new();
        let augmenter = PurposeAugmenter::new(Arc::new(StubGenerator("E")), settings());
        let options = PipelineOptions {
            detailed: true,
            ..options()
        };
        let source: String = (0..MAX_DETAILED_CHILDREN + 5)
            .map(|i| format!("def f{i}():\n    pass\n\n"))
            .collect();
        let files = vec![SourceFile::new("many.py", source)];
        let report = run(&bank, &store, Some(&augmenter), options, &files);
        let output = &report.corpus.instruct[0].output;
        assert_eq!(output.matches(": E").count(), MAX_DETAILED_CHILDREN);
        assert!(!output.contains(&format!("f{}: E", MAX_DETAILED_CHILDREN)));
    }

    #[test]
    fn test_inheritance_question_on_function_yields_no_record() {
        let bank = QuestionBank::new(vec![Question::new(
            "function_inheritance",
            "List base classes of `{function_name}`?",
            QuestionScope::Function,
            QuestionType::List,
        )])
        .unwrap();
        let store = MemoryDatasetStore::new();
        let report = run(&bank, &store, None, options(), &files());
        assert!(report.corpus.instruct.is_empty());
    }

    #[test]
    fn test_syntax_error_skips_file() {
        let bank = QuestionBank::default_bank();
        let store = MemoryDatasetStore::new();
        let mut input = files();
        input.insert(0, SourceFile::new("broken.py", "def oops(:\n"));
        let report = run(&bank, &store, None, options(), &input);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_generated, 2);
        assert!(!store.exists("broken.py"));
    }

    #[test]
    fn test_skip_regeneration_is_stable() {
        let bank = QuestionBank::default_bank();
        let store = MemoryDatasetStore::new();
        let skip = PipelineOptions {
            skip_regeneration: true,
            ..options()
        };
        let first = run(&bank, &store, None, skip.clone(), &files());
        let second = run(&bank, &store, None, skip, &files());
        assert_eq!(second.files_reused, 2);
        assert_eq!(
            serde_json::to_string(&first.corpus).unwrap(),
            serde_json::to_string(&second.corpus).unwrap()
        );
        assert_eq!(store.saved_count(), 2);
    }

    #[test]
    fn test_corrupt_cache_is_a_miss() {
        let bank = QuestionBank::default_bank();
        let store = MemoryDatasetStore::new();
        let skip = PipelineOptions {
            skip_regeneration: true,
            ..options()
        };
        let first = run(&bank, &store, None, skip.clone(), &files());
        store.corrupt("a.py");
        let second = run(&bank, &store, None, skip, &files());
        assert_eq!(second.files_reused, 1);
        assert_eq!(second.files_generated, 1);
        assert_eq!(first.corpus, second.corpus);
    }
}
