//! py2dataset core library: turns Python source trees into instruction
//! datasets.
//!
//! Each discovered file is parsed into a [`models::CodeModel`], linked into a
//! relationship graph, and questioned through a [`query::questions::QuestionBank`].
//! Purpose questions can be answered by an injected text generator. Records
//! are persisted per file as soon as the file is done and merged into a
//! corpus at the end of the run.

pub mod augment;
pub mod config;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod query;
pub mod store;

use std::sync::Arc;

use tracing::{info, warn};

use crate::augment::command::CommandGenerator;
use crate::augment::{AugmenterSettings, PurposeAugmenter};
use crate::config::{ModelConfig, RunConfig};
use crate::errors::{DatasetError, DatasetResult};
use crate::indexer::filesystem::load_source_files;
use crate::indexer::pipeline::{Pipeline, PipelineOptions, RunReport};
use crate::query::questions::QuestionBank;
use crate::store::cache::validity_for;
use crate::store::json::JsonDatasetStore;

/// Run the whole pipeline for `config`. Only configuration problems fail the
/// run; per-file problems are logged and reflected in the report.
pub fn run(config: &RunConfig) -> DatasetResult<RunReport> {
    let bank = match &config.questions_path {
        Some(path) => QuestionBank::from_file(path)?,
        None => QuestionBank::default_bank(),
    };

    let augmenter = if config.use_llm {
        let path = config.model_config_path.as_ref().ok_or_else(|| {
            DatasetError::Config("augmentation requires a model configuration".to_string())
        })?;
        let model_config = ModelConfig::from_file(path)?;
        let generator = CommandGenerator::from_config(&model_config).ok_or_else(|| {
            DatasetError::Config(format!(
                "model configuration {} has no generator command",
                path.display()
            ))
        })?;
        if !bank.has_augmentable() {
            warn!("No purpose question allows augmentation; outputs keep their placeholders");
        }
        info!("Augmenting purpose answers with {}", generator.program());
        Some(PurposeAugmenter::new(
            Arc::new(generator),
            AugmenterSettings::from(&model_config),
        ))
    } else {
        None
    };

    let store = JsonDatasetStore::new(&config.output_dir);
    let validity = validity_for(config.cache_validity);
    let files = load_source_files(&config.start);
    let options = PipelineOptions {
        workers: config.worker_count(),
        skip_regeneration: config.skip_regen,
        detailed: config.detailed,
    };

    Pipeline::new(&bank, &store, validity.as_ref(), augmenter.as_ref(), options).run(&files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::store::dataset::InstructionRecord;

    #[test]
    fn test_run_writes_corpus_and_per_file_datasets() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("pkg")).unwrap();
        fs::write(src.path().join("pkg/shapes.py"), "class Shape:\n    pass\n\nclass Square(Shape):\n    pass\n").unwrap();
        fs::write(src.path().join("main.py"), "from pkg.shapes import Square\n\ndef build():\n    return Square()\n").unwrap();

        let config = RunConfig {
            start: src.path().to_path_buf(),
            output_dir: out.path().to_path_buf(),
            single_process: true,
            ..RunConfig::default()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.files_generated, 2);

        let corpus: Vec<InstructionRecord> =
            serde_json::from_str(&fs::read_to_string(out.path().join("instruct.json")).unwrap()).unwrap();
        assert_eq!(corpus, report.corpus.instruct);
        assert!(corpus[0].instruction.contains("`main.py`"));
        assert!(out.path().join("pkg/shapes.py.instruct.json").is_file());
        assert!(out.path().join("pkg/shapes.py.graph.json").is_file());
        assert!(!out.path().join("train.json").exists());
    }

    #[test]
    fn test_second_run_with_skip_regen_keeps_corpus_bytes() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.py"), "def first():\n    return second()\n\ndef second():\n    pass\n").unwrap();
        fs::write(src.path().join("b.py"), "import os\n\nclass Paths:\n    root = os.getcwd()\n").unwrap();

        let config = RunConfig {
            start: src.path().to_path_buf(),
            output_dir: out.path().to_path_buf(),
            workers: Some(2),
            skip_regen: true,
            ..RunConfig::default()
        };
        let first = run(&config).unwrap();
        assert_eq!(first.files_generated, 2);
        let before = fs::read(out.path().join("instruct.json")).unwrap();

        let second = run(&config).unwrap();
        assert_eq!(second.files_reused, 2);
        assert_eq!(second.files_generated, 0);
        assert_eq!(fs::read(out.path().join("instruct.json")).unwrap(), before);
    }

    #[test]
    fn test_run_with_llm_requires_model_config() {
        let src = tempfile::tempdir().unwrap();
        let config = RunConfig {
            start: src.path().to_path_buf(),
            output_dir: src.path().join("out"),
            use_llm: true,
            ..RunConfig::default()
        };
        assert!(matches!(run(&config), Err(DatasetError::Config(_))));
    }

    #[test]
    fn test_run_with_invalid_question_bank() {
        let src = tempfile::tempdir().unwrap();
        let bank = src.path().join("questions.json");
        fs::write(&bank, "[]").unwrap();
        let config = RunConfig {
            start: src.path().to_path_buf(),
            output_dir: src.path().join("out"),
            questions_path: Some(bank),
            ..RunConfig::default()
        };
        assert!(matches!(run(&config), Err(DatasetError::Config(_))));
    }
}
