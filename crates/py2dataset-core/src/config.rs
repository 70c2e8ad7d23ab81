//! Run configuration and model configuration.
//!
//! `RunConfig` starts from defaults and takes `PY2DATASET_*` environment
//! overrides. `ModelConfig` is read from YAML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{DatasetError, DatasetResult};
use crate::query::guards::{
    clamp_int, clamp_workers, DEFAULT_CONTEXT_LENGTH, DEFAULT_GENERATION_TIMEOUT_SECS,
    DEFAULT_MAX_NEW_TOKENS, MAX_WORKERS, MIN_WORKERS,
};

pub const ENV_START: &str = "PY2DATASET_START";
pub const ENV_OUTPUT_DIR: &str = "PY2DATASET_OUTPUT_DIR";
pub const ENV_QUESTIONS: &str = "PY2DATASET_QUESTIONS";
pub const ENV_MODEL_CONFIG: &str = "PY2DATASET_MODEL_CONFIG";
pub const ENV_USE_LLM: &str = "PY2DATASET_USE_LLM";
pub const ENV_DETAILED: &str = "PY2DATASET_DETAILED";
pub const ENV_SINGLE_PROCESS: &str = "PY2DATASET_SINGLE_PROCESS";
pub const ENV_SKIP_REGEN: &str = "PY2DATASET_SKIP_REGEN";
pub const ENV_WORKERS: &str = "PY2DATASET_WORKERS";
pub const ENV_CACHE_VALIDITY: &str = "PY2DATASET_CACHE_VALIDITY";

const DEFAULT_OUTPUT_DIR: &str = "datasets";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Provide a concise and comprehensive explanation \
of the Python code below.\n\nContext:\n{context}\n\nQuestion: {query}\n\nAnswer:";

/// `0`, `false`, `no` and `off` (any case) are false, anything else is true.
pub fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    !matches!(v.as_str(), "0" | "false" | "no" | "off")
}

/// Which prior per-file datasets skip-regeneration may reuse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheValidityMode {
    /// Any prior dataset for the file.
    #[default]
    Existence,
    /// Only a prior dataset built from identical source text.
    ContentHash,
}

impl CacheValidityMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "existence" | "exists" => Some(Self::Existence),
            "content_hash" | "hash" | "sha256" => Some(Self::ContentHash),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// File or directory to scan.
    pub start: PathBuf,
    pub output_dir: PathBuf,
    /// JSON question bank; the built-in bank when unset.
    pub questions_path: Option<PathBuf>,
    pub model_config_path: Option<PathBuf>,
    pub use_llm: bool,
    pub detailed: bool,
    pub single_process: bool,
    pub skip_regen: bool,
    /// Worker count; the available parallelism when unset.
    pub workers: Option<usize>,
    pub cache_validity: CacheValidityMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start: PathBuf::from("."),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            questions_path: None,
            model_config_path: None,
            use_llm: false,
            detailed: false,
            single_process: false,
            skip_regen: false,
            workers: None,
            cache_validity: CacheValidityMode::Existence,
        }
    }
}

impl RunConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from `lookup`. Blank values are ignored, invalid ones
    /// are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(v) = get(ENV_START) {
            self.start = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_QUESTIONS) {
            self.questions_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_MODEL_CONFIG) {
            self.model_config_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_USE_LLM) {
            self.use_llm = parse_bool(&v);
        }
        if let Some(v) = get(ENV_DETAILED) {
            self.detailed = parse_bool(&v);
        }
        if let Some(v) = get(ENV_SINGLE_PROCESS) {
            self.single_process = parse_bool(&v);
        }
        if let Some(v) = get(ENV_SKIP_REGEN) {
            self.skip_regen = parse_bool(&v);
        }
        if let Some(v) = get(ENV_WORKERS) {
            match v.parse::<i64>() {
                Ok(n) => {
                    self.workers =
                        Some(clamp_int(n, MIN_WORKERS as i64, MAX_WORKERS as i64) as usize)
                }
                Err(_) => warn!("Ignoring invalid {}={:?}", ENV_WORKERS, v),
            }
        }
        if let Some(v) = get(ENV_CACHE_VALIDITY) {
            match CacheValidityMode::parse(&v) {
                Some(mode) => self.cache_validity = mode,
                None => warn!("Ignoring invalid {}={:?}", ENV_CACHE_VALIDITY, v),
            }
        }
    }

    /// Effective worker count: one in single-process mode.
    pub fn worker_count(&self) -> usize {
        if self.single_process {
            return 1;
        }
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        clamp_workers(self.workers.unwrap_or(available))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub context_length: usize,
    pub max_new_tokens: usize,
    pub threads: usize,
    pub reset: bool,
    pub timeout_secs: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            context_length: DEFAULT_CONTEXT_LENGTH,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            threads: 4,
            reset: true,
            timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceModel {
    pub model_path: String,
    /// Generator command line; the first element is the program.
    pub command: Vec<String>,
    pub model_params: ModelParams,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub prompt_template: String,
    pub inference_model: InferenceModel,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            inference_model: InferenceModel::default(),
        }
    }
}

impl ModelConfig {
    pub fn from_yaml_str(yaml: &str) -> DatasetResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> DatasetResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            DatasetError::Config(format!("cannot read model config {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> DatasetResult<()> {
        for placeholder in ["{context}", "{query}"] {
            if !self.prompt_template.contains(placeholder) {
                return Err(DatasetError::Config(format!(
                    "prompt_template must contain {placeholder}"
                )));
            }
        }
        if self.inference_model.model_params.context_length == 0 {
            return Err(DatasetError::Config(
                "context_length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
