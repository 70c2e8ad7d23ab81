pub mod cache;
pub mod dataset;
pub mod json;
pub mod memory;

use crate::errors::{AssemblyError, DatasetResult};
use crate::store::dataset::{CorpusDataset, InstructionRecord};

/// Everything persisted for one processed file.
#[derive(Clone, Debug, PartialEq)]
pub struct FileArtifact {
    pub file_id: String,
    pub records: Vec<InstructionRecord>,
    /// Rendering of the file's relationship graph.
    pub graph: serde_json::Value,
    /// Content fingerprint of the source the records were built from.
    pub fingerprint: String,
}

/// Output port for per-file and corpus datasets.
pub trait DatasetStore: Send + Sync {
    fn exists(&self, file_id: &str) -> bool;

    fn load(&self, file_id: &str) -> Result<Vec<InstructionRecord>, AssemblyError>;

    fn stored_fingerprint(&self, file_id: &str) -> Option<String>;

    fn save(&self, artifact: &FileArtifact) -> DatasetResult<()>;

    fn save_corpus(&self, corpus: &CorpusDataset) -> DatasetResult<()>;
}
