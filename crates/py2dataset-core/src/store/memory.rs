//! In-memory dataset store for tests and embedding.
//!
//! Records are kept as serialized JSON so loading goes through the same
//! decoding as the file store.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::errors::{AssemblyError, DatasetResult};
use crate::store::dataset::{CorpusDataset, InstructionRecord};
use crate::store::{DatasetStore, FileArtifact};

#[derive(Debug, Default)]
struct Entry {
    records: String,
    graph: serde_json::Value,
    fingerprint: String,
}

#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    files: Mutex<HashMap<String, Entry>>,
    corpus: Mutex<Option<CorpusDataset>>,
    saves: Mutex<usize>,
}

impl MemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored records of `file_id` with undecodable text.
    pub fn corrupt(&self, file_id: &str) {
        if let Some(entry) = self.files.lock().get_mut(file_id) {
            entry.records = "not json".to_string();
        }
    }

    /// Number of per-file saves so far.
    pub fn saved_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn corpus(&self) -> Option<CorpusDataset> {
        self.corpus.lock().clone()
    }

    pub fn graph(&self, file_id: &str) -> Option<serde_json::Value> {
        self.files.lock().get(file_id).map(|entry| entry.graph.clone())
    }
}

impl DatasetStore for MemoryDatasetStore {
    fn exists(&self, file_id: &str) -> bool {
        self.files.lock().contains_key(file_id)
    }

    fn load(&self, file_id: &str) -> Result<Vec<InstructionRecord>, AssemblyError> {
        let files = self.files.lock();
        let entry = files.get(file_id).ok_or_else(|| AssemblyError::Missing {
            file: file_id.to_string(),
        })?;
        serde_json::from_str(&entry.records).map_err(|e| AssemblyError::Corrupt {
            file: file_id.to_string(),
            reason: e.to_string(),
        })
    }

    fn stored_fingerprint(&self, file_id: &str) -> Option<String> {
        self.files
            .lock()
            .get(file_id)
            .map(|entry| entry.fingerprint.clone())
    }

    fn save(&self, artifact: &FileArtifact) -> DatasetResult<()> {
        let entry = Entry {
            records: serde_json::to_string(&artifact.records)?,
            graph: artifact.graph.clone(),
            fingerprint: artifact.fingerprint.clone(),
        };
        self.files.lock().insert(artifact.file_id.clone(), entry);
        *self.saves.lock() += 1;
        Ok(())
    }

    fn save_corpus(&self, corpus: &CorpusDataset) -> DatasetResult<()> {
        *self.corpus.lock() = Some(corpus.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_entry_fails_to_load() {
        let store = MemoryDatasetStore::new();
        store
            .save(&FileArtifact {
                file_id: "a.py".to_string(),
                records: vec![InstructionRecord::new("q", "", "a")],
                graph: serde_json::json!({}),
                fingerprint: String::new(),
            })
            .unwrap();
        assert_eq!(store.load("a.py").unwrap().len(), 1);
        store.corrupt("a.py");
        assert!(matches!(store.load("a.py"), Err(AssemblyError::Corrupt { .. })));
        assert!(matches!(store.load("b.py"), Err(AssemblyError::Missing { .. })));
        assert_eq!(store.saved_count(), 1);
    }
}
