//! JSON files under an output directory.
//!
//! Layout, for a source file `pkg/mod.py`:
//!
//! ```text
//! <root>/pkg/mod.py.instruct.json   records
//! <root>/pkg/mod.py.graph.json      relationship graph rendering
//! <root>/pkg/mod.py.sha256          content fingerprint
//! <root>/instruct.json              corpus
//! <root>/train.json                 corpus train view, augmented runs only
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{AssemblyError, DatasetResult};
use crate::store::dataset::{CorpusDataset, InstructionRecord};
use crate::store::{DatasetStore, FileArtifact};

const INSTRUCT_SUFFIX: &str = ".instruct.json";
const GRAPH_SUFFIX: &str = ".graph.json";
const FINGERPRINT_SUFFIX: &str = ".sha256";
pub const CORPUS_INSTRUCT_FILE: &str = "instruct.json";
pub const CORPUS_TRAIN_FILE: &str = "train.json";

#[derive(Clone, Debug)]
pub struct JsonDatasetStore {
    root: PathBuf,
}

impl JsonDatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, file_id: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{file_id}{suffix}"))
    }
}

/// Write through a sibling temp file and rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
    }
    fs::rename(&temp_path, path)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> DatasetResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)?;
    Ok(())
}

impl DatasetStore for JsonDatasetStore {
    fn exists(&self, file_id: &str) -> bool {
        self.path_for(file_id, INSTRUCT_SUFFIX).is_file()
    }

    fn load(&self, file_id: &str) -> Result<Vec<InstructionRecord>, AssemblyError> {
        let path = self.path_for(file_id, INSTRUCT_SUFFIX);
        let text = fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AssemblyError::Missing {
                    file: file_id.to_string(),
                }
            } else {
                AssemblyError::Unreadable {
                    file: file_id.to_string(),
                    source,
                }
            }
        })?;
        serde_json::from_str(&text).map_err(|e| AssemblyError::Corrupt {
            file: file_id.to_string(),
            reason: e.to_string(),
        })
    }

    fn stored_fingerprint(&self, file_id: &str) -> Option<String> {
        fs::read_to_string(self.path_for(file_id, FINGERPRINT_SUFFIX))
            .ok()
            .map(|text| text.trim().to_string())
    }

    fn save(&self, artifact: &FileArtifact) -> DatasetResult<()> {
        write_json(&self.path_for(&artifact.file_id, GRAPH_SUFFIX), &artifact.graph)?;
        write_atomic(
            &self.path_for(&artifact.file_id, FINGERPRINT_SUFFIX),
            format!("{}\n", artifact.fingerprint).as_bytes(),
        )?;
        // Records last: their presence marks the file as done.
        write_json(
            &self.path_for(&artifact.file_id, INSTRUCT_SUFFIX),
            &artifact.records,
        )?;
        debug!(
            "Saved {} records for {}",
            artifact.records.len(),
            artifact.file_id
        );
        Ok(())
    }

    fn save_corpus(&self, corpus: &CorpusDataset) -> DatasetResult<()> {
        write_json(&self.root.join(CORPUS_INSTRUCT_FILE), &corpus.instruct)?;
        let train_path = self.root.join(CORPUS_TRAIN_FILE);
        match &corpus.train {
            Some(train) => write_json(&train_path, train)?,
            None if train_path.exists() => fs::remove_file(&train_path)?,
            None => {}
        }
        info!(
            "Wrote corpus of {} records to {}",
            corpus.instruct.len(),
            self.root.display()
        );
        Ok(())
    }
}
