//! Validity predicates for skip-regeneration.

use sha2::{Digest, Sha256};

use crate::config::CacheValidityMode;
use crate::models::SourceFile;
use crate::store::DatasetStore;

/// SHA-256 of the source text, lower-case hex.
pub fn content_fingerprint(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Decides whether the stored dataset of a file may be reused.
pub trait CacheValidity: Send + Sync {
    fn is_valid(&self, store: &dyn DatasetStore, file: &SourceFile) -> bool;
}

/// Any prior dataset is reused.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExistenceValidity;

impl CacheValidity for ExistenceValidity {
    fn is_valid(&self, store: &dyn DatasetStore, file: &SourceFile) -> bool {
        store.exists(&file.id)
    }
}

/// A prior dataset is reused only when it was built from the same text.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContentHashValidity;

impl CacheValidity for ContentHashValidity {
    fn is_valid(&self, store: &dyn DatasetStore, file: &SourceFile) -> bool {
        store.exists(&file.id)
            && store
                .stored_fingerprint(&file.id)
                .is_some_and(|stored| stored == content_fingerprint(&file.source))
    }
}

pub fn validity_for(mode: CacheValidityMode) -> Box<dyn CacheValidity> {
    match mode {
        CacheValidityMode::Existence => Box::new(ExistenceValidity),
        CacheValidityMode::ContentHash => Box::new(ContentHashValidity),
    }
}
