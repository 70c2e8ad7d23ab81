//! Filesystem scanning: discovery of Python sources under a start location.
//!
//! Discovery honours `.gitignore`, `.ignore` and git exclude files (even
//! outside a git checkout) and always skips the directories listed in
//! [`IMPLICIT_IGNORED_DIRS`]. The result is sorted so corpus order does not
//! depend on directory iteration order.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::models::SourceFile;

const PYTHON_EXTENSION: &str = "py";

const IMPLICIT_IGNORED_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    "node_modules",
];

fn is_python_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PYTHON_EXTENSION))
}

/// POSIX-style identifier of `path` relative to `root`. A root that is itself
/// a file is identified by its file name.
pub fn relative_id(root: &Path, path: &Path) -> String {
    let relative = match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| path.to_path_buf()),
    };
    relative.to_string_lossy().replace('\\', "/")
}

/// All `.py` files under `root`, sorted by relative identifier.
pub fn iter_python_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return if is_python_file(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .ignore(true)
        .require_git(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| IMPLICIT_IGNORED_DIRS.contains(&name)))
        })
        .build();

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Walker error: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_some_and(|t| t.is_file()) && is_python_file(path) {
            files.push(path.to_path_buf());
        }
    }
    files.sort_by_key(|path| relative_id(root, path));
    debug!("Discovered {} Python files under {}", files.len(), root.display());
    files
}

/// Read every discovered file. Unreadable or non-UTF-8 files are skipped
/// with a warning.
pub fn load_source_files(root: &Path) -> Vec<SourceFile> {
    iter_python_files(root)
        .into_iter()
        .filter_map(|path| match std::fs::read_to_string(&path) {
            Ok(source) => Some(SourceFile::new(relative_id(root, &path), source)),
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}
