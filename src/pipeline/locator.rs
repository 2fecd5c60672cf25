use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use crate::modes::SchemaVersion;

/// Resolves the matrix file of a target grid cell.
pub trait MatrixSource {
    /// Path of the matrix file for `id`, or `None` when it is not available.
    fn locate(&self, id: u64) -> Option<PathBuf>;

    /// Name the file would have; used in messages when it is missing.
    fn expected_name(&self, id: u64) -> String;
}

/// File name → path index over a matrix directory tree.
///
/// Release archives spread the matrix files over per-block subdirectories
/// (`5785xxx/travel_times_to_ 5785640.txt`), so the tree is walked once up
/// front and every lookup afterwards is a hash probe.
#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    schema: SchemaVersion,
    files: HashMap<String, PathBuf>,
}

impl DirectoryIndex {
    pub fn scan(root: &Path, schema: SchemaVersion) -> Result<Self> {
        let mut files = HashMap::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("listing matrix directory {}", dir.display()))?;
            for entry in entries {
                let entry = entry.with_context(|| format!("reading {}", dir.display()))?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    pending.push(path);
                } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    // First hit wins; duplicates in sibling blocks are ignored.
                    files.entry(name.to_string()).or_insert(path);
                }
            }
        }

        debug!("indexed {} files under {}", files.len(), root.display());
        Ok(DirectoryIndex { schema, files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

impl MatrixSource for DirectoryIndex {
    fn locate(&self, id: u64) -> Option<PathBuf> {
        self.files.get(&self.expected_name(id)).cloned()
    }

    fn expected_name(&self, id: u64) -> String {
        self.schema.matrix_file_name(id)
    }
}
