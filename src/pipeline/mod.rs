//! The two processing stages and the output policy they share.
//!
//! ```text
//!   grid table ──┐
//!                ├─ join ──► per-target tables ─┬─► time_to_<id>.<ext>
//!   matrix dir ──┘                              │
//!                                               └─ compare ──► Accessibility_<to_id>_<a>_vs_<b>.<ext>
//! ```

pub mod compare;
pub mod join;
pub mod locator;

use std::fmt;
use std::path::{Path, PathBuf};

use log::warn;

use crate::data::model::Table;
use crate::data::writer;
use crate::error::Result;

/// Why a single item of a batch produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The matrix file for the identifier does not exist.
    MissingInput(String),
    /// The output file exists and overwriting is disabled.
    OutputCollision(PathBuf),
    /// The table has no rows, so there is nothing to derive an output from.
    EmptyTable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingInput(name) => write!(f, "file \"{name}\" does not exist"),
            SkipReason::OutputCollision(path) => {
                write!(f, "file \"{}\" already exists, not saving", path.display())
            }
            SkipReason::EmptyTable(source) => write!(f, "{source} has no rows"),
        }
    }
}

/// A non-fatal skip event, keyed by grid ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// `None` when the skipped table carries no usable identifier.
    pub id: Option<u64>,
    pub reason: SkipReason,
}

/// One closing line listing every skipped item, or `None` if nothing was
/// skipped.
pub fn skip_summary(skipped: &[Skipped]) -> Option<String> {
    if skipped.is_empty() {
        return None;
    }
    let items: Vec<String> = skipped
        .iter()
        .map(|s| match s.id {
            Some(id) => format!("{id} ({})", s.reason),
            None => s.reason.to_string(),
        })
        .collect();
    Some(format!("{} item(s) skipped: {}", skipped.len(), items.join("; ")))
}

/// Outcome of writing one table under the overwrite policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    Written(PathBuf),
    Collision(PathBuf),
}

/// Write `table` to `path` unless the file exists and `overwrite` is off.
/// Both the overwrite and the skip are announced before they happen.
pub fn persist(table: &Table, path: &Path, overwrite: bool) -> Result<Persisted> {
    if path.exists() {
        if !overwrite {
            warn!("file \"{}\" already exists! Not saving the new data.", path.display());
            return Ok(Persisted::Collision(path.to_path_buf()));
        }
        warn!("overwriting an existing file \"{}\"!", path.display());
    }
    writer::write_table(table, path)?;
    Ok(Persisted::Written(path.to_path_buf()))
}
