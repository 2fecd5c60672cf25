use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::locator::MatrixSource;
use super::{Persisted, SkipReason, Skipped, persist};
use crate::data::loader;
use crate::data::model::{Row, Table};
use crate::data::writer::OutputFormat;
use crate::error::{PipelineError, Result};

/// Unique cell identifier of the YKR grid.
pub const GRID_ID_COLUMN: &str = "YKR_ID";
/// Origin cell of a matrix row.
pub const FROM_ID_COLUMN: &str = "from_id";
/// Grid columns that are redundant once the matrix has been joined on.
pub const HOUSEKEEPING_COLUMNS: &[&str] = &[GRID_ID_COLUMN, "x", "y"];
pub const JOIN_OUTPUT_PREFIX: &str = "time_to_";

/// Where persisted tables go and in which format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub format: OutputFormat,
}

impl OutputTarget {
    pub fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.{}", self.format.extension()))
    }

    pub(super) fn validate(&self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(PipelineError::InvalidInput(format!(
                "output directory {} does not exist",
                self.dir.display()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JoinOptions {
    /// `None` keeps the joined tables in memory.
    pub output: Option<OutputTarget>,
    /// Warn about and skip identifiers without a matrix file instead of
    /// aborting the whole run.
    pub skip_missing: bool,
    pub overwrite: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            output: None,
            skip_missing: true,
            overwrite: true,
        }
    }
}

/// Result for one processed identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Joined {
    Table(Table),
    Written(PathBuf),
}

#[derive(Debug, Default)]
pub struct JoinReport {
    /// Successfully processed identifiers, in input order.
    pub results: Vec<(u64, Joined)>,
    pub skipped: Vec<Skipped>,
}

impl JoinReport {
    /// In-memory tables, ready to be handed to the comparator.
    pub fn into_tables(self) -> Vec<Table> {
        self.results
            .into_iter()
            .filter_map(|(_, joined)| match joined {
                Joined::Table(table) => Some(table),
                Joined::Written(_) => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MatrixJoiner
// ---------------------------------------------------------------------------

/// Joins the grid against per-target matrix files. The grid is borrowed for
/// the whole batch and never modified.
pub struct MatrixJoiner<'a, S: MatrixSource> {
    grid: &'a Table,
    /// YKR_ID → row index in `grid`.
    grid_index: HashMap<i64, usize>,
    source: &'a S,
}

impl<'a, S: MatrixSource> MatrixJoiner<'a, S> {
    /// Index the grid by its identifier column. Missing, non-integer or
    /// repeated identifiers make the grid unusable.
    pub fn new(grid: &'a Table, source: &'a S) -> Result<Self> {
        if grid.is_empty() {
            return Err(PipelineError::InvalidInput("grid table is empty".into()));
        }
        if !grid.has_column(GRID_ID_COLUMN) {
            return Err(PipelineError::InvalidInput(format!(
                "grid table has no '{GRID_ID_COLUMN}' column"
            )));
        }
        let mut grid_index = HashMap::with_capacity(grid.len());
        for (i, row) in grid.rows.iter().enumerate() {
            let id = row.get(GRID_ID_COLUMN).and_then(|v| v.as_i64()).ok_or_else(|| {
                PipelineError::InvalidInput(format!("grid row {i} has no integer {GRID_ID_COLUMN}"))
            })?;
            if grid_index.insert(id, i).is_some() {
                return Err(PipelineError::InvalidInput(format!(
                    "grid {GRID_ID_COLUMN} {id} is not unique"
                )));
            }
        }
        Ok(MatrixJoiner {
            grid,
            grid_index,
            source,
        })
    }

    /// Process `ids` in order. A missing matrix file either aborts the run
    /// with [`PipelineError::MissingInput`] or is recorded and skipped,
    /// depending on `options.skip_missing`.
    pub fn run(&self, ids: &[u64], options: &JoinOptions) -> Result<JoinReport> {
        if ids.is_empty() {
            return Err(PipelineError::InvalidInput("no grid IDs given".into()));
        }
        if let Some(zero) = ids.iter().find(|&&id| id == 0) {
            return Err(PipelineError::InvalidInput(format!("grid ID {zero} is not positive")));
        }
        if let Some(target) = &options.output {
            target.validate()?;
        }

        let mut report = JoinReport::default();
        let total = ids.len();

        for (k, &id) in ids.iter().enumerate() {
            let name = self.source.expected_name(id);
            info!("Processing file \"{name}\"... Progress: {}/{total}", k + 1);

            let Some(path) = self.source.locate(id) else {
                if !options.skip_missing {
                    return Err(PipelineError::MissingInput { id, name });
                }
                warn!("file \"{name}\" does not exist! Skipping grid ID {id}.");
                report.skipped.push(Skipped {
                    id: Some(id),
                    reason: SkipReason::MissingInput(name),
                });
                continue;
            };

            let matrix = loader::load_matrix(&path)?;
            let joined = self.join_matrix(&matrix, &path)?;
            if joined.is_empty() {
                warn!("no origin in \"{name}\" matches a grid cell, the table for grid ID {id} is empty.");
            }

            match &options.output {
                None => report.results.push((id, Joined::Table(joined))),
                Some(target) => {
                    let out = target.path_for(&format!("{JOIN_OUTPUT_PREFIX}{id}"));
                    match persist(&joined, &out, options.overwrite)? {
                        Persisted::Written(p) => report.results.push((id, Joined::Written(p))),
                        Persisted::Collision(p) => report.skipped.push(Skipped {
                            id: Some(id),
                            reason: SkipReason::OutputCollision(p),
                        }),
                    }
                }
            }
        }

        if options.output.is_some() {
            info!("{} file(s) written successfully!", report.results.len());
        } else {
            info!("{} input file(s) processed successfully!", report.results.len());
        }
        Ok(report)
    }

    /// Inner join of grid `YKR_ID` with matrix `from_id`, in grid order.
    /// Housekeeping columns are dropped from the result.
    pub fn join_matrix(&self, matrix: &Table, location: &Path) -> Result<Table> {
        if !matrix.has_column(FROM_ID_COLUMN) {
            return Err(PipelineError::malformed(
                Some(location.to_path_buf()),
                format!("no '{FROM_ID_COLUMN}' column"),
            ));
        }
        if let Some(clash) = matrix.columns.iter().find(|c| self.grid.has_column(c)) {
            return Err(PipelineError::malformed(
                Some(location.to_path_buf()),
                format!("column '{clash}' also exists in the grid"),
            ));
        }

        // Origins absent from the grid never match and are dropped here.
        let mut by_origin: HashMap<i64, Vec<&Row>> = HashMap::new();
        for row in &matrix.rows {
            if let Some(from) = row.get(FROM_ID_COLUMN).and_then(|v| v.as_i64()) {
                if self.grid_index.contains_key(&from) {
                    by_origin.entry(from).or_default().push(row);
                }
            }
        }

        let mut rows = Vec::new();
        for grid_row in &self.grid.rows {
            let Some(id) = grid_row.get(GRID_ID_COLUMN).and_then(|v| v.as_i64()) else {
                continue;
            };
            for matrix_row in by_origin.get(&id).into_iter().flatten() {
                let mut values = grid_row.values.clone();
                values.extend(matrix_row.values.iter().map(|(k, v)| (k.clone(), v.clone())));
                rows.push(Row {
                    geometry: grid_row.geometry.clone(),
                    values,
                });
            }
        }

        let mut joined = Table {
            columns: self
                .grid
                .columns
                .iter()
                .chain(matrix.columns.iter())
                .cloned()
                .collect(),
            rows,
            crs: self.grid.crs.clone(),
        };
        joined.drop_columns(HOUSEKEEPING_COLUMNS);
        Ok(joined)
    }
}
