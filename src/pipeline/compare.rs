use std::path::{Path, PathBuf};

use log::{info, warn};

use super::join::OutputTarget;
use super::{Persisted, SkipReason, Skipped, persist};
use crate::data::model::{FieldValue, SENTINEL, Table, TableRef};
use crate::error::{PipelineError, Result};
use crate::modes::{ModePair, UnitFamily};

/// Derived column holding `first - second`.
pub const DIFFERENCE_COLUMN: &str = "Time_Dist";
/// Destination cell of a matrix row; constant within one joined table.
pub const TO_ID_COLUMN: &str = "to_id";
pub const COMPARE_OUTPUT_PREFIX: &str = "Accessibility_";

#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Directory for newly named outputs. May be omitted only when every
    /// input is a persisted table and `overwrite` is set, in which case the
    /// inputs are updated in place.
    pub output: Option<OutputTarget>,
    pub overwrite: bool,
}

#[derive(Debug, Default)]
pub struct CompareReport {
    /// Files actually written, in input order.
    pub written: Vec<PathBuf>,
    pub skipped: Vec<Skipped>,
}

/// `a - b`, or the sentinel when either side is missing. `None` when a
/// value is not numeric at all.
pub fn difference(a: &FieldValue, b: &FieldValue) -> Option<FieldValue> {
    let missing = |v: &FieldValue| v.is_sentinel() || matches!(v, FieldValue::Null);
    if missing(a) || missing(b) {
        return Some(FieldValue::Integer(SENTINEL));
    }
    match (a, b) {
        (FieldValue::Integer(x), FieldValue::Integer(y)) => Some(match x.checked_sub(*y) {
            Some(d) => FieldValue::Integer(d),
            None => FieldValue::Float(*x as f64 - *y as f64),
        }),
        _ => Some(FieldValue::Float(a.as_f64()? - b.as_f64()?)),
    }
}

/// Add the [`DIFFERENCE_COLUMN`] to `table` and return its destination ID.
pub fn attach_difference(
    table: &mut Table,
    pair: &ModePair,
    location: Option<&Path>,
) -> Result<u64> {
    let malformed = |reason: String| PipelineError::malformed(location.map(Path::to_path_buf), reason);

    for column in [pair.first.name, pair.second.name, TO_ID_COLUMN] {
        if !table.has_column(column) {
            return Err(malformed(format!("no '{column}' column")));
        }
    }
    let to_id = table
        .value(0, TO_ID_COLUMN)
        .and_then(FieldValue::as_i64)
        .and_then(|id| u64::try_from(id).ok())
        .ok_or_else(|| malformed(format!("no usable '{TO_ID_COLUMN}' in the first row")))?;

    let mut derived = Vec::with_capacity(table.len());
    for (i, row) in table.rows.iter().enumerate() {
        let a = row.get(pair.first.name).unwrap_or(&FieldValue::Null);
        let b = row.get(pair.second.name).unwrap_or(&FieldValue::Null);
        let value = difference(a, b)
            .ok_or_else(|| malformed(format!("row {i}: '{a}' - '{b}' is not numeric")))?;
        derived.push(value);
    }
    table.push_column(DIFFERENCE_COLUMN, derived)?;
    Ok(to_id)
}

/// `Accessibility_<to_id>_<labelA>_vs_<labelB>`
pub fn output_stem(to_id: u64, pair: &ModePair) -> String {
    format!(
        "{COMPARE_OUTPUT_PREFIX}{to_id}_{}_vs_{}",
        pair.first.label, pair.second.label
    )
}

// ---------------------------------------------------------------------------
// ModeComparator
// ---------------------------------------------------------------------------

pub struct ModeComparator {
    pair: ModePair,
    options: CompareOptions,
}

impl ModeComparator {
    pub fn new(pair: ModePair, options: CompareOptions) -> Self {
        Self { pair, options }
    }

    /// Everything that can be checked without reading a table.
    fn validate(&self, tables: &[TableRef]) -> Result<()> {
        if tables.is_empty() {
            return Err(PipelineError::InvalidInput("no tables to compare".into()));
        }
        match &self.options.output {
            Some(target) => target.validate(),
            None if !self.options.overwrite => Err(PipelineError::InvalidInput(
                "either an output directory or overwriting the input files is required".into(),
            )),
            None if tables.iter().any(|t| t.path().is_none()) => Err(PipelineError::InvalidInput(
                "in-memory tables need an output directory".into(),
            )),
            None => Ok(()),
        }
    }

    pub fn run(&self, tables: Vec<TableRef>) -> Result<CompareReport> {
        self.validate(&tables)?;

        let what = match self.pair.family() {
            UnitFamily::Time => "travel times",
            UnitFamily::Distance => "distances",
        };
        let total = tables.len();
        let mut report = CompareReport::default();

        for (k, table_ref) in tables.into_iter().enumerate() {
            let (mut table, source) = table_ref.resolve()?;
            if table.is_empty() {
                let what = match &source {
                    Some(path) => format!("file \"{}\"", path.display()),
                    None => format!("in-memory table {}", k + 1),
                };
                warn!("{what} has no rows! Skipping it.");
                report.skipped.push(Skipped {
                    id: None,
                    reason: SkipReason::EmptyTable(what),
                });
                continue;
            }
            let to_id = attach_difference(&mut table, &self.pair, source.as_deref())?;
            info!("Calculating {what} to grid ID {to_id}... Progress: {}/{total}", k + 1);

            let destination = match (&source, &self.options.output) {
                (Some(path), _) if self.options.overwrite => path.clone(),
                (_, Some(target)) => target.path_for(&output_stem(to_id, &self.pair)),
                (_, None) => {
                    return Err(PipelineError::InvalidInput(
                        "no output directory for comparison results".into(),
                    ))
                }
            };

            match persist(&table, &destination, self.options.overwrite)? {
                Persisted::Written(path) => report.written.push(path),
                Persisted::Collision(path) => report.skipped.push(Skipped {
                    id: Some(to_id),
                    reason: SkipReason::OutputCollision(path),
                }),
            }
        }

        info!("{} file(s) written successfully!", report.written.len());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_table;
    use crate::data::model::Row;
    use crate::data::writer::{OutputFormat, write_table};
    use crate::modes::SchemaVersion;

    fn joined(to_id: i64, walk: &[(i64, i64)]) -> Table {
        let rows = walk
            .iter()
            .enumerate()
            .map(|(i, &(t, d))| Row {
                geometry: None,
                values: [
                    ("from_id".to_string(), FieldValue::Integer(i as i64 + 1)),
                    ("to_id".to_string(), FieldValue::Integer(to_id)),
                    ("walk_t".to_string(), FieldValue::Integer(t)),
                    ("pt_r_t".to_string(), FieldValue::Integer(d)),
                ]
                .into_iter()
                .collect(),
            })
            .collect();
        Table {
            columns: vec!["from_id".into(), "to_id".into(), "walk_t".into(), "pt_r_t".into()],
            rows,
            crs: None,
        }
    }

    fn pair() -> ModePair {
        ModePair::new(SchemaVersion::V2018, "walk_t", "pt_r_t").unwrap()
    }

    fn to_dir(dir: &Path, overwrite: bool) -> CompareOptions {
        CompareOptions {
            output: Some(OutputTarget {
                dir: dir.to_path_buf(),
                format: OutputFormat::GeoJson,
            }),
            overwrite,
        }
    }

    #[test]
    fn sentinel_wins_over_arithmetic() {
        use FieldValue::*;
        assert_eq!(difference(&Integer(-1), &Integer(10)), Some(Integer(-1)));
        assert_eq!(difference(&Integer(10), &Float(-1.0)), Some(Integer(-1)));
        assert_eq!(difference(&Null, &Integer(3)), Some(Integer(-1)));
        assert_eq!(difference(&Integer(3), &Integer(10)), Some(Integer(-7)));
        assert_eq!(difference(&Float(2.5), &Integer(1)), Some(Float(1.5)));
        assert_eq!(difference(&String("x".into()), &Integer(1)), None);
    }

    #[test]
    fn derived_column_matches_row_values() {
        let mut t = joined(5, &[(20, 12), (-1, 12), (8, -1), (3, 9)]);
        let to_id = attach_difference(&mut t, &pair(), None).unwrap();
        assert_eq!(to_id, 5);
        assert_eq!(t.columns.last().map(String::as_str), Some(DIFFERENCE_COLUMN));
        let derived: Vec<_> = (0..t.len())
            .map(|i| t.value(i, DIFFERENCE_COLUMN).cloned().unwrap())
            .collect();
        assert_eq!(
            derived,
            vec![
                FieldValue::Integer(8),
                FieldValue::Integer(-1),
                FieldValue::Integer(-1),
                FieldValue::Integer(-6),
            ]
        );
    }

    #[test]
    fn missing_mode_column_is_malformed() {
        let mut t = joined(5, &[(1, 1)]);
        t.drop_columns(&["pt_r_t"]);
        let err = attach_difference(&mut t, &pair(), None).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedTable { .. }));

        let mut t = joined(5, &[(1, 1)]);
        t.drop_columns(&["to_id"]);
        assert!(attach_difference(&mut t, &pair(), None).is_err());
    }

    #[test]
    fn in_memory_tables_are_written_under_derived_names() {
        let out = tempfile::tempdir().unwrap();
        let comparator = ModeComparator::new(pair(), to_dir(out.path(), true));
        let report = comparator
            .run(vec![joined(5, &[(1, 1)]).into(), joined(6, &[(2, 1)]).into()])
            .unwrap();
        assert_eq!(
            report.written,
            vec![
                out.path().join("Accessibility_5_walk_vs_pt_r.geojson"),
                out.path().join("Accessibility_6_walk_vs_pt_r.geojson"),
            ]
        );
        let back = load_table(&report.written[1]).unwrap();
        assert_eq!(back.value(0, DIFFERENCE_COLUMN), Some(&FieldValue::Integer(1)));
    }

    #[test]
    fn persisted_inputs_are_updated_in_place_with_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("time_to_5.geojson");
        write_table(&joined(5, &[(4, 1)]), &input).unwrap();

        let comparator = ModeComparator::new(
            pair(),
            CompareOptions {
                output: None,
                overwrite: true,
            },
        );
        let report = comparator.run(vec![input.clone().into()]).unwrap();
        assert_eq!(report.written, vec![input.clone()]);
        let back = load_table(&input).unwrap();
        assert_eq!(back.value(0, DIFFERENCE_COLUMN), Some(&FieldValue::Integer(3)));
    }

    #[test]
    fn persisted_input_without_overwrite_skips_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("time_to_5.geojson");
        write_table(&joined(5, &[(4, 1)]), &input).unwrap();
        let existing = dir.path().join("Accessibility_5_walk_vs_pt_r.geojson");
        std::fs::write(&existing, b"old").unwrap();

        let comparator = ModeComparator::new(pair(), to_dir(dir.path(), false));
        let report = comparator.run(vec![input.clone().into()]).unwrap();
        assert!(report.written.is_empty());
        assert_eq!(report.skipped[0].id, Some(5));
        assert_eq!(std::fs::read(&existing).unwrap(), b"old");
        // The input itself is left alone too.
        assert!(load_table(&input).unwrap().value(0, DIFFERENCE_COLUMN).is_none());
    }

    #[test]
    fn empty_table_is_skipped_and_the_batch_goes_on() {
        let out = tempfile::tempdir().unwrap();
        let empty = joined(5, &[]);
        let comparator = ModeComparator::new(pair(), to_dir(out.path(), true));
        let report = comparator
            .run(vec![empty.into(), joined(1, &[(7, 2)]).into()])
            .unwrap();

        assert_eq!(
            report.written,
            vec![out.path().join("Accessibility_1_walk_vs_pt_r.geojson")]
        );
        assert_eq!(
            report.skipped,
            vec![Skipped {
                id: None,
                reason: SkipReason::EmptyTable("in-memory table 1".into()),
            }]
        );
    }

    #[test]
    fn nowhere_to_write_fails_before_processing() {
        let none = CompareOptions {
            output: None,
            overwrite: false,
        };
        let err = ModeComparator::new(pair(), none)
            .run(vec![PathBuf::from("/does/not/exist.geojson").into()])
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));

        let in_place = CompareOptions {
            output: None,
            overwrite: true,
        };
        let err = ModeComparator::new(pair(), in_place)
            .run(vec![joined(5, &[(1, 1)]).into()])
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));

        let out = tempfile::tempdir().unwrap();
        let err = ModeComparator::new(pair(), to_dir(out.path(), true))
            .run(Vec::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
