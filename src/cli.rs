//! Command line surface and the pre-flight check that turns raw arguments
//! into validated [`Settings`].

use std::fmt;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::data::writer::OutputFormat;
use crate::modes::{ModePair, SchemaVersion};
use crate::pipeline::join::OutputTarget;

const GRID_DIR: &str = "MetropAccess_YKR_grid";
const GRID_FILE: &str = "MetropAccess_YKR_grid_EurefFIN.geojson";
const MATRIX_DIR: &str = "MTTM";

#[derive(Parser, Debug)]
#[command(name = "mttm-join")]
#[command(version)]
#[command(about = "Join the Helsinki travel time matrix with the YKR grid")]
#[command(long_about = "Creates one table per target grid cell by joining the YKR grid with the
travel time matrix file of that cell, and optionally compares two travel modes:
  mttm-join 5785640 5785641 -o out/
  mttm-join 5785640 --modes pt_r_tt car_r_t -o out/
  mttm-join 5785640 --schema 2013 --modes Walk_time PT_time -o out/

With --modes, the second mode is subtracted from the first and the result is
written to the Time_Dist column. Rows where either value is missing (-1) get -1.
Both modes must be times or both distances.")]
pub struct Cli {
    /// YKR grid IDs of the target cells
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<u64>,

    /// Two travel mode columns to compare (first minus second)
    #[arg(long, num_args = 2, value_names = ["MODE_A", "MODE_B"])]
    pub modes: Option<Vec<String>>,

    /// Directory the result files are written to
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// YKR grid file (.geojson or .parquet) [default: <tmp>/MetropAccess_YKR_grid/MetropAccess_YKR_grid_EurefFIN.geojson]
    #[arg(long)]
    pub grid: Option<PathBuf>,

    /// Directory holding the matrix text files [default: <tmp>/MTTM]
    #[arg(long)]
    pub matrix_dir: Option<PathBuf>,

    /// Travel time matrix release the files come from
    #[arg(long, value_enum, default_value_t)]
    pub schema: SchemaVersion,

    /// Format of the written tables
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Keep existing output files instead of replacing them
    #[arg(long)]
    pub no_overwrite: bool,

    /// Abort when a matrix file is missing instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Compare the time_to_<ID> tables already in the output directory
    /// instead of joining again (requires --modes). Unless --no-overwrite is
    /// given, Time_Dist is added to those files in place.
    #[arg(long, requires = "modes")]
    pub reuse_joined: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// A single problem found in the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    NonPositiveId(u64),
    Modes(String),
    GridNotFound(PathBuf),
    MatrixDirNotFound(PathBuf),
    OutputDirNotFound(PathBuf),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NonPositiveId(id) => write!(f, "grid ID {id} is not a positive number"),
            Violation::Modes(msg) => write!(f, "{msg}"),
            Violation::GridNotFound(p) => write!(f, "grid file {} not found", p.display()),
            Violation::MatrixDirNotFound(p) => {
                write!(f, "matrix directory {} not found", p.display())
            }
            Violation::OutputDirNotFound(p) => {
                write!(f, "output directory {} not found", p.display())
            }
        }
    }
}

/// Everything a run needs, already validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ids: Vec<u64>,
    pub pair: Option<ModePair>,
    pub grid: PathBuf,
    pub matrix_dir: PathBuf,
    pub schema: SchemaVersion,
    pub output: OutputTarget,
    pub overwrite: bool,
    pub skip_missing: bool,
    pub reuse_joined: bool,
}

impl Settings {
    /// Check the whole command line and report every problem at once.
    /// `tmp` is the base for the default input locations.
    pub fn from_cli(cli: Cli, tmp: &Path) -> Result<Self, Vec<Violation>> {
        let mut violations = Vec::new();

        violations.extend(
            cli.ids
                .iter()
                .filter(|&&id| id == 0)
                .map(|&id| Violation::NonPositiveId(id)),
        );

        let pair = match cli.modes.as_deref() {
            Some([a, b]) => match ModePair::new(cli.schema, a, b) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    violations.push(Violation::Modes(e.to_string()));
                    None
                }
            },
            Some(other) => {
                violations.push(Violation::Modes(format!(
                    "exactly two travel modes are required, got {}",
                    other.len()
                )));
                None
            }
            None => None,
        };

        let grid = cli
            .grid
            .unwrap_or_else(|| tmp.join(GRID_DIR).join(GRID_FILE));
        let matrix_dir = cli.matrix_dir.unwrap_or_else(|| tmp.join(MATRIX_DIR));
        // Reusing joined tables never reads the raw inputs.
        if !cli.reuse_joined {
            if !grid.is_file() {
                violations.push(Violation::GridNotFound(grid.clone()));
            }
            if !matrix_dir.is_dir() {
                violations.push(Violation::MatrixDirNotFound(matrix_dir.clone()));
            }
        }
        if !cli.output_dir.is_dir() {
            violations.push(Violation::OutputDirNotFound(cli.output_dir.clone()));
        }

        if !violations.is_empty() {
            return Err(violations);
        }
        Ok(Settings {
            ids: cli.ids,
            pair,
            grid,
            matrix_dir,
            schema: cli.schema,
            output: OutputTarget {
                dir: cli.output_dir,
                format: cli.format,
            },
            overwrite: !cli.no_overwrite,
            skip_missing: !cli.strict,
            reuse_joined: cli.reuse_joined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mttm-join").chain(args.iter().copied())).unwrap()
    }

    /// tmp dir laid out like an unpacked dataset download.
    fn dataset() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(GRID_DIR)).unwrap();
        std::fs::write(tmp.path().join(GRID_DIR).join(GRID_FILE), "{}").unwrap();
        std::fs::create_dir(tmp.path().join(MATRIX_DIR)).unwrap();
        tmp
    }

    #[test]
    fn defaults_resolve_under_tmp() {
        let tmp = dataset();
        let out = tmp.path().to_str().unwrap();
        let settings = Settings::from_cli(parse(&["5785640", "-o", out]), tmp.path()).unwrap();
        assert_eq!(settings.ids, vec![5785640]);
        assert_eq!(settings.grid, tmp.path().join(GRID_DIR).join(GRID_FILE));
        assert_eq!(settings.matrix_dir, tmp.path().join(MATRIX_DIR));
        assert_eq!(settings.schema, SchemaVersion::V2018);
        assert_eq!(settings.output.format, OutputFormat::GeoJson);
        assert!(settings.overwrite && settings.skip_missing);
        assert!(settings.pair.is_none());
    }

    #[test]
    fn mode_pair_is_validated_against_schema() {
        let tmp = dataset();
        let out = tmp.path().to_str().unwrap();
        let ok = parse(&["1", "--schema", "2013", "--modes", "Walk_time", "PT_time", "-o", out]);
        let settings = Settings::from_cli(ok, tmp.path()).unwrap();
        assert_eq!(settings.pair.unwrap().second.name, "PT_time");

        let bad = parse(&["1", "--modes", "walk_t", "walk_d", "-o", out]);
        let violations = Settings::from_cli(bad, tmp.path()).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], Violation::Modes(_)));
    }

    #[test]
    fn all_problems_are_reported_together() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let cli = parse(&["0", "2", "--modes", "walk_t", "walk_t", "-o", missing.to_str().unwrap()]);
        let violations = Settings::from_cli(cli, tmp.path()).unwrap_err();
        assert_eq!(violations.len(), 5);
        assert_eq!(violations[0], Violation::NonPositiveId(0));
        assert!(violations.contains(&Violation::OutputDirNotFound(missing)));
    }

    #[test]
    fn flags_flip_policies() {
        let tmp = dataset();
        let out = tmp.path().to_str().unwrap();
        let cli = parse(&["1", "-o", out, "--no-overwrite", "--strict", "--format", "parquet"]);
        let settings = Settings::from_cli(cli, tmp.path()).unwrap();
        assert!(!settings.overwrite);
        assert!(!settings.skip_missing);
        assert_eq!(settings.output.path_for("x"), tmp.path().join("x.parquet"));
    }

    #[test]
    fn reusing_joined_tables_skips_input_checks() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().to_str().unwrap();
        let cli = parse(&["1", "--modes", "walk_t", "bike_s_t", "--reuse-joined", "-o", out]);
        let settings = Settings::from_cli(cli, tmp.path()).unwrap();
        assert!(settings.reuse_joined);

        assert!(Cli::try_parse_from(["mttm-join", "1", "--reuse-joined", "-o", out]).is_err());
    }

    #[test]
    fn one_mode_alone_does_not_parse() {
        assert!(Cli::try_parse_from(["mttm-join", "1", "--modes", "walk_t", "-o", "."]).is_err());
        assert!(Cli::try_parse_from(["mttm-join", "-o", "."]).is_err());
    }
}
