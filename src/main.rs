mod cli;
mod data;
mod error;
mod modes;
mod pipeline;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, error, info, warn};

use cli::{Cli, Settings};
use data::loader;
use data::model::TableRef;
use error::PipelineError;
use pipeline::compare::{CompareOptions, ModeComparator};
use pipeline::join::{JOIN_OUTPUT_PREFIX, JoinOptions, MatrixJoiner};
use pipeline::locator::DirectoryIndex;
use pipeline::{Skipped, skip_summary};

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = match Settings::from_cli(cli, &std::env::temp_dir()) {
        Ok(settings) => settings,
        Err(violations) => {
            for v in &violations {
                error!("{v}");
            }
            bail!("{} invalid argument(s), see --help", violations.len());
        }
    };

    if settings.reuse_joined {
        return compare_existing(settings);
    }

    let grid = loader::load_table(&settings.grid)
        .with_context(|| format!("loading grid {}", settings.grid.display()))?;
    info!("Loaded {} grid cells from {}", grid.len(), settings.grid.display());

    let index = DirectoryIndex::scan(&settings.matrix_dir, settings.schema)?;
    debug!("{} files in {}", index.len(), settings.matrix_dir.display());
    let joiner = MatrixJoiner::new(&grid, &index)?;

    let Some(pair) = settings.pair else {
        let options = JoinOptions {
            output: Some(settings.output),
            skip_missing: settings.skip_missing,
            overwrite: settings.overwrite,
        };
        let report = joiner.run(&settings.ids, &options)?;
        report_skipped(&report.skipped);
        return Ok(());
    };

    // Joined tables go straight to the comparator without touching disk.
    let options = JoinOptions {
        output: None,
        skip_missing: settings.skip_missing,
        overwrite: settings.overwrite,
    };
    let report = joiner.run(&settings.ids, &options)?;
    report_skipped(&report.skipped);
    let tables: Vec<TableRef> = report
        .into_tables()
        .into_iter()
        .map(TableRef::from)
        .collect();
    if tables.is_empty() {
        warn!("No matrix files found for the given grid IDs, nothing to compare.");
        return Ok(());
    }

    let comparator = ModeComparator::new(
        pair,
        CompareOptions {
            output: Some(settings.output),
            overwrite: settings.overwrite,
        },
    );
    let report = comparator.run(tables)?;
    report_skipped(&report.skipped);
    Ok(())
}

/// Run the comparator alone over join results written by an earlier run.
fn compare_existing(settings: Settings) -> Result<()> {
    let Some(pair) = settings.pair else {
        bail!("--reuse-joined needs --modes");
    };

    let mut tables = Vec::with_capacity(settings.ids.len());
    for &id in &settings.ids {
        let path = settings.output.path_for(&format!("{JOIN_OUTPUT_PREFIX}{id}"));
        if path.is_file() {
            tables.push(TableRef::Persisted(path));
        } else if settings.skip_missing {
            warn!("file \"{}\" does not exist! Skipping grid ID {id}.", path.display());
        } else {
            return Err(PipelineError::MissingInput {
                id,
                name: path.display().to_string(),
            }
            .into());
        }
    }
    if tables.is_empty() {
        warn!("No joined tables found in {}, nothing to compare.", settings.output.dir.display());
        return Ok(());
    }

    let comparator = ModeComparator::new(
        pair,
        CompareOptions {
            output: Some(settings.output),
            overwrite: settings.overwrite,
        },
    );
    let report = comparator.run(tables)?;
    report_skipped(&report.skipped);
    Ok(())
}

fn report_skipped(skipped: &[Skipped]) {
    if let Some(line) = skip_summary(skipped) {
        warn!("{line}");
    }
}
