//! Writes a small synthetic YKR grid and matching travel time matrix files,
//! laid out the way the real download unpacks:
//!
//! ```text
//! <out>/MetropAccess_YKR_grid/MetropAccess_YKR_grid_EurefFIN.geojson
//! <out>/MTTM/travel_times_to_ <id>.txt
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::{Value as JsonValue, json};

/// Cell edge length of the YKR grid in metres.
const CELL: f64 = 250.0;
/// South-west corner of the synthetic grid (EUREF-FIN / TM35FIN).
const ORIGIN: (f64, f64) = (381_000.0, 6_697_000.0);
const FIRST_ID: u64 = 5_785_640;

#[derive(Parser)]
#[command(about = "Generate a synthetic grid and travel time matrix for trying out mttm-join")]
struct Args {
    /// Output directory (created if needed)
    #[arg(default_value = "sample_data")]
    out: PathBuf,

    /// Cells per grid side
    #[arg(long, default_value_t = 4)]
    size: u64,

    /// Matrix release layout to imitate
    #[arg(long, value_enum, default_value = "2018")]
    schema: Release,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Release {
    #[value(name = "2013")]
    R2013,
    #[value(name = "2015")]
    R2015,
    #[value(name = "2018")]
    R2018,
}

impl Release {
    fn year(self) -> &'static str {
        match self {
            Release::R2013 => "2013",
            Release::R2015 => "2015",
            Release::R2018 => "2018",
        }
    }
}

/// Travel metrics between two cells, derived from their distance.
struct Trip {
    walk_t: i64,
    walk_d: i64,
    bike_t: i64,
    pt_tt: i64,
    pt_t: i64,
    car_t: i64,
    car_d: i64,
}

impl Trip {
    fn between(from: (u64, u64), to: (u64, u64), unreachable_by_pt: bool) -> Self {
        let dx = from.0.abs_diff(to.0) as f64 * CELL;
        let dy = from.1.abs_diff(to.1) as f64 * CELL;
        let walk_d = (dx + dy).round() as i64;
        let walk_t = (walk_d as f64 / 83.0).ceil() as i64;
        let car_d = ((dx * dx + dy * dy).sqrt() * 1.3).round() as i64;
        let (pt_tt, pt_t) = if unreachable_by_pt {
            (-1, -1)
        } else {
            let ride = walk_t / 3 + 4;
            (ride + 6, ride)
        };
        Trip {
            walk_t,
            walk_d,
            bike_t: (walk_d as f64 / 250.0).ceil() as i64,
            pt_tt,
            pt_t,
            car_t: (car_d as f64 / 500.0).ceil() as i64 + 3,
            car_d,
        }
    }

    fn record(&self, schema: Release) -> Vec<i64> {
        let pt_d = if self.pt_t < 0 { -1 } else { self.car_d };
        match schema {
            Release::R2013 => vec![
                self.walk_t, self.walk_d, self.pt_tt, self.pt_t, pt_d, self.car_t, self.car_d,
            ],
            Release::R2015 => vec![
                self.walk_t, self.walk_d,
                self.pt_tt, self.pt_t, pt_d,
                self.pt_tt, self.pt_t, pt_d,
                self.car_t, self.car_d, self.car_t + 2, self.car_d,
            ],
            Release::R2018 => vec![
                self.walk_t, self.walk_d,
                self.bike_t, self.bike_t + 2, self.walk_d,
                self.pt_tt, self.pt_t, pt_d,
                self.pt_tt, self.pt_t, pt_d,
                self.car_t, self.car_d, self.car_t + 2, self.car_d,
                self.car_t - 1,
            ],
        }
    }
}

fn header(schema: Release) -> Vec<&'static str> {
    let modes: &[&str] = match schema {
        Release::R2013 => &["Walk_time", "Walk_dist", "PT_total_time", "PT_time", "PT_dist", "Car_time", "Car_dist"],
        Release::R2015 => &[
            "walk_t", "walk_d", "pt_r_tt", "pt_r_t", "pt_r_d", "pt_m_tt", "pt_m_t", "pt_m_d",
            "car_r_t", "car_r_d", "car_m_t", "car_m_d",
        ],
        Release::R2018 => &[
            "walk_t", "walk_d", "bike_s_t", "bike_f_t", "bike_d", "pt_r_tt", "pt_r_t", "pt_r_d",
            "pt_m_tt", "pt_m_t", "pt_m_d", "car_r_t", "car_r_d", "car_m_t", "car_m_d", "car_sl_t",
        ],
    };
    ["from_id", "to_id"].into_iter().chain(modes.iter().copied()).collect()
}

fn matrix_file_name(schema: Release, id: u64) -> String {
    match schema {
        Release::R2013 => format!("time_to_{id}.txt"),
        Release::R2015 | Release::R2018 => format!("travel_times_to_ {id}.txt"),
    }
}

fn cell_polygon(col: u64, row: u64) -> JsonValue {
    let x0 = ORIGIN.0 + col as f64 * CELL;
    let y0 = ORIGIN.1 + row as f64 * CELL;
    json!({
        "type": "Polygon",
        "coordinates": [[
            [x0, y0], [x0 + CELL, y0], [x0 + CELL, y0 + CELL], [x0, y0 + CELL], [x0, y0]
        ]]
    })
}

fn write_grid(path: &Path, size: u64) -> Result<()> {
    let features: Vec<JsonValue> = (0..size)
        .flat_map(|row| (0..size).map(move |col| (col, row)))
        .map(|(col, row)| {
            json!({
                "type": "Feature",
                "geometry": cell_polygon(col, row),
                "properties": {
                    "x": ORIGIN.0 + (col as f64 + 0.5) * CELL,
                    "y": ORIGIN.1 + (row as f64 + 0.5) * CELL,
                    "YKR_ID": FIRST_ID + row * size + col,
                }
            })
        })
        .collect();

    let collection = json!({
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3067" } },
        "features": features,
    });
    std::fs::write(path, serde_json::to_string_pretty(&collection)?)
        .with_context(|| format!("writing {}", path.display()))
}

fn write_matrices(dir: &Path, size: u64, schema: Release) -> Result<usize> {
    let cells: Vec<(u64, (u64, u64))> = (0..size)
        .flat_map(|row| (0..size).map(move |col| (FIRST_ID + row * size + col, (col, row))))
        .collect();

    for &(to_id, to_pos) in &cells {
        let path = dir.join(matrix_file_name(schema, to_id));
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(header(schema))?;

        for &(from_id, from_pos) in &cells {
            // A deterministic sprinkling of cells without transit service.
            let unreachable = (from_id + to_id) % 7 == 0 && from_id != to_id;
            let trip = Trip::between(from_pos, to_pos, unreachable);
            let mut record = vec![from_id.to_string(), to_id.to_string()];
            record.extend(trip.record(schema).iter().map(i64::to_string));
            writer.write_record(&record)?;
        }
        writer.flush()?;
    }
    Ok(cells.len())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let grid_dir = args.out.join("MetropAccess_YKR_grid");
    let matrix_dir = args.out.join("MTTM");
    std::fs::create_dir_all(&grid_dir)?;
    std::fs::create_dir_all(&matrix_dir)?;

    let grid_path = grid_dir.join("MetropAccess_YKR_grid_EurefFIN.geojson");
    write_grid(&grid_path, args.size)?;
    let n = write_matrices(&matrix_dir, args.size, args.schema)?;

    println!("Wrote {}", grid_path.display());
    println!("Wrote {n} matrix files to {}", matrix_dir.display());
    println!(
        "Try: mttm-join {FIRST_ID} --schema {} --grid {} --matrix-dir {} -o <dir>",
        args.schema.year(),
        grid_path.display(),
        matrix_dir.display()
    );
    Ok(())
}
