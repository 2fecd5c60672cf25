use std::collections::HashMap;
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::ValueEnum;
use parquet::arrow::ArrowWriter;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use super::loader::{CRS_METADATA_KEY, Feature, FeatureCollection, GEOMETRY_COLUMN};
use super::model::{FieldValue, Table};

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

/// On-disk format for persisted tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    #[value(name = "geojson")]
    GeoJson,
    Parquet,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::GeoJson => "geojson",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Persist a table.  The format follows the extension of `path`, mirroring
/// [`super::loader::load_table`].  An existing file is replaced.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "geojson" | "json" => write_geojson(table, path),
        "parquet" | "pq" => write_parquet(table, path),
        other => bail!("Unsupported table extension: .{other} ({})", path.display()),
    }
}

// ---------------------------------------------------------------------------
// GeoJSON writer
// ---------------------------------------------------------------------------

fn write_geojson(table: &Table, path: &Path) -> Result<()> {
    let features = table
        .rows
        .iter()
        .map(|row| {
            let properties: JsonMap<String, JsonValue> = table
                .columns
                .iter()
                .map(|col| {
                    let value = row.get(col).map(field_to_json).unwrap_or(JsonValue::Null);
                    (col.clone(), value)
                })
                .collect();
            Feature {
                kind: "Feature".to_string(),
                geometry: row.geometry.clone(),
                properties: Some(properties),
            }
        })
        .collect();

    let collection = FeatureCollection {
        kind: "FeatureCollection".to_string(),
        crs: table.crs.clone(),
        features,
    };

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer(&mut out, &collection)
        .with_context(|| format!("writing GeoJSON {}", path.display()))?;
    out.flush()?;
    Ok(())
}

fn field_to_json(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::String(s) => JsonValue::String(s.clone()),
        FieldValue::Integer(i) => JsonValue::Number((*i).into()),
        // Non-finite floats have no JSON representation.
        FieldValue::Float(f) => Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        FieldValue::Bool(b) => JsonValue::Bool(*b),
        FieldValue::Null => JsonValue::Null,
    }
}

// ---------------------------------------------------------------------------
// Parquet writer
// ---------------------------------------------------------------------------

/// Narrowest Arrow type able to hold every value of a column.
fn infer_column_type(table: &Table, column: &str) -> DataType {
    let mut has_int = false;
    let mut has_float = false;
    let mut has_bool = false;
    let mut has_text = false;

    for value in table.rows.iter().filter_map(|r| r.get(column)) {
        match value {
            FieldValue::Integer(_) => has_int = true,
            FieldValue::Float(_) => has_float = true,
            FieldValue::Bool(_) => has_bool = true,
            FieldValue::String(_) => has_text = true,
            FieldValue::Null => {}
        }
    }

    match (has_text, has_bool, has_float, has_int) {
        (false, false, false, _) => DataType::Int64,
        (false, false, true, _) => DataType::Float64,
        (false, true, false, false) => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

fn build_column(table: &Table, column: &str, data_type: &DataType) -> ArrayRef {
    let n = table.len();
    let cells = table.rows.iter().map(|r| r.get(column).unwrap_or(&FieldValue::Null));

    match data_type {
        DataType::Int64 => {
            let mut b = Int64Builder::with_capacity(n);
            for cell in cells {
                b.append_option(cell.as_i64());
            }
            Arc::new(b.finish()) as ArrayRef
        }
        DataType::Float64 => {
            let mut b = Float64Builder::with_capacity(n);
            for cell in cells {
                b.append_option(cell.as_f64());
            }
            Arc::new(b.finish()) as ArrayRef
        }
        DataType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(n);
            for cell in cells {
                match cell {
                    FieldValue::Bool(v) => b.append_value(*v),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish()) as ArrayRef
        }
        _ => {
            let mut b = StringBuilder::new();
            for cell in cells {
                match cell {
                    FieldValue::Null => b.append_null(),
                    other => b.append_value(other.to_string()),
                }
            }
            Arc::new(b.finish()) as ArrayRef
        }
    }
}

fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    // Geometry is stored as a column of its own, so the name must stay free.
    if table.has_column(GEOMETRY_COLUMN) {
        bail!(
            "{}: attribute column '{GEOMETRY_COLUMN}' clashes with the geometry column",
            path.display()
        );
    }
    let mut fields = Vec::with_capacity(table.columns.len() + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns.len() + 1);

    for column in &table.columns {
        let data_type = infer_column_type(table, column);
        arrays.push(build_column(table, column, &data_type));
        fields.push(Field::new(column, data_type, true));
    }

    let mut geometry = StringBuilder::new();
    for row in &table.rows {
        match &row.geometry {
            Some(g) => geometry.append_value(g.to_string()),
            None => geometry.append_null(),
        }
    }
    fields.push(Field::new(GEOMETRY_COLUMN, DataType::Utf8, true));
    arrays.push(Arc::new(geometry.finish()));

    let mut metadata = HashMap::new();
    if let Some(crs) = &table.crs {
        metadata.insert(CRS_METADATA_KEY.to_string(), crs.to_string());
    }
    let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .context("assembling record batch")?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("finalising parquet file")?;
    Ok(())
}
