use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::model::{FieldValue, Table};

/// Name of the geometry column in Parquet files.
pub const GEOMETRY_COLUMN: &str = "geometry";
/// Schema metadata key holding the serialized CRS in Parquet files.
pub const CRS_METADATA_KEY: &str = "crs";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a geometry + attribute table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.geojson` / `.json` – a GeoJSON `FeatureCollection`
/// * `.parquet` / `.pq`   – attribute columns plus a `geometry` text column
pub fn load_table(path: &Path) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "geojson" | "json" => load_geojson(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported table extension: .{other} ({})", path.display()),
    }
}

/// Load one travel time matrix file: semicolon-separated text with a header
/// row (`from_id;to_id;walk_t;...`).  Rows carry no geometry.
pub fn load_matrix(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening matrix file {}", path.display()))?;
    let columns: Vec<String> = reader
        .headers()
        .context("reading matrix headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("{} row {row_no}", path.display()))?;
        let pairs: Vec<(String, FieldValue)> = columns
            .iter()
            .zip(record.iter())
            .map(|(col, cell)| (col.clone(), guess_field_type(cell)))
            .collect();
        rows.push((None, pairs));
    }

    let mut table = Table::from_rows(rows, None);
    // Keep header columns even when no data row follows.
    table.columns = columns;
    Ok(table)
}

fn guess_field_type(s: &str) -> FieldValue {
    if s.is_empty() {
        return FieldValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return FieldValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return FieldValue::Float(f);
    }
    if s == "true" || s == "false" {
        return FieldValue::Bool(s == "true");
    }
    FieldValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// GeoJSON loader
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    /// Legacy (2008) CRS member; still emitted by most GIS exporters for
    /// projected data such as EUREF-FIN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<JsonValue>,
    pub features: Vec<Feature>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub geometry: Option<JsonValue>,
    #[serde(default)]
    pub properties: Option<JsonMap<String, JsonValue>>,
}

/// Expected layout:
///
/// ```json
/// {
///   "type": "FeatureCollection",
///   "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3067" } },
///   "features": [
///     { "type": "Feature", "geometry": {...}, "properties": { "YKR_ID": 5785640, "x": 381875.0, "y": 6697880.0 } }
///   ]
/// }
/// ```
fn load_geojson(path: &Path) -> Result<Table> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading GeoJSON file {}", path.display()))?;
    let collection: FeatureCollection = serde_json::from_str(&text)
        .with_context(|| format!("parsing GeoJSON {}", path.display()))?;

    if collection.kind != "FeatureCollection" {
        bail!(
            "{}: expected a FeatureCollection, got '{}'",
            path.display(),
            collection.kind
        );
    }

    let mut rows = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        if feature.kind != "Feature" {
            bail!("{}: feature {i} has type '{}'", path.display(), feature.kind);
        }
        let pairs: Vec<(String, FieldValue)> = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(key, val)| (key, json_to_field(&val)))
            .collect();
        rows.push((feature.geometry.filter(|g| !g.is_null()), pairs));
    }

    Ok(Table::from_rows(rows, collection.crs))
}

fn json_to_field(val: &JsonValue) -> FieldValue {
    match val {
        JsonValue::String(s) => FieldValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                FieldValue::Float(f)
            } else {
                FieldValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => FieldValue::Bool(*b),
        JsonValue::Null => FieldValue::Null,
        other => FieldValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet table written by [`super::writer`].
///
/// Expected schema:
/// - `geometry`: Utf8 – GeoJSON geometry text (optional)
/// - any other column: attribute values (strings, ints, floats, bools)
/// - schema metadata `crs`: serialized CRS descriptor (optional)
fn load_parquet(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening parquet file {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;

    let crs = match builder.schema().metadata().get(CRS_METADATA_KEY) {
        Some(text) => Some(serde_json::from_str(text).context("parsing stored CRS")?),
        None => None,
    };
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|name| name != GEOMETRY_COLUMN)
        .collect();

    let reader = builder.build().context("building parquet reader")?;
    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let geometry_idx = schema.index_of(GEOMETRY_COLUMN).ok();

        for row in 0..batch.num_rows() {
            let geometry = match geometry_idx {
                Some(idx) => extract_geometry(batch.column(idx), row)
                    .with_context(|| format!("Row {row}: failed to read geometry"))?,
                None => None,
            };

            let pairs: Vec<(String, FieldValue)> = schema
                .fields()
                .iter()
                .enumerate()
                .filter(|(col_idx, _)| Some(*col_idx) != geometry_idx)
                .map(|(col_idx, field)| {
                    (field.name().clone(), extract_field_value(batch.column(col_idx), row))
                })
                .collect();
            rows.push((geometry, pairs));
        }
    }

    let mut table = Table::from_rows(rows, crs);
    table.columns = columns;
    Ok(table)
}

// -- Parquet / Arrow helpers --

fn extract_geometry(col: &Arc<dyn Array>, row: usize) -> Result<Option<JsonValue>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let text = match col.data_type() {
        DataType::Utf8 => col.as_string::<i32>().value(row),
        DataType::LargeUtf8 => col.as_string::<i64>().value(row),
        other => bail!("Expected Utf8 geometry column, got {other:?}"),
    };
    Ok(Some(serde_json::from_str(text)?))
}

/// Extract a single attribute value from an Arrow column at a given row.
fn extract_field_value(col: &Arc<dyn Array>, row: usize) -> FieldValue {
    if col.is_null(row) {
        return FieldValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => FieldValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => FieldValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => FieldValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => FieldValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => FieldValue::Float(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => FieldValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => FieldValue::Bool(col.as_boolean().value(row)),
        other => FieldValue::String(format!("{other:?}")),
    }
}
