/// Data layer: table model, reading and writing.
///
/// Architecture:
/// ```text
///  .geojson / .parquet        travel_times_to_ NNN.txt
///        │                            │
///        ▼                            ▼
///   ┌──────────┐               ┌─────────────┐
///   │  loader   │ load_table   │   loader    │ load_matrix
///   └──────────┘               └─────────────┘
///        │                            │
///        ▼                            ▼
///   ┌──────────────────────────────────────┐
///   │ Table  columns, rows (geometry), crs │
///   └──────────────────────────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  writer   │  Table → .geojson / .parquet
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod writer;
