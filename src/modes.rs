//! Travel mode taxonomy of the Helsinki travel time matrix releases.
//!
//! Every release ships a fixed set of numeric mode columns, each either a
//! travel time (minutes) or a distance (metres). Only columns of the same
//! unit family can be subtracted from each other.

use std::fmt;

use clap::ValueEnum;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFamily {
    Time,
    Distance,
}

impl fmt::Display for UnitFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitFamily::Time => f.write_str("time"),
            UnitFamily::Distance => f.write_str("distance"),
        }
    }
}

/// One mode column of a matrix file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeField {
    /// Column name as it appears in the matrix header.
    pub name: &'static str,
    /// Short stem used when naming comparison outputs.
    pub label: &'static str,
    pub family: UnitFamily,
}

const fn time(name: &'static str, label: &'static str) -> ModeField {
    ModeField {
        name,
        label,
        family: UnitFamily::Time,
    }
}

const fn dist(name: &'static str, label: &'static str) -> ModeField {
    ModeField {
        name,
        label,
        family: UnitFamily::Distance,
    }
}

const MODES_2013: &[ModeField] = &[
    time("Walk_time", "Walk"),
    dist("Walk_dist", "Walk"),
    time("PT_total_time", "PT_total"),
    time("PT_time", "PT"),
    dist("PT_dist", "PT"),
    time("Car_time", "Car"),
    dist("Car_dist", "Car"),
];

const MODES_2015: &[ModeField] = &[
    time("walk_t", "walk"),
    dist("walk_d", "walk"),
    time("pt_r_tt", "pt_r"),
    time("pt_r_t", "pt_r"),
    dist("pt_r_d", "pt_r"),
    time("pt_m_tt", "pt_m"),
    time("pt_m_t", "pt_m"),
    dist("pt_m_d", "pt_m"),
    time("car_r_t", "car_r"),
    dist("car_r_d", "car_r"),
    time("car_m_t", "car_m"),
    dist("car_m_d", "car_m"),
];

const MODES_2018: &[ModeField] = &[
    time("walk_t", "walk"),
    dist("walk_d", "walk"),
    time("bike_s_t", "bike_s"),
    time("bike_f_t", "bike_f"),
    dist("bike_d", "bike"),
    time("pt_r_tt", "pt_r"),
    time("pt_r_t", "pt_r"),
    dist("pt_r_d", "pt_r"),
    time("pt_m_tt", "pt_m"),
    time("pt_m_t", "pt_m"),
    dist("pt_m_d", "pt_m"),
    time("car_r_t", "car_r"),
    dist("car_r_d", "car_r"),
    time("car_m_t", "car_m"),
    dist("car_m_d", "car_m"),
    time("car_sl_t", "car_sl"),
];

/// Release of the travel time matrix. Decides both the mode columns and the
/// naming of the per-target matrix files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SchemaVersion {
    #[value(name = "2013")]
    V2013,
    #[value(name = "2015")]
    V2015,
    #[default]
    #[value(name = "2018")]
    V2018,
}

impl SchemaVersion {
    pub fn modes(self) -> &'static [ModeField] {
        match self {
            SchemaVersion::V2013 => MODES_2013,
            SchemaVersion::V2015 => MODES_2015,
            SchemaVersion::V2018 => MODES_2018,
        }
    }

    pub fn lookup(self, name: &str) -> Option<ModeField> {
        self.modes().iter().copied().find(|m| m.name == name)
    }

    /// File name of the matrix holding all travel times to `id`.
    ///
    /// 2015 and later releases really do put a space before the number.
    pub fn matrix_file_name(self, id: u64) -> String {
        match self {
            SchemaVersion::V2013 => format!("time_to_{id}.txt"),
            SchemaVersion::V2015 | SchemaVersion::V2018 => format!("travel_times_to_ {id}.txt"),
        }
    }

    pub fn mode_names(self) -> Vec<&'static str> {
        self.modes().iter().map(|m| m.name).collect()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::V2013 => f.write_str("2013"),
            SchemaVersion::V2015 => f.write_str("2015"),
            SchemaVersion::V2018 => f.write_str("2018"),
        }
    }
}

/// Two validated, mutually comparable mode columns. The derived value is
/// `first - second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePair {
    pub first: ModeField,
    pub second: ModeField,
}

impl ModePair {
    pub fn new(schema: SchemaVersion, first: &str, second: &str) -> Result<Self> {
        let resolve = |name: &str| {
            schema.lookup(name).ok_or_else(|| {
                PipelineError::InvalidInput(format!(
                    "unknown travel mode '{name}', expected one of: {}",
                    schema.mode_names().join(", ")
                ))
            })
        };
        let first = resolve(first)?;
        let second = resolve(second)?;

        if first.name == second.name {
            return Err(PipelineError::DuplicateMode(first.name.to_string()));
        }
        if first.family != second.family {
            return Err(PipelineError::IncompatibleMode {
                first: first.name.to_string(),
                first_family: first.family,
                second: second.name.to_string(),
                second_family: second.family,
            });
        }
        Ok(ModePair { first, second })
    }

    pub fn family(&self) -> UnitFamily {
        self.first.family
    }
}
