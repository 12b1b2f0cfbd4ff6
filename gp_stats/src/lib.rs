//! Core analytics library for historical Grand Prix results.
//!
//! The pipeline is: raw CSV rows -> [`normalized entries`](RaceEntry) ->
//! [`join`] engine -> [`metrics`] library. Chart rendering and JSON export
//! live in the CLI crate and both consume the same metric results.

use serde::Deserialize;
use thiserror::Error;

pub mod join;
pub mod metrics;
pub mod stats;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("missing required columns in {table}: {columns}")]
    MissingColumns { table: String, columns: String },
    #[error("{table} has no pit duration column (Time or Total)")]
    MissingDurationColumn { table: String },
}

/// Validate that every required column is present, naming the missing ones.
pub fn validate_columns(
    headers: &[String],
    required: &[&str],
    table: &str,
) -> Result<(), TableError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == col))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TableError::MissingColumns {
            table: table.to_string(),
            columns: missing.join(", "),
        })
    }
}

/// Raw row shared by race results, sprint results, and starting grids.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "Year", default)]
    pub year: Option<String>,
    #[serde(rename = "Grand Prix", default)]
    pub grand_prix: Option<String>,
    #[serde(rename = "Driver", default)]
    pub driver: Option<String>,
    #[serde(rename = "DriverCode", default)]
    pub driver_code: Option<String>,
    #[serde(rename = "Car", default)]
    pub car: Option<String>,
    #[serde(rename = "Pos", default)]
    pub pos: Option<String>,
    #[serde(rename = "PTS", default)]
    pub pts: Option<String>,
}

/// Raw row for driver or constructor championship standings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StandingRow {
    #[serde(rename = "Year", default)]
    pub year: Option<String>,
    #[serde(rename = "Driver", default)]
    pub driver: Option<String>,
    #[serde(rename = "Team", default)]
    pub team: Option<String>,
    #[serde(rename = "DriverCode", default)]
    pub driver_code: Option<String>,
    #[serde(rename = "Pos", default)]
    pub pos: Option<String>,
    #[serde(rename = "PTS", default)]
    pub pts: Option<String>,
}

/// Raw pit stop row. The duration lives in `Time` or `Total` depending on
/// the snapshot vintage.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PitStopRow {
    #[serde(rename = "Year", default)]
    pub year: Option<String>,
    #[serde(rename = "Grand Prix", default)]
    pub grand_prix: Option<String>,
    #[serde(rename = "Driver", default)]
    pub driver: Option<String>,
    #[serde(rename = "DriverCode", default)]
    pub driver_code: Option<String>,
    #[serde(rename = "Time", default)]
    pub time: Option<String>,
    #[serde(rename = "Total", default)]
    pub total: Option<String>,
}

pub const RACE_DETAILS_COLUMNS: &[&str] = &["Pos", "Driver", "Car", "Year", "Grand Prix"];
pub const DRIVER_STANDINGS_COLUMNS: &[&str] = &["Pos", "Driver", "Year", "PTS"];
pub const CONSTRUCTOR_STANDINGS_COLUMNS: &[&str] = &["Pos", "Team", "Year"];
pub const STARTING_GRIDS_COLUMNS: &[&str] = &["Pos", "Driver", "Year", "Grand Prix"];
pub const PITSTOPS_COLUMNS: &[&str] = &["Driver", "Year", "Grand Prix"];
pub const SPRINT_RESULTS_COLUMNS: &[&str] = &["Pos", "Driver", "Year", "Grand Prix", "PTS"];
pub const SPRINT_GRID_COLUMNS: &[&str] = &["Pos", "Driver", "Year", "Grand Prix"];

/// Normalized race (or sprint) result entry.
#[derive(Clone, Debug)]
pub struct RaceEntry {
    pub year: Option<i32>,
    pub grand_prix: Option<String>,
    pub driver_key: Option<String>,
    pub team: Option<String>,
    pub finish_pos: Option<f64>,
    pub points: Option<f64>,
}

/// Normalized starting-grid (or sprint-grid) entry.
#[derive(Clone, Debug)]
pub struct GridEntry {
    pub year: Option<i32>,
    pub grand_prix: Option<String>,
    pub driver_key: Option<String>,
    pub grid_pos: Option<f64>,
}

/// Normalized championship standing entry.
#[derive(Clone, Debug)]
pub struct StandingEntry {
    pub year: Option<i32>,
    pub entity: Option<String>,
    pub driver_key: Option<String>,
    pub pos: Option<f64>,
    pub points: Option<f64>,
}

/// Normalized pit stop entry.
#[derive(Clone, Debug)]
pub struct PitStopEntry {
    pub year: Option<i32>,
    pub grand_prix: Option<String>,
    pub driver_key: Option<String>,
    pub duration: Option<f64>,
}

/// Which standings column names the ranked entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StandingScope {
    Driver,
    Constructor,
}

/// Which pit stop column carries the stop duration for a given snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PitDurationSource {
    Time,
    Total,
}

impl PitDurationSource {
    /// Pick the duration column from the table header, `Time` first.
    pub fn from_headers(headers: &[String], table: &str) -> Result<Self, TableError> {
        if headers.iter().any(|h| h == "Time") {
            Ok(PitDurationSource::Time)
        } else if headers.iter().any(|h| h == "Total") {
            Ok(PitDurationSource::Total)
        } else {
            Err(TableError::MissingDurationColumn {
                table: table.to_string(),
            })
        }
    }
}

/// Non-raising numeric coercion: non-numeric text becomes `None`, never an
/// error. Retirements ("DNF", "DSQ", ...) resolve to `None` this way.
pub fn parse_num(raw: Option<&str>) -> Option<f64> {
    let text = raw?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Year coercion; fractional text truncates toward zero like an int cast.
pub fn parse_year(raw: Option<&str>) -> Option<i32> {
    parse_num(raw).map(|v| v as i32)
}

/// Stable per-entry driver identity: trimmed DriverCode when non-empty,
/// else the plain driver name. Applied identically to every table so the
/// triple join key matches across upstream sources.
pub fn driver_key(code: Option<&str>, name: Option<&str>) -> Option<String> {
    match code.map(str::trim) {
        Some(c) if !c.is_empty() => Some(c.to_string()),
        _ => name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
    }
}

/// Decade bucket, floor-to-multiple-of-10 (also for years before 1 AD).
pub fn decade(year: i32) -> i32 {
    year.div_euclid(10) * 10
}

pub fn race_entries(rows: &[ResultRow]) -> Vec<RaceEntry> {
    rows.iter()
        .map(|row| RaceEntry {
            year: parse_year(row.year.as_deref()),
            grand_prix: row.grand_prix.clone(),
            driver_key: driver_key(row.driver_code.as_deref(), row.driver.as_deref()),
            team: row.car.clone(),
            finish_pos: parse_num(row.pos.as_deref()),
            points: parse_num(row.pts.as_deref()),
        })
        .collect()
}

pub fn grid_entries(rows: &[ResultRow]) -> Vec<GridEntry> {
    rows.iter()
        .map(|row| GridEntry {
            year: parse_year(row.year.as_deref()),
            grand_prix: row.grand_prix.clone(),
            driver_key: driver_key(row.driver_code.as_deref(), row.driver.as_deref()),
            grid_pos: parse_num(row.pos.as_deref()),
        })
        .collect()
}

pub fn standing_entries(rows: &[StandingRow], scope: StandingScope) -> Vec<StandingEntry> {
    rows.iter()
        .map(|row| StandingEntry {
            year: parse_year(row.year.as_deref()),
            entity: match scope {
                StandingScope::Driver => row.driver.clone(),
                StandingScope::Constructor => row.team.clone(),
            },
            driver_key: driver_key(row.driver_code.as_deref(), row.driver.as_deref()),
            pos: parse_num(row.pos.as_deref()),
            points: parse_num(row.pts.as_deref()),
        })
        .collect()
}

pub fn pit_entries(rows: &[PitStopRow], source: PitDurationSource) -> Vec<PitStopEntry> {
    rows.iter()
        .map(|row| PitStopEntry {
            year: parse_year(row.year.as_deref()),
            grand_prix: row.grand_prix.clone(),
            driver_key: driver_key(row.driver_code.as_deref(), row.driver.as_deref()),
            duration: match source {
                PitDurationSource::Time => parse_num(row.time.as_deref()),
                PitDurationSource::Total => parse_num(row.total.as_deref()),
            },
        })
        .collect()
}

/// Which optional statistical methods this build carries. Resolved once at
/// process start and threaded explicitly into the metric library.
#[derive(Clone, Copy, Debug)]
pub struct StatsCapability {
    pub ci_regression: bool,
}

impl StatsCapability {
    pub fn detect() -> Self {
        Self {
            ci_regression: cfg!(feature = "ci-stats"),
        }
    }

    /// A build without the enhanced methods, for exercising fallbacks.
    pub fn basic() -> Self {
        Self {
            ci_regression: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_num_coerces_or_skips() {
        assert_eq!(parse_num(Some("3")), Some(3.0));
        assert_eq!(parse_num(Some(" 12.5 ")), Some(12.5));
        assert_eq!(parse_num(Some("DNF")), None);
        assert_eq!(parse_num(Some("")), None);
        assert_eq!(parse_num(None), None);
    }

    #[test]
    fn driver_key_prefers_code() {
        assert_eq!(
            driver_key(Some("VER"), Some("Max Verstappen")),
            Some("VER".to_string())
        );
        assert_eq!(
            driver_key(Some("  "), Some("Max Verstappen")),
            Some("Max Verstappen".to_string())
        );
        assert_eq!(
            driver_key(None, Some("Max Verstappen")),
            Some("Max Verstappen".to_string())
        );
        assert_eq!(driver_key(None, None), None);
    }

    #[test]
    fn decade_floors_to_multiple_of_ten() {
        assert_eq!(decade(1999), 1990);
        assert_eq!(decade(2000), 2000);
        assert_eq!(decade(2021), 2020);
    }

    #[test]
    fn validate_columns_names_every_missing_column() {
        let headers = vec!["Pos".to_string(), "Year".to_string()];
        let err = validate_columns(&headers, &["Pos", "Driver", "PTS"], "driver_standings.csv")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("driver_standings.csv"));
        assert!(message.contains("Driver"));
        assert!(message.contains("PTS"));
        assert!(!message.contains("Pos,"));
    }

    #[test]
    fn pit_duration_source_prefers_time() {
        let both = vec!["Time".to_string(), "Total".to_string()];
        assert_eq!(
            PitDurationSource::from_headers(&both, "pitstops.csv").unwrap(),
            PitDurationSource::Time
        );
        let total_only = vec!["Total".to_string()];
        assert_eq!(
            PitDurationSource::from_headers(&total_only, "pitstops.csv").unwrap(),
            PitDurationSource::Total
        );
        let neither = vec!["Driver".to_string()];
        assert!(PitDurationSource::from_headers(&neither, "pitstops.csv").is_err());
    }
}
