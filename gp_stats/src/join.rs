//! Season/race/driver-scoped joins between the normalized tables.
//!
//! Every join matches on the triple key (year, grand prix, driver key);
//! rows missing any component are excluded before joining. A join that
//! produces zero rows is an empty result, not an error.

use std::collections::{BTreeMap, HashMap};

use crate::{GridEntry, PitStopEntry, RaceEntry};

/// The triple join key. Keys exist only for rows where all three
/// components resolve.
pub type JoinKey = (i32, String, String);

fn join_key(year: Option<i32>, grand_prix: &Option<String>, driver: &Option<String>) -> Option<JoinKey> {
    Some((year?, grand_prix.clone()?, driver.clone()?))
}

/// Race row with the starting-grid position attached.
#[derive(Clone, Debug)]
pub struct RaceGridRow {
    pub year: i32,
    pub grand_prix: String,
    pub driver_key: String,
    pub finish_pos: Option<f64>,
    pub grid_pos: Option<f64>,
}

/// Inner join of race results to starting grids on the triple key.
///
/// Grid tables are assumed to carry at most one row per key; the first
/// occurrence wins if the assumption is violated.
pub fn race_to_grid(races: &[RaceEntry], grids: &[GridEntry]) -> Vec<RaceGridRow> {
    let mut grid_by_key: HashMap<JoinKey, Option<f64>> = HashMap::new();
    for grid in grids {
        if let Some(key) = join_key(grid.year, &grid.grand_prix, &grid.driver_key) {
            grid_by_key.entry(key).or_insert(grid.grid_pos);
        }
    }

    races
        .iter()
        .filter_map(|race| {
            let key = join_key(race.year, &race.grand_prix, &race.driver_key)?;
            let grid_pos = *grid_by_key.get(&key)?;
            Some(RaceGridRow {
                year: key.0,
                grand_prix: key.1,
                driver_key: key.2,
                finish_pos: race.finish_pos,
                grid_pos,
            })
        })
        .collect()
}

/// Per-(year, grand prix, driver) pit aggregate joined to the race outcome.
#[derive(Clone, Debug)]
pub struct PitRaceRow {
    pub year: i32,
    pub grand_prix: String,
    pub driver_key: String,
    pub total_pit_time: f64,
    pub stops: u32,
    pub finish_pos: f64,
}

/// Aggregate pit stops per triple key (total duration, stop count), then
/// inner-join to race rows with a resolvable finishing position.
pub fn pit_to_race(pitstops: &[PitStopEntry], races: &[RaceEntry]) -> Vec<PitRaceRow> {
    // BTreeMap keeps the aggregate in key order so downstream output is
    // deterministic across runs.
    let mut aggregate: BTreeMap<JoinKey, (f64, u32)> = BTreeMap::new();
    for stop in pitstops {
        let duration = match stop.duration {
            Some(d) => d,
            None => continue,
        };
        if let Some(key) = join_key(stop.year, &stop.grand_prix, &stop.driver_key) {
            let entry = aggregate.entry(key).or_insert((0.0, 0));
            entry.0 += duration;
            entry.1 += 1;
        }
    }

    let mut finish_by_key: HashMap<JoinKey, f64> = HashMap::new();
    for race in races {
        let finish = match race.finish_pos {
            Some(f) => f,
            None => continue,
        };
        if let Some(key) = join_key(race.year, &race.grand_prix, &race.driver_key) {
            finish_by_key.entry(key).or_insert(finish);
        }
    }

    aggregate
        .into_iter()
        .filter_map(|(key, (total_pit_time, stops))| {
            let finish_pos = *finish_by_key.get(&key)?;
            Some(PitRaceRow {
                year: key.0,
                grand_prix: key.1,
                driver_key: key.2,
                total_pit_time,
                stops,
                finish_pos,
            })
        })
        .collect()
}

/// Sprint result joined to the sprint grid (inner) and the Sunday grid
/// (left, with the sprint grid substituted for missing Sunday values).
#[derive(Clone, Debug)]
pub struct SprintChainRow {
    pub year: i32,
    pub grand_prix: String,
    pub driver_key: String,
    pub sprint_pos: Option<f64>,
    pub sprint_grid: Option<f64>,
    pub sunday_grid: Option<f64>,
}

/// Result of [`sprint_to_grid_chain`], carrying substitution provenance.
#[derive(Clone, Debug, Default)]
pub struct SprintChain {
    pub rows: Vec<SprintChainRow>,
    /// How many rows had no Sunday grid value and took the sprint grid
    /// as a proxy instead.
    pub substituted: usize,
}

pub fn sprint_to_grid_chain(
    sprint_results: &[RaceEntry],
    sprint_grid: &[GridEntry],
    sunday_grid: &[GridEntry],
) -> SprintChain {
    let mut sprint_grid_by_key: HashMap<JoinKey, Option<f64>> = HashMap::new();
    for grid in sprint_grid {
        if let Some(key) = join_key(grid.year, &grid.grand_prix, &grid.driver_key) {
            sprint_grid_by_key.entry(key).or_insert(grid.grid_pos);
        }
    }
    let mut sunday_by_key: HashMap<JoinKey, Option<f64>> = HashMap::new();
    for grid in sunday_grid {
        if let Some(key) = join_key(grid.year, &grid.grand_prix, &grid.driver_key) {
            sunday_by_key.entry(key).or_insert(grid.grid_pos);
        }
    }

    let mut chain = SprintChain::default();
    for result in sprint_results {
        let key = match join_key(result.year, &result.grand_prix, &result.driver_key) {
            Some(key) => key,
            None => continue,
        };
        let sprint_grid_pos = match sprint_grid_by_key.get(&key) {
            Some(pos) => *pos,
            None => continue, // inner join: no sprint grid row, no output row
        };
        let sunday_pos = sunday_by_key.get(&key).copied().flatten();
        let sunday_grid = match sunday_pos {
            Some(pos) => Some(pos),
            None => {
                chain.substituted += 1;
                sprint_grid_pos
            }
        };
        chain.rows.push(SprintChainRow {
            year: key.0,
            grand_prix: key.1,
            driver_key: key.2,
            sprint_pos: result.finish_pos,
            sprint_grid: sprint_grid_pos,
            sunday_grid,
        });
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn race(year: Option<i32>, gp: &str, driver: &str, finish: Option<f64>) -> RaceEntry {
        RaceEntry {
            year,
            grand_prix: Some(gp.to_string()),
            driver_key: Some(driver.to_string()),
            team: None,
            finish_pos: finish,
            points: None,
        }
    }

    fn grid(year: Option<i32>, gp: &str, driver: &str, pos: Option<f64>) -> GridEntry {
        GridEntry {
            year,
            grand_prix: Some(gp.to_string()),
            driver_key: Some(driver.to_string()),
            grid_pos: pos,
        }
    }

    fn stop(year: Option<i32>, gp: &str, driver: &str, duration: Option<f64>) -> PitStopEntry {
        PitStopEntry {
            year,
            grand_prix: Some(gp.to_string()),
            driver_key: Some(driver.to_string()),
            duration,
        }
    }

    #[test]
    fn race_to_grid_matches_on_triple_key() {
        let races = vec![
            race(Some(2021), "Monza", "VER", Some(1.0)),
            race(Some(2021), "Monza", "HAM", Some(2.0)),
            race(None, "Monza", "BOT", Some(3.0)), // unresolved year: excluded
        ];
        let grids = vec![
            grid(Some(2021), "Monza", "VER", Some(3.0)),
            grid(Some(2021), "Spa", "HAM", Some(1.0)), // wrong race: no match
        ];
        let merged = race_to_grid(&races, &grids);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].driver_key, "VER");
        assert_eq!(merged[0].grid_pos, Some(3.0));
    }

    #[test]
    fn pit_to_race_aggregates_before_joining() {
        let stops = vec![
            stop(Some(2021), "Monza", "VER", Some(2.5)),
            stop(Some(2021), "Monza", "VER", Some(3.5)),
            stop(Some(2021), "Monza", "HAM", None), // unresolved duration: excluded
        ];
        let races = vec![
            race(Some(2021), "Monza", "VER", Some(1.0)),
            race(Some(2021), "Monza", "HAM", Some(2.0)),
        ];
        let merged = pit_to_race(&stops, &races);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].total_pit_time, 6.0);
        assert_eq!(merged[0].stops, 2);
        assert_eq!(merged[0].finish_pos, 1.0);
    }

    #[test]
    fn pit_to_race_drops_unresolved_finishes() {
        let stops = vec![stop(Some(2021), "Monza", "VER", Some(2.5))];
        let races = vec![race(Some(2021), "Monza", "VER", None)];
        assert!(pit_to_race(&stops, &races).is_empty());
    }

    #[test]
    fn sprint_chain_substitutes_missing_sunday_grid() {
        let results = vec![
            race(Some(2023), "Baku", "VER", Some(2.0)),
            race(Some(2023), "Baku", "PER", Some(1.0)),
        ];
        let sprint_grid = vec![
            grid(Some(2023), "Baku", "VER", Some(5.0)),
            grid(Some(2023), "Baku", "PER", Some(2.0)),
        ];
        let sunday = vec![grid(Some(2023), "Baku", "PER", Some(3.0))];
        let chain = sprint_to_grid_chain(&results, &sprint_grid, &sunday);
        assert_eq!(chain.rows.len(), 2);
        assert_eq!(chain.substituted, 1);
        let ver = chain.rows.iter().find(|r| r.driver_key == "VER").unwrap();
        assert_eq!(ver.sunday_grid, Some(5.0)); // sprint grid as proxy
        let per = chain.rows.iter().find(|r| r.driver_key == "PER").unwrap();
        assert_eq!(per.sunday_grid, Some(3.0));
    }

    #[test]
    fn empty_inputs_yield_empty_joins() {
        assert!(race_to_grid(&[], &[]).is_empty());
        assert!(pit_to_race(&[], &[]).is_empty());
        let chain = sprint_to_grid_chain(&[], &[], &[]);
        assert!(chain.rows.is_empty());
        assert_eq!(chain.substituted, 0);
    }
}
