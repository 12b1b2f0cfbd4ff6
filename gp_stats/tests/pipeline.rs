//! End-to-end run of the full metric set over a small synthetic snapshot:
//! two seasons, two drivers, two race weekends per season, one retirement
//! per season, and one sprint weekend. Every metric must produce a valid
//! JSON value free of NaN/Infinity tokens, and repeated runs must
//! serialize byte-identically.

use gp_stats::join::{pit_to_race, race_to_grid, sprint_to_grid_chain};
use gp_stats::{
    metrics, GridEntry, PitStopEntry, RaceEntry, StandingEntry, StatsCapability,
};

fn race(year: i32, gp: &str, driver: &str, team: &str, pos: Option<f64>, pts: f64) -> RaceEntry {
    RaceEntry {
        year: Some(year),
        grand_prix: Some(gp.to_string()),
        driver_key: Some(driver.to_string()),
        team: Some(team.to_string()),
        finish_pos: pos,
        points: Some(pts),
    }
}

fn grid(year: i32, gp: &str, driver: &str, pos: f64) -> GridEntry {
    GridEntry {
        year: Some(year),
        grand_prix: Some(gp.to_string()),
        driver_key: Some(driver.to_string()),
        grid_pos: Some(pos),
    }
}

fn standing(year: i32, entity: &str, pos: f64, pts: f64) -> StandingEntry {
    StandingEntry {
        year: Some(year),
        entity: Some(entity.to_string()),
        driver_key: Some(entity.to_string()),
        pos: Some(pos),
        points: Some(pts),
    }
}

fn pit(year: i32, gp: &str, driver: &str, duration: f64) -> PitStopEntry {
    PitStopEntry {
        year: Some(year),
        grand_prix: Some(gp.to_string()),
        driver_key: Some(driver.to_string()),
        duration: Some(duration),
    }
}

struct Snapshot {
    races: Vec<RaceEntry>,
    grids: Vec<GridEntry>,
    driver_standings: Vec<StandingEntry>,
    constructor_standings: Vec<StandingEntry>,
    pitstops: Vec<PitStopEntry>,
    sprint_results: Vec<RaceEntry>,
    sprint_grid: Vec<GridEntry>,
}

fn synthetic_snapshot() -> Snapshot {
    Snapshot {
        races: vec![
            race(2022, "Monza", "VER", "Red Bull", Some(1.0), 25.0),
            race(2022, "Monza", "LEC", "Ferrari", Some(2.0), 18.0),
            race(2022, "Baku", "VER", "Red Bull", Some(1.0), 25.0),
            race(2022, "Baku", "LEC", "Ferrari", None, 0.0), // DNF
            race(2023, "Monza", "VER", "Red Bull", Some(1.0), 25.0),
            race(2023, "Monza", "LEC", "Ferrari", Some(3.0), 15.0),
            race(2023, "Baku", "VER", "Red Bull", None, 0.0), // DNF
            race(2023, "Baku", "LEC", "Ferrari", Some(1.0), 25.0),
        ],
        grids: vec![
            grid(2022, "Monza", "VER", 2.0),
            grid(2022, "Monza", "LEC", 1.0),
            grid(2022, "Baku", "VER", 1.0),
            grid(2022, "Baku", "LEC", 2.0),
            grid(2023, "Monza", "VER", 1.0),
            grid(2023, "Monza", "LEC", 2.0),
            grid(2023, "Baku", "VER", 2.0),
            grid(2023, "Baku", "LEC", 1.0),
        ],
        driver_standings: vec![
            standing(2022, "VER", 1.0, 58.0),
            standing(2022, "LEC", 2.0, 18.0),
            standing(2023, "VER", 1.0, 33.0),
            standing(2023, "LEC", 2.0, 43.0),
        ],
        constructor_standings: vec![
            standing(2022, "Red Bull", 1.0, 58.0),
            standing(2022, "Ferrari", 2.0, 18.0),
            standing(2023, "Ferrari", 1.0, 43.0),
            standing(2023, "Red Bull", 2.0, 33.0),
        ],
        pitstops: vec![
            pit(2022, "Monza", "VER", 21.5),
            pit(2022, "Monza", "LEC", 22.0),
            pit(2022, "Baku", "VER", 23.5),
            pit(2022, "Baku", "LEC", 55.0), // the stop that ended the race
            pit(2023, "Monza", "VER", 20.5),
            pit(2023, "Monza", "LEC", 21.0),
            pit(2023, "Baku", "LEC", 22.5),
        ],
        sprint_results: vec![
            race(2022, "Baku", "VER", "Red Bull", Some(1.0), 8.0),
            race(2022, "Baku", "LEC", "Ferrari", Some(2.0), 7.0),
        ],
        sprint_grid: vec![grid(2022, "Baku", "VER", 1.0), grid(2022, "Baku", "LEC", 2.0)],
    }
}

fn metric_documents(snapshot: &Snapshot) -> Vec<(&'static str, serde_json::Value)> {
    let caps = StatsCapability::detect();
    let race_grid = race_to_grid(&snapshot.races, &snapshot.grids);
    let pit_race = pit_to_race(&snapshot.pitstops, &snapshot.races);
    let chain = sprint_to_grid_chain(&snapshot.sprint_results, &snapshot.sprint_grid, &snapshot.grids);

    fn json<T: serde::Serialize>(value: T) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(value)
    }
    vec![
        (
            "dominant_team_share",
            json(metrics::dominant_team_share(&snapshot.races)).unwrap(),
        ),
        (
            "win_share_by_decade",
            json(metrics::win_share_by_decade(&snapshot.races)).unwrap(),
        ),
        (
            "title_streaks_drivers",
            json(metrics::title_streaks(&snapshot.driver_standings)).unwrap(),
        ),
        (
            "title_streaks_teams",
            json(metrics::title_streaks(&snapshot.constructor_standings)).unwrap(),
        ),
        (
            "grid_finish_correlation",
            json(metrics::rank_correlation(&race_grid)).unwrap(),
        ),
        (
            "podium_probability_by_grid",
            json(metrics::podium_probability_by_grid(&race_grid)).unwrap(),
        ),
        (
            "position_delta_by_decade",
            json(metrics::position_delta_by_decade(&race_grid)).unwrap(),
        ),
        (
            "pit_time_vs_finish",
            json(metrics::pit_time_vs_finish(&pit_race)).unwrap(),
        ),
        (
            "pit_time_effect_by_decade",
            json(metrics::pit_time_effect_by_decade(&pit_race, caps)).unwrap(),
        ),
        (
            "severe_pit_stops",
            json(metrics::severe_pit_stops(&snapshot.pitstops)).unwrap(),
        ),
        (
            "sprint_points_share",
            json(metrics::sprint_points_share(
                &snapshot.sprint_results,
                &snapshot.driver_standings,
            ))
            .unwrap(),
        ),
        (
            "sprint_induced_delta",
            json(metrics::sprint_induced_delta(&chain)).unwrap(),
        ),
        (
            "sprint_vs_nonsprint_variance",
            json(metrics::sprint_vs_nonsprint_variance(
                &snapshot.races,
                &snapshot.sprint_results,
            ))
            .unwrap(),
        ),
        (
            "sprint_championship_impact",
            json(metrics::sprint_championship_impact(
                &snapshot.sprint_results,
                &snapshot.driver_standings,
            ))
            .unwrap(),
        ),
    ]
}

#[test]
fn every_metric_serializes_to_clean_json() {
    let snapshot = synthetic_snapshot();
    let documents = metric_documents(&snapshot);
    assert_eq!(documents.len(), 14);

    for (name, value) in &documents {
        let text = serde_json::to_string(value).unwrap();
        assert!(!text.contains("NaN"), "{name} leaked NaN: {text}");
        assert!(!text.contains("Infinity"), "{name} leaked Infinity: {text}");
        assert!(!text.contains("null"), "{name} leaked null: {text}");
    }
}

#[test]
fn repeated_runs_serialize_byte_identically() {
    let snapshot = synthetic_snapshot();
    let first: Vec<String> = metric_documents(&snapshot)
        .into_iter()
        .map(|(_, v)| serde_json::to_string(&v).unwrap())
        .collect();
    let second: Vec<String> = metric_documents(&snapshot)
        .into_iter()
        .map(|(_, v)| serde_json::to_string(&v).unwrap())
        .collect();
    assert_eq!(first, second);
}

#[test]
fn dnf_rows_shrink_but_never_poison_results() {
    let snapshot = synthetic_snapshot();
    let race_grid = race_to_grid(&snapshot.races, &snapshot.grids);

    // Both DNFs survive the join with an unresolved finish.
    assert_eq!(race_grid.len(), 8);
    assert_eq!(
        race_grid.iter().filter(|r| r.finish_pos.is_none()).count(),
        2
    );

    // The delta traces only carry the six resolvable rows.
    let deltas = metrics::position_delta_by_decade(&race_grid);
    let total: usize = deltas.traces.iter().map(|t| t.values.len()).sum();
    assert_eq!(total, 6);

    // Every share stays in bounds despite the dropped rows.
    let share = metrics::dominant_team_share(&snapshot.races);
    assert_eq!(share.years, vec![2022, 2023]);
    assert!(share.pct.iter().all(|&p| (0.0..=100.0).contains(&p)));
}

#[test]
fn sprint_weekend_membership_drives_the_variance_split() {
    let snapshot = synthetic_snapshot();
    let split =
        metrics::sprint_vs_nonsprint_variance(&snapshot.races, &snapshot.sprint_results);
    // 2022 Baku is the only sprint weekend, and its race has a single
    // classified finisher, so no variance is defined there.
    assert!(split.sprint.is_empty());
    assert_eq!(split.non_sprint.len(), 2);

    let impact =
        metrics::sprint_championship_impact(&snapshot.sprint_results, &snapshot.driver_standings);
    assert_eq!(impact.years, vec![2022]);
    assert_eq!(impact.margins, vec![40.0]);
    assert_eq!(impact.impacts, vec![1.0]);
}
