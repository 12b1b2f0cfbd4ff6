//! The metric library: named statistical computations over normalized and
//! joined tables.
//!
//! Every metric is a pure function returning a small serializable result.
//! Metrics tolerate empty inputs and degrade to explicit empty results so
//! both output adapters can render "no data" states uniformly; unresolved
//! fields are dropped per computation, never coerced.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::join::{PitRaceRow, RaceGridRow, SprintChain};
use crate::stats;
use crate::{decade, PitStopEntry, RaceEntry, StandingEntry, StatsCapability};

/// Per-season win share of the winningest team, in percent.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DominantTeamShare {
    pub years: Vec<i32>,
    pub pct: Vec<f64>,
}

pub fn dominant_team_share(races: &[RaceEntry]) -> DominantTeamShare {
    let mut races_per_year: BTreeMap<i32, BTreeSet<&str>> = BTreeMap::new();
    let mut wins: BTreeMap<(i32, &str), u32> = BTreeMap::new();

    for race in races {
        let (year, gp, team) = match (race.year, race.grand_prix.as_deref(), race.team.as_deref()) {
            (Some(y), Some(g), Some(t)) => (y, g, t),
            _ => continue,
        };
        races_per_year.entry(year).or_default().insert(gp);
        if race.finish_pos == Some(1.0) {
            *wins.entry((year, team)).or_insert(0) += 1;
        }
    }

    let mut max_wins: BTreeMap<i32, u32> = BTreeMap::new();
    for ((year, _), count) in &wins {
        let best = max_wins.entry(*year).or_insert(0);
        *best = (*best).max(*count);
    }

    let mut result = DominantTeamShare::default();
    for (year, best) in max_wins {
        let total = races_per_year.get(&year).map_or(0, BTreeSet::len);
        if total == 0 {
            continue;
        }
        result.years.push(year);
        result.pct.push(f64::from(best) / total as f64 * 100.0);
    }
    result
}

/// Decade x team win-share matrix. Teams are ordered by descending total
/// wins; each decade row sums to 1.
#[derive(Clone, Debug, Default, Serialize)]
pub struct WinShareMatrix {
    pub decades: Vec<i32>,
    pub teams: Vec<String>,
    pub share: Vec<Vec<f64>>,
}

pub fn win_share_by_decade(races: &[RaceEntry]) -> WinShareMatrix {
    let mut counts: BTreeMap<(i32, &str), u32> = BTreeMap::new();
    let mut totals: BTreeMap<&str, u32> = BTreeMap::new();
    let mut decades: BTreeSet<i32> = BTreeSet::new();

    for race in races {
        if race.finish_pos != Some(1.0) {
            continue;
        }
        let (year, team) = match (race.year, race.team.as_deref()) {
            (Some(y), Some(t)) => (y, t),
            _ => continue,
        };
        let bucket = decade(year);
        decades.insert(bucket);
        *counts.entry((bucket, team)).or_insert(0) += 1;
        *totals.entry(team).or_insert(0) += 1;
    }

    // Descending total wins; the stable sort keeps ties in name order.
    let mut teams: Vec<&str> = totals.keys().copied().collect();
    teams.sort_by_key(|team| std::cmp::Reverse(totals[team]));

    let mut result = WinShareMatrix {
        decades: decades.iter().copied().collect(),
        teams: teams.iter().map(|t| (*t).to_string()).collect(),
        share: Vec::new(),
    };
    for &bucket in &decades {
        let row: Vec<u32> = teams
            .iter()
            .map(|&team| counts.get(&(bucket, team)).copied().unwrap_or(0))
            .collect();
        let total: u32 = row.iter().sum();
        result.share.push(
            row.into_iter()
                .map(|count| {
                    if total == 0 {
                        0.0
                    } else {
                        f64::from(count) / f64::from(total)
                    }
                })
                .collect(),
        );
    }
    result
}

/// Longest runs of consecutive championship years, top 15, presented in
/// ascending streak order for bottom-up bar layout.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TitleStreaks {
    pub labels: Vec<String>,
    pub values: Vec<u32>,
}

pub fn title_streaks(standings: &[StandingEntry]) -> TitleStreaks {
    let mut years_by_entity: BTreeMap<&str, BTreeSet<i32>> = BTreeMap::new();
    for entry in standings {
        if entry.pos != Some(1.0) {
            continue;
        }
        let (year, entity) = match (entry.year, entry.entity.as_deref()) {
            (Some(y), Some(e)) => (y, e),
            _ => continue,
        };
        years_by_entity.entry(entity).or_default().insert(year);
    }

    let mut streaks: Vec<(&str, u32)> = years_by_entity
        .iter()
        .map(|(entity, years)| (*entity, max_consecutive_years(years)))
        .collect();
    // Stable descending sort keeps ties in entity-name order.
    streaks.sort_by_key(|(_, streak)| std::cmp::Reverse(*streak));
    streaks.truncate(15);
    streaks.reverse();

    TitleStreaks {
        labels: streaks.iter().map(|(e, _)| (*e).to_string()).collect(),
        values: streaks.iter().map(|(_, s)| *s).collect(),
    }
}

/// Longest run of consecutive integer years; a gap resets the run to 1.
fn max_consecutive_years(years: &BTreeSet<i32>) -> u32 {
    let mut longest = 0;
    let mut current = 0;
    let mut prev: Option<i32> = None;
    for &year in years {
        current = match prev {
            Some(p) if year == p + 1 => current + 1,
            Some(_) => 1,
            None => 1,
        };
        longest = longest.max(current);
        prev = Some(year);
    }
    longest
}

/// Per-season Spearman correlation between grid and finishing position.
#[derive(Clone, Debug, Default, Serialize)]
pub struct GridFinishCorrelation {
    pub years: Vec<i32>,
    pub rho: Vec<f64>,
}

pub fn rank_correlation(merged: &[RaceGridRow]) -> GridFinishCorrelation {
    let mut by_year: BTreeMap<i32, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for row in merged {
        if let (Some(grid), Some(finish)) = (row.grid_pos, row.finish_pos) {
            let series = by_year.entry(row.year).or_default();
            series.0.push(grid);
            series.1.push(finish);
        }
    }

    let mut result = GridFinishCorrelation::default();
    for (year, (grid, finish)) in by_year {
        // Years where the correlation is undefined are omitted entirely.
        if let Some(rho) = stats::spearman(&grid, &finish) {
            result.years.push(year);
            result.rho.push(rho);
        }
    }
    result
}

#[derive(Clone, Debug, Serialize)]
pub struct PodiumTrace {
    pub decade: i32,
    pub grid: Vec<f64>,
    pub probability: Vec<f64>,
}

/// Podium (finish <= 3) fraction per starting slot, one trace per decade.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PodiumProbability {
    pub traces: Vec<PodiumTrace>,
}

pub fn podium_probability_by_grid(merged: &[RaceGridRow]) -> PodiumProbability {
    let mut by_decade: BTreeMap<i32, BTreeMap<OrderedFloat<f64>, (u32, u32)>> = BTreeMap::new();
    for row in merged {
        if let (Some(grid), Some(finish)) = (row.grid_pos, row.finish_pos) {
            let slot = by_decade
                .entry(decade(row.year))
                .or_default()
                .entry(OrderedFloat(grid))
                .or_insert((0, 0));
            slot.1 += 1;
            if finish <= 3.0 {
                slot.0 += 1;
            }
        }
    }

    let mut result = PodiumProbability::default();
    for (bucket, slots) in by_decade {
        if slots.is_empty() {
            continue;
        }
        let mut trace = PodiumTrace {
            decade: bucket,
            grid: Vec::with_capacity(slots.len()),
            probability: Vec::with_capacity(slots.len()),
        };
        for (grid, (podiums, total)) in slots {
            trace.grid.push(grid.into_inner());
            trace.probability.push(f64::from(podiums) / f64::from(total));
        }
        result.traces.push(trace);
    }
    result
}

#[derive(Clone, Debug, Serialize)]
pub struct DecadeDeltas {
    pub decade: i32,
    pub values: Vec<f64>,
}

/// Positions gained/lost (finish - grid) per decade.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PositionDeltas {
    pub traces: Vec<DecadeDeltas>,
}

pub fn position_delta_by_decade(merged: &[RaceGridRow]) -> PositionDeltas {
    let mut by_decade: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for row in merged {
        if let (Some(grid), Some(finish)) = (row.grid_pos, row.finish_pos) {
            by_decade.entry(decade(row.year)).or_default().push(finish - grid);
        }
    }

    PositionDeltas {
        traces: by_decade
            .into_iter()
            .map(|(bucket, values)| DecadeDeltas {
                decade: bucket,
                values,
            })
            .collect(),
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

/// Scatter of total pit time against finishing position, with an OLS trend
/// line when at least two points exist.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PitTimeScatter {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendLine>,
}

pub fn pit_time_vs_finish(merged: &[PitRaceRow]) -> PitTimeScatter {
    let x: Vec<f64> = merged.iter().map(|r| r.total_pit_time).collect();
    let y: Vec<f64> = merged.iter().map(|r| r.finish_pos).collect();
    let trend = stats::linear_fit(&x, &y).map(|fit| TrendLine {
        slope: fit.slope,
        intercept: fit.intercept,
    });
    PitTimeScatter { x, y, trend }
}

/// Marginal effect of total pit time on finishing position, per decade.
/// The CI vectors are present only when the confidence-interval-capable
/// regression ran for every retained decade.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PitTimeEffect {
    pub decades: Vec<i32>,
    pub coefs: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_low: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_high: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

pub fn pit_time_effect_by_decade(merged: &[PitRaceRow], caps: StatsCapability) -> PitTimeEffect {
    let mut by_decade: BTreeMap<i32, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for row in merged {
        let series = by_decade.entry(decade(row.year)).or_default();
        series.0.push(row.total_pit_time);
        series.1.push(row.finish_pos);
    }

    let mut result = PitTimeEffect::default();
    let mut intervals: Vec<Option<(f64, f64)>> = Vec::new();
    for (bucket, (x, y)) in by_decade {
        if x.len() < 2 {
            continue;
        }
        let fit = match stats::linear_fit(&x, &y) {
            Some(fit) => fit,
            None => continue, // degenerate pit times, nothing to regress on
        };
        result.decades.push(bucket);
        result.coefs.push(fit.slope);
        intervals.push(slope_ci(&x, &y, caps));
    }

    let with_ci = caps.ci_regression && !intervals.is_empty() && intervals.iter().all(Option::is_some);
    if with_ci {
        let (low, high): (Vec<f64>, Vec<f64>) = intervals.into_iter().flatten().unzip();
        result.ci_low = Some(low);
        result.ci_high = Some(high);
    } else if !caps.ci_regression {
        result.note = Some("no confidence intervals; slopes from plain least squares".to_string());
    } else {
        result.note =
            Some("confidence intervals omitted; not enough data for interval estimates".to_string());
    }
    result
}

fn slope_ci(x: &[f64], y: &[f64], caps: StatsCapability) -> Option<(f64, f64)> {
    if !caps.ci_regression {
        return None;
    }
    #[cfg(feature = "ci-stats")]
    {
        stats::slope_confidence(x, y)
    }
    #[cfg(not(feature = "ci-stats"))]
    {
        let _ = (x, y);
        None
    }
}

/// Stops strictly above their season's 95th-percentile duration.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SevereStops {
    pub values: Vec<f64>,
}

pub fn severe_pit_stops(pitstops: &[PitStopEntry]) -> SevereStops {
    let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for stop in pitstops {
        if let (Some(year), Some(duration)) = (stop.year, stop.duration) {
            by_year.entry(year).or_default().push(duration);
        }
    }
    let thresholds: BTreeMap<i32, f64> = by_year
        .into_iter()
        .filter_map(|(year, durations)| Some((year, stats::percentile(&durations, 0.95)?)))
        .collect();

    let mut result = SevereStops::default();
    for stop in pitstops {
        if let (Some(year), Some(duration)) = (stop.year, stop.duration) {
            if thresholds.get(&year).is_some_and(|&p95| duration > p95) {
                result.values.push(duration);
            }
        }
    }
    result
}

/// Share of championship points earned in sprint sessions, per season.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SprintPointsShare {
    pub years: Vec<i32>,
    pub pct: Vec<f64>,
}

pub fn sprint_points_share(
    sprint_results: &[RaceEntry],
    standings: &[StandingEntry],
) -> SprintPointsShare {
    let mut sprint_by_year: BTreeMap<i32, f64> = BTreeMap::new();
    for row in sprint_results {
        if let (Some(year), Some(points)) = (row.year, row.points) {
            *sprint_by_year.entry(year).or_insert(0.0) += points;
        }
    }
    let mut total_by_year: BTreeMap<i32, f64> = BTreeMap::new();
    for row in standings {
        if let (Some(year), Some(points)) = (row.year, row.points) {
            *total_by_year.entry(year).or_insert(0.0) += points;
        }
    }

    let mut result = SprintPointsShare::default();
    for (year, sprint) in sprint_by_year {
        // Years with a zero or missing season total are excluded outright.
        match total_by_year.get(&year) {
            Some(&total) if total != 0.0 => {
                result.years.push(year);
                result.pct.push(sprint / total * 100.0);
            }
            _ => {}
        }
    }
    result
}

/// Sunday grid minus sprint finishing position, with the substitution
/// provenance note from the chained join.
#[derive(Clone, Debug, Serialize)]
pub struct SprintDeltas {
    pub values: Vec<f64>,
    pub note: String,
}

pub fn sprint_induced_delta(chain: &SprintChain) -> SprintDeltas {
    let values: Vec<f64> = chain
        .rows
        .iter()
        .filter_map(|row| Some(row.sunday_grid? - row.sprint_pos?))
        .collect();
    let note = if chain.substituted > 0 {
        "delta = Sunday grid minus sprint finishing position; \
         missing Sunday grid uses the sprint grid as a proxy"
    } else {
        "delta = Sunday grid minus sprint finishing position"
    };
    SprintDeltas {
        values,
        note: note.to_string(),
    }
}

/// Per-race variance of top-10 finishing positions, split by whether the
/// race weekend had a sprint session.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VarianceSplit {
    pub sprint: Vec<f64>,
    pub non_sprint: Vec<f64>,
}

pub fn sprint_vs_nonsprint_variance(
    races: &[RaceEntry],
    sprint_results: &[RaceEntry],
) -> VarianceSplit {
    let mut by_race: BTreeMap<(i32, &str), Vec<f64>> = BTreeMap::new();
    for race in races {
        let (year, gp, finish) = match (race.year, race.grand_prix.as_deref(), race.finish_pos) {
            (Some(y), Some(g), Some(f)) => (y, g, f),
            _ => continue,
        };
        if finish <= 10.0 {
            by_race.entry((year, gp)).or_default().push(finish);
        }
    }

    let sprint_keys: HashSet<(i32, &str)> = sprint_results
        .iter()
        .filter_map(|row| Some((row.year?, row.grand_prix.as_deref()?)))
        .collect();

    let mut result = VarianceSplit::default();
    for ((year, gp), finishes) in by_race {
        let variance = match stats::sample_variance(&finishes) {
            Some(v) => v,
            None => continue, // single-entry races have no defined variance
        };
        if sprint_keys.contains(&(year, gp)) {
            result.sprint.push(variance);
        } else {
            result.non_sprint.push(variance);
        }
    }
    result
}

/// Championship margin paired with the sprint-points differential between
/// champion and runner-up, per sprint-era season.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ChampionshipImpact {
    pub years: Vec<i32>,
    pub margins: Vec<f64>,
    pub impacts: Vec<f64>,
}

pub fn sprint_championship_impact(
    sprint_results: &[RaceEntry],
    standings: &[StandingEntry],
) -> ChampionshipImpact {
    let mut sprint_points: BTreeMap<(i32, &str), f64> = BTreeMap::new();
    for row in sprint_results {
        let (year, key, points) = match (row.year, row.driver_key.as_deref(), row.points) {
            (Some(y), Some(k), Some(p)) => (y, k, p),
            _ => continue,
        };
        *sprint_points.entry((year, key)).or_insert(0.0) += points;
    }

    let ranked: Vec<&StandingEntry> = standings
        .iter()
        .filter(|s| {
            s.year.is_some() && s.points.is_some() && s.pos.is_some() && s.driver_key.is_some()
        })
        .collect();
    let sprint_years: BTreeSet<i32> = sprint_points.keys().map(|(year, _)| *year).collect();

    let mut result = ChampionshipImpact::default();
    for year in sprint_years {
        let champion = ranked
            .iter()
            .find(|s| s.year == Some(year) && s.pos == Some(1.0));
        let runner_up = ranked
            .iter()
            .find(|s| s.year == Some(year) && s.pos == Some(2.0));
        let (champion, runner_up) = match (champion, runner_up) {
            (Some(c), Some(r)) => (c, r),
            _ => continue, // years missing either rank are skipped
        };

        let margin = champion.points.unwrap_or(0.0) - runner_up.points.unwrap_or(0.0);
        let champion_sprint = sprint_points
            .get(&(year, champion.driver_key.as_deref().unwrap_or_default()))
            .copied()
            .unwrap_or(0.0);
        let runner_sprint = sprint_points
            .get(&(year, runner_up.driver_key.as_deref().unwrap_or_default()))
            .copied()
            .unwrap_or(0.0);

        result.years.push(year);
        result.margins.push(margin);
        result.impacts.push(champion_sprint - runner_sprint);
    }
    result
}
