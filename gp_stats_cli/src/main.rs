use std::fs;
use std::fs::File;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, ValueHint};
use gp_stats::join::{pit_to_race, race_to_grid, sprint_to_grid_chain};
use gp_stats::{
    grid_entries, metrics, pit_entries, race_entries, standing_entries, validate_columns,
    GridEntry, PitDurationSource, PitStopEntry, PitStopRow, RaceEntry, ResultRow, StandingEntry,
    StandingRow, StandingScope, StatsCapability, CONSTRUCTOR_STANDINGS_COLUMNS,
    DRIVER_STANDINGS_COLUMNS, PITSTOPS_COLUMNS, RACE_DETAILS_COLUMNS, SPRINT_GRID_COLUMNS,
    SPRINT_RESULTS_COLUMNS, STARTING_GRIDS_COLUMNS,
};
use plotters::prelude::*;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Grand Prix statistics: figures and JSON bundles", long_about = None)]
struct Cli {
    /// Directory holding the CSV snapshots
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    data_dir: PathBuf,

    /// Directory for the rendered figures and the manifest
    #[arg(short, long, default_value = "outputs/figures", value_hint = ValueHint::DirPath)]
    output: PathBuf,

    /// Static-site root receiving the JSON bundles and copied figures
    #[arg(long, default_value = "docs", value_hint = ValueHint::DirPath)]
    site_dir: PathBuf,

    /// Disable figure rendering (and the manifest)
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Disable JSON export
    #[arg(long, action = ArgAction::SetTrue)]
    no_json: bool,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let caps = StatsCapability::detect();
    debug!(ci_regression = caps.ci_regression, "statistical capabilities");

    let t_load = Instant::now();
    let snapshot = load_snapshot(&cli.data_dir)?;
    debug!(
        "load stage: {:.1} ms",
        t_load.elapsed().as_secs_f64() * 1000.0
    );

    let t_compute = Instant::now();
    let set = MetricSet::compute(&snapshot, caps);
    debug!(
        "compute stage: {:.1} ms",
        t_compute.elapsed().as_secs_f64() * 1000.0
    );

    if !cli.no_json {
        let data_dir = cli.site_dir.join("data");
        export_json(&set, &data_dir)?;
        info!("JSON bundles written to {}", data_dir.display());
    }

    if !cli.no_plot {
        fs::create_dir_all(&cli.output)
            .with_context(|| format!("failed to create {}", cli.output.display()))?;
        let entries = render_figures(&set, &cli.output);
        write_manifest(&entries, &cli.output)?;
        info!(
            "{} of {} figures rendered to {}",
            entries.len(),
            chart_specs().len(),
            cli.output.display()
        );
        copy_to_site(&cli.output, &cli.site_dir.join("figures"))?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Snapshot {
    races: Vec<RaceEntry>,
    grids: Vec<GridEntry>,
    driver_standings: Vec<StandingEntry>,
    constructor_standings: Vec<StandingEntry>,
    pitstops: Vec<PitStopEntry>,
    sprint_results: Vec<RaceEntry>,
    sprint_grid: Vec<GridEntry>,
}

/// Read one CSV table, validating its header before any row is touched.
/// Returns the rows together with the header for tables whose layout
/// varies between snapshot vintages.
fn load_rows<T: DeserializeOwned>(
    dir: &Path,
    name: &str,
    required: &[&str],
) -> Result<(Vec<T>, Vec<String>)> {
    let path = dir.join(name);
    let mut reader = csv::Reader::from_path(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read the header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();
    validate_columns(&headers, required, name)?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record.with_context(|| format!("failed to parse a row in {}", path.display()))?);
    }
    Ok((rows, headers))
}

fn load_snapshot(dir: &Path) -> Result<Snapshot> {
    let (race_rows, _) = load_rows::<ResultRow>(dir, "race_details.csv", RACE_DETAILS_COLUMNS)?;
    let (grid_rows, _) = load_rows::<ResultRow>(dir, "starting_grids.csv", STARTING_GRIDS_COLUMNS)?;
    let (driver_rows, _) =
        load_rows::<StandingRow>(dir, "driver_standings.csv", DRIVER_STANDINGS_COLUMNS)?;
    let (team_rows, _) = load_rows::<StandingRow>(
        dir,
        "constructor_standings.csv",
        CONSTRUCTOR_STANDINGS_COLUMNS,
    )?;
    let (pit_rows, pit_headers) = load_rows::<PitStopRow>(dir, "pitstops.csv", PITSTOPS_COLUMNS)?;
    let pit_source = PitDurationSource::from_headers(&pit_headers, "pitstops.csv")?;
    let (sprint_rows, _) = load_rows::<ResultRow>(dir, "sprint_results.csv", SPRINT_RESULTS_COLUMNS)?;
    let (sprint_grid_rows, _) = load_rows::<ResultRow>(dir, "sprint_grid.csv", SPRINT_GRID_COLUMNS)?;

    debug!(
        races = race_rows.len(),
        grids = grid_rows.len(),
        drivers = driver_rows.len(),
        constructors = team_rows.len(),
        pitstops = pit_rows.len(),
        sprints = sprint_rows.len(),
        pit_source = ?pit_source,
        "snapshot loaded"
    );

    Ok(Snapshot {
        races: race_entries(&race_rows),
        grids: grid_entries(&grid_rows),
        driver_standings: standing_entries(&driver_rows, StandingScope::Driver),
        constructor_standings: standing_entries(&team_rows, StandingScope::Constructor),
        pitstops: pit_entries(&pit_rows, pit_source),
        sprint_results: race_entries(&sprint_rows),
        sprint_grid: grid_entries(&sprint_grid_rows),
    })
}

// ---------------------------------------------------------------------------
// Metric computation (once per run; both adapters read from here)
// ---------------------------------------------------------------------------

struct MetricSet {
    dominant_team_share: metrics::DominantTeamShare,
    win_share_by_decade: metrics::WinShareMatrix,
    title_streaks_drivers: metrics::TitleStreaks,
    title_streaks_teams: metrics::TitleStreaks,
    grid_finish_correlation: metrics::GridFinishCorrelation,
    podium_probability_by_grid: metrics::PodiumProbability,
    position_delta_by_decade: metrics::PositionDeltas,
    pit_time_vs_finish: metrics::PitTimeScatter,
    pit_time_effect_by_decade: metrics::PitTimeEffect,
    severe_pit_stops: metrics::SevereStops,
    sprint_points_share: metrics::SprintPointsShare,
    sprint_induced_delta: metrics::SprintDeltas,
    sprint_vs_nonsprint_variance: metrics::VarianceSplit,
    sprint_championship_impact: metrics::ChampionshipImpact,
}

impl MetricSet {
    fn compute(snapshot: &Snapshot, caps: StatsCapability) -> Self {
        let race_grid = race_to_grid(&snapshot.races, &snapshot.grids);
        let pit_race = pit_to_race(&snapshot.pitstops, &snapshot.races);
        let chain =
            sprint_to_grid_chain(&snapshot.sprint_results, &snapshot.sprint_grid, &snapshot.grids);
        if chain.substituted > 0 {
            debug!(
                substituted = chain.substituted,
                "sprint rows missing a Sunday grid took the sprint grid as a proxy"
            );
        }

        MetricSet {
            dominant_team_share: metrics::dominant_team_share(&snapshot.races),
            win_share_by_decade: metrics::win_share_by_decade(&snapshot.races),
            title_streaks_drivers: metrics::title_streaks(&snapshot.driver_standings),
            title_streaks_teams: metrics::title_streaks(&snapshot.constructor_standings),
            grid_finish_correlation: metrics::rank_correlation(&race_grid),
            podium_probability_by_grid: metrics::podium_probability_by_grid(&race_grid),
            position_delta_by_decade: metrics::position_delta_by_decade(&race_grid),
            pit_time_vs_finish: metrics::pit_time_vs_finish(&pit_race),
            pit_time_effect_by_decade: metrics::pit_time_effect_by_decade(&pit_race, caps),
            severe_pit_stops: metrics::severe_pit_stops(&snapshot.pitstops),
            sprint_points_share: metrics::sprint_points_share(
                &snapshot.sprint_results,
                &snapshot.driver_standings,
            ),
            sprint_induced_delta: metrics::sprint_induced_delta(&chain),
            sprint_vs_nonsprint_variance: metrics::sprint_vs_nonsprint_variance(
                &snapshot.races,
                &snapshot.sprint_results,
            ),
            sprint_championship_impact: metrics::sprint_championship_impact(
                &snapshot.sprint_results,
                &snapshot.driver_standings,
            ),
        }
    }

    /// One JSON document per metric, in the naming-contract order.
    fn documents(&self) -> Result<Vec<(&'static str, JsonValue)>> {
        Ok(vec![
            ("dominant_team_share", serde_json::to_value(&self.dominant_team_share)?),
            ("win_share_by_decade", serde_json::to_value(&self.win_share_by_decade)?),
            ("title_streaks_drivers", serde_json::to_value(&self.title_streaks_drivers)?),
            ("title_streaks_teams", serde_json::to_value(&self.title_streaks_teams)?),
            ("grid_finish_correlation", serde_json::to_value(&self.grid_finish_correlation)?),
            (
                "podium_probability_by_grid",
                serde_json::to_value(&self.podium_probability_by_grid)?,
            ),
            (
                "position_delta_by_decade",
                serde_json::to_value(&self.position_delta_by_decade)?,
            ),
            ("pit_time_vs_finish", serde_json::to_value(&self.pit_time_vs_finish)?),
            (
                "pit_time_effect_by_decade",
                serde_json::to_value(&self.pit_time_effect_by_decade)?,
            ),
            ("severe_pit_stops", serde_json::to_value(&self.severe_pit_stops)?),
            ("sprint_points_share", serde_json::to_value(&self.sprint_points_share)?),
            ("sprint_induced_delta", serde_json::to_value(&self.sprint_induced_delta)?),
            (
                "sprint_vs_nonsprint_variance",
                serde_json::to_value(&self.sprint_vs_nonsprint_variance)?,
            ),
            (
                "sprint_championship_impact",
                serde_json::to_value(&self.sprint_championship_impact)?,
            ),
        ])
    }
}

// ---------------------------------------------------------------------------
// JSON export
// ---------------------------------------------------------------------------

fn export_json(set: &MetricSet, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    for (stem, value) in set.documents()? {
        let path = dir.join(format!("{stem}.json"));
        let text = serde_json::to_string_pretty(&value)?;
        fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Figures and manifest
// ---------------------------------------------------------------------------

const FIGURE_SIZE: (u32, u32) = (1280, 720);
const TITLE_FONT: (&str, i32) = ("sans-serif", 28);
const LABEL_FONT: (&str, i32) = ("sans-serif", 16);

const PALETTE: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

struct ChartSpec {
    stem: &'static str,
    title: &'static str,
    datasets: &'static str,
    filters: &'static str,
    render: fn(&MetricSet, &Path) -> Result<()>,
}

struct ManifestEntry {
    filename: String,
    title: &'static str,
    datasets: &'static str,
    filters: &'static str,
}

fn chart_specs() -> Vec<ChartSpec> {
    vec![
        ChartSpec {
            stem: "dominant_team_share",
            title: "Dominant team win share per season",
            datasets: "race_details.csv",
            filters: "winners only",
            render: render_dominant_share,
        },
        ChartSpec {
            stem: "win_share_by_decade",
            title: "Win share by decade and team",
            datasets: "race_details.csv",
            filters: "winners only",
            render: render_win_share,
        },
        ChartSpec {
            stem: "title_streaks_drivers",
            title: "Longest consecutive title runs (drivers)",
            datasets: "driver_standings.csv",
            filters: "champions only",
            render: render_streaks_drivers,
        },
        ChartSpec {
            stem: "title_streaks_teams",
            title: "Longest consecutive title runs (constructors)",
            datasets: "constructor_standings.csv",
            filters: "champions only",
            render: render_streaks_teams,
        },
        ChartSpec {
            stem: "grid_finish_correlation",
            title: "Grid vs finish rank correlation per season",
            datasets: "race_details.csv, starting_grids.csv",
            filters: "classified finishers",
            render: render_correlation,
        },
        ChartSpec {
            stem: "podium_probability_by_grid",
            title: "Podium probability by starting slot",
            datasets: "race_details.csv, starting_grids.csv",
            filters: "classified finishers",
            render: render_podium_probability,
        },
        ChartSpec {
            stem: "position_delta_by_decade",
            title: "Positions gained or lost by decade",
            datasets: "race_details.csv, starting_grids.csv",
            filters: "classified finishers",
            render: render_position_deltas,
        },
        ChartSpec {
            stem: "pit_time_vs_finish",
            title: "Total pit time vs finishing position",
            datasets: "pitstops.csv, race_details.csv",
            filters: "classified finishers",
            render: render_pit_scatter,
        },
        ChartSpec {
            stem: "pit_time_effect_by_decade",
            title: "Pit time effect on finishing position by decade",
            datasets: "pitstops.csv, race_details.csv",
            filters: "classified finishers",
            render: render_pit_effect,
        },
        ChartSpec {
            stem: "severe_pit_stops",
            title: "Severe pit stops above the seasonal 95th percentile",
            datasets: "pitstops.csv",
            filters: "duration > seasonal p95",
            render: render_severe_stops,
        },
        ChartSpec {
            stem: "sprint_points_share",
            title: "Sprint share of championship points",
            datasets: "sprint_results.csv, driver_standings.csv",
            filters: "sprint seasons",
            render: render_sprint_share,
        },
        ChartSpec {
            stem: "sprint_induced_delta",
            title: "Sunday grid delta induced by sprints",
            datasets: "sprint_results.csv, sprint_grid.csv, starting_grids.csv",
            filters: "sprint weekends",
            render: render_sprint_deltas,
        },
        ChartSpec {
            stem: "sprint_vs_nonsprint_variance",
            title: "Finish variance: sprint vs conventional weekends",
            datasets: "race_details.csv, sprint_results.csv",
            filters: "top-10 finishers",
            render: render_variance_split,
        },
        ChartSpec {
            stem: "sprint_championship_impact",
            title: "Sprint points and championship margins",
            datasets: "sprint_results.csv, driver_standings.csv",
            filters: "champion vs runner-up",
            render: render_championship_impact,
        },
    ]
}

/// Render every figure; a failure (error or backend panic) skips that
/// figure with a warning and leaves it out of the manifest.
fn render_figures(set: &MetricSet, out_dir: &Path) -> Vec<ManifestEntry> {
    chart_specs()
        .par_iter()
        .map(|spec| {
            let filename = format!("{}.png", spec.stem);
            let path = out_dir.join(&filename);
            match render_chart_guard(spec, set, &path) {
                Ok(()) => Some(ManifestEntry {
                    filename,
                    title: spec.title,
                    datasets: spec.datasets,
                    filters: spec.filters,
                }),
                Err(err) => {
                    warn!("skipping figure {}: {}", spec.stem, err);
                    None
                }
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

fn render_chart_guard(spec: &ChartSpec, set: &MetricSet, path: &Path) -> Result<(), String> {
    let render = || (spec.render)(set, path).map_err(|err| format!("plotting error: {err}"));
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn write_manifest(entries: &[ManifestEntry], out_dir: &Path) -> Result<()> {
    let path = out_dir.join("manifest.csv");
    let file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["filename", "title", "datasets", "filters", "generated_at"])?;

    // One timestamp for the whole run.
    let generated_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    for entry in entries {
        writer.write_record([
            entry.filename.as_str(),
            entry.title,
            entry.datasets,
            entry.filters,
            generated_at.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Copy the rendered figures and the manifest into the static-site tree.
fn copy_to_site(out_dir: &Path, site_figures: &Path) -> Result<()> {
    fs::create_dir_all(site_figures)
        .with_context(|| format!("failed to create {}", site_figures.display()))?;
    let mut copied = 0usize;
    for entry in fs::read_dir(out_dir)
        .with_context(|| format!("failed to list {}", out_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let is_png = path.extension().and_then(|ext| ext.to_str()) == Some("png");
        let is_manifest =
            path.file_name().and_then(|name| name.to_str()) == Some("manifest.csv");
        if !is_png && !is_manifest {
            continue;
        }
        if let Some(name) = path.file_name() {
            fs::copy(&path, site_figures.join(name))
                .with_context(|| format!("failed to copy {}", path.display()))?;
            copied += 1;
        }
    }
    debug!(copied, "site copy complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Chart renderers
// ---------------------------------------------------------------------------

fn year_range(years: &[i32]) -> (i32, i32) {
    match (years.iter().min(), years.iter().max()) {
        (Some(&lo), Some(&hi)) => (lo - 1, hi + 1),
        _ => (0, 1),
    }
}

fn value_span<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for value in values {
        lo = lo.min(value);
        hi = hi.max(value);
    }
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < 1e-9 {
        (lo - 1.0, hi + 1.0)
    } else {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    }
}

/// Equal-width bins over the value range; degenerate ranges collapse to a
/// single bin.
fn histogram_bins(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (hi - lo).abs() < 1e-9 {
        return vec![(lo - 0.5, lo + 0.5, values.len())];
    }
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &value in values {
        let idx = (((value - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| (lo + i as f64 * width, lo + (i + 1) as f64 * width, count))
        .collect()
}

fn render_dominant_share(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.dominant_team_share;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (x0, x1) = year_range(&m.years);
    let mut chart = ChartBuilder::on(&root)
        .caption("Dominant team win share per season", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x0..x1, 0.0..105.0)?;
    chart
        .configure_mesh()
        .x_desc("Season")
        .y_desc("Share of wins (%)")
        .draw()?;
    chart.draw_series(LineSeries::new(
        m.years.iter().copied().zip(m.pct.iter().copied()),
        &PALETTE[0],
    ))?;
    chart.draw_series(
        m.years
            .iter()
            .zip(&m.pct)
            .map(|(&year, &pct)| Circle::new((year, pct), 3, PALETTE[0].filled())),
    )?;
    root.present()?;
    Ok(())
}

fn render_win_share(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.win_share_by_decade;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let nx = m.teams.len().max(1) as i32;
    let ny = m.decades.len().max(1) as i32;
    let mut chart = ChartBuilder::on(&root)
        .caption("Win share by decade and team", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 80)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d(0..nx, 0..ny)?;

    let teams = m.teams.clone();
    let decades = m.decades.clone();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(m.teams.len().min(30))
        .y_labels(m.decades.len())
        .x_label_formatter(&move |idx: &i32| {
            teams.get(*idx as usize).cloned().unwrap_or_default()
        })
        .y_label_formatter(&move |idx: &i32| {
            decades
                .get(*idx as usize)
                .map(|d| format!("{d}s"))
                .unwrap_or_default()
        })
        .label_style(LABEL_FONT)
        .draw()?;

    let mut cells = Vec::new();
    for (iy, row) in m.share.iter().enumerate() {
        for (ix, &share) in row.iter().enumerate() {
            cells.push(Rectangle::new(
                [(ix as i32, iy as i32), (ix as i32 + 1, iy as i32 + 1)],
                PALETTE[0].mix(share).filled(),
            ));
        }
    }
    chart.draw_series(cells)?;
    root.present()?;
    Ok(())
}

fn render_streaks_drivers(set: &MetricSet, path: &Path) -> Result<()> {
    draw_streak_bars(
        &set.title_streaks_drivers,
        "Longest consecutive title runs (drivers)",
        path,
    )
}

fn render_streaks_teams(set: &MetricSet, path: &Path) -> Result<()> {
    draw_streak_bars(
        &set.title_streaks_teams,
        "Longest consecutive title runs (constructors)",
        path,
    )
}

fn draw_streak_bars(m: &metrics::TitleStreaks, title: &str, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let n = m.labels.len().max(1);
    let x_max = f64::from(m.values.iter().copied().max().unwrap_or(1).max(1)) + 1.0;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 40)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(0.0..x_max, 0.0..n as f64)?;
    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(0)
        .x_desc("Consecutive titles")
        .draw()?;

    chart.draw_series(m.values.iter().enumerate().map(|(i, &streak)| {
        Rectangle::new(
            [
                (0.0, i as f64 + 0.15),
                (f64::from(streak), i as f64 + 0.85),
            ],
            PALETTE[2].filled(),
        )
    }))?;
    chart.draw_series(m.labels.iter().enumerate().map(|(i, label)| {
        Text::new(label.clone(), (0.1, i as f64 + 0.45), LABEL_FONT)
    }))?;
    root.present()?;
    Ok(())
}

fn render_correlation(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.grid_finish_correlation;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (x0, x1) = year_range(&m.years);
    let mut chart = ChartBuilder::on(&root)
        .caption("Grid vs finish rank correlation per season", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x0..x1, -1.1..1.1)?;
    chart
        .configure_mesh()
        .x_desc("Season")
        .y_desc("Spearman rho")
        .draw()?;
    chart.draw_series(LineSeries::new(
        m.years.iter().copied().zip(m.rho.iter().copied()),
        &PALETTE[1],
    ))?;
    chart.draw_series(
        m.years
            .iter()
            .zip(&m.rho)
            .map(|(&year, &rho)| Circle::new((year, rho), 3, PALETTE[1].filled())),
    )?;
    root.present()?;
    Ok(())
}

fn render_podium_probability(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.podium_probability_by_grid;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let x_max = m
        .traces
        .iter()
        .flat_map(|t| t.grid.iter().copied())
        .fold(1.0_f64, f64::max)
        + 1.0;
    let mut chart = ChartBuilder::on(&root)
        .caption("Podium probability by starting slot", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(0.0..x_max, 0.0..1.05)?;
    chart
        .configure_mesh()
        .x_desc("Starting slot")
        .y_desc("Podium probability")
        .draw()?;

    for (idx, trace) in m.traces.iter().enumerate() {
        let color = PALETTE[idx % PALETTE.len()];
        chart
            .draw_series(LineSeries::new(
                trace.grid.iter().copied().zip(trace.probability.iter().copied()),
                &color,
            ))?
            .label(format!("{}s", trace.decade))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    if !m.traces.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.7))
            .border_style(BLACK.mix(0.3))
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;
    }
    root.present()?;
    Ok(())
}

fn render_position_deltas(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.position_delta_by_decade;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let decades: Vec<i32> = m.traces.iter().map(|t| t.decade).collect();
    let (x0, x1) = year_range(&decades);
    let (y0, y1) = value_span(m.traces.iter().flat_map(|t| t.values.iter().copied()));
    let mut chart = ChartBuilder::on(&root)
        .caption("Positions gained or lost by decade", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(f64::from(x0) - 4.0..f64::from(x1) + 9.0, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc("Decade")
        .y_desc("Finish - grid")
        .draw()?;

    for trace in &m.traces {
        chart.draw_series(trace.values.iter().enumerate().map(|(i, &delta)| {
            // deterministic horizontal spread inside the decade column
            let offset = (i % 9) as f64 - 4.0;
            Circle::new(
                (f64::from(trace.decade) + offset * 0.6, delta),
                2,
                PALETTE[3].mix(0.4).filled(),
            )
        }))?;
    }
    root.present()?;
    Ok(())
}

fn render_pit_scatter(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.pit_time_vs_finish;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (x0, x1) = value_span(m.x.iter().copied());
    let (y0, y1) = value_span(m.y.iter().copied());
    let mut chart = ChartBuilder::on(&root)
        .caption("Total pit time vs finishing position", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc("Total pit time (s)")
        .y_desc("Finishing position")
        .draw()?;

    chart.draw_series(
        m.x.iter()
            .zip(&m.y)
            .map(|(&x, &y)| Circle::new((x, y), 2, PALETTE[0].mix(0.5).filled())),
    )?;
    if let Some(trend) = &m.trend {
        chart
            .draw_series(LineSeries::new(
                [
                    (x0, trend.slope * x0 + trend.intercept),
                    (x1, trend.slope * x1 + trend.intercept),
                ],
                &PALETTE[3],
            ))?
            .label("OLS trend")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], PALETTE[3]));
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.7))
            .border_style(BLACK.mix(0.3))
            .draw()?;
    }
    root.present()?;
    Ok(())
}

fn render_pit_effect(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.pit_time_effect_by_decade;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (x0, x1) = year_range(&m.decades);
    let mut bounds: Vec<f64> = m.coefs.clone();
    if let (Some(low), Some(high)) = (&m.ci_low, &m.ci_high) {
        bounds.extend(low.iter().copied());
        bounds.extend(high.iter().copied());
    }
    let (y0, y1) = value_span(bounds.iter().copied());
    let mut chart = ChartBuilder::on(&root)
        .caption("Pit time effect on finishing position by decade", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(f64::from(x0) - 4.0..f64::from(x1) + 9.0, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc("Decade")
        .y_desc("Slope (position per second)")
        .draw()?;

    if let (Some(low), Some(high)) = (&m.ci_low, &m.ci_high) {
        chart.draw_series(m.decades.iter().zip(low.iter().zip(high)).map(
            |(&decade, (&lo, &hi))| {
                PathElement::new(
                    vec![(f64::from(decade), lo), (f64::from(decade), hi)],
                    PALETTE[4],
                )
            },
        ))?;
    }
    chart.draw_series(
        m.decades
            .iter()
            .zip(&m.coefs)
            .map(|(&decade, &coef)| Circle::new((f64::from(decade), coef), 4, PALETTE[4].filled())),
    )?;
    root.present()?;
    Ok(())
}

fn render_severe_stops(set: &MetricSet, path: &Path) -> Result<()> {
    draw_histogram(
        &set.severe_pit_stops.values,
        "Severe pit stops above the seasonal 95th percentile",
        "Stop duration (s)",
        PALETTE[3],
        path,
    )
}

fn render_sprint_deltas(set: &MetricSet, path: &Path) -> Result<()> {
    draw_histogram(
        &set.sprint_induced_delta.values,
        "Sunday grid delta induced by sprints",
        "Sunday grid - sprint finish",
        PALETTE[4],
        path,
    )
}

fn draw_histogram(
    values: &[f64],
    title: &str,
    x_desc: &str,
    color: RGBColor,
    path: &Path,
) -> Result<()> {
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let bins = histogram_bins(values, 12);
    let x_span = match (bins.first(), bins.last()) {
        (Some(&(lo, _, _)), Some(&(_, hi, _))) => (lo, hi),
        _ => (0.0, 1.0),
    };
    let y_max = bins.iter().map(|&(_, _, count)| count).max().unwrap_or(1) as f64 * 1.1;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_span.0..x_span.1, 0.0..y_max)?;
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Count")
        .draw()?;

    chart.draw_series(bins.iter().map(|&(lo, hi, count)| {
        Rectangle::new([(lo, 0.0), (hi, count as f64)], color.mix(0.7).filled())
    }))?;
    root.present()?;
    Ok(())
}

fn render_sprint_share(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.sprint_points_share;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (x0, x1) = year_range(&m.years);
    let y_max = m.pct.iter().copied().fold(1.0_f64, f64::max) * 1.2;
    let mut chart = ChartBuilder::on(&root)
        .caption("Sprint share of championship points", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(f64::from(x0)..f64::from(x1), 0.0..y_max)?;
    chart
        .configure_mesh()
        .x_desc("Season")
        .y_desc("Share of points (%)")
        .x_label_formatter(&|v| format!("{v:.0}"))
        .draw()?;

    chart.draw_series(m.years.iter().zip(&m.pct).map(|(&year, &pct)| {
        Rectangle::new(
            [(f64::from(year) - 0.35, 0.0), (f64::from(year) + 0.35, pct)],
            PALETTE[1].filled(),
        )
    }))?;
    root.present()?;
    Ok(())
}

fn render_variance_split(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.sprint_vs_nonsprint_variance;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (y0, y1) = value_span(m.sprint.iter().chain(&m.non_sprint).copied());
    let mut chart = ChartBuilder::on(&root)
        .caption("Finish variance: sprint vs conventional weekends", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(0.0..2.0, y0.min(0.0)..y1)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(2)
        .x_label_formatter(&|v| {
            if *v < 1.0 {
                "Sprint".to_string()
            } else {
                "Conventional".to_string()
            }
        })
        .y_desc("Finish variance (top 10)")
        .draw()?;

    for (column, values, color) in [
        (0.5, &m.sprint, PALETTE[1]),
        (1.5, &m.non_sprint, PALETTE[0]),
    ] {
        chart.draw_series(values.iter().enumerate().map(|(i, &variance)| {
            // deterministic horizontal spread inside the column
            let offset = ((i % 9) as f64 - 4.0) * 0.04;
            Circle::new((column + offset, variance), 3, color.mix(0.5).filled())
        }))?;
    }
    root.present()?;
    Ok(())
}

fn render_championship_impact(set: &MetricSet, path: &Path) -> Result<()> {
    let m = &set.sprint_championship_impact;
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (x0, x1) = value_span(m.margins.iter().copied());
    let (y0, y1) = value_span(m.impacts.iter().copied());
    let mut chart = ChartBuilder::on(&root)
        .caption("Sprint points and championship margins", TITLE_FONT)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc("Championship margin (pts)")
        .y_desc("Sprint differential, champion - runner-up (pts)")
        .draw()?;

    chart.draw_series(
        m.margins
            .iter()
            .zip(&m.impacts)
            .map(|(&margin, &impact)| Circle::new((margin, impact), 5, PALETTE[2].filled())),
    )?;
    chart.draw_series(m.years.iter().enumerate().map(|(i, year)| {
        Text::new(
            year.to_string(),
            (m.margins[i], m.impacts[i]),
            LABEL_FONT,
        )
    }))?;
    root.present()?;
    Ok(())
}
