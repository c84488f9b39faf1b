//! Compare Setups Example
//!
//! Writes a small synthetic result store (two benchmarks, three setups,
//! four seeds each), then indexes, aggregates and "renders" it as text.
//!
//! Run with: cargo run --example compare_setups -- [-v]

use anyhow::Context;
use serde_json::json;
use std::fs;
use std::path::Path;
use trueno_compare::aggregate::{AggregatedCurve, CellGrid};
use trueno_compare::classify::setup_from_key;
use trueno_compare::comparative::ComparativeResults;
use trueno_compare::config::{Mode, PlotConfiguration, ResolvedConfiguration};
use trueno_compare::diagnostics::TracingSink;
use trueno_compare::logging::init_tracing;
use trueno_compare::store::{ResultStore, METADATA_FILENAME, RESULTS_CSV_FILENAME};

const SETUPS: [&str; 3] = ["RS", "BO", "ASHA"];
const SEEDS: u32 = 4;
const GRID_POINTS: usize = 5;

/// Last value observed at or before `t` (step interpolation)
fn value_at(times: &[f64], values: &[f64], t: f64) -> Option<f64> {
    let n = times.partition_point(|&x| x <= t);
    n.checked_sub(1).map(|i| values[i])
}

/// Mean and min/max band over runs, on a shared time grid
fn mean_and_range(
    trajectories: &[Vec<f64>],
    times: &[Vec<f64>],
    mode: &str,
) -> anyhow::Result<AggregatedCurve> {
    anyhow::ensure!(mode == "mean_and_range", "unsupported aggregate mode {mode:?}");
    let start = times
        .iter()
        .filter_map(|t| t.first().copied())
        .fold(f64::NEG_INFINITY, f64::max);
    let end = times
        .iter()
        .filter_map(|t| t.last().copied())
        .fold(f64::INFINITY, f64::min);
    anyhow::ensure!(start <= end, "runs do not overlap in time");

    let mut curve = AggregatedCurve::default();
    for k in 0..GRID_POINTS {
        let t = start + (end - start) * k as f64 / (GRID_POINTS - 1) as f64;
        let ys: Vec<f64> = trajectories
            .iter()
            .zip(times)
            .filter_map(|(ys, ts)| value_at(ts, ys, t))
            .collect();
        let n = ys.len() as f64;
        curve.time.push(t);
        curve.center.push(ys.iter().sum::<f64>() / n);
        curve.lower.push(ys.iter().copied().fold(f64::INFINITY, f64::min));
        curve.upper.push(ys.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    }
    Ok(curve)
}

fn write_store(root: &Path) -> anyhow::Result<()> {
    let mut n = 0;
    for (b, benchmark) in ["fcnet-protein", "nas201-cifar10"].iter().enumerate() {
        for (s, setup) in SETUPS.iter().enumerate() {
            for seed in 0..SEEDS {
                let dir = root.join(format!("demo-{n:04}"));
                fs::create_dir_all(&dir)?;
                let metadata = json!({"benchmark": benchmark, "algorithm": setup, "seed": seed});
                fs::write(dir.join(METADATA_FILENAME), metadata.to_string())?;

                // Better setups converge faster; seeds shift the noise
                let mut csv = String::from("trial_id,st_tuner_time,val_loss\n");
                for trial in 0..20u32 {
                    let t = f64::from(trial * 30 + seed * 7);
                    let rate = 0.05 * (s + 1) as f64 + 0.01 * b as f64;
                    let noise = f64::from((trial * 31 + seed * 17) % 10) / 50.0;
                    let loss = 1.0 / (1.0 + rate * f64::from(trial)) + noise;
                    csv.push_str(&format!("{trial},{t},{loss:.4}\n"));
                }
                fs::write(dir.join(RESULTS_CSV_FILENAME), csv)?;
                n += 1;
            }
        }
    }
    Ok(())
}

fn print_grid(benchmark: &str, config: &ResolvedConfiguration, grid: &CellGrid) {
    println!("\n=== {benchmark} ({} {}) ===", config.mode, config.metric);
    for (subplot, setup, cell) in grid.populated() {
        println!("[{subplot}] {setup:<6} ({} runs)", cell.num_runs());
        let curve = &cell.curve;
        let rows = curve
            .time
            .iter()
            .zip(&curve.center)
            .zip(curve.lower.iter().zip(&curve.upper));
        for ((t, center), (lower, upper)) in rows {
            println!("    t = {t:7.1}  {center:.4}  [{lower:.4}, {upper:.4}]");
        }
    }
}

fn main() -> anyhow::Result<()> {
    let verbosity = std::env::args().filter(|a| a == "-v").count();
    init_tracing(u8::try_from(verbosity).unwrap_or(u8::MAX));

    let store_dir = tempfile::tempdir().context("creating demo store")?;
    let root = store_dir.path();
    write_store(root).context("writing demo store")?;
    println!("=== Trueno-Compare: Comparing Setups ===");
    println!("Store: {}", root.display());

    let classifier = setup_from_key("algorithm");
    let results = ComparativeResults::builder(
        ResultStore::new(root),
        SETUPS,
        SEEDS as usize,
        &classifier,
    )
    .default_config(PlotConfiguration {
        metric: Some("val_loss".into()),
        mode: Some(Mode::Min),
        aggregate_mode: Some("mean_and_range".into()),
        ..PlotConfiguration::default()
    })
    .extra_metadata_keys(["seed"])
    .build(&["demo"], mean_and_range, &TracingSink)?;

    println!("Benchmarks: {:?}", results.benchmark_names());

    let mut renderer =
        |benchmark: &str, config: &ResolvedConfiguration, grid: &CellGrid| -> anyhow::Result<()> {
            print_grid(benchmark, config, grid);
            Ok(())
        };
    for benchmark in results.benchmark_names() {
        results.plot(Some(&benchmark), None, &TracingSink, &mut renderer)?;
    }

    // Zoom into the first five minutes
    let early = PlotConfiguration {
        xlim: Some((0.0, 300.0)),
        ..PlotConfiguration::default()
    };
    results.plot(Some("fcnet-protein"), Some(&early), &TracingSink, &mut renderer)?;
    Ok(())
}
