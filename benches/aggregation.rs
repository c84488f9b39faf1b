//! Aggregation benchmarks
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Run with: cargo bench --bench aggregation

use arrow::array::{Float64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use trueno_compare::aggregate::{best_so_far, AggregatedCurve, Aggregator};
use trueno_compare::config::{Mode, PlotConfiguration};
use trueno_compare::diagnostics::NoopSink;
use trueno_compare::index::RunReference;
use trueno_compare::loader::{CombinedTable, TaggedRun};
use trueno_compare::store::TUNER_TIME_COLUMN;
use trueno_compare::table::ResultsTable;

const SMALL_SIZE: usize = 1_000;
const MEDIUM_SIZE: usize = 100_000;

fn metric(n: usize, seed: usize) -> Vec<f64> {
    (0..n)
        .map(|i| ((i * 7919 + seed * 104_729) % 1000) as f64 / 1000.0)
        .collect()
}

fn combined_table(setups: &[&str], runs_per_setup: usize, rows: usize) -> CombinedTable {
    let schema = Arc::new(Schema::new(vec![
        Field::new(TUNER_TIME_COLUMN, DataType::Float64, false),
        Field::new("loss", DataType::Float64, false),
    ]));
    let time: Vec<f64> = (0..rows).map(|i| i as f64).collect();

    let mut runs = Vec::new();
    for (s, setup) in setups.iter().enumerate() {
        for r in 0..runs_per_setup {
            let batch = RecordBatch::try_new(
                Arc::clone(&schema),
                vec![
                    Arc::new(Float64Array::from(time.clone())),
                    Arc::new(Float64Array::from(metric(rows, s * runs_per_setup + r))),
                ],
            )
            .unwrap();
            let reference = RunReference::new(format!("exp-{s}-{r}"), *setup, 0);
            runs.push(TaggedRun::new(ResultsTable::new(&batch).unwrap(), &reference));
        }
    }
    CombinedTable::from_runs(runs).unwrap()
}

/// Mean over runs at each sample index (runs share the grid here)
fn mean_estimator(
    trajectories: &[Vec<f64>],
    times: &[Vec<f64>],
    _mode: &str,
) -> anyhow::Result<AggregatedCurve> {
    let len = trajectories.iter().map(Vec::len).min().unwrap_or(0);
    let n = trajectories.len() as f64;
    let center: Vec<f64> = (0..len)
        .map(|i| trajectories.iter().map(|ys| ys[i]).sum::<f64>() / n)
        .collect();
    Ok(AggregatedCurve {
        time: times[0][..len].to_vec(),
        lower: center.clone(),
        upper: center.clone(),
        center,
    })
}

/// Benchmark best-so-far transform
fn bench_best_so_far(c: &mut Criterion) {
    let mut group = c.benchmark_group("best_so_far");

    for size in [SMALL_SIZE, MEDIUM_SIZE] {
        let values = metric(size, 1);
        for mode in [Mode::Min, Mode::Max] {
            group.bench_with_input(BenchmarkId::new(mode.to_string(), size), &values, |b, data| {
                b.iter(|| best_so_far(black_box(data), mode, 1.0));
            });
        }
    }

    group.finish();
}

/// Benchmark grouping and aggregation of a combined table
fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    let config = PlotConfiguration {
        metric: Some("loss".into()),
        mode: Some(Mode::Min),
        ..PlotConfiguration::default()
    }
    .resolve(&PlotConfiguration::default())
    .unwrap();
    let setups = ["RS", "BO", "ASHA", "MOBSTER"];

    for rows in [100, SMALL_SIZE] {
        let table = combined_table(&setups, 10, rows);
        let aggregator = Aggregator::new(
            setups.iter().map(ToString::to_string).collect(),
            10,
            mean_estimator,
        );
        group.bench_with_input(
            BenchmarkId::new("4_setups_10_runs", rows),
            &table,
            |b, table| {
                b.iter(|| aggregator.aggregate(black_box(table), &config, &NoopSink).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_best_so_far, bench_aggregate);
criterion_main!(benches);
