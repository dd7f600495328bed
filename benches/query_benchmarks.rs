// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for criteria compilation, grouping and loading

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use gridsource_engine::{
    AggregateKind, EngineConfig, FilterCompiler, FlatRow, RemoteGroupTransformer, Shape, SummaryInfo, Value,
    ValueType,
};
use gridsource_loader::{DataSourceLoader, InMemoryBackend, LoadOptions, LoaderConfig};

fn sale_shape() -> Arc<Shape> {
    Arc::new(
        Shape::builder("Sale")
            .field("id", ValueType::Int64)
            .field("region", ValueType::String)
            .field("product", ValueType::String)
            .nullable("units", ValueType::Int32)
            .field("amount", ValueType::Float64)
            .build(),
    )
}

fn sales(n: usize) -> Vec<Value> {
    const REGIONS: [&str; 4] = ["north", "south", "east", "west"];
    (0..n)
        .map(|i| {
            let units = if i % 7 == 0 { None } else { Some(i % 13) };
            Value::from(json!({
                "id": i,
                "region": REGIONS[i % REGIONS.len()],
                "product": format!("p{}", i % 25),
                "units": units,
                "amount": (i % 100) as f64 * 1.5,
            }))
        })
        .collect()
}

fn criteria() -> serde_json::Value {
    json!([
        [["region", "=", "north"], "or", ["region", "=", "east"]],
        "and",
        ["amount", ">=", 20],
        "and",
        ["product", "contains", "1"]
    ])
}

// ============================================================================
// Criteria Benchmarks
// ============================================================================

fn bench_filter_compile(c: &mut Criterion) {
    let shape = sale_shape();
    let criteria = criteria();

    c.bench_function("filter/compile", |b| {
        b.iter(|| {
            let mut compiler = FilterCompiler::new(Arc::clone(&shape), EngineConfig::default());
            black_box(compiler.compile_json(black_box(&criteria)).unwrap())
        });
    });
}

fn bench_filter_evaluate(c: &mut Criterion) {
    let predicate = FilterCompiler::new(sale_shape(), EngineConfig::default())
        .compile_json(&criteria())
        .unwrap();
    let records = sales(10_000);

    let mut group = c.benchmark_group("filter");
    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("evaluate_10k", |b| {
        b.iter(|| {
            records
                .iter()
                .filter(|r| predicate.evaluate(r).unwrap_or(false))
                .count()
        });
    });
    group.finish();
}

// ============================================================================
// Remote Grouping Benchmarks
// ============================================================================

fn bench_reconstruct(c: &mut Criterion) {
    let total = vec![SummaryInfo::new(AggregateKind::Sum, "amount"), SummaryInfo::count()];
    let group = vec![SummaryInfo::new(AggregateKind::Avg, "amount")];
    let mut group_bench = c.benchmark_group("remote_grouping");

    for size in [100usize, 1_000, 10_000] {
        let rows: Vec<FlatRow> = (0..size)
            .map(|i| {
                FlatRow::new(vec![
                    Value::Null,
                    Value::from(format!("r{}", i % 10)),
                    Value::from(format!("p{}", i % 97)),
                    Value::Float(i as f64),
                    Value::Float(i as f64 * 2.0),
                    Value::Int(3),
                    Value::Int(4),
                ])
            })
            .collect();

        group_bench.throughput(Throughput::Elements(size as u64));
        group_bench.bench_with_input(BenchmarkId::new("reconstruct", size), &rows, |b, rows| {
            b.iter(|| {
                let mut transformer = RemoteGroupTransformer::new(sale_shape(), EngineConfig::default());
                black_box(transformer.reconstruct(rows.clone(), 2, &total, &group).unwrap())
            });
        });
    }

    group_bench.finish();
}

// ============================================================================
// Loader Benchmarks
// ============================================================================

fn bench_grouped_load(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let backend = Arc::new(InMemoryBackend::new(sale_shape(), sales(5_000)));
    let loader = DataSourceLoader::new(backend, LoaderConfig::default());
    let request = json!({
        "filter": criteria(),
        "requireTotalCount": true,
        "group": [{"selector": "region"}, {"selector": "product", "isExpanded": false}],
        "totalSummary": [{"selector": "units", "summaryType": "sum"}],
        "groupSummary": [{"selector": "amount", "summaryType": "avg"}, {"summaryType": "count"}]
    });

    let mut group = c.benchmark_group("loader");
    for remote in [false, true] {
        let mut options: LoadOptions = serde_json::from_value(request.clone()).unwrap();
        options.remote_grouping = Some(remote);
        let label = if remote { "remote" } else { "local" };
        group.bench_function(BenchmarkId::new("grouped_5k", label), |b| {
            b.to_async(&rt).iter(|| async {
                black_box(loader.load(&options, &CancellationToken::new()).await.unwrap())
            });
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(
    filter_benches,
    bench_filter_compile,
    bench_filter_evaluate
);

criterion_group!(
    grouping_benches,
    bench_reconstruct
);

criterion_group!(
    loader_benches,
    bench_grouped_load
);

criterion_main!(
    filter_benches,
    grouping_benches,
    loader_benches
);
