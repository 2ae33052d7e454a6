use std::time::Duration;

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use telforge::config::Dataset;
use telforge::entity::ConfigStore;
use telforge::gen;
use telforge::ledger::CounterLedger;
use telforge::pipeline::TransformStage;
use telforge::render::{metric_names_hash, Renderer};

fn bench_generate_hosts(c: &mut Criterion) {
    let mut store = ConfigStore::new();
    let config = store.get_or_create("host-00042");
    let mut ledger = CounterLedger::new();
    let ts = Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).single().expect("valid ts");

    c.bench_function("generate_hosts_tick", |b| {
        b.iter(|| {
            black_box(gen::generate(
                Dataset::Hosts,
                black_box(&config),
                &mut ledger,
                ts,
                Some(ts - chrono::Duration::seconds(10)),
                10.0,
            ))
        })
    });
}

fn bench_generate_weather(c: &mut Criterion) {
    let mut store = ConfigStore::new();
    let config = store.get_or_create("station-00042");
    let mut ledger = CounterLedger::new();
    let ts = Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).single().expect("valid ts");

    c.bench_function("generate_weather_tick", |b| {
        b.iter(|| {
            black_box(gen::generate(
                Dataset::Weather,
                black_box(&config),
                &mut ledger,
                ts,
                Some(ts - chrono::Duration::seconds(10)),
                10.0,
            ))
        })
    });
}

fn bench_render(c: &mut Criterion) {
    let mut store = ConfigStore::new();
    let config = store.get_or_create("host-00042");
    let mut ledger = CounterLedger::new();
    let ts = Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).single().expect("valid ts");
    let snapshot = gen::generate(Dataset::Hosts, &config, &mut ledger, ts, None, 10.0);

    for renderer in [Renderer::Elastic, Renderer::Otel, Renderer::Fieldsense] {
        c.bench_function(&format!("render_{}", renderer.name()), |b| {
            b.iter(|| black_box(renderer.render(black_box(&snapshot))))
        });
    }
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut store = ConfigStore::new();
    let config = store.get_or_create("host-00042");
    let mut ledger = CounterLedger::new();
    let ts = Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).single().expect("valid ts");
    let snapshot = gen::generate(Dataset::Hosts, &config, &mut ledger, ts, None, 10.0);
    let body = Renderer::Elastic.render(&snapshot).remove(0).body;

    c.bench_function("metric_names_hash", |b| {
        b.iter(|| black_box(metric_names_hash(black_box(&body))))
    });
}

fn bench_full_tick(c: &mut Criterion) {
    let ts = Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).single().expect("valid ts");
    let mut stage = TransformStage::new(
        Dataset::Hosts,
        vec![Renderer::Elastic, Renderer::Otel, Renderer::Fieldsense],
        Duration::from_secs(10),
    );

    c.bench_function("transform_tick_all_renderers", |b| {
        b.iter(|| black_box(stage.process(black_box("host-00042"), ts).expect("tick")))
    });
}

criterion_group!(
    benches,
    bench_generate_hosts,
    bench_generate_weather,
    bench_render,
    bench_fingerprint,
    bench_full_tick,
);
criterion_main!(benches);
