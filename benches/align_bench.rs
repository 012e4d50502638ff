use std::collections::{BTreeMap, BTreeSet};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use odds_align::config::TargetIds;
use odds_align::core::{compute_derived, AlignmentEngine, EngineConfig, SourceRecord};

fn engine() -> AlignmentEngine {
    AlignmentEngine::new(EngineConfig {
        tolerance_pct: 1.5,
        pulse_step_pct: 10.0,
        max_pulses: 3,
    })
}

fn make_records(sources: usize) -> BTreeMap<String, SourceRecord> {
    let mut records = BTreeMap::new();
    for i in 0..sources {
        let offset = i as f64 * 0.01;
        let id = format!("book-{}", i);
        let record = SourceRecord::new(id.clone(), [Some(1.80 + offset), Some(2.05 - offset)], false, 0)
            .expect("valid record");
        records.insert(id, record);
    }
    let target = SourceRecord::new("excel", [Some(1.90), Some(1.95)], false, 0).expect("valid record");
    records.insert("excel".to_string(), target);
    records
}

fn bench_compute_action_pulse(c: &mut Criterion) {
    c.bench_function("compute_action_pulse", |b| {
        let engine = engine();
        b.iter(|| {
            black_box(engine.compute_action(black_box(Some([1.80, 2.00])), black_box(Some([1.36, 1.95]))));
        });
    });
}

fn bench_compute_action_aligned(c: &mut Criterion) {
    c.bench_function("compute_action_aligned", |b| {
        let engine = engine();
        b.iter(|| {
            black_box(engine.compute_action(black_box(Some([1.80, 2.00])), black_box(Some([1.81, 2.00]))));
        });
    });
}

fn bench_compute_derived_5_sources(c: &mut Criterion) {
    c.bench_function("compute_derived_5_sources", |b| {
        let records = make_records(5);
        let targets = TargetIds::default();
        let swapped: BTreeSet<String> = ["book-1".to_string()].into_iter().collect();
        b.iter(|| {
            black_box(compute_derived(black_box(&records), black_box(&targets), black_box(&swapped)));
        });
    });
}

fn bench_compute_derived_50_sources(c: &mut Criterion) {
    c.bench_function("compute_derived_50_sources", |b| {
        let records = make_records(50);
        let targets = TargetIds::default();
        let swapped: BTreeSet<String> = ["book-1".to_string()].into_iter().collect();
        b.iter(|| {
            black_box(compute_derived(black_box(&records), black_box(&targets), black_box(&swapped)));
        });
    });
}

criterion_group!(
    benches,
    bench_compute_action_pulse,
    bench_compute_action_aligned,
    bench_compute_derived_5_sources,
    bench_compute_derived_50_sources
);
criterion_main!(benches);
