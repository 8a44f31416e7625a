//! Benchmarks for the viewport cache subsystem.

use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use viewport_cache::cache::hasher::content_hash;
use viewport_cache::cache::working_set::WorkingSet;
use viewport_cache::{Feature, Geometry, Properties, PropertyValue};

fn make_features(count: usize) -> Vec<Feature> {
    (0..count)
        .map(|i| Feature {
            geometry: Geometry::Point([i as f64 * 0.001, 0.0]),
            properties: Properties::new(),
            content_hash: format!("{i:08}"),
        })
        .collect()
}

fn bench_content_hash(c: &mut Criterion) {
    // A 200-vertex boundary polygon, typical for building footprints.
    let ring: Vec<[f64; 2]> = (0..200)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::TAU / 200.0;
            [13.4 + angle.cos() * 0.01, 52.5 + angle.sin() * 0.01]
        })
        .collect();
    let geometry = Geometry::Polygon(vec![ring]);

    let mut properties = Properties::new();
    properties.insert("kind".into(), PropertyValue::Text("building".into()));
    properties.insert("levels".into(), PropertyValue::Number(5.0));

    c.bench_function("content_hash_200_vertex_polygon", |b| {
        b.iter(|| {
            let hash = content_hash(black_box(&geometry), black_box(&properties));
            black_box(hash)
        })
    });
}

fn bench_add_all_with_duplicates(c: &mut Criterion) {
    // Half the batch is already present, simulating an overlapping re-fetch.
    let resident = make_features(5_000);
    let batch = make_features(10_000);

    c.bench_function("add_all_10k_half_duplicates", |b| {
        b.iter(|| {
            let mut set = WorkingSet::new();
            let now = Instant::now();
            set.add_all(resident.clone(), now);
            let added = set.add_all(black_box(batch.clone()), now);
            black_box(added);
        })
    });
}

fn bench_enforce_cap(c: &mut Criterion) {
    let features = make_features(10_000);

    c.bench_function("enforce_cap_evict_5k_from_10k", |b| {
        b.iter(|| {
            let mut set = WorkingSet::new();
            set.add_all(features.clone(), Instant::now());
            let removed = set.enforce_cap(5_000);
            black_box(removed);
        })
    });
}

criterion_group!(
    benches,
    bench_content_hash,
    bench_add_all_with_duplicates,
    bench_enforce_cap,
);
criterion_main!(benches);
