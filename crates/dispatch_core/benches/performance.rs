//! Performance benchmarks for dispatch_core using Criterion.rs.

use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispatch_core::autoscale::decide;
use dispatch_core::config::FleetScaleConfig;
use dispatch_core::fleet::{Bus, BusId, Passenger, PassengerId};
use dispatch_core::geo::{quantized_key, Coordinate};
use dispatch_core::matching::plan_matches;
use dispatch_core::metrics::SimulationMetrics;
use dispatch_core::stops::{default_stops, DayPeriod, WeightedStops};
use dispatch_core::store::FleetStore;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn scattered(i: u64) -> Coordinate {
    let spread = (i % 97) as f64 * 0.000_7;
    Coordinate::new(-28.30 + spread, -52.45 + (i % 89) as f64 * 0.000_8)
}

fn fleet(buses: u64, passengers: u64) -> (Vec<Bus>, Vec<Passenger>) {
    let buses = (1..=buses)
        .map(|i| Bus::new(BusId(i), format!("Bus {i}"), scattered(i * 7), 0))
        .collect();
    let passengers = (1..=passengers)
        .map(|i| Passenger::new(PassengerId(i), scattered(i * 13), scattered(i * 3), 0, true))
        .collect();
    (buses, passengers)
}

fn bench_matching_pass(c: &mut Criterion) {
    let scenarios = vec![("small", 5, 10), ("medium", 20, 50), ("large", 100, 400)];

    let mut group = c.benchmark_group("plan_matches");
    for (name, buses, passengers) in scenarios {
        let (buses, passengers) = fleet(buses, passengers);
        let state = FleetStore::new(buses, passengers).snapshot();
        let leased = HashSet::new();
        group.bench_with_input(BenchmarkId::from_parameter(name), &state, |b, state| {
            b.iter(|| black_box(plan_matches(state, &leased)));
        });
    }
    group.finish();
}

fn bench_fleet_evaluation(c: &mut Criterion) {
    let (buses, passengers) = fleet(20, 120);
    let metrics = SimulationMetrics::compute(&buses, &passengers, 600_000);
    let config = FleetScaleConfig::default();

    c.bench_function("decide_20_buses_120_passengers", |b| {
        b.iter(|| black_box(decide(&buses, &passengers, &metrics, &config)));
    });
    c.bench_function("metrics_20_buses_120_passengers", |b| {
        b.iter(|| black_box(SimulationMetrics::compute(&buses, &passengers, 600_000)));
    });
}

fn bench_stop_sampling(c: &mut Criterion) {
    let stops = WeightedStops::new(default_stops());
    let mut rng = StdRng::seed_from_u64(42);

    let mut group = c.benchmark_group("stop_sampling");
    for (name, hour) in [("morning_peak", 8), ("night", 2)] {
        let period = DayPeriod::from_hour(hour);
        group.bench_function(name, |b| {
            b.iter(|| black_box(stops.sample(&mut rng, period, true, None).map(|s| s.location)));
        });
    }
    group.finish();
}

fn bench_cache_keys(c: &mut Criterion) {
    let points: Vec<Coordinate> = (0..15).map(scattered).collect();

    c.bench_function("quantized_key_15_points", |b| {
        b.iter(|| black_box(quantized_key(&points, 4)));
    });
}

criterion_group!(
    benches,
    bench_matching_pass,
    bench_fleet_evaluation,
    bench_stop_sampling,
    bench_cache_keys
);
criterion_main!(benches);
