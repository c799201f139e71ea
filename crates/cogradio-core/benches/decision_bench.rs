//! Benchmarks for the PU query and channel decision hot paths
//!
//! Run with: cargo bench -p cogradio-core --bench decision_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cogradio_core::prelude::*;
use cogradio_core::pu_model::SyntheticSourceSpec;
use cogradio_core::SyntheticPuModel;
use std::rc::Rc;

fn synthetic_model(sources: usize, channels: usize) -> SyntheticPuModel {
    let specs: Vec<SyntheticSourceSpec> = (0..sources)
        .map(|i| SyntheticSourceSpec {
            id: i as u32,
            x: (i as f64) * 25.0,
            y: 0.0,
            radius: 200.0,
            interference_dbm: -60.0,
            channel: (i % channels) as ChannelId,
            alpha: 0.2,
            beta: 0.8,
        })
        .collect();
    SyntheticPuModel::generate(channels, &specs, SimTime::from_millis(60_000), 7)
        .expect("valid synthetic model")
}

fn bench_is_pu_active(c: &mut Criterion) {
    let mut group = c.benchmark_group("is_pu_active");

    for sources in [1usize, 16, 128].iter() {
        let model = synthetic_model(*sources, 11);
        group.bench_with_input(BenchmarkId::new("sources", sources), sources, |b, _| {
            let mut t = 0u64;
            b.iter(|| {
                t = (t + 7) % 60_000;
                model.is_pu_active(
                    black_box(SimTime::from_millis(t)),
                    SimTime::from_millis(15),
                    100.0,
                    0.0,
                    3,
                )
            })
        });
    }

    group.finish();
}

fn bench_check_active(c: &mut Criterion) {
    let model = synthetic_model(128, 11);
    c.bench_function("check_active_128", |b| {
        b.iter(|| model.check_active(black_box(SimTime::from_millis(30_000)), SimTime::from_millis(15)))
    });
}

fn bench_decide_spectrum(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide_spectrum");

    for channels in [11usize, 64, 256].iter() {
        let entries = (0..*channels)
            .map(|i| SpectrumEntry::new(20.0e6, (i % 5) as f64 * 0.01))
            .collect();
        let spectrum = Rc::new(SpectrumData::new(entries).expect("valid spectrum"));
        let mut repo = Repository::new(*channels);
        for node in 1..(*channels as u32 / 2) {
            repo.set_rx_channel(node, (node * 2) as ChannelId)
                .expect("channel in range");
        }

        for tie_break in [TieBreak::LowestIndex, TieBreak::Seeded { seed: 3 }] {
            let mut decision = SpectrumDecision::new(spectrum.clone(), tie_break);
            let label = match tie_break {
                TieBreak::Seeded { .. } => "seeded",
                _ => "lowest",
            };
            group.bench_with_input(BenchmarkId::new(label, channels), channels, |b, _| {
                b.iter(|| decision.decide_spectrum(black_box(0), &repo, 0))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_is_pu_active, bench_check_active, bench_decide_spectrum);
criterion_main!(benches);
