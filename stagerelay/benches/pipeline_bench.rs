//! Benchmarks for context building and combined artifact rendering.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use stagerelay::config::StageSettings;
use stagerelay::context::{MarketSnapshot, StageInput, WorkKey};
use stagerelay::core::{CombinedArtifact, CombinedSection, StageName};
use stagerelay::stages::build_context;
use stagerelay::utils::now_utc;

fn context_benchmark(c: &mut Criterion) {
    let key = WorkKey::new("BTCUSD").unwrap();
    let settings = StageSettings::default();
    let fast = StageInput::FastAssessment {
        snapshot: MarketSnapshot::new(65000.0, 1.2, 1_000_000.0).unwrap(),
    };
    let last = StageInput::FinalComparison {
        stage1_output: "first assessment ".repeat(200),
        stage2_output: "detailed analysis ".repeat(600),
    };

    c.bench_function("build_context_fast", |b| {
        b.iter(|| build_context(black_box(&key), black_box(&fast), &settings.fast_assessment).render_prompt())
    });
    c.bench_function("build_context_final", |b| {
        b.iter(|| build_context(black_box(&key), black_box(&last), &settings.final_comparison).render_prompt())
    });
}

fn render_benchmark(c: &mut Criterion) {
    let key = WorkKey::new("BTCUSD").unwrap();
    let sections: Vec<CombinedSection> = StageName::ALL
        .iter()
        .map(|&stage| CombinedSection {
            stage,
            produced_at: Some(now_utc()),
            text: format!("{stage} ").repeat(400),
        })
        .collect();
    let artifact = CombinedArtifact::new(&key, now_utc(), sections);

    c.bench_function("combined_render", |b| b.iter(|| black_box(&artifact).render()));
}

criterion_group!(benches, context_benchmark, render_benchmark);
criterion_main!(benches);
