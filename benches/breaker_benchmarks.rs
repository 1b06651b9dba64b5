use breaker::{Breaker, BreakerConfig, BreakerRegistry, BreakerSettings};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

fn benchmark_admit_closed(c: &mut Criterion) {
    let breaker = Breaker::new(
        "bench",
        BreakerConfig {
            rolling_window_ms: 1_000,
            ..Default::default()
        },
    );

    c.bench_function("admit_closed", |b| {
        b.iter(|| {
            let permit = black_box(breaker.admit());
            breaker.record_success(Duration::from_micros(50));
            permit
        })
    });
}

fn benchmark_reject_open(c: &mut Criterion) {
    let breaker = Breaker::new("bench", BreakerConfig::default());
    breaker.force_open();

    c.bench_function("reject_open", |b| b.iter(|| black_box(breaker.admit())));
}

fn benchmark_record_outcomes_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_outcomes_window");

    for min_samples in [10u32, 100, 1000].iter() {
        let breaker = Breaker::new(
            "bench",
            BreakerConfig {
                failure_threshold: u32::MAX,
                error_rate_threshold: 1.0,
                min_samples_for_rate: *min_samples,
                rolling_window_ms: 1_000,
                ..Default::default()
            },
        );

        group.bench_with_input(
            BenchmarkId::from_parameter(min_samples),
            min_samples,
            |b, &_samples| {
                b.iter(|| {
                    breaker.record_success(Duration::from_micros(50));
                    breaker.record_failure("bench failure");
                    black_box(breaker.metrics().error_rate)
                })
            },
        );
    }
    group.finish();
}

fn benchmark_call_async(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let breaker = Breaker::new("bench", BreakerConfig::default());

    c.bench_function("call_async", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(
                breaker
                    .call(|| async { Ok::<_, std::io::Error>(42u64) })
                    .await
                    .ok(),
            )
        })
    });
}

fn benchmark_registry_lookup(c: &mut Criterion) {
    let registry = BreakerRegistry::new(BreakerConfig::default()).expect("Default config is valid");
    for i in 0..100 {
        registry.get_or_create(&format!("dependency-{}", i));
    }

    c.bench_function("registry_lookup", |b| {
        b.iter(|| black_box(registry.get_or_create("dependency-50")))
    });
}

fn benchmark_settings_parsing(c: &mut Criterion) {
    let yaml = r#"
defaults:
  failure_threshold: 5
  recovery_timeout_ms: 30000

breakers:
  payments:
    failure_threshold: 2
    error_rate_threshold: 0.25
  search:
    half_open_trial_limit: 5
"#;

    c.bench_function("settings_parsing", |b| {
        b.iter(|| black_box(BreakerSettings::from_yaml(yaml)))
    });
}

criterion_group!(
    benches,
    benchmark_admit_closed,
    benchmark_reject_open,
    benchmark_record_outcomes_window,
    benchmark_call_async,
    benchmark_registry_lookup,
    benchmark_settings_parsing
);
criterion_main!(benches);
