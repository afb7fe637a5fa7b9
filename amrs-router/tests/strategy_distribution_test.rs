use amrs_router::routing::latency_weights;
use amrs_router::{
    Backend, BackendId, RequestContext, RouteOutcome, Router, RoutingMode, RoutingStrategy,
    StatsRegistry,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::time::Duration;

const SAMPLES: usize = 10_000;

fn create_test_backends(count: usize) -> Vec<Backend> {
    (0..count)
        .map(|i| Backend::new("deepinfra", &format!("model-{}", i)))
        .collect()
}

fn count_picks(
    strategy: &RoutingStrategy,
    registry: &StatsRegistry,
    backends: &[Backend],
    seed: u64,
) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let snapshot = registry.snapshot();
    let context = RequestContext::default();

    let mut counts = vec![0usize; backends.len()];
    for _ in 0..SAMPLES {
        let index = strategy
            .select(&context, &snapshot, backends, &mut rng)
            .unwrap();
        assert!(index < backends.len());
        counts[index] += 1;
    }
    counts
}

#[test]
fn test_random_strategy_is_uniform() {
    let backends = create_test_backends(4);
    let registry = StatsRegistry::new(&backends);
    let strategy = RoutingStrategy::new(RoutingMode::Random);

    let counts = count_picks(&strategy, &registry, &backends, 2024);
    let expected = SAMPLES as f64 / backends.len() as f64;
    let chi_square: f64 = counts
        .iter()
        .map(|&observed| {
            let diff = observed as f64 - expected;
            diff * diff / expected
        })
        .sum();

    // 自由度为3，阈值取得很宽松
    assert!(chi_square < 30.0, "chi-square {} for {:?}", chi_square, counts);
}

#[test]
fn test_latency_weighted_favors_fast_backend() {
    let backends = create_test_backends(2);
    let registry = StatsRegistry::new(&backends);
    for (backend, micros) in backends.iter().zip([100, 400]) {
        registry.record_dispatch(&backend.id).unwrap();
        registry
            .record_outcome(&backend.id, Duration::from_micros(micros), true)
            .unwrap();
    }

    let strategy = RoutingStrategy::new(RoutingMode::LatencyWeighted);
    let counts = count_picks(&strategy, &registry, &backends, 7);

    let ratio = counts[0] as f64 / counts[1] as f64;
    assert!(
        (3.4..=4.7).contains(&ratio),
        "expected roughly 4:1, got {:?}",
        counts
    );
}

#[test]
fn test_latency_weighted_does_not_starve_new_backend() {
    let backends = create_test_backends(3);
    let registry = StatsRegistry::new(&backends);
    for backend in backends.iter().take(2) {
        registry.record_dispatch(&backend.id).unwrap();
        registry
            .record_outcome(&backend.id, Duration::from_millis(200), true)
            .unwrap();
    }

    let weights = latency_weights(&registry.snapshot(), &backends);
    assert_eq!(weights[2], weights[0]);

    let strategy = RoutingStrategy::new(RoutingMode::LatencyWeighted);
    let counts = count_picks(&strategy, &registry, &backends, 11);
    assert!(counts[2] > SAMPLES / 5, "new backend starved: {:?}", counts);
}

#[test]
fn test_round_robin_router_is_even() {
    let router = Router::with_seed(create_test_backends(3), RoutingMode::RoundRobin, 5).unwrap();
    let context = RequestContext::default();

    let mut counts: HashMap<BackendId, usize> = HashMap::new();
    for _ in 0..300 {
        let dispatch = router.dispatch(&context).unwrap();
        *counts.entry(dispatch.id.clone()).or_insert(0) += 1;
        dispatch.succeed().unwrap();
    }

    assert_eq!(counts.len(), 3);
    assert!(counts.values().all(|&c| c == 100));
}

#[test]
fn test_latency_weighted_router_learns_from_reports() {
    let backends = vec![
        Backend::new("openai", "gpt-4o"),
        Backend::new("openai", "gpt-4o-mini"),
    ];
    let fast = backends[1].id.clone();
    let router = Router::with_seed(backends, RoutingMode::LatencyWeighted, 99).unwrap();
    let context = RequestContext::default();

    let mut counts: HashMap<BackendId, usize> = HashMap::new();
    for _ in 0..2000 {
        let backend_id = router.route(&context).unwrap().id.clone();
        let latency = if backend_id == fast {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(500)
        };
        router
            .report(&backend_id, RouteOutcome::success(latency))
            .unwrap();
        *counts.entry(backend_id).or_insert(0) += 1;
    }

    let fast_count = counts.get(&fast).copied().unwrap_or(0);
    assert!(fast_count > 1500, "fast backend only picked {} times", fast_count);
}

#[test]
fn test_stats_snapshot_serializes_to_json() {
    let router = Router::with_seed(create_test_backends(2), RoutingMode::RoundRobin, 1).unwrap();
    let context = RequestContext::default();

    let first = router.route(&context).unwrap().id.clone();
    router
        .report(&first, RouteOutcome::success(Duration::from_micros(250)))
        .unwrap();
    router.route(&context).unwrap();

    let json = serde_json::to_value(router.stats()).unwrap();
    assert!(json["taken_at"].is_string());

    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["backend_id"], "deepinfra/model-0");
    assert_eq!(entries[0]["total_latency_micros"], 250);
    assert_eq!(entries[0]["in_flight"], 0);
    assert_eq!(entries[1]["in_flight"], 1);
}
