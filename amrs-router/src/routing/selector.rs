use amrs_core::{Backend, RoutingMode};
use parking_lot::Mutex;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::{Result, RouterError};
use super::stats::StatsSnapshot;
use super::types::RequestContext;

/// 没有任何延迟数据时使用的中性权重
const NEUTRAL_WEIGHT: f64 = 1.0;

/// 平均延迟下限（微秒），避免零延迟导致权重无穷大
const MIN_LATENCY_MICROS: f64 = 1.0;

/// 路由策略
///
/// 构造时根据 RoutingMode 选定，之后不可更改。除轮询类策略的内部状态外，
/// 选择结果只取决于传入的快照、候选列表和随机源。
#[derive(Debug)]
pub enum RoutingStrategy {
    Random,
    RoundRobin { counter: AtomicUsize },
    LeastLoaded,
    LatencyWeighted,
    /// 平滑加权轮询，`current` 与候选列表一一对应
    WeightedRoundRobin { current: Mutex<Vec<i64>> },
}

impl RoutingStrategy {
    pub fn new(mode: RoutingMode) -> Self {
        match mode {
            RoutingMode::Random => Self::Random,
            RoutingMode::RoundRobin => Self::RoundRobin {
                counter: AtomicUsize::new(0),
            },
            RoutingMode::LeastLoaded => Self::LeastLoaded,
            RoutingMode::LatencyWeighted => Self::LatencyWeighted,
            RoutingMode::WeightedRoundRobin => Self::WeightedRoundRobin {
                current: Mutex::new(Vec::new()),
            },
        }
    }

    pub fn mode(&self) -> RoutingMode {
        match self {
            Self::Random => RoutingMode::Random,
            Self::RoundRobin { .. } => RoutingMode::RoundRobin,
            Self::LeastLoaded => RoutingMode::LeastLoaded,
            Self::LatencyWeighted => RoutingMode::LatencyWeighted,
            Self::WeightedRoundRobin { .. } => RoutingMode::WeightedRoundRobin,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Random => "RandomRouter",
            Self::RoundRobin { .. } => "RoundRobinRouter",
            Self::LeastLoaded => "LeastLoadedRouter",
            Self::LatencyWeighted => "LatencyWeightedRouter",
            Self::WeightedRoundRobin { .. } => "WeightedRoundRobinRouter",
        }
    }

    /// 从候选列表中选出一个后端，返回其下标
    pub fn select<R: Rng + ?Sized>(
        &self,
        _context: &RequestContext,
        snapshot: &StatsSnapshot,
        candidates: &[Backend],
        rng: &mut R,
    ) -> Result<usize> {
        if candidates.is_empty() {
            return Err(RouterError::NoCandidates);
        }

        let index = match self {
            Self::Random => rng.random_range(0..candidates.len()),
            Self::RoundRobin { counter } => select_round_robin(counter, candidates.len()),
            Self::LeastLoaded => select_least_loaded(snapshot, candidates),
            Self::LatencyWeighted => {
                let weights = latency_weights(snapshot, candidates);
                let dist = WeightedIndex::new(&weights)?;
                dist.sample(rng)
            }
            Self::WeightedRoundRobin { current } => {
                select_weighted_round_robin(&mut current.lock(), candidates)
            }
        };

        Ok(index)
    }
}

/// 计数器在每次调用时按候选数取模推进，不会无限增长
fn select_round_robin(counter: &AtomicUsize, len: usize) -> usize {
    let previous = counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some((c + 1) % len))
        .unwrap_or_else(|c| c);
    previous % len
}

/// 在途请求最少者胜出，相同时取下标最小者
fn select_least_loaded(snapshot: &StatsSnapshot, candidates: &[Backend]) -> usize {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(i, b)| (snapshot.get(&b.id).map_or(0, |v| v.in_flight), *i))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// 计算延迟加权策略的候选权重
///
/// 有完成记录的后端权重为平均延迟的倒数；尚无记录的后端取已知权重的中位数，
/// 全部未知时取 1.0，保证新后端不会被饿死。
pub fn latency_weights(snapshot: &StatsSnapshot, candidates: &[Backend]) -> Vec<f64> {
    let known: Vec<Option<f64>> = candidates
        .iter()
        .map(|b| {
            snapshot
                .get(&b.id)
                .and_then(|v| v.average_latency_micros())
                .map(|avg| 1.0 / avg.max(MIN_LATENCY_MICROS))
        })
        .collect();

    let mut sorted: Vec<f64> = known.iter().flatten().copied().collect();
    sorted.sort_by(f64::total_cmp);
    let neutral = median(&sorted).unwrap_or(NEUTRAL_WEIGHT);

    known
        .into_iter()
        .map(|weight| weight.unwrap_or(neutral))
        .collect()
}

fn median(sorted: &[f64]) -> Option<f64> {
    let len = sorted.len();
    if len == 0 {
        return None;
    }
    if len % 2 == 1 {
        Some(sorted[len / 2])
    } else {
        Some((sorted[len / 2 - 1] + sorted[len / 2]) / 2.0)
    }
}

/// 平滑加权轮询：每轮所有候选累加自身权重，选出当前值最大者并减去总权重
fn select_weighted_round_robin(current: &mut Vec<i64>, candidates: &[Backend]) -> usize {
    if current.len() != candidates.len() {
        current.clear();
        current.resize(candidates.len(), 0);
    }

    let total: i64 = candidates.iter().map(|b| i64::from(b.weight)).sum();
    let mut best = 0;
    for (i, backend) in candidates.iter().enumerate() {
        current[i] += i64::from(backend.weight);
        if current[i] > current[best] {
            best = i;
        }
    }
    current[best] -= total;
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::stats::StatsRegistry;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::time::Duration;

    fn create_test_backends(count: usize) -> Vec<Backend> {
        (0..count)
            .map(|i| Backend::new("provider", &format!("model{}", i)))
            .collect()
    }

    fn select_many(
        strategy: &RoutingStrategy,
        registry: &StatsRegistry,
        backends: &[Backend],
        rounds: usize,
    ) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(42);
        let context = RequestContext::default();
        (0..rounds)
            .map(|_| {
                strategy
                    .select(&context, &registry.snapshot(), backends, &mut rng)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_strategy_names_and_modes() {
        for mode in RoutingMode::ALL {
            let strategy = RoutingStrategy::new(mode);
            assert_eq!(strategy.mode(), mode);
        }
        assert_eq!(RoutingStrategy::new(RoutingMode::Random).name(), "RandomRouter");
        assert_eq!(
            RoutingStrategy::new(RoutingMode::WeightedRoundRobin).name(),
            "WeightedRoundRobinRouter"
        );
    }

    #[test]
    fn test_empty_candidates_fail_for_every_strategy() {
        let registry = StatsRegistry::new(&[]);
        let mut rng = StdRng::seed_from_u64(1);

        for mode in RoutingMode::ALL {
            let result = RoutingStrategy::new(mode).select(
                &RequestContext::default(),
                &registry.snapshot(),
                &[],
                &mut rng,
            );
            assert!(matches!(result, Err(RouterError::NoCandidates)));
        }
    }

    #[test]
    fn test_round_robin_visits_each_index_once_per_cycle() {
        let backends = create_test_backends(4);
        let registry = StatsRegistry::new(&backends);
        let strategy = RoutingStrategy::new(RoutingMode::RoundRobin);

        let picks = select_many(&strategy, &registry, &backends, 12);
        let mut first_cycle = picks[..4].to_vec();
        first_cycle.sort_unstable();
        assert_eq!(first_cycle, vec![0, 1, 2, 3]);

        for n in 0..8 {
            assert_eq!(picks[n], picks[n + 4]);
        }
    }

    #[test]
    fn test_round_robin_counter_stays_bounded() {
        let counter = AtomicUsize::new(0);
        for _ in 0..1000 {
            select_round_robin(&counter, 3);
        }
        assert!(counter.load(Ordering::Relaxed) < 3);
    }

    #[test]
    fn test_least_loaded_prefers_lowest_index_on_tie() {
        let backends = create_test_backends(4);
        let registry = StatsRegistry::new(&backends);
        for (backend, in_flight) in backends.iter().zip([3, 1, 1, 5]) {
            for _ in 0..in_flight {
                registry.record_dispatch(&backend.id).unwrap();
            }
        }

        let strategy = RoutingStrategy::new(RoutingMode::LeastLoaded);
        let picks = select_many(&strategy, &registry, &backends, 5);
        assert!(picks.iter().all(|&i| i == 1));
    }

    #[test]
    fn test_latency_weights_inverse_of_average() {
        let backends = create_test_backends(3);
        let registry = StatsRegistry::new(&backends);
        for (backend, latency) in backends.iter().take(2).zip([100, 400]) {
            registry.record_dispatch(&backend.id).unwrap();
            registry
                .record_outcome(&backend.id, Duration::from_micros(latency), true)
                .unwrap();
        }

        let weights = latency_weights(&registry.snapshot(), &backends);
        assert!((weights[0] - 0.01).abs() < 1e-12);
        assert!((weights[1] - 0.0025).abs() < 1e-12);
        // 未知后端取已知权重的中位数
        assert!((weights[2] - 0.00625).abs() < 1e-12);
    }

    #[test]
    fn test_latency_weights_neutral_when_nothing_known() {
        let backends = create_test_backends(3);
        let registry = StatsRegistry::new(&backends);

        let weights = latency_weights(&registry.snapshot(), &backends);
        assert_eq!(weights, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_latency_weights_zero_latency_is_clamped() {
        let backends = create_test_backends(1);
        let registry = StatsRegistry::new(&backends);
        registry.record_dispatch(&backends[0].id).unwrap();
        registry
            .record_outcome(&backends[0].id, Duration::ZERO, true)
            .unwrap();

        let weights = latency_weights(&registry.snapshot(), &backends);
        assert_eq!(weights, vec![1.0]);
    }

    #[test]
    fn test_weighted_round_robin_is_smooth() {
        let backends = vec![
            Backend::new("deepinfra", "deepseek-ai/DeepSeek-V3.2").with_weight(2),
            Backend::new("deepinfra", "nvidia/Nemotron-3-Nano-30B-A3B").with_weight(1),
        ];
        let registry = StatsRegistry::new(&backends);
        let strategy = RoutingStrategy::new(RoutingMode::WeightedRoundRobin);

        let picks = select_many(&strategy, &registry, &backends, 6);
        assert_eq!(picks, vec![0, 1, 0, 0, 1, 0]);
    }

    #[test]
    fn test_weighted_round_robin_exact_share_per_window() {
        let backends = vec![
            Backend::new("openai", "gpt-4o").with_weight(5),
            Backend::new("openai", "gpt-4o-mini").with_weight(3),
            Backend::new("openrouter", "mistral-large").with_weight(1),
        ];
        let registry = StatsRegistry::new(&backends);
        let strategy = RoutingStrategy::new(RoutingMode::WeightedRoundRobin);

        let picks = select_many(&strategy, &registry, &backends, 9 * 20);
        for window in picks.chunks(9) {
            let mut counts: HashMap<usize, usize> = HashMap::new();
            for &i in window {
                *counts.entry(i).or_insert(0) += 1;
            }
            assert_eq!(counts.get(&0), Some(&5));
            assert_eq!(counts.get(&1), Some(&3));
            assert_eq!(counts.get(&2), Some(&1));
        }
    }
}
