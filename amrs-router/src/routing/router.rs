use amrs_core::{Backend, BackendId, Config, RoutingMode};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

use super::dispatch::Dispatch;
use super::error::{Result, RouterError};
use super::selector::RoutingStrategy;
use super::stats::{BackendStatsView, StatsRegistry, StatsSnapshot};
use super::types::{RequestContext, RouteOutcome};

/// 请求路由器
///
/// 持有固定的候选后端列表、统计注册表、路由策略和随机源。`route` 与 `report`
/// 可以被多个调用方并发调用，无需外部同步。
///
/// 调用方义务：每次成功的 `route` 必须恰好对应一次 `report`（失败也要上报），
/// 否则该后端的在途计数会一直偏高。需要自动释放时使用 [`Router::dispatch`]。
#[derive(Debug)]
pub struct Router {
    backends: Vec<Backend>,
    strategy: RoutingStrategy,
    registry: StatsRegistry,
    rng: Mutex<StdRng>,
}

impl Router {
    /// 使用系统熵初始化随机源
    pub fn new(backends: Vec<Backend>, mode: RoutingMode) -> Result<Self> {
        Self::with_rng(backends, mode, StdRng::from_rng(&mut rand::rng()))
    }

    /// 使用固定种子，结果可复现
    pub fn with_seed(backends: Vec<Backend>, mode: RoutingMode, seed: u64) -> Result<Self> {
        Self::with_rng(backends, mode, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(backends: Vec<Backend>, mode: RoutingMode, rng: StdRng) -> Result<Self> {
        validate_backends(&backends, mode)?;

        let strategy = RoutingStrategy::new(mode);
        let registry = StatsRegistry::new(&backends);

        tracing::info!(
            "Initialized {} with {} backends",
            strategy.name(),
            backends.len()
        );

        Ok(Self {
            backends,
            strategy,
            registry,
            rng: Mutex::new(rng),
        })
    }

    /// 通过模式名称构造，未知名称直接报错而不是回退到默认策略
    pub fn from_mode_name(backends: Vec<Backend>, mode: &str) -> Result<Self> {
        let mode = mode
            .parse::<RoutingMode>()
            .map_err(|e| RouterError::InvalidConfig(e.to_string()))?;
        Self::new(backends, mode)
    }

    /// 从已解析的配置构造；配置了种子时使用确定性随机源
    pub fn from_config(config: &Config) -> Result<Self> {
        let backends = config.backends();
        let mode = config.settings.routing_mode;
        match config.settings.seed {
            Some(seed) => Self::with_seed(backends, mode, seed),
            None => Self::new(backends, mode),
        }
    }

    /// 为请求选择后端并记录一次分发
    ///
    /// 这是唯一一个既读取统计又修改统计的操作，必须在外部网络调用之前调用。
    pub fn route(&self, context: &RequestContext) -> Result<&Backend> {
        let snapshot = self.registry.snapshot();
        let index = {
            let mut rng = self.rng.lock();
            self.strategy
                .select(context, &snapshot, &self.backends, &mut *rng)?
        };

        let backend = self
            .backends
            .get(index)
            .ok_or(RouterError::NoCandidates)?;
        let in_flight = self.registry.record_dispatch(&backend.id)?;

        tracing::debug!(
            "{} selected backend {} (in_flight={})",
            self.strategy.name(),
            backend.id,
            in_flight
        );

        if let Some(max_concurrency) = backend.max_concurrency {
            if in_flight > u64::from(max_concurrency) {
                tracing::warn!(
                    "Backend {} is over its concurrency hint: in_flight={} max_concurrency={}",
                    backend.id,
                    in_flight,
                    max_concurrency
                );
            }
        }

        Ok(backend)
    }

    /// 选择后端并返回作用域守卫，守卫未完成即被丢弃时按失败上报
    pub fn dispatch(&self, context: &RequestContext) -> Result<Dispatch<'_>> {
        let backend = self.route(context)?;
        Ok(Dispatch::new(self, backend))
    }

    /// 上报请求结果，每次 `route` 之后必须恰好调用一次
    pub fn report(&self, backend_id: &BackendId, outcome: RouteOutcome) -> Result<()> {
        let latency = outcome.latency();
        let success = outcome.is_success();
        self.registry.record_outcome(backend_id, latency, success)?;

        match &outcome {
            RouteOutcome::Success { .. } => tracing::debug!(
                "Recorded success for backend {} ({}us)",
                backend_id,
                latency.as_micros()
            ),
            RouteOutcome::Failure { error, .. } => tracing::debug!(
                "Recorded failure for backend {} ({}us): {}",
                backend_id,
                latency.as_micros(),
                error.as_deref().unwrap_or("unknown error")
            ),
        }

        Ok(())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.registry.snapshot()
    }

    pub fn backend_stats(&self, backend_id: &BackendId) -> Result<BackendStatsView> {
        self.registry.get(backend_id)
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn mode(&self) -> RoutingMode {
        self.strategy.mode()
    }

    pub fn name(&self) -> &'static str {
        self.strategy.name()
    }
}

fn validate_backends(backends: &[Backend], mode: RoutingMode) -> Result<()> {
    if backends.is_empty() {
        return Err(RouterError::InvalidConfig(
            "candidate backend list is empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for backend in backends {
        if !seen.insert(&backend.id) {
            return Err(RouterError::InvalidConfig(format!(
                "duplicate backend '{}'",
                backend.id
            )));
        }

        if mode == RoutingMode::WeightedRoundRobin && backend.weight == 0 {
            return Err(RouterError::InvalidConfig(format!(
                "backend '{}' has zero weight in weighted_round_robin mode",
                backend.id
            )));
        }
    }

    Ok(())
}
