use amrs_core::{Backend, BackendId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::error::{Result, RouterError};

/// 单个后端的计数器，整体受一把锁保护以保证快照不会读到撕裂的字段
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    in_flight: u64,
    total_requests: u64,
    completed_requests: u64,
    failed_requests: u64,
    total_latency_micros: u64,
}

/// 后端运行时统计
#[derive(Debug)]
pub struct BackendStats {
    backend_id: BackendId,
    counters: Mutex<Counters>,
}

impl BackendStats {
    fn new(backend_id: BackendId) -> Self {
        Self {
            backend_id,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// 分发请求：在途数和总请求数同时加一，返回新的在途数
    fn record_dispatch(&self) -> u64 {
        let mut counters = self.counters.lock();
        counters.in_flight += 1;
        counters.total_requests += 1;
        counters.in_flight
    }

    fn record_outcome(&self, latency_micros: u64, success: bool) {
        let mut counters = self.counters.lock();
        match counters.in_flight.checked_sub(1) {
            Some(in_flight) => counters.in_flight = in_flight,
            None => tracing::warn!(
                "Outcome reported for backend {} with no request in flight, in_flight stays at 0",
                self.backend_id
            ),
        }
        counters.completed_requests += 1;
        if !success {
            counters.failed_requests += 1;
        }
        counters.total_latency_micros = counters.total_latency_micros.saturating_add(latency_micros);
    }

    fn view(&self) -> BackendStatsView {
        let counters = *self.counters.lock();
        BackendStatsView {
            backend_id: self.backend_id.clone(),
            in_flight: counters.in_flight,
            total_requests: counters.total_requests,
            completed_requests: counters.completed_requests,
            failed_requests: counters.failed_requests,
            total_latency_micros: counters.total_latency_micros,
        }
    }
}

/// 某一时刻单个后端统计的只读副本
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatsView {
    pub backend_id: BackendId,
    pub in_flight: u64,
    pub total_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub total_latency_micros: u64,
}

impl BackendStatsView {
    /// 平均延迟（微秒），尚无完成的请求时为 None
    pub fn average_latency_micros(&self) -> Option<f64> {
        if self.completed_requests == 0 {
            return None;
        }
        Some(self.total_latency_micros as f64 / self.completed_requests as f64)
    }

    pub fn average_latency(&self) -> Option<Duration> {
        self.average_latency_micros()
            .map(|micros| Duration::from_micros(micros.round() as u64))
    }

    /// 成功率，尚无完成的请求时为 None
    pub fn success_rate(&self) -> Option<f64> {
        if self.completed_requests == 0 {
            return None;
        }
        let succeeded = self.completed_requests - self.failed_requests;
        Some(succeeded as f64 / self.completed_requests as f64)
    }
}

/// 所有后端统计的不可变快照，顺序与注册顺序一致
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub taken_at: DateTime<Utc>,
    entries: Vec<BackendStatsView>,
    #[serde(skip)]
    index: Arc<HashMap<BackendId, usize>>,
}

impl StatsSnapshot {
    pub fn get(&self, backend_id: &BackendId) -> Option<&BackendStatsView> {
        self.index.get(backend_id).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendStatsView> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_in_flight(&self) -> u64 {
        self.entries.iter().map(|e| e.in_flight).sum()
    }

    pub fn total_requests(&self) -> u64 {
        self.entries.iter().map(|e| e.total_requests).sum()
    }
}

/// 统计注册表，为每个已注册后端持有一份 BackendStats
#[derive(Debug)]
pub struct StatsRegistry {
    index: Arc<HashMap<BackendId, usize>>,
    stats: Vec<BackendStats>,
}

impl StatsRegistry {
    /// 为每个后端预先创建统计条目；调用方保证标识唯一
    pub fn new(backends: &[Backend]) -> Self {
        let index = backends
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id.clone(), i))
            .collect();
        let stats = backends
            .iter()
            .map(|b| BackendStats::new(b.id.clone()))
            .collect();

        Self {
            index: Arc::new(index),
            stats,
        }
    }

    fn lookup(&self, backend_id: &BackendId) -> Result<&BackendStats> {
        self.index
            .get(backend_id)
            .map(|&i| &self.stats[i])
            .ok_or_else(|| RouterError::UnknownBackend(backend_id.clone()))
    }

    pub fn contains(&self, backend_id: &BackendId) -> bool {
        self.index.contains_key(backend_id)
    }

    /// 记录一次分发，返回该后端当前的在途请求数
    pub fn record_dispatch(&self, backend_id: &BackendId) -> Result<u64> {
        Ok(self.lookup(backend_id)?.record_dispatch())
    }

    /// 记录请求结果；无论成功失败延迟都会累加
    pub fn record_outcome(
        &self,
        backend_id: &BackendId,
        latency: Duration,
        success: bool,
    ) -> Result<()> {
        let stats = self.lookup(backend_id)?;
        let latency_micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        stats.record_outcome(latency_micros, success);
        Ok(())
    }

    pub fn get(&self, backend_id: &BackendId) -> Result<BackendStatsView> {
        Ok(self.lookup(backend_id)?.view())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            taken_at: Utc::now(),
            entries: self.stats.iter().map(BackendStats::view).collect(),
            index: self.index.clone(),
        }
    }
}
