use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 后端唯一标识，格式为 `provider/model-id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 由提供商和模型ID拼接
    pub fn from_parts(provider: &str, model: &str) -> Self {
        Self(format!("{}/{}", provider, model))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 拆分为 (provider, model)，模型ID本身可以包含 `/`
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0
            .split_once('/')
            .filter(|(provider, model)| !provider.is_empty() && !model.is_empty())
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for BackendId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// 一个可路由的模型后端，注册后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    pub id: BackendId,
    pub provider: String,
    pub model: String,
    /// 加权轮询使用的静态权重
    pub weight: u32,
    /// 并发上限提示，仅用于告警
    pub max_concurrency: Option<u32>,
}

impl Backend {
    pub fn new(provider: &str, model: &str) -> Self {
        Self {
            id: BackendId::from_parts(provider, model),
            provider: provider.to_string(),
            model: model.to_string(),
            weight: 1,
            max_concurrency: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: u32) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }
}

/// 路由模式，构造路由器时固定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// 均匀随机
    #[default]
    Random,
    /// 轮询
    RoundRobin,
    /// 在途请求最少优先
    LeastLoaded,
    /// 按平均延迟反比加权随机
    LatencyWeighted,
    /// 平滑加权轮询
    WeightedRoundRobin,
}

impl RoutingMode {
    pub const ALL: [RoutingMode; 5] = [
        RoutingMode::Random,
        RoutingMode::RoundRobin,
        RoutingMode::LeastLoaded,
        RoutingMode::LatencyWeighted,
        RoutingMode::WeightedRoundRobin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingMode::Random => "random",
            RoutingMode::RoundRobin => "round_robin",
            RoutingMode::LeastLoaded => "least_loaded",
            RoutingMode::LatencyWeighted => "latency_weighted",
            RoutingMode::WeightedRoundRobin => "weighted_round_robin",
        }
    }
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown routing mode '{0}' (expected one of: random, round_robin, least_loaded, latency_weighted, weighted_round_robin)")]
pub struct ParseRoutingModeError(pub String);

impl FromStr for RoutingMode {
    type Err = ParseRoutingModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoutingMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| ParseRoutingModeError(s.to_string()))
    }
}
