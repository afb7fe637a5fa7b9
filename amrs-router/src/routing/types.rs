use std::time::Duration;

/// 请求上下文，内容对当前策略不透明，预留给基于内容的路由策略
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub content: String,
}

impl RequestContext {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl From<&str> for RequestContext {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

/// 后端调用结果，由调用方在外部请求结束后上报
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// 请求成功
    Success {
        /// 请求延迟
        latency: Duration,
    },
    /// 请求失败，延迟仍然计入统计
    Failure {
        latency: Duration,
        /// 错误信息
        error: Option<String>,
    },
}

impl RouteOutcome {
    pub fn success(latency: Duration) -> Self {
        Self::Success { latency }
    }

    pub fn failure(latency: Duration, error: impl Into<String>) -> Self {
        Self::Failure {
            latency,
            error: Some(error.into()),
        }
    }

    pub fn latency(&self) -> Duration {
        match self {
            Self::Success { latency } | Self::Failure { latency, .. } => *latency,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
