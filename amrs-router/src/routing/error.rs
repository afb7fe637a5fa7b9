use amrs_core::BackendId;
use thiserror::Error;

/// 路由器错误类型
#[derive(Debug, Error)]
pub enum RouterError {
    /// 构造阶段的配置错误：候选列表为空、未知路由模式等
    #[error("invalid router configuration: {0}")]
    InvalidConfig(String),

    /// 使用了未注册的后端标识，通常是调用方的bug
    #[error("unknown backend '{0}'")]
    UnknownBackend(BackendId),

    /// 策略收到空候选列表，违反构造期不变量
    #[error("no candidate backends to select from")]
    NoCandidates,

    #[error("weighted sampling failed: {0}")]
    Sampling(#[from] rand::distr::weighted::Error),
}

pub type Result<T, E = RouterError> = std::result::Result<T, E>;
