use amrs_core::Backend;
use std::ops::Deref;
use std::time::{Duration, Instant};

use super::error::Result;
use super::router::Router;
use super::types::RouteOutcome;

/// 一次已分发请求的作用域守卫
///
/// 调用 `complete` / `succeed` / `fail` 上报结果并计入实际耗时。
/// 未上报就被丢弃（调用方提前返回、任务被取消、超时）时自动按失败上报，
/// 保证在途计数恰好释放一次。
#[derive(Debug)]
pub struct Dispatch<'a> {
    router: &'a Router,
    backend: &'a Backend,
    started_at: Instant,
    finished: bool,
}

impl<'a> Dispatch<'a> {
    pub(crate) fn new(router: &'a Router, backend: &'a Backend) -> Self {
        Self {
            router,
            backend,
            started_at: Instant::now(),
            finished: false,
        }
    }

    pub fn backend(&self) -> &'a Backend {
        self.backend
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 按给定结果上报
    pub fn complete(mut self, outcome: RouteOutcome) -> Result<()> {
        self.finished = true;
        self.router.report(&self.backend.id, outcome)
    }

    pub fn succeed(self) -> Result<()> {
        let latency = self.elapsed();
        self.complete(RouteOutcome::success(latency))
    }

    pub fn fail(self, error: impl Into<String>) -> Result<()> {
        let latency = self.elapsed();
        self.complete(RouteOutcome::failure(latency, error))
    }
}

impl Deref for Dispatch<'_> {
    type Target = Backend;

    fn deref(&self) -> &Self::Target {
        self.backend
    }
}

impl Drop for Dispatch<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        tracing::warn!(
            "Dispatch to backend {} dropped without an outcome, reporting failure",
            self.backend.id
        );
        let outcome = RouteOutcome::failure(self.elapsed(), "request abandoned");
        if let Err(e) = self.router.report(&self.backend.id, outcome) {
            tracing::error!("Failed to report abandoned dispatch: {}", e);
        }
    }
}
