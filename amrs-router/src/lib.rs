//! AMRS Router Library
//!
//! This library decides which model backend handles each request:
//! - Per-backend load and latency statistics
//! - Routing strategies (random, round robin, least loaded, latency weighted, weighted round robin)
//! - A concurrent router with a route / report contract and a scoped dispatch guard

pub mod routing;

// Re-export commonly used types
pub use amrs_core::{Backend, BackendId, RoutingMode};
pub use routing::{
    BackendStatsView, Dispatch, RequestContext, RouteOutcome, Router, RouterError,
    RoutingStrategy, StatsRegistry, StatsSnapshot,
};
