pub mod dispatch;
pub mod error;
pub mod router;
pub mod selector;
pub mod stats;
pub mod types;


pub use dispatch::Dispatch;
pub use error::{Result, RouterError};
pub use router::Router;
pub use selector::{latency_weights, RoutingStrategy};
pub use stats::{BackendStats, BackendStatsView, StatsRegistry, StatsSnapshot};
pub use types::{RequestContext, RouteOutcome};
