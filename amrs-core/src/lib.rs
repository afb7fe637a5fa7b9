//! AMRS Core Library
//!
//! This library provides core functionality shared by the AMRS crates:
//! - Backend identities and metadata
//! - Routing mode selection
//! - Configuration model, defaults and validation

pub mod backend;
pub mod config;

// Re-export commonly used types
pub use backend::{Backend, BackendId, ParseRoutingModeError, RoutingMode};
pub use config::model::{Config, GlobalSettings, ModelConfig};
