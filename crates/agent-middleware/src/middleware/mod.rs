//! Middleware for Agent Middleware.
//!
//! # Components
//!
//! - `instrumentation` - Shared agent/resolver state and the per-request wrapper
//! - `agent_layer` - Tower layer for any `http` service
//! - `request` - Axum `from_fn` middleware

pub mod agent_layer;
pub mod instrumentation;
pub mod request;

pub use agent_layer::{AgentLayer, AgentService};
pub use instrumentation::{should_engage, Instrumentation, PLATFORM_SUPPORTED};
pub use request::instrument_request;
