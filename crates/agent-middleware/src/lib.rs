//! Agent Middleware Library
//!
//! Wraps every inbound HTTP request in an APM transaction: begin, name,
//! report errors, end. Instrumentation is transparent to the application:
//!
//! - A failure to begin a transaction skips instrumentation for that request
//!   and the handler still runs exactly once
//! - Handler errors and panics are reported and then propagated unchanged
//! - A failure to end a transaction never changes the response
//!
//! Transaction names come from [`txn_labeller::LabelResolver`], which rolls
//! concrete paths up into stable labels using the hot-reloadable mapping
//! document.
//!
//! # Architecture
//!
//! ```text
//! middleware/*.rs -> session.rs -> agent/*.rs
//!                         \-> txn_labeller::LabelResolver
//! ```
//!
//! # Modules
//!
//! - `agent` - Native agent contract, argument guards and the SDK binding
//! - `config` - Middleware configuration from environment
//! - `errors` - Agent error types
//! - `handlers` - Demonstration HTTP handlers
//! - `middleware` - Tower layer and axum middleware function
//! - `models` - Route values carried through request/response extensions
//! - `observability` - Middleware self-metrics
//! - `routes` - Axum router for the demonstration service
//! - `session` - Per-request instrumentation state machine

pub mod agent;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod session;
