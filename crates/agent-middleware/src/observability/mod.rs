//! Self-observability of the instrumentation layer.
//!
//! The middleware reports to the APM agent, but it also exposes its own
//! health through the `metrics` facade so that a broken agent is visible
//! without the agent.
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `agent_middleware_transactions_total` | Counter | `outcome` | Requests seen by the layer |
//! | `agent_middleware_transaction_duration_seconds` | Histogram | `outcome` | Handler time inside a transaction |
//! | `agent_middleware_agent_call_failures_total` | Counter | `operation` | Absorbed agent errors |
//! | `agent_middleware_instrumentation_enabled` | Gauge | none | 1 when requests are reported |
//!
//! Labels are bounded by code: `outcome` is one of [`Outcome`], `operation`
//! one of the agent operations.

pub mod metrics;

pub use metrics::{
    init_metrics_recorder, record_agent_call_failure, record_transaction,
    record_transaction_skipped, set_instrumentation_enabled, Outcome,
};
