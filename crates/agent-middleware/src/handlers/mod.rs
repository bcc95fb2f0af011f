//! HTTP request handlers for the demonstration service.

pub mod health;
pub mod metrics;
pub mod values;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use values::{get_value, list_values};
