//! Common utilities shared across the agent middleware crates.

#![warn(clippy::pedantic)]

/// Module for observability (logging) configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
