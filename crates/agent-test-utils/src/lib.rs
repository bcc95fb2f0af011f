//! # Agent Test Utilities
//!
//! Shared test utilities for the agent middleware.
//!
//! This crate provides:
//! - Mapping fixtures (the values mapping document, resolvers, temp files)
//! - Server test harness (`TestAgentServer` for E2E tests)
//!
//! The recording agent itself lives in `agent_middleware::agent::MockAgent`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestAgentServer::spawn(values_resolver()).await?;
//!     let response = reqwest::get(format!("{}/api/values/get/42", server.url())).await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
