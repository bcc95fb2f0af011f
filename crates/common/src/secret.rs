//! Secret types for keeping credentials out of logs.
//!
//! Re-exports the [`secrecy`] types used for the APM license key and any other
//! credential handed to the native agent. `SecretString` implements `Debug`
//! with redaction, so configuration structs can derive or hand-write `Debug`
//! without leaking the key through `{:?}` or tracing fields.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct AgentCredentials {
//!     app_name: String,
//!     license_key: SecretString,
//! }
//!
//! let creds = AgentCredentials {
//!     app_name: "orders-api".to_string(),
//!     license_key: SecretString::from("0123456789abcdef"),
//! };
//!
//! // Debug output shows the app name but not the key
//! println!("{:?}", creds);
//!
//! // The raw value is only reachable through expose_secret()
//! let key: &str = creds.license_key.expose_secret();
//! assert_eq!(key.len(), 16);
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Returns true when the secret holds nothing but whitespace.
///
/// Used by configuration loaders to reject empty license keys without
/// copying the secret into a plain `String`.
#[must_use]
pub fn is_blank(secret: &SecretString) -> bool {
    secret.expose_secret().trim().is_empty()
}
