//! Agent Middleware models.
//!
//! Contains data types shared between handlers and the instrumentation layer.

use axum::response::{IntoResponseParts, ResponseParts};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// Controller and action that handled a request.
///
/// Handlers attach it to their response (it implements
/// [`IntoResponseParts`]); middleware may also insert it into request
/// extensions ahead of dispatch. The instrumentation layer reads it after
/// the handler returns to pick the transaction label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteValues {
    controller: String,
    action: String,
}

impl RouteValues {
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
        }
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl IntoResponseParts for RouteValues {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

/// Health check response.
///
/// Returned by the `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy").
    pub status: String,

    /// Whether requests are being reported to the agent.
    pub instrumentation_enabled: bool,
}

/// Response for the values endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuesResponse {
    pub values: Vec<String>,
}
