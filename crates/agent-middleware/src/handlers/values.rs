//! Values endpoints.
//!
//! Both handlers belong to the `valuescontroller/get` action, so the mapping
//! document decides whether `/api/values/get` and `/api/values/get/{id}` are
//! reported under separate labels.

use crate::models::{RouteValues, ValuesResponse};
use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

const CONTROLLER: &str = "valuescontroller";
const ACTION: &str = "get";

fn route() -> RouteValues {
    RouteValues::new(CONTROLLER, ACTION)
}

/// Handler for GET /api/values/get
pub async fn list_values() -> impl IntoResponse {
    (
        route(),
        Json(ValuesResponse {
            values: vec!["value1".to_string(), "value2".to_string()],
        }),
    )
}

/// Handler for GET /api/values/get/{id}
///
/// Non-numeric ids are rejected with 400.
pub async fn get_value(Path(id): Path<String>) -> Response {
    match id.parse::<u32>() {
        Ok(id) => (
            route(),
            Json(ValuesResponse {
                values: vec![format!("value{id}")],
            }),
        )
            .into_response(),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            route(),
            "id must be a non-negative integer",
        )
            .into_response(),
    }
}
