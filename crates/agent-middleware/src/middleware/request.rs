//! Axum middleware function reporting requests to the agent.
//!
//! Equivalent to [`super::AgentLayer`] for routers assembled with
//! `axum::middleware::from_fn_with_state`.

use super::Instrumentation;
use crate::models::RouteValues;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::sync::Arc;

/// Run the rest of the stack inside an instrumentation session.
pub async fn instrument_request(
    State(instrumentation): State<Arc<Instrumentation>>,
    req: Request,
    next: Next,
) -> Response {
    let request_path = req.uri().path().to_string();
    let request_route = req.extensions().get::<RouteValues>().cloned();

    let handler = async move { Ok::<_, Infallible>(next.run(req).await) };
    match instrumentation
        .run(&request_path, request_route, handler)
        .await
    {
        Ok(response) => response,
        Err(never) => match never {},
    }
}
