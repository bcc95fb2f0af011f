//! Tower layer reporting every request to the agent.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/api/values/get/:id", get(handlers::get_value))
//!     .layer(AgentLayer::new(instrumentation));
//! ```

use super::Instrumentation;
use crate::models::RouteValues;
use axum::http;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer wrapping services in [`AgentService`].
#[derive(Clone)]
pub struct AgentLayer {
    instrumentation: Arc<Instrumentation>,
}

impl AgentLayer {
    pub fn new(instrumentation: Arc<Instrumentation>) -> Self {
        Self { instrumentation }
    }
}

impl<S> Layer<S> for AgentLayer {
    type Service = AgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AgentService {
            inner,
            instrumentation: self.instrumentation.clone(),
        }
    }
}

/// Tower service running each call inside an instrumentation session.
#[derive(Clone)]
pub struct AgentService<S> {
    inner: S,
    instrumentation: Arc<Instrumentation>,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for AgentService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        // The clone is not ready; keep the polled service for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let instrumentation = self.instrumentation.clone();

        let request_path = req.uri().path().to_string();
        let request_route = req.extensions().get::<RouteValues>().cloned();

        Box::pin(async move {
            instrumentation
                .run(&request_path, request_route, inner.call(req))
                .await
        })
    }
}
