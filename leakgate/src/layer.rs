//! Tower integration for the rate limiter
//!
//! [`RateLimitLayer`] wraps a service so that every request is checked
//! against a shared [`RateLimiter`] before it reaches the inner service.
//! Rejected requests are answered directly with `429 Too Many Requests`
//! and a `Retry-After` header; the inner service never sees them.

use crate::middleware::{Admission, RateLimiter};
use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// A layer that gates requests behind a [`RateLimiter`].
///
/// The same limiter instance must also be driven by
/// [`RateLimiter::start`]; the layer only consults it.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    /// Creates a layer gating requests behind `limiter`.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        RateLimitLayer { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Middleware service that rejects requests overflowing the bucket.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request> for RateLimitService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match limiter.admit().await {
                Admission::Allowed => inner.call(req).await,
                Admission::Rejected { retry_after } => Ok(reject(retry_after)),
            }
        })
    }
}

fn reject(retry_after: u64) -> Response {
    let reason = StatusCode::TOO_MANY_REQUESTS
        .canonical_reason()
        .unwrap_or("Too Many Requests");

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after.to_string())],
        reason,
    )
        .into_response()
}
