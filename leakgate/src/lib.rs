//! # leakgate
//!
//! A leaky bucket ("meter" variant) rate limiting middleware for tower
//! services.
//!
//! ## Overview
//!
//! Every incoming request "fills" a bucket of fixed capacity. While the
//! bucket has room, requests pass through to the wrapped service untouched.
//! Once it overflows, requests are rejected with `429 Too Many Requests`
//! and a `Retry-After` header asking the client to come back a few seconds
//! later. The delay carries a random component so that rejected clients do
//! not all come back at the same instant. A background scheduler "leaks"
//! the bucket at the configured rate, restoring capacity over time.
//!
//! ## Quick Start
//!
//! ```
//! use leakgate::{RateLimitLayer, RateLimiter, RateLimiterConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), leakgate::ConfigError> {
//! // Let 100 requests per second through
//! let config = RateLimiterConfig::new(100)?;
//! let limiter = Arc::new(RateLimiter::new(config));
//!
//! // The scheduler drains the bucket for as long as it runs; spawn it
//! // before serving traffic and keep the handle for shutdown.
//! let scheduler = tokio::spawn({
//!     let limiter = Arc::clone(&limiter);
//!     async move { limiter.start().await }
//! });
//!
//! let app = axum::Router::<()>::new()
//!     .route("/", axum::routing::get(|| async { "hello" }))
//!     .layer(RateLimitLayer::new(Arc::clone(&limiter)));
//!
//! // ... serve `app`, then on shutdown:
//! limiter.stop();
//! scheduler.await.unwrap();
//! # Ok(())
//! # }
//! ```
//!
//! ## Bucket Strategies
//!
//! Two strategies make the shared bucket safe for concurrent request
//! handlers; both satisfy [`SharedBucket`] and are selected at
//! construction time:
//!
//! - [`MutexBucket`] (default, [`RateLimiter::new_mutex`]): the calling
//!   task runs the bucket logic directly under a mutex. Lower overhead.
//! - [`ChannelBucket`] ([`RateLimiter::new_channel`]): a dedicated loop
//!   owns the bucket and serializes all access as messages.
//!
//! ## Lifecycle
//!
//! [`RateLimiter::start`] must run before any traffic reaches the service:
//! capacity never drains otherwise, and a channel-backed bucket does not
//! answer at all until its loop runs. Call [`RateLimiter::stop`] after the
//! server has stopped; the instance is not usable afterwards.

pub mod bucket;
pub mod layer;
pub mod middleware;


pub use bucket::{Bucket, ChannelBucket, LeakyBucket, MutexBucket, SharedBucket};
pub use layer::{RateLimitLayer, RateLimitService};
pub use middleware::{Admission, ConfigError, RateLimiter, RateLimiterConfig};
