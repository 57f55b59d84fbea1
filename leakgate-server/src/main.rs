//! Example HTTP server guarded by the leakgate rate limiter
//!
//! Wires the middleware into an axum application: a work endpoint behind
//! the rate limit layer, a `/health` endpoint outside it, and a request
//! logging layer around everything. The leak scheduler runs on its own
//! task for the lifetime of the server and is joined on shutdown.

mod config;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{any, get};
use clap::Parser;
use leakgate::{RateLimitLayer, RateLimiter, RateLimiterConfig};
use rand::Rng;

use crate::config::{Args, Strategy};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("leakgate={}", args.log_level).parse()?)
                .add_directive(format!("leakgate_server={}", args.log_level).parse()?),
        )
        .init();

    let mut config = RateLimiterConfig::new(args.requests_per_second)?;
    config.set_retry_delay(args.retry_delay, args.retry_jitter);

    let limiter = Arc::new(match args.strategy {
        Strategy::Mutex => RateLimiter::new_mutex(config),
        Strategy::Channel => RateLimiter::new_channel(config),
    });

    // The scheduler drains the bucket for as long as the server runs;
    // keep the handle so shutdown can join it.
    let scheduler = tokio::spawn({
        let limiter = Arc::clone(&limiter);
        async move { limiter.start().await }
    });

    let app = Router::new()
        .route("/", any(handle_work))
        .layer(RateLimitLayer::new(Arc::clone(&limiter)))
        .layer(middleware::from_fn(log_request))
        .route("/health", get(|| async { "OK" }));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        %addr,
        rate = args.requests_per_second,
        strategy = ?args.strategy,
        "leakgate server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    limiter.stop();
    scheduler.await?;
    tracing::info!("leakgate server stopped");

    Ok(())
}

async fn handle_work() -> StatusCode {
    tracing::info!("working on request");
    StatusCode::OK
}

/// Logs every request with a random id, its latency and the final status,
/// including the ones the rate limiter turned away.
async fn log_request(req: Request, next: Next) -> Response {
    let reqid = format!("{:016x}", rand::rng().random::<u64>());
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        %reqid,
        %method,
        %path,
        status = response.status().as_u16(),
        latency = ?start.elapsed(),
        "completed handling request"
    );

    response
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
}
