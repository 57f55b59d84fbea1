//! Server configuration and CLI argument parsing
//!
//! All arguments can also be set via environment variables with the
//! LEAKGATE_ prefix. CLI arguments take precedence over environment
//! variables.
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! leakgate-server --requests-per-second 50 --strategy channel
//!
//! # Using environment variables
//! export LEAKGATE_PORT=9090
//! export LEAKGATE_STRATEGY=channel
//! leakgate-server
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;

/// Available bucket sharing strategies.
///
/// - **Mutex**: the request task runs the bucket logic under a lock.
///   Lower overhead, the default.
/// - **Channel**: a dedicated loop owns the bucket and serializes access
///   as messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Lock-based bucket sharing
    Mutex,
    /// Message-passing bucket sharing
    Channel,
}

impl std::str::FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mutex" => Ok(Strategy::Mutex),
            "channel" => Ok(Strategy::Channel),
            _ => Err(anyhow!(
                "Invalid strategy: {}. Valid options are: mutex, channel",
                s
            )),
        }
    }
}

/// Command-line arguments for the example server
#[derive(Parser, Debug)]
#[command(
    name = "leakgate-server",
    about = "Example HTTP server guarded by the leakgate rate limiter"
)]
pub struct Args {
    #[arg(
        long,
        value_name = "HOST",
        help = "Host to bind to",
        default_value = "127.0.0.1",
        env = "LEAKGATE_HOST"
    )]
    pub host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "Port to listen on",
        default_value_t = 8080,
        env = "LEAKGATE_PORT"
    )]
    pub port: u16,

    // Rate limiter
    #[arg(
        long,
        value_name = "N",
        help = "Requests per second let through",
        default_value_t = 100,
        env = "LEAKGATE_REQUESTS_PER_SECOND"
    )]
    pub requests_per_second: u32,
    #[arg(
        long,
        value_name = "SECS",
        help = "Minimum Retry-After delay for rejected requests",
        default_value_t = 1,
        env = "LEAKGATE_RETRY_DELAY"
    )]
    pub retry_delay: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Random spread added to the retry delay",
        default_value_t = 5,
        env = "LEAKGATE_RETRY_JITTER"
    )]
    pub retry_jitter: u64,
    #[arg(
        long,
        value_name = "STRATEGY",
        help = "Bucket strategy: mutex, channel",
        default_value = "mutex",
        env = "LEAKGATE_STRATEGY"
    )]
    pub strategy: Strategy,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "LEAKGATE_LOG_LEVEL"
    )]
    pub log_level: String,
}
