//! Load generator for the leakgate example server
//!
//! Spreads a fixed number of requests over a pool of workers, each paced
//! at the configured per-worker rate, and prints a summary of response
//! codes and latencies. Useful for watching the rate limiter turn
//! requests away once the offered load exceeds the configured rate.

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use reqwest::StatusCode;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(
    name = "leakgate-client",
    about = "Load generator for the leakgate example server"
)]
struct Args {
    #[arg(
        long,
        value_name = "URL",
        help = "Target url",
        default_value = "http://localhost:8080"
    )]
    url: String,
    #[arg(
        long,
        value_name = "N",
        help = "Number of requests",
        default_value_t = 4096
    )]
    count: u32,
    #[arg(
        long,
        value_name = "N",
        help = "Concurrent workers",
        default_value_t = 4
    )]
    concurrency: u32,
    #[arg(
        long,
        value_name = "N",
        help = "Requests per second per worker",
        default_value_t = 100
    )]
    requests_per_second: u32,
}

struct Sample {
    status: StatusCode,
    latency: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let concurrency = args.concurrency.max(1);
    let period = Duration::from_secs(1) / args.requests_per_second.max(1);

    let client = reqwest::Client::new();
    let (results_tx, mut results_rx) = mpsc::unbounded_channel();

    let started = Instant::now();

    let mut workers = Vec::new();
    for worker in 0..concurrency {
        // spread the remainder over the first workers
        let share = args.count / concurrency + u32::from(worker < args.count % concurrency);
        let client = client.clone();
        let url = args.url.clone();
        let results_tx = results_tx.clone();

        workers.push(tokio::spawn(async move {
            for _ in 0..share {
                let start = Instant::now();
                match client.post(&url).body("").send().await {
                    Ok(response) => {
                        let _ = results_tx.send(Sample {
                            status: response.status(),
                            latency: start.elapsed(),
                        });
                    }
                    Err(error) => eprintln!("request failed: {error}"),
                }

                // pace the worker at the configured rate
                let elapsed = start.elapsed();
                if elapsed < period {
                    tokio::time::sleep(period - elapsed).await;
                }
            }
        }));
    }
    drop(results_tx);

    for worker in workers {
        worker.await?;
    }
    let wall = started.elapsed();

    let mut samples = Vec::with_capacity(args.count as usize);
    while let Some(sample) = results_rx.recv().await {
        samples.push(sample);
    }

    summarize(&samples, wall);
    Ok(())
}

/// Prints a summary of the measurements.
fn summarize(samples: &[Sample], wall: Duration) {
    if samples.is_empty() {
        println!("no responses recorded");
        return;
    }

    let mut successes = 0u32;
    let mut failures = 0u32;
    let mut total = Duration::ZERO;
    let mut success_total = Duration::ZERO;
    let mut failure_total = Duration::ZERO;

    for sample in samples {
        if sample.status == StatusCode::OK {
            successes += 1;
            success_total += sample.latency;
        } else {
            failures += 1;
            failure_total += sample.latency;
        }
        total += sample.latency;
    }

    println!(
        "Average response time: {:?}, success: {:?}, failure: {:?}",
        total / samples.len() as u32,
        success_total / successes.max(1),
        failure_total / failures.max(1),
    );
    println!("Duration: {wall:?}");

    let seconds = wall.as_secs_f64();
    println!(
        "Requests per second: {:.2}, success: {:.2}",
        samples.len() as f64 / seconds,
        f64::from(successes) / seconds,
    );
    println!("Successes: {successes}");
    println!("Failures: {failures}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_handles_an_empty_run() {
        // must not divide by zero
        summarize(&[], Duration::from_secs(1));
    }
}
