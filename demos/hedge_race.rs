//! High-volume stress run of hedged HTTP calls.
//!
//! Fires 10,000 hedged calls, at most 128 at a time, against the instances in
//! `HEDGE_INSTANCES`, then prints latency percentiles and which replicas won.

use std::{
    env,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{stream, StreamExt};
use hedging_client::{
    HedgeConfig, HedgedClient, HttpTransport, LogicalRequest, RoundRobin, StaticDiscovery,
};

const TOTAL_CALLS: usize = 10_000;
const CONCURRENCY: usize = 128;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let raw = env::var("HEDGE_INSTANCES").unwrap_or_default();
    let urls: Vec<&str> = raw.split(',').map(str::trim).filter(|u| !u.is_empty()).collect();
    if urls.is_empty() {
        anyhow::bail!("set HEDGE_INSTANCES to a comma separated list of base URLs");
    }

    let discovery = Arc::new(StaticDiscovery::new().with_urls("service", &urls)?);
    let client = HedgedClient::new(
        Arc::clone(&discovery),
        RoundRobin::new(discovery),
        HttpTransport::with_timeout(Duration::from_secs(1))?,
        HedgeConfig::aggressive(urls.len()),
    );
    let request = || LogicalRequest::get("http://service/hi");

    let run_start = Instant::now();
    let outcomes: Vec<(usize, Duration, Result<(), String>)> = stream::iter(0..TOTAL_CALLS)
        .map(|idx| {
            let client = client.clone();
            async move {
                let start = Instant::now();
                let result = match request() {
                    Ok(req) => client.hedge(req).await.map(|_| ()).map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                (idx, start.elapsed(), result)
            }
        })
        .buffer_unordered(CONCURRENCY)
        .collect()
        .await;
    let wall = run_start.elapsed();

    let mut latencies = Vec::with_capacity(outcomes.len());
    for (idx, latency, result) in &outcomes {
        match result {
            Ok(()) => latencies.push(*latency),
            Err(error) => println!("[call {idx:05}] failed after {latency:?}: {error}"),
        }
    }
    latencies.sort();

    println!("\n--- {TOTAL_CALLS} hedged calls in {wall:?} ---");
    println!("ok      : {}", latencies.len());
    println!("failed  : {}", outcomes.len() - latencies.len());
    if let (Some(first), Some(last)) = (latencies.first(), latencies.last()) {
        let at = |q: f64| latencies[((latencies.len() - 1) as f64 * q) as usize];
        println!("min/p50 : {first:?} / {:?}", at(0.50));
        println!("p99/max : {:?} / {last:?}", at(0.99));
    }

    let mut per_instance: Vec<_> = client.instance_stats().into_iter().collect();
    per_instance.sort_by(|a, b| b.1.wins.cmp(&a.1.wins));
    for (instance, stats) in per_instance {
        println!(
            "{instance:>30}  wins {:6}  avg {:8.3} ms  errors {}",
            stats.wins, stats.avg_latency_ms, stats.errors,
        );
    }

    Ok(())
}
