//! Basic example demonstrating a hedged HTTP request.
//!
//! Reads the replicas of one service from `HEDGE_INSTANCES`, races a `GET` across
//! three of them and prints who answered first.

use std::{env, sync::Arc, time::Instant};

use hedging_client::{
    HedgeConfig, HedgedClient, HttpTransport, LogicalRequest, RoundRobin, StaticDiscovery,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("hedging_client=debug")
        .init();

    let raw = env::var("HEDGE_INSTANCES").unwrap_or_default();
    let urls: Vec<&str> = raw.split(',').map(str::trim).filter(|u| !u.is_empty()).collect();

    if urls.is_empty() {
        eprintln!("No instances configured.");
        eprintln!(
            "Set HEDGE_INSTANCES, e.g. \
             HEDGE_INSTANCES=http://127.0.0.1:8081,http://127.0.0.1:8082,http://127.0.0.1:8083"
        );
        return Ok(());
    }

    eprintln!(
        "Using instances:\n{}",
        urls.iter()
            .map(|u| format!("- {u}"))
            .collect::<Vec<_>>()
            .join("\n")
    );

    let discovery = Arc::new(StaticDiscovery::new().with_urls("service", &urls)?);
    let width = urls.len().min(3);
    let client = HedgedClient::new(
        Arc::clone(&discovery),
        RoundRobin::new(discovery),
        HttpTransport::new(),
        HedgeConfig::with_width(width),
    );

    for round in 1..=3 {
        let start = Instant::now();
        let request = LogicalRequest::get("http://service/hi")?;
        match client.hedge(request).await {
            Ok((instance, response)) => println!(
                "[{round}] {} won in {:?}: status={} body={:?}",
                instance,
                start.elapsed(),
                response.status,
                String::from_utf8_lossy(&response.body)
            ),
            Err(e) => println!("[{round}] failed after {:?}: {e}", start.elapsed()),
        }
    }

    Ok(())
}
