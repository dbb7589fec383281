//! Side-by-side comparison of hedged and direct dispatch.
//!
//! Runs two runners against the same simulated pool of five replicas, one of which is
//! occasionally very slow. Runner "direct" sends each call to a single instance, runner
//! "hedged" races three. No network is involved, so the example runs anywhere.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use hedging_client::{
    BoxError, CancellationToken, HedgeConfig, HedgedClient, InstanceAddress, LogicalRequest,
    PhysicalRequest, RandomChoice, ServiceInstance, StaticDiscovery, Transport,
};
use rand::Rng;

const CALLS_PER_RUNNER: usize = 2_000;

/// Answers in 2-8ms, except that each call has a 5% chance of stalling for 200ms.
struct SimulatedPool;

impl Transport for SimulatedPool {
    type Response = String;

    async fn send(
        &self,
        request: PhysicalRequest,
        cancel: CancellationToken,
    ) -> Result<String, BoxError> {
        let delay = {
            let mut rng = rand::rng();
            if rng.random_bool(0.05) {
                Duration::from_millis(200)
            } else {
                Duration::from_millis(rng.random_range(2..=8))
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err("cancelled".into()),
            _ = tokio::time::sleep(delay) => Ok(format!("hello from {}", request.instance)),
        }
    }
}

#[derive(Debug)]
struct RunnerStats {
    label: &'static str,
    errors: usize,
    latencies: Vec<Duration>,
    wins: HashMap<InstanceAddress, usize>,
}

impl RunnerStats {
    fn percentile(&self, p: f64) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        self.latencies[((self.latencies.len() - 1) as f64 * p) as usize]
    }
}

type SimClient =
    HedgedClient<Arc<StaticDiscovery>, RandomChoice<Arc<StaticDiscovery>>, SimulatedPool>;

async fn run_runner(label: &'static str, client: SimClient) -> anyhow::Result<RunnerStats> {
    let mut stats = RunnerStats {
        label,
        errors: 0,
        latencies: Vec::with_capacity(CALLS_PER_RUNNER),
        wins: HashMap::new(),
    };

    for _ in 0..CALLS_PER_RUNNER {
        let start = Instant::now();
        match client.hedge(LogicalRequest::get("http://pool/hello")?).await {
            Ok((instance, _body)) => {
                stats.latencies.push(start.elapsed());
                *stats.wins.entry(instance).or_insert(0) += 1;
            }
            Err(_) => stats.errors += 1,
        }
    }

    stats.latencies.sort();
    Ok(stats)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("error").init();

    let discovery = Arc::new((1..=5).fold(StaticDiscovery::new(), |d, n| {
        d.register(ServiceInstance::new("pool", "http", format!("replica-{n}"), 8080))
    }));

    let direct = HedgedClient::new(
        Arc::clone(&discovery),
        RandomChoice::new(Arc::clone(&discovery)),
        SimulatedPool,
        HedgeConfig::single(),
    );
    let hedged = HedgedClient::new(
        Arc::clone(&discovery),
        RandomChoice::new(discovery),
        SimulatedPool,
        HedgeConfig::with_width(3),
    );

    let runner_direct = tokio::spawn(run_runner("direct", direct));
    let runner_hedged = tokio::spawn(run_runner("hedged", hedged));

    let stats_direct = runner_direct.await??;
    let stats_hedged = runner_hedged.await??;

    println!("\n=== comparison ===");
    for stats in [&stats_direct, &stats_hedged] {
        println!(
            "Runner {:>6}: calls={}, errors={}, p50={:?}, p99={:?}, max={:?}",
            stats.label,
            CALLS_PER_RUNNER,
            stats.errors,
            stats.percentile(0.50),
            stats.percentile(0.99),
            stats.percentile(1.0),
        );
        let mut wins: Vec<_> = stats.wins.iter().collect();
        wins.sort();
        for (instance, count) in wins {
            println!("  [{}] wins from {} = {}", stats.label, instance, count);
        }
    }

    let direct_p99 = stats_direct.percentile(0.99);
    let hedged_p99 = stats_hedged.percentile(0.99);
    if hedged_p99 < direct_p99 {
        println!("\n=> hedging cut p99 by {:?}", direct_p99 - hedged_p99);
    } else {
        println!("\n=> no p99 improvement this run");
    }

    Ok(())
}
