use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    balancer::LoadBalancer,
    config::HedgeConfig,
    discovery::Discovery,
    errors::{AttemptError, HedgedError, RewriteError},
    instance::InstanceAddress,
    racer::race,
    request::{rewrite, LogicalRequest},
    selector::select_instances,
    transport::Transport,
};

#[derive(Debug, Default)]
struct InstanceStats {
    wins: u64,
    total_latency_ms: f64,
    errors: u64,
}

/// Snapshot of instance performance statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceStatsSnapshot {
    /// Number of times this instance won the race.
    pub wins: u64,
    /// Average latency in milliseconds for winning calls.
    pub avg_latency_ms: f64,
    /// Attempts against this instance that failed in a call nobody won, or that were
    /// still running when the call hit its overall timeout.
    pub errors: u64,
}

/// Hedges requests across the replicas of a load-balanced service.
///
/// Every call selects up to `desired_width` distinct instances through the load
/// balancer, sends the request to all of them at once and returns the first successful
/// response. Attempts that lose the race are cancelled.
pub struct HedgedClient<D, L, T> {
    discovery: Arc<D>,
    balancer: Arc<L>,
    transport: Arc<T>,
    cfg: HedgeConfig,
    stats: Arc<Mutex<HashMap<InstanceAddress, InstanceStats>>>,
}

impl<D, L, T> Clone for HedgedClient<D, L, T> {
    fn clone(&self) -> Self {
        Self {
            discovery: Arc::clone(&self.discovery),
            balancer: Arc::clone(&self.balancer),
            transport: Arc::clone(&self.transport),
            cfg: self.cfg.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<D, L, T> HedgedClient<D, L, T>
where
    D: Discovery,
    L: LoadBalancer,
    T: Transport,
{
    /// Creates a hedging client from its three collaborators and a configuration.
    ///
    /// # Example
    /// ```no_run
    /// use std::sync::Arc;
    /// use hedging_client::{HedgeConfig, HedgedClient, HttpTransport, RoundRobin, StaticDiscovery};
    ///
    /// let urls = ["http://10.0.0.1:8080", "http://10.0.0.2:8080", "http://10.0.0.3:8080"];
    /// let discovery = Arc::new(StaticDiscovery::new().with_urls("service", urls).unwrap());
    ///
    /// let client = HedgedClient::new(
    ///     Arc::clone(&discovery),
    ///     RoundRobin::new(discovery),
    ///     HttpTransport::new(),
    ///     HedgeConfig::default(),
    /// );
    /// ```
    pub fn new(discovery: D, balancer: L, transport: T, cfg: HedgeConfig) -> Self {
        Self {
            discovery: Arc::new(discovery),
            balancer: Arc::new(balancer),
            transport: Arc::new(transport),
            cfg,
            stats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &HedgeConfig {
        &self.cfg
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Returns a snapshot of accumulated statistics for every instance seen so far.
    pub fn instance_stats(&self) -> HashMap<InstanceAddress, InstanceStatsSnapshot> {
        let Ok(stats) = self.stats.lock() else {
            return HashMap::new();
        };

        stats
            .iter()
            .map(|(address, s)| {
                let avg = if s.wins > 0 {
                    s.total_latency_ms / (s.wins as f64)
                } else {
                    0.0
                };

                (
                    address.clone(),
                    InstanceStatsSnapshot {
                        wins: s.wins,
                        avg_latency_ms: avg,
                        errors: s.errors,
                    },
                )
            })
            .collect()
    }

    pub fn reset_stats(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.clear();
        }
    }

    /// Hedges `request` with the client's configuration.
    ///
    /// Returns the winning response along with the address of the instance that sent it.
    pub async fn hedge(
        &self,
        request: LogicalRequest,
    ) -> Result<(InstanceAddress, T::Response), HedgedError> {
        self.hedge_with(request, &self.cfg).await
    }

    /// Hedges `request`, returning only the response.
    pub async fn hedge_any(&self, request: LogicalRequest) -> Result<T::Response, HedgedError> {
        let (_address, response) = self.hedge(request).await?;
        Ok(response)
    }

    /// Hedges `request` until it completes or `cancel` fires.
    ///
    /// Cancelling before any instance answered cancels every outstanding attempt and
    /// yields [`HedgedError::Cancelled`].
    pub async fn hedge_until(
        &self,
        request: LogicalRequest,
        cancel: &CancellationToken,
    ) -> Result<(InstanceAddress, T::Response), HedgedError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HedgedError::Cancelled),
            outcome = self.hedge(request) => outcome,
        }
    }

    /// Hedges `request` with a per-call configuration, e.g. a different width.
    pub async fn hedge_with(
        &self,
        request: LogicalRequest,
        cfg: &HedgeConfig,
    ) -> Result<(InstanceAddress, T::Response), HedgedError> {
        cfg.validate()?;
        let service = request
            .service_name()
            .ok_or_else(|| HedgedError::MissingServiceName(request.uri().clone()))?
            .to_string();
        if !request.payload().is_replayable() {
            return Err(HedgedError::UnreplayableBody);
        }

        let start = Instant::now();
        let mut selected = Vec::new();
        let hedging = self.dispatch(&request, &service, cfg, &mut selected);

        let outcome = match cfg.overall_timeout {
            Some(limit) => time::timeout(limit, hedging)
                .await
                .unwrap_or(Err(HedgedError::Timeout(limit))),
            None => hedging.await,
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match &outcome {
            Ok((winner, _)) => {
                info!(service = %service, %winner, elapsed_ms, "hedged call won");
                self.record_win(winner, elapsed_ms);
            }
            Err(HedgedError::AllFailed(failures)) => {
                warn!(service = %service, attempts = failures.len(), "all hedged attempts failed");
                self.record_errors(failures.iter().map(|(address, _)| address));
            }
            Err(HedgedError::Timeout(limit)) => {
                let attempts = selected.len();
                warn!(service = %service, ?limit, attempts, "hedged call timed out");
                self.record_errors(selected.iter());
            }
            Err(err) => warn!(service = %service, error = %err, "hedged call failed"),
        }

        outcome
    }

    async fn dispatch(
        &self,
        request: &LogicalRequest,
        service: &str,
        cfg: &HedgeConfig,
        selected: &mut Vec<InstanceAddress>,
    ) -> Result<(InstanceAddress, T::Response), HedgedError> {
        let instances = select_instances(
            &*self.discovery,
            &*self.balancer,
            service,
            cfg.desired_width,
            cfg.selection_budget,
        )
        .await?;
        selected.extend(instances.addresses());

        let mut physical = Vec::with_capacity(instances.len());
        let mut skipped = Vec::new();
        for instance in &instances {
            match rewrite(request, instance, &*self.balancer) {
                Ok(rewritten) => physical.push(rewritten),
                Err(RewriteError::InvalidInstanceAddress { address, reason }) => {
                    warn!(%address, %reason, "skipping instance with invalid address");
                    skipped.push((
                        instance.address(),
                        AttemptError::InvalidInstanceAddress { reason },
                    ));
                }
                Err(RewriteError::UnreplayableBody) => return Err(HedgedError::UnreplayableBody),
            }
        }

        race(&self.transport, physical, skipped).await
    }

    fn record_win(&self, winner: &InstanceAddress, elapsed_ms: f64) {
        if let Ok(mut stats) = self.stats.lock() {
            let entry = stats.entry(winner.clone()).or_default();
            entry.wins += 1;
            entry.total_latency_ms += elapsed_ms;
        }
    }

    fn record_errors<'a>(&self, addresses: impl Iterator<Item = &'a InstanceAddress>) {
        if let Ok(mut stats) = self.stats.lock() {
            for address in addresses {
                stats.entry(address.clone()).or_default().errors += 1;
            }
        }
    }
}
