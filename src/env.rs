//! Environment configuration utilities for loading service instances from environment variables.

use std::{env, sync::Arc, time::Duration};

use color_eyre::{eyre::WrapErr, Result};
use hedging_client::{
    HedgeConfig, HedgedClient, HttpTransport, RoundRobin, ServiceInstance, StaticDiscovery,
};

/// Client type driven by the dashboard.
pub type DashClient =
    HedgedClient<Arc<StaticDiscovery>, RoundRobin<Arc<StaticDiscovery>>, HttpTransport>;

/// Target the dashboard hedges against.
#[derive(Debug, Clone)]
pub struct Target {
    pub service: String,
    pub path: String,
    pub instances: Vec<ServiceInstance>,
}

impl Target {
    /// Logical URI for the configured service and path.
    pub fn logical_uri(&self) -> String {
        format!("http://{}{}", self.service, self.path)
    }
}

/// Reads the hedging target from the environment.
///
/// Looks for the following environment variables:
/// - `HEDGE_INSTANCES` (required): comma separated base URLs of the replicas
/// - `HEDGE_SERVICE`: logical service name, defaults to `service`
/// - `HEDGE_PATH`: request path, defaults to `/hi`
///
/// Returns an error if no instances are configured.
pub fn target_from_env() -> Result<Target> {
    let service = env::var("HEDGE_SERVICE").unwrap_or_else(|_| "service".to_string());
    let path = env::var("HEDGE_PATH").unwrap_or_else(|_| "/hi".to_string());
    let raw = env::var("HEDGE_INSTANCES").unwrap_or_default();

    let instances = raw
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| ServiceInstance::from_url(service.as_str(), url))
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("HEDGE_INSTANCES contains an invalid URL")?;

    if instances.is_empty() {
        color_eyre::eyre::bail!(
            "No instances configured.\n\
             Set HEDGE_INSTANCES to a comma separated list, e.g. \
             HEDGE_INSTANCES=http://127.0.0.1:8081,http://127.0.0.1:8082"
        );
    }

    Ok(Target {
        service,
        path,
        instances,
    })
}

/// Hedge width from `HEDGE_WIDTH`, clamped to the number of instances.
pub fn width_from_env(instances: usize) -> usize {
    env::var("HEDGE_WIDTH")
        .ok()
        .and_then(|w| w.parse::<usize>().ok())
        .unwrap_or(instances.min(3))
        .clamp(1, instances.max(1))
}

/// Clients the dashboard calls through, all sharing one connection pool.
#[derive(Clone)]
pub struct Clients {
    /// Hedges across every instance of the target.
    pub hedged: DashClient,
    /// One width-1 client per instance, in the target's order.
    pub direct: Vec<DashClient>,
}

/// Builds the hedged client and the per-instance direct clients for `target`.
pub fn build_clients(target: &Target, desired_width: usize) -> Result<Clients> {
    let transport = HttpTransport::with_timeout(Duration::from_secs(2))?;

    let hedged = client_over(&target.instances, desired_width, transport.clone());
    let direct = target
        .instances
        .iter()
        .map(|instance| client_over(std::slice::from_ref(instance), 1, transport.clone()))
        .collect();

    Ok(Clients { hedged, direct })
}

fn client_over(
    instances: &[ServiceInstance],
    desired_width: usize,
    transport: HttpTransport,
) -> DashClient {
    let discovery = Arc::new(
        instances
            .iter()
            .cloned()
            .fold(StaticDiscovery::new(), StaticDiscovery::register),
    );
    let cfg = HedgeConfig::with_width(desired_width).timeout(Duration::from_secs(3));

    HedgedClient::new(
        Arc::clone(&discovery),
        RoundRobin::new(discovery),
        transport,
        cfg,
    )
}
