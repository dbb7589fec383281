use std::{
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
};

use http::Uri;
use rand::Rng;

use crate::{discovery::Discovery, errors::RewriteError, instance::ServiceInstance};

/// Picks one instance of a service per call.
///
/// Implementations may return the same instance on consecutive calls; the hedging
/// client deduplicates and bounds how often it asks.
pub trait LoadBalancer: Send + Sync {
    /// Chooses an instance of `service`, or `None` if it has no replicas.
    fn choose(&self, service: &str) -> impl Future<Output = Option<ServiceInstance>> + Send;

    /// Resolves `original` against `instance`.
    fn reconstruct_uri(
        &self,
        instance: &ServiceInstance,
        original: &Uri,
    ) -> Result<Uri, RewriteError> {
        reconstruct_uri(instance, original)
    }
}

/// Replaces scheme and authority of `original` with the instance's, keeping path and query.
pub fn reconstruct_uri(instance: &ServiceInstance, original: &Uri) -> Result<Uri, RewriteError> {
    let invalid = |reason: String| RewriteError::InvalidInstanceAddress {
        address: instance.address().to_string(),
        reason,
    };

    if instance.scheme.is_empty() {
        return Err(invalid("empty scheme".to_string()));
    }
    if instance.host.is_empty() {
        return Err(invalid("empty host".to_string()));
    }

    // IPv6 literals need brackets inside an authority.
    let authority = if instance.host.contains(':') && !instance.host.starts_with('[') {
        format!("[{}]:{}", instance.host, instance.port)
    } else {
        format!("{}:{}", instance.host, instance.port)
    };
    let path_and_query = original.path_and_query().map_or("/", |pq| pq.as_str());

    Uri::builder()
        .scheme(instance.scheme.as_str())
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| invalid(e.to_string()))
}

/// Cycles through the discovered instances in order.
#[derive(Debug)]
pub struct RoundRobin<D> {
    discovery: D,
    cursor: AtomicUsize,
}

impl<D: Discovery> RoundRobin<D> {
    pub fn new(discovery: D) -> Self {
        Self {
            discovery,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl<D: Discovery> LoadBalancer for RoundRobin<D> {
    async fn choose(&self, service: &str) -> Option<ServiceInstance> {
        let instances = self.discovery.list_instances(service).await;
        if instances.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % instances.len();
        instances.into_iter().nth(idx)
    }
}

/// Picks a uniformly random discovered instance.
#[derive(Debug)]
pub struct RandomChoice<D> {
    discovery: D,
}

impl<D: Discovery> RandomChoice<D> {
    pub fn new(discovery: D) -> Self {
        Self { discovery }
    }
}

impl<D: Discovery> LoadBalancer for RandomChoice<D> {
    async fn choose(&self, service: &str) -> Option<ServiceInstance> {
        let instances = self.discovery.list_instances(service).await;
        if instances.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..instances.len());
        instances.into_iter().nth(idx)
    }
}
