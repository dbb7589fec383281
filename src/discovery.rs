use std::{collections::HashMap, future::Future, sync::Arc};

use crate::{errors::RewriteError, instance::ServiceInstance};

/// Resolves a logical service name to the replicas currently known for it.
pub trait Discovery: Send + Sync {
    /// Returns the known instances of `service`. May be empty.
    fn list_instances(&self, service: &str) -> impl Future<Output = Vec<ServiceInstance>> + Send;
}

impl<D: Discovery> Discovery for Arc<D> {
    fn list_instances(&self, service: &str) -> impl Future<Output = Vec<ServiceInstance>> + Send {
        (**self).list_instances(service)
    }
}

/// Fixed registry built up front, e.g. from configuration or environment variables.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    services: HashMap<String, Vec<ServiceInstance>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `instance` under its own service id.
    pub fn register(mut self, instance: ServiceInstance) -> Self {
        self.services
            .entry(instance.service_id.clone())
            .or_default()
            .push(instance);
        self
    }

    /// Registers every base URL in `urls` as a replica of `service`.
    pub fn with_urls<I, U>(mut self, service: &str, urls: I) -> Result<Self, RewriteError>
    where
        I: IntoIterator<Item = U>,
        U: AsRef<str>,
    {
        for url in urls {
            self = self.register(ServiceInstance::from_url(service, url.as_ref())?);
        }
        Ok(self)
    }

    /// Number of replicas registered for `service`.
    pub fn count(&self, service: &str) -> usize {
        self.services.get(service).map_or(0, Vec::len)
    }
}

impl Discovery for StaticDiscovery {
    async fn list_instances(&self, service: &str) -> Vec<ServiceInstance> {
        self.services.get(service).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_the_requested_service() {
        let discovery = StaticDiscovery::new()
            .with_urls("orders", ["http://a:1", "http://b:2"])
            .unwrap()
            .with_urls("users", ["http://c:3"])
            .unwrap();

        let orders = discovery.list_instances("orders").await;
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|i| i.service_id == "orders"));
        assert_eq!(discovery.count("users"), 1);
        assert!(discovery.list_instances("billing").await.is_empty());
    }

    #[tokio::test]
    async fn arc_delegates() {
        let discovery = StaticDiscovery::new()
            .with_urls("orders", ["http://a:1"])
            .unwrap();
        let discovery = Arc::new(discovery);
        assert_eq!(discovery.list_instances("orders").await.len(), 1);
    }
}
