use std::{collections::BTreeMap, fmt};

use http::Uri;

use crate::errors::RewriteError;

/// Canonical `scheme://host:port` address of one replica.
///
/// Two instances with the same address are the same physical endpoint, whatever
/// metadata they carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceAddress(pub String);

impl InstanceAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// One concrete, addressable replica of a logical service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    /// Logical service this replica belongs to.
    pub service_id: String,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Free-form registry metadata (zone, version, ...).
    pub metadata: BTreeMap<String, String>,
}

impl ServiceInstance {
    pub fn new(
        service_id: impl Into<String>,
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            scheme: scheme.into(),
            host: host.into(),
            port,
            metadata: BTreeMap::new(),
        }
    }

    /// Builds an instance from a base URL such as `http://10.0.0.7:8080`.
    ///
    /// The port defaults to 80/443 from the scheme when absent.
    pub fn from_url(service_id: impl Into<String>, url: &str) -> Result<Self, RewriteError> {
        let invalid = |reason: &str| RewriteError::InvalidInstanceAddress {
            address: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.parse().map_err(|_| invalid("not a valid URI"))?;
        let scheme = uri.scheme_str().ok_or_else(|| invalid("missing scheme"))?;
        let host = uri.host().ok_or_else(|| invalid("missing host"))?;
        let port = match (uri.port_u16(), scheme) {
            (Some(port), _) => port,
            (None, "https") => 443,
            (None, _) => 80,
        };

        Ok(Self::new(service_id, scheme, host, port))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Canonical address used to deduplicate instances.
    pub fn address(&self) -> InstanceAddress {
        InstanceAddress(format!("{}://{}:{}", self.scheme, self.host, self.port))
    }
}

/// Ordered, duplicate-free set of instances chosen for one hedged request.
///
/// Only the instance selector builds these; once built the set is read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSet {
    instances: Vec<ServiceInstance>,
}

impl InstanceSet {
    pub(crate) fn new(instances: Vec<ServiceInstance>) -> Self {
        Self { instances }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServiceInstance> {
        self.instances.iter()
    }

    /// Canonical addresses in selection order.
    pub fn addresses(&self) -> Vec<InstanceAddress> {
        self.instances.iter().map(ServiceInstance::address).collect()
    }
}

impl<'a> IntoIterator for &'a InstanceSet {
    type Item = &'a ServiceInstance;
    type IntoIter = std::slice::Iter<'a, ServiceInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.iter()
    }
}
