use std::collections::HashSet;

use tracing::{debug, warn};

use crate::{
    balancer::LoadBalancer,
    discovery::Discovery,
    errors::HedgedError,
    instance::{InstanceSet, ServiceInstance},
};

/// Assembles the distinct instances a hedged request will race.
///
/// Fails with [`HedgedError::InsufficientInstances`] before touching the balancer when
/// discovery knows fewer than `desired_width` replicas. Otherwise polls the balancer at
/// most `selection_budget` times, keeping the first occurrence of every canonical
/// address, and stops as soon as `desired_width` distinct instances are collected. A
/// spent budget yields a narrower set rather than an error.
pub async fn select_instances<D, L>(
    discovery: &D,
    balancer: &L,
    service: &str,
    desired_width: usize,
    selection_budget: usize,
) -> Result<InstanceSet, HedgedError>
where
    D: Discovery,
    L: LoadBalancer,
{
    if service.is_empty() {
        return Err(HedgedError::InvalidConfig("service name must not be empty"));
    }
    if desired_width == 0 {
        return Err(HedgedError::InvalidConfig("desired width must be at least 1"));
    }
    if selection_budget < desired_width {
        return Err(HedgedError::InvalidConfig(
            "selection budget must be at least the desired width",
        ));
    }

    let known = discovery.list_instances(service).await.len();
    if known < desired_width {
        return Err(HedgedError::InsufficientInstances {
            service: service.to_string(),
            known,
            required: desired_width,
        });
    }

    let mut seen = HashSet::with_capacity(desired_width);
    let mut chosen: Vec<ServiceInstance> = Vec::with_capacity(desired_width);
    let mut polls = 0;

    while chosen.len() < desired_width && polls < selection_budget {
        polls += 1;
        let instance = balancer
            .choose(service)
            .await
            .ok_or_else(|| HedgedError::NoInstanceChosen {
                service: service.to_string(),
            })?;

        let address = instance.address();
        if seen.insert(address.clone()) {
            debug!(service, %address, "adding instance");
            chosen.push(instance);
        }
    }

    if chosen.is_empty() {
        return Err(HedgedError::InsufficientInstances {
            service: service.to_string(),
            known,
            required: desired_width,
        });
    }
    if chosen.len() < desired_width {
        warn!(
            service,
            selected = chosen.len(),
            desired_width,
            polls,
            "selection budget exhausted, hedging across fewer instances"
        );
    }

    Ok(InstanceSet::new(chosen))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use rstest::rstest;

    use super::*;
    use crate::{discovery::StaticDiscovery, instance::InstanceAddress};

    /// Balancer that replays a fixed sequence of hosts and counts polls.
    struct Scripted {
        script: Mutex<VecDeque<&'static str>>,
        polls: AtomicUsize,
    }

    impl Scripted {
        fn new(hosts: &[&'static str]) -> Self {
            Self {
                script: Mutex::new(hosts.iter().copied().collect()),
                polls: AtomicUsize::new(0),
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    impl LoadBalancer for Scripted {
        async fn choose(&self, service: &str) -> Option<ServiceInstance> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let host = self.script.lock().unwrap().pop_front()?;
            Some(ServiceInstance::new(service, "http", host, 80))
        }
    }

    fn registry(hosts: &[&str]) -> StaticDiscovery {
        hosts.iter().fold(StaticDiscovery::new(), |d, host| {
            d.register(ServiceInstance::new("svc", "http", *host, 80))
        })
    }

    fn hosts(set: &InstanceSet) -> Vec<String> {
        set.iter().map(|i| i.host.clone()).collect()
    }

    #[tokio::test]
    async fn skips_duplicates_in_selection_order() {
        let discovery = registry(&["A", "B", "C", "D"]);
        let balancer = Scripted::new(&["B", "A", "B", "C", "D", "A"]);

        let set = select_instances(&discovery, &balancer, "svc", 3, 6).await.unwrap();

        assert_eq!(hosts(&set), ["B", "A", "C"]);
        assert_eq!(balancer.polls(), 4);
    }

    #[rstest]
    #[case::all_identical(&["A", "A", "A", "A", "A", "A"], 3, 6, 1, 6)]
    #[case::all_distinct(&["A", "B", "C", "D"], 3, 6, 3, 3)]
    #[case::interleaved(&["A", "B", "A", "B", "A", "C"], 3, 6, 3, 6)]
    #[case::budget_cuts_short(&["A", "A", "B", "C"], 3, 3, 2, 3)]
    #[case::width_one(&["C", "A"], 1, 2, 1, 1)]
    #[tokio::test]
    async fn width_and_budget_bounds(
        #[case] script: &[&'static str],
        #[case] width: usize,
        #[case] budget: usize,
        #[case] expected_len: usize,
        #[case] expected_polls: usize,
    ) {
        let discovery = registry(&["A", "B", "C", "D"]);
        let balancer = Scripted::new(script);

        let set = select_instances(&discovery, &balancer, "svc", width, budget)
            .await
            .unwrap();

        let unique: HashSet<InstanceAddress> = set.addresses().into_iter().collect();
        assert_eq!(unique.len(), set.len());
        assert_eq!(set.len(), expected_len);
        assert!(set.len() >= 1 && set.len() <= width);
        assert_eq!(balancer.polls(), expected_polls);
        assert!(balancer.polls() <= budget);
    }

    #[tokio::test]
    async fn too_few_replicas_fails_without_polling() {
        let discovery = registry(&["A", "B"]);
        let balancer = Scripted::new(&["A", "B"]);

        let err = select_instances(&discovery, &balancer, "svc", 3, 6).await.unwrap_err();

        assert!(matches!(
            err,
            HedgedError::InsufficientInstances { known: 2, required: 3, .. }
        ));
        assert_eq!(balancer.polls(), 0);
    }

    #[tokio::test]
    async fn balancer_returning_nothing_is_fatal() {
        let discovery = registry(&["A", "B", "C"]);
        let balancer = Scripted::new(&["A"]);

        let err = select_instances(&discovery, &balancer, "svc", 3, 6).await.unwrap_err();

        assert!(matches!(err, HedgedError::NoInstanceChosen { .. }));
        assert_eq!(balancer.polls(), 2);
    }

    #[tokio::test]
    async fn rejects_unrunnable_parameters() {
        let discovery = registry(&["A"]);
        let balancer = Scripted::new(&["A"]);

        for (service, width, budget) in [("svc", 0, 0), ("svc", 2, 1), ("", 1, 2)] {
            let err = select_instances(&discovery, &balancer, service, width, budget)
                .await
                .unwrap_err();
            assert!(matches!(err, HedgedError::InvalidConfig(_)));
        }
        assert_eq!(balancer.polls(), 0);
    }
}
