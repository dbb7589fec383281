use std::sync::Arc;

use futures::{stream::FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    errors::{AttemptError, HedgedError},
    instance::InstanceAddress,
    request::PhysicalRequest,
    transport::Transport,
};

/// One in-flight request bound to one instance.
///
/// Dropping an attempt that has not settled cancels it, so abandoning the race (caller
/// timeout, caller cancellation, dropped future) never leaves work running unsignalled.
struct Attempt {
    address: InstanceAddress,
    cancel: CancellationToken,
    settled: bool,
}

impl Attempt {
    fn cancel(&mut self) {
        if !self.settled {
            self.settled = true;
            self.cancel.cancel();
        }
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Races `requests` concurrently and returns the first success.
///
/// Each request runs in its own task with its own cancellation token. As soon as one
/// attempt succeeds, every attempt still in flight is cancelled; the racer does not wait
/// for the losers to wind down. `failures` carries attempts that never got off the
/// ground (e.g. an unusable instance address) so the aggregate error accounts for every
/// instance of the set.
pub async fn race<T>(
    transport: &Arc<T>,
    requests: Vec<PhysicalRequest>,
    mut failures: Vec<(InstanceAddress, AttemptError)>,
) -> Result<(InstanceAddress, T::Response), HedgedError>
where
    T: Transport,
{
    let mut attempts = Vec::with_capacity(requests.len());
    let mut in_flight = FuturesUnordered::new();

    for (idx, request) in requests.into_iter().enumerate() {
        let cancel = CancellationToken::new();
        let address = request.instance.clone();
        debug!(%address, uri = %request.uri, "launching attempt");

        let handle = tokio::spawn({
            let transport = Arc::clone(transport);
            let cancel = cancel.clone();
            async move { transport.send(request, cancel).await }
        });

        attempts.push(Attempt {
            address,
            cancel,
            settled: false,
        });
        in_flight.push(async move { (idx, handle.await) });
    }

    while let Some((idx, joined)) = in_flight.next().await {
        attempts[idx].settled = true;
        let address = attempts[idx].address.clone();

        match joined {
            Ok(Ok(response)) => {
                for loser in attempts.iter_mut().filter(|a| !a.settled) {
                    debug!(address = %loser.address, "cancelling losing attempt");
                    loser.cancel();
                }
                return Ok((address, response));
            }
            Ok(Err(err)) => {
                warn!(%address, error = %err, "attempt failed");
                failures.push((address, AttemptError::Transport(err)));
            }
            Err(join_err) => {
                warn!(%address, error = %join_err, "attempt aborted");
                failures.push((address, AttemptError::Aborted(join_err.to_string())));
            }
        }
    }

    Err(HedgedError::AllFailed(failures))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Mutex, time::Duration};

    use http::{HeaderMap, Method};
    use tokio::time;

    use super::*;
    use crate::{errors::BoxError, request::Body};

    /// Answers after `port` milliseconds; hosts starting with `ok` succeed, `boom` panics.
    #[derive(Default)]
    struct PortDelay {
        cancelled: Mutex<Vec<String>>,
    }

    impl Transport for PortDelay {
        type Response = String;

        async fn send(
            &self,
            request: PhysicalRequest,
            cancel: CancellationToken,
        ) -> Result<String, BoxError> {
            let host = request.uri.host().unwrap_or_default().to_string();
            let delay = Duration::from_millis(u64::from(request.uri.port_u16().unwrap_or(0)));

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancelled.lock().unwrap().push(host);
                    Err("cancelled".into())
                }
                _ = time::sleep(delay) => {
                    if host.starts_with("boom") {
                        panic!("transport blew up");
                    }
                    if host.starts_with("ok") {
                        Ok(host)
                    } else {
                        Err(format!("{host} refused").into())
                    }
                }
            }
        }
    }

    fn request(host: &str, delay_ms: u16) -> PhysicalRequest {
        PhysicalRequest {
            instance: InstanceAddress(format!("http://{host}:{delay_ms}")),
            method: Method::GET,
            uri: format!("http://{host}:{delay_ms}/hi").parse().unwrap(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            attributes: BTreeMap::new(),
            body: Body::Empty,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn earliest_success_wins_over_earlier_failure() {
        let transport = Arc::new(PortDelay::default());
        let requests = vec![request("bad", 5), request("ok-slow", 30), request("ok-fast", 10)];

        let (winner, body) = race(&transport, requests, Vec::new()).await.unwrap();

        assert_eq!(winner.as_str(), "http://ok-fast:10");
        assert_eq!(body, "ok-fast");

        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*transport.cancelled.lock().unwrap(), ["ok-slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn every_failure_is_reported() {
        let transport = Arc::new(PortDelay::default());
        let requests = vec![request("bad-a", 5), request("bad-b", 7)];
        let skipped = vec![(
            InstanceAddress("http://:80".into()),
            AttemptError::InvalidInstanceAddress {
                reason: "empty host".into(),
            },
        )];

        let err = race(&transport, requests, skipped).await.unwrap_err();

        let failures = match err {
            HedgedError::AllFailed(failures) => failures,
            other => panic!("expected AllFailed, got {other:?}"),
        };
        let addresses: Vec<_> = failures.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(addresses, ["http://:80", "http://bad-a:5", "http://bad-b:7"]);
        assert!(transport.cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_attempt_is_recorded_as_aborted() {
        let transport = Arc::new(PortDelay::default());
        let requests = vec![request("boom", 1), request("ok", 20)];

        let (winner, _) = race(&transport, requests, Vec::new()).await.unwrap();
        assert_eq!(winner.as_str(), "http://ok:20");

        let err = race(&transport, vec![request("boom", 1)], Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            HedgedError::AllFailed(ref f) if matches!(f[0].1, AttemptError::Aborted(_))
        ));
    }

    #[tokio::test]
    async fn nothing_to_race_is_an_empty_aggregate() {
        let transport = Arc::new(PortDelay::default());
        let err = race(&transport, Vec::new(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, HedgedError::AllFailed(ref f) if f.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_race_cancels_everything() {
        let transport = Arc::new(PortDelay::default());
        let requests = vec![request("ok-a", 50), request("ok-b", 60)];

        let racing = race(&transport, requests, Vec::new());
        let outcome = time::timeout(Duration::from_millis(10), racing).await;
        assert!(outcome.is_err());

        time::sleep(Duration::from_millis(1)).await;
        let mut cancelled = transport.cancelled.lock().unwrap().clone();
        cancelled.sort();
        assert_eq!(cancelled, ["ok-a", "ok-b"]);
    }
}
