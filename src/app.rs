//! Dashboard state: what is selected, how calls are dispatched, and what came back.

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use hedging_client::{InstanceAddress, InstanceStatsSnapshot};

use crate::env::{Clients, DashClient, Target};

const HISTORY_LEN: usize = 100;
const RATE_WINDOW: usize = 1000;
const BATCH_STEP: usize = 10;
const BATCH_MAX: usize = 1000;

/// How calls are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Race several instances (hedged requests).
    Hedged,
    /// Send to the selected instance only.
    SingleInstance,
}

/// HTTP method used for calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    /// `POST` with a small JSON payload, replayed to every raced instance.
    Post,
}

impl Method {
    pub fn as_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
        }
    }
}

/// Events emitted by background calls.
#[derive(Debug)]
pub enum AppEvent {
    CallFinished {
        instance: Option<InstanceAddress>,
        latency_ms: f64,
        ok: bool,
        message: String,
    },
}

/// Totals since start-up.
#[derive(Debug)]
pub struct Session {
    pub started: Instant,
    pub calls: u64,
    pub successes: u64,
    pub errors: u64,
    finished_at: VecDeque<Instant>,
}

impl Session {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            calls: 0,
            successes: 0,
            errors: 0,
            finished_at: VecDeque::with_capacity(RATE_WINDOW),
        }
    }

    fn record(&mut self, ok: bool) {
        self.calls += 1;
        if ok {
            self.successes += 1;
        } else {
            self.errors += 1;
        }
        if self.finished_at.len() == RATE_WINDOW {
            self.finished_at.pop_front();
        }
        self.finished_at.push_back(Instant::now());
    }
}

/// Repeated calls fired back to back.
#[derive(Debug)]
pub struct Batch {
    pub running: bool,
    pub size: usize,
    pub done: usize,
}

pub struct App {
    pub client: DashClient,
    /// Width-1 clients for single-instance mode, indexed like `instances`.
    pub direct: Vec<DashClient>,
    pub target: Target,
    pub instances: Vec<InstanceAddress>,
    pub selected_idx: usize,
    pub mode: Mode,
    pub method: Method,
    pub width: usize,
    pub last_message: String,
    pub last_instance: Option<InstanceAddress>,
    pub last_latency_ms: Option<f64>,
    pub stats_snapshot: HashMap<InstanceAddress, InstanceStatsSnapshot>,
    pub latency_history: HashMap<InstanceAddress, VecDeque<u64>>,
    pub session: Session,
    pub batch: Batch,
}

impl App {
    pub fn new(clients: Clients, target: Target) -> Self {
        let Clients { hedged: client, direct } = clients;
        let instances: Vec<InstanceAddress> =
            target.instances.iter().map(|i| i.address()).collect();
        let width = client.config().desired_width.clamp(1, instances.len().max(1));

        Self {
            client,
            direct,
            target,
            instances,
            selected_idx: 0,
            mode: Mode::Hedged,
            method: Method::Get,
            width,
            last_message: "Ready. 'r' runs one call, 'b' starts a batch".to_string(),
            last_instance: None,
            last_latency_ms: None,
            stats_snapshot: HashMap::new(),
            latency_history: HashMap::new(),
            session: Session::new(),
            batch: Batch {
                running: false,
                size: BATCH_STEP,
                done: 0,
            },
        }
    }

    pub fn select_next(&mut self) {
        if !self.instances.is_empty() {
            self.selected_idx = (self.selected_idx + 1) % self.instances.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.instances.is_empty() {
            let len = self.instances.len();
            self.selected_idx = (self.selected_idx + len - 1) % len;
        }
    }

    pub fn selected_instance(&self) -> Option<&InstanceAddress> {
        self.instances.get(self.selected_idx)
    }

    /// Widens or narrows the hedge, staying between one and the known instances.
    pub fn adjust_width(&mut self, delta: isize) {
        let max = self.instances.len().max(1);
        self.width = self.width.saturating_add_signed(delta).clamp(1, max);
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            Mode::Hedged => Mode::SingleInstance,
            Mode::SingleInstance => Mode::Hedged,
        };
    }

    pub fn toggle_method(&mut self) {
        self.method = match self.method {
            Method::Get => Method::Post,
            Method::Post => Method::Get,
        };
    }

    pub fn toggle_batch(&mut self) {
        self.batch.running = !self.batch.running;
        self.batch.done = 0;
        self.last_message = if self.batch.running {
            format!("Batch started: {} calls", self.batch.size)
        } else {
            "Batch stopped".to_string()
        };
    }

    pub fn resize_batch(&mut self, grow: bool) {
        self.batch.size = if grow {
            (self.batch.size + BATCH_STEP).min(BATCH_MAX)
        } else {
            self.batch.size.saturating_sub(BATCH_STEP).max(BATCH_STEP)
        };
    }

    pub fn wants_batch_call(&self) -> bool {
        self.batch.running && self.batch.done < self.batch.size
    }

    pub fn reset_stats(&mut self) {
        self.client.reset_stats();
        self.direct.iter().for_each(DashClient::reset_stats);
        self.stats_snapshot.clear();
        self.latency_history.clear();
        self.last_message = "Stats reset".to_string();
    }

    /// Folds a finished call into the per-instance table and the session totals.
    pub fn record_call(
        &mut self,
        instance: Option<InstanceAddress>,
        latency_ms: f64,
        ok: bool,
        message: String,
    ) {
        self.session.record(ok);

        if let Some(address) = &instance {
            let stats = self.stats_snapshot.entry(address.clone()).or_default();
            if ok {
                let total = stats.avg_latency_ms * stats.wins as f64 + latency_ms;
                stats.wins += 1;
                stats.avg_latency_ms = total / stats.wins as f64;

                let history = self.latency_history.entry(address.clone()).or_default();
                if history.len() == HISTORY_LEN {
                    history.pop_front();
                }
                history.push_back(latency_ms as u64);
            } else {
                stats.errors += 1;
            }
        }

        self.last_instance = instance;
        self.last_latency_ms = Some(latency_ms);
        self.last_message = format!(
            "{} {message} ({latency_ms:.0} ms)",
            if ok { "✓" } else { "✗" }
        );

        if self.batch.running {
            self.batch.done += 1;
            if self.batch.done >= self.batch.size {
                self.batch.running = false;
                self.last_message = format!("Batch of {} calls finished", self.batch.size);
            }
        }
    }

    pub fn mode_string(&self) -> String {
        match self.mode {
            Mode::Hedged => format!("hedged, width {}", self.width),
            Mode::SingleInstance => "single instance".to_string(),
        }
    }

    pub fn session_uptime(&self) -> Duration {
        self.session.started.elapsed()
    }

    pub fn success_rate(&self) -> f64 {
        match self.session.calls {
            0 => 0.0,
            calls => self.session.successes as f64 / calls as f64 * 100.0,
        }
    }

    pub fn calls_per_second(&self) -> f64 {
        let Some(cutoff) = Instant::now().checked_sub(Duration::from_secs(1)) else {
            return self.session.finished_at.len() as f64;
        };
        self.session
            .finished_at
            .iter()
            .filter(|&&at| at > cutoff)
            .count() as f64
    }

    /// Mean of the recorded winning latencies across all instances.
    pub fn average_latency(&self) -> f64 {
        let samples: Vec<u64> = self.latency_history.values().flatten().copied().collect();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<u64>() as f64 / samples.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use hedging_client::{Discovery, ServiceInstance};

    use super::*;
    use crate::env::build_clients;

    fn app(urls: &[&str]) -> App {
        let target = Target {
            service: "service".to_string(),
            path: "/hi".to_string(),
            instances: urls
                .iter()
                .map(|url| ServiceInstance::from_url("service", url).unwrap())
                .collect(),
        };
        let clients = build_clients(&target, 3).unwrap();
        App::new(clients, target)
    }

    #[tokio::test]
    async fn direct_client_matches_selection() {
        let mut app = app(&["http://a:1", "http://b:2", "http://c:3"]);
        app.select_prev();

        let selected = app.selected_instance().cloned().unwrap();
        let known = app.direct[app.selected_idx]
            .discovery()
            .list_instances("service")
            .await;

        assert_eq!(selected.as_str(), "http://c:3");
        assert_eq!(known.len(), 1);
        assert_eq!(known[0].address(), selected);
    }
}
