//! Client-side request hedging across the replicas of a load-balanced service.
//!
//! A hedged request is sent to several distinct instances of the same service at once.
//! The first successful response is returned and the remaining in-flight attempts are
//! cancelled, trading some extra backend load for a much shorter latency tail.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use hedging_client::{
//!     HedgeConfig, HedgedClient, HttpTransport, LogicalRequest, RoundRobin, StaticDiscovery,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let discovery = Arc::new(StaticDiscovery::new().with_urls(
//!     "service",
//!     ["http://10.0.0.1:8080", "http://10.0.0.2:8080", "http://10.0.0.3:8080"],
//! )?);
//!
//! let client = HedgedClient::new(
//!     Arc::clone(&discovery),
//!     RoundRobin::new(discovery),
//!     HttpTransport::new(),
//!     HedgeConfig::with_width(3),
//! );
//!
//! let (instance, response) = client.hedge(LogicalRequest::get("http://service/hi")?).await?;
//! println!("{} answered with {}", instance, response.status);
//! # Ok(())
//! # }
//! ```
//!
//! # Hedging Strategy
//!
//! Each call goes through three steps:
//! 1. The URI host names the logical service. Discovery must know at least
//!    `desired_width` replicas of it, otherwise the call fails fast.
//! 2. The load balancer is polled up to `selection_budget` times and repeated picks are
//!    skipped, until `desired_width` distinct instances are collected.
//! 3. The request is rewritten for every instance and all copies are sent concurrently.
//!    The first success wins; every other attempt is cancelled.
//!
//! If every attempt fails the error lists what each instance reported.
//!
//! # Collaborators
//!
//! Discovery, load balancing and transport are traits ([`Discovery`], [`LoadBalancer`],
//! [`Transport`]). The crate ships [`StaticDiscovery`], [`RoundRobin`],
//! [`RandomChoice`] and the `reqwest`-based [`HttpTransport`].

pub mod balancer;
pub mod client;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod instance;
pub mod racer;
pub mod request;
pub mod selector;
pub mod transport;

pub use balancer::{LoadBalancer, RandomChoice, RoundRobin};
pub use client::{HedgedClient, InstanceStatsSnapshot};
pub use config::HedgeConfig;
pub use discovery::{Discovery, StaticDiscovery};
pub use errors::{AttemptError, BoxError, HedgedError, RewriteError};
pub use instance::{InstanceAddress, InstanceSet, ServiceInstance};
pub use request::{Body, LogicalRequest, PhysicalRequest};
pub use transport::{HttpResponse, HttpTransport, Transport};
pub use tokio_util::sync::CancellationToken;
