use std::time::Duration;

use http::Uri;

use crate::instance::InstanceAddress;

/// Boxed error produced by collaborators such as a [`Transport`](crate::transport::Transport).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during a hedged request.
#[derive(thiserror::Error, Debug)]
pub enum HedgedError {
    /// The request URI carries no host to use as the logical service name.
    #[error("request URI does not contain a service name: {0}")]
    MissingServiceName(Uri),

    /// The hedge configuration cannot be executed.
    #[error("invalid hedge configuration: {0}")]
    InvalidConfig(&'static str),

    /// Discovery knows fewer replicas than the hedge needs.
    #[error("service '{service}' needs {required} registered instances, found {known}")]
    InsufficientInstances {
        service: String,
        known: usize,
        required: usize,
    },

    /// The load balancer returned nothing for a service discovery reported as populated.
    #[error("load balancer returned no instance for service '{service}'")]
    NoInstanceChosen { service: String },

    /// The request body is a one-shot stream and cannot be sent to several instances.
    #[error("request body cannot be replayed across hedged attempts")]
    UnreplayableBody,

    /// Every attempt failed.
    ///
    /// Contains one entry per raced instance with its individual error.
    #[error("all instances failed: {0:?}")]
    AllFailed(Vec<(InstanceAddress, AttemptError)>),

    /// The hedged request exceeded the configured overall timeout.
    #[error("hedged call timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the hedged request before any instance answered.
    #[error("hedged call cancelled")]
    Cancelled,
}

/// Why a single attempt against one instance did not produce a response.
#[derive(thiserror::Error, Debug)]
pub enum AttemptError {
    /// The instance address could not be turned into a request URI; nothing was sent.
    #[error("invalid instance address: {reason}")]
    InvalidInstanceAddress { reason: String },

    /// The transport reported a failure.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The attempt task ended without reporting an outcome.
    #[error("attempt aborted: {0}")]
    Aborted(String),
}

/// Errors raised while rewriting a logical request for a concrete instance.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("invalid instance address {address}: {reason}")]
    InvalidInstanceAddress { address: String, reason: String },

    #[error("request body cannot be replayed")]
    UnreplayableBody,
}
