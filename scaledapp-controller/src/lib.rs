//! Controller for the `ScaledApp` custom resource.
//!
//! Watches `ScaledApp` objects and the Deployments they own, and converges the
//! Deployment's replica count toward `spec.desiredReplicas` while publishing
//! observed state (replica count, selector, conditions) on the status
//! subresource. Reconciliation is idempotent: a converged resource produces
//! zero writes on a repeat pass.

pub mod config;
pub mod controller;
pub mod sync;


pub use config::Config;
pub use controller::{error_policy, reconcile, run, Context};

use thiserror::Error;

/// Failures a reconcile pass can surface.
///
/// All of these are scoped to a single resource and drive the dispatcher's
/// retry backoff; none of them terminate the controller process.
#[derive(Error, Debug)]
pub enum Error {
    /// An apiserver call failed. 404s at call sites with a not-found policy
    /// are handled locally and never reach this variant.
    #[error("kubernetes api error: {0}")]
    KubeApi(#[from] kube::Error),

    /// The object is missing a metadata field the controller requires.
    #[error("missing object key: {0}")]
    MissingObjectKey(&'static str),

    /// The owned workload carries a selector that cannot be serialized for
    /// the scale subresource. Surfaced as a `Degraded` condition.
    #[error("invalid selector on owned workload: {0}")]
    InvalidSelector(String),

    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// The status write conflicted on every attempt; retried via backoff.
    #[error("status update conflicted {0} times in a row")]
    StatusUpdateConflict(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
