//! API types for the `ScaledApp` custom resource.
//!
//! `ScaledApp` is a minimal scalable resource kind used by cluster
//! certification suites: a desired replica count in `spec`, an observed
//! replica count plus serialized selector in `status`, and a scale
//! subresource wired to those fields so `kubectl scale` and horizontal
//! autoscalers work against it without knowing the full schema.

pub mod conditions;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a [`ScaledApp`].
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "scaling.scaletest.dev",
    version = "v1alpha1",
    kind = "ScaledApp",
    namespaced,
    shortname = "sapp",
    status = "ScaledAppStatus",
    scale(
        spec_replicas_path = ".spec.desiredReplicas",
        status_replicas_path = ".status.observedReplicas",
        label_selector_path = ".status.selector"
    ),
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".spec.desiredReplicas"}"#,
    printcolumn = r#"{"name":"Observed","type":"integer","jsonPath":".status.observedReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ScaledAppSpec {
    /// Number of workload replicas to run. Written by operators or by
    /// autoscalers through the scale subresource.
    #[schemars(range(min = 0))]
    pub desired_replicas: i32,
}

/// Observed state of a [`ScaledApp`]. Owned entirely by the controller and
/// written only through the status subresource.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledAppStatus {
    /// Replica count currently recorded on the owned workload.
    #[serde(default)]
    pub observed_replicas: i32,

    /// Serialized label selector for the governed pods, required by the
    /// scale subresource contract.
    #[serde(default)]
    pub selector: String,

    /// Conditions keyed by `type`, at most one entry per type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
