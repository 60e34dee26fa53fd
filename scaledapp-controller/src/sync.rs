//! Pure mapping from a `ScaledApp` to the desired shape of its owned
//! Deployment. No apiserver calls happen here, which keeps the construction
//! logic testable without a live store.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};
use scaledapp_api::ScaledApp;

use crate::{Config, Error, Result};

/// Name of the single container in the owned workload's pod template.
const CONTAINER_NAME: &str = "app";
const CONTAINER_PORT: i32 = 80;

/// The owned workload shares its owner's name.
pub fn workload_name(app: &ScaledApp) -> String {
    app.name_any()
}

/// Labels selecting the pods governed by `name`.
pub fn app_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), name.to_string())])
}

/// Build the Deployment this `ScaledApp` should own.
///
/// Replicas come from `spec.desiredReplicas`; the pod template is fixed from
/// [`Config::image`] at creation time. The owner reference (with
/// `controller: true`) lets the garbage collector remove the Deployment when
/// the `ScaledApp` is deleted, so the controller never deletes it itself.
pub fn desired_deployment(app: &ScaledApp, config: &Config) -> Result<Deployment> {
    let name = workload_name(app);
    let namespace = app
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let owner = app
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey(".metadata.uid"))?;
    let labels = app_labels(&name);

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner]),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(app.spec.desired_replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(config.image.clone()),
                        ports: Some(vec![ContainerPort {
                            container_port: CONTAINER_PORT,
                            ..ContainerPort::default()
                        }]),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        status: None,
    })
}
