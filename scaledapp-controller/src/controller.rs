//! The reconciliation core: one pass per change notification, converging the
//! owned Deployment toward `spec.desiredReplicas` and mirroring observed
//! state back onto the `ScaledApp` status.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    api::{Api, ListParams, Patch, PatchParams, PostParams},
    core::Selector,
    runtime::{
        controller::{Action, Controller},
        watcher,
    },
    Client, ResourceExt,
};
use scaledapp_api::{
    conditions::{
        get_condition, new_condition, upsert_condition, STATUS_FALSE, STATUS_TRUE, STATUS_UNKNOWN,
        TYPE_AVAILABLE, TYPE_DEGRADED, TYPE_READY,
    },
    ScaledApp, ScaledAppSpec, ScaledAppStatus,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{sync, Config, Error, Result};

/// Requeue delay after a workload mutation, long enough for the platform to
/// start scheduling pods before the next pass re-reads their status.
pub(crate) const REQUEUE_AFTER_WRITE: Duration = Duration::from_secs(5);
/// Requeue delay handed to the dispatcher after a failed pass.
const REQUEUE_AFTER_ERROR: Duration = Duration::from_secs(5);
/// Bounded retry budget for status writes that hit a version conflict.
pub(crate) const STATUS_CONFLICT_ATTEMPTS: usize = 3;

const REASON_RECONCILING: &str = "Reconciling";
const REASON_AS_EXPECTED: &str = "AsExpected";
const REASON_SCALING: &str = "ScalingInProgress";
const REASON_INVALID_SELECTOR: &str = "InvalidSelector";

/// Shared state handed to every reconcile invocation.
pub struct Context {
    /// Apiserver client.
    pub client: Client,
    /// Immutable process configuration.
    pub config: Config,
}

/// Observed facts about the owned workload, extracted once per pass.
pub(crate) struct WorkloadView {
    pub(crate) replicas: i32,
    pub(crate) available_replicas: i32,
    pub(crate) ready_replicas: i32,
    pub(crate) selector: String,
}

impl WorkloadView {
    fn from_deployment(deployment: &Deployment) -> Result<Self> {
        let selector = deployment
            .spec
            .as_ref()
            .map(|spec| spec.selector.clone())
            .unwrap_or_default();
        let selector = Selector::try_from(selector)
            .map_err(|err| Error::InvalidSelector(err.to_string()))?
            .to_string();
        let status = deployment.status.clone().unwrap_or_default();
        Ok(Self {
            replicas: status.replicas.unwrap_or(0),
            available_replicas: status.available_replicas.unwrap_or(0),
            ready_replicas: status.ready_replicas.unwrap_or(0),
            selector,
        })
    }
}

/// Reconcile a single `ScaledApp`.
///
/// The passed object is only trusted for its identity; the pass starts with a
/// fresh read so repeated and concurrent triggers always observe the latest
/// committed state. A converged resource produces zero writes.
pub async fn reconcile(app: Arc<ScaledApp>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = app
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = app.name_any();
    let apps: Api<ScaledApp> = Api::namespaced(ctx.client.clone(), &namespace);
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);

    let Some(mut app) = apps.get_opt(&name).await? else {
        // Already deleted; owner references let the garbage collector clean
        // up the workload, nothing to do here.
        debug!(%namespace, %name, "resource gone, skipping");
        return Ok(Action::await_change());
    };

    // A freshly created resource gets observable conditions before the owned
    // workload even exists.
    if app.status.as_ref().is_none_or(|s| s.conditions.is_empty()) {
        app = seed_conditions(&apps, app).await?;
    }

    let desired = app.spec.desired_replicas;
    let deployment = match deployments.get_opt(&name).await? {
        None => {
            let deployment = sync::desired_deployment(&app, &ctx.config)?;
            deployments.create(&PostParams::default(), &deployment).await?;
            info!(%namespace, %name, replicas = desired, "created workload");
            return Ok(Action::requeue(REQUEUE_AFTER_WRITE));
        }
        Some(deployment) => {
            let current = deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1);
            if current != desired {
                let patch = json!({ "spec": { "replicas": desired } });
                deployments
                    .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
                info!(%namespace, %name, from = current, to = desired, "scaled workload");
                return Ok(Action::requeue(REQUEUE_AFTER_WRITE));
            }
            deployment
        }
    };

    match WorkloadView::from_deployment(&deployment) {
        Ok(view) => {
            publish_status(&apps, app, &view).await?;
        }
        Err(Error::InvalidSelector(detail)) => {
            // Invariant violation: surfaced on the resource, and reported
            // outward so the dispatcher schedules the retry. Never fatal to
            // the process.
            error!(%namespace, %name, %detail, "workload selector is not serializable");
            degrade(&apps, app, &detail).await?;
            return Err(Error::InvalidSelector(detail));
        }
        Err(err) => return Err(err),
    }

    Ok(Action::requeue(ctx.config.resync))
}

/// Log the failure and let the dispatcher retry with backoff.
pub fn error_policy(app: Arc<ScaledApp>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(app = %app.name_any(), %error, "reconcile failed");
    Action::requeue(REQUEUE_AFTER_ERROR)
}

/// Initialize `Unknown` conditions for every tracked type and persist them,
/// returning the stored object so the pass continues on a fresh version.
async fn seed_conditions(apps: &Api<ScaledApp>, mut app: ScaledApp) -> Result<ScaledApp> {
    let name = app.name_any();
    let mut status = app.status.clone().unwrap_or_default();
    for type_ in [TYPE_AVAILABLE, TYPE_READY] {
        upsert_condition(
            &mut status.conditions,
            new_condition(type_, STATUS_UNKNOWN, REASON_RECONCILING, "initial reconcile"),
        );
    }
    app.status = Some(status);
    let app = apps
        .replace_status(&name, &PostParams::default(), serde_json::to_vec(&app)?)
        .await?;
    debug!(%name, "seeded initial conditions");
    Ok(app)
}

/// Compute the status the resource should carry given the workload view.
///
/// Pure; condition transition times are preserved by the upsert whenever a
/// condition's value did not change, so recomputing on a converged resource
/// yields a status equal to the stored one.
pub(crate) fn desired_status(
    current: &ScaledAppStatus,
    spec: &ScaledAppSpec,
    view: &WorkloadView,
) -> ScaledAppStatus {
    let desired = spec.desired_replicas;
    let mut next = ScaledAppStatus {
        observed_replicas: view.replicas,
        selector: view.selector.clone(),
        conditions: current.conditions.clone(),
    };

    // conditions may only go true once the observed replica count itself
    // agrees with the spec; during a scale-down the workload can report the
    // desired number available while surplus pods are still draining
    let observed_matches = view.replicas == desired;

    let (status, reason) = if observed_matches && view.available_replicas == desired {
        (STATUS_TRUE, REASON_AS_EXPECTED)
    } else {
        (STATUS_FALSE, REASON_SCALING)
    };
    let message = format!("{}/{} replicas available", view.available_replicas, desired);
    upsert_condition(&mut next.conditions, new_condition(TYPE_AVAILABLE, status, reason, &message));

    let (status, reason) = if observed_matches && view.ready_replicas == desired {
        (STATUS_TRUE, REASON_AS_EXPECTED)
    } else {
        (STATUS_FALSE, REASON_SCALING)
    };
    let message = format!("{}/{} replicas ready", view.ready_replicas, desired);
    upsert_condition(&mut next.conditions, new_condition(TYPE_READY, status, reason, &message));

    // Clear a previous degradation once the workload reads cleanly again.
    if get_condition(&next.conditions, TYPE_DEGRADED).is_some() {
        upsert_condition(
            &mut next.conditions,
            new_condition(TYPE_DEGRADED, STATUS_FALSE, REASON_AS_EXPECTED, ""),
        );
    }

    next
}

/// Publish the computed status, skipping the write entirely when nothing
/// changed. A 409 re-fetches the object and retries the whole computation
/// against the fresh version, up to [`STATUS_CONFLICT_ATTEMPTS`] times.
async fn publish_status(apps: &Api<ScaledApp>, mut app: ScaledApp, view: &WorkloadView) -> Result<bool> {
    let name = app.name_any();
    for attempt in 1..=STATUS_CONFLICT_ATTEMPTS {
        let current = app.status.clone().unwrap_or_default();
        let next = desired_status(&current, &app.spec, view);
        if next == current {
            debug!(%name, "status unchanged, skipping write");
            return Ok(false);
        }
        app.status = Some(next);
        match apps
            .replace_status(&name, &PostParams::default(), serde_json::to_vec(&app)?)
            .await
        {
            Ok(_) => {
                info!(%name, observed = view.replicas, "updated status");
                return Ok(true);
            }
            Err(kube::Error::Api(err)) if err.code == 409 => {
                debug!(%name, attempt, "status write conflicted, refetching");
                app = apps.get(&name).await?;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(Error::StatusUpdateConflict(STATUS_CONFLICT_ATTEMPTS))
}

/// Mark the resource `Degraded` with the violation detail, honoring the
/// no-write-if-unchanged rule.
async fn degrade(apps: &Api<ScaledApp>, mut app: ScaledApp, detail: &str) -> Result<()> {
    let name = app.name_any();
    let current = app.status.clone().unwrap_or_default();
    let mut next = current.clone();
    upsert_condition(
        &mut next.conditions,
        new_condition(TYPE_DEGRADED, STATUS_TRUE, REASON_INVALID_SELECTOR, detail),
    );
    if next == current {
        return Ok(());
    }
    app.status = Some(next);
    apps.replace_status(&name, &PostParams::default(), serde_json::to_vec(&app)?)
        .await?;
    Ok(())
}

/// Run the controller until shutdown.
///
/// Watches the `ScaledApp` kind and the Deployments it owns; the runtime
/// coalesces rapid changes and serializes reconciles per object, so the
/// reconciler itself needs no locking.
pub async fn run(client: Client, config: Config) -> Result<()> {
    let (apps, deployments): (Api<ScaledApp>, Api<Deployment>) = match &config.namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    // Fail fast when the CRD is missing rather than looping on watch errors.
    apps.list(&ListParams::default().limit(1)).await.map_err(|err| {
        error!("ScaledApp CRD not queryable; install it first: crdgen | kubectl apply -f -");
        Error::KubeApi(err)
    })?;

    let ctx = Arc::new(Context { client, config });
    Controller::new(apps, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!(object = %obj, "reconciled"),
                Err(err) => warn!(%err, "reconcile dispatch failed"),
            }
        })
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(replicas: i32, ready: i32) -> WorkloadView {
        WorkloadView {
            replicas,
            available_replicas: ready,
            ready_replicas: ready,
            selector: "app=probe".to_string(),
        }
    }

    fn spec(replicas: i32) -> ScaledAppSpec {
        ScaledAppSpec { desired_replicas: replicas }
    }

    #[test]
    fn converged_workload_yields_true_conditions() {
        let status = desired_status(&ScaledAppStatus::default(), &spec(3), &view(3, 3));
        assert_eq!(status.observed_replicas, 3);
        assert_eq!(status.selector, "app=probe");
        let available = get_condition(&status.conditions, TYPE_AVAILABLE).unwrap();
        assert_eq!(available.status, STATUS_TRUE);
        assert_eq!(available.reason, REASON_AS_EXPECTED);
        let ready = get_condition(&status.conditions, TYPE_READY).unwrap();
        assert_eq!(ready.status, STATUS_TRUE);
    }

    #[test]
    fn scaling_workload_yields_false_conditions() {
        let status = desired_status(&ScaledAppStatus::default(), &spec(5), &view(5, 3));
        assert_eq!(status.observed_replicas, 5);
        let ready = get_condition(&status.conditions, TYPE_READY).unwrap();
        assert_eq!(ready.status, STATUS_FALSE);
        assert_eq!(ready.reason, REASON_SCALING);
        assert_eq!(ready.message, "3/5 replicas ready");
    }

    #[test]
    fn conditions_stay_false_while_a_scale_down_drains() {
        // 5 -> 3 scale-down window: three pods available but a fourth is
        // still terminating, so the workload reports replicas=4
        let view = WorkloadView {
            replicas: 4,
            available_replicas: 3,
            ready_replicas: 3,
            selector: "app=probe".to_string(),
        };
        let status = desired_status(&ScaledAppStatus::default(), &spec(3), &view);
        assert_eq!(status.observed_replicas, 4);
        let available = get_condition(&status.conditions, TYPE_AVAILABLE).unwrap();
        assert_eq!(available.status, STATUS_FALSE);
        assert_eq!(available.reason, REASON_SCALING);
        let ready = get_condition(&status.conditions, TYPE_READY).unwrap();
        assert_eq!(ready.status, STATUS_FALSE);
    }

    #[test]
    fn recomputing_a_converged_status_is_a_fixed_point() {
        let first = desired_status(&ScaledAppStatus::default(), &spec(3), &view(3, 3));
        let second = desired_status(&first, &spec(3), &view(3, 3));
        // equality includes lastTransitionTime, so this also proves the
        // no-churn property for condition timestamps
        assert_eq!(first, second);
    }

    #[test]
    fn transition_time_survives_reason_refresh() {
        let scaling = desired_status(&ScaledAppStatus::default(), &spec(5), &view(5, 2));
        let ready_at = get_condition(&scaling.conditions, TYPE_READY).unwrap().last_transition_time.clone();
        let still_scaling = desired_status(&scaling, &spec(5), &view(5, 4));
        let ready = get_condition(&still_scaling.conditions, TYPE_READY).unwrap();
        assert_eq!(ready.last_transition_time, ready_at);
        assert_eq!(ready.message, "4/5 replicas ready");
    }

    #[test]
    fn degraded_condition_clears_once_healthy() {
        let mut current = ScaledAppStatus::default();
        upsert_condition(
            &mut current.conditions,
            new_condition(TYPE_DEGRADED, STATUS_TRUE, REASON_INVALID_SELECTOR, "bad operator"),
        );
        let next = desired_status(&current, &spec(1), &view(1, 1));
        let degraded = get_condition(&next.conditions, TYPE_DEGRADED).unwrap();
        assert_eq!(degraded.status, STATUS_FALSE);
        // uniqueness invariant holds across the clear
        assert_eq!(next.conditions.iter().filter(|c| c.type_ == TYPE_DEGRADED).count(), 1);
    }
}
