//! Process configuration, read once at startup and immutable afterwards.

use std::time::Duration;

use crate::{Error, Result};

/// Namespace to watch; unset or empty means all namespaces.
pub const ENV_NAMESPACE: &str = "SCALEDAPP_NAMESPACE";
/// Container image for the owned workload's pod template.
pub const ENV_IMAGE: &str = "SCALEDAPP_IMAGE";
/// Periodic requeue interval for converged resources, in seconds.
pub const ENV_RESYNC_SECS: &str = "SCALEDAPP_RESYNC_SECS";

const DEFAULT_IMAGE: &str = "nginx:1.27";
const DEFAULT_RESYNC_SECS: u64 = 300;

/// Runtime settings for the controller.
#[derive(Clone, Debug)]
pub struct Config {
    /// Target namespace, or `None` to watch the whole cluster.
    pub namespace: Option<String>,
    /// Image used when the owned Deployment is first created. The pod
    /// template is fixed at creation time and not re-synced afterwards.
    pub image: String,
    /// Requeue interval once a resource has converged.
    pub resync: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            image: DEFAULT_IMAGE.to_string(),
            resync: Duration::from_secs(DEFAULT_RESYNC_SECS),
        }
    }
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let namespace = var(ENV_NAMESPACE).filter(|ns| !ns.is_empty());
        let image = var(ENV_IMAGE)
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string());
        let resync = match var(ENV_RESYNC_SECS) {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    Error::InvalidConfig(format!("{ENV_RESYNC_SECS} must be a non-negative integer, got {raw:?}"))
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_RESYNC_SECS),
        };
        Ok(Self { namespace, image, resync })
    }
}
