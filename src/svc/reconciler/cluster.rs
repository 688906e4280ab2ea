//! # Cluster reconciler module
//!
//! This module provide the desired cluster state and the reconciler that
//! drives the control plane towards it

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::svc::{
    cfg::Configuration,
    docdb::{self, Cluster, ClusterDeleteOpts, ClusterOpts, ControlPlane, Status},
    reconciler::{timeout, DesiredState, Outcome, Poller},
};

// -----------------------------------------------------------------------------
// Constants

pub const ENGINE: &str = "docdb";

// -----------------------------------------------------------------------------
// Spec structure

/// desired state of a cluster as read from a task file
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Spec {
    #[serde(rename = "cluster_id")]
    pub cluster_id: String,
    #[serde(rename = "engine", default = "default_engine")]
    pub engine: String,
    #[serde(rename = "engine_version", default)]
    pub engine_version: Option<String>,
    #[serde(rename = "availability_zones", default)]
    pub availability_zones: Option<Vec<String>>,
    #[serde(rename = "master_username", default)]
    pub master_username: Option<String>,
    #[serde(rename = "master_password", default)]
    pub master_password: Option<String>,
    #[serde(rename = "force_update_password", default)]
    pub force_update_password: bool,
    #[serde(rename = "port", default)]
    pub port: Option<i32>,
    #[serde(rename = "snapshot_identifier", alias = "snapshot_arn", default)]
    pub snapshot_identifier: Option<String>,
    #[serde(rename = "subnet_group", default)]
    pub subnet_group: Option<String>,
    #[serde(rename = "cluster_parameter_group", default)]
    pub cluster_parameter_group: Option<String>,
    #[serde(rename = "vpc_security_group_ids", default)]
    pub vpc_security_group_ids: Option<Vec<String>>,
    #[serde(rename = "tags", default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(rename = "state", default)]
    pub state: DesiredState,
    #[serde(rename = "final_snapshot_identifier", default)]
    pub final_snapshot_identifier: Option<String>,
    #[serde(rename = "region", default)]
    pub region: Option<String>,
    #[serde(rename = "wait", default)]
    pub wait: bool,
    #[serde(rename = "wait_timeout", default)]
    pub wait_timeout: Option<u64>,
}

fn default_engine() -> String {
    ENGINE.to_string()
}

impl Spec {
    pub fn validate(&self) -> Result<(), Error> {
        if self.cluster_id.is_empty() {
            return Err(Error::MissingOption("cluster_id"));
        }

        if ENGINE != self.engine {
            return Err(Error::Configuration(format!(
                "unsupported engine '{}', the only available option is '{}'",
                self.engine, ENGINE
            )));
        }

        if DesiredState::Present == self.state && self.subnet_group.is_none() {
            return Err(Error::MissingOption("subnet_group"));
        }

        if self.force_update_password && self.master_password.is_none() {
            return Err(Error::MissingOption("master_password"));
        }

        Ok(())
    }
}

#[allow(clippy::from_over_into)]
impl Into<ClusterOpts> for &Spec {
    fn into(self) -> ClusterOpts {
        ClusterOpts {
            identifier: self.cluster_id.to_owned(),
            engine: self.engine.to_owned(),
            engine_version: self.engine_version.to_owned(),
            master_username: self.master_username.to_owned(),
            master_password: self.master_password.to_owned(),
            port: self.port,
            subnet_group: self.subnet_group.to_owned(),
            security_group_ids: self.vpc_security_group_ids.to_owned(),
            availability_zones: self.availability_zones.to_owned(),
            parameter_group: self.cluster_parameter_group.to_owned(),
            tags: self.tags.to_owned(),
        }
    }
}

// -----------------------------------------------------------------------------
// Action enumeration

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub enum Action {
    Create,
    Restore,
    Start,
    UpdatePassword,
    Delete,
    Skip,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Restore => write!(f, "Restore"),
            Self::Start => write!(f, "Start"),
            Self::UpdatePassword => write!(f, "UpdatePassword"),
            Self::Delete => write!(f, "Delete"),
            Self::Skip => write!(f, "Skip"),
        }
    }
}

// -----------------------------------------------------------------------------
// plan function

/// returns the minimal corrective action for the given desired and observed
/// states, free of side effects
pub fn plan(spec: &Spec, observed: Option<&Cluster>) -> Action {
    match (spec.state, observed) {
        (DesiredState::Present, Some(_)) if spec.force_update_password => Action::UpdatePassword,
        (DesiredState::Present, Some(_)) => Action::Skip,
        (DesiredState::Present, None) => match &spec.snapshot_identifier {
            Some(_) => Action::Restore,
            None => Action::Create,
        },
        (DesiredState::Absent, Some(_)) => Action::Delete,
        (DesiredState::Absent, None) => Action::Skip,
        (DesiredState::Running, Some(cluster)) if Status::Available == cluster.status => {
            Action::Skip
        }
        // Starting an absent cluster surfaces the control plane rejection
        (DesiredState::Running, _) => Action::Start,
    }
}

// -----------------------------------------------------------------------------
// drift function

/// returns the desired fields that diverge from the observed cluster,
/// existence aside those are never corrected
pub fn drift(spec: &Spec, observed: &Cluster) -> Vec<&'static str> {
    let mut fields = Vec::new();

    if let Some(engine_version) = &spec.engine_version {
        if Some(engine_version) != observed.engine_version.as_ref() {
            fields.push("engine_version");
        }
    }

    if let Some(port) = spec.port {
        if Some(port) != observed.port {
            fields.push("port");
        }
    }

    if let Some(subnet_group) = &spec.subnet_group {
        if Some(subnet_group) != observed.subnet_group.as_ref() {
            fields.push("subnet_group");
        }
    }

    if let Some(security_group_ids) = &spec.vpc_security_group_ids {
        let mut desired = security_group_ids.to_owned();
        let mut current = observed.security_group_ids.to_owned();

        desired.sort();
        current.sort();

        if desired != current {
            fields.push("vpc_security_group_ids");
        }
    }

    fields
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid task configuration, missing required option '{0}'")]
    MissingOption(&'static str),
    #[error("invalid task configuration, {0}")]
    Configuration(String),
    #[error("failed to execute request on control plane, {0}")]
    ControlPlane(docdb::Error),
    #[error("cluster '{0}' reached status '{1}' while waiting")]
    Failed(String, Status),
    #[error("timed out after {1} seconds waiting for cluster '{0}' to become available")]
    AvailableTimeout(String, u64),
    #[error("timed out after {1} seconds waiting for cluster '{0}' to be deleted")]
    DeleteTimeout(String, u64),
}

impl From<docdb::Error> for Error {
    fn from(err: docdb::Error) -> Self {
        Self::ControlPlane(err)
    }
}

// -----------------------------------------------------------------------------
// Reconciler structure

pub struct Reconciler<C>
where
    C: ControlPlane,
{
    api: C,
    config: Arc<Configuration>,
}

impl<C> Reconciler<C>
where
    C: ControlPlane + Send + Sync,
{
    pub fn new(api: C, config: Arc<Configuration>) -> Self {
        Self { api, config }
    }

    /// compares the desired and observed states and issues the corrective
    /// action, returns whether a change occurred and the resulting cluster
    pub async fn reconcile(&self, spec: &Spec) -> Result<Outcome<Cluster>, Error> {
        spec.validate()?;

        let observed = self.api.cluster(&spec.cluster_id).await?;
        let action = plan(spec, observed.as_ref());

        info!(
            cluster = &spec.cluster_id,
            state = spec.state.to_string(),
            action = action.to_string(),
            "Reconcile cluster",
        );

        match action {
            Action::Skip => {
                if let Some(cluster) = &observed {
                    let fields = drift(spec, cluster);
                    if !fields.is_empty() {
                        warn!(
                            cluster = &spec.cluster_id,
                            fields = fields.join(", "),
                            "Cluster configuration differs from the desired state, left unchanged",
                        );
                    }
                }

                Ok(Outcome::unchanged(observed))
            }
            Action::Create => {
                let created = self.api.create_cluster(&spec.into()).await?;
                let created = self
                    .available(spec, created, self.config.wait.create_timeout)
                    .await?;

                Ok(Outcome::changed(Some(created)))
            }
            Action::Restore => {
                let snapshot = match &spec.snapshot_identifier {
                    Some(snapshot) => snapshot,
                    None => return Err(Error::MissingOption("snapshot_identifier")),
                };

                let restored = self.api.restore_cluster(&spec.into(), snapshot).await?;
                let restored = self
                    .available(spec, restored, self.config.wait.restore_timeout)
                    .await?;

                Ok(Outcome::changed(Some(restored)))
            }
            Action::Start => {
                let started = self.api.start_cluster(&spec.cluster_id).await?;
                let started = self
                    .available(spec, started, self.config.wait.create_timeout)
                    .await?;

                Ok(Outcome::changed(Some(started)))
            }
            Action::UpdatePassword => {
                let password = match &spec.master_password {
                    Some(password) => password,
                    None => return Err(Error::MissingOption("master_password")),
                };

                let modified = self
                    .api
                    .update_cluster_password(&spec.cluster_id, password)
                    .await?;
                let modified = self
                    .available(spec, modified, self.config.wait.create_timeout)
                    .await?;

                Ok(Outcome::changed(Some(modified)))
            }
            Action::Delete => {
                let opts = ClusterDeleteOpts {
                    identifier: spec.cluster_id.to_owned(),
                    final_snapshot_identifier: spec.final_snapshot_identifier.to_owned(),
                };

                let deleted = self.api.delete_cluster(&opts).await?;
                let deleted = self.deleted(spec, deleted).await?;

                Ok(Outcome::changed(deleted))
            }
        }
    }

    /// polls the cluster until it reports available, describe errors are
    /// tolerated until the deadline
    async fn available(
        &self,
        spec: &Spec,
        fallback: Cluster,
        default_timeout: u64,
    ) -> Result<Cluster, Error> {
        if !spec.wait {
            return Ok(fallback);
        }

        let timeout = timeout(spec.wait_timeout, default_timeout);
        let poller = Poller::new(
            Duration::from_secs(self.config.wait.interval),
            Duration::from_secs(timeout),
        );

        loop {
            match self.api.cluster(&spec.cluster_id).await {
                Ok(Some(cluster)) if Status::Available == cluster.status => return Ok(cluster),
                Ok(Some(cluster)) if Status::Failed == cluster.status => {
                    return Err(Error::Failed(spec.cluster_id.to_owned(), cluster.status));
                }
                Ok(observed) => {
                    debug!(
                        cluster = &spec.cluster_id,
                        status = observed
                            .map(|cluster| cluster.status.to_string())
                            .unwrap_or_else(|| "<absent>".to_string()),
                        "Cluster is not available yet",
                    );
                }
                Err(err) => {
                    debug!(
                        cluster = &spec.cluster_id,
                        error = err.to_string(),
                        "Ignore control plane error while waiting",
                    );
                }
            }

            if !poller.tick().await {
                return Err(Error::AvailableTimeout(spec.cluster_id.to_owned(), timeout));
            }
        }
    }

    /// polls the cluster until the control plane stops reporting it
    async fn deleted(
        &self,
        spec: &Spec,
        fallback: Option<Cluster>,
    ) -> Result<Option<Cluster>, Error> {
        if !spec.wait {
            return Ok(fallback);
        }

        let timeout = timeout(spec.wait_timeout, self.config.wait.delete_timeout);
        let poller = Poller::new(
            Duration::from_secs(self.config.wait.interval),
            Duration::from_secs(timeout),
        );

        loop {
            match self.api.cluster(&spec.cluster_id).await {
                Ok(None) => return Ok(None),
                Ok(Some(cluster)) if Status::Failed == cluster.status => {
                    return Err(Error::Failed(spec.cluster_id.to_owned(), cluster.status));
                }
                Ok(Some(cluster)) => {
                    debug!(
                        cluster = &spec.cluster_id,
                        status = cluster.status.to_string(),
                        "Cluster is not deleted yet",
                    );
                }
                Err(err) => {
                    debug!(
                        cluster = &spec.cluster_id,
                        error = err.to_string(),
                        "Ignore control plane error while waiting",
                    );
                }
            }

            if !poller.tick().await {
                return Err(Error::DeleteTimeout(spec.cluster_id.to_owned(), timeout));
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
