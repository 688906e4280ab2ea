//! # Instance reconciler module
//!
//! This module provide the desired instance state and the reconciler that
//! drives the control plane towards it, an instance always belongs to an
//! existing cluster

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
    docdb::{self, ControlPlane, Instance, InstanceOpts, Status},
    reconciler::{timeout, DesiredState, Outcome, Poller},
};

use super::cluster::ENGINE;

// -----------------------------------------------------------------------------
// Spec structure

/// desired state of an instance as read from a task file
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Spec {
    #[serde(rename = "instance_id")]
    pub instance_id: String,
    #[serde(rename = "cluster_id", default)]
    pub cluster_id: Option<String>,
    #[serde(rename = "instance_type", default)]
    pub instance_type: Option<String>,
    #[serde(rename = "engine", default = "default_engine")]
    pub engine: String,
    #[serde(rename = "availability_zone", default)]
    pub availability_zone: Option<String>,
    #[serde(rename = "preferred_maintenance_window", default)]
    pub preferred_maintenance_window: Option<String>,
    #[serde(rename = "tags", default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(rename = "state", default)]
    pub state: DesiredState,
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
        if self.instance_id.is_empty() {
            return Err(Error::MissingOption("instance_id"));
        }

        if ENGINE != self.engine {
            return Err(Error::Configuration(format!(
                "unsupported engine '{}', the only available option is '{}'",
                self.engine, ENGINE
            )));
        }

        if DesiredState::Running == self.state {
            return Err(Error::Configuration(
                "state 'running' is not supported for instances".to_string(),
            ));
        }

        if DesiredState::Present == self.state {
            if self.cluster_id.is_none() {
                return Err(Error::MissingOption("cluster_id"));
            }

            if self.instance_type.is_none() {
                return Err(Error::MissingOption("instance_type"));
            }
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Action enumeration

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub enum Action {
    Create,
    Delete,
    Skip,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Delete => write!(f, "Delete"),
            Self::Skip => write!(f, "Skip"),
        }
    }
}

// -----------------------------------------------------------------------------
// plan function

/// returns the minimal corrective action for the given desired and observed
/// states, free of side effects
pub fn plan(spec: &Spec, observed: Option<&Instance>) -> Action {
    match (spec.state, observed) {
        (DesiredState::Present, None) => Action::Create,
        (DesiredState::Absent, Some(_)) => Action::Delete,
        _ => Action::Skip,
    }
}

// -----------------------------------------------------------------------------
// drift function

/// returns the desired fields that diverge from the observed instance,
/// existence aside those are never corrected
pub fn drift(spec: &Spec, observed: &Instance) -> Vec<&'static str> {
    let mut fields = Vec::new();

    if let Some(instance_type) = &spec.instance_type {
        if Some(instance_type) != observed.instance_class.as_ref() {
            fields.push("instance_type");
        }
    }

    if let Some(availability_zone) = &spec.availability_zone {
        if Some(availability_zone) != observed.availability_zone.as_ref() {
            fields.push("availability_zone");
        }
    }

    if let Some(window) = &spec.preferred_maintenance_window {
        if Some(window) != observed.preferred_maintenance_window.as_ref() {
            fields.push("preferred_maintenance_window");
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
    #[error("cluster '{0}' does not exist, instance '{1}' cannot be created")]
    ClusterNotFound(String, String),
    #[error("instance '{0}' reached status '{1}' while waiting")]
    Failed(String, Status),
    #[error("timed out after {1} seconds waiting for instance '{0}' to become available")]
    AvailableTimeout(String, u64),
    #[error("timed out after {1} seconds waiting for instance '{0}' to be deleted")]
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
    /// action, returns whether a change occurred and the resulting instance
    pub async fn reconcile(&self, spec: &Spec) -> Result<Outcome<Instance>, Error> {
        spec.validate()?;

        let observed = self.api.instance(&spec.instance_id).await?;
        let action = plan(spec, observed.as_ref());

        info!(
            instance = &spec.instance_id,
            state = spec.state.to_string(),
            action = action.to_string(),
            "Reconcile instance",
        );

        match action {
            Action::Skip => {
                if let Some(instance) = &observed {
                    let fields = drift(spec, instance);
                    if !fields.is_empty() {
                        warn!(
                            instance = &spec.instance_id,
                            fields = fields.join(", "),
                            "Instance configuration differs from the desired state, left unchanged",
                        );
                    }
                }

                Ok(Outcome::unchanged(observed))
            }
            Action::Create => {
                let cluster_id = match &spec.cluster_id {
                    Some(cluster_id) => cluster_id,
                    None => return Err(Error::MissingOption("cluster_id")),
                };
                let instance_type = match &spec.instance_type {
                    Some(instance_type) => instance_type,
                    None => return Err(Error::MissingOption("instance_type")),
                };

                // The owning cluster has to exist, a cluster still being
                // created satisfies the dependency
                if self.api.cluster(cluster_id).await?.is_none() {
                    return Err(Error::ClusterNotFound(
                        cluster_id.to_owned(),
                        spec.instance_id.to_owned(),
                    ));
                }

                let opts = InstanceOpts {
                    identifier: spec.instance_id.to_owned(),
                    cluster_identifier: cluster_id.to_owned(),
                    instance_class: instance_type.to_owned(),
                    engine: spec.engine.to_owned(),
                    availability_zone: spec.availability_zone.to_owned(),
                    preferred_maintenance_window: spec.preferred_maintenance_window.to_owned(),
                    tags: spec.tags.to_owned(),
                };

                let created = self.api.create_instance(&opts).await?;
                let created = self.available(spec, created).await?;

                Ok(Outcome::changed(Some(created)))
            }
            Action::Delete => {
                let deleted = self.api.delete_instance(&spec.instance_id).await?;
                let deleted = self.deleted(spec, deleted).await?;

                Ok(Outcome::changed(deleted))
            }
        }
    }

    /// polls the instance until it reports available, describe errors are
    /// tolerated until the deadline
    async fn available(&self, spec: &Spec, fallback: Instance) -> Result<Instance, Error> {
        if !spec.wait {
            return Ok(fallback);
        }

        let timeout = timeout(spec.wait_timeout, self.config.wait.instance_timeout);
        let poller = Poller::new(
            Duration::from_secs(self.config.wait.interval),
            Duration::from_secs(timeout),
        );

        loop {
            match self.api.instance(&spec.instance_id).await {
                Ok(Some(instance)) if Status::Available == instance.status => return Ok(instance),
                Ok(Some(instance)) if Status::Failed == instance.status => {
                    return Err(Error::Failed(spec.instance_id.to_owned(), instance.status));
                }
                Ok(observed) => {
                    debug!(
                        instance = &spec.instance_id,
                        status = observed
                            .map(|instance| instance.status.to_string())
                            .unwrap_or_else(|| "<absent>".to_string()),
                        "Instance is not available yet",
                    );
                }
                Err(err) => {
                    debug!(
                        instance = &spec.instance_id,
                        error = err.to_string(),
                        "Ignore control plane error while waiting",
                    );
                }
            }

            if !poller.tick().await {
                return Err(Error::AvailableTimeout(
                    spec.instance_id.to_owned(),
                    timeout,
                ));
            }
        }
    }

    /// polls the instance until the control plane stops reporting it
    async fn deleted(
        &self,
        spec: &Spec,
        fallback: Option<Instance>,
    ) -> Result<Option<Instance>, Error> {
        if !spec.wait {
            return Ok(fallback);
        }

        let timeout = timeout(spec.wait_timeout, self.config.wait.instance_timeout);
        let poller = Poller::new(
            Duration::from_secs(self.config.wait.interval),
            Duration::from_secs(timeout),
        );

        loop {
            match self.api.instance(&spec.instance_id).await {
                Ok(None) => return Ok(None),
                Ok(Some(instance)) if Status::Failed == instance.status => {
                    return Err(Error::Failed(spec.instance_id.to_owned(), instance.status));
                }
                Ok(Some(instance)) => {
                    debug!(
                        instance = &spec.instance_id,
                        status = instance.status.to_string(),
                        "Instance is not deleted yet",
                    );
                }
                Err(err) => {
                    debug!(
                        instance = &spec.instance_id,
                        error = err.to_string(),
                        "Ignore control plane error while waiting",
                    );
                }
            }

            if !poller.tick().await {
                return Err(Error::DeleteTimeout(spec.instance_id.to_owned(), timeout));
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::svc::{
        cfg::Configuration,
        docdb::{fake, Status},
        reconciler::DesiredState,
    };

    use super::{plan, Action, Error, Reconciler, Spec, ENGINE};

    fn configuration() -> Arc<Configuration> {
        let mut configuration = Configuration::default();

        configuration.wait.interval = 0;
        Arc::new(configuration)
    }

    fn spec(fragment: &str) -> Spec {
        serde_yaml::from_str(&format!(
            "instance_id: instance-1\ncluster_id: new-cluster-name\ninstance_type: db.t3.medium\n{}",
            fragment
        ))
        .expect("task to be deserialized")
    }

    #[test]
    fn spec_should_apply_task_defaults() {
        let spec = spec("");

        assert_eq!(ENGINE, spec.engine);
        assert_eq!(DesiredState::Present, spec.state);
        assert!(!spec.wait);
        assert_eq!(None, spec.wait_timeout);
    }

    #[test]
    fn validate_should_require_instance_type_on_present() {
        let spec: Spec =
            serde_yaml::from_str("instance_id: instance-1\ncluster_id: new-cluster-name")
                .expect("task to be deserialized");

        assert!(matches!(
            spec.validate(),
            Err(Error::MissingOption("instance_type"))
        ));
    }

    #[test]
    fn validate_should_require_cluster_id_on_present() {
        let spec: Spec = serde_yaml::from_str("instance_id: instance-1")
            .expect("task to be deserialized");

        assert!(matches!(
            spec.validate(),
            Err(Error::MissingOption("cluster_id"))
        ));
    }

    #[test]
    fn validate_should_reject_running_state() {
        let spec = spec("state: running");

        assert!(matches!(spec.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn validate_should_not_require_create_options_on_absent() {
        let spec: Spec = serde_yaml::from_str("instance_id: instance-1\nstate: absent")
            .expect("task to be deserialized");

        assert!(spec.validate().is_ok());
    }

    #[test]
    fn plan_should_create_an_absent_instance() {
        assert_eq!(Action::Create, plan(&spec(""), None));
    }

    #[test]
    fn plan_should_skip_a_present_instance() {
        let observed = fake::instance("instance-1", "new-cluster-name", Status::Available);

        assert_eq!(Action::Skip, plan(&spec(""), Some(&observed)));
    }

    #[test]
    fn plan_should_delete_an_instance_desired_absent() {
        let observed = fake::instance("instance-1", "new-cluster-name", Status::Available);

        assert_eq!(Action::Delete, plan(&spec("state: absent"), Some(&observed)));
    }

    #[test]
    fn plan_should_skip_an_absent_instance_desired_absent() {
        assert_eq!(Action::Skip, plan(&spec("state: absent"), None));
    }

    #[tokio::test]
    async fn reconcile_should_fail_when_the_cluster_does_not_exist() {
        let api = fake::Fake::default();
        let reconciler = Reconciler::new(api, configuration());

        let err = reconciler
            .reconcile(&spec(""))
            .await
            .expect_err("reconciliation to surface the missing dependency");

        assert!(matches!(err, Error::ClusterNotFound(_, _)));
        assert_eq!(0, reconciler.api.count("create_instance"));
    }

    #[tokio::test]
    async fn reconcile_should_create_an_instance_in_a_cluster_being_created() {
        let api =
            fake::Fake::default().with_cluster(fake::cluster("new-cluster-name", Status::Creating));
        let reconciler = Reconciler::new(api, configuration());

        let outcome = reconciler
            .reconcile(&spec(""))
            .await
            .expect("reconciliation to succeed");

        assert!(outcome.changed);
        assert_eq!(1, reconciler.api.count("create_instance"));
    }

    #[tokio::test]
    async fn reconcile_should_be_idempotent() {
        let api = fake::Fake::default()
            .with_cluster(fake::cluster("new-cluster-name", Status::Available))
            .with_instance(fake::instance(
                "instance-1",
                "new-cluster-name",
                Status::Available,
            ));
        let reconciler = Reconciler::new(api, configuration());

        let first = reconciler
            .reconcile(&spec(""))
            .await
            .expect("reconciliation to succeed");
        let second = reconciler
            .reconcile(&spec(""))
            .await
            .expect("reconciliation to succeed");

        assert!(!first.changed);
        assert!(!second.changed);
        assert_eq!(0, reconciler.api.count("create_instance"));
    }

    #[tokio::test]
    async fn reconcile_should_not_mutate_an_absent_instance_desired_absent() {
        let api = fake::Fake::default();
        let reconciler = Reconciler::new(api, configuration());

        let outcome = reconciler
            .reconcile(&spec("state: absent"))
            .await
            .expect("reconciliation to succeed");

        assert!(!outcome.changed);
        assert_eq!(None, outcome.resource);
        assert_eq!(vec!["instance".to_string()], reconciler.api.calls());
    }

    #[tokio::test]
    async fn reconcile_should_delete_a_present_instance() {
        let api = fake::Fake::default().with_instance(fake::instance(
            "instance-1",
            "new-cluster-name",
            Status::Available,
        ));
        let reconciler = Reconciler::new(api, configuration());

        let outcome = reconciler
            .reconcile(&spec("state: absent"))
            .await
            .expect("reconciliation to succeed");

        assert!(outcome.changed);
        assert_eq!(1, reconciler.api.count("delete_instance"));
    }

    #[tokio::test]
    async fn reconcile_should_wait_until_the_instance_is_available() {
        let api = fake::Fake::default()
            .with_cluster(fake::cluster("new-cluster-name", Status::Available))
            .with_instance_statuses("instance-1", &[Status::Creating, Status::Available]);
        let reconciler = Reconciler::new(api, configuration());

        let outcome = reconciler
            .reconcile(&spec("wait: true"))
            .await
            .expect("reconciliation to succeed");

        assert!(outcome.changed);
        assert_eq!(
            Status::Available,
            outcome.resource.expect("instance to be described").status
        );
    }

    #[tokio::test]
    async fn reconcile_should_fail_with_a_timeout_instead_of_hanging() {
        let mut configuration = Configuration::default();
        configuration.wait.interval = 0;
        configuration.wait.instance_timeout = 0;

        let api =
            fake::Fake::default().with_cluster(fake::cluster("new-cluster-name", Status::Available));
        let reconciler = Reconciler::new(api, Arc::new(configuration));

        let err = reconciler
            .reconcile(&spec("wait: true"))
            .await
            .expect_err("reconciliation to time out");

        assert!(matches!(err, Error::AvailableTimeout(_, 0)));
    }

    #[tokio::test]
    async fn reconcile_should_wait_until_the_instance_is_deleted() {
        let api = fake::Fake::default()
            .with_instance(fake::instance(
                "instance-1",
                "new-cluster-name",
                Status::Available,
            ))
            .with_instance_statuses("instance-1", &[Status::Deleting, Status::Deleting]);
        let reconciler = Reconciler::new(api, configuration());

        let outcome = reconciler
            .reconcile(&spec("state: absent\nwait: true"))
            .await
            .expect("reconciliation to succeed");

        assert!(outcome.changed);
        assert_eq!(None, outcome.resource);
    }
}
