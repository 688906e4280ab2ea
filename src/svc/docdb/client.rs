//! # Client module
//!
//! This module provides the `aws-sdk-docdb` backed implementation of the
//! control plane

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_docdb::{
    error::DisplayErrorContext,
    types::{DbCluster, DbInstance, Tag},
};
use tracing::debug;

use crate::svc::{
    cfg::Configuration,
    docdb::{
        Cluster, ClusterDeleteOpts, ClusterOpts, ControlPlane, Error, Instance, InstanceOpts,
        Status,
    },
};

// -----------------------------------------------------------------------------
// Client structure

pub struct Client {
    inner: aws_sdk_docdb::Client,
}

impl Client {
    /// returns a new client resolving credentials and region from the
    /// environment, the task's region takes precedence over the configured
    /// one
    pub async fn new(configuration: &Configuration, region: Option<&str>) -> Self {
        let region = region
            .map(str::to_string)
            .or_else(|| configuration.api.region.to_owned());

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            debug!(region = &region, "Override control plane region");
            loader = loader.region(Region::new(region));
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_docdb::config::Builder::from(&shared);
        if let Some(endpoint) = &configuration.api.endpoint {
            debug!(endpoint = endpoint, "Override control plane endpoint");
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            inner: aws_sdk_docdb::Client::from_conf(builder.build()),
        }
    }
}

// -----------------------------------------------------------------------------
// Conversions

impl From<&DbCluster> for Cluster {
    fn from(cluster: &DbCluster) -> Self {
        Self {
            identifier: cluster
                .db_cluster_identifier()
                .unwrap_or_default()
                .to_string(),
            status: Status::from(cluster.status().unwrap_or_default()),
            engine: cluster.engine().map(str::to_string),
            engine_version: cluster.engine_version().map(str::to_string),
            endpoint: cluster.endpoint().map(str::to_string),
            reader_endpoint: cluster.reader_endpoint().map(str::to_string),
            port: cluster.port(),
            master_username: cluster.master_username().map(str::to_string),
            subnet_group: cluster.db_subnet_group().map(str::to_string),
            security_group_ids: cluster
                .vpc_security_groups()
                .iter()
                .filter_map(|membership| membership.vpc_security_group_id())
                .map(str::to_string)
                .collect(),
            availability_zones: cluster.availability_zones().to_vec(),
            arn: cluster.db_cluster_arn().map(str::to_string),
        }
    }
}

impl From<&DbInstance> for Instance {
    fn from(instance: &DbInstance) -> Self {
        Self {
            identifier: instance
                .db_instance_identifier()
                .unwrap_or_default()
                .to_string(),
            status: Status::from(instance.db_instance_status().unwrap_or_default()),
            cluster_identifier: instance.db_cluster_identifier().map(str::to_string),
            instance_class: instance.db_instance_class().map(str::to_string),
            engine: instance.engine().map(str::to_string),
            availability_zone: instance.availability_zone().map(str::to_string),
            preferred_maintenance_window: instance
                .preferred_maintenance_window()
                .map(str::to_string),
            endpoint: instance
                .endpoint()
                .and_then(|endpoint| endpoint.address().map(str::to_string)),
            port: instance.endpoint().and_then(|endpoint| endpoint.port()),
            arn: instance.db_instance_arn().map(str::to_string),
        }
    }
}

// -----------------------------------------------------------------------------
// helpers

fn message<E>(err: E) -> String
where
    E: std::error::Error,
{
    format!("{}", DisplayErrorContext(err))
}

fn tags(tags: &Option<BTreeMap<String, String>>) -> Option<Vec<Tag>> {
    tags.as_ref().map(|tags| {
        tags.iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect()
    })
}

// -----------------------------------------------------------------------------
// ControlPlane implementation

#[async_trait]
impl ControlPlane for Client {
    async fn cluster(&self, identifier: &str) -> Result<Option<Cluster>, Error> {
        let output = match self
            .inner
            .describe_db_clusters()
            .db_cluster_identifier(identifier)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                if err.is_db_cluster_not_found_fault() {
                    return Ok(None);
                }

                return Err(Error::DescribeCluster(identifier.to_string(), message(err)));
            }
        };

        Ok(output
            .db_clusters()
            .iter()
            .find(|cluster| cluster.db_cluster_identifier() == Some(identifier))
            .map(Cluster::from))
    }

    async fn create_cluster(&self, opts: &ClusterOpts) -> Result<Cluster, Error> {
        let output = self
            .inner
            .create_db_cluster()
            .db_cluster_identifier(&opts.identifier)
            .engine(&opts.engine)
            .set_engine_version(opts.engine_version.to_owned())
            .set_master_username(opts.master_username.to_owned())
            .set_master_user_password(opts.master_password.to_owned())
            .set_port(opts.port)
            .set_db_subnet_group_name(opts.subnet_group.to_owned())
            .set_vpc_security_group_ids(opts.security_group_ids.to_owned())
            .set_availability_zones(opts.availability_zones.to_owned())
            .set_db_cluster_parameter_group_name(opts.parameter_group.to_owned())
            .set_tags(tags(&opts.tags))
            .send()
            .await
            .map_err(|err| Error::CreateCluster(opts.identifier.to_owned(), message(err)))?;

        output.db_cluster().map(Cluster::from).ok_or_else(|| {
            Error::CreateCluster(
                opts.identifier.to_owned(),
                "control plane returned no cluster description".to_string(),
            )
        })
    }

    async fn restore_cluster(&self, opts: &ClusterOpts, snapshot: &str) -> Result<Cluster, Error> {
        let output = self
            .inner
            .restore_db_cluster_from_snapshot()
            .db_cluster_identifier(&opts.identifier)
            .snapshot_identifier(snapshot)
            .engine(&opts.engine)
            .set_engine_version(opts.engine_version.to_owned())
            .set_port(opts.port)
            .set_db_subnet_group_name(opts.subnet_group.to_owned())
            .set_vpc_security_group_ids(opts.security_group_ids.to_owned())
            .set_availability_zones(opts.availability_zones.to_owned())
            .set_db_cluster_parameter_group_name(opts.parameter_group.to_owned())
            .set_tags(tags(&opts.tags))
            .send()
            .await
            .map_err(|err| {
                Error::RestoreCluster(
                    opts.identifier.to_owned(),
                    snapshot.to_string(),
                    message(err),
                )
            })?;

        output.db_cluster().map(Cluster::from).ok_or_else(|| {
            Error::RestoreCluster(
                opts.identifier.to_owned(),
                snapshot.to_string(),
                "control plane returned no cluster description".to_string(),
            )
        })
    }

    async fn start_cluster(&self, identifier: &str) -> Result<Cluster, Error> {
        let output = self
            .inner
            .start_db_cluster()
            .db_cluster_identifier(identifier)
            .send()
            .await
            .map_err(|err| Error::StartCluster(identifier.to_string(), message(err)))?;

        output.db_cluster().map(Cluster::from).ok_or_else(|| {
            Error::StartCluster(
                identifier.to_string(),
                "control plane returned no cluster description".to_string(),
            )
        })
    }

    async fn update_cluster_password(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Cluster, Error> {
        let output = self
            .inner
            .modify_db_cluster()
            .db_cluster_identifier(identifier)
            .master_user_password(password)
            .apply_immediately(true)
            .send()
            .await
            .map_err(|err| Error::UpdateClusterPassword(identifier.to_string(), message(err)))?;

        output.db_cluster().map(Cluster::from).ok_or_else(|| {
            Error::UpdateClusterPassword(
                identifier.to_string(),
                "control plane returned no cluster description".to_string(),
            )
        })
    }

    async fn delete_cluster(&self, opts: &ClusterDeleteOpts) -> Result<Option<Cluster>, Error> {
        match self
            .inner
            .delete_db_cluster()
            .db_cluster_identifier(&opts.identifier)
            .skip_final_snapshot(opts.final_snapshot_identifier.is_none())
            .set_final_db_snapshot_identifier(opts.final_snapshot_identifier.to_owned())
            .send()
            .await
        {
            Ok(output) => Ok(output.db_cluster().map(Cluster::from)),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_db_cluster_not_found_fault() {
                    return Ok(None);
                }

                Err(Error::DeleteCluster(opts.identifier.to_owned(), message(err)))
            }
        }
    }

    async fn instance(&self, identifier: &str) -> Result<Option<Instance>, Error> {
        let output = match self
            .inner
            .describe_db_instances()
            .db_instance_identifier(identifier)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                if err.is_db_instance_not_found_fault() {
                    return Ok(None);
                }

                return Err(Error::DescribeInstance(
                    identifier.to_string(),
                    message(err),
                ));
            }
        };

        Ok(output
            .db_instances()
            .iter()
            .find(|instance| instance.db_instance_identifier() == Some(identifier))
            .map(Instance::from))
    }

    async fn create_instance(&self, opts: &InstanceOpts) -> Result<Instance, Error> {
        let output = self
            .inner
            .create_db_instance()
            .db_instance_identifier(&opts.identifier)
            .db_instance_class(&opts.instance_class)
            .engine(&opts.engine)
            .db_cluster_identifier(&opts.cluster_identifier)
            .set_availability_zone(opts.availability_zone.to_owned())
            .set_preferred_maintenance_window(opts.preferred_maintenance_window.to_owned())
            .set_tags(tags(&opts.tags))
            .send()
            .await
            .map_err(|err| Error::CreateInstance(opts.identifier.to_owned(), message(err)))?;

        output.db_instance().map(Instance::from).ok_or_else(|| {
            Error::CreateInstance(
                opts.identifier.to_owned(),
                "control plane returned no instance description".to_string(),
            )
        })
    }

    async fn delete_instance(&self, identifier: &str) -> Result<Option<Instance>, Error> {
        match self
            .inner
            .delete_db_instance()
            .db_instance_identifier(identifier)
            .send()
            .await
        {
            Ok(output) => Ok(output.db_instance().map(Instance::from)),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_db_instance_not_found_fault() {
                    return Ok(None);
                }

                Err(Error::DeleteInstance(identifier.to_string(), message(err)))
            }
        }
    }
}
