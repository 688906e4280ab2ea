//! # DocumentDB module
//!
//! This module provide structures, traits and helpers related to the
//! DocumentDB control plane

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use async_trait::async_trait;
use serde::{Serialize, Serializer};

pub mod client;

// -----------------------------------------------------------------------------
// Status enumeration

/// lifecycle status of a cluster or instance as reported by the control
/// plane, `creating` and `deleting` are transient, `available` and `stopped`
/// are stable, `failed` is terminal
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Status {
    Available,
    Creating,
    Deleting,
    Failed,
    Modifying,
    Rebooting,
    Starting,
    Stopped,
    Stopping,
    Other(String),
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "available" => Self::Available,
            "creating" => Self::Creating,
            "deleting" => Self::Deleting,
            "failed" => Self::Failed,
            "modifying" => Self::Modifying,
            "rebooting" => Self::Rebooting,
            "starting" => Self::Starting,
            "stopped" => Self::Stopped,
            "stopping" => Self::Stopping,
            _ => Self::Other(s.to_lowercase()),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Creating => write!(f, "creating"),
            Self::Deleting => write!(f, "deleting"),
            Self::Failed => write!(f, "failed"),
            Self::Modifying => write!(f, "modifying"),
            Self::Rebooting => write!(f, "rebooting"),
            Self::Starting => write!(f, "starting"),
            Self::Stopped => write!(f, "stopped"),
            Self::Stopping => write!(f, "stopping"),
            Self::Other(status) => write!(f, "{}", status),
        }
    }
}

impl Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

// -----------------------------------------------------------------------------
// Cluster structure

/// observed description of a cluster, mirrors what the control plane
/// currently reports
#[derive(Serialize, PartialEq, Eq, Clone, Debug)]
pub struct Cluster {
    #[serde(rename = "identifier")]
    pub identifier: String,
    #[serde(rename = "status")]
    pub status: Status,
    #[serde(rename = "engine")]
    pub engine: Option<String>,
    #[serde(rename = "engineVersion")]
    pub engine_version: Option<String>,
    #[serde(rename = "endpoint")]
    pub endpoint: Option<String>,
    #[serde(rename = "readerEndpoint")]
    pub reader_endpoint: Option<String>,
    #[serde(rename = "port")]
    pub port: Option<i32>,
    #[serde(rename = "masterUsername")]
    pub master_username: Option<String>,
    #[serde(rename = "subnetGroup")]
    pub subnet_group: Option<String>,
    #[serde(rename = "securityGroupIds")]
    pub security_group_ids: Vec<String>,
    #[serde(rename = "availabilityZones")]
    pub availability_zones: Vec<String>,
    #[serde(rename = "arn")]
    pub arn: Option<String>,
}

// -----------------------------------------------------------------------------
// Instance structure

/// observed description of an instance attached to a cluster
#[derive(Serialize, PartialEq, Eq, Clone, Debug)]
pub struct Instance {
    #[serde(rename = "identifier")]
    pub identifier: String,
    #[serde(rename = "status")]
    pub status: Status,
    #[serde(rename = "clusterIdentifier")]
    pub cluster_identifier: Option<String>,
    #[serde(rename = "instanceClass")]
    pub instance_class: Option<String>,
    #[serde(rename = "engine")]
    pub engine: Option<String>,
    #[serde(rename = "availabilityZone")]
    pub availability_zone: Option<String>,
    #[serde(rename = "preferredMaintenanceWindow")]
    pub preferred_maintenance_window: Option<String>,
    #[serde(rename = "endpoint")]
    pub endpoint: Option<String>,
    #[serde(rename = "port")]
    pub port: Option<i32>,
    #[serde(rename = "arn")]
    pub arn: Option<String>,
}

// -----------------------------------------------------------------------------
// ClusterOpts structure

/// parameters of a cluster creation, restoring from a snapshot ignores the
/// master credentials as the control plane takes them from the snapshot
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct ClusterOpts {
    pub identifier: String,
    pub engine: String,
    pub engine_version: Option<String>,
    pub master_username: Option<String>,
    pub master_password: Option<String>,
    pub port: Option<i32>,
    pub subnet_group: Option<String>,
    pub security_group_ids: Option<Vec<String>>,
    pub availability_zones: Option<Vec<String>>,
    pub parameter_group: Option<String>,
    pub tags: Option<BTreeMap<String, String>>,
}

// -----------------------------------------------------------------------------
// ClusterDeleteOpts structure

/// parameters of a cluster deletion, a final snapshot is skipped unless an
/// identifier for it is given
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct ClusterDeleteOpts {
    pub identifier: String,
    pub final_snapshot_identifier: Option<String>,
}

// -----------------------------------------------------------------------------
// InstanceOpts structure

/// parameters of an instance creation
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct InstanceOpts {
    pub identifier: String,
    pub cluster_identifier: String,
    pub instance_class: String,
    pub engine: String,
    pub availability_zone: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    pub tags: Option<BTreeMap<String, String>>,
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to describe cluster '{0}', {1}")]
    DescribeCluster(String, String),
    #[error("failed to create cluster '{0}', {1}")]
    CreateCluster(String, String),
    #[error("failed to restore cluster '{0}' from snapshot '{1}', {2}")]
    RestoreCluster(String, String, String),
    #[error("failed to start cluster '{0}', {1}")]
    StartCluster(String, String),
    #[error("failed to update master password of cluster '{0}', {1}")]
    UpdateClusterPassword(String, String),
    #[error("failed to delete cluster '{0}', {1}")]
    DeleteCluster(String, String),
    #[error("failed to describe instance '{0}', {1}")]
    DescribeInstance(String, String),
    #[error("failed to create instance '{0}', {1}")]
    CreateInstance(String, String),
    #[error("failed to delete instance '{0}', {1}")]
    DeleteInstance(String, String),
}

// -----------------------------------------------------------------------------
// ControlPlane trait

/// remote cluster and instance management api, describe operations return
/// `None` for absent resources, delete operations return `Ok(None)` when the
/// resource was already gone
#[async_trait]
pub trait ControlPlane {
    async fn cluster(&self, identifier: &str) -> Result<Option<Cluster>, Error>;

    async fn create_cluster(&self, opts: &ClusterOpts) -> Result<Cluster, Error>;

    async fn restore_cluster(&self, opts: &ClusterOpts, snapshot: &str) -> Result<Cluster, Error>;

    async fn start_cluster(&self, identifier: &str) -> Result<Cluster, Error>;

    async fn update_cluster_password(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Cluster, Error>;

    async fn delete_cluster(&self, opts: &ClusterDeleteOpts) -> Result<Option<Cluster>, Error>;

    async fn instance(&self, identifier: &str) -> Result<Option<Instance>, Error>;

    async fn create_instance(&self, opts: &InstanceOpts) -> Result<Instance, Error>;

    async fn delete_instance(&self, identifier: &str) -> Result<Option<Instance>, Error>;
}

// -----------------------------------------------------------------------------
// Fake control plane, test only


// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::Status;

    #[test]
    fn status_should_parse_control_plane_strings() {
        assert_eq!(Status::Available, Status::from("available"));
        assert_eq!(Status::Available, Status::from("Available"));
        assert_eq!(Status::Creating, Status::from("creating"));
        assert_eq!(Status::Deleting, Status::from("deleting"));
        assert_eq!(Status::Failed, Status::from("failed"));
        assert_eq!(Status::Stopped, Status::from("stopped"));
        assert_eq!(
            Status::Other("backing-up".to_string()),
            Status::from("backing-up")
        );
    }

    #[test]
    fn status_should_display_as_control_plane_string() {
        assert_eq!("available", Status::Available.to_string());
        assert_eq!("creating", Status::Creating.to_string());
        assert_eq!(
            "resetting-master-credentials",
            Status::Other("resetting-master-credentials".to_string()).to_string()
        );
    }
}
