//! # Cluster command module
//!
//! This module provides the cluster subcommand implementation

use std::{io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tracing::info;

use crate::{
    cmd::Executor,
    svc::{
        cfg::Configuration,
        docdb::client::Client,
        reconciler::{self, cluster::Spec},
    },
};

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to read task file '{0:?}', {1}")]
    Read(PathBuf, io::Error),
    #[error("failed to deserialize task file '{0:?}', {1}")]
    Deserialize(PathBuf, serde_yaml::Error),
    #[error("failed to reconcile cluster, {0}")]
    Reconcile(reconciler::cluster::Error),
    #[error("failed to serialize reconciliation report, {0}")]
    Serialize(serde_json::Error),
}

impl From<reconciler::cluster::Error> for Error {
    fn from(err: reconciler::cluster::Error) -> Self {
        Self::Reconcile(err)
    }
}

// -----------------------------------------------------------------------------
// Cluster structure

#[derive(clap::Args, Clone, Debug)]
pub struct Cluster {
    /// Specify location of the task file holding the desired cluster state
    #[clap(short = 'f', long = "task")]
    pub task: PathBuf,
}

#[async_trait]
impl Executor for Cluster {
    type Error = Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        let buf = tokio::fs::read_to_string(&self.task)
            .await
            .map_err(|err| Error::Read(self.task.to_owned(), err))?;

        let spec: Spec = serde_yaml::from_str(&buf)
            .map_err(|err| Error::Deserialize(self.task.to_owned(), err))?;

        info!(
            cluster = &spec.cluster_id,
            task = self.task.display().to_string(),
            "Reconcile cluster from task file",
        );

        let client = Client::new(&config, spec.region.as_deref()).await;
        let reconciler = reconciler::cluster::Reconciler::new(client, config);
        let outcome = reconciler.reconcile(&spec).await?;

        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).map_err(Error::Serialize)?
        );

        Ok(())
    }
}
