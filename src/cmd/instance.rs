//! # Instance command module
//!
//! This module provides the instance subcommand implementation

use std::{io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tracing::info;

use crate::{
    cmd::Executor,
    svc::{
        cfg::Configuration,
        docdb::client::Client,
        reconciler::{self, instance::Spec},
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
    #[error("failed to reconcile instance, {0}")]
    Reconcile(reconciler::instance::Error),
    #[error("failed to serialize reconciliation report, {0}")]
    Serialize(serde_json::Error),
}

impl From<reconciler::instance::Error> for Error {
    fn from(err: reconciler::instance::Error) -> Self {
        Self::Reconcile(err)
    }
}

// -----------------------------------------------------------------------------
// Instance structure

#[derive(clap::Args, Clone, Debug)]
pub struct Instance {
    /// Specify location of the task file holding the desired instance state
    #[clap(short = 'f', long = "task")]
    pub task: PathBuf,
}

#[async_trait]
impl Executor for Instance {
    type Error = Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        let buf = tokio::fs::read_to_string(&self.task)
            .await
            .map_err(|err| Error::Read(self.task.to_owned(), err))?;

        let spec: Spec = serde_yaml::from_str(&buf)
            .map_err(|err| Error::Deserialize(self.task.to_owned(), err))?;

        info!(
            instance = &spec.instance_id,
            task = self.task.display().to_string(),
            "Reconcile instance from task file",
        );

        let client = Client::new(&config, spec.region.as_deref()).await;
        let reconciler = reconciler::instance::Reconciler::new(client, config);
        let outcome = reconciler.reconcile(&spec).await?;

        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).map_err(Error::Serialize)?
        );

        Ok(())
    }
}
