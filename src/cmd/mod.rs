//! # Command module
//!
//! This module provide command line interface structures and helpers

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use clap::{ArgAction, Parser, Subcommand};

use crate::svc::cfg::Configuration;

pub mod cluster;
pub mod instance;

// -----------------------------------------------------------------------------
// Executor trait

#[async_trait]
pub trait Executor {
    type Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error>;
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to execute command '{0}', {1}")]
    Execution(String, Arc<Error>),
    #[error("failed to execute command, {0}")]
    Cluster(cluster::Error),
    #[error("failed to execute command, {0}")]
    Instance(instance::Error),
}

// -----------------------------------------------------------------------------
// Command enumeration

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Reconcile a DocumentDB cluster with the desired state of a task file
    #[clap(name = "cluster", aliases = &["clusters"])]
    Cluster(cluster::Cluster),
    /// Reconcile a DocumentDB instance with the desired state of a task file
    #[clap(name = "instance", aliases = &["instances"])]
    Instance(instance::Instance),
}

#[async_trait]
impl Executor for Command {
    type Error = Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::Cluster(cluster) => cluster
                .execute(config)
                .await
                .map_err(Error::Cluster)
                .map_err(|err| Error::Execution("cluster".into(), Arc::new(err))),
            Self::Instance(instance) => instance
                .execute(config)
                .await
                .map_err(Error::Instance)
                .map_err(|err| Error::Execution("instance".into(), Arc::new(err))),
        }
    }
}

// -----------------------------------------------------------------------------
// Args structure

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = env!("CARGO_PKG_DESCRIPTION"), arg_required_else_help = true)]
pub struct Args {
    /// Increase log verbosity
    #[clap(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbosity: u8,
    /// Specify location of configuration
    #[clap(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Check if configuration is healthy
    #[clap(short = 't', long = "check", global = true)]
    pub check: bool,
    #[clap(subcommand)]
    pub command: Option<Command>,
}
