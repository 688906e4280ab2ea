//! # Configuration module
//!
//! This module provide utilities and helpers to interact with the configuration

use std::{convert::TryFrom, env, path::PathBuf};

use config::{
    builder::{ConfigBuilder, DefaultState},
    Config, ConfigError, Environment, File,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

// -----------------------------------------------------------------------------
// Constants

pub const DEFAULT_WAIT_INTERVAL: u64 = 5;
pub const DEFAULT_CREATE_TIMEOUT: u64 = 600;
pub const DEFAULT_RESTORE_TIMEOUT: u64 = 3600;
pub const DEFAULT_DELETE_TIMEOUT: u64 = 600;
pub const DEFAULT_INSTANCE_TIMEOUT: u64 = 1200;

// -----------------------------------------------------------------------------
// Api structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Api {
    #[serde(rename = "endpoint")]
    pub endpoint: Option<String>,
    #[serde(rename = "region")]
    pub region: Option<String>,
}

// -----------------------------------------------------------------------------
// Wait structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Wait {
    #[serde(rename = "interval")]
    pub interval: u64,
    #[serde(rename = "create_timeout")]
    pub create_timeout: u64,
    #[serde(rename = "restore_timeout")]
    pub restore_timeout: u64,
    #[serde(rename = "delete_timeout")]
    pub delete_timeout: u64,
    #[serde(rename = "instance_timeout")]
    pub instance_timeout: u64,
}

impl Default for Wait {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WAIT_INTERVAL,
            create_timeout: DEFAULT_CREATE_TIMEOUT,
            restore_timeout: DEFAULT_RESTORE_TIMEOUT,
            delete_timeout: DEFAULT_DELETE_TIMEOUT,
            instance_timeout: DEFAULT_INSTANCE_TIMEOUT,
        }
    }
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to load file '{0:?}', {1}")]
    File(PathBuf, ConfigError),
    #[error("failed to load configuration, {0}")]
    Cast(ConfigError),
    #[error("failed to set default for key '{0}', {1}")]
    Default(String, ConfigError),
}

// -----------------------------------------------------------------------------
// Configuration structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Configuration {
    #[serde(rename = "api", default)]
    pub api: Api,
    #[serde(rename = "wait", default)]
    pub wait: Wait,
}

impl TryFrom<PathBuf> for Configuration {
    type Error = Error;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        defaults()?
            .add_source(
                Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_"))
                    .separator("__"),
            )
            .add_source(File::from(path.to_owned()).required(true))
            .build()
            .map_err(|err| Error::File(path, err))?
            .try_deserialize()
            .map_err(Error::Cast)
    }
}

impl Configuration {
    pub fn try_default() -> Result<Self, Error> {
        let mut builder = defaults()?.add_source(
            Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_")).separator("__"),
        );

        let mut paths = vec![
            PathBuf::from(format!("/usr/share/{}/config", env!("CARGO_PKG_NAME"))),
            PathBuf::from(format!("/etc/{}/config", env!("CARGO_PKG_NAME"))),
        ];

        if let Ok(home) = env::var("HOME") {
            paths.push(PathBuf::from(format!(
                "{}/.config/{}/config",
                home,
                env!("CARGO_PKG_NAME")
            )));
            paths.push(PathBuf::from(format!(
                "{}/.local/share/{}/config",
                home,
                env!("CARGO_PKG_NAME")
            )));
        }

        paths.push(PathBuf::from("config"));

        for path in paths {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .build()
            .map_err(Error::Cast)?
            .try_deserialize()
            .map_err(Error::Cast)
    }

    pub fn help(&self) {
        debug!(
            endpoint = self.api.endpoint.as_deref().unwrap_or("<default>"),
            region = self.api.region.as_deref().unwrap_or("<default>"),
            interval = self.wait.interval,
            "Loaded configuration",
        );
    }
}

// -----------------------------------------------------------------------------
// helpers

fn defaults() -> Result<ConfigBuilder<DefaultState>, Error> {
    let defaults = [
        ("wait.interval", DEFAULT_WAIT_INTERVAL),
        ("wait.create_timeout", DEFAULT_CREATE_TIMEOUT),
        ("wait.restore_timeout", DEFAULT_RESTORE_TIMEOUT),
        ("wait.delete_timeout", DEFAULT_DELETE_TIMEOUT),
        ("wait.instance_timeout", DEFAULT_INSTANCE_TIMEOUT),
    ];

    let mut builder = Config::builder();
    for (key, value) in defaults {
        builder = builder
            .set_default(key, value as i64)
            .map_err(|err| Error::Default(key.into(), err))?;
    }

    Ok(builder)
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::{convert::TryFrom, fs, path::PathBuf};

    use super::{
        Configuration, DEFAULT_CREATE_TIMEOUT, DEFAULT_INSTANCE_TIMEOUT, DEFAULT_RESTORE_TIMEOUT,
        DEFAULT_WAIT_INTERVAL,
    };

    #[test]
    fn configuration_should_have_defaults() {
        let configuration = Configuration::default();

        assert_eq!(None, configuration.api.endpoint);
        assert_eq!(None, configuration.api.region);
        assert_eq!(DEFAULT_WAIT_INTERVAL, configuration.wait.interval);
        assert_eq!(DEFAULT_CREATE_TIMEOUT, configuration.wait.create_timeout);
        assert_eq!(DEFAULT_RESTORE_TIMEOUT, configuration.wait.restore_timeout);
        assert_eq!(DEFAULT_INSTANCE_TIMEOUT, configuration.wait.instance_timeout);
    }

    #[test]
    fn configuration_should_load_without_any_file() {
        let configuration = Configuration::try_default().expect("configuration to be loaded");

        assert_eq!(DEFAULT_WAIT_INTERVAL, configuration.wait.interval);
        assert_eq!(DEFAULT_CREATE_TIMEOUT, configuration.wait.create_timeout);
    }

    #[test]
    fn configuration_should_load_from_file() {
        let directory = tempfile::tempdir().expect("temporary directory to be created");
        let path = directory.path().join("config.toml");

        fs::write(
            &path,
            r#"
[api]
region = "us-east-1"

[wait]
interval = 1
"#,
        )
        .expect("configuration file to be written");

        let configuration =
            Configuration::try_from(path).expect("configuration file to be loaded");

        assert_eq!(Some("us-east-1".to_string()), configuration.api.region);
        assert_eq!(1, configuration.wait.interval);
        assert_eq!(DEFAULT_CREATE_TIMEOUT, configuration.wait.create_timeout);
    }

    #[test]
    fn configuration_should_fail_on_missing_explicit_file() {
        let result = Configuration::try_from(PathBuf::from("/nonexistent/config.toml"));

        assert!(result.is_err());
    }
}
