//! Layered configuration: defaults, then an optional YAML file, then
//! `ROWSCOPE_`-prefixed environment variables (`__` separates nesting levels,
//! e.g. `ROWSCOPE_DATABASE__DSN`).

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connect::ConnectOpts;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowscopeConfig {
    pub database: DatabaseConfig,
    /// Sessions load navigation collections on demand when true.
    pub lazy_load: bool,
}

impl Default for RowscopeConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            lazy_load: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub dsn: String,
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
    pub create_sqlite_dirs: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let opts = ConnectOpts::default();
        Self {
            dsn: "sqlite::memory:".to_owned(),
            max_conns: opts.max_conns,
            min_conns: opts.min_conns,
            acquire_timeout: opts.acquire_timeout,
            idle_timeout: opts.idle_timeout,
            max_lifetime: opts.max_lifetime,
            test_before_acquire: opts.test_before_acquire,
            create_sqlite_dirs: opts.create_sqlite_dirs,
        }
    }
}

impl From<&DatabaseConfig> for ConnectOpts {
    fn from(cfg: &DatabaseConfig) -> Self {
        Self {
            max_conns: cfg.max_conns,
            min_conns: cfg.min_conns,
            acquire_timeout: cfg.acquire_timeout,
            idle_timeout: cfg.idle_timeout,
            max_lifetime: cfg.max_lifetime,
            test_before_acquire: cfg.test_before_acquire,
            create_sqlite_dirs: cfg.create_sqlite_dirs,
        }
    }
}

impl RowscopeConfig {
    pub const ENV_PREFIX: &'static str = "ROWSCOPE_";

    /// Base figment: defaults, the YAML file when given, then the environment.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    /// Extract the configuration from a prepared figment.
    ///
    /// # Errors
    /// Returns `ConfigError` when a value has the wrong shape.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// Load defaults, `path` and environment overrides.
    ///
    /// # Errors
    /// Returns `ConfigError` when a value has the wrong shape.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(path))
    }

    #[must_use]
    pub fn connect_opts(&self) -> ConnectOpts {
        ConnectOpts::from(&self.database)
    }
}
