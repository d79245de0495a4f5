//! Engine settings and their resolution from the process environment.
//!
//! # Design
//! - Every parameter falls back to an environment variable, then to a fixed
//!   default. Empty variables count as unset.
//! - Resolution takes an injectable lookup so tests never touch the real
//!   environment.
//! - The deployment context is explicit; [`Deployment::detect`] is a helper
//!   for callers that infer it from the project checkout.

use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Variable naming the configuration module.
pub const MODULE_ENV: &str = "DOCKCONF_CONFIG_MODULE";
/// Variable naming the plain env file.
pub const ENV_FILE_ENV: &str = "DOCKCONF_ENV_FILE";
/// Variable naming the secret env file.
pub const SECRET_FILE_ENV: &str = "DOCKCONF_SECRET_FILE";
/// Variable naming the provisioned secrets directory.
pub const SECRET_DIR_ENV: &str = "DOCKCONF_SECRET_DIR";

/// Module used when nothing else is configured.
pub const DEFAULT_MODULE: &str = "dockconf_conf";
/// Default plain env file.
pub const DEFAULT_ENV_FILE: &str = "/host/.env";
/// Default secret env file.
pub const DEFAULT_SECRET_FILE: &str = "/host/.secret.env";
/// Default provisioned secrets directory.
pub const DEFAULT_SECRET_DIR: &str = "/run/secrets";

/// Deployment context the engine validates ownership against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    /// Working checkout; the secret directory belongs to the project owner.
    Development,
    /// Deployed host; the project directory and secret directory belong to root.
    #[default]
    Production,
}

impl Deployment {
    /// Development when `project_dir` holds a `.git` directory.
    #[must_use]
    pub fn detect(project_dir: &Path) -> Self {
        if project_dir.join(".git").is_dir() {
            Self::Development
        } else {
            Self::Production
        }
    }
}

/// Resolved locations of the files the engine manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigPaths {
    /// Plain `NAME=VALUE` file.
    pub env_file: PathBuf,
    /// Base64 `NAME=VALUE` file.
    pub secret_file: PathBuf,
    /// One file per provisioned secret.
    pub secret_dir: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
            secret_file: PathBuf::from(DEFAULT_SECRET_FILE),
            secret_dir: PathBuf::from(DEFAULT_SECRET_DIR),
        }
    }
}

/// Explicitly supplied values that win over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    /// Module locator.
    pub module: Option<String>,
    /// Plain env file.
    pub env_file: Option<PathBuf>,
    /// Secret env file.
    pub secret_file: Option<PathBuf>,
    /// Secrets directory.
    pub secret_dir: Option<PathBuf>,
}

impl SettingsOverrides {
    /// Resolve against the process environment.
    #[must_use]
    pub fn resolve(self, project_dir: impl Into<PathBuf>) -> EngineSettings {
        self.resolve_with(project_dir, |key| env::var(key).ok())
    }

    /// Resolve against `lookup` instead of the process environment.
    #[must_use]
    pub fn resolve_with<F>(self, project_dir: impl Into<PathBuf>, lookup: F) -> EngineSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let path = |explicit: Option<PathBuf>, key: &str, default: &str| {
            explicit
                .or_else(|| from_env(key).map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(default))
        };

        let module = self
            .module
            .or_else(|| from_env(MODULE_ENV))
            .unwrap_or_else(|| DEFAULT_MODULE.to_string());
        let paths = ConfigPaths {
            env_file: path(self.env_file, ENV_FILE_ENV, DEFAULT_ENV_FILE),
            secret_file: path(self.secret_file, SECRET_FILE_ENV, DEFAULT_SECRET_FILE),
            secret_dir: path(self.secret_dir, SECRET_DIR_ENV, DEFAULT_SECRET_DIR),
        };
        EngineSettings::new(module, paths, project_dir)
    }
}

/// Everything needed to construct a [`crate::ConfigEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Module locator handed to the loader.
    pub module: String,
    /// Managed files.
    pub paths: ConfigPaths,
    /// Directory whose owner owns every managed file.
    pub project_dir: PathBuf,
    /// Deployment context.
    pub deployment: Deployment,
    /// Whether mutating operations are permitted.
    pub root_mode: bool,
}

impl EngineSettings {
    /// Settings for a production engine without root mode.
    #[must_use]
    pub fn new(module: impl Into<String>, paths: ConfigPaths, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            module: module.into(),
            paths,
            project_dir: project_dir.into(),
            deployment: Deployment::Production,
            root_mode: false,
        }
    }

    /// Enable or disable root mode.
    #[must_use]
    pub const fn with_root_mode(mut self, root_mode: bool) -> Self {
        self.root_mode = root_mode;
        self
    }

    /// Select the deployment context.
    #[must_use]
    pub const fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = deployment;
        self
    }
}
