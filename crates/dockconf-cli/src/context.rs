//! Engine construction from global flags, and CLI error types.

use std::fmt::{self, Display, Formatter};

use dockconf_config::{
    ConfigEngine, ConfigError, Deployment, ModuleCatalog, SettingsOverrides,
};

use crate::cli::GlobalArgs;

/// Outcome of a failed command, split by who has to act on it.
///
/// `Usage` covers operator mistakes the command line can fix: a rejected
/// value, an unknown config name, a `--safe` collision or a mutation without
/// `--root`. It exits with 2. `Failure` is everything about the host: missing
/// or too permissive files, unreadable stores, broken module declarations,
/// provisioning errors. It exits with 3.
#[derive(Debug)]
pub(crate) enum CliError {
    Usage(String),
    Failure(anyhow::Error),
}

pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    /// Text printed after `error: `; failures include their cause chain.
    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Usage(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.display_message())
    }
}

impl std::error::Error for CliError {}

/// `ValueValidation`, `UnknownConfig`, `AlreadyExists` and `RootModeNeeded`
/// are usage errors; every other config error is a failure.
impl From<ConfigError> for CliError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::ValueValidation { .. }
            | ConfigError::UnknownConfig { .. }
            | ConfigError::AlreadyExists { .. }
            | ConfigError::RootModeNeeded { .. } => Self::usage(error.to_string()),
            other => Self::failure(other),
        }
    }
}

/// Build the engine described by the global flags.
///
/// Bare module names are looked up as declaration files in the project
/// directory; the deployment is detected from the checkout unless forced.
pub(crate) fn open_engine(args: &GlobalArgs) -> CliResult<ConfigEngine> {
    let project_dir = std::path::absolute(&args.project_dir).map_err(|err| {
        CliError::usage(format!(
            "invalid project directory {}: {err}",
            args.project_dir.display()
        ))
    })?;
    let deployment = args
        .deployment
        .map_or_else(|| Deployment::detect(&project_dir), Deployment::from);
    let overrides = SettingsOverrides {
        module: args.module.clone(),
        env_file: args.env_file.clone(),
        secret_file: args.secret_file.clone(),
        secret_dir: args.secret_dir.clone(),
    };
    let settings = overrides
        .resolve(&project_dir)
        .with_root_mode(args.root)
        .with_deployment(deployment);
    let catalog = ModuleCatalog::new().search_in(&project_dir);
    Ok(ConfigEngine::open(settings, &catalog)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockconf_config::{MissingReason, ValidationError};

    #[test]
    fn operator_mistakes_exit_with_two() {
        let err = CliError::from(ConfigError::UnknownConfig {
            name: "NOPE".into(),
        });
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.display_message(), "no such config: NOPE");

        let err = CliError::from(ConfigError::ValueValidation {
            name: "X".into(),
            source: ValidationError::NotInteger,
        });
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.display_message(), "X: Must be integer.");

        let err = CliError::from(ConfigError::RootModeNeeded { operation: "set" });
        assert_eq!(err.exit_code(), 2);
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn other_errors_exit_with_three() {
        let err = CliError::from(ConfigError::ConfigMissing {
            name: "B".into(),
            reason: MissingReason::NotSet,
        });
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.display_message(), "B: Not set.");
        assert_eq!(err.to_string(), "B: Not set.");
    }
}
