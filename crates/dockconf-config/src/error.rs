//! Error types for configuration operations.
//!
//! # Design
//!
//! - One taxonomy for construction, lookup, validation and mutation failures.
//! - Field-level failures carry the config name so listings can render them inline.
//! - Filesystem errors keep their source; construction-time ones surface as
//!   `ImproperlyConfigured` naming the offending path.

use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;

use dockconf_fsops::FsOpsError;
use thiserror::Error;

use crate::field::{FieldError, ValidationError};

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Why a configuration value could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReason {
    /// No stored value and no default.
    NotSet,
    /// The provisioned secret exists but the process may not read it.
    Forbidden,
}

impl Display for MissingReason {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::NotSet => "Not set.",
            Self::Forbidden => "Access forbidden.",
        })
    }
}

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Structural or authoring problem detected while building the engine.
    #[error("improperly configured: {message}")]
    ImproperlyConfigured {
        /// Description naming the offending path, field or section.
        message: String,
        /// Filesystem policy failure behind the problem, when there is one.
        source: Option<FsOpsError>,
    },
    /// A field has no stored value and no default.
    #[error("{name}: {reason}")]
    ConfigMissing {
        /// Name of the config.
        name: String,
        /// Why the value is unavailable.
        reason: MissingReason,
    },
    /// A stored or supplied value failed conversion or bounds checks.
    #[error("{name}: {source}")]
    ValueValidation {
        /// Name of the config.
        name: String,
        /// Validation failure.
        source: ValidationError,
    },
    /// A mutation was attempted without root mode.
    #[error("root mode is needed to {operation}")]
    RootModeNeeded {
        /// Operation that was refused.
        operation: &'static str,
    },
    /// The name is not declared by any section.
    #[error("no such config: {name}")]
    UnknownConfig {
        /// Name that was looked up.
        name: String,
    },
    /// A safe-mode write collided with an existing value.
    #[error("the config {name} is already set and safe mode was requested")]
    AlreadyExists {
        /// Name of the config.
        name: String,
    },
    /// Reading or rewriting a configuration file failed.
    #[error("configuration io failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// A filesystem policy operation failed outside engine construction.
    #[error("filesystem operation failed")]
    FsOps {
        /// Operation identifier.
        operation: &'static str,
        /// Source fsops error.
        source: FsOpsError,
    },
    /// A module declaration file could not be parsed.
    #[error("invalid module declaration {locator}: {detail}")]
    Declaration {
        /// Locator of the declaration file.
        locator: String,
        /// Parser diagnostic.
        detail: String,
    },
    /// The line-store entry pattern failed to compile.
    #[error("line-store pattern failed to compile")]
    Pattern {
        /// Source regex error.
        source: regex::Error,
    },
}

impl ConfigError {
    pub(crate) fn improper(message: impl Into<String>) -> Self {
        Self::ImproperlyConfigured {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a filesystem failure met while validating the engine's files.
    pub(crate) fn path_policy(source: FsOpsError) -> Self {
        let message = match source.path() {
            Some(path) => format!("{}: {source}", path.display()),
            None => source.to_string(),
        };
        Self::ImproperlyConfigured {
            message,
            source: Some(source),
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(name: &str, source: ValidationError) -> Self {
        Self::ValueValidation {
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn field(name: &str, error: FieldError) -> Self {
        match error {
            FieldError::Missing => Self::ConfigMissing {
                name: name.to_string(),
                reason: MissingReason::NotSet,
            },
            FieldError::Invalid(source) => Self::validation(name, source),
        }
    }
}
