//! # Design
//!
//! - Provide structured errors for filesystem policy checks and secret writes.
//! - Capture operation context (paths, ids, modes) so failures name the exact path.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::policy::PathKind;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by filesystem policy enforcement.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while interacting with the filesystem.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Nix syscall failures.
    #[error("fsops nix failure")]
    Nix {
        /// Operation that triggered the nix failure.
        operation: &'static str,
        /// Path involved in the nix failure.
        path: PathBuf,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// Renaming a staged temporary file into place failed.
    #[error("fsops persist failure")]
    Persist {
        /// Final destination of the staged file.
        path: PathBuf,
        /// Underlying persist error.
        source: tempfile::PersistError,
    },
    /// A required path does not exist.
    #[error("no such {kind}")]
    Missing {
        /// Kind of path that was expected.
        kind: PathKind,
        /// Path that was expected.
        path: PathBuf,
    },
    /// A path exists but is not of the expected kind.
    #[error("not a {expected}")]
    WrongKind {
        /// Kind of path that was expected.
        expected: PathKind,
        /// Offending path.
        path: PathBuf,
    },
    /// A path is owned by an unexpected user or group.
    #[error("owned by {actual_uid}:{actual_gid}, expected {expected_uid}:{expected_gid}")]
    OwnerMismatch {
        /// Offending path.
        path: PathBuf,
        /// Expected owner uid.
        expected_uid: u32,
        /// Expected owner gid.
        expected_gid: u32,
        /// Actual owner uid.
        actual_uid: u32,
        /// Actual owner gid.
        actual_gid: u32,
    },
    /// A path grants permission bits the policy forbids.
    #[error("mode {mode:#o} grants bits forbidden by mask {forbidden:#o}")]
    ModeTooPermissive {
        /// Offending path.
        path: PathBuf,
        /// Permission bits found on the path.
        mode: u32,
        /// Bits that must not be set.
        forbidden: u32,
    },
    /// User lookup failed when resolving ownership.
    #[error("fsops user lookup failed")]
    UserLookup {
        /// Username that failed lookup.
        user: String,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// Group lookup failed when resolving ownership.
    #[error("fsops group lookup failed")]
    GroupLookup {
        /// Group name that failed lookup.
        group: String,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// Input validation failures.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn nix(operation: &'static str, path: impl Into<PathBuf>, source: nix::Error) -> Self {
        Self::Nix {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Path the error refers to, when one is known.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. }
            | Self::Nix { path, .. }
            | Self::Persist { path, .. }
            | Self::Missing { path, .. }
            | Self::WrongKind { path, .. }
            | Self::OwnerMismatch { path, .. }
            | Self::ModeTooPermissive { path, .. } => Some(path),
            Self::UserLookup { .. } | Self::GroupLookup { .. } | Self::InvalidInput { .. } => None,
        }
    }

    /// Whether the error reports a path that violates the expected policy
    /// rather than a failing system call.
    #[must_use]
    pub const fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::Missing { .. }
                | Self::WrongKind { .. }
                | Self::OwnerMismatch { .. }
                | Self::ModeTooPermissive { .. }
        )
    }
}
