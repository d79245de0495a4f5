//! Ownership and permission policy for configuration paths.
//!
//! # Design
//! - A policy names the expected owner and the permission bits that must never be set.
//! - Verification never repairs a path; creation of missing paths is an explicit opt-in.

use std::fmt::{self, Display, Formatter};
use std::fs::{self, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use tracing::warn;

use crate::error::{FsOpsError, FsOpsResult};
use crate::ownership::Ownership;

const DIRECTORY_BASE_MODE: u32 = 0o777;
const FILE_BASE_MODE: u32 = 0o666;
const PERMISSION_BITS: u32 = 0o7777;

/// Kind of filesystem entry a policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// A directory.
    Directory,
    /// A regular file.
    File,
}

impl Display for PathKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Directory => "directory",
            Self::File => "file",
        })
    }
}

/// Outcome of [`PathPolicy::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// The path already existed and conforms to the policy.
    Existing,
    /// The path was created with the policy's default mode and owner.
    Created,
}

/// Expected owner and forbidden permission bits for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPolicy {
    /// Identity that must own the path.
    pub owner: Ownership,
    /// Permission bits that must not be set on the path.
    pub forbidden_mode: u32,
}

impl PathPolicy {
    /// Build a policy from an owner and a forbidden-bits mask.
    #[must_use]
    pub const fn new(owner: Ownership, forbidden_mode: u32) -> Self {
        Self {
            owner,
            forbidden_mode,
        }
    }

    /// Mode applied to paths created under this policy.
    #[must_use]
    pub const fn default_mode(&self, kind: PathKind) -> u32 {
        let base = match kind {
            PathKind::Directory => DIRECTORY_BASE_MODE,
            PathKind::File => FILE_BASE_MODE,
        };
        base & !self.forbidden_mode
    }

    /// Check that `path` exists as `kind`, is owned by the expected identity and
    /// carries no forbidden permission bits.
    ///
    /// # Errors
    ///
    /// Returns a policy violation naming the path, or an IO error when the
    /// metadata cannot be read.
    pub fn verify(&self, path: &Path, kind: PathKind) -> FsOpsResult<()> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(FsOpsError::Missing {
                    kind,
                    path: path.to_path_buf(),
                });
            }
            Err(source) => return Err(FsOpsError::io("policy.verify.metadata", path, source)),
        };

        let matches_kind = match kind {
            PathKind::Directory => metadata.is_dir(),
            PathKind::File => metadata.is_file(),
        };
        if !matches_kind {
            return Err(FsOpsError::WrongKind {
                expected: kind,
                path: path.to_path_buf(),
            });
        }

        let actual = Ownership::of(path)?;
        if actual != self.owner {
            return Err(FsOpsError::OwnerMismatch {
                path: path.to_path_buf(),
                expected_uid: self.owner.uid,
                expected_gid: self.owner.gid,
                actual_uid: actual.uid,
                actual_gid: actual.gid,
            });
        }

        let mode = metadata.permissions().mode() & PERMISSION_BITS;
        if mode & self.forbidden_mode != 0 {
            return Err(FsOpsError::ModeTooPermissive {
                path: path.to_path_buf(),
                mode,
                forbidden: self.forbidden_mode,
            });
        }
        Ok(())
    }

    /// Verify `path`, creating it first when it is missing and `create` is set.
    ///
    /// Created paths receive [`PathPolicy::default_mode`] and the policy owner.
    /// Files are created empty; directories are created with their parents.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Missing`] when the path is absent and creation is
    /// not allowed, or any error from creation and verification.
    pub fn ensure(&self, path: &Path, kind: PathKind, create: bool) -> FsOpsResult<PathState> {
        let exists = path.try_exists().map_err(|source| {
            FsOpsError::io("policy.ensure.exists", path, source)
        })?;
        if exists {
            self.verify(path, kind)?;
            return Ok(PathState::Existing);
        }
        if !create {
            return Err(FsOpsError::Missing {
                kind,
                path: path.to_path_buf(),
            });
        }

        let mode = self.default_mode(kind);
        match kind {
            PathKind::Directory => fs::create_dir_all(path)
                .map_err(|source| FsOpsError::io("policy.ensure.create_dir", path, source))?,
            PathKind::File => {
                OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(mode)
                    .open(path)
                    .map_err(|source| FsOpsError::io("policy.ensure.create_file", path, source))?;
            }
        }
        fs::set_permissions(path, Permissions::from_mode(mode))
            .map_err(|source| FsOpsError::io("policy.ensure.chmod", path, source))?;
        self.owner.apply(path)?;
        warn!(
            path = %path.display(),
            kind = %kind,
            mode = format_args!("{mode:#o}"),
            "created missing path"
        );

        self.verify(path, kind)?;
        Ok(PathState::Created)
    }
}
