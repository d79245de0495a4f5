//! Owner/group identities and their resolution from user-supplied specs.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::unistd::{Gid, Group, Uid, User, chown};

use crate::error::{FsOpsError, FsOpsResult};

/// Numeric owner identity of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ownership {
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
}

impl Ownership {
    /// The superuser identity.
    pub const ROOT: Self = Self::new(0, 0);

    /// Build an identity from raw ids.
    #[must_use]
    pub const fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// Read the owner of an existing path.
    ///
    /// # Errors
    ///
    /// Returns an error when the path metadata cannot be read.
    pub fn of(path: &Path) -> FsOpsResult<Self> {
        let metadata =
            fs::metadata(path).map_err(|source| FsOpsError::io("ownership.metadata", path, source))?;
        Ok(Self::new(metadata.uid(), metadata.gid()))
    }

    /// Resolve an owner spec (user name or numeric uid) and an optional group
    /// spec (group name or numeric gid).
    ///
    /// Without a group spec a named user falls back to its primary group and a
    /// numeric uid to the gid with the same number.
    ///
    /// # Errors
    ///
    /// Returns an error when a spec is empty or names an unknown user/group.
    pub fn resolve(owner: &str, group: Option<&str>) -> FsOpsResult<Self> {
        let (uid, primary_gid) = resolve_owner(owner)?;
        let gid = match group {
            Some(spec) => resolve_group(spec)?,
            None => primary_gid,
        };
        Ok(Self::new(uid.as_raw(), gid.as_raw()))
    }

    /// Apply this identity to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying `chown` call is denied.
    pub fn apply(self, path: &Path) -> FsOpsResult<()> {
        chown(
            path,
            Some(Uid::from_raw(self.uid)),
            Some(Gid::from_raw(self.gid)),
        )
        .map_err(|source| FsOpsError::nix("ownership.chown", path, source))
    }
}

fn resolve_owner(spec: &str) -> FsOpsResult<(Uid, Gid)> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(FsOpsError::InvalidInput {
            field: "owner",
            reason: "empty",
            value: Some(spec.to_string()),
        });
    }
    if let Ok(id) = trimmed.parse::<u32>() {
        return Ok((Uid::from_raw(id), Gid::from_raw(id)));
    }
    let user = User::from_name(trimmed)
        .map_err(|source| FsOpsError::UserLookup {
            user: trimmed.to_string(),
            source,
        })?
        .ok_or_else(|| FsOpsError::InvalidInput {
            field: "owner",
            reason: "not_found",
            value: Some(trimmed.to_string()),
        })?;
    Ok((user.uid, user.gid))
}

fn resolve_group(spec: &str) -> FsOpsResult<Gid> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(FsOpsError::InvalidInput {
            field: "group",
            reason: "empty",
            value: Some(spec.to_string()),
        });
    }
    if let Ok(id) = trimmed.parse::<u32>() {
        return Ok(Gid::from_raw(id));
    }
    let group = Group::from_name(trimmed)
        .map_err(|source| FsOpsError::GroupLookup {
            group: trimmed.to_string(),
            source,
        })?
        .ok_or_else(|| FsOpsError::InvalidInput {
            field: "group",
            reason: "not_found",
            value: Some(trimmed.to_string()),
        })?;
    Ok(group.gid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn numeric_owner_defaults_group_to_same_id() -> Result<()> {
        assert_eq!(Ownership::resolve("1234", None)?, Ownership::new(1234, 1234));
        assert_eq!(
            Ownership::resolve(" 1234 ", Some("55"))?,
            Ownership::new(1234, 55)
        );
        Ok(())
    }

    #[test]
    fn named_owner_resolves_through_user_database() -> Result<()> {
        assert_eq!(Ownership::resolve("root", None)?, Ownership::ROOT);
        assert_eq!(Ownership::resolve("0", Some("root"))?, Ownership::ROOT);
        Ok(())
    }

    #[test]
    fn unknown_or_empty_specs_are_rejected() {
        let err = Ownership::resolve("no-such-user-dockconf", None).unwrap_err();
        assert!(matches!(
            err,
            FsOpsError::InvalidInput {
                field: "owner",
                reason: "not_found",
                ..
            }
        ));
        let err = Ownership::resolve("  ", None).unwrap_err();
        assert!(matches!(
            err,
            FsOpsError::InvalidInput {
                reason: "empty",
                ..
            }
        ));
        let err = Ownership::resolve("0", Some("no-such-group-dockconf")).unwrap_err();
        assert!(matches!(
            err,
            FsOpsError::InvalidInput {
                field: "group",
                ..
            }
        ));
    }

    #[test]
    fn ownership_of_reads_metadata() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let owner = Ownership::of(temp.path())?;
        assert_eq!(owner.uid, nix::unistd::getuid().as_raw());
        owner.apply(temp.path())?;
        Ok(())
    }
}
