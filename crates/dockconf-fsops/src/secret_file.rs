//! Atomic materialisation of secret values as individual files.
//!
//! Content, mode and ownership are applied to a temporary file in the target
//! directory before it is renamed over the destination, so readers observe
//! either the previous file or the complete new one.

use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{FsOpsError, FsOpsResult};
use crate::ownership::Ownership;

const STAGING_PREFIX: &str = ".dockconf-";

/// Check that `name` is a plain file name that cannot escape its directory.
///
/// # Errors
///
/// Returns [`FsOpsError::InvalidInput`] for empty names, `.`/`..`, and names
/// containing path separators.
pub fn validate_file_name(name: &str) -> FsOpsResult<()> {
    let invalid = |reason: &'static str| FsOpsError::InvalidInput {
        field: "filename",
        reason,
        value: Some(name.to_string()),
    };
    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(invalid("separator"));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid("not_a_file_name")),
    }
}

/// Write `contents` to `dir/filename` with the given ownership and mode.
///
/// Returns the destination path.
///
/// # Errors
///
/// Returns an error when the name is invalid, or when staging, chmod, chown or
/// the final rename fails. On error the destination is left untouched.
pub fn write_atomic(
    dir: &Path,
    filename: &str,
    contents: &[u8],
    ownership: Ownership,
    mode: u32,
) -> FsOpsResult<PathBuf> {
    validate_file_name(filename)?;
    let destination = dir.join(filename);

    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(dir)
        .map_err(|source| FsOpsError::io("secret_file.stage", dir, source))?;
    let staged_path = staged.path().to_path_buf();

    staged
        .write_all(contents)
        .map_err(|source| FsOpsError::io("secret_file.write", &staged_path, source))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|source| FsOpsError::io("secret_file.sync", &staged_path, source))?;
    staged
        .as_file()
        .set_permissions(Permissions::from_mode(mode))
        .map_err(|source| FsOpsError::io("secret_file.chmod", &staged_path, source))?;
    ownership.apply(&staged_path)?;

    staged
        .persist(&destination)
        .map_err(|source| FsOpsError::Persist {
            path: destination.clone(),
            source,
        })?;
    debug!(
        path = %destination.display(),
        uid = ownership.uid,
        gid = ownership.gid,
        mode = format_args!("{mode:#o}"),
        "secret file written"
    );
    Ok(destination)
}
