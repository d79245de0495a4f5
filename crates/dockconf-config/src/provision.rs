//! Materialisation of secrets into per-consumer files.
//!
//! # Design
//! - Every target is resolved (value, owner, group) before the first file is
//!   written, so a missing secret or unknown user aborts without partial output.
//! - Each file is staged next to its destination and renamed into place with
//!   content, mode and ownership already applied.
//! - Files belonging to other consumers are never touched.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use dockconf_fsops::{Ownership, write_atomic};

use crate::engine::ConfigEngine;
use crate::error::{ConfigError, ConfigResult};
use crate::service::SecretTarget;

/// A secret file written by [`ConfigEngine::provide_secrets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedSecret {
    /// Field the value came from.
    pub field: String,
    /// Destination file.
    pub path: PathBuf,
    /// Owning uid.
    pub uid: u32,
    /// Owning gid.
    pub gid: u32,
    /// File mode.
    pub mode: u32,
}

struct PendingWrite<'a> {
    target: &'a SecretTarget,
    contents: String,
    ownership: Ownership,
}

impl ConfigEngine {
    /// Write every secret declared for `consumer` into the secret directory.
    ///
    /// Values are resolved like [`ConfigEngine::get_root`] (defaults apply) and
    /// written in their canonical form. Consumers without targets provision
    /// nothing.
    ///
    /// # Errors
    ///
    /// `RootModeNeeded`; `ConfigMissing` or `ValueValidation` for unusable
    /// values; `ImproperlyConfigured` when two sections target the same file;
    /// `FsOps` when an owner cannot be resolved or a file cannot be written.
    pub fn provide_secrets(&self, consumer: &str) -> ConfigResult<Vec<ProvisionedSecret>> {
        self.require_root("provide secrets")?;

        let mut claimed: BTreeMap<&str, &str> = BTreeMap::new();
        let mut pending = Vec::new();
        for section in self.sections() {
            let Some(services) = section.service_map() else {
                continue;
            };
            for target in services.targets_for(consumer) {
                if let Some(field) = claimed.insert(&target.filename, &target.field) {
                    return Err(ConfigError::improper(format!(
                        "Secret file {} of service {consumer} is claimed by {field} and {}",
                        target.filename, target.field
                    )));
                }
                let resolved = self.get_root(&target.field)?;
                let field = section
                    .field(&target.field)
                    .ok_or_else(|| ConfigError::UnknownConfig {
                        name: target.field.clone(),
                    })?;
                let contents = field
                    .encode(&resolved.value)
                    .map_err(|source| ConfigError::validation(&target.field, source))?;
                let ownership = Ownership::resolve(&target.owner, target.group.as_deref())
                    .map_err(|source| ConfigError::FsOps {
                        operation: "provision.resolve_owner",
                        source,
                    })?;
                pending.push(PendingWrite {
                    target,
                    contents,
                    ownership,
                });
            }
        }

        let secret_dir = &self.paths().secret_dir;
        let mut written = Vec::with_capacity(pending.len());
        for write in pending {
            let path = write_atomic(
                secret_dir,
                &write.target.filename,
                write.contents.as_bytes(),
                write.ownership,
                write.target.mode,
            )
            .map_err(|source| ConfigError::FsOps {
                operation: "provision.write",
                source,
            })?;
            info!(
                consumer,
                config = %write.target.field,
                path = %path.display(),
                uid = write.ownership.uid,
                gid = write.ownership.gid,
                mode = format_args!("{:#o}", write.target.mode),
                "secret provisioned"
            );
            written.push(ProvisionedSecret {
                field: write.target.field.clone(),
                path,
                uid: write.ownership.uid,
                gid: write.ownership.gid,
                mode: write.target.mode,
            });
        }
        Ok(written)
    }
}
