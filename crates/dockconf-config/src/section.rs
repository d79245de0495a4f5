//! Sections: named groups of fields sharing one storage backend.
//!
//! # Design
//! - Storage capability is a closed enum. Plain sections persist to the env
//!   file verbatim; secret sections persist base64 to the secret file and carry
//!   a validated service map.
//! - Runtime reads (outside root mode) come from the process environment for
//!   plain fields and from the provisioned secret directory for secrets.

use std::borrow::Cow;
use std::env;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::error::{ConfigError, ConfigResult, MissingReason};
use crate::field::{Field, RawValue, ValidationError};
use crate::linestore::{LineStore, WritePolicy};
use crate::service::ServiceMap;
use crate::settings::ConfigPaths;

/// Where a section's values live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Env file, stored as-is.
    Plain,
    /// Secret file, stored as base64.
    Secret,
}

impl StorageKind {
    /// One-letter indicator used by listings.
    #[must_use]
    pub const fn indicator(self) -> char {
        match self {
            Self::Plain => 'E',
            Self::Secret => 'S',
        }
    }

    /// Lowercase storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Secret => "secret",
        }
    }
}

/// A named field with its module-global declaration sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Module-global declaration order.
    pub seq: usize,
    /// Config name (also the storage key).
    pub name: String,
    /// Typed descriptor.
    pub field: Field,
}

/// Storage capability of a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    /// Values in the env file.
    Plain,
    /// Values in the secret file, provisioned per consumer.
    Secret {
        /// Validated consumer map.
        services: ServiceMap,
    },
}

/// A built, immutable section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub(crate) seq: usize,
    pub(crate) name: Option<String>,
    pub(crate) kind: SectionKind,
    pub(crate) fields: Vec<FieldDecl>,
}

impl Section {
    /// Declaration order of the section within its module, starting at 1.
    #[must_use]
    pub const fn seq(&self) -> usize {
        self.seq
    }

    /// Display name; unnamed sections render as `Section <seq>`.
    #[must_use]
    pub fn name(&self) -> Cow<'_, str> {
        self.name
            .as_deref()
            .map_or_else(|| Cow::Owned(format!("Section {}", self.seq)), Cow::Borrowed)
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|decl| decl.name == name)
            .map(|decl| &decl.field)
    }

    /// Storage capability.
    #[must_use]
    pub const fn kind(&self) -> &SectionKind {
        &self.kind
    }

    /// Storage backend.
    #[must_use]
    pub const fn storage(&self) -> StorageKind {
        match self.kind {
            SectionKind::Plain => StorageKind::Plain,
            SectionKind::Secret { .. } => StorageKind::Secret,
        }
    }

    /// Service map of a secret section; `None` for plain sections.
    #[must_use]
    pub const fn service_map(&self) -> Option<&ServiceMap> {
        match &self.kind {
            SectionKind::Plain => None,
            SectionKind::Secret { services } => Some(services),
        }
    }

    /// File holding this section's stored values.
    #[must_use]
    pub fn persistence_path<'a>(&self, paths: &'a ConfigPaths) -> &'a Path {
        match self.kind {
            SectionKind::Plain => &paths.env_file,
            SectionKind::Secret { .. } => &paths.secret_file,
        }
    }

    /// Turn a field's canonical representation into its stored form.
    ///
    /// # Errors
    ///
    /// Plain values may not contain line breaks.
    pub fn encode(&self, repr: &str) -> Result<String, ValidationError> {
        match self.kind {
            SectionKind::Plain if repr.contains(['\n', '\r']) => Err(ValidationError::LineBreak),
            SectionKind::Plain => Ok(repr.to_string()),
            SectionKind::Secret { .. } => Ok(STANDARD.encode(repr.as_bytes())),
        }
    }

    /// Turn a stored value back into the raw input of [`Field::decode`].
    ///
    /// # Errors
    ///
    /// Secret values must be valid base64.
    pub fn decode(&self, stored: String) -> Result<RawValue, ValidationError> {
        match self.kind {
            SectionKind::Plain => Ok(RawValue::Text(stored)),
            SectionKind::Secret { .. } => STANDARD
                .decode(stored.trim())
                .map(RawValue::Bytes)
                .map_err(|_| ValidationError::InvalidBase64),
        }
    }

    pub(crate) fn read_stored(
        &self,
        paths: &ConfigPaths,
        name: &str,
    ) -> ConfigResult<Option<RawValue>> {
        let stored = LineStore::new(self.persistence_path(paths)).read(name)?;
        stored
            .map(|value| self.decode(value))
            .transpose()
            .map_err(|source| ConfigError::validation(name, source))
    }

    pub(crate) fn read_runtime(
        &self,
        paths: &ConfigPaths,
        name: &str,
    ) -> ConfigResult<Option<RawValue>> {
        match self.kind {
            SectionKind::Plain => Ok(env::var_os(name).map(|value| match value.into_string() {
                Ok(text) => RawValue::Text(text),
                Err(raw) => RawValue::Bytes(raw.into_vec()),
            })),
            SectionKind::Secret { .. } => {
                let path = paths.secret_dir.join(name);
                match fs::read(&path) {
                    Ok(bytes) => Ok(Some(RawValue::Bytes(bytes))),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                        Err(ConfigError::ConfigMissing {
                            name: name.to_string(),
                            reason: MissingReason::Forbidden,
                        })
                    }
                    Err(source) => Err(ConfigError::io("section.read_runtime", path, source)),
                }
            }
        }
    }

    pub(crate) fn store(
        &self,
        paths: &ConfigPaths,
        name: &str,
        repr: &str,
        policy: WritePolicy,
    ) -> ConfigResult<()> {
        let stored = self
            .encode(repr)
            .map_err(|source| ConfigError::validation(name, source))?;
        LineStore::new(self.persistence_path(paths)).write(name, &stored, policy)
    }

    pub(crate) fn remove(&self, paths: &ConfigPaths, name: &str) -> ConfigResult<bool> {
        LineStore::new(self.persistence_path(paths)).delete(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn section(kind: SectionKind, name: Option<&str>) -> Section {
        Section {
            seq: 3,
            name: name.map(str::to_string),
            kind,
            fields: vec![FieldDecl {
                seq: 1,
                name: "A".into(),
                field: Field::string(),
            }],
        }
    }

    fn secret() -> SectionKind {
        SectionKind::Secret {
            services: ServiceMap::default(),
        }
    }

    fn paths(root: &Path) -> ConfigPaths {
        ConfigPaths {
            env_file: root.join(".env"),
            secret_file: root.join(".secret.env"),
            secret_dir: root.join("secrets"),
        }
    }

    #[test]
    fn unnamed_sections_use_their_sequence() {
        assert_eq!(section(SectionKind::Plain, None).name(), "Section 3");
        assert_eq!(section(SectionKind::Plain, Some("web")).name(), "web");
        assert_eq!(section(secret(), None).storage().indicator(), 'S');
        assert!(section(SectionKind::Plain, None).field("A").is_some());
        assert!(section(SectionKind::Plain, None).service_map().is_none());
    }

    #[test]
    fn secret_sections_store_base64() -> anyhow::Result<()> {
        let secret = section(secret(), None);
        assert_eq!(secret.encode("pa=ss")?, "cGE9c3M=");
        assert_eq!(
            secret.decode(" cGE9c3M=\n".to_string())?,
            RawValue::Bytes(b"pa=ss".to_vec())
        );
        assert_eq!(
            secret.decode("***".to_string()),
            Err(ValidationError::InvalidBase64)
        );
        Ok(())
    }

    #[test]
    fn plain_sections_store_verbatim_single_lines() -> anyhow::Result<()> {
        let plain = section(SectionKind::Plain, None);
        assert_eq!(plain.encode("a b=c")?, "a b=c");
        assert_eq!(plain.encode("a\nb"), Err(ValidationError::LineBreak));
        assert_eq!(
            plain.decode("x".to_string())?,
            RawValue::Text("x".to_string())
        );
        Ok(())
    }

    #[test]
    fn persistence_paths_follow_storage() {
        let paths = paths(Path::new("/host"));
        assert_eq!(
            section(SectionKind::Plain, None).persistence_path(&paths),
            PathBuf::from("/host/.env")
        );
        assert_eq!(
            section(secret(), None).persistence_path(&paths),
            PathBuf::from("/host/.secret.env")
        );
    }

    #[test]
    fn runtime_secret_reads_map_missing_files_to_none() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let paths = paths(temp.path());
        fs::create_dir(&paths.secret_dir)?;
        let secret = section(secret(), None);

        assert_eq!(secret.read_runtime(&paths, "A")?, None);
        fs::write(paths.secret_dir.join("A"), "value")?;
        assert_eq!(
            secret.read_runtime(&paths, "A")?,
            Some(RawValue::Bytes(b"value".to_vec()))
        );
        Ok(())
    }

    #[test]
    fn stored_values_round_trip_through_the_secret_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let paths = paths(temp.path());
        fs::write(&paths.secret_file, "")?;
        let secret = section(secret(), None);

        secret.store(&paths, "A", "hunter2", WritePolicy::Force)?;
        assert_eq!(fs::read_to_string(&paths.secret_file)?, "A=aHVudGVyMg==\n");
        assert_eq!(
            secret.read_stored(&paths, "A")?,
            Some(RawValue::Bytes(b"hunter2".to_vec()))
        );
        assert!(secret.remove(&paths, "A")?);
        assert_eq!(secret.read_stored(&paths, "A")?, None);
        Ok(())
    }
}
