//! The configuration engine: validated files, an indexed module and the
//! root-mode gate in front of every mutation.
//!
//! # Design
//! - Construction validates ownership and permissions of every managed path
//!   before the module is loaded; missing files are created only in root mode.
//! - Field names are indexed once; a name declared by two sections is fatal.
//! - Outside root mode values come from the runtime environment (process env
//!   and provisioned secret files); in root mode they come from the stores.
//! - Secret values never appear in logs or listings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, info};

use dockconf_fsops::{Ownership, PathKind, PathPolicy};

use crate::error::{ConfigError, ConfigResult};
use crate::field::{ConfigValue, Field, FieldKind, ValidationError};
use crate::linestore::WritePolicy;
use crate::module::{ConfigModule, ModuleLoader};
use crate::report::{ConfigReport, EntryState, ReportEntry, ReportSection, SECRET_MASK};
use crate::section::{Section, StorageKind};
use crate::settings::{ConfigPaths, Deployment, EngineSettings};

/// Parent directories of the stores may not be group or other writable.
const DIRECTORY_MASK: u32 = 0o022;
/// Env file is at most `0o644`.
const ENV_FILE_MASK: u32 = 0o133;
/// Secret file is at most `0o600`.
const SECRET_FILE_MASK: u32 = 0o177;

const GENERATED_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// A value read from the stores together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Decoded value.
    pub value: ConfigValue,
    /// Whether nothing was stored and the default was returned.
    pub default_used: bool,
}

/// Session over one configuration module and its files.
#[derive(Debug)]
pub struct ConfigEngine {
    module: ConfigModule,
    paths: ConfigPaths,
    project_dir: PathBuf,
    root_mode: bool,
    deployment: Deployment,
    project_owner: Ownership,
    index: BTreeMap<String, usize>,
}

impl ConfigEngine {
    /// Validate the managed files, then load the module through `loader`.
    ///
    /// # Errors
    ///
    /// Returns `ImproperlyConfigured` when a path is missing (outside root
    /// mode), has the wrong owner or is too permissive, when the project
    /// directory is not owned by root in production, or when the module is
    /// invalid. Loader errors are returned unchanged.
    pub fn open(settings: EngineSettings, loader: &dyn ModuleLoader) -> ConfigResult<Self> {
        let project_owner = prepare_paths(&settings)?;
        let module = loader.load(&settings.module)?;
        Self::assemble(settings, project_owner, module)
    }

    /// Validate the managed files and use an already built module.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigEngine::open`], minus loader failures.
    pub fn with_module(settings: EngineSettings, module: ConfigModule) -> ConfigResult<Self> {
        let project_owner = prepare_paths(&settings)?;
        Self::assemble(settings, project_owner, module)
    }

    fn assemble(
        settings: EngineSettings,
        project_owner: Ownership,
        module: ConfigModule,
    ) -> ConfigResult<Self> {
        let index = build_index(&module)?;
        debug!(
            module = module.name(),
            configs = index.len(),
            root_mode = settings.root_mode,
            "configuration engine ready"
        );
        Ok(Self {
            module,
            paths: settings.paths,
            project_dir: settings.project_dir,
            root_mode: settings.root_mode,
            deployment: settings.deployment,
            project_owner,
            index,
        })
    }

    /// Resolved file locations.
    #[must_use]
    pub const fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Whether mutations are permitted.
    #[must_use]
    pub const fn root_mode(&self) -> bool {
        self.root_mode
    }

    /// Deployment context the paths were validated against.
    #[must_use]
    pub const fn deployment(&self) -> Deployment {
        self.deployment
    }

    /// Owner of the project directory and of both stores.
    #[must_use]
    pub const fn project_owner(&self) -> Ownership {
        self.project_owner
    }

    /// Project directory the owner was read from.
    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Loaded module.
    #[must_use]
    pub const fn module(&self) -> &ConfigModule {
        &self.module
    }

    /// Sections in declaration order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        self.module.sections()
    }

    /// Section declaring `name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownConfig` when no section declares it.
    pub fn section_of(&self, name: &str) -> ConfigResult<&Section> {
        self.index
            .get(name)
            .and_then(|index| self.module.sections().get(*index))
            .ok_or_else(|| ConfigError::UnknownConfig {
                name: name.to_string(),
            })
    }

    fn lookup(&self, name: &str) -> ConfigResult<(&Section, &Field)> {
        let section = self.section_of(name)?;
        let field = section.field(name).ok_or_else(|| ConfigError::UnknownConfig {
            name: name.to_string(),
        })?;
        Ok((section, field))
    }

    pub(crate) fn require_root(&self, operation: &'static str) -> ConfigResult<()> {
        if self.root_mode {
            Ok(())
        } else {
            Err(ConfigError::RootModeNeeded { operation })
        }
    }

    /// Value of `name` as a service sees it.
    ///
    /// In root mode this is [`ConfigEngine::get_root`]'s value. Otherwise plain
    /// configs come from the process environment and secrets from the
    /// provisioned file `secret_dir/<name>`.
    ///
    /// # Errors
    ///
    /// `UnknownConfig`, `ConfigMissing` (unset, or the secret file is not
    /// readable) or `ValueValidation`.
    pub fn get(&self, name: &str) -> ConfigResult<ConfigValue> {
        if self.root_mode {
            return self.get_root(name).map(|resolved| resolved.value);
        }
        let (section, field) = self.lookup(name)?;
        let raw = section.read_runtime(&self.paths, name)?;
        debug!(config = name, storage = section.storage().as_str(), "runtime read");
        field
            .decode(raw)
            .map_err(|error| ConfigError::field(name, error))
    }

    /// Value of `name` from the stores, and whether the default was used.
    ///
    /// # Errors
    ///
    /// `UnknownConfig`, `ConfigMissing`, `ValueValidation` or an IO error.
    pub fn get_root(&self, name: &str) -> ConfigResult<Resolved> {
        let (section, field) = self.lookup(name)?;
        let raw = section.read_stored(&self.paths, name)?;
        let default_used = raw.is_none();
        debug!(config = name, storage = section.storage().as_str(), "stored read");
        let value = field
            .decode(raw)
            .map_err(|error| ConfigError::field(name, error))?;
        Ok(Resolved {
            value,
            default_used,
        })
    }

    /// Store `value` under `name`.
    ///
    /// # Errors
    ///
    /// `RootModeNeeded`, `UnknownConfig`, `ValueValidation` (the store is left
    /// untouched), `AlreadyExists` when `safe` and a value is stored, or an IO
    /// error.
    pub fn set(&self, name: &str, value: &ConfigValue, safe: bool) -> ConfigResult<()> {
        self.require_root("set")?;
        let (section, field) = self.lookup(name)?;
        let repr = field
            .encode(value)
            .map_err(|source| ConfigError::validation(name, source))?;
        section.store(&self.paths, name, &repr, WritePolicy::from_safe(safe))?;
        info!(
            config = name,
            section = %section.name(),
            storage = section.storage().as_str(),
            safe,
            "config stored"
        );
        Ok(())
    }

    /// Parse operator-supplied `text` with the field's rules, then store it.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigEngine::set`].
    pub fn set_text(&self, name: &str, text: &str, safe: bool) -> ConfigResult<()> {
        self.require_root("set")?;
        let (_, field) = self.lookup(name)?;
        let value = field
            .parse(text)
            .map_err(|source| ConfigError::validation(name, source))?;
        self.set(name, &value, safe)
    }

    /// Store a random value of `length` ASCII letters, digits and punctuation.
    ///
    /// # Errors
    ///
    /// `ValueValidation` for non-string fields or lengths outside the field's
    /// bounds, plus everything [`ConfigEngine::set`] returns.
    pub fn generate(&self, name: &str, length: usize, safe: bool) -> ConfigResult<()> {
        self.require_root("generate")?;
        let (_, field) = self.lookup(name)?;
        if !matches!(field.kind(), FieldKind::String { .. }) {
            return Err(ConfigError::validation(name, ValidationError::NotString));
        }
        let mut rng = rand::rng();
        let value: String = (0..length)
            .map(|_| char::from(GENERATED_CHARSET[rng.random_range(0..GENERATED_CHARSET.len())]))
            .collect();
        self.set(name, &ConfigValue::Str(value), safe)
    }

    /// Remove the stored value of `name`; returns whether one was stored.
    ///
    /// # Errors
    ///
    /// `RootModeNeeded`, `UnknownConfig` or an IO error.
    pub fn delete(&self, name: &str) -> ConfigResult<bool> {
        self.require_root("delete")?;
        let section = self.section_of(name)?;
        let removed = section.remove(&self.paths, name)?;
        if removed {
            info!(config = name, section = %section.name(), "config deleted");
        }
        Ok(removed)
    }

    /// Every config with its state, in declaration order.
    ///
    /// Per-config failures are reported inline; secret values are masked.
    ///
    /// # Errors
    ///
    /// `RootModeNeeded`, or IO errors reading the stores.
    pub fn list(&self) -> ConfigResult<ConfigReport> {
        self.require_root("list")?;
        let mut sections = Vec::new();
        for section in self.sections() {
            if section.fields().is_empty() {
                continue;
            }
            let secret = section.storage() == StorageKind::Secret;
            let shown = |value: &ConfigValue| {
                if secret {
                    SECRET_MASK.to_string()
                } else {
                    value.to_string()
                }
            };
            let mut entries = Vec::with_capacity(section.fields().len());
            for decl in section.fields() {
                let state = match self.get_root(&decl.name) {
                    Ok(Resolved {
                        value,
                        default_used: false,
                    }) => EntryState::Explicit {
                        value: shown(&value),
                    },
                    Ok(Resolved {
                        value,
                        default_used: true,
                    }) => EntryState::Default {
                        value: shown(&value),
                    },
                    Err(ConfigError::ConfigMissing { .. }) => EntryState::Absent,
                    Err(ConfigError::ValueValidation { source, .. }) => EntryState::Invalid {
                        message: if secret {
                            SECRET_MASK.to_string()
                        } else {
                            source.to_string()
                        },
                    },
                    Err(other) => return Err(other),
                };
                entries.push(ReportEntry {
                    name: decl.name.clone(),
                    state,
                });
            }
            sections.push(ReportSection {
                name: section.name().into_owned(),
                storage: section.storage(),
                entries,
            });
        }
        Ok(ConfigReport { sections })
    }
}

fn prepare_paths(settings: &EngineSettings) -> ConfigResult<Ownership> {
    let project_owner =
        Ownership::of(&settings.project_dir).map_err(ConfigError::path_policy)?;
    if settings.deployment == Deployment::Production && project_owner.uid != 0 {
        return Err(ConfigError::improper(
            "In production the project directory must be owned by root.",
        ));
    }

    let create = settings.root_mode;
    let stores = [
        (&settings.paths.env_file, ENV_FILE_MASK),
        (&settings.paths.secret_file, SECRET_FILE_MASK),
    ];
    for (file, mask) in stores {
        let parent = parent_dir(file)?;
        PathPolicy::new(project_owner, DIRECTORY_MASK)
            .verify(&parent, PathKind::Directory)
            .map_err(ConfigError::path_policy)?;
        PathPolicy::new(project_owner, mask)
            .ensure(file, PathKind::File, create)
            .map_err(ConfigError::path_policy)?;
    }

    let secret_dir_owner = match settings.deployment {
        Deployment::Production => Ownership::ROOT,
        Deployment::Development => project_owner,
    };
    PathPolicy::new(secret_dir_owner, DIRECTORY_MASK)
        .ensure(&settings.paths.secret_dir, PathKind::Directory, create)
        .map_err(ConfigError::path_policy)?;
    Ok(project_owner)
}

fn parent_dir(file: &Path) -> ConfigResult<PathBuf> {
    let absolute =
        std::path::absolute(file).map_err(|source| ConfigError::io("engine.absolute", file, source))?;
    let parent = absolute
        .parent()
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
    if !parent.is_dir() {
        return Err(ConfigError::improper(format!(
            "No such directory: {}",
            parent.display()
        )));
    }
    Ok(parent)
}

fn build_index(module: &ConfigModule) -> ConfigResult<BTreeMap<String, usize>> {
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    for (position, section) in module.sections().iter().enumerate() {
        for decl in section.fields() {
            if let Some(existing) = index.get(&decl.name) {
                let first = module
                    .sections()
                    .get(*existing)
                    .map(|other| other.name().into_owned())
                    .unwrap_or_default();
                return Err(ConfigError::improper(format!(
                    "Config field {} is defined in {first} and {}",
                    decl.name,
                    section.name()
                )));
            }
            index.insert(decl.name.clone(), position);
        }
    }
    Ok(index)
}
