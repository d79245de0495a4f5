//! Configuration modules: ordered section declarations and how they are loaded.
//!
//! # Design
//! - A module is declared once through [`ModuleBuilder`], which assigns
//!   section and field sequence numbers and validates declarations. Built
//!   modules are immutable.
//! - [`ModuleLoader`] is the seam between the engine and module discovery.
//!   [`ModuleCatalog`] serves registered builder functions first, then
//!   declaration files recognised by extension.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::declaration;
use crate::error::{ConfigError, ConfigResult};
use crate::field::Field;
use crate::section::{FieldDecl, Section, SectionKind};
use crate::service::{ServiceEntry, validate_services};

/// Field names double as env variable names and line-store keys.
const FIELD_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

static FIELD_NAME: OnceCell<Regex> = OnceCell::new();

fn is_valid_field_name(name: &str) -> ConfigResult<bool> {
    let pattern = FIELD_NAME.get_or_try_init(|| {
        Regex::new(FIELD_NAME_PATTERN).map_err(|source| ConfigError::Pattern { source })
    })?;
    Ok(pattern.is_match(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Plain,
    Secret,
}

/// Unvalidated declaration of one section.
#[derive(Debug, Clone)]
pub struct SectionDecl {
    kind: DeclKind,
    name: Option<String>,
    fields: Vec<(String, Field)>,
    services: Vec<(String, Vec<ServiceEntry>)>,
}

impl SectionDecl {
    /// A section persisted to the plain env file.
    #[must_use]
    pub const fn plain() -> Self {
        Self::with_kind(DeclKind::Plain)
    }

    /// A section persisted to the secret file.
    #[must_use]
    pub const fn secret() -> Self {
        Self::with_kind(DeclKind::Secret)
    }

    const fn with_kind(kind: DeclKind) -> Self {
        Self {
            kind,
            name: None,
            fields: Vec::new(),
            services: Vec::new(),
        }
    }

    /// Give the section a display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a field; order of calls is declaration order.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    /// Provision `entries` to `consumer` (secret sections only).
    #[must_use]
    pub fn service<I, E>(mut self, consumer: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<ServiceEntry>,
    {
        self.services
            .push((consumer.into(), entries.into_iter().map(Into::into).collect()));
        self
    }
}

/// Assembles a [`ConfigModule`] from section declarations.
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    name: String,
    sections: Vec<SectionDecl>,
}

impl ModuleBuilder {
    /// Start a module named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: Vec::new(),
        }
    }

    /// Register the next section.
    #[must_use]
    pub fn section(mut self, section: SectionDecl) -> Self {
        self.sections.push(section);
        self
    }

    /// Validate declarations and freeze the module.
    ///
    /// Field names are checked for uniqueness within each section here;
    /// uniqueness across sections is enforced when an engine indexes the module.
    ///
    /// # Errors
    ///
    /// Returns `ImproperlyConfigured` for field names that are not
    /// identifiers, duplicate fields within a section, defaults of the wrong kind, services on plain sections, and invalid
    /// service maps.
    pub fn build(self) -> ConfigResult<ConfigModule> {
        let mut field_seq = 0;
        let mut sections = Vec::with_capacity(self.sections.len());
        for (index, decl) in self.sections.into_iter().enumerate() {
            let seq = index + 1;
            let label = decl
                .name
                .clone()
                .unwrap_or_else(|| format!("Section {seq}"));

            let mut seen = BTreeSet::new();
            let mut fields = Vec::with_capacity(decl.fields.len());
            for (name, field) in decl.fields {
                if !is_valid_field_name(&name)? {
                    return Err(ConfigError::improper(format!(
                        "Invalid config field name {name:?} in {label}"
                    )));
                }
                if !seen.insert(name.clone()) {
                    return Err(ConfigError::improper(format!(
                        "Config field {name} is declared twice in {label}"
                    )));
                }
                if !field.default_matches_kind() {
                    return Err(ConfigError::improper(format!(
                        "Default of {name} in {label} is not a {} value",
                        field.kind().as_str()
                    )));
                }
                field_seq += 1;
                fields.push(FieldDecl {
                    seq: field_seq,
                    name,
                    field,
                });
            }

            let kind = match decl.kind {
                DeclKind::Plain if !decl.services.is_empty() => {
                    return Err(ConfigError::improper(format!(
                        "Plain section {label} cannot declare services"
                    )));
                }
                DeclKind::Plain => SectionKind::Plain,
                DeclKind::Secret => SectionKind::Secret {
                    services: validate_services(
                        &label,
                        fields.iter().map(|decl| decl.name.as_str()),
                        &decl.services,
                    )?,
                },
            };
            sections.push(Section {
                seq,
                name: decl.name,
                kind,
                fields,
            });
        }
        Ok(ConfigModule {
            name: self.name,
            sections,
        })
    }
}

/// A built, immutable set of sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigModule {
    name: String,
    sections: Vec<Section>,
}

impl ConfigModule {
    /// Module name (or the locator it was loaded from).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sections in declaration order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }
}

/// Resolves a module locator to a built module.
pub trait ModuleLoader {
    /// Load the module identified by `locator`.
    ///
    /// # Errors
    ///
    /// Returns `ImproperlyConfigured` when no module matches and
    /// `Declaration` when a module file cannot be parsed.
    fn load(&self, locator: &str) -> ConfigResult<ConfigModule>;
}

/// Function producing a module, registered in a [`ModuleCatalog`].
pub type ModuleFactory = fn() -> ConfigResult<ConfigModule>;

/// Extensions tried, in order, when a bare module name is looked up on disk.
const SEARCH_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Registered modules plus declaration-file fallback.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    factories: BTreeMap<String, ModuleFactory>,
    search_dir: Option<PathBuf>,
}

impl ModuleCatalog {
    /// An empty catalog that only loads declaration files.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, factory: ModuleFactory) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Resolve bare module names to `<dir>/<name>.yaml`, `.yml` or `.json`.
    #[must_use]
    pub fn search_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    fn find_declaration(&self, name: &str) -> Option<(PathBuf, declaration::Format)> {
        let dir = self.search_dir.as_ref()?;
        SEARCH_EXTENSIONS.iter().find_map(|extension| {
            let candidate = dir.join(format!("{name}.{extension}"));
            let format = declaration::Format::from_path(&candidate)?;
            candidate.is_file().then_some((candidate, format))
        })
    }
}

impl ModuleLoader for ModuleCatalog {
    fn load(&self, locator: &str) -> ConfigResult<ConfigModule> {
        if let Some(factory) = self.factories.get(locator) {
            return factory();
        }
        if let Some(format) = declaration::Format::from_path(Path::new(locator)) {
            return declaration::load_file(Path::new(locator), format);
        }
        match self.find_declaration(locator) {
            Some((path, format)) => declaration::load_file(&path, format),
            None => Err(ConfigError::improper(format!(
                "No such config module: {locator}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::StorageKind;

    fn sample() -> ConfigResult<ConfigModule> {
        ModuleBuilder::new("sample")
            .section(
                SectionDecl::plain()
                    .named("web")
                    .field("HOST_NAME", Field::string().with_default("localhost"))
                    .field("DEBUG", Field::bool().with_default(false)),
            )
            .section(
                SectionDecl::secret()
                    .field("DB_PASSWORD", Field::string().min_length(8))
                    .service("postgres", ["DB_PASSWORD"]),
            )
            .build()
    }

    #[test]
    fn builder_assigns_sequences_in_declaration_order() -> ConfigResult<()> {
        let module = sample()?;
        let [web, secrets] = module.sections() else {
            panic!("expected two sections");
        };
        assert_eq!(web.seq(), 1);
        assert_eq!(web.name(), "web");
        assert_eq!(secrets.seq(), 2);
        assert_eq!(secrets.name(), "Section 2");
        assert_eq!(secrets.storage(), StorageKind::Secret);
        let seqs: Vec<_> = module
            .sections()
            .iter()
            .flat_map(Section::fields)
            .map(|decl| decl.seq)
            .collect();
        assert_eq!(seqs, [1, 2, 3]);
        Ok(())
    }

    #[test]
    fn builder_rejects_bad_declarations() {
        let duplicate = ModuleBuilder::new("m")
            .section(
                SectionDecl::plain()
                    .field("A", Field::int())
                    .field("A", Field::int()),
            )
            .build();
        assert!(duplicate.is_err());

        let wrong_default = ModuleBuilder::new("m")
            .section(SectionDecl::plain().field("A", Field::int().with_default(true)))
            .build();
        assert!(wrong_default.is_err());

        let plain_services = ModuleBuilder::new("m")
            .section(
                SectionDecl::plain()
                    .field("A", Field::int())
                    .service("svc", ["A"]),
            )
            .build();
        assert!(plain_services.is_err());
    }

    #[test]
    fn builder_rejects_names_the_stores_cannot_round_trip() {
        for name in ["", " PORT", "PORT ", "A=B", "#X", "1ST", "A\nB", "A\rB", "A\0B", "DB-PASS"] {
            let result = ModuleBuilder::new("m")
                .section(SectionDecl::plain().named("web").field(name, Field::int()))
                .build();
            let Err(ConfigError::ImproperlyConfigured { message, .. }) = result else {
                panic!("{name:?} should be rejected");
            };
            assert_eq!(message, format!("Invalid config field name {name:?} in web"));
        }

        for name in ["PORT", "_PRIVATE", "db_port2"] {
            assert!(
                ModuleBuilder::new("m")
                    .section(SectionDecl::plain().field(name, Field::int()))
                    .build()
                    .is_ok(),
                "{name:?} should be accepted"
            );
        }
    }

    #[test]
    fn catalog_serves_registered_modules() -> ConfigResult<()> {
        let catalog = ModuleCatalog::new().register("sample", sample);
        assert_eq!(catalog.load("sample")?.name(), "sample");
        let err = catalog.load("missing").expect_err("unknown module");
        assert_eq!(
            err.to_string(),
            "improperly configured: No such config module: missing"
        );
        Ok(())
    }

    #[test]
    fn catalog_finds_bare_names_in_its_search_dir() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(
            temp.path().join("site.yml"),
            "- kind: plain\n  fields:\n    - { name: PORT, type: int }\n",
        )?;
        let catalog = ModuleCatalog::new().search_in(temp.path());
        let module = catalog.load("site")?;
        assert!(module.sections()[0].field("PORT").is_some());
        assert!(catalog.load("other").is_err());
        Ok(())
    }
}
