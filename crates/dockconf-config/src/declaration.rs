//! Module declarations read from YAML or JSON files.
//!
//! A declaration file is a list of sections in declaration order:
//!
//! ```yaml
//! - name: web
//!   kind: plain
//!   fields:
//!     - { name: HOST_NAME, type: string, default: localhost, max_length: 253 }
//!     - { name: DEBUG, type: bool, default: false }
//! - kind: secret
//!   fields:
//!     - { name: DB_PASSWORD, type: string, min_length: 8 }
//!   services:
//!     - consumer: postgres
//!       secrets:
//!         - DB_PASSWORD
//!         - { field: DB_PASSWORD, filename: pg_pass, mode: "0440" }
//! ```
//!
//! String entries under `secrets` use the `FIELD[:filename[:owner[:group[:mode]]]]`
//! form. Files are turned into a [`ModuleBuilder`] so they get the same
//! validation as modules declared in code.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::field::{ConfigValue, Field};
use crate::module::{ConfigModule, ModuleBuilder, SectionDecl};
use crate::service::{ServiceEntry, parse_mode};

/// Supported declaration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
}

impl Format {
    /// Format implied by the file extension, if recognised.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SectionKindFile {
    Plain,
    Secret,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SectionFile {
    #[serde(default)]
    name: Option<String>,
    kind: SectionKindFile,
    #[serde(default)]
    fields: Vec<FieldFile>,
    #[serde(default)]
    services: Vec<ServiceFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FieldType {
    Bool,
    String,
    Int,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldFile {
    name: String,
    #[serde(rename = "type")]
    kind: FieldType,
    #[serde(default)]
    default: Option<ConfigValue>,
    #[serde(default)]
    min_length: Option<usize>,
    #[serde(default)]
    max_length: Option<usize>,
    #[serde(default)]
    min_value: Option<i64>,
    #[serde(default)]
    max_value: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceFile {
    consumer: String,
    secrets: Vec<TargetFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetFile {
    Spec(String),
    Full {
        field: String,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        owner: Option<String>,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        mode: Option<ModeFile>,
    },
}

/// Modes are octal; a bare YAML number such as `440` is read digit by digit.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModeFile {
    Text(String),
    Digits(u32),
}

/// Read and build the module declared in `path`.
///
/// # Errors
///
/// Returns an IO error when the file cannot be read, `Declaration` when it
/// does not parse, and `ImproperlyConfigured` when the declarations are invalid.
pub fn load_file(path: &Path, format: Format) -> ConfigResult<ConfigModule> {
    let text =
        fs::read_to_string(path).map_err(|source| ConfigError::io("declaration.read", path, source))?;
    parse_str(&path.display().to_string(), &text, format)
}

/// Build the module declared in `text`; `locator` names it in errors and
/// becomes the module name.
///
/// # Errors
///
/// Returns `Declaration` when the text does not parse and
/// `ImproperlyConfigured` when the declarations are invalid.
pub fn parse_str(locator: &str, text: &str, format: Format) -> ConfigResult<ConfigModule> {
    let declaration_error = |detail: String| ConfigError::Declaration {
        locator: locator.to_string(),
        detail,
    };
    let sections: Vec<SectionFile> = match format {
        Format::Yaml => serde_yaml::from_str(text).map_err(|err| declaration_error(err.to_string()))?,
        Format::Json => serde_json::from_str(text).map_err(|err| declaration_error(err.to_string()))?,
    };

    let mut builder = ModuleBuilder::new(locator);
    for section in sections {
        builder = builder.section(section_decl(section).map_err(declaration_error)?);
    }
    builder.build()
}

fn section_decl(file: SectionFile) -> Result<SectionDecl, String> {
    let mut decl = match file.kind {
        SectionKindFile::Plain => SectionDecl::plain(),
        SectionKindFile::Secret => SectionDecl::secret(),
    };
    if let Some(name) = file.name {
        decl = decl.named(name);
    }
    for field in file.fields {
        let name = field.name.clone();
        decl = decl.field(name, field_from_file(field)?);
    }
    for service in file.services {
        let entries = service
            .secrets
            .into_iter()
            .map(entry_from_file)
            .collect::<Result<Vec<_>, _>>()?;
        decl = decl.service(service.consumer, entries);
    }
    Ok(decl)
}

fn field_from_file(file: FieldFile) -> Result<Field, String> {
    let misplaced = |bound: &str, kind: &str| {
        Err(format!(
            "field {}: {bound} does not apply to {kind} fields",
            file.name
        ))
    };
    let mut field = match file.kind {
        FieldType::Bool => {
            if file.min_length.is_some() || file.max_length.is_some() {
                return misplaced("length bound", "bool");
            }
            if file.min_value.is_some() || file.max_value.is_some() {
                return misplaced("value bound", "bool");
            }
            Field::bool()
        }
        FieldType::String => {
            if file.min_value.is_some() || file.max_value.is_some() {
                return misplaced("value bound", "string");
            }
            let mut field = Field::string();
            if let Some(min) = file.min_length {
                field = field.min_length(min);
            }
            if let Some(max) = file.max_length {
                field = field.max_length(max);
            }
            field
        }
        FieldType::Int => {
            if file.min_length.is_some() || file.max_length.is_some() {
                return misplaced("length bound", "int");
            }
            let mut field = Field::int();
            if let Some(min) = file.min_value {
                field = field.min_value(min);
            }
            if let Some(max) = file.max_value {
                field = field.max_value(max);
            }
            field
        }
    };
    if let Some(default) = file.default {
        field = field.with_default(default);
    }
    Ok(field)
}

fn entry_from_file(file: TargetFile) -> Result<ServiceEntry, String> {
    match file {
        TargetFile::Spec(spec) => spec.parse().map_err(|err: ConfigError| err.to_string()),
        TargetFile::Full {
            field,
            filename,
            owner,
            group,
            mode,
        } => {
            let mode = match mode {
                None => None,
                Some(ModeFile::Text(text)) => Some(parse_mode(&text).map_err(|err| err.to_string())?),
                Some(ModeFile::Digits(digits)) => {
                    Some(parse_mode(&digits.to_string()).map_err(|err| err.to_string())?)
                }
            };
            Ok(ServiceEntry {
                field,
                filename,
                owner,
                group,
                mode,
            })
        }
    }
}
