//! Service maps: which secret files each consumer receives.
//!
//! # Design
//! - Entries are declared loosely (optional filename/owner/group/mode) and
//!   validated once by [`validate_services`] into fully resolved
//!   [`SecretTarget`]s.
//! - Validation is pure; owner names are resolved only at provisioning time.

use std::collections::BTreeSet;
use std::str::FromStr;

use dockconf_fsops::validate_file_name;
use serde::Serialize;

use crate::error::{ConfigError, ConfigResult};

/// Mode applied to provisioned secret files unless a target says otherwise.
pub const DEFAULT_SECRET_MODE: u32 = 0o400;

const MAX_MODE: u32 = 0o7777;

/// Loosely declared binding of a field to a consumer's secret file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceEntry {
    /// Field whose value is provisioned.
    pub field: String,
    /// Target file name inside the secret directory.
    pub filename: Option<String>,
    /// Owner user (name or uid).
    pub owner: Option<String>,
    /// Owner group (name or gid).
    pub group: Option<String>,
    /// File mode.
    pub mode: Option<u32>,
}

impl ServiceEntry {
    /// Entry for `field` with every target attribute defaulted.
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    /// Override the target file name.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Override the owning user.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Override the owning group.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Override the file mode.
    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

impl From<&str> for ServiceEntry {
    fn from(field: &str) -> Self {
        Self::new(field)
    }
}

/// Parses `FIELD[:filename[:owner[:group[:mode]]]]`; empty parts keep their
/// default and the mode is octal.
impl FromStr for ServiceEntry {
    type Err = ConfigError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (field, target) = match spec.split_once(':') {
            Some((field, target)) => (field, Some(target)),
            None => (spec, None),
        };
        if field.is_empty() {
            return Err(ConfigError::improper(format!(
                "Invalid secret target {spec:?}: missing field name"
            )));
        }
        let mut entry = Self::new(field);
        if let Some(target) = target {
            let parts = parse_target(target)?;
            entry.filename = parts.filename;
            entry.owner = parts.owner;
            entry.group = parts.group;
            entry.mode = parts.mode;
        }
        Ok(entry)
    }
}

/// Optional attributes of a `filename[:owner[:group[:mode]]]` spec.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetSpec {
    /// Target file name.
    pub filename: Option<String>,
    /// Owning user.
    pub owner: Option<String>,
    /// Owning group.
    pub group: Option<String>,
    /// Octal file mode.
    pub mode: Option<u32>,
}

impl FromStr for TargetSpec {
    type Err = ConfigError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        parse_target(spec)
    }
}

fn parse_target(spec: &str) -> ConfigResult<TargetSpec> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() > 4 {
        return Err(ConfigError::improper(format!(
            "Invalid secret target {spec:?}: expected filename[:owner[:group[:mode]]]"
        )));
    }
    let part = |index: usize| {
        parts
            .get(index)
            .filter(|value| !value.is_empty())
            .map(|value| (*value).to_string())
    };
    let mode = part(3).map(|raw| parse_mode(&raw)).transpose()?;
    Ok(TargetSpec {
        filename: part(0),
        owner: part(1),
        group: part(2),
        mode,
    })
}

/// Parse an octal permission string such as `0400` or `0o440`.
///
/// # Errors
///
/// Returns `ImproperlyConfigured` for non-octal text or modes above `0o7777`.
pub fn parse_mode(raw: &str) -> ConfigResult<u32> {
    let digits = raw.strip_prefix("0o").unwrap_or(raw);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| ConfigError::improper(format!("Invalid file mode {raw:?}: must be octal")))?;
    if mode > MAX_MODE {
        return Err(ConfigError::improper(format!(
            "Invalid file mode {raw:?}: exceeds 0o7777"
        )));
    }
    Ok(mode)
}

/// Fully resolved provisioning target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretTarget {
    /// Field whose value is written.
    pub field: String,
    /// File name inside the secret directory.
    pub filename: String,
    /// Owning user spec.
    pub owner: String,
    /// Owning group spec; `None` selects the owner's primary group.
    pub group: Option<String>,
    /// File mode.
    pub mode: u32,
}

/// Validated consumer → targets map, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceMap {
    bindings: Vec<(String, Vec<SecretTarget>)>,
}

impl ServiceMap {
    /// Targets provisioned for `consumer`; empty for unknown consumers.
    #[must_use]
    pub fn targets_for(&self, consumer: &str) -> &[SecretTarget] {
        self.bindings
            .iter()
            .find(|(name, _)| name == consumer)
            .map(|(_, targets)| targets.as_slice())
            .unwrap_or_default()
    }

    /// Declared consumers, in declaration order.
    pub fn consumers(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(name, _)| name.as_str())
    }

    /// Whether no consumer is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Validate declared service entries against the section's field names.
///
/// Identical duplicate entries collapse; consumers left without targets are
/// dropped.
///
/// # Errors
///
/// Returns `ImproperlyConfigured` when an entry names an unknown field, a
/// consumer binds one field to two different targets, two fields share a file
/// name for one consumer, or a file name or mode is invalid.
pub fn validate_services<'a>(
    section: &str,
    fields: impl IntoIterator<Item = &'a str>,
    declared: &[(String, Vec<ServiceEntry>)],
) -> ConfigResult<ServiceMap> {
    let known: BTreeSet<&str> = fields.into_iter().collect();
    let mut bindings: Vec<(String, Vec<SecretTarget>)> = Vec::new();

    for (consumer, entries) in declared {
        let index = match bindings.iter().position(|(name, _)| name == consumer) {
            Some(index) => index,
            None => {
                bindings.push((consumer.clone(), Vec::new()));
                bindings.len() - 1
            }
        };
        for entry in entries {
            if !known.contains(entry.field.as_str()) {
                return Err(ConfigError::improper(format!(
                    "Invalid name for service {consumer} in section {section}: {}",
                    entry.field
                )));
            }
            let target = resolve_target(consumer, entry)?;
            let targets = &mut bindings[index].1;
            if let Some(existing) = targets.iter().find(|t| t.field == target.field) {
                if *existing == target {
                    continue;
                }
                return Err(ConfigError::improper(format!(
                    "Conflicting targets for {} of service {consumer} in section {section}",
                    target.field
                )));
            }
            if let Some(existing) = targets.iter().find(|t| t.filename == target.filename) {
                return Err(ConfigError::improper(format!(
                    "Service {consumer} in section {section} maps {} and {} to the same file {}",
                    existing.field, target.field, target.filename
                )));
            }
            targets.push(target);
        }
    }

    bindings.retain(|(_, targets)| !targets.is_empty());
    Ok(ServiceMap { bindings })
}

fn resolve_target(consumer: &str, entry: &ServiceEntry) -> ConfigResult<SecretTarget> {
    let filename = entry.filename.clone().unwrap_or_else(|| entry.field.clone());
    validate_file_name(&filename).map_err(|source| ConfigError::ImproperlyConfigured {
        message: format!("Invalid secret file name {filename:?} for service {consumer}"),
        source: Some(source),
    })?;
    let mode = entry.mode.unwrap_or(DEFAULT_SECRET_MODE);
    if mode > MAX_MODE {
        return Err(ConfigError::improper(format!(
            "Invalid file mode {mode:#o} for service {consumer}"
        )));
    }
    Ok(SecretTarget {
        field: entry.field.clone(),
        filename,
        owner: entry.owner.clone().unwrap_or_else(|| consumer.to_string()),
        group: entry.group.clone(),
        mode,
    })
}
