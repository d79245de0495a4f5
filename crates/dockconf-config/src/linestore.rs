//! Line-oriented `NAME=VALUE` files.
//!
//! # Design
//! - Lookup and rewrite are pure functions over the file text; [`LineStore`]
//!   only adds the read and the whole-file overwrite.
//! - Comments, blank lines and malformed lines pass through untouched.
//! - The first matching line wins. Later duplicates are kept verbatim and never
//!   repaired.
//! - `\r\n` line endings are read like `\n`; rewritten lines end in `\n`.
//! - A rewrite is read-then-overwrite and is not crash-atomic.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::{ConfigError, ConfigResult};

const ENTRY_PATTERN: &str = r"^\s*([^#].*?)=(.*)$";

static ENTRY: OnceCell<Regex> = OnceCell::new();

fn entry_pattern() -> ConfigResult<&'static Regex> {
    ENTRY.get_or_try_init(|| {
        Regex::new(ENTRY_PATTERN).map_err(|source| ConfigError::Pattern { source })
    })
}

/// Collision behaviour for [`LineStore::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Replace an existing value in place.
    #[default]
    Force,
    /// Refuse to overwrite an existing value.
    Safe,
}

impl WritePolicy {
    /// Map a `safe` flag onto a policy.
    #[must_use]
    pub const fn from_safe(safe: bool) -> Self {
        if safe { Self::Safe } else { Self::Force }
    }
}

/// A `NAME=VALUE` file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineStore {
    path: PathBuf,
}

impl LineStore {
    /// Bind a store to `path`; nothing is read until an operation runs.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of the first line whose key equals `name`.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be read.
    pub fn read(&self, name: &str) -> ConfigResult<Option<String>> {
        let text = self.load("linestore.read")?;
        lookup(&text, name)
    }

    /// Store `value` under `name`, replacing the first match or appending.
    ///
    /// # Errors
    ///
    /// [`ConfigError::AlreadyExists`] when `policy` is `Safe` and the key is
    /// present (the file is left untouched); IO errors otherwise.
    pub fn write(&self, name: &str, value: &str, policy: WritePolicy) -> ConfigResult<()> {
        let text = self.load("linestore.write.read")?;
        let (updated, replaced) = upsert(&text, name, value)?;
        if replaced && policy == WritePolicy::Safe {
            return Err(ConfigError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.store("linestore.write", &updated)
    }

    /// Drop the first line whose key equals `name`.
    ///
    /// Returns whether a line was removed; a missing key leaves the file as is.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be read or rewritten.
    pub fn delete(&self, name: &str) -> ConfigResult<bool> {
        let text = self.load("linestore.delete.read")?;
        match remove(&text, name)? {
            Some(updated) => {
                self.store("linestore.delete", &updated)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn load(&self, operation: &'static str) -> ConfigResult<String> {
        fs::read_to_string(&self.path).map_err(|source| ConfigError::io(operation, &self.path, source))
    }

    fn store(&self, operation: &'static str, text: &str) -> ConfigResult<()> {
        fs::write(&self.path, text).map_err(|source: io::Error| {
            ConfigError::io(operation, &self.path, source)
        })
    }
}

fn split_entry<'a>(pattern: &Regex, line: &'a str) -> Option<(&'a str, &'a str)> {
    let content = line.strip_suffix('\n').unwrap_or(line);
    let content = content.strip_suffix('\r').unwrap_or(content);
    let captures = pattern.captures(content)?;
    let key = captures.get(1)?.as_str();
    let value = captures.get(2)?.as_str();
    Some((key, value))
}

fn matching_line(pattern: &Regex, line: &str, name: &str) -> bool {
    split_entry(pattern, line).is_some_and(|(key, _)| key == name)
}

pub(crate) fn lookup(text: &str, name: &str) -> ConfigResult<Option<String>> {
    let pattern = entry_pattern()?;
    Ok(text
        .split_inclusive('\n')
        .filter_map(|line| split_entry(pattern, line))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string()))
}

/// Returns the rewritten text and whether an existing line was replaced.
pub(crate) fn upsert(text: &str, name: &str, value: &str) -> ConfigResult<(String, bool)> {
    let pattern = entry_pattern()?;
    let mut output = String::with_capacity(text.len() + name.len() + value.len() + 2);
    let mut replaced = false;
    for line in text.split_inclusive('\n') {
        if !replaced && matching_line(pattern, line, name) {
            output.push_str(&format!("{name}={value}\n"));
            replaced = true;
        } else {
            output.push_str(line);
        }
    }
    if !replaced {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&format!("{name}={value}\n"));
    }
    Ok((output, replaced))
}

/// Returns `None` when no line matches.
pub(crate) fn remove(text: &str, name: &str) -> ConfigResult<Option<String>> {
    let pattern = entry_pattern()?;
    let mut output = String::with_capacity(text.len());
    let mut removed = false;
    for line in text.split_inclusive('\n') {
        if !removed && matching_line(pattern, line, name) {
            removed = true;
        } else {
            output.push_str(line);
        }
    }
    Ok(removed.then_some(output))
}
