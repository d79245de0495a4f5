//! Listing of every config with its resolution state.
//!
//! # Design
//! - The engine builds a [`ConfigReport`] once; rendering is a pure function
//!   of the report, so text and JSON output show the same data.
//! - Secret values never reach the report: they are replaced with
//!   [`SECRET_MASK`] before rendering.

use owo_colors::{OwoColorize, Style};
use serde::Serialize;

use crate::section::StorageKind;

/// Placeholder shown instead of secret values.
pub const SECRET_MASK: &str = "[…]";

/// Resolution state of one config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EntryState {
    /// A stored value was found.
    Explicit {
        /// Rendered value (masked for secrets).
        value: String,
    },
    /// Nothing stored; the default applies.
    Default {
        /// Rendered default (masked for secrets).
        value: String,
    },
    /// Nothing stored and no default.
    Absent,
    /// The stored value does not validate.
    Invalid {
        /// Validation message.
        message: String,
    },
}

impl EntryState {
    /// Single-character marker used by the text rendering.
    #[must_use]
    pub const fn sign(&self) -> char {
        match self {
            Self::Explicit { .. } => '●',
            Self::Default { .. } => '○',
            Self::Absent => '−',
            Self::Invalid { .. } => '✖',
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::Explicit { value } | Self::Default { value } => value,
            Self::Absent => "",
            Self::Invalid { message } => message,
        }
    }

    fn sign_style(&self) -> Style {
        match self {
            Self::Explicit { .. } | Self::Default { .. } => Style::new().green(),
            Self::Absent => Style::new().red().bold(),
            Self::Invalid { .. } => Style::new().yellow(),
        }
    }
}

/// One config in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    /// Config name.
    pub name: String,
    /// Resolution state.
    #[serde(flatten)]
    pub state: EntryState,
}

/// One section in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    /// Display name.
    pub name: String,
    /// Storage backend.
    pub storage: StorageKind,
    /// Entries in declaration order.
    pub entries: Vec<ReportEntry>,
}

/// Listing of all sections in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigReport {
    /// Sections in declaration order.
    pub sections: Vec<ReportSection>,
}

impl ConfigReport {
    /// Entry for `name`, if listed.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&ReportEntry> {
        self.sections
            .iter()
            .flat_map(|section| &section.entries)
            .find(|entry| entry.name == name)
    }

    /// Render as text; `color` adds ANSI styling.
    ///
    /// Each section starts with a blank line and its name, followed by one
    /// line per config: name, storage indicator (`E`/`S`), state sign and value.
    #[must_use]
    pub fn render(&self, color: bool) -> String {
        let paint = |text: &str, style: Style| {
            if color {
                text.style(style).to_string()
            } else {
                text.to_string()
            }
        };

        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&paint(
                &format!("\n{}\n\n", section.name),
                Style::new().yellow().bold(),
            ));
            let width = section
                .entries
                .iter()
                .map(|entry| entry.name.chars().count())
                .max()
                .unwrap_or(0);
            for entry in &section.entries {
                let name = paint(&format!(" {:<width$} ", entry.name), Style::new().bold());
                let sign = paint(&entry.state.sign().to_string(), entry.state.sign_style());
                let line = format!(
                    "{name}{} {sign} {}",
                    section.storage.indicator(),
                    entry.state.detail()
                );
                out.push_str(line.trim_end());
                out.push('\n');
            }
        }
        out
    }
}
