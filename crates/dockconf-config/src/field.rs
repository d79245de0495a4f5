//! Typed field descriptors and their decode/encode rules.
//!
//! # Design
//! - Field kinds form a closed set; each kind owns its parse, validate and
//!   render rules.
//! - Decoding never clamps: out-of-bounds values fail with a `ValidationError`.
//! - Encoding accepts only values of the field's own kind.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Text value.
    Str(String),
}

impl ConfigValue {
    /// Boolean payload, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Text payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl Display for ConfigValue {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => formatter.write_str("True"),
            Self::Bool(false) => formatter.write_str("False"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Str(value) => formatter.write_str(value),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Raw stored representation handed to [`Field::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Text read verbatim from a plain store or the environment.
    Text(String),
    /// Bytes recovered from a secret store or a provisioned secret file.
    Bytes(Vec<u8>),
}

impl RawValue {
    fn into_text(self) -> Result<String, ValidationError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Bytes(bytes) => String::from_utf8(bytes).map_err(|_| ValidationError::InvalidUtf8),
        }
    }
}

/// Reasons a value fails conversion or bounds checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Boolean fields accept only `True` and `False`.
    #[error("Must be `True` or `False`.")]
    NotBool,
    /// The value supplied for a string field was not text.
    #[error("Must be string.")]
    NotString,
    /// The value could not be read as a base-10 integer.
    #[error("Must be integer.")]
    NotInteger,
    /// Text shorter than the declared minimum.
    #[error("Too short ({length} < {min}).")]
    TooShort {
        /// Length in characters.
        length: usize,
        /// Declared minimum.
        min: usize,
    },
    /// Text longer than the declared maximum.
    #[error("Too long ({length} > {max}).")]
    TooLong {
        /// Length in characters.
        length: usize,
        /// Declared maximum.
        max: usize,
    },
    /// Integer below the declared minimum.
    #[error("Too small ({value} < {min}).")]
    TooSmall {
        /// Offending value.
        value: i64,
        /// Declared minimum.
        min: i64,
    },
    /// Integer above the declared maximum.
    #[error("Too large ({value} > {max}).")]
    TooLarge {
        /// Offending value.
        value: i64,
        /// Declared maximum.
        max: i64,
    },
    /// Stored bytes were not UTF-8.
    #[error("Must be valid UTF-8.")]
    InvalidUtf8,
    /// A secret entry was not valid base64.
    #[error("Must be valid base64.")]
    InvalidBase64,
    /// Plain values are stored one per line.
    #[error("Must not contain line breaks.")]
    LineBreak,
}

/// Field-level decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// No raw value and no default.
    #[error("not set")]
    Missing,
    /// The raw value was rejected.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Kind of a field together with its bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    /// `True` / `False`.
    Bool,
    /// Text with optional length bounds (in characters).
    String {
        /// Minimum length.
        min_length: Option<usize>,
        /// Maximum length.
        max_length: Option<usize>,
    },
    /// Base-10 integer with optional value bounds.
    Int {
        /// Minimum value.
        min_value: Option<i64>,
        /// Maximum value.
        max_value: Option<i64>,
    },
}

impl FieldKind {
    /// Lowercase kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::String { .. } => "string",
            Self::Int { .. } => "int",
        }
    }

    fn parse(&self, text: &str) -> Result<ConfigValue, ValidationError> {
        let value = match self {
            Self::Bool => match text {
                "True" => ConfigValue::Bool(true),
                "False" => ConfigValue::Bool(false),
                _ => return Err(ValidationError::NotBool),
            },
            Self::String { .. } => ConfigValue::Str(text.to_string()),
            Self::Int { .. } => ConfigValue::Int(
                text.trim()
                    .parse::<i64>()
                    .map_err(|_| ValidationError::NotInteger)?,
            ),
        };
        self.validate(&value)?;
        Ok(value)
    }

    fn validate(&self, value: &ConfigValue) -> Result<(), ValidationError> {
        match (self, value) {
            (Self::Bool, ConfigValue::Bool(_)) => Ok(()),
            (Self::Bool, _) => Err(ValidationError::NotBool),
            (
                Self::String {
                    min_length,
                    max_length,
                },
                ConfigValue::Str(text),
            ) => {
                let length = text.chars().count();
                if let Some(min) = *min_length
                    && length < min
                {
                    return Err(ValidationError::TooShort { length, min });
                }
                if let Some(max) = *max_length
                    && length > max
                {
                    return Err(ValidationError::TooLong { length, max });
                }
                Ok(())
            }
            (Self::String { .. }, _) => Err(ValidationError::NotString),
            (
                Self::Int {
                    min_value,
                    max_value,
                },
                ConfigValue::Int(value),
            ) => {
                if let Some(min) = *min_value
                    && *value < min
                {
                    return Err(ValidationError::TooSmall { value: *value, min });
                }
                if let Some(max) = *max_value
                    && *value > max
                {
                    return Err(ValidationError::TooLarge { value: *value, max });
                }
                Ok(())
            }
            (Self::Int { .. }, _) => Err(ValidationError::NotInteger),
        }
    }

    const fn accepts(&self, value: &ConfigValue) -> bool {
        matches!(
            (self, value),
            (Self::Bool, ConfigValue::Bool(_))
                | (Self::String { .. }, ConfigValue::Str(_))
                | (Self::Int { .. }, ConfigValue::Int(_))
        )
    }
}

/// Immutable typed descriptor of one configuration item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    #[serde(flatten)]
    kind: FieldKind,
    default: Option<ConfigValue>,
}

impl Field {
    /// A boolean field without default.
    #[must_use]
    pub const fn bool() -> Self {
        Self {
            kind: FieldKind::Bool,
            default: None,
        }
    }

    /// An unbounded string field without default.
    #[must_use]
    pub const fn string() -> Self {
        Self {
            kind: FieldKind::String {
                min_length: None,
                max_length: None,
            },
            default: None,
        }
    }

    /// An unbounded integer field without default.
    #[must_use]
    pub const fn int() -> Self {
        Self {
            kind: FieldKind::Int {
                min_value: None,
                max_value: None,
            },
            default: None,
        }
    }

    /// Declare the value used when nothing is stored.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Minimum length of a string field; ignored for other kinds.
    #[must_use]
    pub const fn min_length(mut self, min: usize) -> Self {
        if let FieldKind::String { min_length, .. } = &mut self.kind {
            *min_length = Some(min);
        }
        self
    }

    /// Maximum length of a string field; ignored for other kinds.
    #[must_use]
    pub const fn max_length(mut self, max: usize) -> Self {
        if let FieldKind::String { max_length, .. } = &mut self.kind {
            *max_length = Some(max);
        }
        self
    }

    /// Minimum value of an integer field; ignored for other kinds.
    #[must_use]
    pub const fn min_value(mut self, min: i64) -> Self {
        if let FieldKind::Int { min_value, .. } = &mut self.kind {
            *min_value = Some(min);
        }
        self
    }

    /// Maximum value of an integer field; ignored for other kinds.
    #[must_use]
    pub const fn max_value(mut self, max: i64) -> Self {
        if let FieldKind::Int { max_value, .. } = &mut self.kind {
            *max_value = Some(max);
        }
        self
    }

    /// Kind and bounds of the field.
    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Declared default, if any.
    #[must_use]
    pub const fn default_value(&self) -> Option<&ConfigValue> {
        self.default.as_ref()
    }

    /// Convert a raw stored representation into a typed value.
    ///
    /// Absent raw values resolve to the default without re-validation.
    ///
    /// # Errors
    ///
    /// [`FieldError::Missing`] when nothing is stored and no default exists;
    /// [`FieldError::Invalid`] when the raw value does not parse or violates a bound.
    pub fn decode(&self, raw: Option<RawValue>) -> Result<ConfigValue, FieldError> {
        let Some(raw) = raw else {
            return self.default.clone().ok_or(FieldError::Missing);
        };
        let text = raw.into_text()?;
        Ok(self.kind.parse(&text)?)
    }

    /// Parse operator-supplied text into a typed value.
    ///
    /// # Errors
    ///
    /// Returns the validation failure for unparsable or out-of-bounds text.
    pub fn parse(&self, text: &str) -> Result<ConfigValue, ValidationError> {
        self.kind.parse(text)
    }

    /// Render a typed value in its canonical storable form.
    ///
    /// # Errors
    ///
    /// Fails when the value is of another kind or violates a bound.
    pub fn encode(&self, value: &ConfigValue) -> Result<String, ValidationError> {
        self.kind.validate(value)?;
        Ok(value.to_string())
    }

    pub(crate) fn default_matches_kind(&self) -> bool {
        self.default
            .as_ref()
            .is_none_or(|value| self.kind.accepts(value))
    }
}
