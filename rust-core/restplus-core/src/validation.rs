//! # Validation Errors
//!
//! Structured violations shared by payload validation and specification
//! validation.
//!
//! Every violation keeps the location of the offending value (a dotted
//! path such as `items.0.name`, empty for the document root) next to the
//! human-readable message produced by the schema engine.

use jsonschema::error::ValidationErrorKind;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Error code for categorizing validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// Required field is missing
    Required,
    /// Value is invalid type
    InvalidType,
    /// Value is too short
    TooShort,
    /// Value is too long
    TooLong,
    /// Value is below minimum
    TooSmall,
    /// Value is above maximum
    TooLarge,
    /// Value doesn't match pattern or format
    InvalidFormat,
    /// Value is not in allowed set
    InvalidChoice,
    /// Field is not allowed by the schema
    NotAllowed,
    /// Any other schema keyword failed
    Custom,
}

impl ValidationCode {
    fn from_kind(kind: &ValidationErrorKind) -> Self {
        match kind {
            ValidationErrorKind::Required { .. } => Self::Required,
            ValidationErrorKind::Type { .. } => Self::InvalidType,
            ValidationErrorKind::MinLength { .. } | ValidationErrorKind::MinItems { .. } => {
                Self::TooShort
            }
            ValidationErrorKind::MaxLength { .. } | ValidationErrorKind::MaxItems { .. } => {
                Self::TooLong
            }
            ValidationErrorKind::Minimum { .. } | ValidationErrorKind::ExclusiveMinimum { .. } => {
                Self::TooSmall
            }
            ValidationErrorKind::Maximum { .. } | ValidationErrorKind::ExclusiveMaximum { .. } => {
                Self::TooLarge
            }
            ValidationErrorKind::Pattern { .. } | ValidationErrorKind::Format { .. } => {
                Self::InvalidFormat
            }
            ValidationErrorKind::Enum { .. } => Self::InvalidChoice,
            ValidationErrorKind::AdditionalProperties { .. } => Self::NotAllowed,
            _ => Self::Custom,
        }
    }
}

/// A single validation error for a specific field
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    /// Dotted path to the offending value (e.g., "user.address.city"),
    /// empty for the document root
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Machine-readable error code
    pub code: ValidationCode,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }

    /// Build from a `jsonschema` error, prefixing `base` to its instance path
    pub fn from_schema_error(base: &str, error: &jsonschema::ValidationError<'_>) -> Self {
        let pointer = error.instance_path.to_string();
        let field = pointer.trim_start_matches('/').replace('/', ".");
        Self {
            field,
            message: error.to_string(),
            code: ValidationCode::from_kind(&error.kind),
        }
        .under(base)
    }

    /// Re-root this error below `base`
    #[must_use]
    pub fn under(mut self, base: &str) -> Self {
        if !base.is_empty() {
            self.field = if self.field.is_empty() {
                base.to_string()
            } else {
                format!("{base}.{}", self.field)
            };
        }
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Collection of validation errors
///
/// Allows aggregating every violation found in a single document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationErrors {
    /// List of field-level errors
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Create an empty error collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field error
    pub fn add(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// Move every error of `other` into this collection
    pub fn extend(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    /// Check if there are any errors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterate over the errors in the order they were found
    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.errors.iter()
    }

    /// `Ok(())` when empty, the collection itself otherwise
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one error was collected.
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Field-to-message map used in error response bodies
    ///
    /// When a field has several errors the first one is reported.
    #[must_use]
    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for error in &self.errors {
            map.entry(error.field.clone())
                .or_insert_with(|| Value::String(error.message.clone()));
        }
        map
    }

    /// Group errors by field
    #[must_use]
    pub fn by_field(&self) -> HashMap<String, Vec<&FieldError>> {
        let mut map: HashMap<String, Vec<&FieldError>> = HashMap::new();
        for error in &self.errors {
            map.entry(error.field.clone()).or_default().push(error);
        }
        map
    }
}

impl FromIterator<FieldError> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = FieldError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {error}")?;
        }
        Ok(())
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = std::result::Result<T, ValidationErrors>;
