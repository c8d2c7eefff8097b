//! Declarative parameter validation.
//!
//! A [`Schema`] lists fields in declaration order, each with a [`FieldRule`]
//! naming the accepted [`ValueKind`]s, whether the field is required, and an
//! optional predicate. [`validate`] checks every field and returns every
//! failure rather than stopping at the first.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::panic_message;

/// Failure raised by a field predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    /// Builds a validation error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// JSON value shapes a field can be constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A JSON string.
    String,
    /// A whole number.
    Integer,
    /// Any JSON number, integers included.
    Float,
    /// `true` or `false`.
    Boolean,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
    /// Any non-null value.
    Any,
}

impl ValueKind {
    /// Returns true when `value` has this shape.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => !value.is_null(),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field predicate run after the type check passes.
pub type Predicate = Arc<dyn Fn(&Value) -> Result<(), ValidationError> + Send + Sync>;

/// Constraints on a single parameter.
#[derive(Clone)]
pub struct FieldRule {
    kinds: Vec<ValueKind>,
    required: bool,
    predicate: Option<Predicate>,
}

impl FieldRule {
    /// A required field of one kind.
    #[must_use]
    pub fn required(kind: ValueKind) -> Self {
        Self::required_any_of([kind])
    }

    /// An optional field of one kind.
    #[must_use]
    pub fn optional(kind: ValueKind) -> Self {
        Self::optional_any_of([kind])
    }

    /// A required field accepting any of `kinds`.
    #[must_use]
    pub fn required_any_of(kinds: impl IntoIterator<Item = ValueKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            required: true,
            predicate: None,
        }
    }

    /// An optional field accepting any of `kinds`.
    #[must_use]
    pub fn optional_any_of(kinds: impl IntoIterator<Item = ValueKind>) -> Self {
        Self {
            required: false,
            ..Self::required_any_of(kinds)
        }
    }

    /// Attaches a predicate.
    #[must_use]
    pub fn with_validator<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    fn check(&self, field: &str, value: Option<&Value>) -> Option<String> {
        let Some(value) = value.filter(|value| !value.is_null()) else {
            return self.required.then(|| format!("{field} is required"));
        };

        if !self.kinds.is_empty() && !self.kinds.iter().any(|kind| kind.matches(value)) {
            return Some(self.type_mismatch(field));
        }

        let predicate = self.predicate.as_ref()?;
        match panic::catch_unwind(AssertUnwindSafe(|| predicate(value))) {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(format!("{field}: {error}")),
            Err(payload) => Some(format!(
                "{field}: validation error - {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    fn type_mismatch(&self, field: &str) -> String {
        match self.kinds.as_slice() {
            [kind] => format!("{field} must be {kind}"),
            kinds => {
                let names = kinds
                    .iter()
                    .map(|kind| kind.name())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{field} must be one of [{names}]")
            }
        }
    }
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule")
            .field("kinds", &self.kinds)
            .field("required", &self.required)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Ordered set of field rules.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldRule)>,
}

impl Schema {
    /// An empty schema that accepts any parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field. Declaring the same name twice replaces the earlier rule.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            slot.1 = rule;
        } else {
            self.fields.push((name, rule));
        }
        self
    }

    /// Returns true when no fields are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates `params` and folds all failures into a single error.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] reading `Validation failed: a; b` when
    /// any field fails.
    pub fn check(&self, params: &Map<String, Value>) -> Result<(), ValidationError> {
        let errors = validate(params, self);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(format!(
                "Validation failed: {}",
                errors.join("; ")
            )))
        }
    }
}

/// Checks `params` against `schema`, returning one message per failing field.
///
/// Fields not named by the schema are ignored. A `null` value counts as
/// absent.
#[must_use]
pub fn validate(params: &Map<String, Value>, schema: &Schema) -> Vec<String> {
    schema
        .fields
        .iter()
        .filter_map(|(name, rule)| rule.check(name, params.get(name)))
        .collect()
}

/// Stock predicates for common parameter shapes.
pub mod predicates {
    use serde_json::Value;

    use super::ValidationError;

    /// Accepts integers of at least one.
    pub fn positive_frame(value: &Value) -> Result<(), ValidationError> {
        match value.as_i64() {
            Some(frame) if frame >= 1 => Ok(()),
            _ => Err(ValidationError::new("Frame must be a positive integer")),
        }
    }

    /// Accepts numbers strictly greater than zero.
    pub fn positive_number(value: &Value) -> Result<(), ValidationError> {
        match value.as_f64() {
            Some(number) if number > 0.0 => Ok(()),
            _ => Err(ValidationError::new("Value must be a positive number")),
        }
    }

    /// Builds a predicate accepting numbers within `min..=max`.
    pub fn in_range(
        min: f64,
        max: f64,
    ) -> impl Fn(&Value) -> Result<(), ValidationError> + Send + Sync + 'static {
        move |value| match value.as_f64() {
            Some(number) if (min..=max).contains(&number) => Ok(()),
            _ => Err(ValidationError::new(format!(
                "Value must be between {min} and {max}"
            ))),
        }
    }

    /// Builds a predicate accepting strings from a fixed set.
    pub fn one_of<I, S>(
        allowed: I,
    ) -> impl Fn(&Value) -> Result<(), ValidationError> + Send + Sync + 'static
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: Vec<String> = allowed.into_iter().map(Into::into).collect();
        move |value| match value.as_str() {
            Some(text) if allowed.iter().any(|candidate| candidate == text) => Ok(()),
            _ => Err(ValidationError::new(format!(
                "Value must be one of: {}",
                allowed.join(", ")
            ))),
        }
    }

    /// Accepts dotted property paths such as `location.x`,
    /// `modifiers[0].levels` or `pose.bones["upper_arm.L"].rotation_quaternion`.
    pub fn data_path(value: &Value) -> Result<(), ValidationError> {
        let invalid = || ValidationError::new("Data path must be a dotted property path");
        let mut rest = value.as_str().ok_or_else(invalid)?;
        loop {
            let name_len = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            if name_len == 0 {
                return Err(invalid());
            }
            rest = skip_indices(&rest[name_len..]).ok_or_else(invalid)?;
            match rest.strip_prefix('.') {
                Some(next) => rest = next,
                None if rest.is_empty() => return Ok(()),
                None => return Err(invalid()),
            }
        }
    }

    /// Consumes any `[0]` or `["key"]` indices; a quoted key may hold dots
    /// and brackets.
    fn skip_indices(mut rest: &str) -> Option<&str> {
        while let Some(inner) = rest.strip_prefix('[') {
            rest = if let Some(quoted) = inner.strip_prefix('"') {
                let close = quoted.find('"')?;
                quoted[close + 1..].strip_prefix(']')?
            } else {
                let close = inner.find(']')?;
                let index = &inner[..close];
                if index.is_empty() || !index.chars().all(|ch| ch.is_ascii_digit()) {
                    return None;
                }
                &inner[close + 1..]
            };
        }
        Some(rest)
    }
}
