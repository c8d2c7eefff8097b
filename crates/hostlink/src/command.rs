//! Request parsing.
//!
//! A request is a JSON object `{"type": "...", "params": {...}}`. A JSON
//! string holding such an object is accepted too, so clients that
//! double-encode still route.

use serde_json::Value;
use thiserror::Error;

use crate::handler::Params;

/// Structural problems with a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// A string request that does not parse as JSON.
    #[error("Command must be a dictionary or valid JSON, got: {kind}")]
    Unparseable { kind: &'static str },
    /// The request is valid JSON but not an object.
    #[error("Command must be a dictionary, got: {kind}")]
    NotAnObject { kind: &'static str },
    /// `type` is absent, empty, or not a string.
    #[error("Command type is required")]
    MissingType,
    /// `params` is present but not an object.
    #[error("Command params must be a dictionary, got: {kind}")]
    InvalidParams { kind: &'static str },
}

impl CommandError {
    /// Hints attached to the error envelope.
    #[must_use]
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Self::Unparseable { .. } => &[
                "Ensure command is a valid JSON object",
                "Check command format",
            ],
            Self::NotAnObject { .. } => &["Ensure command is a dictionary", "Check command format"],
            Self::MissingType => &["Include 'type' field in command"],
            Self::InvalidParams { .. } => &["Send 'params' as a JSON object or omit it"],
        }
    }
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    params: Params,
}

impl Command {
    /// Builds a command directly.
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Parses a decoded request document.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] describing the first structural problem.
    pub fn from_value(value: &Value) -> Result<Self, CommandError> {
        match value {
            Value::Object(_) => Self::from_object(value),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(inner @ Value::Object(_)) => Self::from_object(&inner),
                Ok(inner) => Err(CommandError::NotAnObject {
                    kind: kind_name(&inner),
                }),
                Err(_) => Err(CommandError::Unparseable { kind: "string" }),
            },
            other => Err(CommandError::NotAnObject {
                kind: kind_name(other),
            }),
        }
    }

    fn from_object(value: &Value) -> Result<Self, CommandError> {
        let name = value
            .get("type")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or(CommandError::MissingType)?;
        let params = match value.get("params") {
            None | Some(Value::Null) => Params::new(),
            Some(Value::Object(params)) => params.clone(),
            Some(other) => {
                return Err(CommandError::InvalidParams {
                    kind: kind_name(other),
                });
            }
        };
        Ok(Self::new(name, params))
    }

    /// The command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The command parameters; empty when none were sent.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }
}

pub(crate) const fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
