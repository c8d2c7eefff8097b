//! The command handler contract.
//!
//! A handler names the command it serves, declares a parameter [`Schema`],
//! and executes against an explicit `&mut H` host capability. The provided
//! [`CommandHandler::handle`] method validates, executes, and shapes the
//! outcome into an [`Envelope`]; implementors normally only write
//! [`CommandHandler::execute`].

use std::panic::{self, AssertUnwindSafe};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::envelope::{ContextProvider, Envelope, ResponseBuilder, Warning};
use crate::error_code::{ErrorCode, suggestions_for};
use crate::panic_message;
use crate::validation::{Schema, validate};

const HANDLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::handler");

const VALIDATION_SUGGESTIONS: [&str; 2] = [
    "Check parameter types and values",
    "Refer to command documentation",
];

/// Command parameters as received on the wire.
pub type Params = Map<String, Value>;

/// Outcome of [`CommandHandler::execute`].
pub type HandlerResult = Result<Reply, HandlerError>;

/// Successful handler output.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The command finished.
    Complete {
        /// Result payload.
        result: Value,
        /// Non-fatal notes.
        warnings: Vec<Warning>,
    },
    /// The command finished part of its work.
    Partial {
        /// Result payload so far.
        result: Value,
        /// Units finished.
        completed: u64,
        /// Units in total.
        total: u64,
        /// Non-fatal notes.
        warnings: Vec<Warning>,
    },
}

impl Reply {
    /// A complete reply without warnings.
    #[must_use]
    pub fn complete(result: Value) -> Self {
        Self::Complete {
            result,
            warnings: Vec::new(),
        }
    }

    /// A partial reply without warnings.
    #[must_use]
    pub fn partial(result: Value, completed: u64, total: u64) -> Self {
        Self::Partial {
            result,
            completed,
            total,
            warnings: Vec::new(),
        }
    }

    /// Appends a warning.
    #[must_use]
    pub fn with_warning(mut self, warning: Warning) -> Self {
        match &mut self {
            Self::Complete { warnings, .. } | Self::Partial { warnings, .. } => {
                warnings.push(warning);
            }
        }
        self
    }

    fn into_envelope(self, builder: &ResponseBuilder<'_>) -> Envelope {
        match self {
            Self::Complete { result, warnings } => builder.success(result).with_warnings(warnings),
            Self::Partial {
                result,
                completed,
                total,
                warnings,
            } => builder
                .partial(result, completed, total)
                .with_warnings(warnings),
        }
    }
}

impl From<Value> for Reply {
    fn from(result: Value) -> Self {
        Self::complete(result)
    }
}

/// Failure reported by a handler.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct HandlerError {
    code: ErrorCode,
    message: String,
    details: Map<String, Value>,
    suggestions: Vec<String>,
}

impl HandlerError {
    /// Builds an error with an explicit code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Map::new(),
            suggestions: Vec::new(),
        }
    }

    /// A generic `EXECUTION_ERROR`.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecutionError, message)
    }

    /// An `INVALID_PARAMETER` error for checks the schema cannot express.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, message)
    }

    /// Adds a structured detail.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Adds a client hint. Errors without explicit hints get heuristic ones.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// The error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn into_envelope(self, builder: &ResponseBuilder<'_>) -> Envelope {
        let suggestions = if self.suggestions.is_empty() {
            suggestions_for(&self.message)
        } else {
            self.suggestions
        };
        let mut envelope = builder
            .error(self.code, self.message)
            .with_suggestions(suggestions);
        if let Some(error) = envelope.error.as_mut() {
            error.details = self.details;
        }
        envelope
    }
}

/// A named unit of work executed on the host's main thread.
///
/// `H` is the host state. Handlers only ever see it through the `&mut H`
/// passed to [`execute`](Self::execute), which the scheduler guarantees runs
/// on the thread that owns it.
pub trait CommandHandler<H: ContextProvider>: Send + Sync {
    /// The command name clients send in `type`.
    fn command_name(&self) -> &str;

    /// Parameters checked before [`execute`](Self::execute) runs.
    fn parameter_schema(&self) -> Schema {
        Schema::new()
    }

    /// Performs the command. Only called once parameters validate.
    fn execute(&self, params: &Params, host: &mut H) -> HandlerResult;

    /// One-line help text.
    fn describe(&self) -> String {
        format!("Command: {}", self.command_name())
    }

    /// Validates, executes, and wraps the outcome in an envelope.
    ///
    /// Validation failures become `INVALID_PARAMETER`. A handler error keeps
    /// its own code. A panic inside `execute` becomes `EXECUTION_ERROR`.
    fn handle(&self, params: &Params, host: &mut H) -> Envelope {
        let name = self.command_name();
        let errors = validate(params, &self.parameter_schema());
        if !errors.is_empty() {
            debug!(target: HANDLER_TARGET, command = name, ?errors, "parameter validation failed");
            return ResponseBuilder::new(&*host)
                .error(
                    ErrorCode::InvalidParameter,
                    format!("Validation failed: {}", errors.join("; ")),
                )
                .with_detail("errors", Value::from(errors))
                .with_suggestions(VALIDATION_SUGGESTIONS);
        }

        debug!(target: HANDLER_TARGET, command = name, "executing command");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(params, host)));
        let builder = ResponseBuilder::new(&*host);
        match outcome {
            Ok(Ok(reply)) => reply.into_envelope(&builder),
            Ok(Err(failure)) => {
                warn!(
                    target: HANDLER_TARGET,
                    command = name,
                    code = %failure.code(),
                    message = failure.message(),
                    "command failed"
                );
                failure.into_envelope(&builder)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(target: HANDLER_TARGET, command = name, %message, "command panicked");
                HandlerError::execution(message).into_envelope(&builder)
            }
        }
    }
}
