//! Stable error codes carried in error envelopes.
//!
//! The first group is produced by the bridge itself. The second group is
//! reserved for command handlers reporting domain failures so clients can
//! branch on a code rather than parse messages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Closed taxonomy of wire-level error codes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The request was not an object, lacked a `type`, or named no handler.
    InvalidCommand,
    /// A required parameter was absent.
    MissingParameter,
    /// A parameter failed schema validation.
    InvalidParameter,
    /// The handler reported or raised a failure while executing.
    ExecutionError,
    /// Waiting for the main thread exceeded its bound.
    Timeout,
    /// Anything the bridge did not anticipate.
    UnknownError,
    /// A named host object does not exist.
    ObjectNotFound,
    /// A host object with the requested name already exists.
    ObjectExists,
    /// A host object has the wrong type for the operation.
    InvalidObjectType,
    /// A frame number is out of range.
    InvalidFrame,
    /// A host operation ran but did not succeed.
    OperationFailed,
    /// A network-level failure.
    ConnectionError,
    /// An external service reported an error.
    ApiError,
}

/// Derives client-facing hints from a failure message.
///
/// Matching is case-insensitive and purely lexical; an empty list means no
/// hint applies.
#[must_use]
pub fn suggestions_for(message: &str) -> Vec<String> {
    let lowered = message.to_ascii_lowercase();
    let hints: &[&str] = if lowered.contains("not found") {
        &[
            "Check that the object name is correct",
            "Ensure the object exists in the current scene",
        ]
    } else if lowered.contains("invalid") {
        &["Check parameter values and types"]
    } else if lowered.contains("timeout") || lowered.contains("timed out") {
        &[
            "The operation may have taken too long",
            "Try breaking the operation into smaller steps",
        ]
    } else {
        &[]
    };
    hints.iter().map(|hint| (*hint).to_owned()).collect()
}
