//! Uniform response envelopes.
//!
//! Every reply on the wire is an [`Envelope`] with a `status`, either a
//! `result` or an `error`, a best-effort `context` snapshot of the host, and
//! `metadata` that always carries a UTC `timestamp`. Envelopes are built by a
//! [`ResponseBuilder`], which pulls the context from a [`ContextProvider`].
//!
//! ```json
//! {"status":"success","result":{"object_count":3},
//!  "context":{"scene":"Scene"},"metadata":{"timestamp":"2025-01-01T00:00:00Z"}}
//! ```

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::error_code::ErrorCode;

const ENVELOPE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::envelope");
const EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// Outcome class of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The command completed.
    Success,
    /// The command failed; `error` is populated.
    Error,
    /// The command completed part of its work; `progress` is populated.
    Partial,
}

/// Error payload of an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Structured detail, empty when there is none.
    #[serde(default)]
    pub details: Map<String, Value>,
}

/// Non-fatal note attached to a success or partial response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Description of the problem.
    pub message: String,
    /// Optional machine-readable tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Warning {
    /// Builds an untagged warning.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attaches a machine-readable tag.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Progress counters of a partial response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Units finished.
    pub completed: u64,
    /// Units in total.
    pub total: u64,
    /// `completed / total` as a percentage; zero when `total` is zero.
    pub percentage: f64,
}

impl Progress {
    /// Computes the percentage from the counters.
    #[must_use]
    pub fn new(completed: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            completed,
            total,
            percentage,
        }
    }
}

/// A single response as written to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Outcome class.
    pub status: Status,
    /// Result payload for success and partial responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload for error responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    /// Counters for partial responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// Non-fatal notes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    /// Hints for the client.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Host state snapshot at response time; may be empty.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Response metadata; always contains `timestamp`.
    pub metadata: Map<String, Value>,
}

impl Envelope {
    fn new(status: Status, context: Map<String, Value>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("timestamp".to_owned(), Value::String(timestamp()));
        Self {
            status,
            result: None,
            error: None,
            progress: None,
            warnings: Vec::new(),
            suggestions: Vec::new(),
            context,
            metadata,
        }
    }

    /// Returns true for success responses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Error code of an error response.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|error| error.code)
    }

    /// Error message of an error response.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|error| error.message.as_str())
    }

    /// Appends warnings.
    #[must_use]
    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = Warning>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Appends suggestions.
    #[must_use]
    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions
            .extend(suggestions.into_iter().map(Into::into));
        self
    }

    /// Merges extra metadata; the `timestamp` entry may be overridden but
    /// never removed.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Inserts one entry into the error details. No effect on non-error
    /// envelopes.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.details.insert(key.into(), value);
        }
        self
    }

    /// Serialises the envelope to its wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload value cannot be serialised.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Failure reported by a [`ContextProvider`].
#[derive(Debug, Error)]
#[error("host context unavailable: {message}")]
pub struct ContextError {
    message: String,
}

impl ContextError {
    /// Builds a context error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Source of the `context` snapshot attached to each envelope.
///
/// Implemented by the host state the main thread owns. Snapshots are
/// advisory; a failing provider yields an empty context.
pub trait ContextProvider {
    /// Captures the current host state.
    fn context_snapshot(&self) -> Result<Map<String, Value>, ContextError>;
}

/// Provider used where no host state is reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContext;

impl ContextProvider for NoContext {
    fn context_snapshot(&self) -> Result<Map<String, Value>, ContextError> {
        Ok(Map::new())
    }
}

/// Builds envelopes stamped with a host context.
#[derive(Clone, Copy)]
pub struct ResponseBuilder<'a> {
    context: &'a dyn ContextProvider,
}

impl<'a> ResponseBuilder<'a> {
    /// Creates a builder reading context from `context`.
    pub fn new(context: &'a dyn ContextProvider) -> Self {
        Self { context }
    }

    /// Creates a builder whose envelopes carry an empty context.
    #[must_use]
    pub fn detached() -> ResponseBuilder<'static> {
        ResponseBuilder { context: &NoContext }
    }

    /// Success envelope wrapping `result`.
    #[must_use]
    pub fn success(&self, result: Value) -> Envelope {
        let mut envelope = Envelope::new(Status::Success, self.snapshot());
        envelope.result = Some(result);
        envelope
    }

    /// Error envelope with an empty `details` map.
    #[must_use]
    pub fn error(&self, code: ErrorCode, message: impl Into<String>) -> Envelope {
        let mut envelope = Envelope::new(Status::Error, self.snapshot());
        envelope.error = Some(ErrorBody {
            code,
            message: message.into(),
            details: Map::new(),
        });
        envelope
    }

    /// Partial envelope for long-running work.
    #[must_use]
    pub fn partial(&self, result: Value, completed: u64, total: u64) -> Envelope {
        let mut envelope = Envelope::new(Status::Partial, self.snapshot());
        envelope.result = Some(result);
        envelope.progress = Some(Progress::new(completed, total));
        envelope
    }

    fn snapshot(&self) -> Map<String, Value> {
        let provider = self.context;
        match panic::catch_unwind(AssertUnwindSafe(|| provider.context_snapshot())) {
            Ok(Ok(context)) => context,
            Ok(Err(error)) => {
                debug!(target: ENVELOPE_TARGET, %error, "omitting host context");
                Map::new()
            }
            Err(_) => {
                debug!(target: ENVELOPE_TARGET, "host context provider panicked");
                Map::new()
            }
        }
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| EPOCH_TIMESTAMP.to_owned())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    struct SceneContext;

    impl ContextProvider for SceneContext {
        fn context_snapshot(&self) -> Result<Map<String, Value>, ContextError> {
            let mut context = Map::new();
            context.insert("scene".to_owned(), json!("Scene"));
            Ok(context)
        }
    }

    struct BrokenContext;

    impl ContextProvider for BrokenContext {
        fn context_snapshot(&self) -> Result<Map<String, Value>, ContextError> {
            Err(ContextError::new("no active scene"))
        }
    }

    struct PanickingContext;

    impl ContextProvider for PanickingContext {
        fn context_snapshot(&self) -> Result<Map<String, Value>, ContextError> {
            panic!("context exploded");
        }
    }

    #[rstest]
    fn success_carries_result_context_and_timestamp() {
        let envelope = ResponseBuilder::new(&SceneContext).success(json!({"object_count": 3}));
        let wire: Value = serde_json::from_slice(&envelope.to_bytes().expect("serialise"))
            .expect("parse envelope");
        assert_eq!(wire["status"], "success");
        assert_eq!(wire["result"]["object_count"], 3);
        assert_eq!(wire["context"]["scene"], "Scene");
        assert!(wire["metadata"]["timestamp"].is_string());
        assert!(wire.get("error").is_none());
    }

    #[rstest]
    fn error_carries_code_and_empty_details() {
        let envelope = ResponseBuilder::detached()
            .error(ErrorCode::InvalidCommand, "Command type is required")
            .with_suggestions(["Include 'type' field in command"]);
        let wire = serde_json::to_value(&envelope).expect("serialise");
        assert_eq!(wire["status"], "error");
        assert_eq!(wire["error"]["code"], "INVALID_COMMAND");
        assert_eq!(wire["error"]["details"], json!({}));
        assert_eq!(wire["suggestions"][0], "Include 'type' field in command");
        assert!(wire.get("result").is_none());
    }

    #[rstest]
    #[case::failing(&BrokenContext)]
    #[case::panicking(&PanickingContext)]
    fn context_failures_degrade_to_empty(#[case] provider: &dyn ContextProvider) {
        let envelope = ResponseBuilder::new(provider).success(json!(null));
        assert!(envelope.context.is_empty());
        assert!(envelope.metadata.contains_key("timestamp"));
        assert!(envelope.is_success());
    }

    #[rstest]
    #[case(5, 10, 50.0)]
    #[case(3, 3, 100.0)]
    #[case(0, 0, 0.0)]
    fn partial_reports_percentage(#[case] completed: u64, #[case] total: u64, #[case] pct: f64) {
        let envelope = ResponseBuilder::detached().partial(json!([]), completed, total);
        let progress = envelope.progress.expect("progress present");
        assert_eq!(envelope.status, Status::Partial);
        assert!((progress.percentage - pct).abs() < f64::EPSILON);
    }

    #[rstest]
    fn metadata_merges_without_dropping_timestamp() {
        let mut extra = Map::new();
        extra.insert("command".to_owned(), json!("get_scene_info"));
        let envelope = ResponseBuilder::detached()
            .success(json!({}))
            .with_metadata(extra)
            .with_warnings([Warning::new("truncated to 20 objects").with_code("TRUNCATED")]);
        assert_eq!(envelope.metadata["command"], "get_scene_info");
        assert!(envelope.metadata.contains_key("timestamp"));
        assert_eq!(envelope.warnings.len(), 1);
    }

    #[rstest]
    fn details_only_attach_to_errors() {
        let success = ResponseBuilder::detached()
            .success(json!(1))
            .with_detail("field", json!("frame"));
        assert!(success.error.is_none());

        let error = ResponseBuilder::detached()
            .error(ErrorCode::InvalidParameter, "bad")
            .with_detail("field", json!("frame"));
        assert_eq!(error.error.expect("error body").details["field"], "frame");
    }
}
