//! Captured Request Records
//!
//! A [`CaptureRecord`] describes one request attempt at one of three
//! lifecycle stages:
//!
//! ```text
//!   Pending ──complete_with_response──▶ Succeeded (response, duration)
//!      │
//!      └─────complete_with_error─────▶ Failed    (error, duration)
//! ```
//!
//! Records are values. The store never mutates a record in place; a
//! completion builds a new record from the old one and replaces the slot.

mod display;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use display::{format_body, truncate_chars, DEFAULT_BODY_PREVIEW_CHARS};

/// String-keyed header map as observed on the wire
///
/// Keys keep the casing the transport reported. Repeated headers are joined
/// with `", "`.
pub type HeaderFields = BTreeMap<String, String>;

/// Case-insensitive header lookup
#[must_use]
pub fn header_value<'a>(headers: &'a HeaderFields, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier of a captured record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a fresh, process-unique identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Snapshot of an outgoing request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Absolute request URL
    pub url: String,
    /// HTTP method token (e.g. `GET`)
    pub method: String,
    /// Request headers
    pub headers: HeaderFields,
    /// Request body, if any
    #[serde(default, with = "optional_body")]
    pub body: Option<Bytes>,
}

impl RequestSnapshot {
    /// Create a snapshot with no headers and no body
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: HeaderFields::new(),
            body: None,
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Case-insensitive header lookup
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Snapshot of a received response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderFields,
    /// Captured response body, if any bytes arrived
    #[serde(default, with = "optional_body")]
    pub body: Option<Bytes>,
    /// The body stopped accumulating at the capture ceiling
    #[serde(default)]
    pub body_truncated: bool,
}

impl ResponseSnapshot {
    /// Case-insensitive header lookup
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Whether the status falls in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Classification of a recorded failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The transport gave up waiting
    Timeout,
    /// No connection could be established
    Connect,
    /// The request could not be sent
    Request,
    /// The response body failed mid-stream
    Body,
    /// The caller abandoned the request
    Cancelled,
    /// The interception layer could not tag the request
    Admission,
    /// The transport closed the stream without a terminal event
    Incomplete,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Cancelled => "cancelled",
            Self::Admission => "admission",
            Self::Incomplete => "incomplete",
        };
        f.write_str(label)
    }
}

/// A failure as stored on a record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedError {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable description shown by the debug surface
    pub description: String,
}

impl RecordedError {
    /// Create a recorded error
    pub fn new(kind: FailureKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

// ============================================================================
// Record
// ============================================================================

/// Color banding used by debug surfaces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusBand {
    /// No terminal state yet
    Pending,
    /// Response with a 2xx status
    Success,
    /// Response outside the 2xx range
    Failure,
    /// Transport-level error
    Error,
}

/// One captured request attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    id: RecordId,
    timestamp: DateTime<Utc>,
    request: RequestSnapshot,
    response: Option<ResponseSnapshot>,
    error: Option<RecordedError>,
    duration: Option<Duration>,
}

impl CaptureRecord {
    /// A freshly initiated record
    pub(crate) fn pending(id: RecordId, request: RequestSnapshot) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            request,
            response: None,
            error: None,
            duration: None,
        }
    }

    /// A copy of this record carrying a response
    ///
    /// Any previously recorded error is left as it was.
    pub(crate) fn with_response(&self, response: ResponseSnapshot, duration: Duration) -> Self {
        Self {
            response: Some(response),
            duration: Some(duration),
            ..self.clone()
        }
    }

    /// A copy of this record carrying an error
    ///
    /// Any previously recorded response is left as it was.
    pub(crate) fn with_error(&self, error: RecordedError, duration: Duration) -> Self {
        Self {
            error: Some(error),
            duration: Some(duration),
            ..self.clone()
        }
    }

    /// Record identifier
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// When the request was initiated
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The request as it was sent
    #[must_use]
    pub fn request(&self) -> &RequestSnapshot {
        &self.request
    }

    /// The response, once one arrived
    #[must_use]
    pub fn response(&self) -> Option<&ResponseSnapshot> {
        self.response.as_ref()
    }

    /// The failure, if the request failed
    #[must_use]
    pub fn error(&self) -> Option<&RecordedError> {
        self.error.as_ref()
    }

    /// Elapsed time from tagging to the terminal event
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Neither a response nor an error has been recorded
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.response.is_none() && self.error.is_none()
    }

    /// A response with a 2xx status was recorded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response.as_ref().is_some_and(ResponseSnapshot::is_success)
    }

    /// An error was recorded
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Status label: `Pending`, `Error` or the numeric status code
    #[must_use]
    pub fn display_status(&self) -> String {
        if self.error.is_some() {
            return "Error".to_string();
        }
        match &self.response {
            Some(response) => response.status.to_string(),
            None => "Pending".to_string(),
        }
    }

    /// Color band for the current state
    #[must_use]
    pub fn status_band(&self) -> StatusBand {
        if self.error.is_some() {
            StatusBand::Error
        } else if let Some(response) = &self.response {
            if response.is_success() {
                StatusBand::Success
            } else {
                StatusBand::Failure
            }
        } else {
            StatusBand::Pending
        }
    }

    /// Elapsed time as text (`-` while pending)
    #[must_use]
    pub fn duration_text(&self) -> String {
        match self.duration {
            None => "-".to_string(),
            Some(d) if d < Duration::from_secs(1) => format!("{} ms", d.as_millis()),
            Some(d) => format!("{:.2} s", d.as_secs_f64()),
        }
    }

    /// Request body rendered for display
    #[must_use]
    pub fn request_body_text(&self, max_chars: usize) -> Option<String> {
        format_body(self.request.body.as_deref(), &self.request.headers, max_chars)
    }

    /// Response body rendered for display
    #[must_use]
    pub fn response_body_text(&self, max_chars: usize) -> Option<String> {
        self.response
            .as_ref()
            .and_then(|r| format_body(r.body.as_deref(), &r.headers, max_chars))
    }

    /// Shell command reproducing the request
    #[must_use]
    pub fn to_curl(&self) -> String {
        display::curl_command(&self.request)
    }
}

/// Serialize records as a pretty-printed JSON array
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_json(records: &[CaptureRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}

// ============================================================================
// Serde helpers for bodies
// ============================================================================

/// Serialize/deserialize optional bodies as text, or base64 when not UTF-8
///
/// Text bodies become a plain JSON string. Anything else becomes
/// `{"encoding": "base64", "data": "..."}`.
mod optional_body {
    use bytes::Bytes;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    const BASE64: &str = "base64";

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Body {
        Text(String),
        Encoded { encoding: String, data: String },
    }

    pub fn serialize<S>(body: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let body = body.as_ref().map(|bytes| match std::str::from_utf8(bytes) {
            Ok(text) => Body::Text(text.to_string()),
            Err(_) => Body::Encoded {
                encoding: BASE64.to_string(),
                data: base64::encode(bytes),
            },
        });
        body.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Bytes>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Body>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Body::Text(text)) => Ok(Some(Bytes::from(text))),
            Some(Body::Encoded { encoding, data }) if encoding == BASE64 => base64::decode(data)
                .map(|bytes| Some(Bytes::from(bytes)))
                .map_err(de::Error::custom),
            Some(Body::Encoded { encoding, .. }) => Err(de::Error::custom(format!(
                "unsupported body encoding: {encoding}"
            ))),
        }
    }
}
