//! HTTP Transport Traits
//!
//! Trait definitions for the HTTP transport the capture layer sits on. Call
//! sites hold an `Arc<dyn HttpTransport>` and never learn whether capture is
//! in the chain.
//!
//! # Event Contract
//!
//! [`HttpTransport::dispatch`] returns a channel of [`TransferEvent`]s:
//!
//! ```text
//! Head ─▶ Chunk* ─▶ Complete
//!   │        └────▶ Failed
//!   └─────────────▶ Failed
//! ```
//!
//! Failures before a response head arrives are returned from `dispatch`
//! itself. Dropping the receiver cancels the exchange.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::record::{FailureKind, HeaderFields, RecordId, RecordedError, RequestSnapshot};

// ============================================================================
// Requests
// ============================================================================

/// An HTTP request as issued by application code
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method token
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: HeaderFields,
    /// Request body
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Create a request with the given method and URL
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeaderFields::new(),
            body: None,
        }
    }

    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
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

    /// Copy of this request for a capture record
    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            url: self.url.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// A request the capture layer has already tagged
///
/// Only the capture layer can construct one, so a `Traced` request is proof
/// that the exchange is being recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracedRequest {
    id: RecordId,
    request: HttpRequest,
}

impl TracedRequest {
    pub(crate) fn new(id: RecordId, request: HttpRequest) -> Self {
        Self { id, request }
    }

    /// Record this request is captured under
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// The wrapped request
    #[must_use]
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }
}

/// A request handed to a transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutgoingRequest {
    /// Plain application request, eligible for capture
    Untraced(HttpRequest),
    /// Already captured; must not be captured again
    Traced(TracedRequest),
}

impl OutgoingRequest {
    /// The underlying HTTP request
    #[must_use]
    pub fn http(&self) -> &HttpRequest {
        match self {
            Self::Untraced(request) => request,
            Self::Traced(traced) => &traced.request,
        }
    }

    /// Unwrap into the underlying HTTP request
    #[must_use]
    pub fn into_http(self) -> HttpRequest {
        match self {
            Self::Untraced(request) => request,
            Self::Traced(traced) => traced.request,
        }
    }

    /// Whether the capture layer has tagged this request
    #[must_use]
    pub fn is_traced(&self) -> bool {
        matches!(self, Self::Traced(_))
    }
}

impl From<HttpRequest> for OutgoingRequest {
    fn from(request: HttpRequest) -> Self {
        Self::Untraced(request)
    }
}

// ============================================================================
// Events and errors
// ============================================================================

/// One step of a streamed HTTP exchange
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferEvent {
    /// Status line and headers
    Head {
        /// HTTP status code
        status: u16,
        /// Response headers
        headers: HeaderFields,
    },
    /// A piece of the response body, in arrival order
    Chunk(Bytes),
    /// The body finished successfully
    Complete,
    /// The exchange failed after the head arrived
    Failed(TransportError),
}

/// Errors surfaced by transports
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport gave up waiting
    #[error("request timed out: {0}")]
    Timeout(String),

    /// No connection could be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be built or sent
    #[error("request failed: {0}")]
    Request(String),

    /// The response body failed mid-stream
    #[error("response body failed: {0}")]
    Body(String),

    /// The caller abandoned the exchange
    #[error("request cancelled")]
    Cancelled,

    /// The capture layer could not tag the request
    #[error("request could not be captured: {0}")]
    Admission(String),

    /// The stream ended without a well-formed response
    #[error("response incomplete: {0}")]
    Incomplete(String),
}

impl TransportError {
    /// Classification used on capture records
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Connect(_) => FailureKind::Connect,
            Self::Request(_) => FailureKind::Request,
            Self::Body(_) => FailureKind::Body,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Admission(_) => FailureKind::Admission,
            Self::Incomplete(_) => FailureKind::Incomplete,
        }
    }

    /// Convert into the form stored on a record
    #[must_use]
    pub fn to_recorded(&self) -> RecordedError {
        RecordedError::new(self.kind(), self.to_string())
    }
}

/// A fully buffered response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderFields,
    /// Concatenated body
    pub body: Bytes,
}

impl BufferedResponse {
    /// Whether the status falls in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Body as UTF-8 text, replacing invalid sequences
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// Transport trait
// ============================================================================

/// HTTP transport
///
/// Implement this trait to plug a network stack (or a test double) under the
/// capture layer.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Transport name for logs (e.g. "reqwest")
    fn name(&self) -> &str;

    /// Start an exchange and stream its events
    ///
    /// Returns once the response head is available (or the exchange failed
    /// before it). The returned channel carries the events described in the
    /// module docs and closes after the terminal event.
    async fn dispatch(
        &self,
        request: OutgoingRequest,
    ) -> Result<mpsc::Receiver<TransferEvent>, TransportError>;

    /// Run an exchange to completion and buffer the body
    async fn send(&self, request: OutgoingRequest) -> Result<BufferedResponse, TransportError> {
        let mut events = self.dispatch(request).await?;
        let mut head = None;
        let mut body = BytesMut::new();

        while let Some(event) = events.recv().await {
            match event {
                TransferEvent::Head { status, headers } => head = Some((status, headers)),
                TransferEvent::Chunk(bytes) => body.extend_from_slice(&bytes),
                TransferEvent::Complete => {
                    let (status, headers) = head.ok_or_else(|| {
                        TransportError::Incomplete("exchange completed without a response head".into())
                    })?;
                    return Ok(BufferedResponse {
                        status,
                        headers,
                        body: body.freeze(),
                    });
                }
                TransferEvent::Failed(error) => return Err(error),
            }
        }

        Err(TransportError::Incomplete(
            "stream closed before the exchange completed".into(),
        ))
    }
}
