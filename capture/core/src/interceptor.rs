//! Capture Interceptor
//!
//! Decorator around an [`HttpTransport`] that records every exchange into the
//! bound [`CaptureService`] while relaying events to the caller untouched.
//!
//! # Request Lifecycle
//!
//! ```text
//! NotIntercepted ──(traced or disabled)──▶ isolated transport, unrecorded
//!       │
//!    admitted
//!       ▼
//!    Tagged ──(bad method / url)──▶ Failed (Admission)
//!       │  initiate
//!       ▼
//!   Dispatched ──(error before head)──▶ Failed
//!       │  relay task spawned
//!       ▼
//!   Streaming ──▶ Completed | Failed | Cancelled | Incomplete
//! ```
//!
//! Every event is forwarded before the store hears about it, so the caller
//! observes exactly the sequence the isolated transport produced. Each
//! in-flight exchange is relayed by its own task; exchanges never share a
//! queue.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::mpsc;

use crate::record::{HeaderFields, RecordId, RecordedError, ResponseSnapshot};
use crate::service::CaptureService;
use crate::store::CaptureStore;
use crate::transport::{
    HttpRequest, HttpTransport, OutgoingRequest, TracedRequest, TransferEvent, TransportError,
};

/// Default capacity of the caller-facing event channel
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Transport decorator that captures traffic
///
/// `T` is the isolated channel: it must not route back through an interceptor
/// bound to the same service. Requests that arrive already traced are
/// forwarded to it untouched.
pub struct CaptureInterceptor<T> {
    service: CaptureService,
    isolated: T,
    event_buffer: usize,
}

impl<T: HttpTransport> CaptureInterceptor<T> {
    /// Wrap `isolated`, recording into `service`
    pub fn new(service: CaptureService, isolated: T) -> Self {
        Self {
            service,
            isolated,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Set the caller-facing channel capacity
    #[must_use]
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }
}

impl<T> std::fmt::Debug for CaptureInterceptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureInterceptor")
            .field("service", &self.service)
            .field("event_buffer", &self.event_buffer)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for CaptureInterceptor<T> {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn dispatch(
        &self,
        request: OutgoingRequest,
    ) -> Result<mpsc::Receiver<TransferEvent>, TransportError> {
        // Admission check
        let request = match request {
            OutgoingRequest::Traced(traced) => {
                tracing::trace!(record_id = %traced.id(), "Request already traced, not capturing");
                return self.isolated.dispatch(OutgoingRequest::Traced(traced)).await;
            }
            OutgoingRequest::Untraced(request) => request,
        };
        let Some(store) = self.service.active_store() else {
            return self.isolated.dispatch(OutgoingRequest::Untraced(request)).await;
        };
        let max_body = self.service.settings().max_body_capture_bytes;

        // Tag
        let started = Instant::now();
        let id = store.initiate(request.snapshot());
        if let Err(reason) = validate(&request) {
            let error = TransportError::Admission(reason);
            tracing::warn!(
                record_id = %id,
                method = %request.method,
                url = %request.url,
                error = %error,
                "Request rejected by capture"
            );
            store.complete_with_error(id, error.to_recorded(), started.elapsed());
            return Err(error);
        }
        tracing::debug!(
            record_id = %id,
            method = %request.method,
            url = %request.url,
            "Capturing request"
        );

        // Dispatch on the isolated channel
        let mut guard = PendingGuard::new(Arc::clone(&store), id, started);
        let dispatched = self
            .isolated
            .dispatch(OutgoingRequest::Traced(TracedRequest::new(id, request)))
            .await;
        guard.disarm();

        let upstream = match dispatched {
            Ok(upstream) => upstream,
            Err(error) => {
                tracing::debug!(record_id = %id, error = %error, "Captured request failed before response");
                store.complete_with_error(id, error.to_recorded(), started.elapsed());
                return Err(error);
            }
        };

        // Stream
        let (downstream, events) = mpsc::channel(self.event_buffer);
        let relay = Relay {
            store,
            id,
            started,
            max_body,
        };
        tokio::spawn(relay.run(upstream, downstream));

        Ok(events)
    }
}

/// Reject requests the record could not describe faithfully
fn validate(request: &HttpRequest) -> Result<(), String> {
    reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|_| format!("invalid method {:?}", request.method))?;
    reqwest::Url::parse(&request.url).map_err(|e| format!("invalid url {:?}: {e}", request.url))?;
    Ok(())
}

// ============================================================================
// Cancellation before the head
// ============================================================================

/// Records `Cancelled` if the dispatch future is dropped mid-flight
struct PendingGuard {
    store: Arc<CaptureStore>,
    id: RecordId,
    started: Instant,
    armed: bool,
}

impl PendingGuard {
    fn new(store: Arc<CaptureStore>, id: RecordId, started: Instant) -> Self {
        Self {
            store,
            id,
            started,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(record_id = %self.id, "Captured request dropped before response");
            self.store.complete_with_error(
                self.id,
                TransportError::Cancelled.to_recorded(),
                self.started.elapsed(),
            );
        }
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Per-exchange relay state, owned by its task
struct Relay {
    store: Arc<CaptureStore>,
    id: RecordId,
    started: Instant,
    max_body: usize,
}

impl Relay {
    async fn run(
        self,
        mut upstream: mpsc::Receiver<TransferEvent>,
        downstream: mpsc::Sender<TransferEvent>,
    ) {
        let mut head: Option<(u16, HeaderFields)> = None;
        let mut body = BytesMut::new();
        let mut truncated = false;

        loop {
            let next = tokio::select! {
                biased;
                event = upstream.recv() => Some(event),
                () = downstream.closed() => None,
            };

            let Some(event) = next else {
                // Caller went away; dropping upstream cancels the exchange
                drop(upstream);
                self.fail(TransportError::Cancelled.to_recorded());
                return;
            };

            let Some(event) = event else {
                // Closed without a terminal event, close the caller's side the same way
                drop(downstream);
                self.fail(
                    TransportError::Incomplete("stream closed before the exchange completed".into())
                        .to_recorded(),
                );
                return;
            };

            match event {
                TransferEvent::Head { status, headers } => {
                    head = Some((status, headers.clone()));
                    if downstream
                        .send(TransferEvent::Head { status, headers })
                        .await
                        .is_err()
                    {
                        self.fail(TransportError::Cancelled.to_recorded());
                        return;
                    }
                }
                TransferEvent::Chunk(bytes) => {
                    let captured = bytes.clone();
                    if downstream.send(TransferEvent::Chunk(bytes)).await.is_err() {
                        self.fail(TransportError::Cancelled.to_recorded());
                        return;
                    }
                    let room = self.max_body.saturating_sub(body.len());
                    if captured.len() > room {
                        body.extend_from_slice(&captured[..room]);
                        truncated = true;
                    } else {
                        body.extend_from_slice(&captured);
                    }
                }
                TransferEvent::Complete => {
                    // The exchange finished whether or not the caller is still listening
                    let _ = downstream.send(TransferEvent::Complete).await;
                    match head {
                        Some((status, headers)) => {
                            let body = (!body.is_empty()).then(|| body.freeze());
                            self.succeed(ResponseSnapshot {
                                status,
                                headers,
                                body,
                                body_truncated: truncated,
                            });
                        }
                        None => self.fail(
                            TransportError::Incomplete(
                                "exchange completed without a response head".into(),
                            )
                            .to_recorded(),
                        ),
                    }
                    return;
                }
                TransferEvent::Failed(error) => {
                    let recorded = error.to_recorded();
                    let _ = downstream.send(TransferEvent::Failed(error)).await;
                    self.fail(recorded);
                    return;
                }
            }
        }
    }

    fn succeed(&self, response: ResponseSnapshot) {
        let duration = self.started.elapsed();
        tracing::debug!(
            record_id = %self.id,
            status = response.status,
            body_bytes = response.body.as_ref().map_or(0, bytes::Bytes::len),
            truncated = response.body_truncated,
            duration = ?duration,
            "Captured response"
        );
        self.store.complete_with_snapshot(self.id, response, duration);
    }

    fn fail(&self, error: RecordedError) {
        let duration = self.started.elapsed();
        tracing::debug!(
            record_id = %self.id,
            kind = %error.kind,
            error = %error.description,
            duration = ?duration,
            "Captured failure"
        );
        self.store.complete_with_error(self.id, error, duration);
    }
}
