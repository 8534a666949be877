//! Scripted Transport
//!
//! In-memory [`HttpTransport`] that replays pre-programmed exchanges. Used by
//! the capture tests and handy for hosts that want deterministic fixtures
//! under the capture layer.
//!
//! # Usage
//!
//! ```ignore
//! use capture_core::transport::{ScriptedResponse, ScriptedTransport};
//!
//! let transport = ScriptedTransport::new();
//! transport.push_response(ScriptedResponse::ok("hello").with_chunks(["a", "b"]));
//!
//! // After the test, inspect what reached the wire
//! assert_eq!(transport.dispatch_count(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::traits::{HttpTransport, OutgoingRequest, TransferEvent, TransportError};
use crate::record::HeaderFields;

/// How a scripted body ends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptedEnding {
    /// Send `Complete`
    Complete,
    /// Send `Failed` with the given error
    Fail(TransportError),
    /// Close the channel without a terminal event
    Close,
    /// Never finish; wait for the receiver to go away
    Hang,
}

/// One scripted exchange that reaches the response head
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderFields,
    /// Body chunks, sent in order
    pub chunks: Vec<Bytes>,
    /// What follows the last chunk
    pub ending: ScriptedEnding,
    /// Withhold the head until [`ScriptedTransport::release_held`]
    pub held: bool,
}

impl ScriptedResponse {
    /// A successful response with the given status and no body
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: HeaderFields::new(),
            chunks: Vec::new(),
            ending: ScriptedEnding::Complete,
            held: false,
        }
    }

    /// A 200 response with a single-chunk body
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::status(200).with_chunks([body.into()])
    }

    /// Replace the body chunks
    #[must_use]
    pub fn with_chunks<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the ending
    #[must_use]
    pub fn with_ending(mut self, ending: ScriptedEnding) -> Self {
        self.ending = ending;
        self
    }

    /// Withhold the head until the transport releases held responses
    #[must_use]
    pub fn held(mut self) -> Self {
        self.held = true;
        self
    }
}

/// A request observed by the scripted transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchedRequest {
    /// The request as received
    pub request: OutgoingRequest,
}

/// Transport replaying scripted exchanges in order
///
/// When the script runs out, every further request gets an empty 200.
#[derive(Clone)]
pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<Result<ScriptedResponse, TransportError>>>>,
    dispatched: Arc<Mutex<Vec<DispatchedRequest>>>,
    abandoned: Arc<AtomicUsize>,
    /// Flips to `true` once held responses may proceed
    released: Arc<watch::Sender<bool>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        let (released, _) = watch::channel(false);
        Self {
            replies: Arc::default(),
            dispatched: Arc::default(),
            abandoned: Arc::default(),
            released: Arc::new(released),
        }
    }
}

impl ScriptedTransport {
    /// Create an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an exchange that reaches the head
    pub fn push_response(&self, response: ScriptedResponse) {
        self.replies.lock().push_back(Ok(response));
    }

    /// Queue an exchange that fails before the head
    pub fn push_error(&self, error: TransportError) {
        self.replies.lock().push_back(Err(error));
    }

    /// Requests received so far, oldest first
    #[must_use]
    pub fn dispatched(&self) -> Vec<DispatchedRequest> {
        self.dispatched.lock().clone()
    }

    /// Number of requests received
    #[must_use]
    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().len()
    }

    /// Let every held response (current and future) return its head
    pub fn release_held(&self) {
        self.released.send_replace(true);
    }

    /// Exchanges whose receiver went away before the script finished
    #[must_use]
    pub fn abandoned_count(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn dispatch(
        &self,
        request: OutgoingRequest,
    ) -> Result<mpsc::Receiver<TransferEvent>, TransportError> {
        self.dispatched.lock().push(DispatchedRequest { request });
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ScriptedResponse::status(200)));

        let response = reply?;
        if response.held {
            let mut released = self.released.subscribe();
            // The sender lives in `self`, so this only ends on release
            let _ = released.wait_for(|open| *open).await;
        }

        let (tx, rx) = mpsc::channel(16);
        let abandoned = Arc::clone(&self.abandoned);

        tokio::spawn(async move {
            let ScriptedResponse {
                status,
                headers,
                chunks,
                ending,
                ..
            } = response;

            let hang = ending == ScriptedEnding::Hang;
            let mut events = vec![TransferEvent::Head { status, headers }];
            events.extend(chunks.into_iter().map(TransferEvent::Chunk));
            match ending {
                ScriptedEnding::Complete => events.push(TransferEvent::Complete),
                ScriptedEnding::Fail(error) => events.push(TransferEvent::Failed(error)),
                ScriptedEnding::Close | ScriptedEnding::Hang => {}
            }

            for event in events {
                if tx.send(event).await.is_err() {
                    abandoned.fetch_add(1, Ordering::SeqCst);
                    return;
                }
            }

            if hang {
                tx.closed().await;
                abandoned.fetch_add(1, Ordering::SeqCst);
            }
        });

        Ok(rx)
    }
}
