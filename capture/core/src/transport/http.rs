//! Reqwest Transport
//!
//! The real network channel. It carries no capture logic of its own, which
//! makes it the isolated channel the capture layer re-dispatches on.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{HttpTransport, OutgoingRequest, TransferEvent, TransportError};
use crate::config::TransportSettings;
use crate::record::HeaderFields;

/// HTTP transport backed by a `reqwest::Client`
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    /// HTTP client
    client: reqwest::Client,
    /// Capacity of each exchange's event channel
    event_buffer: usize,
}

impl ReqwestTransport {
    /// Build a transport from settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (for
    /// example when the TLS backend fails to initialize).
    pub fn new(settings: &TransportSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, settings.event_buffer))
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client, event_buffer: usize) -> Self {
        Self {
            client,
            event_buffer: event_buffer.max(1),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    fn name(&self) -> &'static str {
        "reqwest"
    }

    async fn dispatch(
        &self,
        request: OutgoingRequest,
    ) -> Result<mpsc::Receiver<TransferEvent>, TransportError> {
        let request = request.into_http();

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::Request(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| classify(&e))?;

        let status = response.status().as_u16();
        let headers = header_fields(response.headers());
        let mut stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(self.event_buffer);

        // Spawn task to pump the body
        tokio::spawn(async move {
            if tx.send(TransferEvent::Head { status, headers }).await.is_err() {
                return;
            }

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        if tx.send(TransferEvent::Chunk(bytes)).await.is_err() {
                            // Receiver dropped, abandon the body
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(TransferEvent::Failed(classify(&e))).await;
                        return;
                    }
                }
            }

            let _ = tx.send(TransferEvent::Complete).await;
        });

        Ok(rx)
    }
}

/// Map a reqwest error onto the transport taxonomy
fn classify(error: &reqwest::Error) -> TransportError {
    let message = error.to_string();
    if error.is_timeout() {
        TransportError::Timeout(message)
    } else if error.is_connect() {
        TransportError::Connect(message)
    } else if error.is_body() || error.is_decode() {
        TransportError::Body(message)
    } else {
        TransportError::Request(message)
    }
}

/// Flatten a header map, joining repeated values
fn header_fields(map: &reqwest::header::HeaderMap) -> HeaderFields {
    let mut fields = HeaderFields::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes());
        fields
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    fields
}
