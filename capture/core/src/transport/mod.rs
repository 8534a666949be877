//! HTTP Transport Layer
//!
//! This module provides the transport abstraction the capture layer wraps,
//! through a common trait interface.
//!
//! # Available Transports
//!
//! - **Reqwest**: the real network channel
//! - **Scripted**: in-memory replay of pre-programmed exchanges
//!
//! The capture interceptor ([`crate::CaptureInterceptor`]) also implements
//! [`HttpTransport`], so it drops in wherever a transport is expected.
//!
//! # Usage
//!
//! ```ignore
//! use capture_core::transport::{HttpRequest, HttpTransport, ReqwestTransport};
//! use capture_core::config::TransportSettings;
//!
//! let transport = ReqwestTransport::new(&TransportSettings::default())?;
//! let response = transport.send(HttpRequest::get("https://example.com").into()).await?;
//! ```

mod http;
mod scripted;
mod traits;

pub use http::ReqwestTransport;
pub use scripted::{DispatchedRequest, ScriptedEnding, ScriptedResponse, ScriptedTransport};
pub use traits::{
    BufferedResponse, HttpRequest, HttpTransport, OutgoingRequest, TracedRequest, TransferEvent,
    TransportError,
};
