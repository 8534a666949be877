//! Capture Core - Transparent HTTP Traffic Capture
//!
//! This crate records outgoing HTTP requests and their eventual responses or
//! errors without call-site changes. Application code talks to an
//! [`HttpTransport`]; wrapping that transport in a [`CaptureInterceptor`]
//! makes every exchange show up in a bounded, thread-safe history that a
//! debugging surface can read.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Application code                          │
//! │              Arc<dyn HttpTransport>::dispatch / send             │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ OutgoingRequest::Untraced
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                      CaptureInterceptor                          │
//! │  admit ─▶ tag (initiate) ─▶ dispatch ─▶ relay task per request   │
//! │                                 │              │                 │
//! │            OutgoingRequest::Traced     complete_with_*           │
//! └─────────────────────────────────┼──────────────┼─────────────────┘
//!                                   │              ▼
//! ┌─────────────────────────────────┼───┐  ┌─────────────────────────┐
//! │ Isolated transport (reqwest)    │   │  │ CaptureService          │
//! │ no interception, one real op    ◀───┘  │  └ CaptureStore (ring)  │
//! └─────────────────────────────────────┘  └────────────┬────────────┘
//!                                                       │ records / count / clear
//!                                                  debug surface
//! ```
//!
//! # Key Types
//!
//! - [`CaptureService`]: lifecycle handle (configure, enable, disable, read)
//! - [`CaptureInterceptor`]: transport decorator performing the capture
//! - [`CaptureStore`]: bounded newest-first record ring
//! - [`CaptureRecord`]: immutable description of one request attempt
//!
//! # Quick Start
//!
//! ```ignore
//! use capture_core::{CaptureService, config::TransportSettings};
//! use capture_core::transport::{HttpRequest, HttpTransport, ReqwestTransport};
//!
//! let service = CaptureService::new(100);
//! service.enable();
//!
//! let transport = service.interceptor(ReqwestTransport::new(&TransportSettings::default())?);
//! let response = transport.send(HttpRequest::get("https://example.com").into()).await?;
//!
//! for record in service.records() {
//!     println!("{} {} {}", record.display_status(), record.request().method, record.request().url);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`config`]: TOML/env/CLI configuration
//! - [`record`]: record model and display helpers
//! - [`store`]: the bounded capture store
//! - [`transport`]: transport trait, reqwest and scripted implementations
//! - [`interceptor`]: the interception layer
//! - [`service`]: the lifecycle controller

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod interceptor;
pub mod record;
pub mod service;
pub mod store;
pub mod transport;

// Re-exports for convenience
pub use config::{
    load_config, load_config_from_path, CaptureConfigFile, CaptureSettings, ConfigError,
    ConfigOverrides, ConfigSource, TransportSettings,
};
pub use interceptor::CaptureInterceptor;
pub use record::{
    export_json, CaptureRecord, FailureKind, HeaderFields, RecordId, RecordedError,
    RequestSnapshot, ResponseSnapshot, StatusBand,
};
pub use service::CaptureService;
pub use store::{CaptureStore, StoreStats};
pub use transport::{
    BufferedResponse, HttpRequest, HttpTransport, OutgoingRequest, ReqwestTransport,
    ScriptedResponse, ScriptedTransport, TransferEvent, TransportError,
};
