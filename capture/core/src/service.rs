//! Capture Service
//!
//! Explicitly constructed handle owning the capture store and the enabled
//! flag. Clone it wherever a transport is assembled; every clone shares the
//! same state.
//!
//! # Lifecycle
//!
//! ```text
//! new / with_settings ─▶ configure (optional) ─▶ enable ⇄ disable
//!                                                  │
//!                                   records / count / clear_records
//! ```
//!
//! A disabled service keeps its records readable; interceptors bound to it
//! simply stop admitting new requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::CaptureSettings;
use crate::interceptor::CaptureInterceptor;
use crate::record::CaptureRecord;
use crate::store::CaptureStore;
use crate::transport::HttpTransport;

struct ServiceInner {
    store: RwLock<Arc<CaptureStore>>,
    enabled: AtomicBool,
    settings: RwLock<CaptureSettings>,
}

/// Handle to one capture session
#[derive(Clone)]
pub struct CaptureService {
    inner: Arc<ServiceInner>,
}

impl CaptureService {
    /// Create a disabled service retaining at most `max_records` records
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self::with_settings(CaptureSettings {
            enabled: false,
            max_records,
            ..CaptureSettings::default()
        })
    }

    /// Create a service from resolved settings
    ///
    /// The service starts enabled when `settings.enabled` is set. A
    /// `max_records` of zero is stored as the clamped capacity.
    #[must_use]
    pub fn with_settings(mut settings: CaptureSettings) -> Self {
        let store = Arc::new(CaptureStore::new(settings.max_records));
        settings.max_records = store.capacity();
        Self {
            inner: Arc::new(ServiceInner {
                store: RwLock::new(store),
                enabled: AtomicBool::new(settings.enabled),
                settings: RwLock::new(settings),
            }),
        }
    }

    /// Replace the store with an empty one of the given capacity
    ///
    /// Meant to be called once before [`enable`](Self::enable). Existing
    /// records are discarded, and completions for requests still in flight
    /// land in the old store and are lost.
    pub fn configure(&self, max_records: usize) {
        let fresh = Arc::new(CaptureStore::new(max_records));
        let max_records = fresh.capacity();
        let previous = std::mem::replace(&mut *self.inner.store.write(), fresh);
        self.inner.settings.write().max_records = max_records;

        let discarded = previous.count();
        if discarded > 0 {
            tracing::warn!(
                discarded,
                max_records,
                "Capture reconfigured with records present, discarding them"
            );
        } else {
            tracing::debug!(max_records, "Capture store configured");
        }
    }

    /// Start admitting requests
    ///
    /// Returns `true` if the service was previously disabled.
    pub fn enable(&self) -> bool {
        let changed = !self.inner.enabled.swap(true, Ordering::SeqCst);
        if changed {
            tracing::info!("HTTP capture enabled");
        }
        changed
    }

    /// Stop admitting requests
    ///
    /// Requests already in flight still complete their records. Returns
    /// `true` if the service was previously enabled.
    pub fn disable(&self) -> bool {
        let changed = self.inner.enabled.swap(false, Ordering::SeqCst);
        if changed {
            tracing::info!("HTTP capture disabled");
        }
        changed
    }

    /// Whether new requests are captured
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// The current store
    #[must_use]
    pub fn store(&self) -> Arc<CaptureStore> {
        Arc::clone(&self.inner.store.read())
    }

    /// Snapshot of all records, newest first
    #[must_use]
    pub fn records(&self) -> Vec<CaptureRecord> {
        self.inner.store.read().records()
    }

    /// Number of records held
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.store.read().count()
    }

    /// Remove every record
    pub fn clear_records(&self) {
        self.inner.store.read().clear();
    }

    /// Wait until every retained record has reached a terminal state
    pub async fn wait_until_settled(&self) {
        let store = self.store();
        store.wait_until_settled().await;
    }

    /// Current settings
    #[must_use]
    pub fn settings(&self) -> CaptureSettings {
        self.inner.settings.read().clone()
    }

    /// Wrap an isolated transport in an interceptor bound to this service
    ///
    /// `isolated` must not itself route back through this interceptor.
    pub fn interceptor<T: HttpTransport>(&self, isolated: T) -> CaptureInterceptor<T> {
        CaptureInterceptor::new(self.clone(), isolated)
    }

    /// Store to tag a new request against, if capture is on
    pub(crate) fn active_store(&self) -> Option<Arc<CaptureStore>> {
        self.is_enabled().then(|| self.store())
    }
}

impl Default for CaptureService {
    fn default() -> Self {
        Self::with_settings(CaptureSettings::default())
    }
}

impl std::fmt::Debug for CaptureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureService")
            .field("enabled", &self.is_enabled())
            .field("count", &self.count())
            .field("capacity", &self.store().capacity())
            .finish()
    }
}
